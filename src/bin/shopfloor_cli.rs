use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use shopfloor_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::user::UserRole,
    events::{Event, EventSender},
    handlers::AppServices,
    services::{order_import::ImportTrigger, users::CreateUserRequest},
};
use tokio::sync::mpsc;
use tracing::debug;
use validator::Validate;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::ImportOrders => handle_import_orders(&context, cli.json).await?,
        Commands::CreateAdmin(args) => handle_create_admin(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "shopfloor", about = "Shopfloor maintenance commands", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Pull open orders from the ERP once
    ImportOrders,
    /// Create an administrator account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args)]
struct CreateAdminArgs {
    #[arg(long)]
    matricula: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    password: String,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = Arc::new(EventSender::new(event_tx));

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "shopfloor_cli", event = ?event, "received async event");
            }
        });

        Ok(Self {
            config,
            db,
            event_sender,
        })
    }

    fn services(&self) -> AppServices {
        AppServices::new(self.db.clone(), self.event_sender.clone(), &self.config)
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed running migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_import_orders(context: &CliContext, json: bool) -> Result<()> {
    let summary = context
        .services()
        .order_import
        .run(ImportTrigger::Cli)
        .await
        .context("order import failed")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Fetched {} orders: {} inserted, {} already present, {} failed",
            summary.fetched, summary.inserted, summary.skipped_existing, summary.failed
        );
    }
    Ok(())
}

async fn handle_create_admin(context: &CliContext, args: CreateAdminArgs, json: bool) -> Result<()> {
    let request = CreateUserRequest {
        matricula: args.matricula,
        name: args.name,
        role: UserRole::Admin,
        password: Some(args.password),
        active: Some(true),
    };
    request.validate().context("invalid administrator data")?;

    let user = context
        .services()
        .users
        .create_user(request)
        .await
        .context("failed to create administrator")?;

    if json {
        print_json(&user)?;
    } else {
        println!("Administrator {} created (id {})", user.matricula, user.id);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
