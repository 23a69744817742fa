use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{truncate_body, ErpError, OrderFeed, TokenProvider};
use crate::config::ErpConfig;

/// One released production order as the ERP lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpOrder {
    #[serde(rename = "ordem_producao")]
    pub number: i64,
    #[serde(rename = "referencia")]
    pub product_code: String,
    #[serde(rename = "descricao", default)]
    pub description: Option<String>,
    #[serde(rename = "qtde_programada", default)]
    pub quantity_programmed: Option<i32>,
    #[serde(rename = "qtde_carregada", default)]
    pub quantity_loaded: Option<i32>,
}

/// The listing comes either as a bare array or wrapped in `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderListing {
    Bare(Vec<ErpOrder>),
    Wrapped { items: Vec<ErpOrder> },
}

impl OrderListing {
    fn into_orders(self) -> Vec<ErpOrder> {
        match self {
            OrderListing::Bare(orders) | OrderListing::Wrapped { items: orders } => orders,
        }
    }
}

#[derive(Debug)]
pub struct ErpClient {
    http: reqwest::Client,
    orders_url: String,
    tokens: Arc<TokenProvider>,
}

impl ErpClient {
    pub fn new(http: reqwest::Client, orders_url: impl Into<String>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            orders_url: orders_url.into(),
            tokens,
        }
    }

    /// Builds the client and its token provider from configuration.
    pub fn from_config(config: &ErpConfig) -> Result<Self, ErpError> {
        if !config.is_configured() {
            return Err(ErpError::NotConfigured);
        }
        let (Some(base_url), Some(client_id), Some(client_secret)) = (
            config.base_url.as_deref(),
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        ) else {
            return Err(ErpError::NotConfigured);
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ErpError::Request(e.to_string()))?;
        let base = base_url.trim_end_matches('/');
        let tokens = Arc::new(TokenProvider::new(
            join_url(base, &config.token_path),
            client_id,
            client_secret,
            config.token_skew(),
        )?);
        Ok(Self::new(http, join_url(base, &config.orders_path), tokens))
    }

    /// Lists released orders. A 401 drops the cached token and retries once.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
        match self.request_orders().await {
            Err(ErpError::Status { status: 401, .. }) => {
                warn!("ERP rejected the cached token, requesting a new one");
                self.tokens.invalidate().await;
                self.request_orders().await
            }
            other => other,
        }
    }

    async fn request_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
        let token = self.tokens.token().await?;
        let response = self
            .http
            .get(&self.orders_url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ErpError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ErpError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let orders = response
            .json::<OrderListing>()
            .await
            .map_err(|e| ErpError::Decode(e.to_string()))?
            .into_orders();
        info!(count = orders.len(), "ERP orders fetched");
        Ok(orders)
    }
}

#[async_trait]
impl OrderFeed for ErpClient {
    async fn fetch_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
        self.list_orders().await
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    fn config(server: &MockServer) -> ErpConfig {
        ErpConfig {
            base_url: Some(server.uri()),
            client_id: Some("shopfloor".into()),
            client_secret: Some("s3cret".into()),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn listing_records_use_erp_field_names() {
        let raw = r#"{"ordem_producao": 8209, "referencia": "REF-77", "descricao": "Malha",
                      "qtde_programada": 1200, "qtde_carregada": 600}"#;
        let order: ErpOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(order.number, 8209);
        assert_eq!(order.product_code, "REF-77");
        assert_eq!(order.quantity_programmed, Some(1200));

        let sparse: ErpOrder =
            serde_json::from_str(r#"{"ordem_producao": 1, "referencia": "R"}"#).unwrap();
        assert_eq!(sparse.description, None);
        assert_eq!(sparse.quantity_loaded, None);
    }

    #[test]
    fn unconfigured_client_is_rejected() {
        assert_matches!(
            ErpClient::from_config(&ErpConfig::default()),
            Err(ErpError::NotConfigured)
        );
    }

    #[test]
    fn urls_join_without_double_slashes() {
        assert_eq!(join_url("http://erp/", "/oauth/token"), "http://erp/oauth/token");
        assert_eq!(join_url("http://erp", "api/x"), "http://erp/api/x");
    }

    #[tokio::test]
    async fn orders_are_listed_with_bearer_token() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/producao/ordens"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"ordem_producao": 8209, "referencia": "REF-77"}]
            })))
            .mount(&server)
            .await;

        let client = ErpClient::from_config(&config(&server)).unwrap();
        let orders = client.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].number, 8209);
    }

    #[tokio::test]
    async fn listing_failure_is_reported_with_status() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/producao/ordens"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = ErpClient::from_config(&config(&server)).unwrap();
        assert_matches!(
            client.list_orders().await,
            Err(ErpError::Status { status: 503, .. })
        );
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/producao/ordens"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = Arc::new(
            TokenProvider::new(
                format!("{}/oauth/token", server.uri()),
                "id",
                "secret",
                Duration::from_secs(60),
            )
            .expect("valid token url"),
        );
        let client = ErpClient::new(
            reqwest::Client::new(),
            format!("{}/api/producao/ordens", server.uri()),
            tokens,
        );
        assert_matches!(
            client.list_orders().await,
            Err(ErpError::Status { status: 401, .. })
        );
    }
}
