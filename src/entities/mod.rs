pub mod area;
pub mod cancellation_reason;
pub mod machine;
pub mod machine_sector;
pub mod product;
pub mod production_order;
pub mod sector;
pub mod stage;
pub mod stoppage_reason;
pub mod time_entry;
pub mod user;
