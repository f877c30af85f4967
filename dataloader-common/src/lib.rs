pub mod buffer;
pub mod converter;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod metrics_consts;
pub mod shutdown;
pub mod source;
pub mod store;
pub mod types;

pub use mongodb::bson;
