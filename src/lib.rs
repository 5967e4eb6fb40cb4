pub mod api;
pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod plugins;
pub mod query;
pub mod ranking;
pub mod recorder;
pub mod registry;
pub mod retention;
pub mod router;
pub mod storage;
pub mod traffic;

pub use error::{ConfigurationError, QueryError, TrafficError};
