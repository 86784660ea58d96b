pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod query;
pub mod service;
pub mod stats;
pub mod storage;

pub use config::{Config, HydrationPolicy};
pub use error::{Result, StoreError};
pub use service::Store;
