mod async_service;

pub use async_service::{AsyncService, SharedExecutor};
