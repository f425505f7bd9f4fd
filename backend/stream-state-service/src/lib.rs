pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod services;

pub use error::{AppError, Result};
