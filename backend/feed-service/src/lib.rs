pub mod clients;
pub mod config;
pub mod consumers;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
