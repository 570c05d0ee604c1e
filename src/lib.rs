pub mod config;
pub mod credential;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod proto;
pub mod services;
pub mod store;
pub mod token;

pub use config::Config;
pub use error::{AppError, AppResult};
