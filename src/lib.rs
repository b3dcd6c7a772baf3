pub mod api;
pub mod config;
pub mod error;
pub mod tts;

pub use api::routes::{create_router, AppState};
pub use config::{Backend, ConfigError, ServerConfig};
pub use error::AppError;
