pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod prompt;
pub mod server;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{GenerationResult, ModelStore};
pub use server::build_router;
