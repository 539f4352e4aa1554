pub mod assembly;
pub mod loader;
pub mod models;
pub mod starter;
pub mod validation;

pub use loader::load_config;
pub use models::*;
pub use starter::STARTER_CONFIG;
pub use validation::{EngineConfigValidator, ValidationError, ValidationResult};
