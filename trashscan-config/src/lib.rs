//! Process configuration for trashscan.
//!
//! Settings come from a TOML file, a `.env` file, and `TRASHSCAN_*`
//! environment variables (highest precedence), and are composed once at
//! startup into an immutable [`Config`] that is handed to each component.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{Config, ConfigMetadata};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigValidationError, ConfigWarning, ConfigWarnings};
