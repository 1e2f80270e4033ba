//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FileConfig (validated, immutable)
//!     → file_store.rs (serves servers and profiles to the manager)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → FileStore swap, manager.update_upstreams(all names)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid file on reload keeps the current state

pub mod file_store;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use file_store::FileStore;
pub use loader::{load_config, ConfigError};
pub use schema::{BalancerSettings, FileConfig, UpstreamConfig, UpstreamEntry, DEFAULT_PROFILE};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
