// Configuration loading for Keystone
//
// Environment variables (optionally prefixed), `.env` files, and small
// validation helpers used by the typed configuration structs in other crates.

pub mod env;
pub mod error;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use validation::{ConfigValidator, Validate};
