//! # modhost-core
//!
//! Core crate for modhost. Contains configuration schemas, the unified
//! error system, extension-driven file persistence and a small object
//! reuse pool.
//!
//! This crate has **no** internal dependencies on other modhost crates.

pub mod config;
pub mod error;
pub mod files;
pub mod pool;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
