//! # Mesh Common
//!
//! Shared types, errors, and constants used across peer-mesh components.
//!
//! ## Modules
//! - `types` - Peer descriptors and status snapshots
//! - `error` - Common error type
//! - `constants` - Settings defaults and wire-level names

pub mod constants;
pub mod error;
pub mod types;

pub use error::MeshError;
pub use types::*;
