//! A3S Sign Core - Foundational Types
//!
//! Error taxonomy, content digests, OCI descriptors and configuration files
//! shared by the A3S Sign runtime and CLI.

pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;

// Re-export commonly used types
pub use config::{KeyEntry, LogLevel, PluginKey, SignConfig, SigningKeys};
pub use descriptor::Descriptor;
pub use digest::{Digest, DigestAlgorithm};
pub use error::{PushFailureKind, Result, SignError};

/// A3S Sign version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
