//! Proxy-pool construction and selection.
//!
//! The pool is built once from file-backed lists (`ipv4`, `ipv6`,
//! `ipv6-mapped`) and pluggable directory services, validating one endpoint
//! per logical source against a live egress check. Afterwards callers draw
//! endpoints through a tiered weighted random selection with optional
//! one-shot rotation.

pub mod config;
pub mod credential;
pub mod errors;
pub mod manager;
pub mod sampler;
pub mod source;
pub mod validator;

mod loader;
mod store;

pub use config::{PoolConfig, ProxyFamilies, ValidatorConfig};
pub use credential::CredentialSigner;
pub use errors::PoolError;
pub use manager::ProxyPool;
pub use sampler::SubnetSpec;
pub use source::ProxySource;
pub use store::{ProxyFamily, ProxyRecord};
pub use validator::ProxyValidator;
