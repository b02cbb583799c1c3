use anyhow::Result;
use std::collections::HashMap;
use url::Url;

use super::config::ProxyFamilies;

/// Capability contract for pluggable directory services that contribute
/// ready-made endpoints at construction time.
///
/// A listing failure is fatal for the whole construction; it is propagated as
/// [`PoolError::ExternalSource`](super::PoolError) tagged with `name()`.
pub trait ProxySource: Send + Sync {
    /// Raw address → endpoint URL for every relay the service knows about.
    fn list_addresses(&self) -> Result<HashMap<String, Url>>;

    /// Which address families the service contributes. Services whose
    /// families don't intersect the pool's configured selection are skipped.
    fn families(&self) -> ProxyFamilies;

    /// Service name for diagnostics.
    fn name(&self) -> &str;
}
