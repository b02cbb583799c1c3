use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    ops::{BitOr, BitOrAssign},
    path::{Path, PathBuf},
};

/// Address-family selection bitmask.
///
/// Controls which partitions are populated during construction and which
/// refill strategy the selection path may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProxyFamilies(u8);

impl ProxyFamilies {
    pub const NONE: ProxyFamilies = ProxyFamilies(0);
    pub const IPV4: ProxyFamilies = ProxyFamilies(1);
    pub const IPV6: ProxyFamilies = ProxyFamilies(1 << 1);
    pub const MAPPED_IPV6: ProxyFamilies = ProxyFamilies(1 << 2);
    pub const ALL: ProxyFamilies = ProxyFamilies(1 | 1 << 1 | 1 << 2);

    pub fn contains(self, other: ProxyFamilies) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn intersects(self, other: ProxyFamilies) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ProxyFamilies {
    type Output = ProxyFamilies;

    fn bitor(self, rhs: ProxyFamilies) -> ProxyFamilies {
        ProxyFamilies(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProxyFamilies {
    fn bitor_assign(&mut self, rhs: ProxyFamilies) {
        self.0 |= rhs.0;
    }
}

fn default_max_proxies_per_subnet() -> i64 {
    10_000
}

fn default_probe_url() -> String {
    "https://whatismyv6.com/".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_retry_delay_ms() -> u64 {
    1_000
}

/// Knobs for the live egress check performed during construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorConfig {
    /// "Echo my IP" resource the probe request is sent to.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "default_probe_retry_delay_ms")]
    pub probe_retry_delay_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_attempts: default_probe_attempts(),
            probe_retry_delay_ms: default_probe_retry_delay_ms(),
        }
    }
}

/// Construction-time configuration for [`ProxyPool`](super::ProxyPool).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Which partitions to populate.
    #[serde(default)]
    pub families: ProxyFamilies,
    /// Upper bound on generated addresses per subnet; values <= 0 fall back
    /// to the default of 10000. The true block size always wins when smaller.
    #[serde(default = "default_max_proxies_per_subnet")]
    pub max_proxies_per_subnet: i64,
    /// When set, selection never removes entries and the pool is static.
    #[serde(default)]
    pub disable_rotation: bool,
    /// Skip the live egress check entirely.
    #[serde(default)]
    pub disable_test: bool,
    /// Skip credential embedding; endpoint URLs carry no authority userinfo.
    #[serde(default)]
    pub disable_auth: bool,
    /// Downgrade validation failure from a fatal error to a warning.
    #[serde(default)]
    pub lenient_validation: bool,
    /// Directory holding the `ipv4`, `ipv6` and `ipv6-mapped` source files.
    #[serde(default)]
    pub sources_dir: PathBuf,
    /// Secret mixed into the per-address credential digest.
    #[serde(default)]
    pub shared_secret: String,
    /// Identity substituted when a credential is derived for an empty address.
    #[serde(default)]
    pub fallback_identity: String,
    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            families: ProxyFamilies::NONE,
            max_proxies_per_subnet: default_max_proxies_per_subnet(),
            disable_rotation: false,
            disable_test: false,
            disable_auth: false,
            lenient_validation: false,
            sources_dir: PathBuf::new(),
            shared_secret: String::new(),
            fallback_identity: String::new(),
            validator: ValidatorConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Effective per-subnet cap; non-positive configured values mean default.
    pub fn subnet_cap(&self) -> usize {
        if self.max_proxies_per_subnet <= 0 {
            default_max_proxies_per_subnet() as usize
        } else {
            self.max_proxies_per_subnet as usize
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<PoolConfig> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("read pool config {}", path.display()))?;
        let cfg: PoolConfig = serde_json::from_str(&text)
            .with_context(|| format!("parse pool config {}", path.display()))?;
        Ok(cfg)
    }
}
