use rand::Rng;
use std::sync::Mutex;
use url::Url;

use super::config::{PoolConfig, ProxyFamilies};
use super::credential::CredentialSigner;
use super::errors::PoolError;
use super::loader::{self, LoadContext};
use super::source::ProxySource;
use super::store::{PoolState, ProxyFamily};
use super::validator::{EndpointProbe, ProxyValidator};

/// The categorized proxy registry plus its selection engine.
///
/// Built once from the configured sources; afterwards `random_proxy` may be
/// called concurrently. A single mutex serializes every selection, including
/// the lazy refill it may trigger.
#[derive(Debug)]
pub struct ProxyPool {
    config: PoolConfig,
    signer: CredentialSigner,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// Sequentially load every configured source, validate per source/subnet,
    /// and return the ready pool. Any fatal condition aborts the build as a
    /// whole; there is no partial pool.
    pub fn build(
        config: PoolConfig,
        services: Vec<Box<dyn ProxySource>>,
    ) -> Result<ProxyPool, PoolError> {
        let signer = CredentialSigner::new(
            config.shared_secret.clone(),
            config.fallback_identity.clone(),
            !config.disable_auth,
        );
        let validator = (!config.disable_test).then(|| ProxyValidator::new(config.validator.clone()));

        let mut state = PoolState::default();
        {
            let probe = validator.as_ref().map(|v| v as &dyn EndpointProbe);
            let ctx = LoadContext {
                config: &config,
                signer: &signer,
                probe,
            };
            loader::load_all(&mut state, &ctx, &services)?;
        }

        tracing::info!(
            target = "pool",
            total = state.total_count(),
            "found total proxies"
        );
        Ok(ProxyPool {
            config,
            signer,
            state: Mutex::new(state),
        })
    }

    pub fn total_count(&self) -> usize {
        self.state.lock().unwrap().total_count()
    }

    /// Draw one endpoint via the tiered weighted random selection.
    ///
    /// With rotation enabled the returned entry is removed from its
    /// partition; exhaustion (after at most one lazy refill) returns `None`
    /// and is a normal steady-state condition, not an error.
    pub fn random_proxy(&self) -> Option<(String, Url)> {
        let mut state = self.state.lock().unwrap();
        let rotation = !self.config.disable_rotation;

        if rotation && state.total_count() < 1 {
            self.refill(&mut state);
        }
        if state.total_count() < 1 {
            return None;
        }

        let mut rng = rand::thread_rng();
        let r: u32 = rng.gen_range(0..100);
        let family = choose_family(&state, r)?;
        let record = state.tier(family).pick_random(&mut rng)?.clone();
        if rotation {
            state.remove(family, &record.address);
        }
        Some((record.address, record.endpoint))
    }

    /// One regeneration pass when rotation has drained the pool. Validation
    /// is load-phase-only and never runs here; a refill that fails is logged
    /// and observed as plain exhaustion by the caller.
    fn refill(&self, state: &mut PoolState) {
        let ctx = LoadContext {
            config: &self.config,
            signer: &self.signer,
            probe: None,
        };
        let result = if self.config.families.contains(ProxyFamilies::MAPPED_IPV6) {
            loader::load_mapped(state, &ctx)
        } else if self.config.families.contains(ProxyFamilies::IPV4) {
            state.clear_dedup();
            loader::load_ipv4(state, &ctx)
        } else {
            Ok(())
        };
        if let Err(err) = result {
            tracing::warn!(
                target = "pool",
                category = err.category(),
                "lazy refill failed: {err}"
            );
        }
    }
}

/// Tier choice for one draw `r` in [0, 100): 10% IPv4, 20% IPv6, 70% mapped,
/// skewing load toward the cheap generated tier. An empty chosen tier (or
/// r == 0) falls back to the first non-empty tier in mapped → IPv6 → IPv4
/// order.
fn choose_family(state: &PoolState, r: u32) -> Option<ProxyFamily> {
    let chosen = if r > 90 && !state.ipv4.is_empty() {
        Some(ProxyFamily::Ipv4)
    } else if r > 70 && !state.ipv6.is_empty() {
        Some(ProxyFamily::Ipv6)
    } else if r > 0 && !state.mapped_ipv6.is_empty() {
        Some(ProxyFamily::MappedIpv6)
    } else {
        None
    };

    chosen.or_else(|| {
        if !state.mapped_ipv6.is_empty() {
            Some(ProxyFamily::MappedIpv6)
        } else if !state.ipv6.is_empty() {
            Some(ProxyFamily::Ipv6)
        } else if !state.ipv4.is_empty() {
            Some(ProxyFamily::Ipv4)
        } else {
            None
        }
    })
}
