use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;
use url::Url;

use super::config::{PoolConfig, ProxyFamilies};
use super::credential::CredentialSigner;
use super::errors::PoolError;
use super::sampler::{self, SubnetSpec};
use super::source::ProxySource;
use super::store::{PoolState, ProxyFamily, ProxyRecord};
use super::validator::EndpointProbe;

/// Everything the load phase needs besides the mutable state. `probe` is
/// `None` when validation is disabled or during a lazy refill.
pub(crate) struct LoadContext<'a> {
    pub config: &'a PoolConfig,
    pub signer: &'a CredentialSigner,
    pub probe: Option<&'a dyn EndpointProbe>,
}

impl LoadContext<'_> {
    /// Run one per-source validation. Lenient mode downgrades a failure to a
    /// warning; the default aborts the whole construction.
    fn validate(&self, endpoint: &Url, expected: IpAddr) -> Result<(), PoolError> {
        let Some(probe) = self.probe else {
            return Ok(());
        };
        match probe.probe(endpoint, expected) {
            Ok(()) => Ok(()),
            Err(err) if self.config.lenient_validation => {
                tracing::warn!(
                    target = "pool",
                    %endpoint,
                    "egress check failed, continuing (lenient validation): {err}"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Non-empty lines of one source file under the configured directory.
fn read_source_lines(dir: &Path, name: &str) -> Result<Vec<String>, PoolError> {
    let path = dir.join(name);
    let file = File::open(&path)
        .map_err(|e| PoolError::config(format!("failed to open {}: {e}", path.display())))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line =
            line.map_err(|e| PoolError::config(format!("failed to read {}: {e}", path.display())))?;
        let line = line.trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Load the `ipv4` list: `ip:port` per line, `#` starting a new logical
/// source. The first address of every source is validated.
pub(crate) fn load_ipv4(state: &mut PoolState, ctx: &LoadContext<'_>) -> Result<(), PoolError> {
    let lines = read_source_lines(&ctx.config.sources_dir, "ipv4")?;
    let mut new_source = true;
    let mut found = 0usize;

    for line in lines {
        if line.starts_with('#') {
            new_source = true;
            continue;
        }
        let (ip_text, port_text) = line
            .split_once(':')
            .ok_or_else(|| PoolError::config(format!("bad proxy line: {line}")))?;
        let ip: IpAddr = ip_text
            .parse()
            .map_err(|_| PoolError::config(format!("bad address: {line}")))?;
        let port: u16 = port_text
            .parse()
            .map_err(|_| PoolError::config(format!("bad port: {line}")))?;
        let raw = ip.to_string();
        if state.is_registered(&raw) {
            continue;
        }

        let endpoint = sampler::endpoint_url("", &raw, false, port)?;
        state.insert(ProxyFamily::Ipv4, ProxyRecord::new(raw, endpoint.clone()));
        found += 1;
        if new_source {
            ctx.validate(&endpoint, ip)?;
            new_source = false;
        }
    }

    tracing::info!(target = "pool", count = found, "found IPv4 proxies");
    Ok(())
}

/// Load the `ipv6` list: `ip|port` per line, `#` starting a new logical
/// source which forces one validation on the next address.
pub(crate) fn load_ipv6(state: &mut PoolState, ctx: &LoadContext<'_>) -> Result<(), PoolError> {
    let lines = read_source_lines(&ctx.config.sources_dir, "ipv6")?;
    let mut new_source = false;
    let mut found = 0usize;

    for line in lines {
        if line.starts_with('#') {
            new_source = true;
            continue;
        }
        let (ip_text, port_text) = line
            .split_once('|')
            .ok_or_else(|| PoolError::config(format!("bad proxy line: {line}")))?;
        let ip: IpAddr = ip_text
            .parse()
            .map_err(|_| PoolError::config(format!("bad address: {line}")))?;
        let port: u16 = port_text
            .parse()
            .map_err(|_| PoolError::config(format!("bad port: {line}")))?;
        let raw = ip.to_string();
        if state.is_registered(&raw) {
            continue;
        }

        let endpoint = sampler::endpoint_url(&ctx.signer.credential(&raw), &raw, true, port)?;
        state.insert(ProxyFamily::Ipv6, ProxyRecord::new(raw, endpoint.clone()));
        found += 1;
        if new_source {
            ctx.validate(&endpoint, ip)?;
            new_source = false;
        }
    }

    tracing::info!(target = "pool", count = found, "found IPv6 proxies");
    Ok(())
}

/// Load the `ipv6-mapped` list and generate addresses per subnet. `#` lines
/// are comments; validation runs once per subnet, on its first address.
pub(crate) fn load_mapped(state: &mut PoolState, ctx: &LoadContext<'_>) -> Result<(), PoolError> {
    let lines = read_source_lines(&ctx.config.sources_dir, "ipv6-mapped")?;
    let mut generated = 0usize;

    for line in lines {
        if line.starts_with('#') {
            continue;
        }
        let spec = SubnetSpec::parse(&line)?;
        let (inserted, first) =
            sampler::generate_into(state, &spec, ctx.config.subnet_cap(), ctx.signer)?;
        generated += inserted;
        if let Some((ip, endpoint)) = first {
            ctx.validate(&endpoint, IpAddr::V6(ip))?;
        }
    }

    tracing::info!(target = "pool", count = generated, "generated mapped IPv6 proxies");
    Ok(())
}

/// Ingest one directory-service collaborator. Its first entry is validated;
/// a listing failure aborts construction.
pub(crate) fn load_service(
    state: &mut PoolState,
    ctx: &LoadContext<'_>,
    service: &dyn ProxySource,
) -> Result<(), PoolError> {
    if !ctx.config.families.intersects(service.families()) {
        return Ok(());
    }
    let listing = service
        .list_addresses()
        .map_err(|e| PoolError::external(service.name(), e.to_string()))?;

    let mut found = 0usize;
    let mut validated = false;
    for (raw, endpoint) in listing {
        let ip: IpAddr = raw.parse().map_err(|_| {
            PoolError::external(service.name(), format!("bad address listed: {raw}"))
        })?;
        let raw = ip.to_string();
        if state.is_registered(&raw) {
            continue;
        }
        let family = if ip.is_ipv6() {
            ProxyFamily::Ipv6
        } else {
            ProxyFamily::Ipv4
        };
        state.insert(family, ProxyRecord::new(raw, endpoint.clone()));
        found += 1;
        if !validated {
            ctx.validate(&endpoint, ip)?;
            validated = true;
        }
    }

    tracing::info!(
        target = "pool",
        count = found,
        service = service.name(),
        "found proxies from service"
    );
    Ok(())
}

/// Full sequential load across the configured families and all collaborators.
pub(crate) fn load_all(
    state: &mut PoolState,
    ctx: &LoadContext<'_>,
    services: &[Box<dyn ProxySource>],
) -> Result<(), PoolError> {
    if ctx.config.families.contains(ProxyFamilies::IPV4) {
        load_ipv4(state, ctx)?;
    }
    if ctx.config.families.contains(ProxyFamilies::MAPPED_IPV6) {
        load_mapped(state, ctx)?;
        load_ipv6(state, ctx)?;
    } else if ctx.config.families.contains(ProxyFamilies::IPV6) {
        load_ipv6(state, ctx)?;
    }
    for service in services {
        load_service(state, ctx, service.as_ref())?;
    }
    Ok(())
}
