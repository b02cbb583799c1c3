use ipnet::Ipv6Net;
use rand::Rng;
use std::net::{IpAddr, Ipv6Addr};
use url::Url;

use super::credential::CredentialSigner;
use super::errors::PoolError;
use super::store::{PoolState, ProxyFamily, ProxyRecord};

/// Draws per generation slot before giving up on finding a fresh address.
/// A subnet whose remaining block is already registered stops early instead
/// of spinning on collisions.
const COLLISION_RETRY_BUDGET: u32 = 64;

/// One mapped-IPv6 generation unit: a fixed physical server endpoint plus the
/// IPv6 block its generated source addresses are drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    /// Canonical text of the server's own address.
    pub server_host: String,
    pub server_is_v6: bool,
    pub subnet: Ipv6Net,
    pub port: u16,
    /// Diagnostic label, the raw CIDR text as configured.
    pub source_label: String,
}

impl SubnetSpec {
    /// Parse one `ipv6-mapped` line: `serverIP|CIDR|port`.
    pub fn parse(line: &str) -> Result<SubnetSpec, PoolError> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 3 {
            return Err(PoolError::config(format!("bad mapped proxy line: {line}")));
        }
        let (server, cidr, port) = (parts[0], parts[1], parts[2]);

        let server_ip: IpAddr = server
            .parse()
            .map_err(|_| PoolError::config(format!("bad server address: {server}")))?;
        if !cidr.contains('/') {
            return Err(PoolError::config(format!("not a subnet: {cidr}")));
        }
        let subnet: Ipv6Net = cidr.parse().map_err(|_| {
            PoolError::config(format!("subnet is not an IPv6 CIDR block: {cidr}"))
        })?;
        let port: u16 = port
            .parse()
            .map_err(|_| PoolError::config(format!("bad port: {port}")))?;

        Ok(SubnetSpec {
            server_host: server_ip.to_string(),
            server_is_v6: server_ip.is_ipv6(),
            subnet,
            port,
            source_label: cidr.to_string(),
        })
    }

    /// Exact host count of the block, `2^(128 - prefix)`. Saturates at
    /// `u128::MAX` for a /0; any reachable cap compares identically.
    pub fn block_size(&self) -> u128 {
        let host_bits = 128 - u32::from(self.subnet.prefix_len());
        if host_bits >= 128 {
            u128::MAX
        } else {
            1u128 << host_bits
        }
    }

    /// `min(configured cap, true block size)`.
    pub fn effective_cap(&self, configured: usize) -> usize {
        self.block_size().min(configured as u128) as usize
    }
}

/// Copy the subnet's fixed bits and fill every host bit with random data.
fn random_host<R: Rng>(subnet: &Ipv6Net, rng: &mut R) -> Ipv6Addr {
    let network = subnet.network().octets();
    let mask = subnet.netmask().octets();
    let mut out = [0u8; 16];
    for (i, slot) in out.iter_mut().enumerate() {
        let noise: u8 = rng.gen();
        *slot = network[i] | (noise & !mask[i]);
    }
    Ipv6Addr::from(out)
}

/// Endpoint URL `http://[credential]host:port`, host bracketed when IPv6.
pub(crate) fn endpoint_url(
    credential: &str,
    host: &str,
    host_is_v6: bool,
    port: u16,
) -> Result<Url, PoolError> {
    let text = if host_is_v6 {
        format!("http://{credential}[{host}]:{port}")
    } else {
        format!("http://{credential}{host}:{port}")
    };
    Url::parse(&text).map_err(|e| PoolError::config(format!("bad proxy url {text}: {e}")))
}

/// Generate mapped-IPv6 records for one subnet and insert them into the
/// mapped partition. Returns the number inserted and the first generated
/// address/endpoint pair (the per-subnet validation candidate).
pub(crate) fn generate_into(
    state: &mut PoolState,
    spec: &SubnetSpec,
    configured_cap: usize,
    signer: &CredentialSigner,
) -> Result<(usize, Option<(Ipv6Addr, Url)>), PoolError> {
    let cap = spec.effective_cap(configured_cap);
    let mut rng = rand::thread_rng();
    let mut inserted = 0usize;
    let mut first = None;

    'slots: for _ in 0..cap {
        let mut candidate = None;
        for _ in 0..COLLISION_RETRY_BUDGET {
            let ip = random_host(&spec.subnet, &mut rng);
            if !state.is_registered(&ip.to_string()) {
                candidate = Some(ip);
                break;
            }
        }
        let Some(ip) = candidate else {
            tracing::debug!(
                target = "pool",
                subnet = %spec.source_label,
                inserted,
                "subnet exhausted fresh addresses, stopping generation"
            );
            break 'slots;
        };

        let raw = ip.to_string();
        let endpoint = endpoint_url(
            &signer.credential(&raw),
            &spec.server_host,
            spec.server_is_v6,
            spec.port,
        )?;
        if first.is_none() {
            first = Some((ip, endpoint.clone()));
        }
        state.insert(ProxyFamily::MappedIpv6, ProxyRecord::new(raw, endpoint));
        inserted += 1;
    }

    Ok((inserted, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::store::PoolState;

    fn signer() -> CredentialSigner {
        CredentialSigner::new("secret", "fallback", true)
    }

    #[test]
    fn test_parse_mapped_line() {
        let spec = SubnetSpec::parse("192.0.2.10|2001:db8::/64|3128").unwrap();
        assert_eq!(spec.server_host, "192.0.2.10");
        assert!(!spec.server_is_v6);
        assert_eq!(spec.port, 3128);
        assert_eq!(spec.subnet.prefix_len(), 64);
        assert_eq!(spec.source_label, "2001:db8::/64");

        let spec = SubnetSpec::parse("2001:db8:f::1|2001:db8::/64|3128").unwrap();
        assert!(spec.server_is_v6);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(SubnetSpec::parse("1.2.3.4|2001:db8::/64").is_err());
        assert!(SubnetSpec::parse("not-an-ip|2001:db8::/64|80").is_err());
        assert!(SubnetSpec::parse("1.2.3.4|2001:db8::|80").is_err());
        assert!(SubnetSpec::parse("1.2.3.4|10.0.0.0/24|80").is_err());
        assert!(SubnetSpec::parse("1.2.3.4|2001:db8::/64|not-a-port").is_err());
    }

    #[test]
    fn test_block_size_math() {
        let spec = SubnetSpec::parse("1.2.3.4|2001:db8::/126|80").unwrap();
        assert_eq!(spec.block_size(), 4);
        assert_eq!(spec.effective_cap(100), 4);

        let spec = SubnetSpec::parse("1.2.3.4|2001:db8::/64|80").unwrap();
        assert_eq!(spec.block_size(), 1u128 << 64);
        assert_eq!(spec.effective_cap(10_000), 10_000);

        let spec = SubnetSpec::parse("1.2.3.4|2001:db8::1/128|80").unwrap();
        assert_eq!(spec.block_size(), 1);
        assert_eq!(spec.effective_cap(10_000), 1);

        let spec = SubnetSpec::parse("1.2.3.4|::/0|80").unwrap();
        assert_eq!(spec.block_size(), u128::MAX);
    }

    #[test]
    fn test_random_host_stays_inside_subnet() {
        let spec = SubnetSpec::parse("1.2.3.4|2001:db8:abcd::/48|80").unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let ip = random_host(&spec.subnet, &mut rng);
            assert!(spec.subnet.contains(&ip), "{ip} escaped {}", spec.subnet);
        }
    }

    #[test]
    fn test_small_subnet_generation_is_bounded_by_block() {
        let spec = SubnetSpec::parse("192.0.2.10|2001:db8::/126|3128").unwrap();
        let mut state = PoolState::default();
        let (inserted, first) = generate_into(&mut state, &spec, 100, &signer()).unwrap();
        assert!(inserted <= 4, "generated {inserted} from a 4-host block");
        assert!(inserted >= 1);
        assert!(first.is_some());
        assert_eq!(state.mapped_ipv6.len(), inserted);
        assert_eq!(state.total_count(), inserted);
    }

    #[test]
    fn test_generation_skips_registered_addresses() {
        let spec = SubnetSpec::parse("192.0.2.10|2001:db8::1/128|3128").unwrap();
        let mut state = PoolState::default();
        let url = endpoint_url("", "192.0.2.10", false, 3128).unwrap();
        state.insert(
            ProxyFamily::MappedIpv6,
            ProxyRecord::new("2001:db8::1", url),
        );
        // The single host of the /128 is taken; nothing new can be generated.
        let (inserted, first) = generate_into(&mut state, &spec, 100, &signer()).unwrap();
        assert_eq!(inserted, 0);
        assert!(first.is_none());
        assert_eq!(state.total_count(), 1);
    }

    #[test]
    fn test_generated_endpoint_points_at_server() {
        let spec = SubnetSpec::parse("192.0.2.10|2001:db8::/120|3128").unwrap();
        let mut state = PoolState::default();
        let (_, first) = generate_into(&mut state, &spec, 5, &signer()).unwrap();
        let (_, endpoint) = first.unwrap();
        assert_eq!(endpoint.host_str(), Some("192.0.2.10"));
        assert_eq!(endpoint.port(), Some(3128));
        assert_eq!(endpoint.scheme(), "http");
        assert!(!endpoint.username().is_empty());
    }

    #[test]
    fn test_endpoint_url_brackets_ipv6_server() {
        let url = endpoint_url("aa:bb@", "2001:db8::5", true, 8080).unwrap();
        assert_eq!(url.host_str(), Some("[2001:db8::5]"));
        assert_eq!(url.username(), "aa");
        assert_eq!(url.password(), Some("bb"));
    }
}
