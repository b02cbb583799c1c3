use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use url::Url;

/// One registered relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    /// Canonical textual form of the proxy's source address.
    pub address: String,
    /// `http://[user:pass@]host[:port]`, IPv6 hosts bracketed.
    pub endpoint: Url,
}

impl ProxyRecord {
    pub fn new(address: impl Into<String>, endpoint: Url) -> Self {
        Self {
            address: address.into(),
            endpoint,
        }
    }
}

/// The three address-family partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyFamily {
    Ipv4,
    Ipv6,
    MappedIpv6,
}

/// One partition: a dense array paired with an address→index map so the
/// uniform draw and rotation removal are both O(1).
#[derive(Debug, Default)]
pub(crate) struct Tier {
    entries: Vec<ProxyRecord>,
    index: HashMap<String, usize>,
}

impl Tier {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    /// Returns false (and leaves the tier unchanged) if the address is
    /// already present.
    pub(crate) fn insert(&mut self, record: ProxyRecord) -> bool {
        if self.index.contains_key(&record.address) {
            return false;
        }
        self.index.insert(record.address.clone(), self.entries.len());
        self.entries.push(record);
        true
    }

    pub(crate) fn pick_random<R: Rng>(&self, rng: &mut R) -> Option<&ProxyRecord> {
        self.entries.choose(rng)
    }

    /// Swap-remove; the entry moved into the vacated slot is reindexed.
    pub(crate) fn remove(&mut self, address: &str) -> Option<ProxyRecord> {
        let slot = self.index.remove(address)?;
        let record = self.entries.swap_remove(slot);
        if let Some(moved) = self.entries.get(slot) {
            self.index.insert(moved.address.clone(), slot);
        }
        Some(record)
    }
}

/// All mutable pool state. The owning manager wraps this in a single mutex;
/// nothing outside that lock touches the partitions, the dedup set or the
/// running count.
#[derive(Debug, Default)]
pub(crate) struct PoolState {
    pub(crate) ipv4: Tier,
    pub(crate) ipv6: Tier,
    pub(crate) mapped_ipv6: Tier,
    /// Every raw address ever registered, across all partitions and sources.
    seen: HashSet<String>,
    total: usize,
}

impl PoolState {
    pub(crate) fn tier(&self, family: ProxyFamily) -> &Tier {
        match family {
            ProxyFamily::Ipv4 => &self.ipv4,
            ProxyFamily::Ipv6 => &self.ipv6,
            ProxyFamily::MappedIpv6 => &self.mapped_ipv6,
        }
    }

    fn tier_mut(&mut self, family: ProxyFamily) -> &mut Tier {
        match family {
            ProxyFamily::Ipv4 => &mut self.ipv4,
            ProxyFamily::Ipv6 => &mut self.ipv6,
            ProxyFamily::MappedIpv6 => &mut self.mapped_ipv6,
        }
    }

    /// Register a record in one partition. Re-encountering a known address is
    /// a no-op returning false, never an overwrite or a double count.
    pub(crate) fn insert(&mut self, family: ProxyFamily, record: ProxyRecord) -> bool {
        if self.seen.contains(&record.address) {
            return false;
        }
        self.seen.insert(record.address.clone());
        let inserted = self.tier_mut(family).insert(record);
        debug_assert!(inserted);
        self.total += 1;
        true
    }

    pub(crate) fn remove(&mut self, family: ProxyFamily, address: &str) -> Option<ProxyRecord> {
        let removed = self.tier_mut(family).remove(address)?;
        self.total -= 1;
        Some(removed)
    }

    pub(crate) fn is_registered(&self, address: &str) -> bool {
        self.seen.contains(address)
    }

    pub(crate) fn total_count(&self) -> usize {
        self.total
    }

    /// Sum over partitions; equals `total_count` outside an in-flight draw.
    pub(crate) fn partition_total(&self) -> usize {
        self.ipv4.len() + self.ipv6.len() + self.mapped_ipv6.len()
    }

    /// Forget every registered address. Used by the IPv4 refill path before
    /// re-scanning the source list.
    pub(crate) fn clear_dedup(&mut self) {
        self.seen.clear();
    }
}
