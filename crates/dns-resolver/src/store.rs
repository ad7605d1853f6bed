//! The Local Store: the resolver's read-only-to-itself view of
//! authoritative records, the upstream server list, and resolver
//! settings.
//!
//! Mutations (record/server add/update/remove/load) build a brand new
//! `StoreData` and publish it with a single atomic swap, mirroring how
//! `bin-resolved` replaces its `Zones` behind an `RwLock` on reload:
//! resolution never blocks behind a writer, and a reader sees either
//! the whole old snapshot or the whole new one, never a mix.

use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ResolveError;
use crate::normalize::{canonicalize_name, name_key, record_type_key, value_key};

/// Default TTL, in seconds, applied to a record added without one.
pub const DEFAULT_TTL: u32 = 3600;

/// An authoritative record held by the Local Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: String,
    pub value: String,
    pub ttl: u32,
    pub added_on: Option<u64>,
    pub updated_on: Option<u64>,
    pub last_query: Option<u64>,
    pub mac: Option<String>,
    pub cache_record: bool,
}

impl Record {
    /// Build a new record, applying canonicalisation and the §3
    /// invariants. Returns `InvalidArgs` if `name`, `rtype`, or
    /// `value` are empty after trimming, or if the value does not
    /// parse for the given type.
    pub fn new(name: &str, rtype: &str, value: &str, ttl: Option<u32>) -> Result<Self, ResolveError> {
        let name = canonicalize_name(name);
        let rtype = record_type_key(rtype);
        let value = value.trim().to_string();
        if name.is_empty() {
            return Err(ResolveError::InvalidArgs("name must not be empty".into()));
        }
        if rtype.is_empty() {
            return Err(ResolveError::InvalidArgs("type must not be empty".into()));
        }
        if value.is_empty() {
            return Err(ResolveError::InvalidArgs("value must not be empty".into()));
        }
        validate_value(&rtype, &value)?;
        Ok(Record {
            name,
            rtype,
            value,
            ttl: ttl.unwrap_or(DEFAULT_TTL),
            added_on: Some(now_secs()),
            updated_on: None,
            last_query: None,
            mac: None,
            cache_record: false,
        })
    }

    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }

    pub fn value_key(&self) -> String {
        value_key(&self.rtype, &self.value)
    }
}

fn validate_value(rtype: &str, value: &str) -> Result<(), ResolveError> {
    match rtype {
        "A" => value
            .parse::<std::net::Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| ResolveError::InvalidArgs(format!("{value} is not a valid IPv4 address"))),
        "AAAA" => value
            .parse::<std::net::Ipv6Addr>()
            .map(|_| ())
            .map_err(|_| ResolveError::InvalidArgs(format!("{value} is not a valid IPv6 address"))),
        "CNAME" | "NS" | "PTR" | "MX" | "SRV" | "SOA" | "TXT" => {
            if canonicalize_name(value).is_empty() {
                Err(ResolveError::InvalidArgs(format!(
                    "{value} is not a valid domain name"
                )))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A configured upstream nameserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamServer {
    pub address: String,
    pub port: u16,
    pub active: bool,
    pub local_resolver: bool,
    pub adblocker: bool,
    pub domain_whitelist: Vec<String>,
    pub last_used: Option<u64>,
    pub last_success: Option<u64>,
}

impl UpstreamServer {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Resolver-wide tunables, per §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub fallback_ip: Option<String>,
    pub fallback_port: u16,
    pub upstream_timeout_ms: u64,
    pub cache_records: bool,
    pub auto_build_ptr_from_a: bool,
    pub forward_ptr_queries: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            fallback_ip: None,
            fallback_port: 53,
            upstream_timeout_ms: 2000,
            cache_records: true,
            auto_build_ptr_from_a: true,
            forward_ptr_queries: true,
        }
    }
}

impl ResolverSettings {
    pub fn fallback_endpoint(&self) -> Option<String> {
        self.fallback_ip
            .as_ref()
            .map(|ip| format!("{ip}:{}", self.fallback_port))
    }
}

#[derive(Debug, Clone, Default)]
struct StoreData {
    records: Arc<Vec<Record>>,
    servers: Arc<Vec<UpstreamServer>>,
    settings: ResolverSettings,
    blocklist: crate::blocklist::Blocklist,
}

/// The Local Store. Cheap to clone (wraps an `Arc`); every clone
/// shares the same underlying snapshot and observes the same writes.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<RwLock<Arc<StoreData>>>,
}

const POISON_MESSAGE: &str = "[INTERNAL ERROR] local store lock poisoned, cannot recover - aborting";

impl LocalStore {
    pub fn new(records: Vec<Record>, servers: Vec<UpstreamServer>, settings: ResolverSettings) -> Self {
        LocalStore {
            inner: Arc::new(RwLock::new(Arc::new(StoreData {
                records: Arc::new(records),
                servers: Arc::new(servers),
                settings,
                blocklist: crate::blocklist::Blocklist::empty(),
            }))),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), ResolverSettings::default())
    }

    /// An immutable snapshot of the records at this instant. Cheap:
    /// shares storage with whatever the store currently holds.
    pub fn records(&self) -> Arc<Vec<Record>> {
        let data = self.inner.read().expect(POISON_MESSAGE);
        data.records.clone()
    }

    pub fn servers(&self) -> Arc<Vec<UpstreamServer>> {
        let data = self.inner.read().expect(POISON_MESSAGE);
        data.servers.clone()
    }

    pub fn settings(&self) -> ResolverSettings {
        self.inner.read().expect(POISON_MESSAGE).settings.clone()
    }

    pub fn blocklist(&self) -> crate::blocklist::Blocklist {
        self.inner.read().expect(POISON_MESSAGE).blocklist.clone()
    }

    /// Atomically replace the blocklist. A loader error should be
    /// turned into `ResolveError::BlocklistLoadFailure` and reported
    /// to the caller without ever calling this, so the previous
    /// blocklist is kept, per §7.
    pub fn replace_blocklist(&self, blocklist: crate::blocklist::Blocklist) {
        let mut guard = self.inner.write().expect(POISON_MESSAGE);
        let mut next = (**guard).clone();
        next.blocklist = blocklist;
        *guard = Arc::new(next);
    }

    /// Atomically replace the whole record list.
    pub fn replace_records(&self, records: Vec<Record>) {
        let mut guard = self.inner.write().expect(POISON_MESSAGE);
        let mut next = (**guard).clone();
        next.records = Arc::new(records);
        *guard = Arc::new(next);
    }

    /// Atomically replace the whole server list.
    pub fn replace_servers(&self, servers: Vec<UpstreamServer>) {
        let mut guard = self.inner.write().expect(POISON_MESSAGE);
        let mut next = (**guard).clone();
        next.servers = Arc::new(servers);
        *guard = Arc::new(next);
    }

    /// Atomically replace the settings.
    pub fn replace_settings(&self, settings: ResolverSettings) {
        let mut guard = self.inner.write().expect(POISON_MESSAGE);
        let mut next = (**guard).clone();
        next.settings = settings;
        *guard = Arc::new(next);
    }

    /// Add a record, validating per §3. Returns the new record.
    pub fn add_record(&self, name: &str, rtype: &str, value: &str, ttl: Option<u32>) -> Result<Record, ResolveError> {
        let record = Record::new(name, rtype, value, ttl)?;
        let mut guard = self.inner.write().expect(POISON_MESSAGE);
        let mut next = (**guard).clone();
        Arc::make_mut(&mut next.records).push(record.clone());
        *guard = Arc::new(next);
        Ok(record)
    }

    /// Remove every record with the given name-key and type-key.
    /// Returns `NotFound` if none matched.
    pub fn remove_record(&self, name: &str, rtype: &str) -> Result<(), ResolveError> {
        let nk = name_key(name);
        let tk = record_type_key(rtype);
        let mut guard = self.inner.write().expect(POISON_MESSAGE);
        let before = guard.records.len();
        let mut next = (**guard).clone();
        Arc::make_mut(&mut next.records).retain(|r| !(r.name_key() == nk && r.rtype == tk));
        if next.records.len() == before {
            return Err(ResolveError::NotFound(format!("no {rtype} record for {name}")));
        }
        *guard = Arc::new(next);
        Ok(())
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_rejects_malformed_ipv4() {
        assert!(Record::new("x.example.com", "A", "not-an-ip", None).is_err());
    }

    #[test]
    fn record_rejects_empty_fields() {
        assert!(Record::new("", "A", "1.2.3.4", None).is_err());
        assert!(Record::new("x.example.com", "", "1.2.3.4", None).is_err());
        assert!(Record::new("x.example.com", "A", "  ", None).is_err());
    }

    #[test]
    fn record_defaults_ttl() {
        let r = Record::new("x.example.com", "A", "1.2.3.4", None).unwrap();
        assert_eq!(r.ttl, DEFAULT_TTL);
    }

    #[test]
    fn record_strips_trailing_dot_from_name() {
        let r = Record::new("x.example.com.", "A", "1.2.3.4", None).unwrap();
        assert_eq!(r.name, "x.example.com");
    }

    #[test]
    fn store_add_and_remove_round_trip() {
        let store = LocalStore::empty();
        store.add_record("x.example.com", "A", "1.2.3.4", None).unwrap();
        assert_eq!(store.records().len(), 1);
        store.remove_record("x.example.com", "A").unwrap();
        assert_eq!(store.records().len(), 0);
    }

    #[test]
    fn store_remove_missing_is_not_found() {
        let store = LocalStore::empty();
        assert!(matches!(
            store.remove_record("nope.example.com", "A"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn store_snapshot_is_stable_across_concurrent_write() {
        let store = LocalStore::empty();
        store.add_record("a.example.com", "A", "1.1.1.1", None).unwrap();
        let snapshot = store.records();
        store.add_record("b.example.com", "A", "2.2.2.2", None).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.records().len(), 2);
    }
}
