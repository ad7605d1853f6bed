//! Loads the resolver's configuration file, per §4.6: a single YAML
//! document with `records`, `servers`, `blocklist`, and `settings`
//! sections, read with the `config` crate the way the teacher's root
//! `Cargo.toml` already depended on it for YAML support.
//!
//! A malformed file is fatal at startup -- `main` logs and exits --
//! rather than something the resolver core has to cope with, per §1's
//! "configuration file loading... is an external collaborator".

use std::path::Path;

use serde::Deserialize;

use dns_resolver::error::ResolveError;
use dns_resolver::store::{Record, ResolverSettings, UpstreamServer};

#[derive(Debug, Deserialize)]
pub struct RawRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub value: String,
    pub ttl: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawServer {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub local_resolver: bool,
    #[serde(default)]
    pub adblocker: bool,
    #[serde(default)]
    pub domain_whitelist: Vec<String>,
}

fn default_port() -> u16 {
    53
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RawSettings {
    pub fallback_ip: Option<String>,
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,
    #[serde(default = "default_timeout_ms")]
    pub upstream_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub cache_records: bool,
    #[serde(default = "default_true")]
    pub auto_build_ptr_from_a: bool,
    #[serde(default = "default_true")]
    pub forward_ptr_queries: bool,
}

fn default_fallback_port() -> u16 {
    53
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for RawSettings {
    fn default() -> Self {
        RawSettings {
            fallback_ip: None,
            fallback_port: default_fallback_port(),
            upstream_timeout_ms: default_timeout_ms(),
            cache_records: true,
            auto_build_ptr_from_a: true,
            forward_ptr_queries: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub records: Vec<RawRecord>,
    #[serde(default)]
    pub servers: Vec<RawServer>,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub settings: RawSettings,
}

pub struct LoadedConfig {
    pub records: Vec<Record>,
    pub servers: Vec<UpstreamServer>,
    pub blocklist: Vec<String>,
    pub settings: ResolverSettings,
}

/// Load and validate the config file at `path`. Every record and
/// server is re-validated against §3's invariants via
/// `Record::new`/direct construction, so a bad entry fails loudly
/// here rather than surfacing as a silent resolution miss later.
pub fn load(path: &Path) -> Result<LoadedConfig, ResolveError> {
    let raw: RawConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .map_err(|e| ResolveError::InvalidArgs(format!("could not read config {}: {e}", path.display())))?
        .try_deserialize()
        .map_err(|e| ResolveError::InvalidArgs(format!("could not parse config {}: {e}", path.display())))?;

    let mut records = Vec::with_capacity(raw.records.len());
    for r in raw.records {
        records.push(Record::new(&r.name, &r.rtype, &r.value, r.ttl)?);
    }

    let servers = raw
        .servers
        .into_iter()
        .map(|s| UpstreamServer {
            address: s.address,
            port: s.port,
            active: s.active,
            local_resolver: s.local_resolver,
            adblocker: s.adblocker,
            domain_whitelist: s.domain_whitelist,
            last_used: None,
            last_success: None,
        })
        .collect();

    let settings = ResolverSettings {
        fallback_ip: raw.settings.fallback_ip,
        fallback_port: raw.settings.fallback_port,
        upstream_timeout_ms: raw.settings.upstream_timeout_ms,
        cache_records: raw.settings.cache_records,
        auto_build_ptr_from_a: raw.settings.auto_build_ptr_from_a,
        forward_ptr_queries: raw.settings.forward_ptr_queries,
    };

    Ok(LoadedConfig {
        records,
        servers,
        blocklist: raw.blocklist,
        settings,
    })
}
