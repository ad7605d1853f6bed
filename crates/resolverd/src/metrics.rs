//! Prometheus metrics surface, per §4.8. Grounded on
//! `crates/resolved/src/metrics.rs`'s `axum`-served `/metrics`
//! endpoint and counter-naming convention, retargeted at this
//! resolver's Stats Hooks instead of the teacher's zone-lookup
//! metrics.

use std::net::SocketAddr;
use std::sync::LazyLock;

use axum::{http::StatusCode, routing, Router};
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

use dns_resolver::stats::StatsSnapshot;

pub static DNS_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        opts!(
            "dns_requests_total",
            "Total number of DNS requests received, whether valid or invalid."
        ),
        &["protocol"]
    )
    .unwrap()
});

pub static DNS_RESPONSES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        opts!("dns_responses_total", "Total number of DNS responses sent."),
        &["protocol", "rcode"]
    )
    .unwrap()
});

pub static DNS_RESOLVER_QUERIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_queries_total",
        "Total number of questions handled by the resolver core."
    ))
    .unwrap()
});

pub static DNS_RESOLVER_CACHE_HIT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_cache_hit_total",
        "Total number of cache hits."
    ))
    .unwrap()
});

pub static DNS_RESOLVER_BLOCKED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_blocked_total",
        "Total number of queries intercepted by the blocklist."
    ))
    .unwrap()
});

pub static DNS_RESOLVER_QUERIES_FORWARDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_queries_forwarded_total",
        "Total number of questions answered from an upstream."
    ))
    .unwrap()
});

pub static DNS_RESOLVER_QUERIES_ANSWERED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_queries_answered_total",
        "Total number of questions handled to completion, answered or not."
    ))
    .unwrap()
});

pub static CACHE_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(opts!("cache_size", "Number of records in the cache.")).unwrap()
});

/// Overwrite the resolver-core gauges/counters from a fresh
/// `StatsSnapshot`. The Stats Hooks are the source of truth; these
/// are a mirror for Prometheus scraping, not an independent counter.
pub fn sync_from_snapshot(snapshot: StatsSnapshot, cache_len: usize) {
    set_counter_to(&DNS_RESOLVER_QUERIES_TOTAL, snapshot.total_queries);
    set_counter_to(&DNS_RESOLVER_CACHE_HIT_TOTAL, snapshot.total_cache_hits);
    set_counter_to(&DNS_RESOLVER_BLOCKED_TOTAL, snapshot.total_blocks);
    set_counter_to(
        &DNS_RESOLVER_QUERIES_FORWARDED_TOTAL,
        snapshot.total_queries_forwarded,
    );
    set_counter_to(
        &DNS_RESOLVER_QUERIES_ANSWERED_TOTAL,
        snapshot.total_queries_answered,
    );
    CACHE_SIZE.set(cache_len.try_into().unwrap_or(i64::MAX));
}

fn set_counter_to(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

async fn get_metrics() -> (StatusCode, String) {
    match TextEncoder::new().encode_to_string(&prometheus::gather()) {
        Ok(body) => (StatusCode::OK, body),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

pub async fn serve_prometheus_endpoint_task(address: SocketAddr) -> std::io::Result<()> {
    let app = Router::new().route("/metrics", routing::get(get_metrics));
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await
}
