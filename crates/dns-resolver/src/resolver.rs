//! The Resolver Core, per §4.5: dispatches a question to the local
//! records, the cache, and the configured upstreams, enforcing the
//! priority rules and producing an answer set.
//!
//! The parallel race (§4.5.2) is implemented as a single consumer
//! loop over a `FuturesUnordered` of probe futures -- "a single
//! select-loop that tallies which probe classes have finished", per
//! the design note in §9. Local data always wins; cache beats the
//! network; among upstream results, an authoritative one wins over a
//! merely successful one.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dns_types::protocol::types::{
    DomainName, QueryType, RecordClass, RecordType, RecordTypeWithData, ResourceRecord,
};
use futures::stream::{FuturesUnordered, StreamExt};

use crate::client::UpstreamClient;
use crate::context::Context;
use crate::normalize::{name_key, record_type_key, reverse_to_ip};
use crate::store::{Record, ResolverSettings};
use crate::wire;

/// The outcome of resolving one question, ready to be appended to the
/// wire response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub answers: Vec<ResourceRecord>,
    pub authoritative: bool,
    pub nxdomain: bool,
}

impl ResolveOutcome {
    fn hit(answers: Vec<ResourceRecord>, authoritative: bool) -> Self {
        ResolveOutcome {
            answers,
            authoritative,
            nxdomain: false,
        }
    }

    fn empty() -> Self {
        ResolveOutcome::default()
    }

    fn name_error() -> Self {
        ResolveOutcome {
            answers: Vec::new(),
            authoritative: true,
            nxdomain: true,
        }
    }
}

/// The only entry point of the core, per §6: resolve `question`
/// against `ctx` and return the answers to append to the response.
pub async fn handle_question<CT: UpstreamClient>(
    ctx: &Context<CT>,
    question: &dns_types::protocol::types::Question,
) -> ResolveOutcome {
    ctx.stats.record_query();
    let outcome = dispatch(ctx, question).await;
    ctx.stats.record_answered();
    outcome
}

async fn dispatch<CT: UpstreamClient>(
    ctx: &Context<CT>,
    question: &dns_types::protocol::types::Question,
) -> ResolveOutcome {
    match question.qtype {
        QueryType::Record(RecordType::PTR) => resolve_ptr(ctx, question).await,
        QueryType::Record(RecordType::A) => resolve_race(ctx, question, RecordType::A).await,
        QueryType::Record(RecordType::AAAA) => resolve_race(ctx, question, RecordType::AAAA).await,
        _ => resolve_other(ctx, question).await,
    }
}

// ---------------------------------------------------------------
// §4.5.1 PTR local construction
// ---------------------------------------------------------------

async fn resolve_ptr<CT: UpstreamClient>(
    ctx: &Context<CT>,
    question: &dns_types::protocol::types::Question,
) -> ResolveOutcome {
    let settings = ctx.store.settings();
    let records = ctx.store.records();
    let query_name = question.name.to_dotted_string();

    let local = ptr_local_answers(&records, &query_name, settings.auto_build_ptr_from_a);
    if !local.is_empty() {
        if settings.cache_records {
            let cacheable: Vec<Record> = local.iter().map(wire::record_for_cache).collect();
            ctx.cache.insert_all(&cacheable, SystemTime::now());
        }
        return ResolveOutcome::hit(local, true);
    }

    if settings.forward_ptr_queries {
        resolve_other(ctx, question).await
    } else {
        ResolveOutcome::empty()
    }
}

fn ptr_local_answers(records: &[Record], query_name: &str, auto_build: bool) -> Vec<ResourceRecord> {
    let nk = name_key(query_name);
    let mut out = Vec::new();

    for record in records {
        if record.rtype == "PTR" && record.name_key() == nk {
            if let Ok(rr) = wire::to_resource_record(&record.name, &record.rtype, &record.value, record.ttl) {
                out.push(rr);
            }
        }
    }

    if !out.is_empty() || !auto_build {
        return out;
    }

    let Some(target_ip) = reverse_to_ip(query_name) else {
        return out;
    };
    let target_ip_key = target_ip.to_lowercase();

    let Some(owner) = DomainName::from_dotted_string(query_name) else {
        return out;
    };

    for record in records {
        if (record.rtype == "A" || record.rtype == "AAAA") && record.value.trim().to_lowercase() == target_ip_key {
            if let Some(target) = DomainName::from_dotted_string(&record.name) {
                out.push(ResourceRecord {
                    name: owner.clone(),
                    rtype_with_data: RecordTypeWithData::PTR { ptrdname: target },
                    rclass: RecordClass::IN,
                    ttl: record.ttl,
                });
            }
        }
    }

    out
}

// ---------------------------------------------------------------
// §4.5.4 Block interception
// ---------------------------------------------------------------

fn blocked_outcome(question: &dns_types::protocol::types::Question, qtype: RecordType) -> ResolveOutcome {
    match wire::blocked_answer(&question.name, qtype) {
        Some(rr) => ResolveOutcome::hit(vec![rr], true),
        None => ResolveOutcome::name_error(),
    }
}

// ---------------------------------------------------------------
// §4.5.2 Parallel race for A / AAAA
// ---------------------------------------------------------------

enum Probe {
    Local(Vec<ResourceRecord>),
    Cache(Option<ResourceRecord>),
    Upstream { endpoint: String, outcome: Option<UpstreamOutcome> },
}

struct UpstreamOutcome {
    answers: Vec<ResourceRecord>,
    authoritative: bool,
}

async fn resolve_race<CT: UpstreamClient>(
    ctx: &Context<CT>,
    question: &dns_types::protocol::types::Question,
    qtype: RecordType,
) -> ResolveOutcome {
    let query_name = question.name.to_dotted_string();
    let blocklist = ctx.store.blocklist();

    if blocklist.is_blocked(&query_name) {
        ctx.stats.record_block();
        return blocked_outcome(question, qtype);
    }

    let settings = ctx.store.settings();
    let records = ctx.store.records();
    let servers = ctx.store.servers();
    let type_key = record_type_key(qtype.to_string().as_str());

    let endpoints = upstream_endpoints(&servers, &settings, &query_name);
    let deadline = Duration::from_millis(settings.upstream_timeout_ms);

    let mut tasks: FuturesUnordered<std::pin::Pin<Box<dyn std::future::Future<Output = Probe> + Send + '_>>> =
        FuturesUnordered::new();

    let local_records = records.clone();
    let local_name = query_name.clone();
    let local_type = type_key.clone();
    tasks.push(Box::pin(async move {
        Probe::Local(local_matches(&local_records, &local_name, &local_type))
    }));

    let now = SystemTime::now();
    let cache_name = query_name.clone();
    let cache_type = type_key.clone();
    let cache = ctx.cache.clone();
    tasks.push(Box::pin(async move {
        let hit = cache.lookup(&cache_name, &cache_type, now).and_then(|cr| {
            wire::to_resource_record(&cr.name, &cr.rtype, &cr.value, cr.remaining_ttl(now)).ok()
        });
        Probe::Cache(hit)
    }));

    let upstream_total = endpoints.len();
    for endpoint in &endpoints {
        let endpoint = endpoint.clone();
        let question = question.clone();
        tasks.push(Box::pin(async move {
            let outcome = query_upstream(ctx, &question, &endpoint, deadline).await;
            Probe::Upstream { endpoint, outcome }
        }));
    }

    let mut local_result: Option<Vec<ResourceRecord>> = None;
    let mut cache_result: Option<Option<ResourceRecord>> = None;
    let mut upstream_results: Vec<(String, Option<UpstreamOutcome>)> = Vec::new();

    while let Some(probe) = tasks.next().await {
        match probe {
            Probe::Local(rrs) => {
                if !rrs.is_empty() {
                    if settings.cache_records {
                        let cacheable: Vec<Record> = rrs.iter().map(wire::record_for_cache).collect();
                        ctx.cache.insert_all(&cacheable, now);
                    }
                    return ResolveOutcome::hit(rrs, true);
                }
                local_result = Some(rrs);
            }
            Probe::Cache(hit) => {
                cache_result = Some(hit);
            }
            Probe::Upstream { endpoint, outcome } => {
                upstream_results.push((endpoint, outcome));
            }
        }

        if let (Some(local), Some(cache)) = (&local_result, &cache_result) {
            if local.is_empty() {
                if let Some(rr) = cache {
                    ctx.stats.record_cache_hit();
                    return ResolveOutcome::hit(vec![rr.clone()], false);
                }
                if upstream_results.len() == upstream_total {
                    return finish_from_upstreams(ctx, &settings, upstream_results, now);
                }
            }
        }
    }

    ResolveOutcome::empty()
}

fn finish_from_upstreams<CT: UpstreamClient>(
    ctx: &Context<CT>,
    settings: &ResolverSettings,
    results: Vec<(String, Option<UpstreamOutcome>)>,
    now: SystemTime,
) -> ResolveOutcome {
    let mut best_authoritative: Option<Vec<ResourceRecord>> = None;
    let mut best_any: Option<Vec<ResourceRecord>> = None;

    for (_endpoint, outcome) in results {
        if let Some(outcome) = outcome {
            if outcome.answers.is_empty() {
                continue;
            }
            if outcome.authoritative && best_authoritative.is_none() {
                best_authoritative = Some(outcome.answers.clone());
            }
            if best_any.is_none() {
                best_any = Some(outcome.answers.clone());
            }
        }
    }

    let chosen = best_authoritative.or(best_any);
    match chosen {
        Some(answers) => {
            if settings.cache_records {
                let records: Vec<Record> = answers.iter().map(wire::record_for_cache).collect();
                ctx.cache.insert_all(&records, now);
            }
            ctx.stats.record_forwarded();
            ResolveOutcome::hit(answers, false)
        }
        None => {
            tracing::debug!("no response");
            ResolveOutcome::empty()
        }
    }
}

async fn query_upstream<CT: UpstreamClient>(
    ctx: &Context<CT>,
    question: &dns_types::protocol::types::Question,
    endpoint: &str,
    deadline: Duration,
) -> Option<UpstreamOutcome> {
    match ctx.client.query(question, endpoint, deadline).await {
        Ok(message) => {
            if message.header.rcode == dns_types::protocol::types::Rcode::NoError && !message.answers.is_empty() {
                Some(UpstreamOutcome {
                    answers: message.answers,
                    authoritative: message.header.is_authoritative,
                })
            } else {
                None
            }
        }
        Err(error) => {
            tracing::debug!(%endpoint, %error, "upstream probe failed");
            None
        }
    }
}

fn local_matches(records: &[Record], query_name: &str, type_key: &str) -> Vec<ResourceRecord> {
    let nk = name_key(query_name);
    records
        .iter()
        .filter(|r| r.name_key() == nk && r.rtype == type_key)
        .filter_map(|r| wire::to_resource_record(&r.name, &r.rtype, &r.value, r.ttl).ok())
        .collect()
}

fn upstream_endpoints(
    servers: &[crate::store::UpstreamServer],
    settings: &ResolverSettings,
    query_name: &str,
) -> Vec<String> {
    let selection = crate::selector::select_servers(servers, query_name);
    let mut endpoints = selection.endpoints;

    if !selection.whitelist_matched {
        if let Some(fallback) = settings.fallback_endpoint() {
            if !endpoints.contains(&fallback) {
                endpoints.push(fallback);
            }
        }
    }

    endpoints
}

// ---------------------------------------------------------------
// §4.5.3 Non-A / non-PTR sequential fanout
// ---------------------------------------------------------------

async fn resolve_other<CT: UpstreamClient>(
    ctx: &Context<CT>,
    question: &dns_types::protocol::types::Question,
) -> ResolveOutcome {
    let query_name = question.name.to_dotted_string();
    let is_ptr = question.qtype == QueryType::Record(RecordType::PTR);

    if !is_ptr {
        let blocklist = ctx.store.blocklist();
        if blocklist.is_blocked(&query_name) {
            ctx.stats.record_block();
            let qtype = match question.qtype {
                QueryType::Record(rtype) => rtype,
                _ => RecordType::A,
            };
            return blocked_outcome(question, qtype);
        }
    }

    let settings = ctx.store.settings();
    let servers = ctx.store.servers();
    let selection = crate::selector::select_servers(&servers, &query_name);
    let deadline = Duration::from_millis(settings.upstream_timeout_ms);

    let mut futs: FuturesUnordered<std::pin::Pin<Box<dyn std::future::Future<Output = (String, Option<UpstreamOutcome>)> + Send + '_>>> =
        FuturesUnordered::new();
    for endpoint in &selection.endpoints {
        let endpoint = endpoint.clone();
        let question = question.clone();
        futs.push(Box::pin(async move {
            let outcome = query_upstream(ctx, &question, &endpoint, deadline).await;
            (endpoint, outcome)
        }));
    }

    let mut best_authoritative: Option<Vec<ResourceRecord>> = None;
    let mut best_any: Option<Vec<ResourceRecord>> = None;
    while let Some((_endpoint, outcome)) = futs.next().await {
        if let Some(outcome) = outcome {
            if outcome.answers.is_empty() {
                continue;
            }
            if outcome.authoritative {
                best_authoritative = Some(outcome.answers);
                break;
            }
            if best_any.is_none() {
                best_any = Some(outcome.answers);
            }
        }
    }

    if let Some(answers) = best_authoritative.or(best_any) {
        ctx.stats.record_forwarded();
        return ResolveOutcome::hit(answers, false);
    }

    if !selection.whitelist_matched {
        if let Some(fallback) = settings.fallback_endpoint() {
            if let Some(outcome) = query_upstream(ctx, question, &fallback, deadline).await {
                if !outcome.answers.is_empty() {
                    ctx.stats.record_forwarded();
                    return ResolveOutcome::hit(outcome.answers, outcome.authoritative);
                }
            }
        }
    }

    ResolveOutcome::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::Blocklist;
    use crate::cache::SharedCache;
    use crate::error::ResolveError;
    use crate::stats::Stats;
    use crate::store::{LocalStore, UpstreamServer};
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::{Header, Message, Opcode, QueryClass, Question, Rcode};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeClient {
        responses: StdMutex<HashMap<String, Message>>,
    }

    impl FakeClient {
        fn with(endpoint: &str, message: Message) -> Self {
            let mut map = HashMap::new();
            map.insert(endpoint.to_string(), message);
            FakeClient {
                responses: StdMutex::new(map),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamClient for FakeClient {
        async fn query(
            &self,
            _question: &Question,
            endpoint: &str,
            _deadline: Duration,
        ) -> Result<Message, ResolveError> {
            self.responses
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .ok_or_else(|| ResolveError::UpstreamError {
                    endpoint: endpoint.to_string(),
                    message: "no canned response".into(),
                })
        }
    }

    fn a_message(id: u16, authoritative: bool, ip: Ipv4Addr) -> Message {
        let q = Question {
            name: domain("test.example.com"),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        };
        Message {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: authoritative,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: true,
                rcode: Rcode::NoError,
            },
            questions: vec![q],
            answers: vec![a_record("test.example.com", ip)],
            authority: vec![],
            additional: vec![],
        }
    }

    fn a_question(name: &str) -> Question {
        Question {
            name: domain(name),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    fn context_with(
        records: Vec<Record>,
        servers: Vec<UpstreamServer>,
        settings: ResolverSettings,
        client: FakeClient,
    ) -> Context<FakeClient> {
        let store = LocalStore::new(records, servers, settings);
        Context::new(client, store, SharedCache::new(), Arc::new(Stats::new()))
    }

    #[tokio::test]
    async fn local_hit_wins_over_everything() {
        let records = vec![Record::new("test.example.com", "A", "1.2.3.4", Some(60)).unwrap()];
        let ctx = context_with(records, vec![], ResolverSettings::default(), FakeClient::default());
        let outcome = resolve_race(&ctx, &a_question("test.example.com"), RecordType::A).await;
        assert!(outcome.authoritative);
        assert_eq!(outcome.answers.len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_used_on_local_miss() {
        let ctx = context_with(vec![], vec![], ResolverSettings::default(), FakeClient::default());
        let cached = Record::new("test.example.com", "A", "9.9.9.9", Some(60)).unwrap();
        ctx.cache.insert(&cached, SystemTime::now());
        let outcome = resolve_race(&ctx, &a_question("test.example.com"), RecordType::A).await;
        assert!(!outcome.authoritative);
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(ctx.stats.snapshot().total_cache_hits, 1);
    }

    #[tokio::test]
    async fn block_intercepts_before_network() {
        let ctx = context_with(vec![], vec![], ResolverSettings::default(), FakeClient::default());
        ctx.store.replace_blocklist(Blocklist::new(["ads.example.com"]));
        let outcome = resolve_race(&ctx, &a_question("ads.example.com"), RecordType::A).await;
        assert!(outcome.authoritative);
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(
            outcome.answers[0].rtype_with_data,
            RecordTypeWithData::A {
                address: Ipv4Addr::UNSPECIFIED
            }
        );
        assert_eq!(ctx.stats.snapshot().total_blocks, 1);
    }

    #[tokio::test]
    async fn unblocked_sibling_not_intercepted() {
        let ctx = context_with(vec![], vec![], ResolverSettings::default(), FakeClient::default());
        ctx.store.replace_blocklist(Blocklist::new(["ads.example.com"]));
        let outcome = resolve_race(&ctx, &a_question("notads.example.com"), RecordType::A).await;
        assert_eq!(ctx.stats.snapshot().total_blocks, 0);
        assert!(outcome.answers.is_empty());
    }

    #[tokio::test]
    async fn authoritative_upstream_preferred_regardless_of_arrival() {
        let servers = vec![
            UpstreamServer {
                address: "10.0.0.1".into(),
                port: 53,
                active: true,
                local_resolver: false,
                adblocker: false,
                domain_whitelist: vec![],
                last_used: None,
                last_success: None,
            },
            UpstreamServer {
                address: "10.0.0.2".into(),
                port: 53,
                active: true,
                local_resolver: false,
                adblocker: false,
                domain_whitelist: vec![],
                last_used: None,
                last_success: None,
            },
        ];
        let client = FakeClient::default();
        client
            .responses
            .lock()
            .unwrap()
            .insert("10.0.0.1:53".into(), a_message(1, true, Ipv4Addr::new(1, 1, 1, 1)));
        client
            .responses
            .lock()
            .unwrap()
            .insert("10.0.0.2:53".into(), a_message(2, false, Ipv4Addr::new(2, 2, 2, 2)));
        let ctx = context_with(vec![], servers, ResolverSettings::default(), client);
        let outcome = resolve_race(&ctx, &a_question("test.example.com"), RecordType::A).await;
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(
            outcome.answers[0].rtype_with_data,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(1, 1, 1, 1)
            }
        );
    }

    #[tokio::test]
    async fn whitelist_pins_upstream_probes() {
        let servers = vec![
            UpstreamServer {
                address: "8.8.8.8".into(),
                port: 53,
                active: true,
                local_resolver: false,
                adblocker: false,
                domain_whitelist: vec![],
                last_used: None,
                last_success: None,
            },
            UpstreamServer {
                address: "192.168.5.5".into(),
                port: 53,
                active: true,
                local_resolver: false,
                adblocker: false,
                domain_whitelist: vec!["internal.example.com".into()],
                last_used: None,
                last_success: None,
            },
        ];
        let mut settings = ResolverSettings::default();
        settings.fallback_ip = Some("1.0.0.1".into());
        let client = FakeClient::with(
            "192.168.5.5:53",
            a_message(3, true, Ipv4Addr::new(3, 3, 3, 3)),
        );
        let ctx = context_with(vec![], servers, settings, client);
        let outcome = resolve_race(&ctx, &a_question("api.internal.example.com"), RecordType::A).await;
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(
            outcome.answers[0].rtype_with_data,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(3, 3, 3, 3)
            }
        );
    }

    #[tokio::test]
    async fn fallback_used_when_no_global_servers() {
        let mut settings = ResolverSettings::default();
        settings.fallback_ip = Some("1.0.0.1".into());
        settings.fallback_port = 53;
        let client = FakeClient::with("1.0.0.1:53", a_message(9, false, Ipv4Addr::new(4, 4, 4, 4)));
        let ctx = context_with(vec![], vec![], settings, client);
        let outcome = resolve_race(&ctx, &a_question("x.com"), RecordType::A).await;
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(
            outcome.answers[0].rtype_with_data,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(4, 4, 4, 4)
            }
        );
    }

    #[tokio::test]
    async fn ptr_auto_synthesis_from_a_record() {
        let records = vec![Record::new("host.local", "A", "10.0.0.5", Some(120)).unwrap()];
        let ctx = context_with(records, vec![], ResolverSettings::default(), FakeClient::default());
        let question = Question {
            name: domain("5.0.0.10.in-addr.arpa"),
            qtype: QueryType::Record(RecordType::PTR),
            qclass: QueryClass::Record(RecordClass::IN),
        };
        let outcome = resolve_ptr(&ctx, &question).await;
        assert!(outcome.authoritative);
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(outcome.answers[0].ttl, 120);
        match &outcome.answers[0].rtype_with_data {
            RecordTypeWithData::PTR { ptrdname } => {
                assert_eq!(ptrdname.to_dotted_string(), "host.local");
            }
            other => panic!("expected PTR, got {other:?}"),
        }
    }
}
