//! The Server Selector, per §4.2: a pure function of the server
//! snapshot and the query name. Kept free of any I/O or shared state
//! so it is trivially unit-testable and reusable by diagnostic tools,
//! per the design note in §9.

use crate::normalize::name_key;
use crate::store::UpstreamServer;

/// The result of selecting upstream endpoints for a query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub endpoints: Vec<String>,
    pub whitelist_matched: bool,
}

/// Does `whitelist` entry `pattern` match `name_key`, either exactly
/// or as a dot-aligned suffix?
fn whitelist_entry_matches(pattern: &str, query_name_key: &str) -> bool {
    let pattern_key = name_key(pattern);
    pattern_key == query_name_key || query_name_key.ends_with(&format!(".{pattern_key}"))
}

/// Select the ordered set of upstream endpoints for `query_name`, per
/// §4.2's algorithm: whitelist-matching servers win outright; absent
/// a match, every active server with an empty whitelist is used. An
/// inactive server is never returned, unconditionally.
pub fn select_servers(servers: &[UpstreamServer], query_name: &str) -> Selection {
    let query_name_key = name_key(query_name);

    let candidates: Vec<&UpstreamServer> = servers.iter().filter(|s| s.active).collect();

    let whitelist_matches: Vec<&UpstreamServer> = candidates
        .iter()
        .filter(|s| {
            !s.domain_whitelist.is_empty()
                && s.domain_whitelist
                    .iter()
                    .any(|pattern| whitelist_entry_matches(pattern, &query_name_key))
        })
        .copied()
        .collect();

    if !whitelist_matches.is_empty() {
        return Selection {
            endpoints: dedup(whitelist_matches.iter().map(|s| s.endpoint())),
            whitelist_matched: true,
        };
    }

    let global: Vec<&UpstreamServer> = candidates
        .iter()
        .filter(|s| s.domain_whitelist.is_empty())
        .copied()
        .collect();

    Selection {
        endpoints: dedup(global.iter().map(|s| s.endpoint())),
        whitelist_matched: false,
    }
}

fn dedup(iter: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for endpoint in iter {
        if seen.insert(endpoint.clone()) {
            out.push(endpoint);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(address: &str, active: bool, whitelist: &[&str]) -> UpstreamServer {
        UpstreamServer {
            address: address.to_string(),
            port: 53,
            active,
            local_resolver: false,
            adblocker: false,
            domain_whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
            last_used: None,
            last_success: None,
        }
    }

    #[test]
    fn whitelist_pins_to_matching_server_only() {
        let servers = vec![
            server("8.8.8.8", true, &[]),
            server("192.168.5.5", true, &["internal.example.com"]),
        ];
        let sel = select_servers(&servers, "api.internal.example.com");
        assert_eq!(sel.endpoints, vec!["192.168.5.5:53".to_string()]);
        assert!(sel.whitelist_matched);
    }

    #[test]
    fn no_whitelist_match_falls_back_to_global_servers() {
        let servers = vec![
            server("8.8.8.8", true, &[]),
            server("192.168.5.5", true, &["internal.example.com"]),
        ];
        let sel = select_servers(&servers, "example.org");
        assert_eq!(sel.endpoints, vec!["8.8.8.8:53".to_string()]);
        assert!(!sel.whitelist_matched);
    }

    #[test]
    fn inactive_servers_are_never_selected() {
        let servers = vec![server("8.8.8.8", false, &[])];
        let sel = select_servers(&servers, "example.org");
        assert!(sel.endpoints.is_empty());
    }

    #[test]
    fn dedups_identical_endpoints() {
        let servers = vec![server("8.8.8.8", true, &[]), server("8.8.8.8", true, &[])];
        let sel = select_servers(&servers, "example.org");
        assert_eq!(sel.endpoints, vec!["8.8.8.8:53".to_string()]);
    }

    #[test]
    fn whitelist_entry_is_dot_aligned() {
        let servers = vec![server("192.168.5.5", true, &["internal.example.com"])];
        let sel = select_servers(&servers, "notinternal.example.com");
        assert!(!sel.whitelist_matched);
        assert!(sel.endpoints.is_empty());
    }
}
