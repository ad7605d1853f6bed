//! Canonicalisation rules for the names, types, and values the resolver
//! compares and stores with. These are pure functions: given the same
//! input they always produce the same output, so callers never need to
//! hold a lock to use them.

/// Trim whitespace and strip all trailing dots. Case is preserved,
/// so the result is suitable for storage and display.
pub fn canonicalize_name(s: &str) -> String {
    s.trim().trim_end_matches('.').to_string()
}

/// `canonicalize_name` followed by lowercasing, for use as a comparison
/// key. Idempotent: `name_key(name_key(s)) == name_key(s)`.
pub fn name_key(s: &str) -> String {
    canonicalize_name(s).to_lowercase()
}

/// Trim and uppercase an RR type string, e.g. `" a "` -> `"A"`.
pub fn record_type_key(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Canonicalise a record value for comparison, according to its RR
/// type: `A`/`AAAA` values are lowercased (IPv6 literals are
/// case-insensitive), name-valued types (`CNAME`/`NS`/`PTR`) use
/// `name_key`, everything else is just trimmed.
pub fn value_key(rtype: &str, v: &str) -> String {
    let trimmed = v.trim();
    match record_type_key(rtype).as_str() {
        "A" | "AAAA" => trimmed.to_lowercase(),
        "CNAME" | "NS" | "PTR" => name_key(trimmed),
        _ => trimmed.to_string(),
    }
}

/// Build the `in-addr.arpa` reverse-DNS name for an IPv4 literal, e.g.
/// `"10.0.0.5"` -> `"5.0.0.10.in-addr.arpa"`. Returns `None` if `s` is
/// not exactly four decimal octets.
pub fn reverse_ip(s: &str) -> Option<String> {
    let octets = parse_ipv4_octets(s)?;
    Some(format!(
        "{}.{}.{}.{}.in-addr.arpa",
        octets[3], octets[2], octets[1], octets[0]
    ))
}

/// Inverse of `reverse_ip`: given a reverse-DNS name (or a name with at
/// least four leading numeric labels), recover the dotted-quad. Returns
/// `None` if the first four labels are not all valid octets.
pub fn reverse_to_ip(s: &str) -> Option<String> {
    let canonical = canonicalize_name(s);
    let labels: Vec<&str> = canonical.split('.').collect();
    if labels.len() < 4 {
        return None;
    }
    let mut octets = [0u8; 4];
    for (i, label) in labels[..4].iter().enumerate() {
        octets[i] = label.parse::<u8>().ok()?;
    }
    Some(format!(
        "{}.{}.{}.{}",
        octets[3], octets[2], octets[1], octets[0]
    ))
}

fn parse_ipv4_octets(s: &str) -> Option<[u8; 4]> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut octets = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        octets[i] = part.parse::<u8>().ok()?;
    }
    Some(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_name_trims_and_strips_dot() {
        assert_eq!(canonicalize_name("  Example.Com. "), "Example.Com");
        assert_eq!(canonicalize_name("example.com"), "example.com");
    }

    #[test]
    fn canonicalize_name_strips_all_trailing_dots() {
        assert_eq!(canonicalize_name("example.com.."), "example.com");
        assert_eq!(canonicalize_name("example.com..."), "example.com");
    }

    #[test]
    fn name_key_idempotent() {
        for s in ["Example.COM.", "  foo.bar  ", "baz"] {
            let once = name_key(s);
            assert_eq!(name_key(&once), once);
        }
    }

    #[test]
    fn value_key_idempotent() {
        for (t, v) in [("A", "  10.0.0.1 "), ("CNAME", "Target.Example.com."), ("TXT", " hello ")] {
            let once = value_key(t, v);
            assert_eq!(value_key(t, &once), once);
        }
    }

    #[test]
    fn value_key_lowercases_addresses() {
        assert_eq!(value_key("AAAA", "FE80::1"), "fe80::1");
    }

    #[test]
    fn value_key_name_keys_cname() {
        assert_eq!(value_key("cname", "Target.Example.com."), "target.example.com");
    }

    #[test]
    fn reverse_ip_roundtrip() {
        for ip in ["10.0.0.5", "1.2.3.4", "255.255.255.0"] {
            let reversed = reverse_ip(ip).unwrap();
            assert_eq!(reverse_to_ip(&reversed).unwrap(), ip);
        }
    }

    #[test]
    fn reverse_ip_form() {
        assert_eq!(reverse_ip("10.0.0.5").unwrap(), "5.0.0.10.in-addr.arpa");
    }

    #[test]
    fn reverse_ip_rejects_malformed() {
        assert_eq!(reverse_ip("10.0.0"), None);
        assert_eq!(reverse_ip("not.an.ip.addr"), None);
    }

    #[test]
    fn reverse_to_ip_rejects_short_names() {
        assert_eq!(reverse_to_ip("foo.bar"), None);
    }
}
