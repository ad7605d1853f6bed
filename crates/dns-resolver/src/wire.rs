//! Conversion between the Local Store's/Cache Engine's text-based
//! `Record` representation and wire-form `ResourceRecord`s.
//!
//! This is the boundary the spec calls out in §4.4 and §7: a stored
//! record with a malformed value cannot be serialised, and that is a
//! `CacheConvertFailure`, not a panic.

use std::net::{Ipv4Addr, Ipv6Addr};

use dns_types::protocol::types::{DomainName, RecordClass, RecordType, RecordTypeWithData, ResourceRecord};

use crate::error::ResolveError;
use crate::store::Record;

/// Build a `ResourceRecord` from a stored (name, type, value, ttl)
/// tuple. `name` and `value` are taken as already-canonicalised text;
/// this only handles the wire-encoding, not §3's validation (that
/// happens at `Record::new` time).
pub fn to_resource_record(name: &str, rtype: &str, value: &str, ttl: u32) -> Result<ResourceRecord, ResolveError> {
    let owner = parse_domain(name)?;
    let rtype_with_data = match rtype {
        "A" => RecordTypeWithData::A {
            address: parse_ipv4(value)?,
        },
        "AAAA" => RecordTypeWithData::AAAA {
            address: parse_ipv6(value)?,
        },
        "CNAME" => RecordTypeWithData::CNAME {
            cname: parse_domain(value)?,
        },
        "NS" => RecordTypeWithData::NS {
            nsdname: parse_domain(value)?,
        },
        "PTR" => RecordTypeWithData::PTR {
            ptrdname: parse_domain(value)?,
        },
        "MX" => {
            let (preference, exchange) = value.split_once(' ').ok_or_else(|| {
                ResolveError::CacheConvertFailure(format!("malformed MX value: {value}"))
            })?;
            RecordTypeWithData::MX {
                preference: preference.trim().parse().map_err(|_| {
                    ResolveError::CacheConvertFailure(format!("malformed MX preference: {value}"))
                })?,
                exchange: parse_domain(exchange)?,
            }
        }
        "TXT" => RecordTypeWithData::TXT {
            octets: bytes::Bytes::copy_from_slice(value.as_bytes()),
        },
        other => {
            return Err(ResolveError::CacheConvertFailure(format!(
                "unsupported record type for wire conversion: {other}"
            )))
        }
    };
    Ok(ResourceRecord {
        name: owner,
        rtype_with_data,
        rclass: RecordClass::IN,
        ttl,
    })
}

fn parse_domain(s: &str) -> Result<DomainName, ResolveError> {
    DomainName::from_dotted_string(s)
        .ok_or_else(|| ResolveError::CacheConvertFailure(format!("not a valid domain name: {s}")))
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ResolveError> {
    s.parse()
        .map_err(|_| ResolveError::CacheConvertFailure(format!("not a valid IPv4 address: {s}")))
}

fn parse_ipv6(s: &str) -> Result<Ipv6Addr, ResolveError> {
    s.parse()
        .map_err(|_| ResolveError::CacheConvertFailure(format!("not a valid IPv6 address: {s}")))
}

/// Extract `(type, value)` back out of a wire `ResourceRecord`'s
/// rdata, for writing into the cache or local store.
pub fn from_resource_record(rr: &ResourceRecord) -> (String, String) {
    match &rr.rtype_with_data {
        RecordTypeWithData::A { address } => ("A".to_string(), address.to_string()),
        RecordTypeWithData::AAAA { address } => ("AAAA".to_string(), address.to_string()),
        RecordTypeWithData::CNAME { cname } => ("CNAME".to_string(), cname.to_dotted_string()),
        RecordTypeWithData::NS { nsdname } => ("NS".to_string(), nsdname.to_dotted_string()),
        RecordTypeWithData::PTR { ptrdname } => ("PTR".to_string(), ptrdname.to_dotted_string()),
        RecordTypeWithData::MX { preference, exchange } => {
            ("MX".to_string(), format!("{preference} {}", exchange.to_dotted_string()))
        }
        RecordTypeWithData::TXT { octets } => (
            "TXT".to_string(),
            String::from_utf8_lossy(octets).to_string(),
        ),
        other => (other.rtype().to_string(), String::new()),
    }
}

/// Build a cacheable `Record` from a wire answer, for Cache Engine
/// writeback. Bypasses `Record::new`'s validation: the value has
/// already round-tripped through a real wire RR, so it's valid by
/// construction.
pub fn record_for_cache(rr: &ResourceRecord) -> Record {
    let (rtype, value) = from_resource_record(rr);
    Record {
        name: rr.name.to_dotted_string(),
        rtype,
        value,
        ttl: rr.ttl,
        added_on: None,
        updated_on: None,
        last_query: None,
        mac: None,
        cache_record: true,
    }
}

/// Synthesize the blocked-domain answer for §4.5.4: `0.0.0.0` for A,
/// `::` for AAAA, TTL 300.
pub fn blocked_answer(owner: &DomainName, qtype: RecordType) -> Option<ResourceRecord> {
    let rtype_with_data = match qtype {
        RecordType::A => RecordTypeWithData::A {
            address: Ipv4Addr::UNSPECIFIED,
        },
        RecordType::AAAA => RecordTypeWithData::AAAA {
            address: Ipv6Addr::UNSPECIFIED,
        },
        _ => return None,
    };
    Some(ResourceRecord {
        name: owner.clone(),
        rtype_with_data,
        rclass: RecordClass::IN,
        ttl: 300,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let rr = to_resource_record("example.com", "A", "1.2.3.4", 60).unwrap();
        let (rtype, value) = from_resource_record(&rr);
        assert_eq!(rtype, "A");
        assert_eq!(value, "1.2.3.4");
    }

    #[test]
    fn round_trips_cname() {
        let rr = to_resource_record("www.example.com", "CNAME", "example.com", 60).unwrap();
        let (rtype, value) = from_resource_record(&rr);
        assert_eq!(rtype, "CNAME");
        assert_eq!(value, "example.com");
    }

    #[test]
    fn rejects_malformed_ip() {
        assert!(to_resource_record("example.com", "A", "not-an-ip", 60).is_err());
    }

    #[test]
    fn blocked_answer_a_is_unspecified() {
        let owner = DomainName::from_dotted_string("ads.example.com").unwrap();
        let rr = blocked_answer(&owner, RecordType::A).unwrap();
        assert_eq!(rr.ttl, 300);
        assert_eq!(
            rr.rtype_with_data,
            RecordTypeWithData::A {
                address: Ipv4Addr::UNSPECIFIED
            }
        );
    }

    #[test]
    fn blocked_answer_none_for_other_types() {
        let owner = DomainName::from_dotted_string("ads.example.com").unwrap();
        assert!(blocked_answer(&owner, RecordType::NS).is_none());
    }
}
