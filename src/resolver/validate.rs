// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Host name validation, applied before anything touches cache or network.

use crate::rr::RecordType;

/// The longest dotted name accepted, per RFC 1035 section 2.3.4
const MAX_NAME_LEN: usize = 253;

/// Validates a host name for the lookup type.
///
/// Enforced: non-empty, at most 253 octets, hostname charset (alphanumeric,
/// `-`, `_`, `.`), no empty labels, labels of at most 63 octets with hyphens
/// not at the edges, at least two labels when `must_have_dots`, and the
/// `_service._proto.name` shape for SRV lookups. A single trailing dot is
/// accepted as the root.
///
/// Returns the reason on failure; the caller turns it into a `BadName`
/// answer without touching the network.
pub(crate) fn validate_host_name(
    host: &str,
    rtype: RecordType,
    must_have_dots: bool,
) -> Result<(), &'static str> {
    if host.is_empty() {
        return Err("empty name");
    }

    let trimmed = host.strip_suffix('.').unwrap_or(host);
    if trimmed.is_empty() {
        return Err("root is not a host name");
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err("name too long");
    }

    let mut labels = 0usize;
    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err("empty label");
        }
        if label.len() > 63 {
            return Err("label too long");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("hyphen at label edge");
        }
        for c in label.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                return Err("illegal character");
            }
        }
        labels += 1;
    }

    if must_have_dots && labels < 2 {
        return Err("single label name");
    }

    if rtype == RecordType::SRV {
        let mut parts = trimmed.split('.');
        let service = parts.next().unwrap_or_default();
        let proto = parts.next().unwrap_or_default();
        if labels < 3 || !service.starts_with('_') || !proto.starts_with('_') {
            return Err("not a _service._proto.name");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(host: &str) -> bool {
        validate_host_name(host, RecordType::A, false).is_ok()
    }

    #[test]
    fn test_accepts_ordinary_names() {
        assert!(ok("example.com"));
        assert!(ok("example.com."));
        assert!(ok("www"));
        assert!(ok("a-b.example.com"));
        assert!(ok("under_score.example.com"));
        assert!(ok("xn--nxasmq6b.example"));
        assert!(ok("123.example.com"));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert_eq!(
            validate_host_name("", RecordType::A, false),
            Err("empty name")
        );
        assert_eq!(
            validate_host_name(".", RecordType::A, false),
            Err("root is not a host name")
        );
        assert_eq!(
            validate_host_name("a..b", RecordType::A, false),
            Err("empty label")
        );
        assert_eq!(
            validate_host_name(".example.com", RecordType::A, false),
            Err("empty label")
        );
        assert_eq!(
            validate_host_name("exa mple.com", RecordType::A, false),
            Err("illegal character")
        );
        assert_eq!(
            validate_host_name("bad!.example.com", RecordType::A, false),
            Err("illegal character")
        );
        assert_eq!(
            validate_host_name("-leading.example.com", RecordType::A, false),
            Err("hyphen at label edge")
        );
        assert_eq!(
            validate_host_name("trailing-.example.com", RecordType::A, false),
            Err("hyphen at label edge")
        );

        let long_label = format!("{}.example.com", "a".repeat(64));
        assert_eq!(
            validate_host_name(&long_label, RecordType::A, false),
            Err("label too long")
        );

        let long_name = ["a"; 128].join(".");
        assert!(long_name.len() > MAX_NAME_LEN);
        assert_eq!(
            validate_host_name(&long_name, RecordType::A, false),
            Err("name too long")
        );
    }

    #[test]
    fn test_must_have_dots() {
        assert!(validate_host_name("www", RecordType::A, true).is_err());
        assert!(validate_host_name("www.example.com", RecordType::A, true).is_ok());
    }

    #[test]
    fn test_srv_shape() {
        assert!(validate_host_name("_sip._tcp.example.com", RecordType::SRV, false).is_ok());
        assert!(validate_host_name("sip._tcp.example.com", RecordType::SRV, false).is_err());
        assert!(validate_host_name("_sip.tcp.example.com", RecordType::SRV, false).is_err());
        assert!(validate_host_name("_sip._tcp", RecordType::SRV, false).is_err());
        // the same name is fine for other lookup types
        assert!(validate_host_name("sip._tcp.example.com", RecordType::A, false).is_ok());
    }
}
