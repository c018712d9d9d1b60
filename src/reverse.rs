// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Reverse-mapping names.
//!
//! The PTR record for an address lives at the address's reverse name:
//! for IPv4, the octets in reverse order under `in-addr.arpa`
//! ([RFC 1035 § 3.5]); for IPv6, the nibbles in reverse order under
//! `ip6.arpa` ([RFC 3596 § 2.5]). In the directory, the record entry is
//! named relative to its reverse zone, so the zone's suffix is removed.
//!
//! [RFC 1035 § 3.5]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.5
//! [RFC 3596 § 2.5]: https://datatracker.ietf.org/doc/html/rfc3596#section-2.5

use std::fmt::Write;
use std::net::IpAddr;

use crate::util::nibble_to_ascii_hex_digit;

pub const IPV4_REVERSE_SUFFIX: &str = "in-addr.arpa";
pub const IPV6_REVERSE_SUFFIX: &str = "ip6.arpa";

/// Returns the fully qualified reverse name of `ip`, without a
/// trailing dot (e.g. `5.0.0.10.in-addr.arpa`).
pub fn reverse_name(ip: IpAddr) -> String {
    let mut name = String::new();
    match ip {
        IpAddr::V4(v4) => {
            for octet in v4.octets().iter().rev() {
                write!(name, "{}.", octet).unwrap();
            }
            name.push_str(IPV4_REVERSE_SUFFIX);
        }
        IpAddr::V6(v6) => {
            for octet in v6.octets().iter().rev() {
                name.push(nibble_to_ascii_hex_digit(octet & 0xf));
                name.push('.');
                name.push(nibble_to_ascii_hex_digit(octet >> 4));
                name.push('.');
            }
            name.push_str(IPV6_REVERSE_SUFFIX);
        }
    }
    name
}

/// Returns the name of the PTR record for `ip` relative to
/// `reverse_zone`, e.g. `5.0` for `10.0.0.5` in `0.10.in-addr.arpa`.
///
/// Returns `None` if the reverse name of `ip` is not strictly below
/// `reverse_zone`. That happens when the reverse-zone configuration
/// assigns an address to a zone that cannot hold its PTR record.
pub fn pointer_name(ip: IpAddr, reverse_zone: &str) -> Option<String> {
    let full = reverse_name(ip);
    let zone = reverse_zone.trim_end_matches('.');
    if full.len() <= zone.len() + 1 {
        return None;
    }
    let (relative, suffix) = full.split_at(full.len() - zone.len() - 1);
    if suffix[1..].eq_ignore_ascii_case(zone) && suffix.starts_with('.') {
        Some(relative.to_owned())
    } else {
        None
    }
}

/// Returns whether `zone` is a reverse-mapping zone.
pub fn is_reverse_zone(zone: &str) -> bool {
    let zone = zone.trim_end_matches('.').to_ascii_lowercase();
    zone.ends_with(&format!(".{}", IPV4_REVERSE_SUFFIX))
        || zone.ends_with(&format!(".{}", IPV6_REVERSE_SUFFIX))
        || zone == IPV4_REVERSE_SUFFIX
        || zone == IPV6_REVERSE_SUFFIX
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn reverse_name_works() {
        assert_eq!(reverse_name(ip("10.0.0.5")), "5.0.0.10.in-addr.arpa");
        assert_eq!(
            reverse_name(ip("2001:db8::567:89ab")),
            "b.a.9.8.7.6.5.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa",
        );
    }

    #[test]
    fn pointer_name_strips_the_zone() {
        assert_eq!(
            pointer_name(ip("10.0.0.5"), "10.in-addr.arpa").as_deref(),
            Some("5.0.0"),
        );
        assert_eq!(
            pointer_name(ip("10.0.0.5"), "0.0.10.IN-ADDR.ARPA.").as_deref(),
            Some("5"),
        );
        assert_eq!(
            pointer_name(ip("2001:db8::1"), "8.b.d.0.1.0.0.2.ip6.arpa").as_deref(),
            Some("1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0"),
        );
    }

    #[test]
    fn pointer_name_rejects_foreign_zones() {
        assert_eq!(pointer_name(ip("10.0.0.5"), "11.in-addr.arpa"), None);
        assert_eq!(pointer_name(ip("10.0.0.5"), "1.10.in-addr.arpa"), None);
        assert_eq!(pointer_name(ip("10.0.0.5"), "5.0.0.10.in-addr.arpa"), None);
        assert_eq!(pointer_name(ip("10.0.0.5"), "10.in-addr.arpa.example"), None);
    }

    #[test]
    fn is_reverse_zone_works() {
        assert!(is_reverse_zone("10.in-addr.arpa"));
        assert!(is_reverse_zone("8.b.d.0.1.0.0.2.ip6.arpa."));
        assert!(!is_reverse_zone("example.com"));
        assert!(!is_reverse_zone("notin-addr.arpa"));
    }
}
