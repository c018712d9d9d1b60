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

//! The authorization filter applied to every request.
//!
//! The first segment of a request path names the zone the request
//! concerns. Before a request reaches the [`Manager`], the zone must be
//! one of the managed zones of the [`Policy`], and the client's address
//! must lie in one of that zone's source networks. Paths without a zone
//! segment (the zone listing at `/`) are let through.
//!
//! [`Manager`]: crate::manager::Manager

use std::fmt;
use std::net::IpAddr;

use crate::error::Error;
use crate::name;
use crate::policy::Policy;

/// The reason a request was refused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Denial {
    /// The zone is not among the managed zones.
    ZoneNotManaged(String),

    /// The client's address is outside the zone's source networks.
    SourceNotPermitted { zone: String, source: IpAddr },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ZoneNotManaged(zone) => write!(f, "Zone {} is not managed by this host", zone),
            Self::SourceNotPermitted { source, .. } => {
                write!(f, "IP {} is not allowed to manage this zone", source)
            }
        }
    }
}

impl std::error::Error for Denial {}

impl From<Denial> for Error {
    fn from(denial: Denial) -> Self {
        Self::NotAllowed(denial.to_string())
    }
}

/// Checks a request for `path` from `source` against `policy`.
///
/// On success, returns the zone named by the path, or [`None`] if the
/// path names no zone. `path` is the raw (still percent-encoded) path;
/// a first segment that is not entirely a zone name, such as
/// `/example.com%2e`, is refused, since the router would decode it to
/// a zone other than the one checked. IPv4-mapped IPv6 sources are
/// treated as the IPv4 addresses they map.
pub fn authorize<'a>(
    policy: &Policy,
    path: &'a str,
    source: IpAddr,
) -> Result<Option<&'a str>, Denial> {
    let segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
    if segment.is_empty() {
        return Ok(None);
    }
    let zone = match name::zone_segment(path) {
        Some(zone) if zone == segment => zone,
        _ => return Err(Denial::ZoneNotManaged(segment.to_owned())),
    };
    if !policy.is_managed(zone) {
        return Err(Denial::ZoneNotManaged(zone.to_owned()));
    }
    let source = source.to_canonical();
    if !policy.source_allowed(zone, source) {
        return Err(Denial::SourceNotPermitted {
            zone: zone.to_owned(),
            source,
        });
    }
    Ok(Some(zone))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn paths_without_a_zone_pass() {
        let policy = testing::policy();
        assert_eq!(authorize(&policy, "/", ip("203.0.113.1")), Ok(None));
        assert_eq!(authorize(&policy, "", ip("203.0.113.1")), Ok(None));
    }

    #[test]
    fn managed_zones_pass_from_source_networks() {
        let policy = testing::policy();
        assert_eq!(
            authorize(&policy, "/example.com/web1/ipaddress", ip("192.0.2.7")),
            Ok(Some("example.com")),
        );
        assert_eq!(
            authorize(&policy, "/EXAMPLE.net", ip("2001:db8:ffff::1")),
            Ok(Some("EXAMPLE.net")),
        );
        assert_eq!(
            authorize(&policy, "/example.org/", ip("::ffff:192.0.2.200")),
            Ok(Some("example.org")),
        );
    }

    #[test]
    fn unmanaged_zones_are_denied() {
        let policy = testing::policy();
        let denial = authorize(&policy, "/example.edu/web1", ip("192.0.2.7")).unwrap_err();
        assert_eq!(denial, Denial::ZoneNotManaged("example.edu".into()));
        assert_eq!(
            Error::from(denial),
            Error::NotAllowed("Zone example.edu is not managed by this host".into()),
        );
    }

    #[test]
    fn encoded_zone_segments_are_denied() {
        let policy = testing::policy();
        assert_eq!(
            authorize(&policy, "/example.com%2e/web1", ip("192.0.2.7")),
            Err(Denial::ZoneNotManaged("example.com%2e".into())),
        );
        assert!(authorize(&policy, "//example.com", ip("192.0.2.7")).is_err());
    }

    #[test]
    fn foreign_sources_are_denied() {
        let policy = testing::policy();
        let denial = authorize(&policy, "/example.com", ip("198.51.100.1")).unwrap_err();
        assert_eq!(
            denial.to_string(),
            "IP 198.51.100.1 is not allowed to manage this zone",
        );
        assert!(matches!(
            authorize(&policy, "/example.com", ip("2001:db8::1")),
            Err(Denial::SourceNotPermitted { .. })
        ));
    }
}
