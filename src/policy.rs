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

//! The authorization and reverse-zone tables.
//!
//! A [`Policy`] is built once at startup from configuration and never
//! changes afterwards. It answers three questions: may this zone be
//! managed at all, may this client manage it, and which reverse zone
//! (if any) holds the PTR record for an address.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::reverse::{IPV4_REVERSE_SUFFIX, IPV6_REVERSE_SUFFIX};

////////////////////////////////////////////////////////////////////////
// NETWORKS                                                           //
////////////////////////////////////////////////////////////////////////

/// An IP network. Parses from CIDR notation (`10.0.0.0/8`) or from a
/// bare address, which denotes a single-host network. Host bits below
/// the prefix are cleared, so `10.1.2.3/8` is `10.0.0.0/8`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Network(IpNet);

impl Network {
    /// Returns whether `ip` lies within the network. Addresses of the
    /// other family never do.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }

    /// Returns the prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Returns whether this is an IPv4 network.
    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }
}

impl From<IpNet> for Network {
    fn from(net: IpNet) -> Self {
        Self(net.trunc())
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') {
            s.parse::<IpNet>()
                .map(Self::from)
                .map_err(|_| NetworkParseError(s.to_owned()))
        } else {
            let ip: IpAddr = s.parse().map_err(|_| NetworkParseError(s.to_owned()))?;
            let prefix_len = if ip.is_ipv4() { 32 } else { 128 };
            IpNet::new(ip, prefix_len)
                .map(Self)
                .map_err(|_| NetworkParseError(s.to_owned()))
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An error signaling that a string is not a network or address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkParseError(String);

impl fmt::Display for NetworkParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} is not an IP network or address", self.0)
    }
}

impl std::error::Error for NetworkParseError {}

////////////////////////////////////////////////////////////////////////
// ZONE TABLES                                                        //
////////////////////////////////////////////////////////////////////////

/// A forward zone that clients may manage.
#[derive(Clone, Debug)]
pub struct ManagedZone {
    pub name: String,

    /// The client addresses allowed to make requests for the zone.
    pub source_networks: Vec<Network>,

    /// The addresses for which hosts in the zone may own PTR records.
    pub managed_networks: Vec<Network>,
}

/// A reverse zone and the networks whose PTR records it holds.
#[derive(Clone, Debug)]
pub struct ReverseZone {
    pub name: String,
    pub networks: Vec<Network>,
}

/// The immutable authorization and reverse-zone tables.
#[derive(Clone, Debug, Default)]
pub struct Policy {
    managed: HashMap<String, ManagedZone>,
    reverse: Vec<ReverseZone>,
}

impl Policy {
    /// Builds a `Policy`, checking the tables for consistency. Zone
    /// names are matched case-insensitively, so two managed zones
    /// differing only in case are duplicates.
    pub fn new(managed: Vec<ManagedZone>, reverse: Vec<ReverseZone>) -> Result<Self, PolicyError> {
        let mut managed_map = HashMap::with_capacity(managed.len());
        for zone in managed {
            let key = zone.name.to_ascii_lowercase();
            if managed_map.contains_key(&key) {
                return Err(PolicyError::DuplicateZone(zone.name));
            }
            managed_map.insert(key, zone);
        }

        for (i, zone) in reverse.iter().enumerate() {
            if reverse[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&zone.name))
            {
                return Err(PolicyError::DuplicateZone(zone.name.clone()));
            }
            let lowercase = zone.name.to_ascii_lowercase();
            let ipv4 = if lowercase.ends_with(IPV4_REVERSE_SUFFIX) {
                true
            } else if lowercase.ends_with(IPV6_REVERSE_SUFFIX) {
                false
            } else {
                return Err(PolicyError::NotAReverseZone(zone.name.clone()));
            };
            if let Some(network) = zone.networks.iter().find(|n| n.is_ipv4() != ipv4) {
                return Err(PolicyError::FamilyMismatch(zone.name.clone(), *network));
            }
        }

        Ok(Self {
            managed: managed_map,
            reverse,
        })
    }

    /// Returns the managed zone named `zone`, if there is one.
    pub fn managed_zone(&self, zone: &str) -> Option<&ManagedZone> {
        self.managed.get(&zone.to_ascii_lowercase())
    }

    /// Returns whether `zone` may be managed.
    pub fn is_managed(&self, zone: &str) -> bool {
        self.managed_zone(zone).is_some()
    }

    /// Returns whether a client at `source` may manage `zone`. This is
    /// false for zones that are not managed at all.
    pub fn source_allowed(&self, zone: &str, source: IpAddr) -> bool {
        self.managed_zone(zone)
            .map_or(false, |z| z.source_networks.iter().any(|n| n.contains(source)))
    }

    /// Returns whether hosts in `zone` may own the PTR record of `ip`.
    pub fn reverse_allowed(&self, zone: &str, ip: IpAddr) -> bool {
        self.managed_zone(zone)
            .map_or(false, |z| z.managed_networks.iter().any(|n| n.contains(ip)))
    }

    /// Finds the reverse zone holding the PTR record of `ip`. When the
    /// networks of several reverse zones contain the address, the zone
    /// with the longest matching prefix wins; ties go to the zone
    /// configured first.
    pub fn reverse_zone_for(&self, ip: IpAddr) -> Option<&str> {
        let mut best: Option<(&ReverseZone, u8)> = None;
        for zone in &self.reverse {
            for network in zone.networks.iter().filter(|n| n.contains(ip)) {
                if best.map_or(true, |(_, len)| network.prefix_len() > len) {
                    best = Some((zone, network.prefix_len()));
                }
            }
        }
        best.map(|(zone, _)| zone.name.as_str())
    }
}

/// Errors that arise when building a [`Policy`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PolicyError {
    DuplicateZone(String),
    NotAReverseZone(String),
    FamilyMismatch(String, Network),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DuplicateZone(name) => write!(f, "zone {} is configured more than once", name),
            Self::NotAReverseZone(name) => write!(
                f,
                "reverse zone {} does not end in {} or {}",
                name, IPV4_REVERSE_SUFFIX, IPV6_REVERSE_SUFFIX,
            ),
            Self::FamilyMismatch(name, network) => write!(
                f,
                "network {} belongs to the wrong address family for reverse zone {}",
                network, name,
            ),
        }
    }
}

impl std::error::Error for PolicyError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(specs: &[&str]) -> Vec<Network> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn policy() -> Policy {
        Policy::new(
            vec![ManagedZone {
                name: "example.com".into(),
                source_networks: nets(&["192.0.2.0/24", "2001:db8::1"]),
                managed_networks: nets(&["10.1.0.0/16"]),
            }],
            vec![
                ReverseZone {
                    name: "10.in-addr.arpa".into(),
                    networks: nets(&["10.0.0.0/8"]),
                },
                ReverseZone {
                    name: "1.10.in-addr.arpa".into(),
                    networks: nets(&["10.1.0.0/16"]),
                },
                ReverseZone {
                    name: "8.b.d.0.1.0.0.2.ip6.arpa".into(),
                    networks: nets(&["2001:db8::/32"]),
                },
            ],
        )
        .unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn network_parsing_works() {
        let network: Network = "10.1.2.3/8".parse().unwrap();
        assert_eq!(network.to_string(), "10.0.0.0/8");
        let host: Network = "192.0.2.7".parse().unwrap();
        assert_eq!(host.to_string(), "192.0.2.7/32");
        assert!(host.contains(ip("192.0.2.7")));
        assert!(!host.contains(ip("192.0.2.8")));
        assert!("10.0.0.0/33".parse::<Network>().is_err());
        assert!("example.com".parse::<Network>().is_err());
    }

    #[test]
    fn source_checks_work() {
        let policy = policy();
        assert!(policy.is_managed("example.com"));
        assert!(policy.is_managed("EXAMPLE.com"));
        assert!(!policy.is_managed("example.org"));
        assert!(policy.source_allowed("example.com", ip("192.0.2.55")));
        assert!(policy.source_allowed("example.com", ip("2001:db8::1")));
        assert!(!policy.source_allowed("example.com", ip("198.51.100.1")));
        assert!(!policy.source_allowed("example.org", ip("192.0.2.55")));
    }

    #[test]
    fn reverse_checks_work() {
        let policy = policy();
        assert!(policy.reverse_allowed("example.com", ip("10.1.0.5")));
        assert!(!policy.reverse_allowed("example.com", ip("10.2.0.5")));
        assert_eq!(policy.reverse_zone_for(ip("10.1.0.5")), Some("1.10.in-addr.arpa"));
        assert_eq!(policy.reverse_zone_for(ip("10.2.0.5")), Some("10.in-addr.arpa"));
        assert_eq!(
            policy.reverse_zone_for(ip("2001:db8::5")),
            Some("8.b.d.0.1.0.0.2.ip6.arpa"),
        );
        assert_eq!(policy.reverse_zone_for(ip("172.16.0.1")), None);
    }

    #[test]
    fn inconsistent_tables_are_rejected() {
        let duplicate = Policy::new(
            vec![
                ManagedZone {
                    name: "example.com".into(),
                    source_networks: vec![],
                    managed_networks: vec![],
                },
                ManagedZone {
                    name: "Example.COM".into(),
                    source_networks: vec![],
                    managed_networks: vec![],
                },
            ],
            vec![],
        );
        assert_eq!(
            duplicate.unwrap_err(),
            PolicyError::DuplicateZone("Example.COM".into()),
        );

        let not_reverse = Policy::new(
            vec![],
            vec![ReverseZone {
                name: "example.com".into(),
                networks: nets(&["10.0.0.0/8"]),
            }],
        );
        assert!(matches!(not_reverse, Err(PolicyError::NotAReverseZone(_))));

        let mismatch = Policy::new(
            vec![],
            vec![ReverseZone {
                name: "10.in-addr.arpa".into(),
                networks: nets(&["2001:db8::/32"]),
            }],
        );
        assert!(matches!(mismatch, Err(PolicyError::FamilyMismatch(_, _))));
    }
}
