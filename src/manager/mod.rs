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

//! Translation of management operations into directory operations.
//!
//! The [`Manager`] structure is the heart of this module; see its
//! documentation for details.

use std::net::IpAddr;
use std::sync::Arc;

use ldap3::dn_escape;
use log::{debug, info};
use serde::Serialize;

use crate::directory::{Directory, Entry, Modification, Scope};
use crate::error::Error;
use crate::name;
use crate::policy::Policy;
use crate::reverse::is_reverse_zone;
use crate::util::Caseless;
use crate::zone::{self, ZoneDefaults};

mod reverse;

pub use reverse::ReverseData;

const IDNS_NAME: &str = "idnsName";
const A_RECORD: &str = "aRecord";
const AAAA_RECORD: &str = "aAAARecord";
const CNAME_RECORD: &str = "cNAMERecord";
const PTR_RECORD: &str = "pTRRecord";
const DNS_TTL: &str = "dNSTTL";

////////////////////////////////////////////////////////////////////////
// MANAGER PUBLIC API                                                 //
////////////////////////////////////////////////////////////////////////

/// Manages zones, hosts, and their records in a [`Directory`].
///
/// Every method is a short sequence of directory round trips, issued
/// one after another. Input is validated before the first mutation.
/// Operations that touch several entries (deleting a host with all of
/// its addresses, replacing a PTR record) are *not* transactional: if
/// a directory operation fails partway through, the steps already
/// taken remain in effect and the error is returned.
///
/// The `Manager` also keeps reverse (PTR) records consistent with the
/// forward data. A host *owns* the PTR record of an address when the
/// record's first target is the host's fully qualified name. Removing
/// an address from its owning host removes the PTR record too, and
/// changing a host's TTL carries over to the PTR records it owns. See
/// [`Manager::create_reverse`] for how ownership is established.
///
/// Authorization is not checked here except where reverse records are
/// concerned; callers are expected to have run the request through
/// [`authz`](crate::authz) first.
pub struct Manager<D> {
    directory: D,
    policy: Arc<Policy>,
    defaults: ZoneDefaults,
    base_dn: String,
}

/// The record data of a host.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct HostData {
    /// The host's addresses, A records first and then AAAA records.
    #[serde(rename = "ipaddress")]
    pub addresses: Vec<String>,

    #[serde(rename = "cname")]
    pub cnames: Vec<String>,

    /// The host's TTL override, if it has one.
    pub ttl: Option<u32>,
}

impl<D: Directory> Manager<D> {
    /// Creates a new `Manager`. Zones live directly below `base_dn`.
    pub fn new(
        directory: D,
        policy: Arc<Policy>,
        defaults: ZoneDefaults,
        base_dn: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            policy,
            defaults,
            base_dn: base_dn.into(),
        }
    }

    /// Returns the authorization and reverse-zone tables in use.
    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    /// Returns the underlying directory.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Lists the forward zones in the directory. Reverse zones are left
    /// out.
    pub fn list_zones(&mut self) -> Result<Vec<String>, Error> {
        let entries = self
            .directory
            .search(
                &self.base_dn,
                Scope::Subtree,
                "(objectClass=idnsZone)",
                &[IDNS_NAME],
            )
            .map_err(|e| Error::from(e).reword(|| "No zones found".to_owned()))?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.first(IDNS_NAME))
            .filter(|zone| !is_reverse_zone(zone))
            .map(str::to_owned)
            .collect())
    }

    /// Lists the names of the record entries in `zone`.
    pub fn list_hosts(&mut self, zone: &str) -> Result<Vec<String>, Error> {
        let dn = self.zone_dn(zone);
        let entries = self
            .directory
            .search(&dn, Scope::OneLevel, "(objectClass=idnsRecord)", &[IDNS_NAME])
            .map_err(|e| Error::from(e).reword(|| format!("No hosts found in zone {}", zone)))?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.first(IDNS_NAME))
            .map(str::to_owned)
            .collect())
    }

    /// Returns the record data of a host. A missing host is an error,
    /// not an empty result.
    pub fn get_host(&mut self, zone: &str, host: &str) -> Result<HostData, Error> {
        let not_found = || format!("Host {} not found in zone {}", host, zone);
        let dn = self.record_dn(zone, host);
        let entries = self
            .directory
            .search(
                &dn,
                Scope::Base,
                "(objectClass=*)",
                &[A_RECORD, AAAA_RECORD, CNAME_RECORD, DNS_TTL],
            )
            .map_err(|e| Error::from(e).reword(not_found))?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(not_found()))?;
        Ok(HostData {
            addresses: entry
                .get(A_RECORD)
                .iter()
                .chain(entry.get(AAAA_RECORD))
                .cloned()
                .collect(),
            cnames: entry.get(CNAME_RECORD).to_vec(),
            ttl: parse_ttl(&entry),
        })
    }

    /// Returns whether the host's entry exists. Any failure to look it
    /// up counts as absence.
    pub fn host_exists(&mut self, zone: &str, host: &str) -> bool {
        let dn = self.record_dn(zone, host);
        self.entry_exists(&dn)
    }

    /// Returns whether the zone's entry exists. Any failure to look it
    /// up counts as absence.
    pub fn zone_exists(&mut self, zone: &str) -> bool {
        let dn = self.zone_dn(zone);
        self.entry_exists(&dn)
    }

    /// Creates a host, creating its zone first if necessary.
    pub fn create_host(&mut self, zone: &str, host: &str, ttl: Option<u32>) -> Result<(), Error> {
        if !name::is_valid_host(host) {
            return Err(Error::InvalidInput(format!(
                "{} is not a valid RFC1123 hostname",
                host
            )));
        }
        self.ensure_zone(zone)?;
        self.create_record(zone, host, ttl)
            .map_err(|e| e.reword(|| format!("Host {} already exists in zone {}", host, zone)))?;
        info!("Created host {} in zone {}.", host, zone);
        Ok(())
    }

    /// Creates a host with [`Manager::create_host`] unless it already
    /// exists.
    pub fn ensure_host(&mut self, zone: &str, host: &str, ttl: Option<u32>) -> Result<(), Error> {
        if self.host_exists(zone, host) {
            Ok(())
        } else {
            self.create_host(zone, host, ttl)
        }
    }

    /// Adds an address to an existing host. IPv4 addresses become A
    /// records and IPv6 addresses AAAA records.
    pub fn add_address(&mut self, zone: &str, host: &str, ip: &str) -> Result<(), Error> {
        let addr = parse_address(ip)?;
        let dn = self.record_dn(zone, host);
        self.directory
            .modify(
                &dn,
                vec![Modification::Add(
                    address_attr(addr).to_owned(),
                    vec![addr.to_string()],
                )],
            )
            .map_err(|e| match Error::from(e) {
                e @ Error::AlreadyExists(_) => e.reword(|| {
                    format!("Host {} in zone {} already has ip {}", host, zone, ip)
                }),
                e => e.reword(|| format!("Host {} not found in zone {}", host, zone)),
            })?;
        info!("Added ip {} to host {} in zone {}.", addr, host, zone);
        Ok(())
    }

    /// Removes an address from a host. If the host owned the address's
    /// PTR record, the PTR record is deleted as well.
    pub fn remove_address(&mut self, zone: &str, host: &str, ip: &str) -> Result<(), Error> {
        let data = self.get_host(zone, host)?;
        let addr = parse_address(ip).ok();
        let stored = data
            .addresses
            .iter()
            .find(|a| same_address(a, ip, addr))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Host {} in zone {} does not have ip {}",
                    host, zone, ip
                ))
            })?;
        self.retire_address(zone, host, stored)
    }

    /// Returns whether a host has an address. Addresses are compared
    /// as parsed IPs where possible, so `2001:db8::1` matches
    /// `2001:0db8::0001`.
    pub fn host_has_address(&mut self, zone: &str, host: &str, ip: &str) -> Result<bool, Error> {
        let addr = parse_address(ip).ok();
        Ok(self
            .get_host(zone, host)?
            .addresses
            .iter()
            .any(|a| same_address(a, ip, addr)))
    }

    /// Adds a CNAME target to a host, creating the host first (with
    /// `ttl`) if necessary.
    pub fn add_cname(
        &mut self,
        zone: &str,
        host: &str,
        cname: &str,
        ttl: Option<u32>,
    ) -> Result<(), Error> {
        if !name::is_valid_target(cname) {
            return Err(Error::InvalidInput(format!(
                "{} is not a valid RFC1123 hostname",
                cname
            )));
        }
        self.ensure_host(zone, host, ttl)?;
        let dn = self.record_dn(zone, host);
        self.directory
            .modify(
                &dn,
                vec![Modification::Add(
                    CNAME_RECORD.to_owned(),
                    vec![cname.to_owned()],
                )],
            )
            .map_err(|e| {
                Error::from(e).reword(|| {
                    format!("Host {} in zone {} already has cname {}", host, zone, cname)
                })
            })?;
        info!("Added cname {} to host {} in zone {}.", cname, host, zone);
        Ok(())
    }

    /// Removes a CNAME target from a host.
    pub fn remove_cname(&mut self, zone: &str, host: &str, cname: &str) -> Result<(), Error> {
        let dn = self.record_dn(zone, host);
        self.directory
            .modify(
                &dn,
                vec![Modification::Delete(
                    CNAME_RECORD.to_owned(),
                    vec![cname.to_owned()],
                )],
            )
            .map_err(|e| {
                Error::from(e).reword(|| {
                    format!("Host {} in zone {} does not have cname {}", host, zone, cname)
                })
            })?;
        info!("Removed cname {} from host {} in zone {}.", cname, host, zone);
        Ok(())
    }

    /// Returns whether a host has a CNAME target.
    pub fn host_has_cname(&mut self, zone: &str, host: &str, cname: &str) -> Result<bool, Error> {
        Ok(self
            .get_host(zone, host)?
            .cnames
            .iter()
            .any(|c| Caseless(c) == Caseless(cname)))
    }

    /// Sets a host's TTL, and the TTL of every PTR record it owns.
    pub fn change_ttl(&mut self, zone: &str, host: &str, ttl: u32) -> Result<(), Error> {
        let data = self.get_host(zone, host)?;
        let dn = self.record_dn(zone, host);
        self.directory
            .modify(
                &dn,
                vec![Modification::Replace(
                    DNS_TTL.to_owned(),
                    vec![ttl.to_string()],
                )],
            )
            .map_err(|e| {
                Error::from(e).reword(|| format!("Host {} not found in zone {}", host, zone))
            })?;
        info!("Set the TTL of host {} in zone {} to {}.", host, zone, ttl);

        for addr in data.addresses.iter().filter_map(|a| a.parse::<IpAddr>().ok()) {
            if self.owns_reverse(zone, host, addr) {
                self.set_reverse_ttl(addr, ttl)?;
            }
        }
        Ok(())
    }

    /// Deletes a host. Each address is removed first, exactly as by
    /// [`Manager::remove_address`], so that owned PTR records go too.
    pub fn delete_host(&mut self, zone: &str, host: &str) -> Result<(), Error> {
        let data = self.get_host(zone, host)?;
        for stored in &data.addresses {
            self.retire_address(zone, host, stored)?;
        }
        let dn = self.record_dn(zone, host);
        self.directory.delete(&dn).map_err(|e| {
            Error::from(e).reword(|| format!("Host {} not found in zone {}", host, zone))
        })?;
        info!("Deleted host {} in zone {}.", host, zone);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// DIRECTORY HELPERS                                                  //
////////////////////////////////////////////////////////////////////////

impl<D: Directory> Manager<D> {
    fn zone_dn(&self, zone: &str) -> String {
        format!("{}={},{}", IDNS_NAME, dn_escape(zone), self.base_dn)
    }

    fn record_dn(&self, zone: &str, name: &str) -> String {
        format!(
            "{}={},{}={},{}",
            IDNS_NAME,
            dn_escape(name),
            IDNS_NAME,
            dn_escape(zone),
            self.base_dn,
        )
    }

    fn entry_exists(&mut self, dn: &str) -> bool {
        match self
            .directory
            .search(dn, Scope::Base, "(objectClass=*)", &[IDNS_NAME])
        {
            Ok(entries) => !entries.is_empty(),
            Err(e) => {
                debug!("Treating {} as absent: {}", dn, e);
                false
            }
        }
    }

    /// Creates a zone with the default SOA values unless it exists.
    fn ensure_zone(&mut self, zone: &str) -> Result<(), Error> {
        if self.zone_exists(zone) {
            return Ok(());
        }
        let dn = self.zone_dn(zone);
        match self
            .directory
            .add(&dn, zone::zone_attrs(zone, &self.defaults))
            .map_err(Error::from)
        {
            Ok(()) => {
                info!("Created zone {}.", zone);
                Ok(())
            }
            // Someone else got there first.
            Err(Error::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create_record(&mut self, zone: &str, name: &str, ttl: Option<u32>) -> Result<(), Error> {
        let dn = self.record_dn(zone, name);
        self.directory
            .add(&dn, zone::record_attrs(name, ttl))
            .map_err(Error::from)
    }

    /// Deletes a stored address value from a host and retires the
    /// address's PTR record if the host owns it.
    fn retire_address(&mut self, zone: &str, host: &str, stored: &str) -> Result<(), Error> {
        let addr = stored.parse::<IpAddr>().ok();
        let attr = addr.map_or(A_RECORD, address_attr);
        let dn = self.record_dn(zone, host);
        self.directory
            .modify(
                &dn,
                vec![Modification::Delete(attr.to_owned(), vec![stored.to_owned()])],
            )
            .map_err(|e| {
                Error::from(e).reword(|| {
                    format!("Host {} in zone {} does not have ip {}", host, zone, stored)
                })
            })?;
        info!("Removed ip {} from host {} in zone {}.", stored, host, zone);

        if let Some(addr) = addr {
            if self.owns_reverse(zone, host, addr) {
                self.delete_reverse(zone, addr)?;
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// VALUE HELPERS                                                      //
////////////////////////////////////////////////////////////////////////

/// Parses an address supplied by a client.
pub fn parse_address(ip: &str) -> Result<IpAddr, Error> {
    ip.parse()
        .map_err(|_| Error::InvalidInput(format!("{} is not a valid ip address", ip)))
}

/// Returns the attribute holding addresses of `addr`'s family.
fn address_attr(addr: IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => A_RECORD,
        IpAddr::V6(_) => AAAA_RECORD,
    }
}

/// Compares a stored address value with one supplied by a client.
fn same_address(stored: &str, given: &str, given_addr: Option<IpAddr>) -> bool {
    match (stored.parse::<IpAddr>(), given_addr) {
        (Ok(a), Some(b)) => a == b,
        _ => stored == given,
    }
}

/// Reads the `dNSTTL` attribute. Unparseable values are ignored.
fn parse_ttl(entry: &Entry) -> Option<u32> {
    entry.first(DNS_TTL).and_then(|ttl| ttl.trim().parse().ok())
}

/// The PTR target naming a host.
fn ptr_target(zone: &str, host: &str) -> String {
    format!("{}.{}.", host, zone.trim_end_matches('.'))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::testing::{self, BASE_DN};

    fn zone_dn(zone: &str) -> String {
        format!("idnsName={},{}", zone, BASE_DN)
    }

    #[test]
    fn create_host_creates_the_zone_with_defaults() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", None).unwrap();

        let zone = manager.directory().get(&zone_dn("example.com")).unwrap();
        assert_eq!(zone.first("idnsSOAserial"), Some("1"));
        assert_eq!(zone.first("idnsSOAmName"), Some("localhost."));
        assert_eq!(zone.first("idnsZoneActive"), Some("TRUE"));
        assert_eq!(zone.get("nSRecord"), ["ns1.example.com."]);
        assert_eq!(manager.list_zones().unwrap(), ["example.com"]);
        assert_eq!(manager.list_hosts("example.com").unwrap(), ["web1"]);
        assert_eq!(manager.get_host("example.com", "web1").unwrap(), HostData::default());
    }

    #[test]
    fn create_host_validates_before_touching_the_directory() {
        let mut manager = testing::manager();
        let before = manager.directory().clone();
        assert!(matches!(
            manager.create_host("example.com", "Bad_Host!", None),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(manager.directory(), &before);
    }

    #[test]
    fn create_host_twice_is_a_conflict() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", Some(300)).unwrap();
        assert!(matches!(
            manager.create_host("example.com", "web1", None),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(manager.get_host("example.com", "web1").unwrap().ttl, Some(300));
    }

    #[test]
    fn missing_hosts_and_zones_are_not_found() {
        let mut manager = testing::manager();
        assert_eq!(
            manager.get_host("example.com", "web1").unwrap_err(),
            Error::NotFound("Host web1 not found in zone example.com".into()),
        );
        assert_eq!(
            manager.list_hosts("example.com").unwrap_err(),
            Error::NotFound("No hosts found in zone example.com".into()),
        );
        assert!(manager.list_zones().unwrap().is_empty());
    }

    #[test]
    fn list_zones_hides_reverse_zones() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", None).unwrap();
        manager.add_address("example.com", "web1", "10.0.0.5").unwrap();
        manager
            .create_reverse("10.0.0.5".parse().unwrap(), "example.com", "web1", false)
            .unwrap();
        assert!(manager.zone_exists("10.in-addr.arpa"));
        assert_eq!(manager.list_zones().unwrap(), ["example.com"]);
    }

    #[test]
    fn addresses_round_trip() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", None).unwrap();
        manager.add_address("example.com", "web1", "10.0.0.5").unwrap();
        manager.add_address("example.com", "web1", "2001:db8::5").unwrap();

        let data = manager.get_host("example.com", "web1").unwrap();
        assert_eq!(data.addresses, ["10.0.0.5", "2001:db8::5"]);
        assert!(manager
            .host_has_address("example.com", "web1", "2001:0db8::0005")
            .unwrap());

        manager.remove_address("example.com", "web1", "10.0.0.5").unwrap();
        let data = manager.get_host("example.com", "web1").unwrap();
        assert_eq!(data.addresses, ["2001:db8::5"]);
        assert!(!manager.host_has_address("example.com", "web1", "10.0.0.5").unwrap());
    }

    #[test]
    fn duplicate_and_missing_addresses() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", None).unwrap();
        manager.add_address("example.com", "web1", "10.0.0.5").unwrap();
        assert_eq!(
            manager.add_address("example.com", "web1", "10.0.0.5").unwrap_err(),
            Error::AlreadyExists("Host web1 in zone example.com already has ip 10.0.0.5".into()),
        );
        assert_eq!(
            manager.remove_address("example.com", "web1", "10.0.0.6").unwrap_err(),
            Error::NotFound("Host web1 in zone example.com does not have ip 10.0.0.6".into()),
        );
        assert!(matches!(
            manager.add_address("example.com", "web1", "10.0.0.256"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            manager.add_address("example.com", "web2", "10.0.0.7"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn cnames_round_trip() {
        let mut manager = testing::manager();
        manager
            .add_cname("example.com", "www", "web1.example.com.", Some(60))
            .unwrap();
        assert!(manager.host_exists("example.com", "www"));
        assert_eq!(manager.get_host("example.com", "www").unwrap().ttl, Some(60));
        assert!(manager
            .host_has_cname("example.com", "www", "WEB1.example.com.")
            .unwrap());
        assert!(matches!(
            manager.add_cname("example.com", "www", "web1.example.com.", None),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            manager.add_cname("example.com", "www", "not a name", None),
            Err(Error::InvalidInput(_))
        ));

        manager
            .remove_cname("example.com", "www", "web1.example.com.")
            .unwrap();
        assert!(manager.get_host("example.com", "www").unwrap().cnames.is_empty());
        assert_eq!(
            manager
                .remove_cname("example.com", "www", "web1.example.com.")
                .unwrap_err(),
            Error::NotFound(
                "Host www in zone example.com does not have cname web1.example.com.".into()
            ),
        );
    }

    #[test]
    fn change_ttl_sets_and_replaces() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", None).unwrap();
        manager.change_ttl("example.com", "web1", 600).unwrap();
        assert_eq!(manager.get_host("example.com", "web1").unwrap().ttl, Some(600));
        manager.change_ttl("example.com", "web1", 60).unwrap();
        assert_eq!(manager.get_host("example.com", "web1").unwrap().ttl, Some(60));
        assert!(matches!(
            manager.change_ttl("example.com", "web2", 60),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn delete_host_removes_the_entry() {
        let mut manager = testing::manager();
        manager.create_host("example.com", "web1", None).unwrap();
        manager.add_address("example.com", "web1", "192.0.2.10").unwrap();
        manager
            .add_cname("example.com", "web1", "other.example.com.", None)
            .unwrap();
        manager.delete_host("example.com", "web1").unwrap();
        assert!(!manager.host_exists("example.com", "web1"));
        assert!(manager.zone_exists("example.com"));
        assert!(matches!(
            manager.delete_host("example.com", "web1"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn delete_host_is_not_atomic() {
        let mut manager = testing::manager_with(testing::FailingDeletes(MemoryDirectory::new(
            BASE_DN,
        )));
        manager.create_host("example.com", "web1", None).unwrap();
        manager.add_address("example.com", "web1", "192.0.2.10").unwrap();
        manager.add_address("example.com", "web1", "192.0.2.11").unwrap();

        assert!(matches!(
            manager.delete_host("example.com", "web1"),
            Err(Error::Database(_))
        ));
        // The addresses went before the failure; the entry stayed.
        assert!(manager.host_exists("example.com", "web1"));
        assert!(manager
            .get_host("example.com", "web1")
            .unwrap()
            .addresses
            .is_empty());
    }

    #[test]
    fn host_data_serializes_with_api_field_names() {
        let data = HostData {
            addresses: vec!["10.0.0.5".into()],
            cnames: vec![],
            ttl: None,
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            serde_json::json!({"ipaddress": ["10.0.0.5"], "cname": [], "ttl": null}),
        );
    }
}
