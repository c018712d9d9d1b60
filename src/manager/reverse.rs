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

//! Keeping PTR records consistent with forward data.

use std::net::IpAddr;

use log::{debug, info};
use serde::Serialize;

use super::{ptr_target, Manager, DNS_TTL, PTR_RECORD};
use crate::directory::{Directory, Modification, Scope};
use crate::error::Error;
use crate::reverse::pointer_name;
use crate::util::Caseless;

/// The PTR data of an address.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ReverseData {
    /// The PTR targets. The attribute is multi-valued in the
    /// directory, but only the first target counts for ownership.
    pub targets: Vec<String>,

    pub ttl: Option<u32>,
}

impl ReverseData {
    /// Returns the target that determines ownership, if any.
    pub fn target(&self) -> Option<&str> {
        self.targets.first().map(String::as_str)
    }
}

impl<D: Directory> Manager<D> {
    /// Finds the configured reverse zone whose networks contain `ip`.
    pub fn resolve_reverse_zone(&self, ip: IpAddr) -> Option<&str> {
        self.policy.reverse_zone_for(ip)
    }

    /// Returns the reverse zone of `ip` and the name of its PTR record
    /// within that zone.
    fn locate_pointer(&self, ip: IpAddr) -> Option<(String, String)> {
        let reverse_zone = self.resolve_reverse_zone(ip)?;
        let ptr = pointer_name(ip, reverse_zone)?;
        Some((reverse_zone.to_owned(), ptr))
    }

    /// Looks up the PTR record of `ip`. An address outside the reverse
    /// zones, a missing record, and a failed lookup all produce empty
    /// data.
    pub fn get_reverse(&mut self, ip: IpAddr) -> ReverseData {
        let (reverse_zone, ptr) = match self.locate_pointer(ip) {
            Some(located) => located,
            None => return ReverseData::default(),
        };
        let dn = self.record_dn(&reverse_zone, &ptr);
        match self
            .directory
            .search(&dn, Scope::Base, "(objectClass=*)", &[PTR_RECORD, DNS_TTL])
        {
            Ok(entries) => entries
                .first()
                .map(|entry| ReverseData {
                    targets: entry.get(PTR_RECORD).to_vec(),
                    ttl: super::parse_ttl(entry),
                })
                .unwrap_or_default(),
            Err(e) => {
                debug!("No reverse data for {}: {}", ip, e);
                ReverseData::default()
            }
        }
    }

    /// Returns whether `host` in `zone` owns the PTR record of `ip`.
    pub fn owns_reverse(&mut self, zone: &str, host: &str, ip: IpAddr) -> bool {
        let target = ptr_target(zone, host);
        self.get_reverse(ip)
            .target()
            .map_or(false, |t| Caseless(t) == Caseless(&target))
    }

    /// Points the PTR record of `ip` at `host` in `zone`, creating the
    /// record (and its reverse zone) if necessary. The record takes the
    /// host's TTL.
    ///
    /// The address must lie within a configured reverse zone and within
    /// the managed networks of `zone`. If the PTR record already points
    /// at this host, nothing changes. If it points elsewhere, the call
    /// fails with [`Error::AlreadyExists`] unless `replace` is set, in
    /// which case the existing record is deleted first.
    pub fn create_reverse(
        &mut self,
        ip: IpAddr,
        zone: &str,
        host: &str,
        replace: bool,
    ) -> Result<(), Error> {
        let not_managed = || {
            Error::NotAllowed(format!(
                "Reverse zones for {} are not managed by this host",
                ip
            ))
        };
        let (reverse_zone, ptr) = self.locate_pointer(ip).ok_or_else(not_managed)?;
        self.check_reverse_allowed(zone, ip)?;

        let target = ptr_target(zone, host);
        if let Some(existing) = self.get_reverse(ip).target() {
            if Caseless(existing) == Caseless(&target) {
                return Ok(());
            }
            if !replace {
                return Err(Error::AlreadyExists(format!(
                    "Address {} already has a reverse record ({})",
                    ip, existing
                )));
            }
        }

        let data = self.get_host(zone, host)?;
        if replace {
            self.delete_reverse(zone, ip)?;
        }
        self.ensure_zone(&reverse_zone)?;
        if !self.host_exists(&reverse_zone, &ptr) {
            self.create_record(&reverse_zone, &ptr, data.ttl)?;
        }
        let dn = self.record_dn(&reverse_zone, &ptr);
        self.directory
            .modify(
                &dn,
                vec![Modification::Add(PTR_RECORD.to_owned(), vec![target.clone()])],
            )
            .map_err(|e| {
                Error::from(e).reword(|| format!("PTR record for {} already exists", target))
            })?;
        info!("Pointed the PTR record of {} at {}.", ip, target);
        Ok(())
    }

    /// Deletes the PTR record of `ip`. The address must lie within the
    /// managed networks of `zone`; beyond that, the deletion is best
    /// effort, and directory failures (including a missing record) are
    /// ignored.
    pub fn delete_reverse(&mut self, zone: &str, ip: IpAddr) -> Result<(), Error> {
        self.check_reverse_allowed(zone, ip)?;
        let (reverse_zone, ptr) = match self.locate_pointer(ip) {
            Some(located) => located,
            None => return Ok(()),
        };
        let dn = self.record_dn(&reverse_zone, &ptr);
        match self.directory.delete(&dn) {
            Ok(()) => info!("Deleted the PTR record of {}.", ip),
            Err(e) => debug!("Ignoring failure to delete the PTR record of {}: {}", ip, e),
        }
        Ok(())
    }

    /// Sets the TTL of the PTR record of `ip`.
    pub(super) fn set_reverse_ttl(&mut self, ip: IpAddr, ttl: u32) -> Result<(), Error> {
        let (reverse_zone, ptr) = match self.locate_pointer(ip) {
            Some(located) => located,
            None => return Ok(()),
        };
        let dn = self.record_dn(&reverse_zone, &ptr);
        self.directory
            .modify(
                &dn,
                vec![Modification::Replace(DNS_TTL.to_owned(), vec![ttl.to_string()])],
            )
            .map_err(Error::from)?;
        debug!("Set the TTL of the PTR record of {} to {}.", ip, ttl);
        Ok(())
    }

    fn check_reverse_allowed(&self, zone: &str, ip: IpAddr) -> Result<(), Error> {
        if self.policy.reverse_allowed(zone, ip) {
            Ok(())
        } else {
            Err(Error::NotAllowed(format!(
                "Reverse records for {} are not allowed for this zone",
                ip
            )))
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
