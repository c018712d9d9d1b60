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

//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::directory::{Directory, Entry, Error, MemoryDirectory, Modification, ResultCode, Scope};
use crate::manager::Manager;
use crate::policy::{ManagedZone, Network, Policy, ReverseZone};
use crate::zone::ZoneDefaults;

pub const BASE_DN: &str = "cn=dns,dc=example,dc=com";

fn nets(networks: &[&str]) -> Vec<Network> {
    networks.iter().map(|s| s.parse().unwrap()).collect()
}

/// `example.com` and `example.net` may be managed from 192.0.2.0/24
/// and may own PTR records in 10.0.0.0/16 and 2001:db8::/48.
/// `example.org` may be managed from the same network but owns no PTR
/// records. The reverse zones cover 10.0.0.0/8 and 2001:db8::/32.
pub fn policy() -> Policy {
    let managed = |name: &str, managed: &[&str]| ManagedZone {
        name: name.to_owned(),
        source_networks: nets(&["192.0.2.0/24", "2001:db8:ffff::/48"]),
        managed_networks: nets(managed),
    };
    Policy::new(
        vec![
            managed("example.com", &["10.0.0.0/16", "2001:db8::/48"]),
            managed("example.net", &["10.0.0.0/16"]),
            managed("example.org", &[]),
        ],
        vec![
            ReverseZone {
                name: "10.in-addr.arpa".to_owned(),
                networks: nets(&["10.0.0.0/8"]),
            },
            ReverseZone {
                name: "8.b.d.0.1.0.0.2.ip6.arpa".to_owned(),
                networks: nets(&["2001:db8::/32"]),
            },
        ],
    )
    .unwrap()
}

pub fn defaults() -> ZoneDefaults {
    ZoneDefaults {
        nameservers: vec!["ns1.example.com.".to_owned()],
        ..ZoneDefaults::default()
    }
}

pub fn manager() -> Manager<MemoryDirectory> {
    manager_with(MemoryDirectory::new(BASE_DN))
}

pub fn manager_with<D: Directory>(directory: D) -> Manager<D> {
    Manager::new(directory, Arc::new(policy()), defaults(), BASE_DN)
}

/// A [`MemoryDirectory`] whose deletes always fail.
pub struct FailingDeletes(pub MemoryDirectory);

impl Directory for FailingDeletes {
    fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<Entry>, Error> {
        self.0.search(base, scope, filter, attrs)
    }

    fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<(), Error> {
        self.0.add(dn, attrs)
    }

    fn modify(&mut self, dn: &str, mods: Vec<Modification>) -> Result<(), Error> {
        self.0.modify(dn, mods)
    }

    fn delete(&mut self, _dn: &str) -> Result<(), Error> {
        Err(Error::result(ResultCode::UNWILLING_TO_PERFORM, "read-only"))
    }
}
