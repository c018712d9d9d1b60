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

//! A REST/JSON interface to DNS data kept in an LDAP directory.
//!
//! The directory layout is the one used by FreeIPA and the
//! `bind-dyndb-ldap` plugin: each zone is an `idnsZone` entry named
//! `idnsName=<zone>` directly below a configured base DN, and each
//! record owner is an `idnsRecord` entry below its zone. This crate
//! does not answer DNS queries itself; a name server reading the same
//! directory does that.
//!
//! The pieces fit together as follows:
//!
//! * [`policy::Policy`] holds the immutable authorization tables:
//!   which zones may be managed, from which source addresses, and
//!   which reverse zones cover which networks.
//! * [`authz`] checks each incoming request path against the policy
//!   before anything touches the directory.
//! * [`manager::Manager`] translates host, address, and CNAME
//!   operations into directory operations, and keeps PTR records in
//!   the reverse zones consistent with the forward data.
//! * [`directory::Directory`] abstracts the directory itself. An LDAP
//!   implementation and an in-memory implementation are provided.
//! * [`http`] exposes the manager as an [`axum`] router.

pub mod authz;
pub mod directory;
mod error;
pub mod http;
pub mod manager;
pub mod name;
pub mod policy;
pub mod reverse;
#[cfg(test)]
mod testing;
mod util;
pub mod zone;

pub use error::Error;
