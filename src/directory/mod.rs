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

//! The directory seam.
//!
//! Everything this crate knows is stored in an LDAP directory, and all
//! access to it goes through the [`Directory`] trait. The trait is a
//! deliberately small slice of LDAP: searches, adds, modifies, and
//! deletes, reporting failures as LDAP result codes (see [`Error`]).
//! Callers interpret those result codes; implementations only report
//! them faithfully.
//!
//! Two implementations are provided. [`LdapDirectory`] talks to a real
//! server through the [`ldap3`] crate, connecting lazily on first use
//! and reconnecting after the connection is lost. [`MemoryDirectory`]
//! keeps a tree of entries in memory and reproduces the result codes a
//! server would return; it is useful for development and tests.

use std::collections::HashMap;

use crate::util::Caseless;

mod error;
pub mod ldap;
pub mod memory;

pub use error::{Error, ResultCode};
pub use ldap::{LdapDirectory, LdapParams};
pub use memory::MemoryDirectory;

////////////////////////////////////////////////////////////////////////
// DIRECTORY TRAIT                                                    //
////////////////////////////////////////////////////////////////////////

/// Trait for directory data sources.
///
/// Each method is one synchronous round trip. Methods take `&mut self`
/// because a directory connection is a single stateful channel.
pub trait Directory {
    /// Searches below `base` with the given scope. Only the requested
    /// attributes need be returned.
    ///
    /// A missing `base` entry must be reported as
    /// [`ResultCode::NO_SUCH_OBJECT`], not as an empty result.
    fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<Entry>, Error>;

    /// Adds a new entry.
    fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<(), Error>;

    /// Applies the modifications to an existing entry atomically.
    fn modify(&mut self, dn: &str, mods: Vec<Modification>) -> Result<(), Error>;

    /// Deletes a leaf entry.
    fn delete(&mut self, dn: &str) -> Result<(), Error>;
}

impl<D: Directory + ?Sized> Directory for Box<D> {
    fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<Entry>, Error> {
        (**self).search(base, scope, filter, attrs)
    }

    fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<(), Error> {
        (**self).add(dn, attrs)
    }

    fn modify(&mut self, dn: &str, mods: Vec<Modification>) -> Result<(), Error> {
        (**self).modify(dn, mods)
    }

    fn delete(&mut self, dn: &str) -> Result<(), Error> {
        (**self).delete(dn)
    }
}

////////////////////////////////////////////////////////////////////////
// SEARCHES AND MODIFICATIONS                                         //
////////////////////////////////////////////////////////////////////////

/// The scope of a search.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Scope {
    /// Only the base entry itself.
    Base,

    /// The immediate children of the base entry.
    OneLevel,

    /// The base entry and all of its descendants.
    Subtree,
}

/// One change to an attribute of an entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Modification {
    /// Adds values. Adding a value that is already present fails with
    /// [`ResultCode::ATTRIBUTE_OR_VALUE_EXISTS`].
    Add(String, Vec<String>),

    /// Removes values, or the whole attribute if no values are given.
    /// Removing something that is not present fails with
    /// [`ResultCode::NO_SUCH_ATTRIBUTE`].
    Delete(String, Vec<String>),

    /// Replaces all values of the attribute.
    Replace(String, Vec<String>),
}

/// An entry returned by [`Directory::search`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Entry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl Entry {
    /// Returns the values of an attribute. Attribute descriptions
    /// compare case-insensitively, so `aRecord` finds `arecord`.
    pub fn get(&self, attr: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(name, _)| Caseless(name) == Caseless(attr))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the first value of an attribute, if any.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.get(attr).first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_get_ignores_attribute_case() {
        let mut entry = Entry::default();
        entry
            .attrs
            .insert("arecord".into(), vec!["10.0.0.5".into(), "10.0.0.6".into()]);
        assert_eq!(entry.get("aRecord").len(), 2);
        assert_eq!(entry.first("ARECORD"), Some("10.0.0.5"));
        assert!(entry.get("cNAMERecord").is_empty());
        assert_eq!(entry.first("dNSTTL"), None);
    }
}
