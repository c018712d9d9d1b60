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

//! Implementation of the [`MemoryDirectory`] structure.

use std::collections::BTreeMap;

use super::{Directory, Entry, Error, Modification, ResultCode, Scope};
use crate::util::Caseless;

/// A [`Directory`] that keeps its entries in memory.
///
/// The directory starts out holding only its base entry. It enforces
/// the parts of the LDAP data model that callers depend on, reporting
/// the same result codes a server would: adding beneath a missing
/// parent or searching from a missing base yields
/// [`ResultCode::NO_SUCH_OBJECT`], adding a duplicate value yields
/// [`ResultCode::ATTRIBUTE_OR_VALUE_EXISTS`], and so on. Schema is not
/// checked.
///
/// Search filters are limited to a single equality or presence
/// assertion, such as `(objectClass=idnsZone)` or `(objectClass=*)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryDirectory {
    base_dn: String,
    entries: BTreeMap<String, Entry>,
}

impl MemoryDirectory {
    /// Creates a `MemoryDirectory` containing only the entry `base_dn`.
    pub fn new(base_dn: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut base = Entry {
            dn: base_dn.to_owned(),
            ..Entry::default()
        };
        base.attrs.insert(
            "objectClass".to_owned(),
            vec!["top".to_owned(), "nsContainer".to_owned()],
        );
        entries.insert(normalize(base_dn), base);
        Self {
            base_dn: base_dn.to_owned(),
            entries,
        }
    }

    /// Returns the base DN the directory was created with.
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Returns the entry at `dn`, if it exists.
    pub fn get(&self, dn: &str) -> Option<&Entry> {
        self.entries.get(&normalize(dn))
    }

    /// Returns the number of entries, including the base entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the directory holds nothing but its base entry.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    fn entry_mut(&mut self, dn: &str) -> Result<&mut Entry, Error> {
        self.entries
            .get_mut(&normalize(dn))
            .ok_or_else(|| no_such_object(dn))
    }
}

impl Directory for MemoryDirectory {
    fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<Entry>, Error> {
        let base_key = normalize(base);
        if !self.entries.contains_key(&base_key) {
            return Err(no_such_object(base));
        }
        let filter = Filter::parse(filter)?;

        let in_scope = |key: &str| match scope {
            Scope::Base => key == base_key,
            Scope::OneLevel => parent(key) == Some(base_key.as_str()),
            Scope::Subtree => key == base_key || key.ends_with(&format!(",{}", base_key)),
        };

        Ok(self
            .entries
            .iter()
            .filter(|(key, entry)| in_scope(key.as_str()) && filter.matches(entry))
            .map(|(_, entry)| project(entry, attrs))
            .collect())
    }

    fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<(), Error> {
        let key = normalize(dn);
        if self.entries.contains_key(&key) {
            return Err(Error::result(ResultCode::ENTRY_ALREADY_EXISTS, ""));
        }
        match parent(&key) {
            Some(parent_key) if self.entries.contains_key(parent_key) => (),
            _ => return Err(no_such_object(dn)),
        }

        let mut entry = Entry {
            dn: dn.to_owned(),
            ..Entry::default()
        };
        for (attr, values) in attrs {
            if values.is_empty() {
                return Err(Error::result(
                    ResultCode::PROTOCOL_ERROR,
                    format!("no values given for {}", attr),
                ));
            }
            add_values(&mut entry, &attr, values)?;
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    fn modify(&mut self, dn: &str, mods: Vec<Modification>) -> Result<(), Error> {
        // Work on a copy so that a failing modification leaves the
        // entry untouched.
        let entry = self.entry_mut(dn)?;
        let mut modified = entry.clone();
        for m in mods {
            match m {
                Modification::Add(attr, values) => add_values(&mut modified, &attr, values)?,
                Modification::Delete(attr, values) => delete_values(&mut modified, &attr, values)?,
                Modification::Replace(attr, values) => {
                    remove_attr(&mut modified, &attr);
                    if !values.is_empty() {
                        add_values(&mut modified, &attr, values)?;
                    }
                }
            }
        }
        *entry = modified;
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> Result<(), Error> {
        let key = normalize(dn);
        if !self.entries.contains_key(&key) {
            return Err(no_such_object(dn));
        }
        if self
            .entries
            .keys()
            .any(|other| parent(other) == Some(key.as_str()))
        {
            return Err(Error::result(ResultCode::NOT_ALLOWED_ON_NON_LEAF, ""));
        }
        self.entries.remove(&key);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// ENTRY AND DN HELPERS                                               //
////////////////////////////////////////////////////////////////////////

fn no_such_object(dn: &str) -> Error {
    Error::result(ResultCode::NO_SUCH_OBJECT, format!("{} does not exist", dn))
}

/// Normalizes a DN for use as a map key. DNs compare
/// case-insensitively, and whitespace after separating commas is not
/// significant.
fn normalize(dn: &str) -> String {
    let mut key = String::with_capacity(dn.len());
    let mut rdns = split_rdns(dn).into_iter().peekable();
    while let Some(rdn) = rdns.next() {
        key.push_str(&rdn.trim().to_ascii_lowercase());
        if rdns.peek().is_some() {
            key.push(',');
        }
    }
    key
}

/// Splits a DN at the commas that are not escaped with a backslash.
fn split_rdns(dn: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                rdns.push(&dn[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    rdns.push(&dn[start..]);
    rdns
}

/// Returns the parent of a normalized DN.
fn parent(key: &str) -> Option<&str> {
    let first_rdn_len = split_rdns(key).first()?.len();
    key.get(first_rdn_len + 1..).filter(|p| !p.is_empty())
}

fn add_values(entry: &mut Entry, attr: &str, values: Vec<String>) -> Result<(), Error> {
    let key = entry
        .attrs
        .keys()
        .find(|name| Caseless(name) == Caseless(attr))
        .cloned()
        .unwrap_or_else(|| attr.to_owned());
    let existing = entry.attrs.entry(key).or_default();
    for value in values {
        if existing.iter().any(|v| Caseless(v) == Caseless(&value)) {
            return Err(Error::result(
                ResultCode::ATTRIBUTE_OR_VALUE_EXISTS,
                format!("{} already has value {}", attr, value),
            ));
        }
        existing.push(value);
    }
    Ok(())
}

fn delete_values(entry: &mut Entry, attr: &str, values: Vec<String>) -> Result<(), Error> {
    let no_such_attribute = || {
        Error::result(
            ResultCode::NO_SUCH_ATTRIBUTE,
            format!("{} has no such value", attr),
        )
    };
    let key = entry
        .attrs
        .keys()
        .find(|name| Caseless(name) == Caseless(attr))
        .cloned()
        .ok_or_else(no_such_attribute)?;
    if values.is_empty() {
        entry.attrs.remove(&key);
        return Ok(());
    }

    let existing = entry.attrs.get_mut(&key).ok_or_else(no_such_attribute)?;
    for value in values {
        let index = existing
            .iter()
            .position(|v| Caseless(v) == Caseless(&value))
            .ok_or_else(no_such_attribute)?;
        existing.remove(index);
    }
    if existing.is_empty() {
        entry.attrs.remove(&key);
    }
    Ok(())
}

fn remove_attr(entry: &mut Entry, attr: &str) {
    entry.attrs.retain(|name, _| Caseless(name) != Caseless(attr));
}

/// Copies an entry with only the requested attributes.
fn project(entry: &Entry, attrs: &[&str]) -> Entry {
    if attrs.is_empty() || attrs.contains(&"*") {
        return entry.clone();
    }
    Entry {
        dn: entry.dn.clone(),
        attrs: entry
            .attrs
            .iter()
            .filter(|(name, _)| attrs.iter().any(|a| Caseless(a) == Caseless(name)))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
    }
}

////////////////////////////////////////////////////////////////////////
// FILTERS                                                            //
////////////////////////////////////////////////////////////////////////

/// The supported subset of LDAP search filters.
enum Filter<'a> {
    Present(&'a str),
    Equal(&'a str, &'a str),
}

impl<'a> Filter<'a> {
    fn parse(filter: &'a str) -> Result<Self, Error> {
        let unsupported = || {
            Error::result(
                ResultCode::UNWILLING_TO_PERFORM,
                format!("unsupported filter {}", filter),
            )
        };
        let inner = filter
            .strip_prefix('(')
            .and_then(|f| f.strip_suffix(')'))
            .ok_or_else(unsupported)?;
        let (attr, value) = inner.split_once('=').ok_or_else(unsupported)?;
        if attr.is_empty() || attr.contains(['(', ')', '&', '|', '!']) {
            return Err(unsupported());
        }
        if value == "*" {
            Ok(Self::Present(attr))
        } else {
            Ok(Self::Equal(attr, value))
        }
    }

    fn matches(&self, entry: &Entry) -> bool {
        match *self {
            Self::Present(attr) => !entry.get(attr).is_empty(),
            Self::Equal(attr, value) => entry
                .get(attr)
                .iter()
                .any(|v| Caseless(v) == Caseless(value)),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "cn=dns,dc=example,dc=com";

    fn attrs(pairs: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        pairs
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }

    fn with_zone() -> MemoryDirectory {
        let mut directory = MemoryDirectory::new(BASE);
        directory
            .add(
                &format!("idnsName=example.com,{}", BASE),
                attrs(&[
                    ("objectClass", &["top", "idnsRecord", "idnsZone"][..]),
                    ("idnsName", &["example.com"][..]),
                ]),
            )
            .unwrap();
        directory
    }

    fn code(result: Result<impl Sized, Error>) -> Option<ResultCode> {
        result.err().and_then(|e| e.result_code())
    }

    #[test]
    fn parent_works() {
        assert_eq!(
            parent("idnsname=web1,idnsname=example.com,cn=dns"),
            Some("idnsname=example.com,cn=dns"),
        );
        assert_eq!(parent("idnsname=a\\,b,cn=dns"), Some("cn=dns"));
        assert_eq!(parent("cn=dns"), None);
    }

    #[test]
    fn normalize_ignores_case_and_spacing() {
        assert_eq!(
            normalize("idnsName=Web1, idnsName=Example.COM,cn=dns"),
            "idnsname=web1,idnsname=example.com,cn=dns",
        );
    }

    #[test]
    fn add_requires_parent_and_rejects_duplicates() {
        let mut directory = with_zone();
        let host = format!("idnsName=web1,idnsName=example.com,{}", BASE);
        let orphan = format!("idnsName=web1,idnsName=missing.com,{}", BASE);
        let record = attrs(&[("objectClass", &["top", "idnsRecord"][..])]);

        assert_eq!(
            code(directory.add(&orphan, record.clone())),
            Some(ResultCode::NO_SUCH_OBJECT),
        );
        directory.add(&host, record.clone()).unwrap();
        assert_eq!(
            code(directory.add(&host, record)),
            Some(ResultCode::ENTRY_ALREADY_EXISTS),
        );
    }

    #[test]
    fn search_scopes_work() {
        let mut directory = with_zone();
        let zone = format!("idnsName=example.com,{}", BASE);
        directory
            .add(
                &format!("idnsName=web1,{}", zone),
                attrs(&[("objectClass", &["top", "idnsRecord"][..]), ("idnsName", &["web1"][..])]),
            )
            .unwrap();

        let subtree = directory
            .search(BASE, Scope::Subtree, "(objectClass=idnsZone)", &["idnsName"])
            .unwrap();
        assert_eq!(subtree.len(), 1);
        assert_eq!(subtree[0].first("idnsName"), Some("example.com"));
        assert!(subtree[0].get("objectClass").is_empty());

        let one_level = directory
            .search(&zone, Scope::OneLevel, "(objectClass=idnsRecord)", &["idnsName"])
            .unwrap();
        assert_eq!(one_level.len(), 1);
        assert_eq!(one_level[0].first("idnsName"), Some("web1"));

        let base = directory
            .search(&zone, Scope::Base, "(objectClass=*)", &[])
            .unwrap();
        assert_eq!(base.len(), 1);

        assert_eq!(
            code(directory.search(
                &format!("idnsName=missing.com,{}", BASE),
                Scope::Base,
                "(objectClass=*)",
                &[],
            )),
            Some(ResultCode::NO_SUCH_OBJECT),
        );
    }

    #[test]
    fn modify_reports_value_conflicts_and_is_atomic() {
        let mut directory = with_zone();
        let zone = format!("idnsName=example.com,{}", BASE);
        let add = |v: &str| Modification::Add("aRecord".into(), vec![v.into()]);

        directory.modify(&zone, vec![add("10.0.0.5")]).unwrap();
        assert_eq!(
            code(directory.modify(&zone, vec![add("10.0.0.6"), add("10.0.0.5")])),
            Some(ResultCode::ATTRIBUTE_OR_VALUE_EXISTS),
        );
        assert_eq!(directory.get(&zone).unwrap().get("arecord"), ["10.0.0.5"]);

        assert_eq!(
            code(directory.modify(
                &zone,
                vec![Modification::Delete("aRecord".into(), vec!["10.0.0.9".into()])],
            )),
            Some(ResultCode::NO_SUCH_ATTRIBUTE),
        );
        directory
            .modify(
                &zone,
                vec![Modification::Delete("ARECORD".into(), vec!["10.0.0.5".into()])],
            )
            .unwrap();
        assert!(directory.get(&zone).unwrap().get("aRecord").is_empty());

        directory
            .modify(&zone, vec![Modification::Replace("dNSTTL".into(), vec!["60".into()])])
            .unwrap();
        directory
            .modify(&zone, vec![Modification::Replace("dNSTTL".into(), vec!["90".into()])])
            .unwrap();
        assert_eq!(directory.get(&zone).unwrap().get("dnsttl"), ["90"]);
    }

    #[test]
    fn delete_refuses_non_leaf_entries() {
        let mut directory = with_zone();
        let zone = format!("idnsName=example.com,{}", BASE);
        let host = format!("idnsName=web1,{}", zone);
        directory
            .add(&host, attrs(&[("objectClass", &["idnsRecord"][..])]))
            .unwrap();

        assert_eq!(
            code(directory.delete(&zone)),
            Some(ResultCode::NOT_ALLOWED_ON_NON_LEAF),
        );
        directory.delete(&host).unwrap();
        assert_eq!(code(directory.delete(&host)), Some(ResultCode::NO_SUCH_OBJECT));
        directory.delete(&zone).unwrap();
        assert!(directory.is_empty());
    }

    #[test]
    fn unsupported_filters_are_refused() {
        let mut directory = with_zone();
        assert_eq!(
            code(directory.search(BASE, Scope::Subtree, "(&(a=b)(c=d))", &[])),
            Some(ResultCode::UNWILLING_TO_PERFORM),
        );
    }
}
