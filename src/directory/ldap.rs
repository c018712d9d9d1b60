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

//! Implementation of the [`LdapDirectory`] structure.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use ldap3::{LdapConn, LdapConnSettings, LdapError, LdapResult, Mod, SearchEntry};
use log::{debug, info, warn};

use super::{Directory, Entry, Error, Modification, ResultCode, Scope};

/// Connection parameters for an [`LdapDirectory`].
#[derive(Clone)]
pub struct LdapParams {
    /// The server URL, e.g. `ldaps://ipa.example.com`.
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub conn_timeout: Duration,
    pub starttls: bool,
    pub no_tls_verify: bool,
}

impl fmt::Debug for LdapParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LdapParams")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"<redacted>")
            .field("conn_timeout", &self.conn_timeout)
            .field("starttls", &self.starttls)
            .field("no_tls_verify", &self.no_tls_verify)
            .finish()
    }
}

/// A [`Directory`] backed by an LDAP server.
///
/// The connection is established (and bound) on first use rather than
/// at construction, so a server that starts while the directory is
/// down can still come up. Once established, the connection is reused
/// for every operation. If an operation fails for any reason other
/// than an LDAP result code, the connection is considered dead and is
/// dropped; the failing operation reports the error, and the next
/// operation connects afresh. There are no retries.
pub struct LdapDirectory {
    params: LdapParams,
    conn: Option<LdapConn>,
}

impl LdapDirectory {
    /// Creates a new `LdapDirectory`. No connection is made yet.
    pub fn new(params: LdapParams) -> Self {
        Self { params, conn: None }
    }

    /// Returns whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Returns the established connection, connecting and binding
    /// first if necessary.
    fn connection(&mut self) -> Result<&mut LdapConn, Error> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(self.conn.insert(conn))
    }

    fn connect(&self) -> Result<LdapConn, Error> {
        debug!("Connecting to {}.", self.params.url);
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.params.conn_timeout)
            .set_starttls(self.params.starttls)
            .set_no_tls_verify(self.params.no_tls_verify);
        let mut conn = LdapConn::with_settings(settings, &self.params.url)
            .map_err(|e| Error::Connection(e.to_string()))?;
        conn.simple_bind(&self.params.bind_dn, &self.params.bind_password)
            .and_then(LdapResult::success)
            .map_err(|e| match e {
                LdapError::LdapResult { result } => Error::result(
                    ResultCode(result.rc),
                    format!("bind as {} failed: {}", self.params.bind_dn, result.text),
                ),
                other => Error::Connection(other.to_string()),
            })?;
        info!(
            "Connected to {} as {}.",
            self.params.url, self.params.bind_dn
        );
        Ok(conn)
    }

    /// Converts an [`LdapError`], dropping the connection if the error
    /// was not a plain result code.
    fn translate(&mut self, error: LdapError) -> Error {
        match error {
            LdapError::LdapResult { result } => Error::result(ResultCode(result.rc), result.text),
            other => {
                warn!(
                    "Lost the connection to {}: {}. Will reconnect on next use.",
                    self.params.url, other,
                );
                self.conn = None;
                Error::Connection(other.to_string())
            }
        }
    }

    /// Runs `op` on the connection and checks its result code.
    fn run<T>(
        &mut self,
        op: impl FnOnce(&mut LdapConn) -> Result<T, LdapError>,
    ) -> Result<T, Error> {
        let conn = self.connection()?;
        op(conn).map_err(|e| self.translate(e))
    }
}

impl Directory for LdapDirectory {
    fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<Entry>, Error> {
        let scope = match scope {
            Scope::Base => ldap3::Scope::Base,
            Scope::OneLevel => ldap3::Scope::OneLevel,
            Scope::Subtree => ldap3::Scope::Subtree,
        };
        let (entries, _) = self.run(|conn| conn.search(base, scope, filter, attrs)?.success())?;
        Ok(entries
            .into_iter()
            .map(|raw| {
                let entry = SearchEntry::construct(raw);
                Entry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    fn add(&mut self, dn: &str, attrs: Vec<(String, Vec<String>)>) -> Result<(), Error> {
        let attrs: Vec<(String, HashSet<String>)> = attrs
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().collect()))
            .collect();
        self.run(|conn| conn.add(dn, attrs)?.success())
            .map(drop)
    }

    fn modify(&mut self, dn: &str, mods: Vec<Modification>) -> Result<(), Error> {
        let mods: Vec<Mod<String>> = mods
            .into_iter()
            .map(|m| match m {
                Modification::Add(attr, values) => Mod::Add(attr, values.into_iter().collect()),
                Modification::Delete(attr, values) => {
                    Mod::Delete(attr, values.into_iter().collect())
                }
                Modification::Replace(attr, values) => {
                    Mod::Replace(attr, values.into_iter().collect())
                }
            })
            .collect();
        self.run(|conn| conn.modify(dn, mods)?.success())
            .map(drop)
    }

    fn delete(&mut self, dn: &str) -> Result<(), Error> {
        self.run(|conn| conn.delete(dn)?.success()).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LdapParams {
        LdapParams {
            url: "ldap://127.0.0.1:1".into(),
            bind_dn: "uid=dnsapi,cn=users,dc=example,dc=com".into(),
            bind_password: "hunter2".into(),
            conn_timeout: Duration::from_millis(200),
            starttls: false,
            no_tls_verify: false,
        }
    }

    #[test]
    fn construction_does_not_connect() {
        let directory = LdapDirectory::new(params());
        assert!(!directory.is_connected());
    }

    #[test]
    fn debug_output_redacts_the_password() {
        let rendered = format!("{:?}", params());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
