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

//! Implements the server configuration file.

use std::fmt::Write;
use std::fs;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use serde::{de, Deserialize};

use dirdns::directory::{Directory, LdapDirectory, LdapParams, MemoryDirectory};
use dirdns::policy::{ManagedZone, Network, Policy, ReverseZone};
use dirdns::zone::ZoneDefaults;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // A relative password file path is interpreted relative to the
    // configuration file's directory.
    if let DirectoryConfig::Ldap(ref mut ldap) = config.directory {
        if let Some(ref mut password_file) = ldap.bind_password_file {
            if password_file.is_relative() {
                *password_file = dir.join(&*password_file);
            }
        }
    }

    if log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        debug!("Configuration loaded:\n{}", summarize(&config));
    }
    Ok(config)
}

/// Produces a human-readable summary of the configuration.
pub fn summarize(config: &Config) -> String {
    let mut message = format!(
        "Bind address:  {}\n\
         Directory:     {}\n\
         Base DN:       {}\n\
         Managed zones: ",
        config.bind,
        config.directory.describe(),
        config.directory.base_dn(),
    );
    if config.managed_zones.is_empty() {
        message.push_str("none");
    } else {
        write!(message, "{}", config.managed_zones.len()).unwrap();
        for zone in &config.managed_zones {
            write!(
                message,
                "\n  {} (sources: {}; addresses: {})",
                zone.name,
                join(&zone.source_ip),
                join(&zone.managed_ip),
            )
            .unwrap();
        }
    }
    message.push_str("\nReverse zones: ");
    if config.reverse_zones.is_empty() {
        message.push_str("none");
    } else {
        write!(message, "{}", config.reverse_zones.len()).unwrap();
        for zone in &config.reverse_zones {
            write!(message, "\n  {} ({})", zone.name, join(&zone.networks)).unwrap();
        }
    }
    message
}

fn join(networks: &[ConfigNetwork]) -> String {
    if networks.is_empty() {
        return "none".to_owned();
    }
    networks
        .iter()
        .map(|n| n.0.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub zone_defaults: ZoneDefaultsConfig,
    #[serde(default)]
    pub managed_zones: Vec<ManagedZoneConfig>,
    #[serde(default)]
    pub reverse_zones: Vec<ReverseZoneConfig>,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V6(Ipv6Addr::LOCALHOST);
const DEFAULT_BIND_PORT: u16 = 8080;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

impl Config {
    /// Builds the authorization and reverse-zone tables.
    pub fn policy(&self) -> Result<Policy> {
        let managed = self
            .managed_zones
            .iter()
            .map(|zone| ManagedZone {
                name: zone.name.clone(),
                source_networks: unwrap_networks(&zone.source_ip),
                managed_networks: unwrap_networks(&zone.managed_ip),
            })
            .collect();
        let reverse = self
            .reverse_zones
            .iter()
            .map(|zone| ReverseZone {
                name: zone.name.clone(),
                networks: unwrap_networks(&zone.networks),
            })
            .collect();
        Policy::new(managed, reverse).context("invalid zone configuration")
    }

    /// Returns the values given to automatically created zones.
    pub fn zone_defaults(&self) -> ZoneDefaults {
        let mut defaults = ZoneDefaults {
            nameservers: self.zone_defaults.nameservers.clone(),
            ..ZoneDefaults::default()
        };
        let config = &self.zone_defaults.soa;
        let soa = &mut defaults.soa;
        if let Some(ref mname) = config.mname {
            soa.mname = mname.clone();
        }
        if let Some(ref rname) = config.rname {
            soa.rname = rname.clone();
        }
        soa.refresh = config.refresh.unwrap_or(soa.refresh);
        soa.retry = config.retry.unwrap_or(soa.retry);
        soa.expire = config.expire.unwrap_or(soa.expire);
        soa.minimum = config.minimum.unwrap_or(soa.minimum);
        defaults
    }
}

fn unwrap_networks(networks: &[ConfigNetwork]) -> Vec<Network> {
    networks.iter().map(|n| n.0).collect()
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: DIRECTORY                                   //
////////////////////////////////////////////////////////////////////////

/// The selection of directory backend and its configuration.
///
/// To actually create the selected directory, use
/// [`DirectoryConfig::open`].
#[derive(Debug, Deserialize)]
#[serde(tag = "backend")]
pub enum DirectoryConfig {
    #[serde(rename = "ldap")]
    Ldap(LdapConfig),
    #[serde(rename = "memory")]
    Memory(MemoryConfig),
}

impl DirectoryConfig {
    /// Returns the name of the selected backend.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ldap(_) => "ldap",
            Self::Memory(_) => "memory",
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Ldap(config) => format!("{} ({})", self.name(), config.url),
            Self::Memory(_) => format!("{} (not persistent)", self.name()),
        }
    }

    /// Returns the DN below which zones are kept.
    pub fn base_dn(&self) -> &str {
        match self {
            Self::Ldap(config) => &config.base_dn,
            Self::Memory(config) => &config.base_dn,
        }
    }

    /// Creates the selected directory. An LDAP directory connects
    /// lazily, so this does not contact the server.
    pub fn open(&self) -> Result<Box<dyn Directory + Send>> {
        match self {
            Self::Ldap(config) => {
                let params = config.params()?;
                Ok(Box::new(LdapDirectory::new(params)))
            }
            Self::Memory(config) => Ok(Box::new(MemoryDirectory::new(&config.base_dn))),
        }
    }
}

/// The configuration of an LDAP directory.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LdapConfig {
    pub url: String,
    pub bind_dn: String,
    pub bind_password: Option<String>,
    pub bind_password_file: Option<PathBuf>,
    pub base_dn: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub starttls: bool,
    #[serde(default)]
    pub no_tls_verify: bool,
}

fn default_timeout() -> u64 {
    10
}

impl LdapConfig {
    fn params(&self) -> Result<LdapParams> {
        let bind_password = match (&self.bind_password, &self.bind_password_file) {
            (Some(password), None) => password.clone(),
            (None, Some(path)) => fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .trim_end_matches(&['\r', '\n'][..])
                .to_owned(),
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "only one of bind_password and bind_password_file may be given"
                ))
            }
            (None, None) => {
                return Err(anyhow!(
                    "one of bind_password and bind_password_file must be given"
                ))
            }
        };
        Ok(LdapParams {
            url: self.url.clone(),
            bind_dn: self.bind_dn.clone(),
            bind_password,
            conn_timeout: Duration::from_secs(self.timeout),
            starttls: self.starttls,
            no_tls_verify: self.no_tls_verify,
        })
    }
}

/// The configuration of an in-memory directory.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    pub base_dn: String,
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ZONES                                       //
////////////////////////////////////////////////////////////////////////

/// The values given to automatically created zones. Omitted SOA values
/// take the library defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneDefaultsConfig {
    #[serde(default)]
    pub nameservers: Vec<String>,
    #[serde(default)]
    pub soa: SoaConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoaConfig {
    pub mname: Option<String>,
    pub rname: Option<String>,
    pub refresh: Option<u32>,
    pub retry: Option<u32>,
    pub expire: Option<u32>,
    pub minimum: Option<u32>,
}

/// A zone clients may manage.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagedZoneConfig {
    pub name: String,
    #[serde(default)]
    pub source_ip: Vec<ConfigNetwork>,
    #[serde(default)]
    pub managed_ip: Vec<ConfigNetwork>,
}

/// A reverse zone and the networks it covers.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReverseZoneConfig {
    pub name: String,
    pub networks: Vec<ConfigNetwork>,
}

////////////////////////////////////////////////////////////////////////
// NETWORKS                                                           //
////////////////////////////////////////////////////////////////////////

/// A [`Network`] as written in the configuration file: a CIDR block
/// or a bare address.
#[derive(Clone, Debug)]
pub struct ConfigNetwork(pub Network);

impl<'de> Deserialize<'de> for ConfigNetwork {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse()
            .map(ConfigNetwork)
            .map_err(|e| de::Error::custom(format!("invalid network {}: {}", text, e)))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
