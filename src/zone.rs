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

//! Zone and record entries.
//!
//! Zones are created implicitly the first time a record is placed in
//! them, using the SOA values and nameservers in [`ZoneDefaults`].

/// The SOA values given to new zones. The serial always starts at 1.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SoaDefaults {
    /// The primary nameserver (MNAME).
    pub mname: String,

    /// The mailbox of the responsible party (RNAME).
    pub rname: String,

    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// The values given to zones created by this crate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneDefaults {
    pub soa: SoaDefaults,
    pub nameservers: Vec<String>,
}

impl Default for ZoneDefaults {
    fn default() -> Self {
        Self {
            soa: SoaDefaults {
                mname: "localhost.".to_owned(),
                rname: "hostmaster.localhost.".to_owned(),
                refresh: 3600,
                retry: 900,
                expire: 1_209_600,
                minimum: 3600,
            },
            nameservers: Vec::new(),
        }
    }
}

/// The attributes of a newly created, active zone entry.
pub fn zone_attrs(zone: &str, defaults: &ZoneDefaults) -> Vec<(String, Vec<String>)> {
    let soa = &defaults.soa;
    let mut attrs = vec![
        attr("objectClass", ["top", "idnsRecord", "idnsZone"]),
        attr("idnsName", [zone]),
        attr("idnsZoneActive", ["TRUE"]),
        attr("idnsSOAmName", [soa.mname.as_str()]),
        attr("idnsSOArName", [soa.rname.as_str()]),
        attr("idnsSOAserial", ["1"]),
        ("idnsSOArefresh".to_owned(), vec![soa.refresh.to_string()]),
        ("idnsSOAretry".to_owned(), vec![soa.retry.to_string()]),
        ("idnsSOAexpire".to_owned(), vec![soa.expire.to_string()]),
        ("idnsSOAminimum".to_owned(), vec![soa.minimum.to_string()]),
    ];
    if !defaults.nameservers.is_empty() {
        attrs.push(("nSRecord".to_owned(), defaults.nameservers.clone()));
    }
    attrs
}

/// The attributes of a newly created record entry.
pub fn record_attrs(name: &str, ttl: Option<u32>) -> Vec<(String, Vec<String>)> {
    let mut attrs = vec![
        attr("objectClass", ["top", "idnsRecord"]),
        attr("idnsName", [name]),
    ];
    if let Some(ttl) = ttl {
        attrs.push(("dNSTTL".to_owned(), vec![ttl.to_string()]));
    }
    attrs
}

fn attr<const N: usize>(name: &str, values: [&str; N]) -> (String, Vec<String>) {
    (
        name.to_owned(),
        values.iter().map(|v| (*v).to_owned()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<'a>(attrs: &'a [(String, Vec<String>)], name: &str) -> Option<&'a [String]> {
        attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    #[test]
    fn zone_attrs_use_defaults() {
        let defaults = ZoneDefaults {
            nameservers: vec!["ns1.example.com.".into(), "ns2.example.com.".into()],
            ..ZoneDefaults::default()
        };
        let attrs = zone_attrs("example.com", &defaults);
        assert_eq!(values(&attrs, "idnsName").unwrap(), ["example.com"]);
        assert_eq!(values(&attrs, "idnsSOAserial").unwrap(), ["1"]);
        assert_eq!(values(&attrs, "idnsSOAexpire").unwrap(), ["1209600"]);
        assert_eq!(values(&attrs, "nSRecord").unwrap().len(), 2);
    }

    #[test]
    fn zone_attrs_omit_empty_nameservers() {
        let attrs = zone_attrs("example.com", &ZoneDefaults::default());
        assert!(values(&attrs, "nSRecord").is_none());
    }

    #[test]
    fn record_attrs_include_ttl_only_when_given() {
        assert!(values(&record_attrs("web1", None), "dNSTTL").is_none());
        assert_eq!(
            values(&record_attrs("web1", Some(300)), "dNSTTL").unwrap(),
            ["300"],
        );
    }
}
