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

//! Name grammars.
//!
//! Three grammars are in use. A *host name* is a single label: an
//! alphanumeric character followed by up to 63 alphanumeric or hyphen
//! characters. A *target name*, used for CNAME targets, is one or more
//! such labels separated by dots, optionally ending in a dot. A *zone
//! segment* is the leading component of a request path that names a
//! zone; it is any run of alphanumerics, dots, and hyphens. All three
//! are matched case-insensitively.

use lazy_static::lazy_static;
use regex::Regex;

const LABEL: &str = "[a-z0-9][a-z0-9-]{0,63}";

lazy_static! {
    static ref HOST_RE: Regex = Regex::new(&format!("(?i)^{}$", LABEL)).unwrap();
    static ref TARGET_RE: Regex =
        Regex::new(&format!(r"(?i)^{label}(\.{label})*\.?$", label = LABEL)).unwrap();
    static ref ZONE_SEGMENT_RE: Regex = Regex::new(r"^/([0-9A-Za-z.-]+)").unwrap();
}

/// Returns whether `name` is a valid host name (a single label).
pub fn is_valid_host(name: &str) -> bool {
    HOST_RE.is_match(name)
}

/// Returns whether `name` is a valid CNAME target (dotted labels).
pub fn is_valid_target(name: &str) -> bool {
    TARGET_RE.is_match(name)
}

/// Extracts the zone named by the first segment of a request path.
/// Returns `None` if the path does not begin with a zone segment (for
/// instance, the root path `/`).
pub fn zone_segment(path: &str) -> Option<&str> {
    ZONE_SEGMENT_RE
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
