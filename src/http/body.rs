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

//! Parsing of request bodies.

use serde_json::{Map, Value};

use crate::error::Error;

/// The recognized fields of a POST or PUT request body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RequestBody {
    pub reverse: bool,
    pub ttl: Option<u32>,
}

impl RequestBody {
    /// Parses a request body. An empty body is taken as `{}`; anything
    /// else must be a JSON object. Unrecognized keys are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidInput(format!("JSON parser error : {}", e)))?;
        match value {
            Value::Object(fields) => Self::from_fields(&fields),
            _ => Err(Error::InvalidInput(
                "Request body must be a JSON object".to_owned(),
            )),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, Error> {
        let reverse = match fields.get("reverse") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(reverse)) => *reverse,
            Some(_) => {
                return Err(Error::InvalidInput(
                    "Reverse must be a boolean value".to_owned(),
                ))
            }
        };
        let ttl = match fields.get("ttl") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(value) => Some(parse_ttl(value)?),
        };
        Ok(Self { reverse, ttl })
    }
}

/// Accepts a TTL given as a JSON number or as a string of digits.
fn parse_ttl(value: &Value) -> Result<u32, Error> {
    let ttl = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    };
    ttl.ok_or_else(|| Error::InvalidInput("TTL must be a number".to_owned()))
}
