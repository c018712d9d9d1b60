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

//! Implementation of the [`Error`] type for directory operations.

use std::fmt;

/// An LDAP result code (see [RFC 4511 § 4.1.9]).
///
/// Only the codes this crate interprets have names.
///
/// [RFC 4511 § 4.1.9]: https://datatracker.ietf.org/doc/html/rfc4511#section-4.1.9
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    pub const OPERATIONS_ERROR: Self = Self(1);
    pub const PROTOCOL_ERROR: Self = Self(2);
    pub const NO_SUCH_ATTRIBUTE: Self = Self(16);
    pub const ATTRIBUTE_OR_VALUE_EXISTS: Self = Self(20);
    pub const NO_SUCH_OBJECT: Self = Self(32);
    pub const INVALID_CREDENTIALS: Self = Self(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: Self = Self(50);
    pub const UNWILLING_TO_PERFORM: Self = Self(53);
    pub const NOT_ALLOWED_ON_NON_LEAF: Self = Self(66);
    pub const ENTRY_ALREADY_EXISTS: Self = Self(68);

    /// Returns the name given to the code in RFC 4511, if it is one of
    /// the named codes above.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::SUCCESS => Some("success"),
            Self::OPERATIONS_ERROR => Some("operationsError"),
            Self::PROTOCOL_ERROR => Some("protocolError"),
            Self::NO_SUCH_ATTRIBUTE => Some("noSuchAttribute"),
            Self::ATTRIBUTE_OR_VALUE_EXISTS => Some("attributeOrValueExists"),
            Self::NO_SUCH_OBJECT => Some("noSuchObject"),
            Self::INVALID_CREDENTIALS => Some("invalidCredentials"),
            Self::INSUFFICIENT_ACCESS_RIGHTS => Some("insufficientAccessRights"),
            Self::UNWILLING_TO_PERFORM => Some("unwillingToPerform"),
            Self::NOT_ALLOWED_ON_NON_LEAF => Some("notAllowedOnNonLeaf"),
            Self::ENTRY_ALREADY_EXISTS => Some("entryAlreadyExists"),
            _ => None,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "result code {}", self.0),
        }
    }
}

/// Errors that arise during [`Directory`](super::Directory)
/// operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The server completed the operation with a non-success result
    /// code. The text is the server's diagnostic message, which may be
    /// empty.
    Result { code: ResultCode, text: String },

    /// The operation could not be carried out at all: the connection
    /// could not be established, the bind failed, or the connection
    /// broke mid-operation.
    Connection(String),
}

impl Error {
    /// Creates an [`Error::Result`].
    pub fn result(code: ResultCode, text: impl Into<String>) -> Self {
        Self::Result {
            code,
            text: text.into(),
        }
    }

    /// Returns the LDAP result code, if the server produced one.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Result { code, .. } => Some(*code),
            Self::Connection(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Result { code, text } if text.is_empty() => fmt::Display::fmt(code, f),
            Self::Result { code, text } => write!(f, "{}: {}", code, text),
            Self::Connection(message) => write!(f, "directory connection failed: {}", message),
        }
    }
}

impl std::error::Error for Error {}
