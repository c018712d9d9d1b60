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

//! Implementation of the [`Error`] type returned by management
//! operations.

use std::fmt;

use crate::directory;

/// The closed set of failures a management operation can report.
///
/// Each variant carries a human-readable message. The HTTP layer maps
/// variants to status codes and echoes the [`Display`](fmt::Display)
/// form back to the client verbatim.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The resource does not exist in the directory.
    NotFound(String),

    /// The directory already holds the entry or value being added.
    AlreadyExists(String),

    /// A hostname, address, TTL, or request body was malformed.
    InvalidInput(String),

    /// The zone or address is outside what this server may manage.
    NotAllowed(String),

    /// Any other directory failure, including loss of the connection.
    Database(String),
}

impl Error {
    /// Translates a directory failure into the management taxonomy.
    ///
    /// This is the only place where LDAP result codes are interpreted.
    /// The messages produced are generic; callers usually replace them
    /// with [`Error::reword`] to name the resource involved.
    pub fn from_directory(error: directory::Error) -> Self {
        use directory::ResultCode;

        match error.result_code() {
            Some(ResultCode::NO_SUCH_OBJECT) | Some(ResultCode::NO_SUCH_ATTRIBUTE) => {
                Self::NotFound(error.to_string())
            }
            Some(ResultCode::ATTRIBUTE_OR_VALUE_EXISTS) | Some(ResultCode::ENTRY_ALREADY_EXISTS) => {
                Self::AlreadyExists(error.to_string())
            }
            _ => Self::Database(error.to_string()),
        }
    }

    /// Replaces the message of a [`NotFound`](Error::NotFound) or
    /// [`AlreadyExists`](Error::AlreadyExists) error. Other variants
    /// pass through untouched, so database failures keep the
    /// directory's own description.
    pub fn reword(self, message: impl FnOnce() -> String) -> Self {
        match self {
            Self::NotFound(_) => Self::NotFound(message()),
            Self::AlreadyExists(_) => Self::AlreadyExists(message()),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotFound(message)
            | Self::AlreadyExists(message)
            | Self::InvalidInput(message)
            | Self::NotAllowed(message) => f.write_str(message),
            Self::Database(message) => write!(f, "Database error: {}", message),
        }
    }
}

impl std::error::Error for Error {}

impl From<directory::Error> for Error {
    fn from(error: directory::Error) -> Self {
        Self::from_directory(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ResultCode;

    #[test]
    fn directory_codes_map_to_the_taxonomy() {
        let error = |code| directory::Error::result(code, "x");
        assert!(matches!(
            Error::from(error(ResultCode::NO_SUCH_OBJECT)),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from(error(ResultCode::NO_SUCH_ATTRIBUTE)),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from(error(ResultCode::ATTRIBUTE_OR_VALUE_EXISTS)),
            Error::AlreadyExists(_)
        ));
        assert!(matches!(
            Error::from(error(ResultCode::ENTRY_ALREADY_EXISTS)),
            Error::AlreadyExists(_)
        ));
        assert!(matches!(
            Error::from(error(ResultCode::INSUFFICIENT_ACCESS_RIGHTS)),
            Error::Database(_)
        ));
        assert!(matches!(
            Error::from(directory::Error::Connection("reset".into())),
            Error::Database(_)
        ));
    }

    #[test]
    fn reword_leaves_database_errors_alone() {
        let error = Error::Database("busy".into()).reword(|| "other".into());
        assert_eq!(error.to_string(), "Database error: busy");
        let error = Error::NotFound("x".into()).reword(|| "Host a not found".into());
        assert_eq!(error.to_string(), "Host a not found");
    }
}
