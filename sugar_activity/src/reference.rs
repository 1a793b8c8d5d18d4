/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Names and addresses used on the bus.
//!
//! Every exported object is identified by a pair: the [`BusName`] it is
//! exported under, and its [`ObjectPath`]. Factories are exported under
//! their activity type, at the path derived from the type by [`get_path`].
//! Activity instances are addressed purely from their [`ActivityToken`]:
//!
//! | Entity   | Bus name                      | Object path                     |
//! |----------|-------------------------------|---------------------------------|
//! | Factory  | `org.example.Foo`             | `/org/example/Foo`              |
//! | Activity | `org.laptop.Activity<token>`  | `/org/laptop/Activity/<token>`  |

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Prefix of the bus name under which each activity instance is exported.
pub const ACTIVITY_SERVICE_NAME: &str = "org.laptop.Activity";

/// Root of the object paths at which activity instances are exported.
pub const ACTIVITY_SERVICE_PATH: &str = "/org/laptop/Activity";

/// The interface implemented by activity instances.
pub const ACTIVITY_INTERFACE: &str = "org.laptop.Activity";

/// The interface implemented by activity factories.
pub const ACTIVITY_FACTORY_INTERFACE: &str = "com.redhat.Sugar.ActivityFactory";

/// The type of error encountered while parsing names and addresses.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    /// The name was empty.
    #[error("empty name")]
    Empty,

    /// One of the dot separated segments of a name was empty.
    #[error("name '{0}' has an empty segment")]
    EmptySegment(String),

    /// The name contained a character that is not allowed.
    #[error("name '{0}' contains invalid character {1:?}")]
    InvalidCharacter(String, char),

    /// An object path did not start with '/'.
    #[error("object path '{0}' must be absolute")]
    RelativePath(String),

    /// A token could not be parsed.
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
}

fn validate_dotted(name: &str) -> Result<(), ReferenceError> {
    if name.is_empty() {
        return Err(ReferenceError::Empty);
    }
    for segment in name.split('.') {
        if segment.is_empty() {
            return Err(ReferenceError::EmptySegment(name.to_string()));
        }
        if let Some(c) = segment
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(ReferenceError::InvalidCharacter(name.to_string(), c));
        }
    }
    Ok(())
}

/// The name under which an object is exported on the bus. Activity types
/// and bundle service names are both bus names.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct BusName(String);

impl BusName {
    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The well-known object path of the factory exported under this name.
    pub fn object_path(&self) -> ObjectPath {
        get_path(&self.0)
    }
}

impl fmt::Display for BusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BusName {
    type Err = ReferenceError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        validate_dotted(name)?;
        Ok(Self(name.to_string()))
    }
}

impl TryFrom<String> for BusName {
    type Error = ReferenceError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        validate_dotted(&name)?;
        Ok(Self(name))
    }
}

impl From<BusName> for String {
    fn from(name: BusName) -> Self {
        name.0
    }
}

/// The address of an object exported on the bus.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = ReferenceError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        if !path.starts_with('/') {
            return Err(ReferenceError::RelativePath(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }
}

/// Returns the object path of the factory for the given activity type:
/// dots in the type name become path separators.
pub fn get_path(activity_type: &str) -> ObjectPath {
    ObjectPath(format!("/{}", activity_type.replace('.', "/")))
}

/// Identifies one activity instance for the lifetime of its process.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash
)]
pub struct ActivityToken(pub u64);

impl ActivityToken {
    /// The bus name the instance with this token is exported under.
    pub fn service_name(&self) -> BusName {
        BusName(format!("{}{}", ACTIVITY_SERVICE_NAME, self.0))
    }

    /// The object path the instance with this token is exported at.
    pub fn object_path(&self) -> ObjectPath {
        ObjectPath(format!("{}/{}", ACTIVITY_SERVICE_PATH, self.0))
    }
}

impl fmt::Display for ActivityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActivityToken {
    type Err = ReferenceError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Ok(Self(token.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_path() {
        assert_eq!(get_path("org.example.Foo").as_str(), "/org/example/Foo");
        assert_eq!(get_path("Foo").as_str(), "/Foo");
    }

    #[test]
    fn test_bus_name_parse() {
        let name: BusName = "org.laptop.Terminal".parse().unwrap();
        assert_eq!(name.object_path().as_str(), "/org/laptop/Terminal");

        assert_eq!("".parse::<BusName>().unwrap_err(), ReferenceError::Empty);
        assert_eq!(
            "org..Foo".parse::<BusName>().unwrap_err(),
            ReferenceError::EmptySegment("org..Foo".to_string())
        );
        assert_eq!(
            "org.Foo/Bar".parse::<BusName>().unwrap_err(),
            ReferenceError::InvalidCharacter("org.Foo/Bar".to_string(), '/')
        );
    }

    #[test]
    fn test_bus_name_serde_validates() {
        let name: BusName = serde_yaml::from_str("org.example.Foo").unwrap();
        assert_eq!(name.as_str(), "org.example.Foo");
        assert!(serde_yaml::from_str::<BusName>("org..Foo").is_err());
    }

    #[test]
    fn test_activity_token_addressing() {
        let token = ActivityToken(42);
        assert_eq!(token.service_name().as_str(), "org.laptop.Activity42");
        assert_eq!(token.object_path().as_str(), "/org/laptop/Activity/42");
        assert_eq!("42".parse::<ActivityToken>().unwrap(), token);
        assert!("x".parse::<ActivityToken>().is_err());
    }

    #[test]
    fn test_object_path_parse() {
        assert!("/a/b".parse::<ObjectPath>().is_ok());
        assert_eq!(
            "a/b".parse::<ObjectPath>().unwrap_err(),
            ReferenceError::RelativePath("a/b".to_string())
        );
    }
}
