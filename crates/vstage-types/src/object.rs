use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of a versioned object.
///
/// Object ids are opaque to vstage (URIs, ARKs, plain names). The only
/// requirement is that they are not empty.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Create an object id, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyObjectId);
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A 1-based object version number.
///
/// Serialized as a bare integer; displayed as `v{n}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VersionNum(u32);

impl VersionNum {
    /// The first version of any object.
    pub const FIRST: Self = Self(1);

    /// Create a version number. Zero is not a valid version.
    pub fn new(num: u32) -> Result<Self, TypeError> {
        if num == 0 {
            return Err(TypeError::InvalidVersion("0".into()));
        }
        Ok(Self(num))
    }

    /// The numeric value.
    pub fn num(&self) -> u32 {
        self.0
    }

    /// The version that follows this one.
    pub fn next(&self) -> Result<Self, TypeError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| TypeError::InvalidVersion(format!("{self} has no successor")))
    }
}

impl Default for VersionNum {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Debug for VersionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionNum({})", self.0)
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl TryFrom<u32> for VersionNum {
    type Error = TypeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VersionNum> for u32 {
    fn from(v: VersionNum) -> Self {
        v.0
    }
}

impl FromStr for VersionNum {
    type Err = TypeError;

    /// Parses `v3`, `V3` or `3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(['v', 'V']).unwrap_or(s);
        let num: u32 = digits
            .parse()
            .map_err(|_| TypeError::InvalidVersion(s.to_string()))?;
        Self::new(num)
    }
}
