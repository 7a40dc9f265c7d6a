use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::error::DigestError;

/// Digest values for one piece of content, keyed by algorithm.
///
/// Values are lower-case hex strings. Serialized as a JSON object mapping
/// algorithm ids to values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestSet(BTreeMap<Algorithm, String>);

impl DigestSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, normalizing it to lower case.
    pub fn insert(&mut self, alg: Algorithm, value: impl Into<String>) -> Option<String> {
        self.0.insert(alg, value.into().to_ascii_lowercase())
    }

    /// The value for `alg`, if present.
    pub fn get(&self, alg: Algorithm) -> Option<&str> {
        self.0.get(&alg).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(algorithm, value)` pairs in algorithm order.
    pub fn iter(&self) -> impl Iterator<Item = (Algorithm, &str)> {
        self.0.iter().map(|(alg, value)| (*alg, value.as_str()))
    }

    /// Separate the `primary` value from the rest.
    ///
    /// Returns the primary digest and a set holding every other algorithm
    /// (the fixity values).
    pub fn split(mut self, primary: Algorithm) -> Result<(String, DigestSet), DigestError> {
        let value = self
            .0
            .remove(&primary)
            .ok_or(DigestError::MissingDigest(primary))?;
        Ok((value, self))
    }
}

impl FromIterator<(Algorithm, String)> for DigestSet {
    fn from_iter<I: IntoIterator<Item = (Algorithm, String)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (alg, value) in iter {
            set.insert(alg, value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_primary() {
        let set: DigestSet = [
            (Algorithm::Sha512, "aa".to_string()),
            (Algorithm::Md5, "bb".to_string()),
        ]
        .into_iter()
        .collect();
        let (primary, fixity) = set.split(Algorithm::Sha512).unwrap();
        assert_eq!(primary, "aa");
        assert_eq!(fixity.len(), 1);
        assert_eq!(fixity.get(Algorithm::Md5), Some("bb"));
    }

    #[test]
    fn split_missing_primary() {
        let mut set = DigestSet::new();
        set.insert(Algorithm::Md5, "bb");
        assert_eq!(
            set.split(Algorithm::Sha256),
            Err(DigestError::MissingDigest(Algorithm::Sha256))
        );
    }

    #[test]
    fn values_are_lowercased() {
        let mut set = DigestSet::new();
        set.insert(Algorithm::Sha1, "ABCDEF");
        assert_eq!(set.get(Algorithm::Sha1), Some("abcdef"));
    }

    #[test]
    fn json_shape() {
        let mut set = DigestSet::new();
        set.insert(Algorithm::Md5, "5d41402abc4b2a76b9719d911017c592");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"md5":"5d41402abc4b2a76b9719d911017c592"}"#);
        let parsed: DigestSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, set);
    }
}
