//! Internal implementation of the canonical EMR identifier.

use crate::{UuidError, UuidResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

const HYPHEN_OFFSETS: [usize; 4] = [8, 13, 18, 23];

/// The EMR's canonical UUID representation (36 lowercase characters, hyphenated).
///
/// Once constructed, the contained UUID is known to have come from canonical text (or from the
/// generator), so formatting it back always yields the same string that was accepted.
///
/// # Construction
/// - [`EmrUuid::new`] generates a new random identifier.
/// - [`EmrUuid::parse`] validates an externally supplied identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmrUuid(Uuid);

impl Default for EmrUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl EmrUuid {
    /// Generates a new version 4 UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a UUID string that must already be in canonical form.
    ///
    /// Uppercase, simple (unhyphenated) and braced forms are not normalised.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not in canonical form.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 36 lowercase hyphenated characters, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid UUID '{}': {}", input, e)))
    }

    /// Returns the underlying `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// This is a purely syntactic check and can be used for pre-validation before [`parse`].
    ///
    /// [`parse`]: EmrUuid::parse
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 36
            && input.bytes().enumerate().all(|(i, b)| {
                if HYPHEN_OFFSETS.contains(&i) {
                    b == b'-'
                } else {
                    matches!(b, b'0'..=b'9' | b'a'..=b'f')
                }
            })
    }

    /// Returns `parent_dir/<s1>/<s2>/<uuid>.<extension>`.
    ///
    /// `s1` is the first two hex characters of the UUID and `s2` the next two.
    pub fn sharded_file(&self, parent_dir: &Path, extension: &str) -> PathBuf {
        let canonical = self.to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir
            .join(s1)
            .join(s2)
            .join(format!("{}.{}", canonical, extension))
    }
}

impl From<Uuid> for EmrUuid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for EmrUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EmrUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmrUuid::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for EmrUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for EmrUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EmrUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const SAMPLE: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_new_generates_canonical_uuid() {
        let id = EmrUuid::new();
        assert!(EmrUuid::is_canonical(&id.to_string()));
    }

    #[test]
    fn test_parse_valid_canonical_uuid() {
        let id = EmrUuid::parse(SAMPLE).expect("should parse");
        assert_eq!(id.to_string(), SAMPLE);
    }

    #[test]
    fn test_parse_rejects_simple_form() {
        let err = EmrUuid::parse("550e8400e29b41d4a716446655440000").unwrap_err();
        match err {
            UuidError::InvalidInput(msg) => assert!(msg.contains("36 lowercase")),
        }
    }

    #[test]
    fn test_parse_rejects_uppercase_uuid() {
        assert!(EmrUuid::parse("550E8400-E29B-41D4-A716-446655440000").is_err());
    }

    #[test]
    fn test_parse_rejects_misplaced_hyphens() {
        assert!(EmrUuid::parse("550e840-0e29b-41d4-a716-446655440000").is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_characters() {
        assert!(EmrUuid::parse("550e8400-e29b-41d4-a716-44665544000g").is_err());
        assert!(EmrUuid::parse("").is_err());
    }

    #[test]
    fn test_sharded_file_structure() {
        let id = EmrUuid::parse(SAMPLE).unwrap();
        let path = id.sharded_file(Path::new("/data/conditions"), "json");
        assert_eq!(
            path,
            PathBuf::from("/data/conditions/55/0e/550e8400-e29b-41d4-a716-446655440000.json")
        );
    }

    #[test]
    fn test_from_str_matches_parse() {
        let a: EmrUuid = SAMPLE.parse().unwrap();
        assert_eq!(a, EmrUuid::parse(SAMPLE).unwrap());
        assert!("nope".parse::<EmrUuid>().is_err());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<EmrUuid> = (0..100).map(|_| EmrUuid::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let id = EmrUuid::parse(SAMPLE).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", SAMPLE));
        let back: EmrUuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<EmrUuid>("\"550E8400-E29B-41D4-A716-446655440000\"").is_err());
    }
}
