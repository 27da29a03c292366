use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Fully qualified package identifier, serialized as `owner/name@version`.
///
/// `james.collier412/NetMUG@5` parses to owner `james.collier412`,
/// name `NetMUG` and version `5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageName {
    pub owner: String,
    pub name: String,
    pub version: i64,
}

impl PackageName {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, version: i64) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            version,
        }
    }

    /// Parse `owner/name@version`.
    ///
    /// Splits on the first `/`, then the remainder on the first `@`, and
    /// reads the version as a base-10 integer. Anything else is `None`.
    pub fn parse(input: &str) -> Option<Self> {
        let (owner, rest) = input.split_once('/')?;
        let (name, version) = rest.split_once('@')?;
        let version = version.parse::<i64>().ok()?;

        Some(Self::new(owner, name, version))
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.version)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid package identifier: {0:?}")]
pub struct InvalidPackageName(pub String);

impl FromStr for PackageName {
    type Err = InvalidPackageName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidPackageName(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_name_and_version() {
        assert_eq!(
            PackageName::parse("alice/tool@3"),
            Some(PackageName::new("alice", "tool", 3))
        );
    }

    #[test]
    fn dotted_owner_is_fine() {
        let parsed = PackageName::parse("james.collier412/NetMUG@5").unwrap();
        assert_eq!(parsed.owner, "james.collier412");
        assert_eq!(parsed.name, "NetMUG");
        assert_eq!(parsed.version, 5);
    }

    #[test]
    fn missing_delimiters_do_not_match() {
        assert_eq!(PackageName::parse("badstring"), None);
        assert_eq!(PackageName::parse("alice/tool"), None);
        assert_eq!(PackageName::parse("tool@3"), None);
        assert_eq!(PackageName::parse(""), None);
    }

    #[test]
    fn non_integer_version_does_not_match() {
        assert_eq!(PackageName::parse("alice/tool@x"), None);
        assert_eq!(PackageName::parse("alice/tool@"), None);
        assert_eq!(PackageName::parse("alice/tool@1.5"), None);
    }

    #[test]
    fn splits_on_first_delimiters() {
        // The remainder after the first '@' must be the whole version.
        assert_eq!(PackageName::parse("alice/tool@1@2"), None);
        assert_eq!(
            PackageName::parse("alice/sub/tool@2"),
            Some(PackageName::new("alice", "sub/tool", 2))
        );
    }

    #[test]
    fn is_case_sensitive_and_displays_back() {
        let parsed: PackageName = "Alice/Tool@7".parse().unwrap();
        assert_eq!(parsed.owner, "Alice");
        assert_eq!(parsed.to_string(), "Alice/Tool@7");
        let err = "nope".parse::<PackageName>().unwrap_err();
        assert_eq!(err.to_string(), "invalid package identifier: \"nope\"");
    }
}
