use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A catalog entry identified by `(resource, action)`.
///
/// Rendered as `"resource:action"` inside tokens. Wildcards are not a thing
/// here; every grant is a concrete pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid permission '{0}' (expected resource:action)")]
pub struct PermissionParseError(pub String);

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((resource, action))
                if !resource.is_empty()
                    && !action.is_empty()
                    && !action.contains(':')
                    && action != "*" =>
            {
                Ok(Self::new(resource, action))
            }
            _ => Err(PermissionParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let p = Permission::new("users", "read");
        assert_eq!(p.to_string(), "users:read");
        assert_eq!("users:read".parse::<Permission>().unwrap(), p);
    }

    #[test]
    fn rejects_incomplete_and_wildcard_forms() {
        for bad in ["users", ":read", "users:", "users:*", "a:b:c", ""] {
            assert!(bad.parse::<Permission>().is_err(), "{bad} should not parse");
        }
    }
}
