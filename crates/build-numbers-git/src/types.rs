//! Core types for the build-numbers git abstraction layer.
//!
//! These types form the vocabulary shared between the [`GitRepo`](crate::GitRepo)
//! trait and its callers. They carry no backend types: the git CLI is an
//! implementation detail of [`CliRepo`](crate::CliRepo).

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (SHA-1, 20 bytes).
///
/// Displays as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// Abbreviated form used in log lines.
    #[must_use]
    pub fn short(&self) -> String {
        self.to_string()[..8].to_owned()
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (slot, pair) in bytes.iter_mut().zip(s.as_bytes().chunks(2)) {
            let digit = |b: u8| {
                hex_digit(b).ok_or_else(|| OidParseError {
                    value: s.to_owned(),
                    reason: format!("invalid hex digit '{}'", b as char),
                })
            };
            *slot = (digit(pair[0])? << 4) | digit(pair[1])?;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// BranchName
// ---------------------------------------------------------------------------

/// A validated short branch name (`build-numbers`, `ci/counters`).
///
/// Follows the subset of `git check-ref-format --branch` rules that matter
/// for names we build refspecs from: no whitespace, no control characters,
/// none of `~^:?*[\`, no `..` or `@{`, no leading `-` or `/`, no trailing
/// `/`, `.` or `.lock`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Create a new `BranchName`, validating it.
    ///
    /// # Errors
    /// Returns an error if the name could not be used as `refs/heads/<name>`.
    pub fn new(name: &str) -> Result<Self, BranchNameError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// Return the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fully-qualified local ref, `refs/heads/<name>`.
    #[must_use]
    pub fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    fn validate(name: &str) -> Result<(), BranchNameError> {
        let reject = |reason: &str| {
            Err(BranchNameError {
                value: name.to_owned(),
                reason: reason.to_owned(),
            })
        };
        if name.is_empty() {
            return reject("branch name must not be empty");
        }
        if name.starts_with('-') || name.starts_with('/') {
            return reject("branch name must not start with '-' or '/'");
        }
        if name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
            return reject("branch name must not end with '/', '.' or '.lock'");
        }
        if name.contains("..") || name.contains("@{") || name.contains("//") {
            return reject("branch name must not contain '..', '@{' or '//'");
        }
        if name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
        {
            return reject("branch name contains a character git does not allow");
        }
        Ok(())
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = BranchNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Error from validating a [`BranchName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNameError {
    /// The invalid value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for BranchNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid branch name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for BranchNameError {}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

/// One regular-file (`100644`) entry of a tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File name (a single path component).
    pub name: String,
    /// Object the entry points at.
    pub oid: GitOid,
}

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Result of fetching a single branch from a remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote has the branch; its tip is now available locally.
    Fetched(GitOid),
    /// The remote does not have the branch.
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn oid_parse_display_roundtrip() {
        let oid: GitOid = HEX.parse().unwrap();
        assert_eq!(oid.to_string(), HEX);
        assert_eq!(oid.short(), "01234567");
    }

    #[test]
    fn oid_parse_accepts_uppercase() {
        let oid: GitOid = HEX.to_uppercase().parse().unwrap();
        assert_eq!(oid.to_string(), HEX);
    }

    #[test]
    fn oid_parse_rejects_bad_length_and_digits() {
        assert!("abc".parse::<GitOid>().is_err());
        let bad = format!("{}zz", &HEX[..38]);
        let err = bad.parse::<GitOid>().unwrap_err();
        assert!(err.reason.contains("invalid hex digit"), "{err}");
    }

    #[test]
    fn branch_names_accepted() {
        for name in ["build-numbers", "ci/counters", "release-1.2"] {
            let branch = BranchName::new(name).unwrap();
            assert_eq!(branch.as_str(), name);
        }
        let branch = BranchName::new("build-numbers").unwrap();
        assert_eq!(branch.local_ref(), "refs/heads/build-numbers");
    }

    #[test]
    fn branch_names_rejected() {
        for name in [
            "", "-x", "/x", "x/", "x.", "x.lock", "a..b", "a@{b", "a b", "a:b", "a~1", "a//b",
        ] {
            assert!(BranchName::new(name).is_err(), "{name:?} should be rejected");
        }
    }
}
