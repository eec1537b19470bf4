//! The counter document: identifier → build number.
//!
//! Stored as a single pretty-printed JSON object at the root of the storage
//! branch. Keys are kept sorted so every commit on the branch produces a
//! minimal, readable diff.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write as _;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SyncError;

/// File name of the counter document inside the storage branch.
pub const DEFAULT_FILE_NAME: &str = "build_numbers.json";

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Key naming one independent counter sequence.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Validate and wrap an identifier.
    ///
    /// # Errors
    /// Returns an error if `value` is empty or only whitespace.
    pub fn new(value: &str) -> Result<Self, IdentifierError> {
        if value.trim().is_empty() {
            return Err(IdentifierError);
        }
        Ok(Self(value.to_owned()))
    }

    /// The identifier as stored in the document.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The identifier input was empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierError;

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("identifier must be a non-empty string")
    }
}

impl std::error::Error for IdentifierError {}

// ---------------------------------------------------------------------------
// CounterDocument
// ---------------------------------------------------------------------------

/// What [`CounterDocument::initialize`] found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Initialized {
    /// The identifier had no usable value and now starts at 0.
    Created,
    /// The identifier already had this value.
    Existing(u64),
}

/// In-memory mapping from identifier to its current build number.
///
/// Absent identifiers read as 0. Values are `u64`, so a document holding a
/// negative or fractional number fails to load instead of being coerced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterDocument {
    counters: BTreeMap<String, u64>,
}

impl CounterDocument {
    /// Read and parse the document at `path`.
    ///
    /// # Errors
    /// [`SyncError::Read`] if the file is unreadable or is not a JSON object
    /// mapping strings to non-negative integers.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SyncError::Read {
            path: path.to_owned(),
            message: e.to_string(),
        })?;
        Self::parse(&contents).map_err(|message| SyncError::Read {
            path: path.to_owned(),
            message,
        })
    }

    /// Parse a document from its JSON text.
    ///
    /// # Errors
    /// Returns a message with serde's line/column detail on invalid input.
    pub fn parse(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid counter document: {e}"))
    }

    /// Serialize as pretty JSON (two-space indent) with a trailing newline.
    ///
    /// # Errors
    /// Only if serde fails, which a string → integer map never does.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Make sure `identifier` has an entry, inserting 0 if it is missing.
    ///
    /// A stored 0 is treated the same as a missing entry.
    pub fn initialize(&mut self, identifier: &Identifier) -> Initialized {
        match self.counters.get(identifier.as_str()) {
            Some(&value) if value > 0 => {
                info!(%identifier, value, "Current build number: {value}");
                Initialized::Existing(value)
            }
            _ => {
                self.counters.insert(identifier.as_str().to_owned(), 0);
                info!(%identifier, "No build number found for {identifier}, initializing");
                Initialized::Created
            }
        }
    }

    /// Current value for `identifier` (0 if absent).
    #[must_use]
    pub fn get(&self, identifier: &Identifier) -> u64 {
        self.counters.get(identifier.as_str()).copied().unwrap_or(0)
    }

    /// Add exactly one to `identifier` and return the new value.
    ///
    /// # Errors
    /// [`SyncError::Overflow`] if the value is already `u64::MAX`.
    pub fn increment(&mut self, identifier: &Identifier) -> Result<u64, SyncError> {
        let slot = self
            .counters
            .entry(identifier.as_str().to_owned())
            .or_insert(0);
        *slot = slot.checked_add(1).ok_or_else(|| SyncError::Overflow {
            identifier: identifier.to_string(),
        })?;
        info!(%identifier, value = *slot, "New build number: {}", *slot);
        Ok(*slot)
    }

    /// Write the document to `path`, replacing it atomically.
    ///
    /// The JSON is written to a temporary file in the same directory and
    /// renamed over `path`, so a concurrent reader sees either the old or
    /// the new document, never a prefix.
    ///
    /// # Errors
    /// [`SyncError::Write`] on any I/O failure.
    pub fn persist(&self, path: &Path) -> Result<(), SyncError> {
        let write_err = |message: String| SyncError::Write {
            path: path.to_owned(),
            message,
        };
        let json = self.to_json().map_err(|e| write_err(e.to_string()))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;
        Ok(())
    }
}

/// Create an empty (`{}`) document at `path` if nothing is there yet.
///
/// # Errors
/// [`SyncError::Write`] if the directory or file cannot be created.
pub fn ensure_document(path: &Path) -> Result<(), SyncError> {
    let write_err = |e: std::io::Error| SyncError::Write {
        path: path.to_owned(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            let json = CounterDocument::default()
                .to_json()
                .map_err(|e| write_err(e.into()))?;
            file.write_all(json.as_bytes()).map_err(write_err)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(write_err(e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
