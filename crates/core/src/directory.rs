//! Static identity directory: direct-address overrides, group fallbacks and
//! leader escalation targets, keyed by normalized identity.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::NudgeError;
use crate::task::normalize_identity;

/// One person known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEntry {
    pub identity: String,
    /// Chat address to use instead of the identity itself.
    #[serde(default)]
    pub address: Option<String>,
    /// Group address used when direct delivery is impossible.
    #[serde(default)]
    pub group: Option<String>,
    /// Identity of the person's leader, for escalations.
    #[serde(default)]
    pub leader: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    people: Vec<PersonEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    people: HashMap<String, PersonEntry>,
}

impl Directory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a YAML document of the form `people: [{ identity, address, group, leader }]`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, NudgeError> {
        let file: DirectoryFile = serde_yaml::from_str(yaml)?;
        let mut directory = Self::empty();
        for entry in file.people {
            if normalize_identity(&entry.identity).is_empty() {
                return Err(NudgeError::Config(
                    "directory entry with empty identity".to_string(),
                ));
            }
            directory.insert(entry);
        }
        Ok(directory)
    }

    /// Load the directory file. A missing file yields an empty directory.
    pub fn load(path: &Path) -> Result<Self, NudgeError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "directory file not found, using empty directory");
            return Ok(Self::empty());
        }
        let yaml = std::fs::read_to_string(path)?;
        let directory = Self::from_yaml_str(&yaml)?;
        tracing::info!(path = %path.display(), people = directory.len(), "loaded identity directory");
        Ok(directory)
    }

    pub fn insert(&mut self, entry: PersonEntry) {
        self.people.insert(normalize_identity(&entry.identity), entry);
    }

    pub fn get(&self, identity: &str) -> Option<&PersonEntry> {
        self.people.get(&normalize_identity(identity))
    }

    /// Explicit direct address for an identity, if configured.
    pub fn address_override(&self, identity: &str) -> Option<&str> {
        self.get(identity)
            .and_then(|p| p.address.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn group_of(&self, identity: &str) -> Option<&str> {
        self.get(identity)
            .and_then(|p| p.group.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Normalized identity of the leader to escalate to.
    pub fn leader_of(&self, identity: &str) -> Option<String> {
        self.get(identity)
            .and_then(|p| p.leader.as_deref())
            .map(normalize_identity)
            .filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}
