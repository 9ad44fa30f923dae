use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a project in the catalog.
///
/// Identifiers start at 1, zero is never a valid project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ProjectId(u32);

impl ProjectId {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Convert to the underlying u32 value
    pub fn to_u32(self) -> u32 {
        self.0
    }

    /// Little-endian bytes used by the snapshot format.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Returns `None` if the bytes decode to zero.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }
}

impl TryFrom<u32> for ProjectId {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "project id cannot be zero".to_string())
    }
}

impl From<ProjectId> for u32 {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid project id '{s}': {e}"))?;
        Self::try_from(value)
    }
}

/// A project record as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub domain: String,
}

impl Project {
    pub fn new(id: ProjectId, draft: ProjectDraft) -> Self {
        Self {
            id,
            title: draft.title,
            summary: draft.summary,
            domain: draft.domain,
        }
    }

    /// Text fed to the embedding provider for this project.
    pub fn embedding_text(&self) -> String {
        crate::vector::project_text(&self.title, &self.summary)
    }
}

/// A project that has not been assigned an identifier yet.
///
/// Accepts the capitalised column names used by spreadsheet exports
/// (`Title`, `Summary`, `Domain`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "Summary")]
    pub summary: String,
    #[serde(default, alias = "Domain")]
    pub domain: String,
}

impl ProjectDraft {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into().trim().to_string(),
            summary: summary.into().trim().to_string(),
            domain: domain.into().trim().to_string(),
        }
    }
}
