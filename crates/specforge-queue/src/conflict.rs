//! Conflict record shared between the conflict detector and SyncState (§3, §4.H).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Duplicate,
    ConcurrentModification,
    VersionMismatch,
    DependencyViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub operation_ids: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub auto_resolve_hint: Option<String>,
}

impl Conflict {
    #[must_use]
    pub fn is_auto_resolvable(&self) -> bool {
        matches!(
            self.conflict_type,
            ConflictType::Duplicate | ConflictType::ConcurrentModification | ConflictType::DependencyViolation
        )
    }
}
