//! Durable record of one export's generated file.

use crate::{FileId, FileStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub id: FileId,
    pub file_name: String,
    /// Path relative to the file storage root.
    pub path: String,
    pub status: FileStatus,
    pub owner: UserId,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

impl FileArtifact {
    /// A new artifact in `Exporting` state at its deterministic storage path.
    pub fn exporting(id: FileId, owner: UserId, file_name: &str, now: Timestamp) -> Self {
        Self {
            id,
            file_name: file_name.to_string(),
            path: storage_path(owner, id, file_name),
            status: FileStatus::Exporting,
            owner,
            created_at: now,
            updated_at: None,
        }
    }
}

/// `{owner}/{id}_{file_name}`
pub fn storage_path(owner: UserId, id: FileId, file_name: &str) -> String {
    format!("{}/{}_{}", owner, id, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_storage_path_layout() {
        let id = Uuid::nil();
        assert_eq!(
            storage_path(12, id, "servers.xlsx"),
            "12/00000000-0000-0000-0000-000000000000_servers.xlsx"
        );
    }

    #[test]
    fn test_exporting_artifact_starts_non_terminal() {
        let artifact = FileArtifact::exporting(Uuid::now_v7(), 3, "a.xlsx", Utc::now());
        assert_eq!(artifact.status, FileStatus::Exporting);
        assert!(artifact.path.starts_with("3/"));
    }
}
