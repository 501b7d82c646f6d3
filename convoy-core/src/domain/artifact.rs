//! Artifact domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A build or deploy output; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    /// Where the artifact lives (registry reference, object-store URL, ...)
    pub location: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub produced_at: chrono::DateTime<chrono::Utc>,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        location: impl Into<String>,
        size_bytes: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: kind.into(),
            location: location.into(),
            size_bytes,
            checksum: checksum.into(),
            produced_at: chrono::Utc::now(),
        }
    }
}
