use serde::{Deserialize, Serialize};

/// A `cleanup-failed-media` job: best-effort deletion of a failed post's
/// originals, consumed by the single-concurrency cleanup worker (spec.md
/// §4.G, §9 open question — the interface is normative, the deletion
/// itself is not; see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupFailedMediaJob {
    pub post_id: String,
    pub s3_keys: Vec<String>,
}
