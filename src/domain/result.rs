use serde::{Deserialize, Serialize};

/// A completed (or partially completed) item's derived URLs (spec.md §3
/// "Item Result"). Kept as a variant enum for the same reason `Item` is —
/// a video never carries `imageUrl`, an image never carries
/// `masterPlaylistUrl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mediaType", rename_all = "UPPERCASE")]
pub enum ItemResult {
    // `rename_all = "camelCase"` on the enum only renames the `mediaType`
    // tag value — it doesn't cascade into a struct variant's own fields, so
    // each variant needs its own to produce the camelCase wire shape
    // (`masterPlaylistUrl`, `thumbnailUrl`, ...) spec.md §3/§6 require.
    #[serde(rename_all = "camelCase")]
    Video {
        media_id: String,
        original_name: String,
        filename: String,
        status: &'static str,
        master_playlist_url: Option<String>,
        thumbnail_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        media_id: String,
        original_name: String,
        filename: String,
        status: &'static str,
        original_url: Option<String>,
        image_url: Option<String>,
        blurred_thumbnail_url: Option<String>,
    },
}

impl ItemResult {
    pub fn media_id(&self) -> &str {
        match self {
            ItemResult::Video { media_id, .. } | ItemResult::Image { media_id, .. } => media_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Success,
    Failed,
}

/// Last-written progress snapshot for a post (spec.md §3 "Per-post progress
/// record" / `progress` field).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub percentage: f64,
    pub message: String,
    pub status: ProgressStatus,
    pub current_media: usize,
    pub total_media: usize,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
