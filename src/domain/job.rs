use serde::{Deserialize, Serialize};

/// Fields common to every media item regardless of type.
///
/// The wire field is `id` (spec.md §3 "Item", §6 job payload literal
/// `media:[{id,type,filename,originalName,height}]`) — distinct from the
/// `mediaId` field `ItemResult` reports back, so the rename can't just
/// fall out of the struct-level `camelCase` below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCommon {
    #[serde(rename = "id")]
    pub media_id: String,
    pub filename: String,
    pub original_name: String,
}

/// One media item within a job's `media` array.
///
/// spec.md §9 calls out that a `type` tag with nullable per-type fields is
/// the wrong shape here: a video never has an `imageUrl` and an image never
/// has a `masterPlaylistUrl`. A variant enum makes the impossible states
/// unrepresentable instead of leaving both result shapes behind optional
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Item {
    Video {
        #[serde(flatten)]
        common: ItemCommon,
        /// Source vertical resolution in pixels; determines the rendition
        /// ceiling (spec.md §3).
        height: u32,
    },
    Image {
        #[serde(flatten)]
        common: ItemCommon,
    },
}

impl Item {
    pub fn common(&self) -> &ItemCommon {
        match self {
            Item::Video { common, .. } | Item::Image { common, .. } => common,
        }
    }

    pub fn media_id(&self) -> &str {
        &self.common().media_id
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Item::Video { .. } => MediaType::Video,
            Item::Image { .. } => MediaType::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Video,
    Image,
}

/// A job delivered by the broker (spec.md §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub post_id: String,
    pub media: Vec<Item>,
    pub s3_key: String,
    pub user_id: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    pub attempt: u32,
}

impl Job {
    /// The empty-media contract violation (spec.md §8): callers must reject
    /// this before any state is written.
    pub fn validate(&self) -> Result<(), crate::error::WorkerError> {
        if self.media.is_empty() {
            return Err(crate::error::WorkerError::Validation(
                "job.media must contain at least one item".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_deserializes_media_id_from_wire_field_id() {
        let raw = r#"{"id":"m1","type":"VIDEO","filename":"a.mp4","originalName":"a.mp4","height":720}"#;
        let item: Item = serde_json::from_str(raw).expect("wire payload must deserialize");
        assert_eq!(item.media_id(), "m1");
    }
}
