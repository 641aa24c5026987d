//! Image Pipeline (spec.md §4.D).

use std::path::Path;

use tracing::warn;

use crate::blob::BlobClient;
use crate::domain::ItemCommon;
use crate::encoder::{image_blurred_thumb_args, image_downscale_args, EncoderDriver};
use crate::error::WorkerError;
use crate::domain::ItemResult;

/// Runs the downscale → blurred-thumbnail → copy-original → upload sequence
/// for one IMAGE item and returns its populated [`ItemResult`].
///
/// `input_path` is the already-downloaded original; `out_dir` is the item's
/// clean per-item scratch output directory; `dest_prefix` is
/// `<s3Key>processed` (no trailing slash).
pub async fn run_image_pipeline(
    driver: &EncoderDriver,
    blob: &dyn BlobClient,
    input_path: &Path,
    out_dir: &Path,
    common: &ItemCommon,
    dest_prefix: &str,
) -> Result<ItemResult, WorkerError> {
    let downscale_args = image_downscale_args(input_path, out_dir, &common.filename);
    driver.run(&downscale_args, |_| async {}).await?;

    let blurred_args = image_blurred_thumb_args(input_path, out_dir, &common.filename);
    if let Err(err) = driver.run(&blurred_args, |_| async {}).await {
        warn!(
            media_id = %common.media_id,
            error = %err,
            "blurred thumbnail generation failed, continuing without it"
        );
    }

    let original_dest = out_dir.join(&common.filename);
    tokio::fs::copy(input_path, &original_dest)
        .await
        .map_err(|e| WorkerError::TransientIO(format!("copy original into scratch dir: {e}")))?;

    let uploaded = blob.upload_directory(out_dir, dest_prefix).await?;

    let processed_suffix = "_processed";
    let blurred_suffix = "_blurred_thumbnail.jpg";

    let image_url = uploaded
        .iter()
        .find(|f| f.original_name.contains(processed_suffix))
        .map(|f| f.url.clone());
    let blurred_thumbnail_url = uploaded
        .iter()
        .find(|f| f.original_name.ends_with(blurred_suffix))
        .map(|f| f.url.clone());
    let original_url = uploaded
        .iter()
        .find(|f| f.original_name == common.filename)
        .map(|f| f.url.clone());

    Ok(ItemResult::Image {
        media_id: common.media_id.clone(),
        original_name: common.original_name.clone(),
        filename: common.filename.clone(),
        status: "success",
        original_url,
        image_url,
        blurred_thumbnail_url,
    })
}
