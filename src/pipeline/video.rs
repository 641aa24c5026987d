//! Video Pipeline (spec.md §4.E).

use std::path::Path;

use tracing::warn;

use crate::blob::BlobClient;
use crate::domain::{select_renditions, ItemCommon, Rendition};
use crate::encoder::{video_rendition_args, video_thumbnail_args, EncoderDriver};
use crate::error::WorkerError;
use crate::domain::ItemResult;

const THUMBNAIL_OFFSET: &str = "00:00:01";

/// Strips a trailing `k`/`K` and parses the remainder as an integer
/// kilobit rate (spec.md §4.E step 4).
fn parse_kbps(value: &str) -> u64 {
    value
        .trim_end_matches(['k', 'K'])
        .parse()
        .unwrap_or(0)
}

/// Builds `<stem>_master.m3u8`'s contents (spec.md §4.E step 4).
pub fn synthesize_master_playlist(stem: &str, renditions: &[Rendition]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    for r in renditions {
        let bandwidth = (parse_kbps(r.video_bitrate) + parse_kbps(r.audio_bitrate)) * 1000;
        let width = (r.height as f64 * 16.0 / 9.0).round() as u32;
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={bandwidth},RESOLUTION={width}x{height},NAME=\"{label}\"\n",
            height = r.height,
            label = r.label,
        ));
        out.push_str(&format!("{stem}_{label}.m3u8\n\n", label = r.label));
    }
    out
}

/// Runs rendition selection, serial per-rendition encode, best-effort
/// thumbnail, and master-playlist synthesis for one VIDEO item.
///
/// `on_rendition_progress` receives the raw 0-100 encoder percentage for
/// the rendition currently encoding and a future to drive to completion
/// before the next stderr line is read; the executor is responsible for
/// weighting this into its own progress band (spec.md §4.F step 5).
pub async fn run_video_pipeline<F, Fut>(
    driver: &EncoderDriver,
    blob: &dyn BlobClient,
    input_path: &Path,
    out_dir: &Path,
    common: &ItemCommon,
    height: u32,
    dest_prefix: &str,
    mut on_rendition_progress: F,
) -> Result<ItemResult, WorkerError>
where
    F: FnMut(f64) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let renditions = select_renditions(height);

    let thumb_args = video_thumbnail_args(input_path, out_dir, &common.filename, THUMBNAIL_OFFSET);
    if let Err(err) = driver.run(&thumb_args, |_| async {}).await {
        warn!(
            media_id = %common.media_id,
            error = %err,
            "video thumbnail generation failed, continuing without it"
        );
    }

    for rendition in &renditions {
        let args = video_rendition_args(input_path, out_dir, rendition, &common.filename);
        driver
            .run(&args, |pct| on_rendition_progress(pct))
            .await?;
    }

    let stem = Path::new(&common.filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&common.filename);

    let playlist_contents = synthesize_master_playlist(stem, &renditions);
    let playlist_path = out_dir.join(format!("{stem}_master.m3u8"));
    tokio::fs::write(&playlist_path, playlist_contents)
        .await
        .map_err(|e| WorkerError::TransientIO(format!("write master playlist: {e}")))?;

    if !playlist_path.exists() {
        return Err(WorkerError::MasterPlaylistMissing {
            media_id: common.media_id.clone(),
        });
    }

    let uploaded = blob.upload_directory(out_dir, dest_prefix).await?;

    let master_playlist_url = uploaded
        .iter()
        .find(|f| f.original_name.ends_with("_master.m3u8"))
        .map(|f| f.url.clone());
    let thumbnail_url = uploaded
        .iter()
        .find(|f| f.original_name.ends_with("_thumbnail.jpg"))
        .map(|f| f.url.clone());

    if master_playlist_url.is_none() {
        return Err(WorkerError::MasterPlaylistMissing {
            media_id: common.media_id.clone(),
        });
    }

    Ok(ItemResult::Video {
        media_id: common.media_id.clone(),
        original_name: common.original_name.clone(),
        filename: common.filename.clone(),
        status: "success",
        master_playlist_url,
        thumbnail_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RENDITION_LADDER;

    #[test]
    fn bandwidth_for_720p_matches_spec_example() {
        let playlist = synthesize_master_playlist("a", &[RENDITION_LADDER[1]]);
        assert!(playlist.contains("BANDWIDTH=2928000"));
        assert!(playlist.contains("RESOLUTION=1280x720"));
    }

    #[test]
    fn single_rung_ladder_has_one_stream_inf() {
        let playlist = synthesize_master_playlist("a", &[RENDITION_LADDER[0]]);
        assert_eq!(playlist.matches("#EXT-X-STREAM-INF").count(), 1);
    }

    #[test]
    fn playlist_header_is_exact() {
        let playlist = synthesize_master_playlist("a", &[RENDITION_LADDER[0]]);
        assert!(playlist.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n\n"));
    }
}
