//! Encoder Driver (spec.md §4.C): subprocess lifecycle for encoder
//! invocations, plus the four canned argv builders (spec.md §6, normative
//! flags).

mod progress;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::domain::Rendition;
use crate::error::WorkerError;

pub use progress::{compute_percent, parse_duration_line, parse_time_line};

/// Number of trailing stderr lines kept for `EncoderFailed.stderr_tail`.
const STDERR_TAIL_LINES: usize = 20;

pub struct EncoderDriver {
    binary: PathBuf,
}

impl EncoderDriver {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Spawns the encoder with `args`, streaming stderr for progress.
    /// `on_progress` receives a 0-100 percentage each time a new `time=`
    /// marker is parsed and is awaited in place before the next stderr line
    /// is read — callers that need to touch the Progress Store from the
    /// callback can simply return an async block that borrows their own
    /// locals, no spawning or shared ownership required.
    pub async fn run<F, Fut>(&self, args: &[String], mut on_progress: F) -> Result<(), WorkerError>
    where
        F: FnMut(f64) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Mid-encode cancellation (spec.md §5) discards the rendition's
            // partial output; killing the child when its handle drops (task
            // abort, process exit) is what makes that safe.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::EncoderUnavailable(e.to_string()))?;

        let stderr = child
            .stderr
            .take()
            .expect("stderr piped at spawn");
        let mut lines = BufReader::new(stderr).lines();

        let mut total_seconds: Option<f64> = None;
        let mut tail: std::collections::VecDeque<String> = std::collections::VecDeque::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| WorkerError::TransientIO(format!("reading encoder stderr: {e}")))?
        {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.clone());

            if total_seconds.is_none() {
                total_seconds = parse_duration_line(&line);
            }
            if let (Some(total), Some(current)) = (total_seconds, parse_time_line(&line)) {
                on_progress(compute_percent(total, current)).await;
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| WorkerError::EncoderUnavailable(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(WorkerError::EncoderFailed {
                code: status.code(),
                stderr_tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
            })
        }
    }
}

/// Basename without its extension, used as the stem for every derived
/// filename (spec.md §6).
fn stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

fn ext(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn path_str(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

pub fn video_rendition_args(
    input: &Path,
    out_dir: &Path,
    rendition: &Rendition,
    filename: &str,
) -> Vec<String> {
    let stem = stem(filename);
    let label = rendition.label;
    let segment_pattern = path_str(out_dir, &format!("{stem}_{label}_%03d.ts"));
    let playlist = path_str(out_dir, &format!("{stem}_{label}.m3u8"));

    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-hide_banner".into(),
        "-y".into(),
        "-vf".into(),
        format!("scale=w=-2:h={}", rendition.height),
        "-c:v".into(),
        "h264".into(),
        "-profile:v".into(),
        "main".into(),
        "-crf".into(),
        "20".into(),
        "-g".into(),
        "48".into(),
        "-keyint_min".into(),
        "48".into(),
        "-b:v".into(),
        rendition.video_bitrate.into(),
        "-maxrate".into(),
        rendition.maxrate.into(),
        "-bufsize".into(),
        rendition.bufsize.into(),
        "-c:a".into(),
        "aac".into(),
        "-ar".into(),
        "48000".into(),
        "-b:a".into(),
        rendition.audio_bitrate.into(),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        "4".into(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_segment_filename".into(),
        segment_pattern,
        playlist,
    ]
}

pub fn video_thumbnail_args(
    input: &Path,
    out_dir: &Path,
    filename: &str,
    offset: &str,
) -> Vec<String> {
    let stem = stem(filename);
    let out = path_str(out_dir, &format!("{stem}_thumbnail.jpg"));

    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-ss".into(),
        offset.into(),
        "-vframes".into(),
        "1".into(),
        "-vf".into(),
        "scale=320:180".into(),
        "-q:v".into(),
        "2".into(),
        "-y".into(),
        out,
    ]
}

pub fn image_downscale_args(input: &Path, out_dir: &Path, filename: &str) -> Vec<String> {
    let stem = stem(filename);
    let ext = ext(filename);
    let out = path_str(out_dir, &format!("{stem}_processed{ext}"));

    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vf".into(),
        "scale=1920:1080:force_original_aspect_ratio=decrease".into(),
        "-q:v".into(),
        "2".into(),
        "-y".into(),
        out,
    ]
}

pub fn image_blurred_thumb_args(input: &Path, out_dir: &Path, filename: &str) -> Vec<String> {
    let stem = stem(filename);
    let out = path_str(out_dir, &format!("{stem}_blurred_thumbnail.jpg"));

    vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vf".into(),
        "scale=320:240:force_original_aspect_ratio=decrease,boxblur=10:1".into(),
        "-q:v".into(),
        "5".into(),
        "-y".into(),
        out,
    ]
}
