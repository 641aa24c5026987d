//! Error taxonomy (spec.md §7). Kinds, not type hierarchies: the executor
//! matches on these variants to decide fatal-vs-swallowed, never on a
//! library's underlying error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Download/upload/callback I/O that the broker's retry policy should
    /// handle. Always propagated as a job-attempt failure.
    #[error("transient I/O error: {0}")]
    TransientIO(String),

    /// A rendition encode or an image's main downscale failed. Fatal for the
    /// item, which makes it fatal for the job attempt (spec.md §7).
    #[error("encoder failed (exit {code:?}): {stderr_tail}")]
    EncoderFailed {
        code: Option<i32>,
        stderr_tail: String,
    },

    /// The encoder binary itself could not be spawned. Fatal for the attempt.
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// Master playlist synthesis produced no output file. Fatal for the item.
    #[error("master playlist missing for item {media_id}")]
    MasterPlaylistMissing { media_id: String },

    /// Progress Store read/write failure. Never raised to the job; callers
    /// must fall back to the documented defaults. Kept in the enum so
    /// call sites can log it uniformly before discarding it.
    #[error("progress store unavailable: {0}")]
    StoreUnavailable(String),

    /// Scratch-directory purge failure. Logged, never raised.
    #[error("cleanup failed: {0}")]
    CleanupFailed(String),

    /// Contract violation caught before any state is written (empty
    /// `media`, malformed job payload).
    #[error("validation error: {0}")]
    Validation(String),
}
