//! Error types for the edgequake-ebook2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: the conversion cannot proceed at all
//!   (unsupported input, missing external tool, remote task failed or timed
//!   out). Returned as `Err(ConvertError)` from the top-level `convert*`
//!   functions.
//!
//! * [`ImageFailure`] — **Non-fatal**: a single embedded image could not be
//!   downloaded. The reference is left in place with a visible annotation and
//!   the failure is recorded in [`crate::output::ConversionOutput`], so one
//!   broken link never costs the whole document.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ebook2md library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Extension not recognised and the payload is not an inlined image.
    #[error("Unsupported input '{input}'\nSupported: pdf, png, jpg, jpeg, mobi, epub, or a base64 image.")]
    UnsupportedInput { input: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// An inlined base64 / data-URI payload could not be decoded.
    #[error("Could not decode inlined image data: {detail}")]
    UndecodableImage { detail: String },

    // ── External tool errors ──────────────────────────────────────────────
    /// A required external binary is not installed or does not respond.
    #[error("External tool '{tool}' is not available: {detail}\n{hint}")]
    ToolUnavailable {
        tool: String,
        detail: String,
        hint: String,
    },

    /// An external binary ran but reported failure.
    #[error("External tool '{tool}' failed: {diagnostics}")]
    ToolFailed { tool: String, diagnostics: String },

    // ── Remote backend errors ─────────────────────────────────────────────
    /// The remote backend needs an API key / secret key pair.
    #[error("Remote backend credentials are not configured.\nSet BAIDU_OCR_API_KEY and BAIDU_OCR_SECRET_KEY, or pass --api-key/--secret-key.")]
    MissingCredentials,

    /// Access-token acquisition failed.
    #[error("Authentication with the remote backend failed: {detail}\nCheck your API key and secret key.")]
    AuthFailed { detail: String },

    /// The parse job could not be submitted (HTTP error, API error, no task id).
    #[error("Failed to submit parse task: {detail}")]
    SubmitFailed { detail: String },

    /// A status query for a submitted task failed.
    #[error("Failed to query task '{task_id}': {detail}")]
    QueryFailed { task_id: String, detail: String },

    /// The backend reported a terminal failure for the submitted task.
    #[error("Remote parse task '{task_id}' failed: {message}")]
    RemoteTaskFailed { task_id: String, message: String },

    /// The task did not reach a terminal state within the wait budget.
    #[error("Remote parse task '{task_id}' did not finish within {waited:?}\nIncrease --max-wait or retry later.")]
    RemoteTimeout { task_id: String, waited: Duration },

    /// A result artifact (markdown, parse-result JSON) could not be downloaded.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Backend succeeded but produced no usable text.
    #[error("No content recognised in '{input}'")]
    NoContent { input: String },

    // ── Local pipeline errors ─────────────────────────────────────────────
    /// pdfium failed to open or rasterise the document.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file or its assets.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure to materialise one embedded image reference.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("image '{url}' could not be fetched: {reason}")]
pub struct ImageFailure {
    pub url: String,
    pub reason: String,
}
