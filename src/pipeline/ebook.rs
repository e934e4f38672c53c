//! MOBI/EPUB → PDF through Calibre's `ebook-convert`.
//!
//! Both backends work on PDFs, so reflowable ebooks are laid out into pages
//! first. The converted file lives in a [`TempDir`] owned by the returned
//! [`ConvertedPdf`] and disappears when it is dropped.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const INSTALL_HINT: &str =
    "Install Calibre (macOS: brew install calibre, Linux: apt-get install calibre) and make sure ebook-convert is on PATH.";

/// A PDF produced from an ebook, removed on drop.
#[derive(Debug)]
pub struct ConvertedPdf {
    path: PathBuf,
    _dir: TempDir,
}

impl ConvertedPdf {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Convert `ebook` to PDF with `binary`, bounded by `timeout`.
pub async fn ebook_to_pdf(
    binary: &str,
    ebook: &Path,
    timeout: Duration,
) -> Result<ConvertedPdf, ConvertError> {
    probe(binary).await?;

    let dir = TempDir::new().map_err(|e| ConvertError::Internal(format!("tempdir: {e}")))?;
    let stem = ebook
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ebook".to_string());
    let pdf = dir.path().join(format!("{stem}.pdf"));

    info!("Converting {} to PDF with {}", ebook.display(), binary);
    let run = Command::new(binary)
        .arg(ebook)
        .arg(&pdf)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| ConvertError::ToolFailed {
            tool: binary.to_string(),
            diagnostics: format!("conversion timed out after {}s", timeout.as_secs()),
        })?
        .map_err(|e| ConvertError::ToolFailed {
            tool: binary.to_string(),
            diagnostics: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(ConvertError::ToolFailed {
            tool: binary.to_string(),
            diagnostics,
        });
    }
    if !pdf.is_file() {
        return Err(ConvertError::ToolFailed {
            tool: binary.to_string(),
            diagnostics: format!("exited successfully but wrote no {}", pdf.display()),
        });
    }

    debug!("Ebook converted → {}", pdf.display());
    Ok(ConvertedPdf { path: pdf, _dir: dir })
}

/// `binary --version` must run and exit zero.
async fn probe(binary: &str) -> Result<(), ConvertError> {
    let unavailable = |detail: String| ConvertError::ToolUnavailable {
        tool: binary.to_string(),
        detail,
        hint: INSTALL_HINT.to_string(),
    };
    let run = Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(PROBE_TIMEOUT, run).await {
        Err(_) => Err(unavailable("version probe timed out".into())),
        Ok(Err(e)) => Err(unavailable(e.to_string())),
        Ok(Ok(status)) if !status.success() => {
            Err(unavailable(format!("version probe exited with {status}")))
        }
        Ok(Ok(_)) => Ok(()),
    }
}
