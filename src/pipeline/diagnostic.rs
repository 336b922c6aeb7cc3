//! Per-request artifact folders for inspecting a diagnosis after the fact.
//!
//! Off unless `AppConfig::dump_dir` is set (`BRAINSCAN_DUMP_DIR`). Each
//! diagnosis then gets `{dump_dir}/{request_id}/` holding:
//!
//! ```text
//! 00-upload-info.json        extension, kind, size, original dimensions
//! 01-preprocessed.png        150x150 classifier input
//! 02-prediction.json         category and confidence
//! 03-overlay.png             explanation overlay (when produced)
//! 03-explanation.json        selected segments and surrogate weights
//! 04-tumor-information.txt   encyclopedia text as shown to the user
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

// ──────────────────────────────────────────────
// Dump root
// ──────────────────────────────────────────────

/// Where diagnosis artifacts go, if anywhere.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticDump {
    base: Option<PathBuf>,
}

impl DiagnosticDump {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    pub fn disabled() -> Self {
        Self { base: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_some()
    }

    /// Open the artifact folder of one request.
    ///
    /// `None` when dumping is off, or when the folder cannot be created
    /// (logged; the diagnosis carries on without a dump).
    pub fn for_request(&self, request_id: &Uuid) -> Option<RequestDump> {
        let dir = self.base.as_ref()?.join(request_id.to_string());
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(RequestDump {
                dir,
                request_id: *request_id,
                written: 0,
                failed: 0,
            }),
            Err(e) => {
                tracing::warn!(
                    %request_id,
                    path = %dir.display(),
                    error = %e,
                    "Diagnostic dump disabled for request"
                );
                None
            }
        }
    }
}

// ──────────────────────────────────────────────
// Per-request artifacts
// ──────────────────────────────────────────────

/// Artifact folder of a single diagnosis. Writes are best-effort.
#[derive(Debug)]
pub struct RequestDump {
    dir: PathBuf,
    request_id: Uuid,
    written: usize,
    failed: usize,
}

impl RequestDump {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Raw bytes (PNG images).
    pub fn bytes(&mut self, name: &str, data: &[u8]) {
        let path = self.dir.join(name);
        match std::fs::write(&path, data) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(path = %path.display(), error = %e, "Diagnostic artifact not written");
            }
        }
    }

    /// Pretty-printed JSON.
    pub fn json<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) {
        match serde_json::to_vec_pretty(value) {
            Ok(json) => self.bytes(name, &json),
            Err(e) => {
                self.failed += 1;
                tracing::warn!(artifact = name, error = %e, "Diagnostic artifact not serialized");
            }
        }
    }

    pub fn text(&mut self, name: &str, text: &str) {
        self.bytes(name, text.as_bytes());
    }

    /// Close the folder, logging what landed on disk. Returns the count written.
    pub fn finish(self) -> usize {
        tracing::debug!(
            request_id = %self.request_id,
            path = %self.dir.display(),
            written = self.written,
            failed = self.failed,
            "Diagnostic dump complete"
        );
        self.written
    }
}
