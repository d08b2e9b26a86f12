//! Receipt printing.
//!
//! A rendered HTML receipt is staged, handed to the print subsystem and
//! discarded after a fixed delay. The print subsystem gives no completion
//! signal, so the delays are a heuristic; everything sits behind
//! [`PrintTarget`] so a driver that can report completion can replace it.
//! Failures are logged and swallowed: printing never fails the caller.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Directory name under the data dir where staged receipts are written.
pub const RECEIPTS_DIR: &str = "receipts";

const PRINT_ON_LOAD: &str =
    "<script>window.addEventListener('load',function(){window.focus();window.print();});</script>";

/// A document written somewhere the print subsystem can reach.
#[derive(Debug, Clone)]
pub struct StagedDocument {
    pub id: String,
    pub path: Option<PathBuf>,
}

pub trait PrintTarget: Send + Sync {
    /// Write the document where it can be printed from.
    fn stage(&self, html: &str) -> Result<StagedDocument, String>;
    /// Open the native print dialog for a staged document.
    fn trigger(&self, staged: &StagedDocument) -> Result<(), String>;
    /// Remove whatever `stage` created. Must not fail.
    fn discard(&self, staged: &StagedDocument);
}

#[derive(Debug, Clone, Copy)]
pub struct PrintTiming {
    /// Wait between staging and triggering.
    pub settle: Duration,
    /// Wait between triggering and discarding.
    pub cleanup: Duration,
}

impl Default for PrintTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            cleanup: Duration::from_millis(2000),
        }
    }
}

impl PrintTiming {
    pub const IMMEDIATE: PrintTiming = PrintTiming {
        settle: Duration::ZERO,
        cleanup: Duration::ZERO,
    };
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintOutcome {
    pub document_id: Option<String>,
    pub printed: bool,
    pub error: Option<String>,
}

/// Stage, trigger, then discard `html`. Never returns an error; the outcome
/// is reported for logging only.
pub async fn print_document(target: &dyn PrintTarget, html: &str, timing: PrintTiming) -> PrintOutcome {
    let staged = match target.stage(html) {
        Ok(staged) => staged,
        Err(error) => {
            warn!(error = %error, "Receipt could not be staged for printing");
            return PrintOutcome {
                document_id: None,
                printed: false,
                error: Some(error),
            };
        }
    };

    tokio::time::sleep(timing.settle).await;

    let result = target.trigger(&staged);
    match &result {
        Ok(()) => info!(document_id = %staged.id, "Print dialog opened"),
        Err(error) => warn!(document_id = %staged.id, error = %error, "Print trigger failed"),
    }

    tokio::time::sleep(timing.cleanup).await;
    target.discard(&staged);

    PrintOutcome {
        document_id: Some(staged.id),
        printed: result.is_ok(),
        error: result.err(),
    }
}

/// Injects the auto-print hook right before `</body>`.
fn with_print_hook(html: &str) -> String {
    match html.rfind("</body>") {
        Some(position) => {
            let mut out = String::with_capacity(html.len() + PRINT_ON_LOAD.len());
            out.push_str(&html[..position]);
            out.push_str(PRINT_ON_LOAD);
            out.push_str(&html[position..]);
            out
        }
        None => format!("{html}{PRINT_ON_LOAD}"),
    }
}

/// Prints through the system browser: the receipt is written to
/// `{data_dir}/receipts`, opened, and prints itself on load.
pub struct BrowserPrintTarget {
    receipts_dir: PathBuf,
}

impl BrowserPrintTarget {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            receipts_dir: data_dir.join(RECEIPTS_DIR),
        }
    }
}

impl PrintTarget for BrowserPrintTarget {
    fn stage(&self, html: &str) -> Result<StagedDocument, String> {
        fs::create_dir_all(&self.receipts_dir)
            .map_err(|e| format!("create receipts dir: {e}"))?;
        let id = Uuid::new_v4().to_string();
        let path = self.receipts_dir.join(format!("receipt-{id}.html"));
        fs::write(&path, with_print_hook(html)).map_err(|e| format!("write receipt: {e}"))?;
        Ok(StagedDocument {
            id,
            path: Some(path),
        })
    }

    fn trigger(&self, staged: &StagedDocument) -> Result<(), String> {
        let path = staged.path.as_ref().ok_or("Receipt was not staged to disk")?;
        let target = path.to_str().ok_or("Receipt path is not valid UTF-8")?;
        webbrowser::open(target).map_err(|e| format!("Failed to open receipt: {e}"))
    }

    fn discard(&self, staged: &StagedDocument) {
        if let Some(path) = &staged.path {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove staged receipt {}: {e}", path.display());
            }
        }
    }
}

/// Accepts every document without printing it.
#[cfg(test)]
pub(crate) struct NullPrintTarget;

#[cfg(test)]
impl PrintTarget for NullPrintTarget {
    fn stage(&self, _html: &str) -> Result<StagedDocument, String> {
        Ok(StagedDocument {
            id: Uuid::new_v4().to_string(),
            path: None,
        })
    }

    fn trigger(&self, _staged: &StagedDocument) -> Result<(), String> {
        Ok(())
    }

    fn discard(&self, _staged: &StagedDocument) {}
}
