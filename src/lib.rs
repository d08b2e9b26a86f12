//! Counter POS backend.
//!
//! Catalog, sale composer, sale history, business settings and receipt
//! printing over a local key-value store. Every operation is exposed as an
//! IPC-style command (`commands::dispatch`) taking a JSON payload and
//! returning JSON, so the same handlers serve the CLI and a UI bridge.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod catalog;
pub mod commands;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod print;
pub mod receipt_renderer;
pub mod sales;
pub mod settings;
pub mod store;

pub use commands::dispatch;
pub use error::{PosError, PosResult};

use print::{BrowserPrintTarget, PrintTarget, PrintTiming};
use sales::SaleComposer;
use settings::BusinessSettings;

/// Process-wide state shared by every command.
pub struct AppState {
    pub db: db::DbState,
    /// The sale being composed. Lives in memory until completed.
    pub composer: Mutex<SaleComposer>,
    /// Unsaved edits from the settings form.
    pub settings_draft: Mutex<Option<BusinessSettings>>,
    pub printer: Box<dyn PrintTarget>,
    pub print_timing: PrintTiming,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open (or create) the store under `data_dir` and print through the
    /// system browser.
    pub fn open(data_dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| format!("create data dir {}: {e}", data_dir.display()))?;
        let db = db::init(data_dir)?;
        Ok(Self::with_parts(
            db,
            Box::new(BrowserPrintTarget::new(data_dir)),
            PrintTiming::default(),
            data_dir.to_path_buf(),
        ))
    }

    pub fn with_parts(
        db: db::DbState,
        printer: Box<dyn PrintTarget>,
        print_timing: PrintTiming,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            composer: Mutex::new(SaleComposer::new()),
            settings_draft: Mutex::new(None),
            printer,
            print_timing,
            data_dir,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        let data_dir =
            std::env::temp_dir().join(format!("counter_pos_state_{}", uuid::Uuid::new_v4()));
        Self::with_parts(
            db::init_in_memory(),
            Box::new(print::NullPrintTarget),
            PrintTiming::IMMEDIATE,
            data_dir,
        )
    }
}

/// Console + daily rolling file logging. The console layer writes to stderr
/// so stdout stays free for command output.
pub fn init_logging(data_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,counter_pos_lib=debug"));

    let log_dir = diagnostics::get_log_dir(data_dir);
    std::fs::create_dir_all(&log_dir).ok();
    diagnostics::prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Dropping the guard flushes and stops the writer; the process owns it
    // until exit.
    std::mem::forget(_guard);

    info!("Starting Counter POS v{}", env!("CARGO_PKG_VERSION"));
}
