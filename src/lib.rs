pub mod agent_core;
pub mod config;
pub mod db_tools;
pub mod inference;
pub mod server;

use std::path::{Path, PathBuf};

use config::AppConfig;
use server::ServerError;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Env var that switches log output to one JSON object per line.
const LOG_JSON_ENV: &str = "NL2SQL_LOG_JSON";

/// Return the platform-standard data directory for nl2sql-agent.
///
/// - macOS: `~/Library/Application Support/nl2sql-agent/`
/// - Linux: `$XDG_DATA_HOME/nl2sql-agent/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.nl2sql-agent/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("nl2sql-agent");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nl2sql-agent")
}

/// Initialize the tracing subscriber, writing structured logs to the data directory.
///
/// On each startup:
/// 1. Rotates existing logs (server.log → server.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh server.log with a line-flushing writer.
/// 3. Logs a startup banner with the data directory path.
///
/// If the log file can't be opened, logs go to stderr instead.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let log_path = log_dir.join("server.log");
    rotate_log_file(&log_path, 3);

    let (writer, log_target) = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => (
            BoxMakeWriter::new(FlushingWriter::new(file)),
            log_path.display().to_string(),
        ),
        Err(_) => (BoxMakeWriter::new(std::io::stderr), "stderr".to_string()),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nl2sql_agent=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);
    if std::env::var_os(LOG_JSON_ENV).is_some() {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_target,
        pid = std::process::id(),
        "=== nl2sql-agent starting ==="
    );
}

/// Start the service and block until it shuts down.
pub async fn run(config: AppConfig) -> Result<(), ServerError> {
    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        model = %config.models.active_model,
        max_rounds = config.agent.max_rounds,
        row_limit = config.agent.row_limit,
        "starting service"
    );
    server::serve(config).await
}

/// Rotate log files: `server.log` → `server.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// `tracing-subscriber` buffers output; without the flush a crash can lose
/// the last lines.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
