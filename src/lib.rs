use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod messenger;

pub use crate::messenger::conversation_aggregator::{
    AggregationOutcome, AggregatorConfig, Conversation, ConversationAggregator,
    CounterpartSummary, UserResolver,
};
pub use crate::messenger::database::{Database, DatabaseError};
pub use crate::messenger::error::{MessengerError, Result};
pub use crate::messenger::messages::{Message, NewMessage, ReadTransition};
pub use crate::messenger::sessions::{SessionError, SessionStore, SessionVerifier};
pub use crate::messenger::users::{User, UserId};
pub use crate::messenger::{Messenger, MessengerConfig};

static TRACING_GUARDS: OnceCell<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber: stdout plus a daily-rotated file in
/// `logs_dir`, filtered by `RUST_LOG` (default `info`). Only the first call
/// has any effect.
pub(crate) fn init_tracing(logs_dir: &Path) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("messenger")
            .filename_suffix("log")
            .build(logs_dir)
            .map_err(|e| MessengerError::LoggingSetup(e.to_string()))?;

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        // A host application may already own the global subscriber
        if Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already set, keeping it");
        }

        Ok::<(), MessengerError>(())
    })?;

    Ok(())
}

/// Flushes buffered log lines. Call before the process exits.
pub fn flush_tracing() {
    if let Some(guards) = TRACING_GUARDS.get()
        && let Ok(mut guards) = guards.lock()
    {
        guards.take();
    }
}
