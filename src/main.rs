//! Точка входа: конфигурация → журнал/БД → FCM → supervisor → ожидание Ctrl+C.

use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use log::{error, info};

use docwatch::audit::{AuditSink, SqliteAuditStore};
use docwatch::config::WatchConfig;
use docwatch::file_watcher::{start_supervisor, PathFilter};
use docwatch::logging;
use docwatch::notifier::{FcmChannel, Notifier};
use docwatch::pipeline::{Attribution, DeliveryPipeline};
use docwatch::DocwatchError;

fn run() -> Result<(), DocwatchError> {
  let config = WatchConfig::from_env()?;

  info!("Watched folders:");
  for root in &config.roots {
    info!("  - {}", root.display());
  }

  // Любая ошибка ниже считается сбоем конфигурации, процесс не стартует.
  let store = SqliteAuditStore::open(&config.database_path)?;
  let audit = Arc::new(AuditSink::new(&config.log_file, Box::new(store)));
  let channel = FcmChannel::from_credentials_file(&config.credentials_path)?;
  let notifier = Notifier::new(
    Box::new(channel),
    config.device_token.clone(),
    config.base_path.clone(),
    config.locale,
  );

  let mut pipeline = DeliveryPipeline::new(audit, notifier, config.locale);
  if config.record_script_user {
    pipeline = pipeline.with_attribution(Attribution::current_user(PathFilter::new(&config.roots)));
  }

  let (signal_tx, signal_rx) = mpsc::channel::<()>();
  ctrlc::set_handler(move || {
    let _ = signal_tx.send(());
  })?;

  let handle = start_supervisor(&config, Arc::new(pipeline))?;
  info!(
    "docwatch started: {} root(s), debounce {}s",
    handle.roots().len(),
    config.debounce_window.as_secs()
  );

  let _ = signal_rx.recv();
  info!("Interrupt received, shutting down");

  let report = handle.stop()?;
  info!(
    "Shutdown complete ({} pending notification(s) flushed, {} dropped)",
    report.flushed, report.dropped
  );
  Ok(())
}

fn main() -> ExitCode {
  logging::init_logging();

  match run() {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      error!("{err}");
      ExitCode::FAILURE
    }
  }
}
