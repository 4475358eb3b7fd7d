//! Модуль мониторинга файловой системы.
//!
//! Отвечает за:
//! - регистрацию рекурсивных `notify` watcher'ов на всех корнях
//! - фильтрацию сырых событий (`PathFilter`)
//! - debounce по имени файла (`Debouncer`)
//! - graceful shutdown: watcher → таймеры → доставки → соединение с БД

pub mod debounce;
pub mod events;
pub mod filter;
pub mod scheduler;

pub use debounce::{DebounceOutcome, Debouncer};
pub use events::{EventKind, PendingNotification, RawEvent};
pub use filter::PathFilter;
pub use scheduler::DrainReport;

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::{ShutdownPolicy, WatchConfig};
use crate::error::DocwatchError;
use crate::pipeline::DeliveryPipeline;

/// Что произошло с сырым событием.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
  /// Вне корней или расширение не из белого списка.
  Filtered,
  Armed,
  Suppressed,
  Closed,
  Rejected,
}

/// PathFilter → Debouncer.
pub struct EventRouter {
  filter: PathFilter,
  debouncer: Debouncer,
}

impl EventRouter {
  pub fn new(filter: PathFilter, debouncer: Debouncer) -> Self {
    Self { filter, debouncer }
  }

  pub fn filter(&self) -> &PathFilter {
    &self.filter
  }

  pub fn debouncer(&self) -> &Debouncer {
    &self.debouncer
  }

  pub fn route(&self, event: RawEvent) -> RouteOutcome {
    if !self.filter.accept(&event.path) {
      debug!("filtered {} {}", event.kind, event.path.display());
      return RouteOutcome::Filtered;
    }
    let file_name = match event.file_name() {
      Ok(name) => name,
      Err(err) => {
        warn!("{err}");
        return RouteOutcome::Filtered;
      }
    };
    match self.debouncer.on_event(&file_name, event.kind, event.path, event.observed_at) {
      DebounceOutcome::Armed => RouteOutcome::Armed,
      DebounceOutcome::Suppressed => RouteOutcome::Suppressed,
      DebounceOutcome::Closed => RouteOutcome::Closed,
      DebounceOutcome::Rejected => RouteOutcome::Rejected,
    }
  }
}

/// Handle запущенного supervisor'а.
pub struct SupervisorHandle {
  stop_tx: mpsc::Sender<()>,
  join: Option<thread::JoinHandle<()>>,
  roots: Vec<PathBuf>,
  router: Arc<EventRouter>,
  pipeline: Arc<DeliveryPipeline>,
  policy: ShutdownPolicy,
}

impl SupervisorHandle {
  pub fn roots(&self) -> &[PathBuf] {
    &self.roots
  }

  pub fn router(&self) -> &EventRouter {
    &self.router
  }

  /// Остановить наблюдение, обработать отложенные уведомления согласно
  /// политике, дождаться текущих доставок и закрыть соединение с БД.
  pub fn stop(mut self) -> Result<DrainReport, DocwatchError> {
    let _ = self.stop_tx.send(());
    if let Some(join) = self.join.take() {
      let _ = join.join();
    }

    let report = self.router.debouncer().shutdown(self.policy);
    info!(
      "Debouncer stopped: {} flushed, {} dropped",
      report.flushed, report.dropped
    );

    self.pipeline.audit().close()?;
    info!("Supervisor stopped");
    Ok(report)
  }
}

fn ensure_watch_root(root: &Path) -> Result<(), DocwatchError> {
  if !root.is_absolute() {
    return Err(DocwatchError::InvalidPath(format!(
      "watch root must be absolute: {}",
      root.display()
    )));
  }
  if !root.is_dir() {
    return Err(DocwatchError::InvalidPath(format!(
      "watch root is not a directory: {}",
      root.display()
    )));
  }
  Ok(())
}

/// Запустить supervisor.
///
/// Все корни регистрируются на одном `notify` watcher'е (общий обработчик).
/// Ошибка регистрации любого корня фатальна.
pub fn start_supervisor(
  config: &WatchConfig,
  pipeline: Arc<DeliveryPipeline>,
) -> Result<SupervisorHandle, DocwatchError> {
  for root in &config.roots {
    ensure_watch_root(root)?;
  }

  let deliver_pipeline = pipeline.clone();
  let debouncer = Debouncer::new(
    config.debounce_window,
    config.delivery_workers,
    Arc::new(move |pending: PendingNotification| {
      deliver_pipeline.deliver(&pending);
    }),
  )?;
  let router = Arc::new(EventRouter::new(PathFilter::new(&config.roots), debouncer));

  let (stop_tx, stop_rx) = mpsc::channel::<()>();
  let (event_tx, event_rx) = mpsc::channel::<Result<notify::Event, notify::Error>>();

  let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
    // best-effort send, закрытый receiver игнорируем.
    let _ = event_tx.send(res);
  })?;
  for root in &config.roots {
    watcher.watch(root, RecursiveMode::Recursive)?;
    info!("Watching: {}", root.display());
  }

  let loop_router = router.clone();
  let join = thread::Builder::new()
    .name("docwatch-watcher".to_string())
    .spawn(move || {
      // watcher живёт, пока крутится цикл.
      let _watcher = watcher;

      loop {
        // 1) graceful shutdown (сброшенный handle тоже остановка)
        match stop_rx.try_recv() {
          Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
            info!("Watcher shutdown requested");
            break;
          }
          Err(mpsc::TryRecvError::Empty) => {}
        }

        // 2) обработка событий notify
        match event_rx.recv_timeout(Duration::from_millis(250)) {
          Ok(Ok(event)) => {
            trace!("notify event: {:?}", event);
            let Some(kind) = EventKind::from_notify(&event.kind) else {
              continue;
            };
            for path in event.paths {
              if kind != EventKind::Deleted && path.is_dir() {
                continue;
              }
              loop_router.route(RawEvent::new(kind, path));
            }
          }
          Ok(Err(err)) => {
            warn!("notify error: {err}");
          }
          Err(mpsc::RecvTimeoutError::Timeout) => {
            // тик
          }
          Err(mpsc::RecvTimeoutError::Disconnected) => {
            error!("notify channel disconnected");
            break;
          }
        }
      }

      info!("Watcher thread finished");
    })?;

  Ok(SupervisorHandle {
    stop_tx,
    join: Some(join),
    roots: config.roots.clone(),
    router,
    pipeline,
    policy: config.shutdown_policy,
  })
}
