//! Debounce по имени файла.
//!
//! Состояния слота: нет записи (Idle) → `Pending` (таймер взведён) →
//! `Delivering` (колбэк доставки выполняется на рабочем потоке) → Idle.
//! Пока слот занят, новые события для того же имени подавляются: таймер не
//! продлевается, доставляются данные *первого* события в окне.
//!
//! Ключом служит только имя файла, без директории. Одноимённые файлы в разных
//! папках делят один слот.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use super::events::{EventKind, PendingNotification};
use super::scheduler::{deadline_after, DelayQueue, DrainReport};
use crate::config::ShutdownPolicy;
use crate::error::DocwatchError;

/// Колбэк доставки: вызывается ровно один раз на отложенное уведомление.
pub type DeliverFn = dyn Fn(PendingNotification) + Send + Sync + 'static;

/// Результат `on_event`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceOutcome {
  /// Создано новое отложенное уведомление.
  Armed,
  /// Для этого имени уже есть отложенное уведомление, событие отброшено.
  Suppressed,
  /// Debouncer остановлен.
  Closed,
  /// Таймер не удалось поставить, слот не занят.
  Rejected,
}

enum Slot {
  Pending(PendingNotification),
  Delivering,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
  slots.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Debouncer {
  window: Duration,
  slots: Slots,
  closed: AtomicBool,
  timers: Mutex<Option<DelayQueue<String>>>,
  workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Debouncer {
  /// Создать debouncer с окном `window` и `workers` потоками доставки.
  ///
  /// Окно, для которого срок срабатывания не представим, отклоняется сразу.
  pub fn new(window: Duration, workers: usize, deliver: Arc<DeliverFn>) -> Result<Self, DocwatchError> {
    if deadline_after(window).is_err() {
      return Err(DocwatchError::InvalidConfig {
        key: "DEBOUNCE_SECS",
        message: format!("debounce window {}s is out of range", window.as_secs()),
      });
    }
    let slots: Slots = Arc::new(Mutex::new(HashMap::new()));
    let (fire_tx, fire_rx) = crossbeam_channel::unbounded::<PendingNotification>();

    let mut handles = Vec::with_capacity(workers.max(1));
    for i in 0..workers.max(1) {
      let rx = fire_rx.clone();
      let slots = slots.clone();
      let deliver = deliver.clone();
      let handle = thread::Builder::new()
        .name(format!("docwatch-deliver-{i}"))
        .spawn(move || {
          for pending in rx {
            let file_name = pending.file_name.clone();
            deliver(pending);
            // Слот освобождается только после завершения доставки.
            lock(&slots).remove(&file_name);
            debug!("{file_name}: slot released");
          }
        })?;
      handles.push(handle);
    }

    let timer_slots = slots.clone();
    let timers = DelayQueue::start("docwatch-timer", move |file_name: String| {
      let pending = {
        let mut guard = lock(&timer_slots);
        match guard.get_mut(&file_name) {
          Some(slot) => match std::mem::replace(slot, Slot::Delivering) {
            Slot::Pending(p) => Some(p),
            Slot::Delivering => None,
          },
          None => None,
        }
      };
      let Some(pending) = pending else {
        warn!("{file_name}: timer fired for a slot that is not pending");
        return;
      };
      if fire_tx.send(pending).is_err() {
        warn!("{file_name}: delivery workers are gone, notification lost");
        lock(&timer_slots).remove(&file_name);
      }
    })?;

    Ok(Self {
      window,
      slots,
      closed: AtomicBool::new(false),
      timers: Mutex::new(Some(timers)),
      workers: Mutex::new(handles),
    })
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  /// Обработать событие, уже прошедшее фильтр. Не блокирует.
  pub fn on_event(&self, file_name: &str, kind: EventKind, path: PathBuf, now: DateTime<Local>) -> DebounceOutcome {
    if self.closed.load(Ordering::Acquire) {
      return DebounceOutcome::Closed;
    }

    let mut guard = lock(&self.slots);
    if guard.contains_key(file_name) {
      info!(
        "{file_name}: notification pending, waiting {}s; {kind} event suppressed",
        self.window.as_secs()
      );
      return DebounceOutcome::Suppressed;
    }

    let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(queue) = timers.as_ref() else {
      return DebounceOutcome::Closed;
    };
    match queue.schedule(file_name.to_string(), self.window) {
      Ok(()) => {}
      Err(DocwatchError::ShutDown) => return DebounceOutcome::Closed,
      Err(err) => {
        warn!("{file_name}: cannot arm notification: {err}");
        return DebounceOutcome::Rejected;
      }
    }
    guard.insert(
      file_name.to_string(),
      Slot::Pending(PendingNotification {
        file_name: file_name.to_string(),
        kind,
        path,
        first_observed_at: now,
      }),
    );
    debug!("{file_name}: {kind} armed for {}s", self.window.as_secs());
    DebounceOutcome::Armed
  }

  /// Есть ли незавершённое уведомление для имени.
  pub fn is_pending(&self, file_name: &str) -> bool {
    lock(&self.slots).contains_key(file_name)
  }

  pub fn pending_count(&self) -> usize {
    lock(&self.slots).len()
  }

  /// Остановить приём событий, обработать отложенные таймеры согласно
  /// `policy` и дождаться завершения текущих доставок. Повторный вызов
  /// ничего не делает.
  pub fn shutdown(&self, policy: ShutdownPolicy) -> DrainReport {
    self.closed.store(true, Ordering::Release);

    let queue = self.timers.lock().unwrap_or_else(PoisonError::into_inner).take();
    let report = match queue {
      Some(queue) => queue.shutdown(policy == ShutdownPolicy::Flush),
      None => return DrainReport::default(),
    };

    // Таймерный поток завершён, вместе с ним освобождён отправитель канала:
    // рабочие потоки доработают очередь и выйдут.
    let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
    for handle in handles {
      if handle.join().is_err() {
        warn!("delivery worker panicked");
      }
    }

    if report.dropped > 0 {
      warn!("{} pending notification(s) dropped on shutdown", report.dropped);
      lock(&self.slots).clear();
    }
    report
  }
}

impl Drop for Debouncer {
  fn drop(&mut self) {
    self.shutdown(ShutdownPolicy::Drop);
  }
}
