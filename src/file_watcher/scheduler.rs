//! Очередь отложенных задач на одном таймерном потоке.
//!
//! Вместо отдельного потока-таймера на каждый ключ все сроки хранятся в одной
//! куче; поток спит до ближайшего срока (`recv_timeout`) и будится командами.
//! Остановка детерминирована: оставшиеся задачи либо срабатывают сразу
//! (`flush`), либо отбрасываются, и поток возвращает их количество.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::DocwatchError;

enum Command<K> {
  Schedule { key: K, deadline: Instant },
  Shutdown { flush: bool },
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Entry<K> {
  deadline: Instant,
  seq: u64,
  key: K,
}

/// Итог остановки очереди.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Задачи, принудительно выполненные при остановке.
  pub flushed: usize,
  /// Задачи, отброшенные при остановке.
  pub dropped: usize,
}

pub struct DelayQueue<K> {
  tx: mpsc::Sender<Command<K>>,
  join: Option<thread::JoinHandle<DrainReport>>,
}

impl<K> DelayQueue<K>
where
  K: Ord + Send + 'static,
{
  /// Запустить таймерный поток. `on_expire` вызывается на нём для каждого ключа.
  pub fn start(name: &str, mut on_expire: impl FnMut(K) + Send + 'static) -> Result<Self, DocwatchError> {
    let (tx, rx) = mpsc::channel::<Command<K>>();

    let join = thread::Builder::new().name(name.to_string()).spawn(move || {
      let mut heap: BinaryHeap<Reverse<Entry<K>>> = BinaryHeap::new();
      let mut seq = 0u64;

      loop {
        let next = heap.peek().map(|Reverse(e)| e.deadline.saturating_duration_since(Instant::now()));
        let received = match next {
          Some(wait) => rx.recv_timeout(wait),
          None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
        };

        match received {
          Ok(Command::Schedule { key, deadline }) => {
            seq += 1;
            heap.push(Reverse(Entry { deadline, seq, key }));
          }
          Ok(Command::Shutdown { flush }) => return drain(heap, flush, &mut on_expire),
          Err(mpsc::RecvTimeoutError::Timeout) => {}
          Err(mpsc::RecvTimeoutError::Disconnected) => {
            warn!("delay queue handle dropped without shutdown");
            return drain(heap, false, &mut on_expire);
          }
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|Reverse(e)| e.deadline <= now) {
          if let Some(Reverse(entry)) = heap.pop() {
            on_expire(entry.key);
          }
        }
      }
    })?;

    Ok(Self { tx, join: Some(join) })
  }

  /// Поставить ключ на срабатывание через `delay`. Не блокирует.
  pub fn schedule(&self, key: K, delay: Duration) -> Result<(), DocwatchError> {
    let deadline = deadline_after(delay)?;
    self
      .tx
      .send(Command::Schedule { key, deadline })
      .map_err(|_| DocwatchError::ShutDown)
  }

  /// Остановить поток и дождаться его завершения.
  pub fn shutdown(mut self, flush: bool) -> DrainReport {
    let _ = self.tx.send(Command::Shutdown { flush });
    match self.join.take().map(thread::JoinHandle::join) {
      Some(Ok(report)) => report,
      Some(Err(_)) => {
        warn!("delay queue thread panicked");
        DrainReport::default()
      }
      None => DrainReport::default(),
    }
  }
}

/// Срок `now + delay`, если он представим в `Instant`.
pub fn deadline_after(delay: Duration) -> Result<Instant, DocwatchError> {
  Instant::now()
    .checked_add(delay)
    .ok_or(DocwatchError::DelayOutOfRange(delay))
}

fn drain<K: Ord>(heap: BinaryHeap<Reverse<Entry<K>>>, flush: bool, on_expire: &mut impl FnMut(K)) -> DrainReport {
  let pending = heap.len();
  if !flush {
    debug!("delay queue stopped, dropping {pending} pending task(s)");
    return DrainReport {
      flushed: 0,
      dropped: pending,
    };
  }
  debug!("delay queue stopped, flushing {pending} pending task(s)");
  for Reverse(entry) in heap.into_sorted_vec().into_iter().rev() {
    on_expire(entry.key);
  }
  DrainReport {
    flushed: pending,
    dropped: 0,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl FnMut(&'static str) + Send + 'static) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    (fired, move |k| sink.lock().unwrap().push(k))
  }

  #[test]
  fn fires_in_deadline_order() {
    let (fired, on_expire) = recorder();
    let queue = DelayQueue::start("test-timer", on_expire).unwrap();
    queue.schedule("late", Duration::from_millis(150)).unwrap();
    queue.schedule("early", Duration::from_millis(30)).unwrap();

    thread::sleep(Duration::from_millis(400));
    assert_eq!(*fired.lock().unwrap(), vec!["early", "late"]);

    let report = queue.shutdown(true);
    assert_eq!(report, DrainReport::default());
  }

  #[test]
  fn does_not_fire_before_deadline() {
    let (fired, on_expire) = recorder();
    let queue = DelayQueue::start("test-timer", on_expire).unwrap();
    queue.schedule("k", Duration::from_millis(300)).unwrap();

    thread::sleep(Duration::from_millis(50));
    assert!(fired.lock().unwrap().is_empty());
    queue.shutdown(false);
  }

  #[test]
  fn shutdown_with_flush_fires_pending_immediately() {
    let (fired, on_expire) = recorder();
    let queue = DelayQueue::start("test-timer", on_expire).unwrap();
    queue.schedule("b", Duration::from_secs(60)).unwrap();
    queue.schedule("a", Duration::from_secs(30)).unwrap();

    let report = queue.shutdown(true);
    assert_eq!(report.flushed, 2);
    assert_eq!(*fired.lock().unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn unrepresentable_delay_is_rejected_without_killing_the_thread() {
    let (fired, on_expire) = recorder();
    let queue = DelayQueue::start("test-timer", on_expire).unwrap();

    let err = queue.schedule("never", Duration::MAX).unwrap_err();
    assert!(matches!(err, DocwatchError::DelayOutOfRange(_)));

    queue.schedule("soon", Duration::from_millis(20)).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(*fired.lock().unwrap(), vec!["soon"]);
    assert_eq!(queue.shutdown(true), DrainReport::default());
  }

  #[test]
  fn shutdown_without_flush_drops_pending() {
    let (fired, on_expire) = recorder();
    let queue = DelayQueue::start("test-timer", on_expire).unwrap();
    queue.schedule("a", Duration::from_secs(30)).unwrap();

    let report = queue.shutdown(false);
    assert_eq!(report.dropped, 1);
    assert!(fired.lock().unwrap().is_empty());
  }
}
