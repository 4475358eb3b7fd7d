//! Общие помощники интеграционных тестов: фейковый push-канал, сбойное
//! хранилище, сборка конвейера во временной директории.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use docwatch::audit::{AuditSink, AuditStore, LogRecord, SqliteAuditStore};
use docwatch::config::{Locale, ShutdownPolicy, WatchConfig};
use docwatch::notifier::{NotificationPayload, Notifier, PushChannel};
use docwatch::pipeline::DeliveryPipeline;
use docwatch::DocwatchError;

/// Собирает отправленные уведомления в потокобезопасную очередь.
#[derive(Clone, Default)]
pub struct RecordingChannel {
  sent: Arc<Mutex<VecDeque<NotificationPayload>>>,
  fail: bool,
}

impl RecordingChannel {
  pub fn new() -> Self {
    Self::default()
  }

  /// Канал, который отклоняет каждое сообщение (но запоминает попытку).
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::default()
    }
  }

  pub fn take_all(&self) -> Vec<NotificationPayload> {
    self.sent.lock().unwrap().drain(..).collect()
  }

  pub fn count(&self) -> usize {
    self.sent.lock().unwrap().len()
  }
}

impl PushChannel for RecordingChannel {
  fn push(&self, payload: &NotificationPayload) -> Result<String, DocwatchError> {
    self.sent.lock().unwrap().push_back(payload.clone());
    if self.fail {
      Err(DocwatchError::Push("send: provider returned status 503".to_string()))
    } else {
      Ok(format!("projects/test/messages/{}", self.count()))
    }
  }
}

/// Хранилище, которое «лежит»: каждая вставка завершается ошибкой.
pub struct UnavailableStore;

impl AuditStore for UnavailableStore {
  fn insert(&mut self, _record: &LogRecord) -> Result<(), DocwatchError> {
    Err(DocwatchError::Database(rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
      Some("database is unreachable".to_string()),
    )))
  }

  fn close(self: Box<Self>) -> Result<(), DocwatchError> {
    Ok(())
  }
}

/// Временное окружение: корень наблюдения, журнал и БД.
pub struct Fixture {
  pub dir: TempDir,
  pub root: PathBuf,
  pub log_file: PathBuf,
  pub db_file: PathBuf,
  pub channel: RecordingChannel,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_channel(RecordingChannel::new())
  }

  pub fn with_channel(channel: RecordingChannel) -> Self {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let root = dir.path().join("QUALITY");
    std::fs::create_dir_all(&root).expect("Failed to create watch root");
    let log_file = dir.path().join("kalite_dosya_loglari.txt");
    let db_file = dir.path().join("file_logs.db");
    Self {
      dir,
      root,
      log_file,
      db_file,
      channel,
    }
  }

  pub fn config(&self, window: Duration, policy: ShutdownPolicy) -> WatchConfig {
    WatchConfig {
      roots: vec![self.root.clone()],
      base_path: Some(self.dir.path().to_path_buf()),
      log_file: self.log_file.clone(),
      database_path: self.db_file.clone(),
      credentials_path: self.dir.path().join("service-account.json"),
      device_token: "test-device".to_string(),
      debounce_window: window,
      locale: Locale::Tr,
      delivery_workers: 2,
      shutdown_policy: policy,
      record_script_user: false,
    }
  }

  pub fn pipeline(&self) -> Arc<DeliveryPipeline> {
    let store = SqliteAuditStore::open(&self.db_file).expect("Failed to open audit db");
    self.pipeline_with_store(Box::new(store))
  }

  pub fn pipeline_with_store(&self, store: Box<dyn AuditStore>) -> Arc<DeliveryPipeline> {
    let audit = Arc::new(AuditSink::new(&self.log_file, store));
    let notifier = Notifier::new(
      Box::new(self.channel.clone()),
      "test-device",
      Some(self.dir.path().to_path_buf()),
      Locale::Tr,
    );
    Arc::new(DeliveryPipeline::new(audit, notifier, Locale::Tr))
  }

  pub fn log_lines(&self) -> Vec<String> {
    std::fs::read_to_string(&self.log_file)
      .map(|s| s.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  /// Строки таблицы `file_logs`: (event_type, filename).
  pub fn db_rows(&self) -> Vec<(String, String)> {
    let conn = rusqlite::Connection::open(&self.db_file).expect("Failed to open db");
    let mut stmt = conn
      .prepare("SELECT event_type, filename FROM file_logs ORDER BY id")
      .expect("Failed to prepare");
    let rows = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
      .expect("Failed to query")
      .collect::<Result<Vec<_>, _>>()
      .expect("Failed to read rows");
    rows
  }
}

/// Ожидание условия с таймаутом.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
  let start = Instant::now();
  while start.elapsed() < timeout {
    if cond() {
      return true;
    }
    thread::sleep(Duration::from_millis(20));
  }
  cond()
}

/// Создаёт (или перезаписывает) файл с содержимым.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, contents).expect("Failed to write test file");
  path
}
