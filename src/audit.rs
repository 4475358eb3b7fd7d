//! Журнал доставленных событий: плоский файл + таблица `file_logs`.
//!
//! Две записи независимы: сбой одной не отменяет другую.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use rusqlite::{params, Connection};

use crate::error::DocwatchError;
use crate::file_watcher::EventKind;

/// Запись аудита. Одна на доставленное событие.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
  pub event_time: DateTime<Local>,
  pub event_kind: EventKind,
  pub file_name: String,
  /// Пользователь ОС, под которым работает процесс.
  pub script_user: Option<String>,
  /// Владелец файла. Источника для него нет, в журнал пишется `N/A`.
  pub owning_unit: Option<String>,
  /// Корень наблюдения, под которым лежит файл (поле `Klasör`).
  pub watch_root: Option<String>,
}

impl LogRecord {
  /// Строка плоского журнала (с переводом строки).
  ///
  /// `[YYYY-MM-DD HH:MM:SS] <KIND:<10> | <FILE:<40>`, с пользователем
  /// дополнительно `| User: <USER:<15> | Owner: <OWNER> | Klasör: <ROOT>`.
  pub fn to_line(&self) -> String {
    let mut line = format!(
      "[{}] {:<10} | {:<40}",
      self.event_time.format("%Y-%m-%d %H:%M:%S"),
      self.event_kind.as_str(),
      self.file_name
    );
    if let Some(user) = &self.script_user {
      line.push_str(&format!(
        " | User: {:<15} | Owner: {} | Klasör: {}",
        user,
        self.owning_unit.as_deref().unwrap_or("N/A"),
        self.watch_root.as_deref().unwrap_or("N/A")
      ));
    }
    line.push('\n');
    line
  }
}

/// Постоянное хранилище записей аудита.
pub trait AuditStore: Send {
  fn insert(&mut self, record: &LogRecord) -> Result<(), DocwatchError>;

  /// Освободить соединение. Вызывается один раз при остановке.
  fn close(self: Box<Self>) -> Result<(), DocwatchError>;
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS file_logs (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  event_time  TEXT NOT NULL,
  event_type  TEXT NOT NULL,
  filename    TEXT NOT NULL,
  script_user TEXT,
  owner       TEXT
)";

/// SQLite-хранилище с одним долгоживущим соединением.
pub struct SqliteAuditStore {
  conn: Connection,
}

impl SqliteAuditStore {
  /// Открыть (или создать) базу и таблицу `file_logs`.
  pub fn open(path: &Path) -> Result<Self, DocwatchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(CREATE_TABLE)?;
    info!("Audit database opened: {}", path.display());
    Ok(Self { conn })
  }

  pub fn connection(&self) -> &Connection {
    &self.conn
  }
}

impl AuditStore for SqliteAuditStore {
  fn insert(&mut self, record: &LogRecord) -> Result<(), DocwatchError> {
    self.conn.execute(
      "INSERT INTO file_logs (event_time, event_type, filename, script_user, owner)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![
        record.event_time.naive_local(),
        record.event_kind.as_str(),
        record.file_name,
        record.script_user,
        record.owning_unit,
      ],
    )?;
    Ok(())
  }

  fn close(self: Box<Self>) -> Result<(), DocwatchError> {
    self.conn.close().map_err(|(_, err)| DocwatchError::Database(err))
  }
}

pub struct AuditSink {
  log_file: PathBuf,
  /// Одна секция записи на файл, чтобы строки не перемешивались.
  file_lock: Mutex<()>,
  store: Mutex<Option<Box<dyn AuditStore>>>,
}

impl AuditSink {
  pub fn new(log_file: impl Into<PathBuf>, store: Box<dyn AuditStore>) -> Self {
    Self {
      log_file: log_file.into(),
      file_lock: Mutex::new(()),
      store: Mutex::new(Some(store)),
    }
  }

  pub fn log_file(&self) -> &Path {
    &self.log_file
  }

  /// Записать событие в файл и в хранилище.
  ///
  /// Обе записи выполняются всегда; если хотя бы одна не удалась,
  /// возвращается `AuditDegraded` с описанием сбоев.
  pub fn record(&self, record: &LogRecord) -> Result<(), DocwatchError> {
    let mut failures = Vec::new();

    if let Err(err) = self.append_line(&record.to_line()) {
      warn!("Cannot append to {}: {err}", self.log_file.display());
      failures.push(format!("log file: {err}"));
    }

    if let Err(err) = self.insert(record) {
      warn!("Cannot write audit row for {}: {err}", record.file_name);
      failures.push(format!("database: {err}"));
    }

    if failures.is_empty() {
      Ok(())
    } else {
      Err(DocwatchError::AuditDegraded(failures.join("; ")))
    }
  }

  fn append_line(&self, line: &str) -> Result<(), DocwatchError> {
    let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
    let mut file = OpenOptions::new().create(true).append(true).open(&self.log_file)?;
    file.write_all(line.as_bytes())?;
    Ok(())
  }

  fn insert(&self, record: &LogRecord) -> Result<(), DocwatchError> {
    let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_mut() {
      Some(store) => store.insert(record),
      None => Err(DocwatchError::ShutDown),
    }
  }

  /// Закрыть соединение с хранилищем. Повторный вызов ничего не делает.
  pub fn close(&self) -> Result<(), DocwatchError> {
    let store = self.store.lock().unwrap_or_else(PoisonError::into_inner).take();
    match store {
      Some(store) => {
        store.close()?;
        debug!("Audit store closed");
        Ok(())
      }
      None => Ok(()),
    }
  }
}
