//! Типы событий file_watcher.
//!
//! `RawEvent` живёт только внутри конвейера и никогда не сохраняется как есть;
//! в аудит и уведомления попадает `PendingNotification` после debounce.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use notify::event::{CreateKind, ModifyKind, RemoveKind};

use crate::config::Locale;
use crate::error::DocwatchError;

/// Вид изменения файла.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
  Created,
  Modified,
  Deleted,
}

impl EventKind {
  /// Каноническое имя: пишется в журнал, в БД и в data-payload уведомления.
  pub fn as_str(self) -> &'static str {
    match self {
      EventKind::Created => "Created",
      EventKind::Modified => "Modified",
      EventKind::Deleted => "Deleted",
    }
  }

  /// Локализованная метка для заголовка/текста уведомления.
  pub fn label(self, locale: Locale) -> &'static str {
    match (locale, self) {
      (Locale::Tr, EventKind::Created) => "OLUŞTURULDU",
      (Locale::Tr, EventKind::Modified) => "DEĞİŞTİRİLDİ",
      (Locale::Tr, EventKind::Deleted) => "SİLİNDİ",
      (Locale::En, EventKind::Created) => "CREATED",
      (Locale::En, EventKind::Modified) => "MODIFIED",
      (Locale::En, EventKind::Deleted) => "DELETED",
    }
  }

  /// Глагол для текста уведомления (в нижнем регистре).
  ///
  /// Отдельно от `label`: `to_lowercase` превращает турецкую `İ` в `i̇`.
  pub fn verb(self, locale: Locale) -> &'static str {
    match (locale, self) {
      (Locale::Tr, EventKind::Created) => "oluşturuldu",
      (Locale::Tr, EventKind::Modified) => "değiştirildi",
      (Locale::Tr, EventKind::Deleted) => "silindi",
      (Locale::En, EventKind::Created) => "created",
      (Locale::En, EventKind::Modified) => "modified",
      (Locale::En, EventKind::Deleted) => "deleted",
    }
  }

  /// Перевести вид события notify во внутренний.
  ///
  /// Переименования, доступ и события уровня директорий не отслеживаются.
  pub fn from_notify(kind: &notify::EventKind) -> Option<Self> {
    match kind {
      notify::EventKind::Create(CreateKind::Folder) => None,
      notify::EventKind::Create(_) => Some(EventKind::Created),
      notify::EventKind::Modify(ModifyKind::Name(_)) => None,
      notify::EventKind::Modify(_) => Some(EventKind::Modified),
      notify::EventKind::Remove(RemoveKind::Folder) => None,
      notify::EventKind::Remove(_) => Some(EventKind::Deleted),
      notify::EventKind::Access(_) => None,
      notify::EventKind::Any => None,
      notify::EventKind::Other => None,
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Нефильтрованное событие файловой системы.
#[derive(Clone, Debug)]
pub struct RawEvent {
  pub kind: EventKind,
  /// Абсолютный путь к файлу.
  pub path: PathBuf,
  pub observed_at: DateTime<Local>,
}

impl RawEvent {
  pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
    Self {
      kind,
      path: path.into(),
      observed_at: Local::now(),
    }
  }

  /// Имя файла (ключ debounce).
  pub fn file_name(&self) -> Result<String, DocwatchError> {
    file_name_of(&self.path)
  }
}

/// Отложенное уведомление: не более одного на имя файла.
///
/// Хранит данные *первого* события в окне debounce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingNotification {
  pub file_name: String,
  pub kind: EventKind,
  pub path: PathBuf,
  pub first_observed_at: DateTime<Local>,
}

pub(crate) fn file_name_of(path: &Path) -> Result<String, DocwatchError> {
  path
    .file_name()
    .and_then(|s| s.to_str())
    .map(str::to_string)
    .ok_or_else(|| DocwatchError::FileNameMissing(path.to_path_buf()))
}
