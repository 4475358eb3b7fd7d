//! Конфигурация процесса из переменных окружения.
//!
//! Если в рабочей директории есть `.env`, он загружается первым (`dotenvy`);
//! отсутствие файла ошибкой не считается.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::error::DocwatchError;

pub const DEFAULT_LOG_FILE: &str = "kalite_dosya_loglari.txt";
pub const DEFAULT_CREDENTIALS_FILE: &str = "service-account.json";
pub const DEFAULT_DEBOUNCE_SECS: u64 = 60;
/// Верхняя граница окна debounce (сутки).
pub const MAX_DEBOUNCE_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_DELIVERY_WORKERS: usize = 2;

/// Разделитель списка корней в `WATCH_FOLDERS`.
pub const ROOT_SEPARATOR: char = ';';

/// Язык текста уведомлений.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Locale {
  #[default]
  Tr,
  En,
}

/// Что делать с отложенными уведомлениями при остановке.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
  /// Доставить все отложенные уведомления немедленно.
  #[default]
  Flush,
  /// Отбросить их (поведение исходной системы).
  Drop,
}

#[derive(Clone, Debug)]
pub struct WatchConfig {
  pub roots: Vec<PathBuf>,
  pub base_path: Option<PathBuf>,
  pub log_file: PathBuf,
  pub database_path: PathBuf,
  pub credentials_path: PathBuf,
  pub device_token: String,
  pub debounce_window: Duration,
  pub locale: Locale,
  pub delivery_workers: usize,
  pub shutdown_policy: ShutdownPolicy,
  pub record_script_user: bool,
}

impl WatchConfig {
  /// Загрузить `.env` (если есть) и собрать конфигурацию из окружения.
  pub fn from_env() -> Result<Self, DocwatchError> {
    load_env_file(dotenvy::dotenv())?;
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Собрать конфигурацию через произвольный lookup (удобно для тестов).
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DocwatchError> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let roots = parse_roots(&get("WATCH_FOLDERS").ok_or(DocwatchError::MissingConfig("WATCH_FOLDERS"))?)?;

    let database_path = match get("DATABASE_URL") {
      Some(url) => parse_database_url(&url)?,
      None => default_database_path()?,
    };

    let debounce_secs = match get("DEBOUNCE_SECS") {
      Some(v) => match parse_positive("DEBOUNCE_SECS", &v)? {
        secs if secs > MAX_DEBOUNCE_SECS => {
          return Err(DocwatchError::InvalidConfig {
            key: "DEBOUNCE_SECS",
            message: format!("{secs}s exceeds the maximum of {MAX_DEBOUNCE_SECS}s"),
          })
        }
        secs => secs,
      },
      None => DEFAULT_DEBOUNCE_SECS,
    };

    let delivery_workers = match get("DELIVERY_WORKERS") {
      Some(v) => parse_positive("DELIVERY_WORKERS", &v)? as usize,
      None => DEFAULT_DELIVERY_WORKERS,
    };

    let locale = match get("NOTIFY_LOCALE").as_deref().map(str::to_ascii_lowercase).as_deref() {
      None | Some("tr") => Locale::Tr,
      Some("en") => Locale::En,
      Some(other) => {
        return Err(DocwatchError::InvalidConfig {
          key: "NOTIFY_LOCALE",
          message: format!("unsupported locale {other:?} (expected tr or en)"),
        })
      }
    };

    let shutdown_policy = match get("FLUSH_ON_SHUTDOWN") {
      Some(v) if parse_bool("FLUSH_ON_SHUTDOWN", &v)? => ShutdownPolicy::Flush,
      Some(_) => ShutdownPolicy::Drop,
      None => ShutdownPolicy::default(),
    };

    let record_script_user = match get("RECORD_SCRIPT_USER") {
      Some(v) => parse_bool("RECORD_SCRIPT_USER", &v)?,
      None => false,
    };

    Ok(Self {
      roots,
      base_path: get("BASE_PATH").map(PathBuf::from),
      log_file: get("LOG_FILE").map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from),
      database_path,
      credentials_path: get("FIREBASE_CRED_PATH")
        .map_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE), PathBuf::from),
      device_token: get("FCM_DEVICE_TOKEN").ok_or(DocwatchError::MissingConfig("FCM_DEVICE_TOKEN"))?,
      debounce_window: Duration::from_secs(debounce_secs),
      locale,
      delivery_workers,
      shutdown_policy,
      record_script_user,
    })
  }
}

/// Результат `dotenvy::dotenv()`: отсутствие `.env` не ошибка, а нечитаемый
/// или битый файл останавливает запуск.
fn load_env_file(result: Result<PathBuf, dotenvy::Error>) -> Result<(), DocwatchError> {
  match result {
    Ok(path) => {
      debug!("Loaded env file {}", path.display());
      Ok(())
    }
    Err(dotenvy::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(err) => Err(err.into()),
  }
}

fn parse_roots(raw: &str) -> Result<Vec<PathBuf>, DocwatchError> {
  let mut roots = Vec::new();
  for part in raw.split(ROOT_SEPARATOR).map(str::trim).filter(|p| !p.is_empty()) {
    let root = PathBuf::from(part);
    if !root.is_absolute() {
      return Err(DocwatchError::InvalidPath(format!("watch root must be absolute: {part}")));
    }
    if !roots.contains(&root) {
      roots.push(root);
    }
  }
  if roots.is_empty() {
    return Err(DocwatchError::MissingConfig("WATCH_FOLDERS"));
  }
  Ok(roots)
}

/// `sqlite://path`, `sqlite:path` или просто путь к файлу БД.
fn parse_database_url(url: &str) -> Result<PathBuf, DocwatchError> {
  if url.starts_with("postgres://") || url.starts_with("postgresql://") {
    return Err(DocwatchError::InvalidConfig {
      key: "DATABASE_URL",
      message: "only SQLite databases are supported".to_string(),
    });
  }
  let path = url
    .strip_prefix("sqlite://")
    .or_else(|| url.strip_prefix("sqlite:"))
    .unwrap_or(url);
  if path.is_empty() {
    return Err(DocwatchError::InvalidConfig {
      key: "DATABASE_URL",
      message: "empty database path".to_string(),
    });
  }
  Ok(PathBuf::from(path))
}

fn default_database_path() -> Result<PathBuf, DocwatchError> {
  let base = dirs::data_local_dir().ok_or(DocwatchError::MissingConfig("DATABASE_URL"))?;
  Ok(Path::new(&base).join("docwatch").join("file_logs.db"))
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, DocwatchError> {
  match value.parse::<u64>() {
    Ok(n) if n > 0 => Ok(n),
    _ => Err(DocwatchError::InvalidConfig {
      key,
      message: format!("expected a positive integer, got {value:?}"),
    }),
  }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, DocwatchError> {
  match value.to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(DocwatchError::InvalidConfig {
      key,
      message: format!("expected a boolean, got {value:?}"),
    }),
  }
}
