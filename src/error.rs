use std::path::PathBuf;

/// Единый тип ошибок docwatch.
#[derive(thiserror::Error, Debug)]
pub enum DocwatchError {
  #[error("Invalid path: {0}")]
  InvalidPath(String),

  #[error("Missing configuration value: {0}")]
  MissingConfig(&'static str),

  #[error("Invalid configuration value for {key}: {message}")]
  InvalidConfig { key: &'static str, message: String },

  #[error("Pipeline is shut down")]
  ShutDown,

  #[error("Delay out of range: {0:?}")]
  DelayOutOfRange(std::time::Duration),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Notify error: {0}")]
  Notify(#[from] notify::Error),

  #[error("Database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Token signing error: {0}")]
  Jwt(#[from] jsonwebtoken::errors::Error),

  #[error("Env file error: {0}")]
  EnvFile(#[from] dotenvy::Error),

  #[error("Signal handler error: {0}")]
  Signal(#[from] ctrlc::Error),

  #[error("Invalid credentials file {path:?}: {message}")]
  Credentials { path: PathBuf, message: String },

  #[error("Push delivery failed: {0}")]
  Push(String),

  #[error("Audit record incomplete: {0}")]
  AuditDegraded(String),

  #[error("Cannot determine file name for path: {0:?}")]
  FileNameMissing(PathBuf),
}
