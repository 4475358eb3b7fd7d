//! docwatch
//!
//! Наблюдает за деревьями каталогов общего хранилища, записывает каждое
//! изменение документов (office/PDF) в журнал и отправляет push-уведомление.
//!
//! Конвейер: `notify` → [`file_watcher::PathFilter`] → [`file_watcher::Debouncer`]
//! → [`audit::AuditSink`] + [`notifier::Notifier`].

pub mod audit;
pub mod config;
pub mod error;
pub mod file_watcher;
pub mod logging;
pub mod notifier;
pub mod pipeline;

pub use error::DocwatchError;
