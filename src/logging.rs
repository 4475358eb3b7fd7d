//! Нормализованное логирование для docwatch.
//!
//! ## Уровни логов
//! - `ERROR`: критические ошибки, требующие внимания
//! - `WARN`:  сбои записи аудита или отправки уведомления (pipeline продолжает работу)
//! - `INFO`:  события жизненного цикла, доставленные и подавленные события
//! - `DEBUG`: отфильтрованные события, детали для отладки
//! - `TRACE`: максимально детальный вывод (включая сырые события notify)
//!
//! ## Корреляция событий
//! Каждая попытка доставки получает свой `correlation_id`, чтобы строки
//! аудита и push-уведомления одного события можно было связать в логах.
//!
//! ## Использование
//! ```ignore
//! use docwatch::logging::{init_logging, LogContext};
//!
//! init_logging(); // вызывается один раз при старте
//!
//! let ctx = LogContext::with_operation("deliver");
//! log::info!(target: "docwatch::pipeline", "[{}] delivered", ctx.correlation_id);
//! ```

use std::io::Write;
use std::sync::Once;

use log::{Level, LevelFilter};

static INIT: Once = Once::new();

/// Инициализировать логирование (idempotent).
///
/// Управление уровнем логов: переменная окружения `RUST_LOG`.
/// Примеры:
/// - `RUST_LOG=info`: только INFO и выше
/// - `RUST_LOG=docwatch=debug`: DEBUG для нашего crate
/// - `RUST_LOG=trace`: максимально детальный вывод
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::new()
            .format(|buf, record| {
                let level = match record.level() {
                    Level::Error => "E",
                    Level::Warn => "W",
                    Level::Info => "I",
                    Level::Debug => "D",
                    Level::Trace => "T",
                };

                // Формат: [timestamp] [LEVEL] [target] message
                writeln!(
                    buf,
                    "[{}] [{}] [{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    level,
                    record.target(),
                    record.args()
                )
            })
            .filter_module("docwatch", LevelFilter::Info)
            .filter_module("notify", LevelFilter::Warn)
            // RUST_LOG применяется последним и переопределяет дефолты выше.
            .parse_env("RUST_LOG")
            .try_init();
    });
}

/// Контекст логирования с корреляционным ID.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Уникальный идентификатор для корреляции событий.
    pub correlation_id: String,
    /// Опциональный контекст операции.
    pub operation: Option<String>,
}

impl LogContext {
    /// Создать новый контекст с уникальным correlation_id.
    pub fn new() -> Self {
        Self {
            correlation_id: generate_correlation_id(),
            operation: None,
        }
    }

    /// Создать контекст с указанным operation name.
    pub fn with_operation(operation: impl Into<String>) -> Self {
        Self {
            correlation_id: generate_correlation_id(),
            operation: Some(operation.into()),
        }
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "{}/{}", op, self.correlation_id),
            None => f.write_str(&self.correlation_id),
        }
    }
}

/// Генерирует уникальный correlation ID.
///
/// Формат: `corr_<timestamp_ms>_<counter>`
fn generate_correlation_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = chrono::Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("corr_{}_{}", timestamp, counter % 10000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_has_correlation_id() {
        let ctx = LogContext::new();
        assert!(ctx.correlation_id.starts_with("corr_"));
    }

    #[test]
    fn test_log_context_with_operation() {
        let ctx = LogContext::with_operation("deliver");
        assert_eq!(ctx.operation, Some("deliver".to_string()));
        assert!(ctx.to_string().starts_with("deliver/corr_"));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let ctx1 = LogContext::new();
        let ctx2 = LogContext::new();
        assert_ne!(ctx1.correlation_id, ctx2.correlation_id);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
