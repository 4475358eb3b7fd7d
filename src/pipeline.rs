//! Доставка события после debounce: сначала аудит, затем push.
//!
//! Порядок фиксирован, чтобы запись в журнале была и при сбое уведомления.

use std::sync::Arc;

use log::{info, warn};

use crate::audit::{AuditSink, LogRecord};
use crate::config::Locale;
use crate::file_watcher::{PathFilter, PendingNotification};
use crate::logging::LogContext;
use crate::notifier::Notifier;

/// Дополнительные поля аудита: кто запустил процесс и под каким корнем файл.
#[derive(Clone, Debug)]
pub struct Attribution {
  pub script_user: String,
  pub roots: PathFilter,
}

impl Attribution {
  /// Пользователь ОС из `USER`/`USERNAME`.
  pub fn current_user(roots: PathFilter) -> Self {
    let script_user = std::env::var("USER")
      .or_else(|_| std::env::var("USERNAME"))
      .unwrap_or_else(|_| "unknown".to_string());
    Self { script_user, roots }
  }

  fn watch_root(&self, event: &PendingNotification) -> Option<String> {
    self
      .roots
      .matching_root(&event.path)
      .map(|root| root.display().to_string())
  }
}

/// Итог одной доставки.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
  pub audited: bool,
  pub notified: bool,
}

pub struct DeliveryPipeline {
  audit: Arc<AuditSink>,
  notifier: Notifier,
  attribution: Option<Attribution>,
  locale: Locale,
}

impl DeliveryPipeline {
  pub fn new(audit: Arc<AuditSink>, notifier: Notifier, locale: Locale) -> Self {
    Self {
      audit,
      notifier,
      attribution: None,
      locale,
    }
  }

  pub fn with_attribution(mut self, attribution: Attribution) -> Self {
    self.attribution = Some(attribution);
    self
  }

  pub fn audit(&self) -> &Arc<AuditSink> {
    &self.audit
  }

  pub fn record_for(&self, event: &PendingNotification) -> LogRecord {
    LogRecord {
      event_time: event.first_observed_at,
      event_kind: event.kind,
      file_name: event.file_name.clone(),
      script_user: self.attribution.as_ref().map(|a| a.script_user.clone()),
      owning_unit: None,
      watch_root: self.attribution.as_ref().and_then(|a| a.watch_root(event)),
    }
  }

  /// Доставить событие. Сбои аудита и уведомления логируются и не мешают
  /// друг другу.
  pub fn deliver(&self, event: &PendingNotification) -> DeliveryOutcome {
    let ctx = LogContext::with_operation("deliver");
    let record = self.record_for(event);

    let audited = match self.audit.record(&record) {
      Ok(()) => true,
      Err(err) => {
        warn!("[{ctx}] {}: continuing in degraded mode: {err}", event.file_name);
        false
      }
    };

    let notified = self.notifier.notify(event);

    info!(
      "[{ctx}] {} {} {}",
      event.kind.label(self.locale),
      record.to_line().trim_end(),
      if notified { "" } else { "(notification not sent)" }
    );
    DeliveryOutcome { audited, notified }
  }
}
