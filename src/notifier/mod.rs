//! Push-уведомления о доставленных событиях.
//!
//! Доставка best-effort: одна попытка, без повторов. Ошибки логируются и
//! наружу не выходят (`Notifier::notify`).

mod fcm;

pub use fcm::{FcmChannel, ServiceAccount};

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::config::Locale;
use crate::error::DocwatchError;
use crate::file_watcher::{EventKind, PendingNotification};

/// Символы, которые остаются незакодированными в deep-link помимо `/`.
const LINK_SAFE: [(&str, &str); 3] = [("%28", "("), ("%29", ")"), ("%24", "$")];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub device_token: String,
  pub event_kind: EventKind,
  /// Путь относительно базового (или абсолютный), percent-encoded.
  pub file_reference: String,
}

/// Канал доставки push-сообщений.
pub trait PushChannel: Send + Sync {
  /// Отправить сообщение. Возвращает идентификатор сообщения провайдера.
  fn push(&self, payload: &NotificationPayload) -> Result<String, DocwatchError>;
}

pub struct Notifier {
  channel: Box<dyn PushChannel>,
  device_token: String,
  base_path: Option<PathBuf>,
  locale: Locale,
}

impl Notifier {
  pub fn new(
    channel: Box<dyn PushChannel>,
    device_token: impl Into<String>,
    base_path: Option<PathBuf>,
    locale: Locale,
  ) -> Self {
    Self {
      channel,
      device_token: device_token.into(),
      base_path,
      locale,
    }
  }

  /// Собрать payload для доставленного события.
  pub fn payload(&self, event: &PendingNotification) -> NotificationPayload {
    let (title, body) = render_text(self.locale, event.kind, &event.file_name, &event.first_observed_at);
    NotificationPayload {
      title,
      body,
      device_token: self.device_token.clone(),
      event_kind: event.kind,
      file_reference: file_reference(&event.path, self.base_path.as_deref()),
    }
  }

  pub fn send(&self, payload: &NotificationPayload) -> Result<String, DocwatchError> {
    self.channel.push(payload)
  }

  /// Отправить уведомление; любой сбой только логируется.
  pub fn notify(&self, event: &PendingNotification) -> bool {
    let payload = self.payload(event);
    match self.send(&payload) {
      Ok(id) => {
        info!("Notification sent for {} (message id: {id})", event.file_name);
        true
      }
      Err(err) => {
        warn!("Notification for {} failed: {err}", event.file_name);
        false
      }
    }
  }
}

fn render_text(locale: Locale, kind: EventKind, file_name: &str, at: &DateTime<Local>) -> (String, String) {
  let when = at.format("%d.%m.%Y %H:%M:%S");
  let action = kind.verb(locale);
  match locale {
    Locale::Tr => (
      "Dosya Takibi:".to_string(),
      format!("{file_name} dosyasında {action} işlemi yapıldı.\n\nZaman      : {when}"),
    ),
    Locale::En => (
      "File Tracking:".to_string(),
      format!("{file_name} was {action}.\n\nTime       : {when}"),
    ),
  }
}

/// Deep-link на файл: путь относительно `base` с `/` в качестве разделителя,
/// каждый сегмент percent-encoded. Если путь не под `base`, берётся полный путь.
pub fn file_reference(path: &Path, base: Option<&Path>) -> String {
  let relative = base.and_then(|b| path.strip_prefix(b).ok());
  let segments: Vec<String> = match relative {
    Some(rel) => segments_of(rel),
    None => segments_of(path),
  };
  let absolute = relative.is_none() && path.has_root();

  let encoded: Vec<String> = segments.iter().map(|s| encode_segment(s)).collect();
  let joined = encoded.join("/");
  if absolute && !path_has_prefix(path) {
    format!("/{joined}")
  } else {
    joined
  }
}

fn segments_of(path: &Path) -> Vec<String> {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(s) => Some(s.to_string_lossy().to_string()),
      Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().trim_start_matches('\\').to_string()),
      _ => None,
    })
    .flat_map(|s| s.split('\\').map(str::to_string).collect::<Vec<_>>())
    .filter(|s| !s.is_empty())
    .collect()
}

fn path_has_prefix(path: &Path) -> bool {
  matches!(path.components().next(), Some(Component::Prefix(_)))
}

fn encode_segment(segment: &str) -> String {
  let mut encoded = urlencoding::encode(segment).into_owned();
  for (escaped, raw) in LINK_SAFE {
    encoded = encoded.replace(escaped, raw);
  }
  encoded
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Recorder {
    sent: Mutex<Vec<NotificationPayload>>,
  }

  impl PushChannel for Recorder {
    fn push(&self, payload: &NotificationPayload) -> Result<String, DocwatchError> {
      self.sent.lock().unwrap().push(payload.clone());
      Ok("projects/p/messages/1".to_string())
    }
  }

  struct Rejecting;

  impl PushChannel for Rejecting {
    fn push(&self, _payload: &NotificationPayload) -> Result<String, DocwatchError> {
      Err(DocwatchError::Push("status 400: invalid registration token".to_string()))
    }
  }

  fn event(path: &str) -> PendingNotification {
    PendingNotification {
      file_name: Path::new(path).file_name().unwrap().to_string_lossy().to_string(),
      kind: EventKind::Modified,
      path: PathBuf::from(path),
      first_observed_at: Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
    }
  }

  #[test]
  fn turkish_text_includes_file_and_timestamp() {
    let n = Notifier::new(Box::new(Recorder::default()), "tok", None, Locale::Tr);
    let p = n.payload(&event("/data/QUALITY/form.xlsx"));
    assert_eq!(p.title, "Dosya Takibi:");
    assert!(p.body.starts_with("form.xlsx dosyasında değiştirildi işlemi yapıldı."), "{}", p.body);
    assert!(p.body.ends_with("Zaman      : 02.01.2025 03:04:05"));
    assert_eq!(p.device_token, "tok");
    assert_eq!(p.event_kind, EventKind::Modified);
  }

  #[test]
  fn english_text() {
    let n = Notifier::new(Box::new(Recorder::default()), "tok", None, Locale::En);
    let p = n.payload(&event("/data/QUALITY/form.xlsx"));
    assert_eq!(p.title, "File Tracking:");
    assert!(p.body.starts_with("form.xlsx was modified."));
  }

  #[test]
  fn reference_is_relative_to_base_and_encoded() {
    let reference = file_reference(
      Path::new("/data/ORTAK/KALİTE/4. FORMLAR/form (v2).xlsx"),
      Some(Path::new("/data")),
    );
    assert_eq!(reference, "ORTAK/KAL%C4%B0TE/4.%20FORMLAR/form%20(v2).xlsx");
  }

  #[test]
  fn reference_falls_back_to_absolute_path() {
    let reference = file_reference(Path::new("/srv/share/a b.pdf"), Some(Path::new("/data")));
    assert_eq!(reference, "/srv/share/a%20b.pdf");
    assert_eq!(file_reference(Path::new("/srv/x.pdf"), None), "/srv/x.pdf");
  }

  #[test]
  fn reserved_characters_are_encoded() {
    assert_eq!(encode_segment("a&b#c?.docx"), "a%26b%23c%3F.docx");
    assert_eq!(encode_segment("~$report_1-2.xls"), "~$report_1-2.xls");
  }

  #[test]
  fn notify_swallows_provider_errors() {
    let n = Notifier::new(Box::new(Rejecting), "tok", None, Locale::Tr);
    assert!(!n.notify(&event("/data/a.pdf")));
  }

  #[test]
  fn notify_sends_through_channel() {
    let n = Notifier::new(Box::new(Recorder::default()), "tok", Some(PathBuf::from("/data")), Locale::Tr);
    assert!(n.notify(&event("/data/x/a.pdf")));
    assert_eq!(n.send(&n.payload(&event("/data/b.pdf"))).unwrap(), "projects/p/messages/1");
  }
}
