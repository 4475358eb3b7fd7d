//! Firebase Cloud Messaging (HTTP v1).
//!
//! Авторизация через service account: подписанный RS256 JWT обменивается на
//! access token, который кэшируется до истечения срока.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{NotificationPayload, PushChannel};
use crate::error::DocwatchError;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Токен обновляется заранее, за эту величину до истечения.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

static AGENT: Lazy<ureq::Agent> = Lazy::new(|| {
  ureq::AgentBuilder::new()
    .timeout_connect(Duration::from_secs(10))
    .timeout(Duration::from_secs(30))
    .build()
});

/// Поля service-account JSON, нужные для отправки.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
  pub project_id: String,
  pub client_email: String,
  pub private_key: String,
  #[serde(default)]
  pub private_key_id: Option<String>,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
}

fn default_token_uri() -> String {
  DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccount {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServiceAccount")
      .field("project_id", &self.project_id)
      .field("client_email", &self.client_email)
      .field("token_uri", &self.token_uri)
      .finish_non_exhaustive()
  }
}

impl ServiceAccount {
  pub fn from_file(path: &Path) -> Result<Self, DocwatchError> {
    let raw = std::fs::read_to_string(path).map_err(|err| DocwatchError::Credentials {
      path: path.to_path_buf(),
      message: err.to_string(),
    })?;
    Self::from_json(&raw).map_err(|err| DocwatchError::Credentials {
      path: path.to_path_buf(),
      message: err.to_string(),
    })
  }

  pub fn from_json(raw: &str) -> Result<Self, DocwatchError> {
    let account: Self = serde_json::from_str(raw)?;
    if account.project_id.is_empty() || account.client_email.is_empty() {
      return Err(DocwatchError::InvalidConfig {
        key: "FIREBASE_CRED_PATH",
        message: "service account without project_id or client_email".to_string(),
      });
    }
    Ok(account)
  }
}

#[derive(Serialize)]
struct Claims<'a> {
  iss: &'a str,
  scope: &'a str,
  aud: &'a str,
  iat: i64,
  exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct SendResponse {
  name: String,
}

struct CachedToken {
  value: String,
  expires_at: Instant,
}

pub struct FcmChannel {
  account: ServiceAccount,
  key: EncodingKey,
  endpoint: String,
  token: Mutex<Option<CachedToken>>,
}

impl FcmChannel {
  /// Загрузить учётные данные. Ошибка здесь фатальна для запуска процесса.
  pub fn from_credentials_file(path: &Path) -> Result<Self, DocwatchError> {
    let account = ServiceAccount::from_file(path)?;
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|err| DocwatchError::Credentials {
      path: path.to_path_buf(),
      message: format!("private_key: {err}"),
    })?;
    let endpoint = format!("https://fcm.googleapis.com/v1/projects/{}/messages:send", account.project_id);
    debug!("FCM channel ready for project {}", account.project_id);
    Ok(Self {
      account,
      key,
      endpoint,
      token: Mutex::new(None),
    })
  }

  fn access_token(&self) -> Result<String, DocwatchError> {
    let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = cached.as_ref() {
      if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
        return Ok(token.value.clone());
      }
    }

    let iat = chrono::Utc::now().timestamp();
    let claims = Claims {
      iss: &self.account.client_email,
      scope: FCM_SCOPE,
      aud: &self.account.token_uri,
      iat,
      exp: iat + TOKEN_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid.clone_from(&self.account.private_key_id);
    let assertion = jsonwebtoken::encode(&header, &claims, &self.key)?;

    let response: TokenResponse = AGENT
      .post(&self.account.token_uri)
      .send_form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
      .map_err(|err| http_error("token exchange", err))?
      .into_json()?;

    let lifetime = Duration::from_secs(response.expires_in.unwrap_or(TOKEN_LIFETIME_SECS as u64));
    debug!("FCM access token refreshed, valid for {}s", lifetime.as_secs());
    *cached = Some(CachedToken {
      value: response.access_token.clone(),
      expires_at: Instant::now() + lifetime,
    });
    Ok(response.access_token)
  }
}

impl PushChannel for FcmChannel {
  fn push(&self, payload: &NotificationPayload) -> Result<String, DocwatchError> {
    let token = self.access_token()?;
    let response: SendResponse = AGENT
      .post(&self.endpoint)
      .set("Authorization", &format!("Bearer {token}"))
      .send_json(message_json(payload))
      .map_err(|err| http_error("send", err))?
      .into_json()?;
    Ok(response.name)
  }
}

/// Тело запроса `messages:send`.
pub(crate) fn message_json(payload: &NotificationPayload) -> Value {
  json!({
    "message": {
      "token": payload.device_token,
      "notification": {
        "title": payload.title,
        "body": payload.body,
      },
      "data": {
        "fileurl": payload.file_reference,
        "event_type": payload.event_kind.as_str(),
      },
      "android": {
        "priority": "high",
        "notification": {
          "sound": "default",
          "color": "#00796B",
        },
      },
      "apns": {
        "headers": { "apns-priority": "10" },
      },
    }
  })
}

fn http_error(stage: &str, err: ureq::Error) -> DocwatchError {
  let message = match err {
    ureq::Error::Status(code, response) => {
      let body = response.into_string().unwrap_or_default();
      format!("{stage}: provider returned status {code}: {}", body.trim())
    }
    ureq::Error::Transport(transport) => format!("{stage}: transport error: {transport}"),
  };
  DocwatchError::Push(message)
}
