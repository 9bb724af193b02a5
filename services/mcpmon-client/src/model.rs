//! Monitor records and request bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Key the server uses for record ids
pub const ID_FIELD: &str = "_id";

/// Fallback id key accepted on inbound records
pub const ALT_ID_FIELD: &str = "id";

/// Health status of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum MonitorStatus {
    Online,
    Offline,
    Paused,
    #[default]
    Unknown,
}

impl From<String> for MonitorStatus {
    fn from(value: String) -> Self {
        value.as_str().into()
    }
}

impl From<&str> for MonitorStatus {
    fn from(value: &str) -> Self {
        match value {
            "online" => MonitorStatus::Online,
            "offline" => MonitorStatus::Offline,
            "paused" => MonitorStatus::Paused,
            _ => MonitorStatus::Unknown,
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Online => write!(f, "online"),
            MonitorStatus::Offline => write!(f, "offline"),
            MonitorStatus::Paused => write!(f, "paused"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Typed view of a monitor record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "MonitorFields")]
pub struct Monitor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub status: MonitorStatus,
    pub uptime_percentage: f64,
    pub total_checks: u64,
    /// Milliseconds
    pub average_response_time: f64,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Inbound shape of [`Monitor`]; servers may send `_id`, `id` or both
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorFields {
    #[serde(rename = "_id", default)]
    primary_id: Option<String>,
    #[serde(rename = "id", default)]
    alt_id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: MonitorStatus,
    #[serde(default)]
    uptime_percentage: f64,
    #[serde(default)]
    total_checks: u64,
    #[serde(default)]
    average_response_time: f64,
    #[serde(default)]
    last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<MonitorFields> for Monitor {
    type Error = String;

    fn try_from(fields: MonitorFields) -> std::result::Result<Self, Self::Error> {
        let id = fields
            .primary_id
            .or(fields.alt_id)
            .ok_or_else(|| format!("missing field `{}`", ID_FIELD))?;
        Ok(Self {
            id,
            name: fields.name,
            url: fields.url,
            description: fields.description,
            status: fields.status,
            uptime_percentage: fields.uptime_percentage,
            total_checks: fields.total_checks,
            average_response_time: fields.average_response_time,
            last_checked_at: fields.last_checked_at,
            created_at: fields.created_at,
        })
    }
}

/// Cached projection of a server-owned monitor record
///
/// Records are kept as raw JSON objects so that partial records and fields
/// this client does not know about survive a merge untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorRecord(Map<String, Value>);

/// A partial record pushed by the server
pub type MonitorPatch = MonitorRecord;

impl MonitorRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Record id, read from `_id` or else `id`
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID_FIELD)
            .or_else(|| self.0.get(ALT_ID_FIELD))
            .and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn status(&self) -> MonitorStatus {
        self.0
            .get("status")
            .and_then(Value::as_str)
            .map(MonitorStatus::from)
            .unwrap_or_default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow merge: fields present in `patch` overwrite, others are kept
    pub fn merge(&mut self, patch: &MonitorRecord) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Deserialize into the typed view
    pub fn to_monitor(&self) -> Result<Monitor> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

impl From<Map<String, Value>> for MonitorRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// How health checks authenticate against the monitored endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Bearer,
    ApiKey,
}

/// Body for creating a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body for updating a monitor; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header_name: Option<String>,
    /// Only sent when the secret changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_sync_enabled: Option<bool>,
}

/// Login request
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Signup request
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Authenticated user returned by login, signup and the OAuth callback
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "AuthUserFields")]
pub struct AuthUser {
    pub id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub token: String,
}

#[derive(Deserialize)]
struct AuthUserFields {
    #[serde(rename = "_id", default)]
    primary_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    email: String,
    #[serde(default)]
    name: Option<String>,
    token: String,
}

impl From<AuthUserFields> for AuthUser {
    fn from(fields: AuthUserFields) -> Self {
        Self {
            id: fields.primary_id.or(fields.id),
            email: fields.email,
            name: fields.name,
            token: fields.token,
        }
    }
}

/// Body for `auth/forgot-password`
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Body for `auth/reset-password/{token}`
#[derive(Debug, Clone, Serialize)]
pub struct NewPassword {
    pub password: String,
}

/// Product feedback from a signed-in user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub feedback: String,
    /// The user agrees to be contacted about this feedback
    pub allow_response: bool,
}

/// Contact form message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactMessage {
    pub email: String,
    pub message: String,
}

/// Request to scan a YouTube channel for broken affiliate links
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub channel_id: String,
    pub affiliate_id: String,
}
