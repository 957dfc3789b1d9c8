use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// RFC 8628 device authorization grant state machine. A row starts `Pending`
/// and moves to exactly one terminal state; the token endpoint's polling loop
/// reads the current status to decide what to hand back to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCodeStatus {
    Pending,
    Authorized,
    Denied,
    Expired,
    Consumed,
}

impl DeviceCodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCodeStatus::Pending => "pending",
            DeviceCodeStatus::Authorized => "authorized",
            DeviceCodeStatus::Denied => "denied",
            DeviceCodeStatus::Expired => "expired",
            DeviceCodeStatus::Consumed => "consumed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "authorized" => Some(Self::Authorized),
            "denied" => Some(Self::Denied),
            "expired" => Some(Self::Expired),
            "consumed" => Some(Self::Consumed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCode {
    pub id: Uuid,
    pub device_code_hash: String,
    pub user_code: String,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub status: DeviceCodeStatus,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub interval_secs: i64,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DeviceCodeRow {
    pub id: String,
    pub device_code_hash: String,
    pub user_code: String,
    pub client_id: String,
    pub scopes: serde_json::Value,
    pub status: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub interval_secs: i64,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<DeviceCodeRow> for DeviceCode {
    fn from(row: DeviceCodeRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            device_code_hash: row.device_code_hash,
            user_code: row.user_code,
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            status: DeviceCodeStatus::parse(&row.status).unwrap_or(DeviceCodeStatus::Pending),
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            session_id: row.session_id.and_then(|id| Uuid::parse_str(&id).ok()),
            interval_secs: row.interval_secs,
            last_polled_at: row.last_polled_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for DeviceCode {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let device_row = DeviceCodeRow::from_row(row)?;
        Ok(DeviceCode::from(device_row))
    }
}

impl DeviceCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
