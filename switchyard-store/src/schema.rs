use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One admitted request, as stored in the `access` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogRecord {
    pub id: Uuid,
    pub app: String,
    /// First forwarded hop, port stripped.
    pub ip: String,
    /// Raw forwarded-for value, or the peer address.
    pub real_ip: String,
    pub method: String,
    /// Reconstructed absolute URL.
    pub path: String,
    pub response_code: u16,
    /// Redacted request body; `null` when it was not JSON.
    pub body: Value,
    pub header: BTreeMap<String, Vec<String>>,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A denial record in the `ip_black_list` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub ip: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// `None` blocks forever.
    pub expired_at: Option<DateTime<Utc>>,
}

impl BlacklistEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expired_at {
            None => true,
            Some(expiry) => expiry > now,
        }
    }
}
