use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Reported state of one server, exactly as the endpoint spelled it.
///
/// Anything other than `"online"` or `"offline"` is kept verbatim so it can be
/// displayed, and counts as offline when alerts are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServerState {
    Online,
    Offline,
    Other(String),
}

impl ServerState {
    pub fn is_online(&self) -> bool {
        matches!(self, ServerState::Online)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServerState::Online => "online",
            ServerState::Offline => "offline",
            ServerState::Other(raw) => raw,
        }
    }
}

impl From<String> for ServerState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "online" => ServerState::Online,
            "offline" => ServerState::Offline,
            _ => ServerState::Other(raw),
        }
    }
}

impl From<ServerState> for String {
    fn from(state: ServerState) -> Self {
        match state {
            ServerState::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective health used for alerting and change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Up,
    Down,
}

impl From<&ServerState> for Health {
    fn from(state: &ServerState) -> Self {
        if state.is_online() { Health::Up } else { Health::Down }
    }
}

/// One entry of the endpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub status: ServerState,
    /// Raw `last_checked` value, any JSON type, kept as sent. The backend may
    /// omit the UTC offset, so it is parsed on demand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<serde_json::Value>,
}

impl ServerStatus {
    pub fn new(status: ServerState, last_checked: impl Into<String>) -> Self {
        Self {
            status,
            last_checked: Some(serde_json::Value::String(last_checked.into())),
        }
    }

    pub fn health(&self) -> Health {
        Health::from(&self.status)
    }

    /// `last_checked` as a UTC timestamp. Offset-less strings are read as UTC;
    /// non-string values have no timestamp.
    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_checked.as_ref()?.as_str()?.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Server name to status. Duplicate names in a payload resolve last-key-wins.
pub type StatusSnapshot = BTreeMap<String, ServerStatus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Http,
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("failed to connect to monitoring server: {0}")]
    Network(String),
    #[error("HTTP error! status: {status}")]
    Http { status: u16 },
    #[error("malformed status payload: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::Http { .. } => ErrorKind::Http,
            FetchError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// Result of a single poll.
pub type FetchOutcome = Result<StatusSnapshot, FetchError>;

/// Error retained in [`MonitorState`] for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FetchError> for LastError {
    fn from(err: &FetchError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    /// `None` until the first successful poll; `Some(empty)` means the
    /// endpoint knows no servers.
    pub snapshot: Option<StatusSnapshot>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<LastError>,
    pub is_loading: bool,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            snapshot: None,
            last_checked_at: None,
            last_error: None,
            is_loading: true,
        }
    }
}

impl MonitorState {
    /// Servers whose status is anything but `online`.
    pub fn offline_count(&self) -> usize {
        self.snapshot
            .as_ref()
            .map_or(0, |snapshot| snapshot.values().filter(|s| !s.status.is_online()).count())
    }

    pub fn has_critical_alert(&self) -> bool {
        self.offline_count() > 0
    }

    /// Banner text for the critical alert, if one is active.
    pub fn alert_message(&self) -> Option<String> {
        match self.offline_count() {
            0 => None,
            1 => Some("1 server is currently offline!".to_string()),
            n => Some(format!("{} servers are currently offline!", n)),
        }
    }

    pub fn offline_servers(&self) -> Vec<&str> {
        self.snapshot
            .iter()
            .flat_map(|snapshot| snapshot.iter())
            .filter(|(_, s)| !s.status.is_online())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_state_keeps_unknown_values_verbatim() {
        let status: ServerStatus =
            serde_json::from_str(r#"{"status":"degraded","last_checked":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(status.status, ServerState::Other("degraded".into()));
        assert_eq!(status.health(), Health::Down);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "degraded");
    }

    #[test]
    fn status_match_is_case_sensitive() {
        assert_eq!(ServerState::from("Online".to_string()), ServerState::Other("Online".into()));
        assert!(!ServerState::from("Online".to_string()).is_online());
    }

    #[test]
    fn last_checked_accepts_offsetless_timestamps() {
        let with_offset = ServerStatus::new(ServerState::Online, "2024-01-01T00:00:00Z");
        let naive = ServerStatus::new(ServerState::Online, "2024-01-01T00:00:00.250000");

        let expected = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(with_offset.last_checked_at(), Some(expected.with_timezone(&Utc)));
        assert_eq!(
            naive.last_checked_at().map(|ts| ts.timestamp_millis()),
            Some(expected.timestamp_millis() + 250)
        );
    }

    #[test]
    fn last_checked_unparseable_is_none() {
        let status = ServerStatus::new(ServerState::Offline, "yesterday");
        assert_eq!(status.last_checked_at(), None);

        let missing: ServerStatus = serde_json::from_str(r#"{"status":"offline"}"#).unwrap();
        assert_eq!(missing.last_checked, None);
        assert_eq!(missing.last_checked_at(), None);
    }

    #[test]
    fn last_checked_of_any_json_type_is_kept_verbatim() {
        let numeric: ServerStatus =
            serde_json::from_str(r#"{"status":"online","last_checked":12345}"#).unwrap();
        assert_eq!(numeric.last_checked, Some(serde_json::json!(12345)));
        assert_eq!(numeric.last_checked_at(), None);

        let null: ServerStatus = serde_json::from_str(r#"{"status":"online","last_checked":null}"#).unwrap();
        assert_eq!(null.last_checked, None);

        let json = serde_json::to_value(&numeric).unwrap();
        assert_eq!(json["last_checked"], 12345);
    }

    #[test]
    fn default_state_is_loading_without_alert() {
        let state = MonitorState::default();
        assert!(state.is_loading);
        assert_eq!(state.snapshot, None);
        assert_eq!(state.offline_count(), 0);
        assert!(!state.has_critical_alert());
        assert_eq!(state.alert_message(), None);
    }

    #[test]
    fn alert_message_pluralizes() {
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert("db1".into(), ServerStatus::new(ServerState::Offline, "2024-01-01T00:00:00Z"));
        let mut state = MonitorState {
            snapshot: Some(snapshot.clone()),
            ..MonitorState::default()
        };
        assert_eq!(state.alert_message().as_deref(), Some("1 server is currently offline!"));

        snapshot.insert("db2".into(), ServerStatus::new(ServerState::Other("unknown".into()), "2024-01-01T00:00:00Z"));
        state.snapshot = Some(snapshot);
        assert_eq!(state.alert_message().as_deref(), Some("2 servers are currently offline!"));
        assert_eq!(state.offline_servers(), vec!["db1", "db2"]);
    }

    #[test]
    fn fetch_error_kinds_and_messages() {
        let http = FetchError::Http { status: 503 };
        assert_eq!(http.kind(), ErrorKind::Http);
        assert!(http.to_string().contains("503"));

        let last = LastError::from(&FetchError::Network("connection refused".into()));
        assert_eq!(last.kind, ErrorKind::Network);
        assert!(last.message.contains("connection refused"));
    }
}
