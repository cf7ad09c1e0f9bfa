//! Directory protocol vocabulary and JSON payloads.
//!
//! Requests are `{"<RootKey>": {..record..}}` objects; replies are either a
//! `{"servers": [..]}` list or a `{"WasSuccessful": .., "CheckInFrequency": ..}`
//! acknowledgement. Both directions are zlib-compressed on the wire, see
//! [`crate::compression`].

use crate::error::PayloadError;
use crate::http::Method;
use crate::record::ServerRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_DIRECTORY_PORT: u16 = 8081;

/// Seconds between check-ins the directory asks for by default.
pub const DEFAULT_CHECK_IN_FREQUENCY: f64 = 30.0;

pub const RECEIVE_SERVER_LIST: &str = "ReceiveServerList";
pub const REGISTRATION_KEY: &str = "ServerRegistration";
pub const CHECK_IN_KEY: &str = "ServerCheckIn";
pub const DEREGISTRATION_KEY: &str = "ServerDeregistration";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const USER_AGENT: &str = "MasterServerClient/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Register,
    Unregister,
    CheckIn,
    ListServers,
    Ping,
}

impl OperationKind {
    pub fn verb(&self) -> Method {
        match self {
            OperationKind::ListServers | OperationKind::Ping => Method::Get,
            OperationKind::Register | OperationKind::Unregister | OperationKind::CheckIn => {
                Method::Put
            }
        }
    }

    /// JSON root key of the request payload, for operations that carry one.
    pub fn root_key(&self) -> Option<&'static str> {
        match self {
            OperationKind::Register => Some(REGISTRATION_KEY),
            OperationKind::CheckIn => Some(CHECK_IN_KEY),
            OperationKind::Unregister => Some(DEREGISTRATION_KEY),
            OperationKind::ListServers | OperationKind::Ping => None,
        }
    }

    pub fn from_root_key(key: &str) -> Option<OperationKind> {
        [
            OperationKind::Register,
            OperationKind::CheckIn,
            OperationKind::Unregister,
        ]
        .into_iter()
        .find(|kind| kind.root_key() == Some(key))
    }
}

/// Result of a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Success,
    /// The transport produced no response at all.
    NoData,
    /// A response arrived but was not usable.
    ParseError,
    /// Nothing was sent, either because the request could not be built or
    /// because there was no registered server to act on.
    SendFailure,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerList {
    pub servers: Vec<ServerRecord>,
}

/// Acknowledgement of a registration, check-in or deregistration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryReply {
    #[serde(rename = "WasSuccessful", default)]
    pub was_successful: bool,
    #[serde(
        rename = "CheckInFrequency",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub check_in_frequency: Option<f64>,
}

impl DirectoryReply {
    /// The check-in period the directory asked for. Missing, non-positive
    /// or unrepresentable values are rejected.
    pub fn check_in_interval(&self) -> Result<Duration, PayloadError> {
        self.check_in_frequency
            .filter(|seconds| *seconds > 0.0)
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .ok_or(PayloadError::Field("CheckInFrequency"))
    }
}

/// Builds the uncompressed JSON body for `kind` acting on `record`.
pub fn encode_request(kind: OperationKind, record: &ServerRecord) -> Result<Vec<u8>, PayloadError> {
    let key = kind.root_key().ok_or(PayloadError::UnknownRoot)?;
    let mut root = Map::new();
    root.insert(key.to_string(), serde_json::to_value(record.registration())?);
    Ok(serde_json::to_vec(&Value::Object(root))?)
}

/// Reads a request body back into the operation and its record.
pub fn decode_request(json: &[u8]) -> Result<(OperationKind, ServerRecord), PayloadError> {
    let value: Value = serde_json::from_slice(json)?;
    let object = value.as_object().ok_or(PayloadError::UnknownRoot)?;
    for (key, inner) in object {
        if let Some(kind) = OperationKind::from_root_key(key) {
            let record = ServerRecord::deserialize(inner)?;
            return Ok((kind, record));
        }
    }
    Err(PayloadError::UnknownRoot)
}

pub fn encode_server_list(servers: &[ServerRecord]) -> Result<Vec<u8>, PayloadError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        servers: &'a [ServerRecord],
    }
    Ok(serde_json::to_vec(&Borrowed { servers })?)
}

pub fn decode_server_list(json: &[u8]) -> Result<Vec<ServerRecord>, PayloadError> {
    let list: ServerList = serde_json::from_slice(json)?;
    Ok(list.servers)
}

pub fn decode_reply(json: &[u8]) -> Result<DirectoryReply, PayloadError> {
    Ok(serde_json::from_slice(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn record() -> ServerRecord {
        ServerRecord {
            name: "Lobby".to_string(),
            port: "7777".to_string(),
            ip: "192.168.0.2".to_string(),
            max_players: 8,
            current_players: 1,
            ..ServerRecord::default()
        }
    }

    #[test]
    fn test_operation_table() {
        assert_eq!(OperationKind::Register.verb(), Method::Put);
        assert_eq!(OperationKind::CheckIn.verb(), Method::Put);
        assert_eq!(OperationKind::Unregister.verb(), Method::Put);
        assert_eq!(OperationKind::ListServers.verb(), Method::Get);
        assert_eq!(OperationKind::Ping.verb(), Method::Get);
        assert_eq!(OperationKind::Ping.root_key(), None);
        assert_eq!(
            OperationKind::from_root_key("ServerCheckIn"),
            Some(OperationKind::CheckIn)
        );
        assert_eq!(OperationKind::from_root_key("servers"), None);
    }

    #[test]
    fn test_encode_request_wraps_record() {
        let body = encode_request(OperationKind::Register, &record()).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        let inner = &value["ServerRegistration"];
        assert_eq!(inner["name"], "Lobby");
        assert_eq!(inner["port"], "7777");
        assert!(inner.get("ip").is_none());
    }

    #[test]
    fn test_encode_request_rejects_payloadless_kinds() {
        assert!(encode_request(OperationKind::ListServers, &record()).is_err());
    }

    #[test]
    fn test_decode_request() {
        let body = encode_request(OperationKind::Unregister, &record()).unwrap();
        let (kind, decoded) = decode_request(&body).unwrap();
        assert_eq!(kind, OperationKind::Unregister);
        assert_eq!(decoded.name, "Lobby");
        assert!(decoded.ip.is_empty());
        assert!(matches!(
            decode_request(br#"{"Other":{}}"#),
            Err(PayloadError::UnknownRoot)
        ));
    }

    #[test]
    fn test_request_survives_compression() {
        let sent = ServerRecord {
            game_id: 42,
            name: "Harbour \"Night\" Ops".to_string(),
            ip: "203.0.113.9".to_string(),
            port: "27015".to_string(),
            game_mode: "capture the flag".to_string(),
            map: "dockyard_v2".to_string(),
            max_players: 16,
            current_players: 9,
            ping: 48,
        };

        for kind in [OperationKind::Register, OperationKind::CheckIn, OperationKind::Unregister] {
            let body = crate::compression::deflate(&encode_request(kind, &sent).unwrap()).unwrap();
            let json = crate::compression::inflate(&body).unwrap();
            let (decoded_kind, decoded) = decode_request(&json).unwrap();

            assert_eq!(decoded_kind, kind);
            assert_eq!(
                decoded,
                ServerRecord {
                    ip: String::new(),
                    ping: -1,
                    ..sent.clone()
                }
            );
        }
    }

    #[test]
    fn test_server_list_payload() {
        let json = encode_server_list(&[record()]).unwrap();
        let servers = decode_server_list(&json).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].ip, "192.168.0.2");
        assert_eq!(servers[0].ping, -1);
        assert!(decode_server_list(b"{\"server\":[]}").is_err());
    }

    #[test]
    fn test_check_in_interval() {
        let reply = decode_reply(br#"{"WasSuccessful":true,"CheckInFrequency":30}"#).unwrap();
        assert!(reply.was_successful);
        assert_eq!(reply.check_in_interval().unwrap(), Duration::from_secs(30));

        let reply = decode_reply(br#"{"WasSuccessful":true,"CheckInFrequency":0.25}"#).unwrap();
        assert_approx_eq!(reply.check_in_interval().unwrap().as_secs_f64(), 0.25);

        for bad in [
            r#"{"WasSuccessful":true}"#,
            r#"{"WasSuccessful":true,"CheckInFrequency":0}"#,
            r#"{"WasSuccessful":true,"CheckInFrequency":-5}"#,
            r#"{"WasSuccessful":true,"CheckInFrequency":1e20}"#,
        ] {
            let reply = decode_reply(bad.as_bytes()).unwrap();
            assert!(reply.check_in_interval().is_err(), "{}", bad);
        }
    }
}
