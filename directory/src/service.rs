//! Request handling for the directory service.

use crate::registry::Registry;
use log::{debug, warn};
use shared::compression::{deflate, inflate};
use shared::daemon::ACKNOWLEDGEMENT;
use shared::protocol::{self, DirectoryReply, JSON_CONTENT_TYPE, RECEIVE_SERVER_LIST};
use shared::{HttpError, HttpMessage, Method, OperationKind, PayloadError, RequestHandler, ResponseWriter};
use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const JSON_HEADER: &str = "Content-Type: application/json\r\n";

pub struct DirectoryService {
    registry: Registry,
}

impl DirectoryService {
    pub fn new(check_in_frequency: Duration) -> Self {
        Self {
            registry: Registry::new(check_in_frequency),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn server_list(&self) -> Result<Vec<u8>, PayloadError> {
        let json = protocol::encode_server_list(&self.registry.servers())?;
        deflate(&json)
    }

    /// Applies a PUT body. Returns whether the registry took the change.
    fn apply(&mut self, body: &[u8], peer: SocketAddr, now: Instant) -> Result<bool, PayloadError> {
        let json = inflate(body)?;
        let (kind, mut record) = protocol::decode_request(&json)?;
        if record.ip.is_empty() {
            record.ip = peer.ip().to_string();
        }
        Ok(match kind {
            OperationKind::Register => self.registry.register(record, now),
            OperationKind::CheckIn => self.registry.check_in(record, now),
            OperationKind::Unregister => self.registry.unregister(&record),
            OperationKind::ListServers | OperationKind::Ping => false,
        })
    }

    fn reply(&self, was_successful: bool) -> Result<Vec<u8>, PayloadError> {
        let reply = DirectoryReply {
            was_successful,
            check_in_frequency: Some(self.registry.check_in_frequency().as_secs_f64()),
        };
        deflate(&serde_json::to_vec(&reply)?)
    }
}

fn is_json(request: &HttpMessage) -> bool {
    request
        .header("Content-Type")
        .or_else(|| request.header("content-type"))
        .map_or(false, |value| value.starts_with(JSON_CONTENT_TYPE))
}

impl RequestHandler for DirectoryService {
    fn handle(
        &mut self,
        request: &HttpMessage,
        peer: SocketAddr,
        response: &mut ResponseWriter<&mut dyn Write>,
    ) -> Result<(), HttpError> {
        let now = Instant::now();
        self.registry.purge_expired(now);

        let payload = match request.method() {
            Method::Get if request.arg(RECEIVE_SERVER_LIST).is_some() => {
                debug!("Server list requested by {}", peer);
                self.server_list()
            }
            Method::Put => {
                let applied = if is_json(request) {
                    self.apply(request.body(), peer, now).unwrap_or_else(|e| {
                        warn!("Bad directory request from {}: {}", peer, e);
                        false
                    })
                } else {
                    warn!("PUT from {} without a JSON body", peer);
                    false
                };
                self.reply(applied)
            }
            _ => {
                return response.begin_fixed_response(
                    200,
                    ACKNOWLEDGEMENT,
                    None,
                    Some("Content-Type: text\r\n"),
                )
            }
        };

        match payload {
            Ok(body) => response.begin_fixed_response(200, &body, None, Some(JSON_HEADER)),
            Err(e) => {
                warn!("Could not build reply for {}: {}", peer, e);
                response.begin_fixed_response(500, b"", None, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::ServerRecord;
    use std::io::Cursor;

    const DIRECTORY_METHODS: &[Method] = &[Method::Get, Method::Put];

    fn peer() -> SocketAddr {
        "192.0.2.7:50000".parse().unwrap()
    }

    /// Runs one raw request through the service, returning status and body.
    fn call(service: &mut DirectoryService, raw: Vec<u8>) -> (u16, Vec<u8>) {
        let request = HttpMessage::parse(&mut Cursor::new(raw), DIRECTORY_METHODS).unwrap();
        let mut out = Vec::new();
        {
            let writer: &mut dyn Write = &mut out;
            let mut response = ResponseWriter::new(writer);
            service.handle(&request, peer(), &mut response).unwrap();
        }
        let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let status = std::str::from_utf8(&out[9..12]).unwrap().parse().unwrap();
        (status, out[split + 4..].to_vec())
    }

    fn put(kind: OperationKind, record: &ServerRecord) -> Vec<u8> {
        let body = deflate(&protocol::encode_request(kind, record).unwrap()).unwrap();
        let mut raw = format!(
            "PUT / HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(&body);
        raw
    }

    fn list(service: &mut DirectoryService) -> Vec<ServerRecord> {
        let (status, body) = call(service, b"GET /?ReceiveServerList=True HTTP/1.1\r\n\r\n".to_vec());
        assert_eq!(status, 200);
        protocol::decode_server_list(&inflate(&body).unwrap()).unwrap()
    }

    fn reply(body: &[u8]) -> DirectoryReply {
        protocol::decode_reply(&inflate(body).unwrap()).unwrap()
    }

    fn record() -> ServerRecord {
        ServerRecord {
            name: "Harbor".to_string(),
            port: "7777".to_string(),
            max_players: 8,
            current_players: 3,
            ..ServerRecord::default()
        }
    }

    #[test]
    fn test_register_takes_peer_address() {
        let mut service = DirectoryService::new(Duration::from_secs(30));
        let (status, body) = call(&mut service, put(OperationKind::Register, &record()));
        assert_eq!(status, 200);
        let reply = reply(&body);
        assert!(reply.was_successful);
        assert_approx_eq!(reply.check_in_frequency.unwrap(), 30.0);

        let servers = list(&mut service);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].ip, "192.0.2.7");
        assert_eq!(servers[0].name, "Harbor");
    }

    #[test]
    fn test_check_in_and_unregister() {
        let mut service = DirectoryService::new(Duration::from_secs(30));
        call(&mut service, put(OperationKind::Register, &record()));

        let mut update = record();
        update.current_players = 6;
        let (_, body) = call(&mut service, put(OperationKind::CheckIn, &update));
        assert!(reply(&body).was_successful);
        assert_eq!(list(&mut service)[0].current_players, 6);

        let (_, body) = call(&mut service, put(OperationKind::Unregister, &record()));
        assert!(reply(&body).was_successful);
        assert!(list(&mut service).is_empty());

        let (_, body) = call(&mut service, put(OperationKind::CheckIn, &record()));
        assert!(!reply(&body).was_successful);
    }

    #[test]
    fn test_unknown_root_key_unsuccessful() {
        let mut service = DirectoryService::new(Duration::from_secs(30));
        let body = deflate(br#"{"ServerHello":{}}"#).unwrap();
        let mut raw = format!(
            "PUT / HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(&body);

        let (status, body) = call(&mut service, raw);
        assert_eq!(status, 200);
        assert!(!reply(&body).was_successful);
    }

    #[test]
    fn test_put_without_json_type() {
        let mut service = DirectoryService::new(Duration::from_secs(30));
        let (_, body) = call(
            &mut service,
            b"PUT / HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}".to_vec(),
        );
        assert!(!reply(&body).was_successful);
    }

    #[test]
    fn test_plain_get_acknowledged() {
        let mut service = DirectoryService::new(Duration::from_secs(30));
        let (status, body) = call(&mut service, b"GET / HTTP/1.1\r\n\r\n".to_vec());
        assert_eq!(status, 200);
        assert_eq!(body, ACKNOWLEDGEMENT);
    }
}
