//! Blocking HTTP/1.1 client used as the directory transport.
//!
//! One request per connection (`Connection: close`). The response body may
//! be framed by `Content-Length`, by chunked transfer coding, or by the peer
//! closing the connection.

use crate::error::TransportError;
use log::debug;
use shared::protocol::USER_AGENT;
use shared::Method;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// `http://host[:port][/path]`, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Endpoint, TransportError> {
        let invalid = || TransportError::InvalidUrl(url.to_string());
        let rest = url.strip_prefix("http://").ok_or_else(invalid)?;
        let (authority, path) = match rest.find(|c| c == '/' || c == '?') {
            Some(split) => (&rest[..split], &rest[split..]),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, 80),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }

        let path = match path {
            "" => "/".to_string(),
            p if p.starts_with('?') => format!("/{}", p),
            p => p.to_string(),
        };
        Ok(Endpoint {
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Same host and port, different path.
    pub fn at(&self, path: &str) -> Endpoint {
        Endpoint {
            path: path.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub endpoint: Endpoint,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutboundRequest {
    pub fn new(method: Method, endpoint: Endpoint) -> Self {
        Self {
            method,
            endpoint,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}:{}\r\nConnection: close\r\nUser-Agent: {}\r\n",
            self.method.as_str(),
            self.endpoint.path,
            self.endpoint.host,
            self.endpoint.port,
            USER_AGENT,
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if !self.body.is_empty() || self.method == Method::Put || self.method == Method::Post {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup; the last occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one request and produces one response. Implementations block.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: &OutboundRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub max_response_size: usize,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

impl HttpClient {
    fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
        let addrs = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(TransportError::Connect)?;

        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host did not resolve");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = e,
            }
        }
        Err(TransportError::Connect(last_error))
    }
}

impl Transport for HttpClient {
    fn execute(&self, request: &OutboundRequest) -> Result<HttpResponse, TransportError> {
        let endpoint = &request.endpoint;
        debug!(
            "{} http://{}:{}{}",
            request.method.as_str(),
            endpoint.host,
            endpoint.port,
            endpoint.path
        );

        let mut stream = self.connect(endpoint)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        stream.write_all(&request.to_bytes())?;

        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = match stream.read(&mut chunk) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if read == 0 {
                return parse_response(&received, true)?
                    .ok_or(TransportError::Malformed("incomplete response"));
            }
            received.extend_from_slice(&chunk[..read]);
            if received.len() > self.max_response_size {
                return Err(TransportError::TooLarge(self.max_response_size));
            }
            if let Some(response) = parse_response(&received, false)? {
                return Ok(response);
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parses a response from the bytes received so far.
///
/// Returns `Ok(None)` while more bytes are needed. With `at_eof` set the
/// bytes are final, so an incomplete message is an error and a body without
/// framing runs to the end.
pub fn parse_response(bytes: &[u8], at_eof: bool) -> Result<Option<HttpResponse>, TransportError> {
    let incomplete = |what: &'static str| {
        if at_eof {
            Err(TransportError::Malformed(what))
        } else {
            Ok(None)
        }
    };

    if bytes.is_empty() {
        return if at_eof { Err(TransportError::Empty) } else { Ok(None) };
    }
    let head_end = match find(bytes, b"\r\n\r\n") {
        Some(end) => end,
        None => return incomplete("truncated header"),
    };
    let head = std::str::from_utf8(&bytes[..head_end])
        .map_err(|_| TransportError::Malformed("header is not utf-8"))?;

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    if !parts.next().unwrap_or_default().starts_with("HTTP/1.") {
        return Err(TransportError::Malformed("status line"));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(TransportError::Malformed("status code"))?;

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or(TransportError::Malformed("header line"))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut response = HttpResponse {
        status,
        headers,
        body: Vec::new(),
    };
    let body = &bytes[head_end + 4..];

    let chunked = response
        .header("Transfer-Encoding")
        .map_or(false, |coding| coding.to_ascii_lowercase().contains("chunked"));
    if chunked {
        match decode_chunked(body)? {
            Some(decoded) => response.body = decoded,
            None => return incomplete("truncated chunked body"),
        }
    } else if let Some(length) = response.header("Content-Length") {
        let length: usize = length
            .parse()
            .map_err(|_| TransportError::Malformed("Content-Length"))?;
        if body.len() < length {
            return incomplete("truncated body");
        }
        response.body = body[..length].to_vec();
    } else if at_eof {
        response.body = body.to_vec();
    } else {
        return Ok(None);
    }
    Ok(Some(response))
}

fn decode_chunked(mut data: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
    let mut body = Vec::new();
    loop {
        let line_end = match find(data, b"\r\n") {
            Some(end) => end,
            None => return Ok(None),
        };
        let size_line = std::str::from_utf8(&data[..line_end])
            .map_err(|_| TransportError::Malformed("chunk size"))?;
        let size_text = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| TransportError::Malformed("chunk size"))?;
        data = &data[line_end + 2..];

        // Trailers after the last chunk are ignored.
        if size == 0 {
            return Ok(Some(body));
        }
        if size > DEFAULT_MAX_RESPONSE_SIZE {
            return Err(TransportError::TooLarge(DEFAULT_MAX_RESPONSE_SIZE));
        }
        let framed = size + 2;
        if data.len() < framed {
            return Ok(None);
        }
        if &data[size..framed] != b"\r\n" {
            return Err(TransportError::Malformed("chunk terminator"));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[framed..];
    }
}
