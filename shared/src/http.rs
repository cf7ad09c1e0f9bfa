//! Minimal HTTP/1.1 request parsing.
//!
//! A request is read in at most two reads into a fixed 8 KiB buffer. Only
//! the request line, the header block and a body bounded by the same buffer
//! are understood; anything beyond that is a protocol error.

use crate::codec::{decode_uri, Pair, SortedPairs};
use crate::error::HttpError;
use std::io::{self, Read};

/// Size of the receive buffer, and so the upper bound on a whole request.
pub const RECEIVE_BUFFER_SIZE: usize = 8 * 1024;

const VERSION_MARKER: &[u8] = b" HTTP/1.1\r\n";
const LINE_END: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Options => "OPTIONS",
        }
    }

    pub fn from_token(token: &[u8]) -> Option<Method> {
        match token {
            b"GET" => Some(Method::Get),
            b"POST" => Some(Method::Post),
            b"PUT" => Some(Method::Put),
            b"OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }
}

/// Methods a plain daemon answers. Anything else fails parsing.
pub const DAEMON_METHODS: &[Method] = &[Method::Get, Method::Post, Method::Options];

/// A parsed request. Names and values are already URI-decoded.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    method: Method,
    path: String,
    args: SortedPairs,
    headers: SortedPairs,
    body: Vec<u8>,
}

impl HttpMessage {
    /// Reads and parses one request from `reader`.
    ///
    /// The method must be one of `accepted`. A `Content-Length` header, when
    /// present, is honoured by reading until the body is complete; a body that
    /// would not fit in the receive buffer is rejected.
    pub fn parse<R: Read>(reader: &mut R, accepted: &[Method]) -> Result<HttpMessage, HttpError> {
        let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
        let mut filled = read_some(reader, &mut buffer)?;
        if filled == 0 {
            return Err(HttpError::NoData);
        }

        let method_end = find(&buffer[..filled], b" ", 0)
            .ok_or(HttpError::Protocol("missing method delimiter"))?;
        let method = Method::from_token(&buffer[..method_end])
            .filter(|method| accepted.contains(method))
            .ok_or(HttpError::Protocol("unsupported method"))?;

        let target_start = method_end + 1;
        let marker = find(&buffer[..filled], VERSION_MARKER, target_start)
            .ok_or(HttpError::Protocol("missing HTTP/1.1 request line"))?;
        let target = buffer[target_start..marker].to_vec();
        let headers_start = marker + VERSION_MARKER.len();

        // Some clients send the header block in a second segment.
        let mut header_end = locate_header_end(&buffer[..filled], headers_start);
        if header_end.is_none() && filled < buffer.len() {
            filled += read_some(reader, &mut buffer[filled..])?;
            header_end = locate_header_end(&buffer[..filled], headers_start);
        }
        let (headers_stop, body_start) =
            header_end.ok_or(HttpError::Protocol("missing header terminator"))?;

        let headers = parse_headers(&buffer[headers_start..headers_stop])?;

        if let Some(length) = headers.get("Content-Length") {
            let length: usize = length
                .trim()
                .parse()
                .map_err(|_| HttpError::Protocol("invalid Content-Length"))?;
            let wanted = body_start
                .checked_add(length)
                .filter(|&wanted| wanted <= buffer.len())
                .ok_or(HttpError::Protocol("body exceeds receive buffer"))?;
            while filled < wanted {
                let read = read_some(reader, &mut buffer[filled..])?;
                if read == 0 {
                    return Err(HttpError::Protocol("truncated body"));
                }
                filled += read;
            }
            filled = wanted;
        }
        let body = buffer[body_start..filled].to_vec();

        let (raw_path, query) = match target.iter().position(|&b| b == b'?') {
            Some(split) => (&target[..split], Some(&target[split + 1..])),
            None => (&target[..], None),
        };
        let path = decode_uri(raw_path)?;

        let mut args = Vec::new();
        if let Some(query) = query {
            parse_args(query, &mut args)?;
        }
        if method == Method::Post {
            parse_args(&body, &mut args)?;
        }

        Ok(HttpMessage {
            method,
            path,
            args: SortedPairs::from_stream(args),
            headers,
            body,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name)
    }

    pub fn arg_by_index(&self, index: usize) -> Option<&Pair> {
        self.args.get_by_index(index)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn header_by_index(&self, index: usize) -> Option<&Pair> {
        self.headers.get_by_index(index)
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn read_some<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize, HttpError> {
    loop {
        match reader.read(buffer) {
            Ok(read) => return Ok(read),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HttpError::Io(e)),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| offset + from)
}

/// Returns the end of the header block and the start of the body.
fn locate_header_end(buffer: &[u8], headers_start: usize) -> Option<(usize, usize)> {
    // An empty header block leaves only the blank line after the request line.
    if buffer[headers_start..].starts_with(LINE_END) {
        return Some((headers_start, headers_start + LINE_END.len()));
    }
    find(buffer, HEADER_END, headers_start).map(|end| (end, end + HEADER_END.len()))
}

fn parse_headers(block: &[u8]) -> Result<SortedPairs, HttpError> {
    let mut headers = Vec::new();
    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(HttpError::Protocol("header line without ':'"))?;
        let value = &line[colon + 1..];
        let skip = value.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        headers.push(Pair::new(
            decode_uri(&line[..colon])?,
            decode_uri(&value[skip..])?,
        ));
    }
    Ok(SortedPairs::from_stream(headers))
}

fn parse_args(block: &[u8], out: &mut Vec<Pair>) -> Result<(), HttpError> {
    for field in block.split(|&b| b == b'&') {
        if field.is_empty() {
            continue;
        }
        let (name, value) = match field.iter().position(|&b| b == b'=') {
            Some(eq) => (&field[..eq], &field[eq + 1..]),
            None => (field, &b""[..]),
        };
        out.push(Pair::new(decode_uri(name)?, decode_uri(value)?));
    }
    Ok(())
}
