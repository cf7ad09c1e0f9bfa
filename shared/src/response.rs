//! Response emission: fixed-length and chunked bodies over any `Write`.

use crate::error::HttpError;
use std::io::Write;

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = "masterserver-httpd/1.0";

/// Header block used when the caller supplies none.
pub const DEFAULT_CONTENT_TYPE: &str = "Content-Type: text/html\r\n";

static STATUS_TABLE: &[(u16, &str)] = &[
    (100, "Continue"),
    (200, "OK"),
    (206, "Partial Content"),
    (220, "OK"),
    (302, "Found"),
    (303, "See Other"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (408, "Request Timeout"),
    (500, "Internal Server Error"),
    (505, "HTTP Version Not Supported"),
];

/// Reason phrase for `code`, or `???` when the code is not in the table.
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, phrase)| *phrase)
        .unwrap_or("???")
}

/// Writes one response to a connection.
///
/// After [`begin_chunked_response`](Self::begin_chunked_response), every
/// [`write_chunk`](Self::write_chunk) is framed as a chunk until
/// [`end_chunked_response`](Self::end_chunked_response) emits the terminator.
pub struct ResponseWriter<W: Write> {
    stream: W,
    chunked: bool,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            chunked: false,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn into_inner(self) -> W {
        self.stream
    }

    /// Writes status line, headers and the whole body.
    ///
    /// `content_length` overrides the advertised length; `user_headers` must
    /// be CRLF-terminated lines and replaces the default content type. A
    /// custom header block also switches caching from `no-cache` to one hour.
    pub fn begin_fixed_response(
        &mut self,
        code: u16,
        content: &[u8],
        content_length: Option<usize>,
        user_headers: Option<&str>,
    ) -> Result<(), HttpError> {
        self.chunked = false;
        let cache = if user_headers.is_some() {
            "max-age=3600"
        } else {
            "no-cache"
        };
        let head = format!(
            "HTTP/1.1 {:03} {}\r\nServer: {}\r\nCache-Control: {}\r\nContent-Length: {}\r\n{}\r\n",
            code,
            reason_phrase(code),
            SERVER_NAME,
            cache,
            content_length.unwrap_or(content.len()),
            user_headers.unwrap_or(DEFAULT_CONTENT_TYPE),
        );
        self.send(head.as_bytes())?;
        self.send(content)
    }

    /// Writes status line and headers announcing a chunked body.
    pub fn begin_chunked_response(
        &mut self,
        code: u16,
        user_headers: Option<&str>,
    ) -> Result<(), HttpError> {
        let head = format!(
            "HTTP/1.1 {:03} {}\r\nServer: {}\r\nCache-Control: no-cache\r\nTransfer-Encoding: chunked\r\n{}\r\n",
            code,
            reason_phrase(code),
            SERVER_NAME,
            user_headers.unwrap_or(DEFAULT_CONTENT_TYPE),
        );
        self.send(head.as_bytes())?;
        self.chunked = true;
        Ok(())
    }

    /// Writes `bytes`, framed as a chunk when a chunked response is open.
    ///
    /// An empty write is skipped in chunked mode, since a zero-size chunk
    /// would end the body.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        if !self.chunked {
            return self.send(bytes);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.send(format!("{:x}\r\n", bytes.len()).as_bytes())?;
        self.send(bytes)?;
        self.send(b"\r\n")
    }

    pub fn end_chunked_response(&mut self) -> Result<(), HttpError> {
        self.chunked = false;
        self.send(b"0\r\n\r\n")
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        self.stream.write_all(bytes).map_err(HttpError::SendFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn text(writer: ResponseWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_reason_phrases() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(220), "OK");
        assert_eq!(reason_phrase(505), "HTTP Version Not Supported");
        assert_eq!(reason_phrase(418), "???");
    }

    #[test]
    fn test_fixed_response_default_headers() {
        let mut writer = ResponseWriter::new(Vec::new());
        writer.begin_fixed_response(404, b"gone", None, None).unwrap();
        assert_eq!(
            text(writer),
            format!(
                "HTTP/1.1 404 Not Found\r\nServer: {}\r\nCache-Control: no-cache\r\n\
                 Content-Length: 4\r\nContent-Type: text/html\r\n\r\ngone",
                SERVER_NAME
            )
        );
    }

    #[test]
    fn test_fixed_response_custom_headers() {
        let mut writer = ResponseWriter::new(Vec::new());
        writer
            .begin_fixed_response(200, b"Request Received!", None, Some("Content-Type: text\r\n"))
            .unwrap();
        let out = text(writer);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Cache-Control: max-age=3600\r\n"));
        assert!(out.contains("Content-Length: 17\r\nContent-Type: text\r\n\r\nRequest Received!"));
        assert!(!out.contains("text/html"));
    }

    #[test]
    fn test_status_code_zero_padded() {
        let mut writer = ResponseWriter::new(Vec::new());
        writer.begin_fixed_response(7, b"", Some(0), None).unwrap();
        assert!(text(writer).starts_with("HTTP/1.1 007 ???\r\n"));
    }

    #[test]
    fn test_chunked_response_framing() {
        let mut writer = ResponseWriter::new(Vec::new());
        writer.begin_chunked_response(200, None).unwrap();
        assert!(writer.is_chunked());
        writer.write_chunk(b"hello").unwrap();
        writer.write_chunk(b"").unwrap();
        writer.write_chunk(&[b'x'; 26]).unwrap();
        writer.end_chunked_response().unwrap();
        assert!(!writer.is_chunked());

        let out = text(writer);
        assert!(out.contains("Transfer-Encoding: chunked\r\n"));
        let body = out.split("\r\n\r\n").nth(1).unwrap();
        assert!(out.ends_with(&format!("5\r\nhello\r\n1a\r\n{}\r\n0\r\n\r\n", "x".repeat(26))));
        assert!(body.starts_with("5\r\nhello"));
    }

    #[test]
    fn test_write_failure_is_send_failure() {
        let mut writer = ResponseWriter::new(BrokenPipe);
        let result = writer.begin_fixed_response(200, b"x", None, None);
        assert!(matches!(result, Err(HttpError::SendFailure(_))));
    }
}
