//! Single-threaded HTTP daemon driven by an external tick.
//!
//! The daemon owns a listening socket and serves at most one connection per
//! [`HttpDaemon::process_once`] call: read, parse, dispatch, close. There is
//! no keep-alive.

use crate::error::HttpError;
use crate::http::{HttpMessage, Method, DAEMON_METHODS};
use crate::response::ResponseWriter;
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Port the probe daemon listens on.
pub const DEFAULT_DAEMON_PORT: u16 = 8082;

/// Body of the default acknowledgement response.
pub const ACKNOWLEDGEMENT: &[u8] = b"Request Received!";

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Application callback invoked once per successfully parsed request.
pub trait RequestHandler: Send {
    fn handle(
        &mut self,
        request: &HttpMessage,
        peer: SocketAddr,
        response: &mut ResponseWriter<&mut dyn Write>,
    ) -> Result<(), HttpError>;
}

/// Replies `200 Request Received!` to everything. Used as the ping target.
#[derive(Debug, Default, Clone, Copy)]
pub struct Acknowledge;

impl RequestHandler for Acknowledge {
    fn handle(
        &mut self,
        request: &HttpMessage,
        peer: SocketAddr,
        response: &mut ResponseWriter<&mut dyn Write>,
    ) -> Result<(), HttpError> {
        debug!("{} {} from {}", request.method().as_str(), request.path(), peer);
        response.begin_fixed_response(200, ACKNOWLEDGEMENT, None, Some("Content-Type: text\r\n"))
    }
}

/// Reads a request under a single deadline, however many reads it takes.
struct RequestReader<'a> {
    stream: &'a TcpStream,
    deadline: Instant,
}

impl Read for RequestReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "request deadline passed"));
        }
        self.stream.set_read_timeout(Some(remaining))?;
        let mut stream = self.stream;
        stream.read(buf)
    }
}

pub struct HttpDaemon<H> {
    listener: TcpListener,
    handler: H,
    methods: Vec<Method>,
    read_timeout: Duration,
}

impl<H: RequestHandler> HttpDaemon<H> {
    /// Binds the listening socket. The socket is non-blocking until a
    /// blocking [`process_once`](Self::process_once) asks otherwise.
    pub fn bind<A: ToSocketAddrs>(addr: A, handler: H) -> Result<Self, HttpError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!("HTTP daemon listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handler,
            methods: DAEMON_METHODS.to_vec(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Replaces the set of methods the parser accepts.
    pub fn with_methods(mut self, methods: &[Method]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    /// Time allowed for receiving a whole request, counted from accept.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serves one pending connection, if any.
    ///
    /// Returns `Ok(false)` when a non-blocking call found nothing to accept.
    /// Per-connection failures are answered with a 500 and do not surface
    /// here; only listener errors do.
    pub fn process_once(&mut self, blocking: bool) -> Result<bool, HttpError> {
        self.listener.set_nonblocking(!blocking)?;
        let (mut stream, peer) = match self.listener.accept() {
            Ok(connection) => connection,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                return Ok(false)
            }
            Err(e) => return Err(e.into()),
        };

        let deadline = Instant::now() + self.read_timeout;
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(self.read_timeout))?;
        self.serve(&mut stream, peer, deadline);
        Ok(true)
    }

    /// Polls with [`process_once`](Self::process_once) every `tick` until
    /// `stop` is set.
    pub fn run_until(&mut self, tick: Duration, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            match self.process_once(false) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => warn!("HTTP daemon accept failed: {}", e),
            }
            thread::sleep(tick);
        }
        debug!("HTTP daemon loop stopped");
    }

    fn serve(&mut self, stream: &mut TcpStream, peer: SocketAddr, deadline: Instant) {
        let mut reader = RequestReader {
            stream: &*stream,
            deadline,
        };
        match HttpMessage::parse(&mut reader, &self.methods) {
            Ok(request) => {
                let writer: &mut dyn Write = stream;
                let mut response = ResponseWriter::new(writer);
                if let Err(e) = self.handler.handle(&request, peer, &mut response) {
                    warn!("Handler failed for {}: {}", peer, e);
                }
            }
            Err(e) => {
                warn!("Rejecting request from {}: {}", peer, e);
                let writer: &mut dyn Write = stream;
                if let Err(e) = ResponseWriter::new(writer).begin_fixed_response(500, b"", None, None) {
                    debug!("Could not deliver 500 to {}: {}", peer, e);
                }
            }
        }
    }
}
