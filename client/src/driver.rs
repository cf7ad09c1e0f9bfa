//! # Directory Protocol Driver
//!
//! Runs as a single tokio task that owns everything mutable about the
//! directory conversation: the request queue, the registered server record
//! and the check-in timer. Callers talk to it through a cloneable
//! [`DirectoryHandle`]; every operation yields exactly one
//! [`DirectoryEvent`], delivered both to the caller's [`PendingOperation`]
//! and to the driver's event stream.
//!
//! Transport calls are blocking and run on the blocking pool. Their results
//! come back to the driver task as completions, so only the driver task
//! ever starts the next queued operation.

use crate::error::{DriverError, TransportError};
use crate::http_client::{Endpoint, HttpResponse, OutboundRequest, Transport};
use crate::queue::RequestQueue;
use log::{debug, info, warn};
use shared::compression::{deflate, inflate};
use shared::protocol::{self, DEFAULT_DIRECTORY_PORT, JSON_CONTENT_TYPE, RECEIVE_SERVER_LIST};
use shared::{Method, OperationKind, Outcome, PayloadError, ServerRecord, DEFAULT_DAEMON_PORT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Base URL of the directory, e.g. `http://127.0.0.1:8081`.
    pub url: String,
    /// Port of the probe daemon on servers being pinged.
    pub daemon_port: u16,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: format!("http://127.0.0.1:{}", DEFAULT_DIRECTORY_PORT),
            daemon_port: DEFAULT_DAEMON_PORT,
        }
    }
}

/// Completion notification, one per operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    ServerListReceived {
        outcome: Outcome,
        servers: Vec<ServerRecord>,
    },
    Registered {
        outcome: Outcome,
        check_in_interval: Option<Duration>,
    },
    CheckedIn {
        outcome: Outcome,
    },
    Unregistered {
        outcome: Outcome,
    },
    PingComplete {
        outcome: Outcome,
        server: ServerRecord,
    },
}

impl DirectoryEvent {
    pub fn outcome(&self) -> Outcome {
        match self {
            DirectoryEvent::ServerListReceived { outcome, .. }
            | DirectoryEvent::Registered { outcome, .. }
            | DirectoryEvent::CheckedIn { outcome }
            | DirectoryEvent::Unregistered { outcome }
            | DirectoryEvent::PingComplete { outcome, .. } => *outcome,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            DirectoryEvent::ServerListReceived { .. } => OperationKind::ListServers,
            DirectoryEvent::Registered { .. } => OperationKind::Register,
            DirectoryEvent::CheckedIn { .. } => OperationKind::CheckIn,
            DirectoryEvent::Unregistered { .. } => OperationKind::Unregister,
            DirectoryEvent::PingComplete { .. } => OperationKind::Ping,
        }
    }
}

/// Snapshot of the driver's state.
#[derive(Debug, Clone)]
pub struct DriverStatus {
    pub registered: ServerRecord,
    /// Set while the check-in timer is armed.
    pub check_in_interval: Option<Duration>,
    pub queued: usize,
    pub in_flight: Option<OperationKind>,
}

type Reply = Option<oneshot::Sender<DirectoryEvent>>;

enum Command {
    Register(ServerRecord, Reply),
    Unregister(Reply),
    CheckIn(Reply),
    ListServers(i64, Reply),
    Ping(ServerRecord, Reply),
    UpdatePlayerCount(i32),
    Status(oneshot::Sender<DriverStatus>),
}

/// Result of an operation submitted through a [`DirectoryHandle`].
#[derive(Debug)]
pub struct PendingOperation {
    reply: oneshot::Receiver<DirectoryEvent>,
}

impl PendingOperation {
    pub async fn wait(self) -> Result<DirectoryEvent, DriverError> {
        self.reply.await.map_err(|_| DriverError::Closed)
    }
}

/// Cloneable front end of a running driver. The driver stops once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DirectoryHandle {
    /// Stores `server` as the registered record and announces it.
    pub fn register(&self, server: ServerRecord) -> PendingOperation {
        self.submit(|reply| Command::Register(server, reply))
    }

    pub fn unregister(&self) -> PendingOperation {
        self.submit(Command::Unregister)
    }

    /// Sends a check-in now. The timer does this on its own after a
    /// successful registration.
    pub fn check_in(&self) -> PendingOperation {
        self.submit(Command::CheckIn)
    }

    /// Requests the server list. `game_id` 0 keeps every server.
    pub fn list_servers(&self, game_id: i64) -> PendingOperation {
        self.submit(|reply| Command::ListServers(game_id, reply))
    }

    /// Measures round-trip time to the probe daemon of `server`.
    pub fn ping(&self, server: ServerRecord) -> PendingOperation {
        self.submit(|reply| Command::Ping(server, reply))
    }

    /// Updates the player count carried by the next check-in.
    pub fn update_player_count(&self, current_players: i32) -> Result<(), DriverError> {
        self.commands
            .send(Command::UpdatePlayerCount(current_players))
            .map_err(|_| DriverError::Closed)
    }

    pub async fn status(&self) -> Result<DriverStatus, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Status(tx))
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    fn submit<F: FnOnce(Reply) -> Command>(&self, build: F) -> PendingOperation {
        let (tx, rx) = oneshot::channel();
        // On a closed driver the sender is dropped with the command and
        // `wait` reports `Closed`.
        let _ = self.commands.send(build(Some(tx)));
        PendingOperation { reply: rx }
    }
}

struct DirectoryOperation {
    kind: OperationKind,
    request: OutboundRequest,
    target: Option<ServerRecord>,
    game_filter: i64,
    registration: u64,
    reply: Reply,
}

struct Completion {
    result: Result<HttpResponse, TransportError>,
    elapsed: Duration,
}

enum Payload {
    None,
    Servers(Vec<ServerRecord>),
    CheckInInterval(Duration),
}

pub struct DirectoryDriver {
    endpoint: Endpoint,
    daemon_port: u16,
    transport: Arc<dyn Transport>,
    queue: RequestQueue<DirectoryOperation>,

    registered: ServerRecord,
    // Bumped whenever the registration changes, so late completions of an
    // earlier registration cannot arm or clear anything.
    registration: u64,
    check_in: Option<Interval>,
    check_in_period: Option<Duration>,

    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    events: mpsc::UnboundedSender<DirectoryEvent>,
}

impl DirectoryDriver {
    /// Starts the driver task. Returns the handle, the event stream and the
    /// task itself.
    pub fn spawn(
        config: &DirectoryConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<
        (
            DirectoryHandle,
            mpsc::UnboundedReceiver<DirectoryEvent>,
            JoinHandle<()>,
        ),
        TransportError,
    > {
        let endpoint = Endpoint::parse(&config.url)?;
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let driver = DirectoryDriver {
            endpoint,
            daemon_port: config.daemon_port,
            transport,
            queue: RequestQueue::new(),
            registered: ServerRecord::default(),
            registration: 0,
            check_in: None,
            check_in_period: None,
            commands,
            completions_tx,
            completions,
            events,
        };
        let task = tokio::spawn(driver.run());

        Ok((DirectoryHandle { commands: commands_tx }, events_rx, task))
    }

    async fn run(mut self) {
        info!(
            "Directory driver started for {}:{}",
            self.endpoint.host, self.endpoint.port
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                },

                _ = next_tick(&mut self.check_in) => {
                    debug!("Check-in timer fired");
                    self.check_in(None);
                },
            }
        }

        info!("Directory driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register(server, reply) => self.register(server, reply),
            Command::Unregister(reply) => self.unregister(reply),
            Command::CheckIn(reply) => self.check_in(reply),
            Command::ListServers(game_filter, reply) => {
                let base = self.endpoint.path.trim_end_matches('/');
                let path = format!("{}/?{}=True", base, RECEIVE_SERVER_LIST);
                let request = OutboundRequest::new(Method::Get, self.endpoint.at(&path));
                self.enqueue(OperationKind::ListServers, Ok(request), None, game_filter, reply);
            }
            Command::Ping(server, reply) => {
                let endpoint = Endpoint {
                    host: server.ip.clone(),
                    port: self.daemon_port,
                    path: "/".to_string(),
                };
                let request = OutboundRequest::new(Method::Get, endpoint);
                self.enqueue(OperationKind::Ping, Ok(request), Some(server), 0, reply);
            }
            Command::UpdatePlayerCount(current_players) => {
                if !self.registered.is_empty() {
                    self.registered.current_players = current_players;
                }
            }
            Command::Status(tx) => {
                let _ = tx.send(DriverStatus {
                    registered: self.registered.clone(),
                    check_in_interval: self.check_in_period,
                    queued: self.queue.backlog_len(),
                    in_flight: self.queue.in_flight().map(|operation| operation.kind),
                });
            }
        }
    }

    fn register(&mut self, server: ServerRecord, reply: Reply) {
        self.cancel_check_in();
        self.registration += 1;

        if server.is_empty() {
            warn!("Refusing to register a server without name or port");
            self.registered.clear();
            self.notify(
                DirectoryEvent::Registered {
                    outcome: Outcome::SendFailure,
                    check_in_interval: None,
                },
                reply,
            );
            return;
        }

        info!("Registering '{}' on port {}", server.name, server.port);
        self.registered = server;
        let request = self.directory_request(OperationKind::Register, &self.registered);
        self.enqueue(OperationKind::Register, request, None, 0, reply);
    }

    fn unregister(&mut self, reply: Reply) {
        if self.registered.is_empty() {
            warn!("Unregister requested with nothing registered");
            self.notify(
                DirectoryEvent::Unregistered {
                    outcome: Outcome::SendFailure,
                },
                reply,
            );
            return;
        }

        // The timer goes before the record so no check-in can follow.
        self.cancel_check_in();
        self.registration += 1;
        let server = std::mem::take(&mut self.registered);
        info!("Unregistering '{}'", server.name);
        let request = self.directory_request(OperationKind::Unregister, &server);
        self.enqueue(OperationKind::Unregister, request, None, 0, reply);
    }

    fn check_in(&mut self, reply: Reply) {
        if self.registered.is_empty() {
            warn!("Check-in requested with nothing registered");
            self.cancel_check_in();
            self.notify(
                DirectoryEvent::CheckedIn {
                    outcome: Outcome::SendFailure,
                },
                reply,
            );
            return;
        }

        let request = self.directory_request(OperationKind::CheckIn, &self.registered);
        self.enqueue(OperationKind::CheckIn, request, None, 0, reply);
    }

    fn directory_request(
        &self,
        kind: OperationKind,
        server: &ServerRecord,
    ) -> Result<OutboundRequest, PayloadError> {
        let json = protocol::encode_request(kind, server)?;
        let body = deflate(&json)?;
        Ok(OutboundRequest::new(kind.verb(), self.endpoint.clone())
            .with_header("Content-Type", JSON_CONTENT_TYPE)
            .with_body(body))
    }

    fn enqueue(
        &mut self,
        kind: OperationKind,
        request: Result<OutboundRequest, PayloadError>,
        target: Option<ServerRecord>,
        game_filter: i64,
        reply: Reply,
    ) {
        match request {
            Ok(request) => {
                self.queue.push(DirectoryOperation {
                    kind,
                    request,
                    target,
                    game_filter,
                    registration: self.registration,
                    reply,
                });
                self.start_next();
            }
            Err(e) => {
                warn!("Could not build {:?} request: {}", kind, e);
                let event = failure_event(kind, Outcome::SendFailure, target);
                self.notify(event, reply);
            }
        }
    }

    /// Transmits the backlog head if nothing is in flight.
    fn start_next(&mut self) {
        let operation = match self.queue.start_next() {
            Some(operation) => operation,
            None => return,
        };
        debug!("Starting {:?}", operation.kind);

        let request = operation.request.clone();
        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let exchange = tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let result = transport.execute(&request);
                (result, started.elapsed())
            })
            .await;

            let completion = match exchange {
                Ok((result, elapsed)) => Completion { result, elapsed },
                Err(e) => Completion {
                    result: Err(TransportError::Aborted(e.to_string())),
                    elapsed: Duration::ZERO,
                },
            };
            let _ = completions.send(completion);
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        let operation = match self.queue.finish() {
            Some(operation) => operation,
            None => {
                warn!("Completion arrived with nothing in flight");
                return;
            }
        };

        let kind = operation.kind;
        let current = operation.registration == self.registration;
        let evaluated = evaluate(kind, completion.result);
        let outcome = match &evaluated {
            Ok(_) => Outcome::Success,
            Err(outcome) => *outcome,
        };
        info!("{:?} completed: {:?}", kind, outcome);

        let event = match kind {
            OperationKind::Register => {
                let interval = match evaluated {
                    Ok(Payload::CheckInInterval(period)) => Some(period),
                    _ => None,
                };
                if current {
                    match interval {
                        Some(period) => self.arm_check_in(period),
                        None => {
                            self.registered.clear();
                            self.registration += 1;
                        }
                    }
                }
                DirectoryEvent::Registered {
                    outcome,
                    check_in_interval: interval,
                }
            }
            OperationKind::CheckIn => {
                if !outcome.is_success() && current {
                    self.cancel_check_in();
                    self.registered.clear();
                    self.registration += 1;
                }
                DirectoryEvent::CheckedIn { outcome }
            }
            OperationKind::Unregister => DirectoryEvent::Unregistered { outcome },
            OperationKind::ListServers => {
                let mut servers = match evaluated {
                    Ok(Payload::Servers(servers)) => servers,
                    _ => Vec::new(),
                };
                if operation.game_filter != 0 {
                    servers.retain(|server| server.game_id == operation.game_filter);
                }
                DirectoryEvent::ServerListReceived { outcome, servers }
            }
            OperationKind::Ping => {
                let mut server = operation.target.unwrap_or_default();
                if outcome.is_success() {
                    server.ping = completion.elapsed.as_millis().min(i32::MAX as u128) as i32;
                }
                DirectoryEvent::PingComplete { outcome, server }
            }
        };

        self.notify(event, operation.reply);
        self.start_next();
    }

    fn arm_check_in(&mut self, period: Duration) {
        let mut timer = time::interval_at(time::Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.check_in = Some(timer);
        self.check_in_period = Some(period);
        info!("Check-in armed every {:.2}s", period.as_secs_f64());
    }

    fn cancel_check_in(&mut self) {
        if self.check_in.take().is_some() {
            info!("Check-in timer cancelled");
        }
        self.check_in_period = None;
    }

    fn notify(&self, event: DirectoryEvent, reply: Reply) {
        if let Some(reply) = reply {
            let _ = reply.send(event.clone());
        }
        let _ = self.events.send(event);
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn failure_event(kind: OperationKind, outcome: Outcome, target: Option<ServerRecord>) -> DirectoryEvent {
    match kind {
        OperationKind::Register => DirectoryEvent::Registered {
            outcome,
            check_in_interval: None,
        },
        OperationKind::Unregister => DirectoryEvent::Unregistered { outcome },
        OperationKind::CheckIn => DirectoryEvent::CheckedIn { outcome },
        OperationKind::ListServers => DirectoryEvent::ServerListReceived {
            outcome,
            servers: Vec::new(),
        },
        OperationKind::Ping => DirectoryEvent::PingComplete {
            outcome,
            server: target.unwrap_or_default(),
        },
    }
}

fn unusable(kind: OperationKind, error: PayloadError) -> Outcome {
    warn!("{:?} response unusable: {}", kind, error);
    Outcome::ParseError
}

/// Only JSON replies carry a compressed payload.
fn is_json(response: &HttpResponse) -> bool {
    response.header("Content-Type").map_or(false, |value| {
        value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .eq_ignore_ascii_case(JSON_CONTENT_TYPE)
    })
}

/// Maps a transport result to the operation's payload, or to the failing
/// outcome.
fn evaluate(
    kind: OperationKind,
    result: Result<HttpResponse, TransportError>,
) -> Result<Payload, Outcome> {
    let response = result.map_err(|e| {
        warn!("{:?} got no response: {}", kind, e);
        Outcome::NoData
    })?;
    if !response.is_success() {
        warn!("{:?} failed with HTTP status {}", kind, response.status);
        return Err(Outcome::SendFailure);
    }
    if kind == OperationKind::Ping {
        return Ok(Payload::None);
    }
    if !is_json(&response) {
        warn!(
            "{:?} reply is {:?}, not {}",
            kind,
            response.header("Content-Type").unwrap_or_default(),
            JSON_CONTENT_TYPE
        );
        return Err(Outcome::ParseError);
    }

    let json = inflate(&response.body).map_err(|e| unusable(kind, e))?;
    match kind {
        OperationKind::ListServers => protocol::decode_server_list(&json)
            .map(Payload::Servers)
            .map_err(|e| unusable(kind, e)),
        OperationKind::Register => {
            let reply = protocol::decode_reply(&json).map_err(|e| unusable(kind, e))?;
            if !reply.was_successful {
                warn!("Directory reported the registration as unsuccessful");
            }
            reply
                .check_in_interval()
                .map(Payload::CheckInInterval)
                .map_err(|e| unusable(kind, e))
        }
        _ => serde_json::from_slice::<serde_json::Value>(&json)
            .map(|_| Payload::None)
            .map_err(|e| unusable(kind, e.into())),
    }
}
