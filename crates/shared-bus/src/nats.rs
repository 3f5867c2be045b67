//! # NATS Transport
//!
//! Minimal NATS core protocol client: plain TCP, no headers, no JetStream.
//!
//! ```text
//!   NatsBus ──frames──▶ writer task ──▶ TCP ──▶ nats-server
//!      ▲                                          │
//!      └──── subscription channels ◀── reader task ◀┘
//! ```
//!
//! The reader task answers server `PING`s and routes `MSG` frames to the
//! matching subscription by sid. The writer task pings the server every
//! [`NatsOptions::ping_interval`]; after [`NatsOptions::max_pings_out`]
//! unanswered pings the connection is treated as dead. When the connection
//! drops every subscription ends and further calls fail with
//! [`BusError::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::BusError;
use crate::message::Message;
use crate::publisher::Publisher;
use crate::subject::{validate_publish_subject, validate_queue_group, validate_subscribe_subject};
use crate::subscriber::{Subscriber, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Port used when the URL does not name one.
pub const DEFAULT_PORT: u16 = 4222;

/// Payload limit assumed when the server does not announce one.
const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Connection options.
#[derive(Debug, Clone)]
pub struct NatsOptions {
    /// Server URL, e.g. `nats://127.0.0.1:4222`.
    pub url: String,
    /// Client name announced in `CONNECT`.
    pub name: String,
    /// Messages buffered per subscription.
    pub channel_capacity: usize,
    /// Limit for TCP connect plus handshake.
    pub connect_timeout: Duration,
    /// Client keepalive `PING` period.
    pub ping_interval: Duration,
    /// Unanswered pings tolerated before the connection is closed.
    pub max_pings_out: u32,
}

impl Default for NatsOptions {
    fn default() -> Self {
        Self {
            url: format!("nats://127.0.0.1:{DEFAULT_PORT}"),
            name: "kube-nats".to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(120),
            max_pings_out: 2,
        }
    }
}

impl NatsOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Subset of the server `INFO` we act on.
#[derive(Debug, Deserialize)]
struct ServerInfo {
    #[serde(default)]
    server_id: String,
    #[serde(default = "default_max_payload")]
    max_payload: usize,
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

/// An operation received from the server.
#[derive(Debug, PartialEq, Eq)]
enum ServerOp {
    Info(String),
    Msg {
        subject: String,
        sid: u64,
        reply: Option<String>,
        size: usize,
    },
    Ping,
    Pong,
    Ok,
    Err(String),
}

fn parse_server_op(line: &str) -> Result<ServerOp, BusError> {
    let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
    match op.to_ascii_uppercase().as_str() {
        "MSG" => parse_msg_args(rest),
        "PING" => Ok(ServerOp::Ping),
        "PONG" => Ok(ServerOp::Pong),
        "+OK" => Ok(ServerOp::Ok),
        "-ERR" => Ok(ServerOp::Err(rest.trim().trim_matches('\'').to_string())),
        "INFO" => Ok(ServerOp::Info(rest.trim().to_string())),
        _ => Err(BusError::Protocol(format!("unexpected server operation: {line}"))),
    }
}

fn parse_msg_args(args: &str) -> Result<ServerOp, BusError> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let (subject, sid, reply, size) = match parts.as_slice() {
        [subject, sid, size] => (*subject, *sid, None, *size),
        [subject, sid, reply, size] => (*subject, *sid, Some(*reply), *size),
        _ => return Err(BusError::Protocol(format!("malformed MSG: {args}"))),
    };
    let sid = sid
        .parse()
        .map_err(|_| BusError::Protocol(format!("bad sid in MSG: {args}")))?;
    let size = size
        .parse()
        .map_err(|_| BusError::Protocol(format!("bad size in MSG: {args}")))?;
    Ok(ServerOp::Msg {
        subject: subject.to_string(),
        sid,
        reply: reply.map(str::to_string),
        size,
    })
}

fn pub_frame(subject: &str, reply: Option<&str>, payload: &[u8]) -> Bytes {
    let head = match reply {
        Some(reply) => format!("PUB {subject} {reply} {}\r\n", payload.len()),
        None => format!("PUB {subject} {}\r\n", payload.len()),
    };
    let mut frame = Vec::with_capacity(head.len() + payload.len() + 2);
    frame.extend_from_slice(head.as_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(b"\r\n");
    Bytes::from(frame)
}

fn sub_frame(subject: &str, group: Option<&str>, sid: u64) -> Bytes {
    match group {
        Some(group) => Bytes::from(format!("SUB {subject} {group} {sid}\r\n")),
        None => Bytes::from(format!("SUB {subject} {sid}\r\n")),
    }
}

fn unsub_frame(sid: u64) -> Bytes {
    Bytes::from(format!("UNSUB {sid}\r\n"))
}

fn connect_frame(name: &str) -> Result<Bytes, BusError> {
    let body = serde_json::json!({
        "verbose": false,
        "pedantic": false,
        "lang": "rust",
        "version": env!("CARGO_PKG_VERSION"),
        "name": name,
        "protocol": 1,
        "echo": true,
        "headers": false,
    });
    let body = serde_json::to_string(&body).map_err(BusError::Encode)?;
    Ok(Bytes::from(format!("CONNECT {body}\r\n")))
}

/// Resolve a server URL to `host:port`.
///
/// Accepts `nats://`, `tcp://` or no scheme, ignores credentials, and uses
/// the first entry of a comma-separated list.
fn server_address(url: &str) -> Result<String, BusError> {
    let connect_err = |reason: &str| BusError::Connect {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let first = url.split(',').next().unwrap_or_default().trim();
    let rest = match first.split_once("://") {
        Some(("nats" | "tcp", rest)) => rest,
        Some((scheme, _)) => {
            return Err(connect_err(&format!("unsupported scheme {scheme:?}")));
        }
        None => first,
    };
    let host_port = rest
        .rsplit_once('@')
        .map_or(rest, |(_, host)| host)
        .trim_end_matches('/');
    if host_port.is_empty() {
        return Err(connect_err("missing host"));
    }

    let has_port = host_port
        .rfind(':')
        .is_some_and(|i| !host_port[i..].contains(']'));
    if has_port {
        Ok(host_port.to_string())
    } else {
        Ok(format!("{host_port}:{DEFAULT_PORT}"))
    }
}

/// Read one protocol line without its trailing CRLF.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String, BusError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(BusError::Closed);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// `INFO` → `CONNECT` + `PING` → `PONG`.
async fn handshake(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    name: &str,
) -> Result<ServerInfo, BusError> {
    let info = match parse_server_op(&read_line(reader).await?)? {
        ServerOp::Info(json) => serde_json::from_str::<ServerInfo>(&json).map_err(BusError::Decode)?,
        other => {
            return Err(BusError::Protocol(format!("expected INFO, got {other:?}")));
        }
    };

    writer.write_all(&connect_frame(name)?).await?;
    writer.write_all(b"PING\r\n").await?;
    writer.flush().await?;

    loop {
        match parse_server_op(&read_line(reader).await?)? {
            ServerOp::Pong => return Ok(info),
            ServerOp::Err(msg) => return Err(BusError::Protocol(msg)),
            ServerOp::Ping => writer.write_all(b"PONG\r\n").await?,
            ServerOp::Ok | ServerOp::Info(_) => {}
            ServerOp::Msg { .. } => {
                return Err(BusError::Protocol("MSG before handshake completed".into()));
            }
        }
    }
}

/// State shared between the bus handle and its I/O tasks.
struct Shared {
    subs: RwLock<HashMap<u64, mpsc::Sender<Message>>>,
    frames: mpsc::UnboundedSender<Bytes>,
    next_sid: AtomicU64,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    pings_out: AtomicU32,
}

impl Shared {
    fn send(&self, frame: Bytes) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.frames.send(frame).map_err(|_| BusError::Closed)
    }

    fn dispatch(&self, sid: u64, msg: Message) {
        let subs = self.subs.read();
        let Some(sender) = subs.get(&sid) else {
            debug!(sid, subject = %msg.subject, "Message for unknown subscription");
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(msg)) = sender.try_send(msg) {
            warn!(sid, subject = %msg.subject, "Subscriber buffer full, message dropped");
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.subs.write().clear();
            self.closed_tx.send_replace(true);
            info!("NATS connection closed");
        }
    }
}

async fn read_loop(mut reader: BufReader<OwnedReadHalf>, shared: Arc<Shared>, max_payload: usize) {
    let mut closed = shared.closed_tx.subscribe();
    loop {
        let line = tokio::select! {
            () = async {
                let _ = closed.wait_for(|closed| *closed).await;
            } => break,
            line = read_line(&mut reader) => line,
        };
        let line = match line {
            Ok(line) => line,
            Err(BusError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "NATS read failed");
                break;
            }
        };

        match parse_server_op(&line) {
            Ok(ServerOp::Msg {
                subject,
                sid,
                reply,
                size,
            }) => {
                if size > max_payload {
                    warn!(subject = %subject, size, max_payload, "NATS protocol violation: MSG exceeds max payload");
                    break;
                }
                let mut payload = vec![0u8; size + 2];
                if let Err(e) = reader.read_exact(&mut payload).await {
                    warn!(error = %e, "NATS payload read failed");
                    break;
                }
                payload.truncate(size);
                shared.dispatch(sid, Message::new(subject, reply, Bytes::from(payload)));
            }
            Ok(ServerOp::Ping) => {
                let _ = shared.send(Bytes::from_static(b"PONG\r\n"));
            }
            Ok(ServerOp::Err(msg)) => warn!(error = %msg, "NATS server reported error"),
            Ok(ServerOp::Pong) => shared.pings_out.store(0, Ordering::SeqCst),
            Ok(ServerOp::Ok | ServerOp::Info(_)) => {}
            Err(e) => {
                warn!(error = %e, "NATS protocol violation");
                break;
            }
        }
    }
    shared.close();
}

/// Client keepalive settings.
#[derive(Debug, Clone, Copy)]
struct Keepalive {
    interval: Duration,
    max_pings_out: u32,
}

async fn write_loop(
    writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    shared: Weak<Shared>,
    keepalive: Keepalive,
) {
    let mut writer = BufWriter::new(writer);
    let mut ping = tokio::time::interval_at(Instant::now() + keepalive.interval, keepalive.interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'outer: loop {
        let frame = tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = ping.tick() => {
                let Some(state) = shared.upgrade() else { break };
                let outstanding = state.pings_out.fetch_add(1, Ordering::SeqCst);
                if outstanding >= keepalive.max_pings_out {
                    warn!(outstanding, "NATS server stopped answering pings, closing connection");
                    break;
                }
                Bytes::from_static(b"PING\r\n")
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            warn!(error = %e, "NATS write failed");
            break;
        }
        while let Ok(frame) = frames.try_recv() {
            if let Err(e) = writer.write_all(&frame).await {
                warn!(error = %e, "NATS write failed");
                break 'outer;
            }
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "NATS flush failed");
            break;
        }
    }
    if let Some(shared) = shared.upgrade() {
        shared.close();
    }
}

/// Bus backed by a NATS server connection.
pub struct NatsBus {
    shared: Arc<Shared>,
    server_id: String,
    max_payload: usize,
    channel_capacity: usize,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl NatsBus {
    /// Connect and complete the protocol handshake.
    pub async fn connect(options: NatsOptions) -> Result<Self, BusError> {
        let address = server_address(&options.url)?;
        let connect_err = |reason: String| BusError::Connect {
            url: options.url.clone(),
            reason,
        };

        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| connect_err("connect timed out".into()))?
            .map_err(|e| connect_err(e.to_string()))?;
        stream.set_nodelay(true)?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let server = tokio::time::timeout(
            options.connect_timeout,
            handshake(&mut reader, &mut write_half, &options.name),
        )
        .await
        .map_err(|_| connect_err("handshake timed out".into()))??;

        let (frames, frame_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            subs: RwLock::new(HashMap::new()),
            frames,
            next_sid: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            closed_tx: watch::Sender::new(false),
            pings_out: AtomicU32::new(0),
        });
        let keepalive = Keepalive {
            interval: options.ping_interval.max(Duration::from_millis(1)),
            max_pings_out: options.max_pings_out,
        };

        let reader = tokio::spawn(read_loop(reader, Arc::clone(&shared), server.max_payload));
        let writer = tokio::spawn(write_loop(
            write_half,
            frame_rx,
            Arc::downgrade(&shared),
            keepalive,
        ));

        info!(
            url = %options.url,
            server_id = %server.server_id,
            max_payload = server.max_payload,
            "Connected to NATS"
        );

        Ok(Self {
            shared,
            server_id: server.server_id,
            max_payload: server.max_payload,
            channel_capacity: options.channel_capacity.max(1),
            reader,
            writer,
        })
    }

    /// Server id from the `INFO` greeting.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Largest payload the server accepts.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Whether the connection has been lost.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn register(&self, subject: &str, group: Option<&str>) -> Result<Subscription, BusError> {
        validate_subscribe_subject(subject)?;
        if let Some(group) = group {
            validate_queue_group(group)?;
        }
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let sid = self.shared.next_sid.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        self.shared.subs.write().insert(sid, sender);
        if let Err(e) = self.shared.send(sub_frame(subject, group, sid)) {
            self.shared.subs.write().remove(&sid);
            return Err(e);
        }
        debug!(sid, subject, group = ?group, "NATS subscription registered");

        let weak = Arc::downgrade(&self.shared);
        Ok(Subscription::new(
            sid,
            subject,
            group.map(str::to_string),
            receiver,
            move |sid| {
                if let Some(shared) = weak.upgrade() {
                    shared.subs.write().remove(&sid);
                    let _ = shared.send(unsub_frame(sid));
                }
            },
        ))
    }
}

impl Drop for NatsBus {
    fn drop(&mut self) {
        self.shared.close();
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait]
impl Publisher for NatsBus {
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), BusError> {
        validate_publish_subject(subject)?;
        if let Some(reply) = reply {
            validate_publish_subject(reply)?;
        }
        if payload.len() > self.max_payload {
            return Err(BusError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        self.shared.send(pub_frame(subject, reply, &payload))
    }
}

#[async_trait]
impl Subscriber for NatsBus {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        self.register(subject, None)
    }

    async fn queue_subscribe(&self, subject: &str, group: &str) -> Result<Subscription, BusError> {
        self.register(subject, Some(group))
    }
}
