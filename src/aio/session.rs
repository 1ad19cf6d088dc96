//! The pipelining session: one TCP connection multiplexed between any
//! number of concurrent callers.
//!
//! RESP has no request ids; the server answers requests in the order their
//! bytes arrived. Correct routing therefore hinges on one rule: a batch is
//! appended to the pending FIFO *before* its bytes are written, and only
//! the writer appends while only the reader pops. The FIFO head then always
//! owns the next frame to arrive.
//!
//! A submission is a *batch*: one command expecting one reply, or a whole
//! pipeline expecting N. Batches complete atomically — callers never see a
//! partial pipeline.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::buffer::RingBuffer;
use crate::cmd::{pack_command, Cmd};
use crate::connection::{
    check_setup_reply, connection_setup_commands, ConnectionAddr, ConnectionInfo,
    DEFAULT_RECV_BUFFER_SIZE,
};
use crate::errors::{ErrorKind, RedisError};
use crate::io::tcp::{apply_settings_async, TcpSettings};
use crate::parser;
use crate::pipeline::Pipeline;
use crate::types::{ProtocolVersion, PushInfo, PushKind, RedisResult, Value};

/// In-flight request submissions the channel buffers before `execute`
/// callers start waiting for space.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Preferred size of a single socket read.
const READ_CHUNK: usize = 4096;

/// Configuration for a [`Session`].
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// Deadline applied to every request once it has been submitted. The
    /// request itself stays live on the connection; only the caller stops
    /// observing it.
    pub response_timeout: Option<Duration>,
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Initial size of the receive staging buffer.
    pub recv_buffer_size: usize,
    /// Sink for RESP3 server-initiated pushes. Without one, pushes are
    /// dropped.
    pub push_sender: Option<mpsc::UnboundedSender<PushInfo>>,
    /// Socket options applied after connecting.
    pub tcp_settings: TcpSettings,
}

impl SessionConfig {
    /// Configuration with library defaults: no deadlines, 4 KiB receive
    /// buffer, no push sink.
    pub fn new() -> SessionConfig {
        SessionConfig::default()
    }
}

type Completer = oneshot::Sender<RedisResult<Vec<Value>>>;

/// One submission travelling from a caller to the writer task.
struct SessionRequest {
    input: Vec<u8>,
    expected_replies: usize,
    completer: Completer,
}

/// One entry of the pending FIFO: a batch the writer has (or is about to
/// have) put on the wire, waiting for `remaining` more replies.
struct PendingBatch {
    remaining: usize,
    collected: Vec<Value>,
    completer: Option<Completer>,
}

struct SessionShared {
    pending: Mutex<VecDeque<PendingBatch>>,
    closed: AtomicBool,
    // One shutdown signal per I/O task. `notify_one` stores a permit, so
    // the wakeup survives even when the task has not parked yet.
    writer_shutdown: Notify,
    reader_shutdown: Notify,
}

impl SessionShared {
    fn pending(&self) -> MutexGuard<'_, VecDeque<PendingBatch>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flips the session to closed and wakes both I/O tasks. Idempotent.
    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("session closed");
        }
        self.writer_shutdown.notify_one();
        self.reader_shutdown.notify_one();
    }

    /// Appends a batch; the caller must not have written its bytes yet.
    fn push_batch(&self, expected_replies: usize, completer: Completer) {
        self.pending().push_back(PendingBatch {
            remaining: expected_replies,
            collected: Vec::with_capacity(expected_replies),
            completer: Some(completer),
        });
    }

    /// Routes one arrived reply to the FIFO head, completing the head
    /// batch when its last reply lands.
    fn route_reply(&self, value: Value) -> RedisResult<()> {
        let mut pending = self.pending();
        let head = match pending.front_mut() {
            Some(head) => head,
            None => fail!((
                ErrorKind::Internal,
                "Server sent a reply with no request pending"
            )),
        };
        head.collected.push(value);
        head.remaining -= 1;
        if head.remaining == 0 {
            if let Some(mut batch) = pending.pop_front() {
                drop(pending);
                if let Some(completer) = batch.completer.take() {
                    // A failed send means the caller timed out or went
                    // away; the reply is discarded but the FIFO stayed
                    // aligned, which is what matters.
                    let _ = completer.send(Ok(batch.collected));
                }
            }
        }
        Ok(())
    }

    /// Fails the head batch only. Used for fatal parse errors, which are
    /// attributed to the request whose reply broke framing.
    fn fail_head(&self, err: RedisError) {
        let head = self.pending().pop_front();
        if let Some(mut batch) = head {
            if let Some(completer) = batch.completer.take() {
                let _ = completer.send(Err(err));
            }
        }
    }

    /// Drains every pending batch with clones of `err`.
    fn fail_all(&self, err: RedisError) {
        let batches: Vec<PendingBatch> = self.pending().drain(..).collect();
        for mut batch in batches {
            if let Some(completer) = batch.completer.take() {
                let _ = completer.send(Err(err.clone()));
            }
        }
    }
}

fn send_push(push_sender: &Option<mpsc::UnboundedSender<PushInfo>>, info: PushInfo) {
    match push_sender {
        Some(sender) => {
            let _ = sender.send(info);
        }
        None => log::debug!("dropping push {:?} (no push sink registered)", info.kind),
    }
}

/// The writer half: pulls requests off the channel, appends their batch to
/// the pending FIFO, then writes their bytes. Short writes are handled by
/// `write_all`. Never touches the ring buffer.
async fn writer_task<W>(
    mut sock: W,
    mut receiver: mpsc::Receiver<SessionRequest>,
    shared: Arc<SessionShared>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        if shared.is_closed() {
            break;
        }
        let request = tokio::select! {
            biased;
            _ = shared.writer_shutdown.notified() => break,
            request = receiver.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        // FIFO entry first, bytes second; the reader may only ever see a
        // reply whose batch is already enqueued.
        shared.push_batch(request.expected_replies, request.completer);
        if let Err(err) = sock.write_all(&request.input).await {
            log::warn!("session write failed: {err}");
            shared.fail_all(RedisError::from(err));
            break;
        }
    }
    shared.mark_closed();
    // A batch pushed after the reader already tore down would otherwise
    // never complete; draining here is idempotent with the reader's drain.
    shared.fail_all(RedisError::closed());
    // Requests still queued behind the close never reached the wire.
    receiver.close();
    while let Ok(request) = receiver.try_recv() {
        let _ = request.completer.send(Err(RedisError::closed()));
    }
    let _ = sock.shutdown().await;
}

/// The reader half: reads into the ring buffer, drains complete frames,
/// routes pushes to the push sink and replies to the FIFO head. Owns the
/// ring buffer exclusively.
async fn reader_task<R>(
    mut sock: R,
    mut buf: RingBuffer,
    shared: Arc<SessionShared>,
    push_sender: Option<mpsc::UnboundedSender<PushInfo>>,
) where
    R: AsyncRead + Unpin,
{
    let teardown_err = 'io: loop {
        if shared.is_closed() {
            break RedisError::closed();
        }
        let span = match buf.writable(READ_CHUNK) {
            Ok(span) => span,
            Err(err) => {
                // Ring buffer hit the safety cap: the frame under
                // construction can never complete.
                shared.fail_head(err);
                break RedisError::closed();
            }
        };
        let read = tokio::select! {
            biased;
            _ = shared.reader_shutdown.notified() => break RedisError::closed(),
            read = sock.read(span) => read,
        };
        let n = match read {
            Ok(0) => break RedisError::closed(),
            Ok(n) => n,
            Err(err) => break RedisError::from(err),
        };
        buf.produce(n);

        loop {
            match parser::parse(buf.readable()) {
                Ok((consumed, value)) => {
                    buf.consume(consumed);
                    match value {
                        Value::Push { kind, data } => {
                            send_push(&push_sender, PushInfo { kind, data });
                        }
                        value => {
                            if let Err(err) = shared.route_reply(value) {
                                log::warn!("dropping unsolicited reply: {err}");
                                break 'io err;
                            }
                        }
                    }
                }
                Err(err) if err.is_incomplete() => break,
                Err(err) => {
                    // Framing is lost; the stream cannot be resynchronized.
                    log::warn!("session parse failed: {err}");
                    shared.fail_head(RedisError::from(err));
                    break 'io RedisError::closed();
                }
            }
        }
    };
    shared.mark_closed();
    shared.fail_all(teardown_err);
    send_push(
        &push_sender,
        PushInfo {
            kind: PushKind::Disconnection,
            data: vec![],
        },
    );
}

/// A handle to one pipelined redis connection.
///
/// The handle is cheap to clone; all clones share the connection and may
/// submit concurrently. Replies are routed back to the right caller by
/// arrival order, so no locking is visible to users.
#[derive(Clone)]
pub struct Session {
    sender: mpsc::Sender<SessionRequest>,
    shared: Arc<SessionShared>,
    db: i64,
    protocol: ProtocolVersion,
    response_timeout: Option<Duration>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("db", &self.db)
            .field("protocol", &self.protocol)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Connects to the given address and completes the whole handshake
    /// (TCP, optional HELLO/AUTH, optional SELECT) before returning.
    pub async fn connect(info: &ConnectionInfo, config: SessionConfig) -> RedisResult<Session> {
        let ConnectionAddr::Tcp(host, port) = &info.addr;
        let connect = async {
            let addrs: Vec<_> = tokio::net::lookup_host((host.as_str(), *port))
                .await
                .map_err(|err| {
                    RedisError::from((
                        ErrorKind::HostInvalid,
                        "Could not resolve host",
                        err.to_string(),
                    ))
                })?
                .collect();
            if addrs.is_empty() {
                fail!((ErrorKind::HostInvalid, "Host resolved to no addresses"));
            }
            let mut last_error = None;
            for addr in addrs {
                match TcpStream::connect(addr).await {
                    Ok(stream) => {
                        apply_settings_async(&stream, &config.tcp_settings)?;
                        return Ok(stream);
                    }
                    Err(err) => last_error = Some(err),
                }
            }
            Err(last_error
                .map(RedisError::from)
                .unwrap_or_else(|| (ErrorKind::Network, "Connect failed").into()))
        };
        let stream = match config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await??,
            None => connect.await?,
        };
        log::debug!("connected to {host}:{port}");
        Session::new_with_stream(stream, &info.redis, config).await
    }

    /// Builds a session over an already connected stream and runs the
    /// redis-level handshake on it. The I/O tasks are spawned first so the
    /// handshake itself travels the normal request path.
    pub async fn new_with_stream<S>(
        stream: S,
        info: &crate::connection::RedisConnectionInfo,
        config: SessionConfig,
    ) -> RedisResult<Session>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (sender, receiver) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let shared = Arc::new(SessionShared {
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            writer_shutdown: Notify::new(),
            reader_shutdown: Notify::new(),
        });

        let recv_buffer_size = if config.recv_buffer_size == 0 {
            DEFAULT_RECV_BUFFER_SIZE
        } else {
            config.recv_buffer_size
        };
        tokio::spawn(writer_task(write_half, receiver, Arc::clone(&shared)));
        tokio::spawn(reader_task(
            read_half,
            RingBuffer::with_capacity(recv_buffer_size),
            Arc::clone(&shared),
            config.push_sender,
        ));

        let session = Session {
            sender,
            shared,
            db: info.db,
            protocol: info.protocol,
            response_timeout: config.response_timeout,
        };
        for (cmd, step) in connection_setup_commands(info) {
            let reply = match session.execute(&cmd).await {
                Ok(reply) => reply,
                Err(err) => {
                    session.close();
                    return Err(err);
                }
            };
            if let Err(err) = check_setup_reply(step, &reply) {
                session.close();
                return Err(err);
            }
        }
        Ok(session)
    }

    /// Sends one command and returns its reply.
    ///
    /// Server error replies come back as [`Value::Error`], not `Err`.
    pub async fn execute(&self, cmd: &Cmd) -> RedisResult<Value> {
        if cmd.is_empty() {
            return Err(RedisError::make_empty_command());
        }
        let mut replies = self.request(cmd.get_packed_command(), 1).await?;
        match replies.pop() {
            Some(reply) if replies.is_empty() => Ok(reply),
            _ => fail!((ErrorKind::Internal, "Batch completed with a wrong reply count")),
        }
    }

    /// Sends raw byte-string parts as one command and returns the reply.
    pub async fn execute_parts(&self, parts: &[Vec<u8>]) -> RedisResult<Value> {
        if parts.is_empty() {
            return Err(RedisError::make_empty_command());
        }
        let mut replies = self.request(pack_command(parts), 1).await?;
        match replies.pop() {
            Some(reply) if replies.is_empty() => Ok(reply),
            _ => fail!((ErrorKind::Internal, "Batch completed with a wrong reply count")),
        }
    }

    /// Sends a pipeline as a single batch and returns its replies in
    /// sub-command order. The batch occupies one contiguous arrival slot,
    /// so other callers' replies can never interleave with it.
    pub async fn request_pipeline(&self, pipeline: &Pipeline) -> RedisResult<Vec<Value>> {
        if pipeline.is_empty() {
            return Ok(vec![]);
        }
        self.request(pipeline.get_packed_pipeline(), pipeline.len())
            .await
    }

    async fn request(&self, input: Vec<u8>, expected_replies: usize) -> RedisResult<Vec<Value>> {
        if self.is_closed() {
            return Err(RedisError::closed());
        }
        let (completer, response) = oneshot::channel();
        self.sender
            .send(SessionRequest {
                input,
                expected_replies,
                completer,
            })
            .await
            .map_err(|_| RedisError::closed())?;
        let received = match self.response_timeout {
            // A timed-out caller stops observing, but the batch entry
            // stays in the FIFO; the reader pops it when the reply does
            // arrive, keeping later callers aligned.
            Some(timeout) => tokio::time::timeout(timeout, response).await?,
            None => response.await,
        };
        received.map_err(|_| RedisError::closed())?
    }

    /// The database index selected during the handshake.
    pub fn db(&self) -> i64 {
        self.db
    }

    /// The protocol this session negotiated.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Returns true once the session is closed; all subsequent submissions
    /// fail with `ConnectionClosed`.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the session: both I/O tasks wind down, the socket is shut,
    /// and every outstanding batch fails with `ConnectionClosed`.
    /// Idempotent.
    pub fn close(&self) {
        self.shared.mark_closed();
    }
}
