//! One accepted TCP connection.
//!
//! A [`Connection`] owns a reader task and a writer task. The reader splits
//! the inbound byte stream into frames with [`PacketCodec`], drops frames
//! whose checksum does not match (answering with
//! [`ResultCode::ErrChecksum`]) and hands every other frame to the
//! [`Dispatcher`] as a [`Request`]. The writer drains a capacity-one outbound
//! queue onto the socket, so [`Connection::send_context`] waits until the
//! writer has taken the previous frame. A slow peer therefore stalls senders
//! on its own connection only.
//!
//! [`Connection::stop`] is idempotent. The first call runs the stop hook,
//! cancels both tasks (dropping the socket halves closes the socket) and
//! removes the connection from the registry. Any read or write failure calls
//! it.

mod properties;
mod state;

use std::{net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use futures::{FutureExt, StreamExt};
use log::{debug, error, warn};
pub use properties::{PropertyError, PropertyStore, PropertyValue};
pub use state::ConnectionState;
use state::{AtomicState, StartGate};
use thiserror::Error;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc,
};
use tokio_util::{codec::FramedRead, sync::CancellationToken, task::TaskTracker};

use crate::{
    codec::{FramingError, PacketCodec},
    context::{Context, ContextError, ResultCode},
    dispatch::Dispatcher,
    hooks::LifecycleHooks,
    message::Message,
    metrics::{self, Direction},
    pool::Pool,
    registry::{ConnectionId, ConnectionRegistry},
    request::Request,
};

/// Capacity of the per-connection outbound queue.
pub const OUTBOUND_CAPACITY: usize = 1;

/// Errors returned when sending on a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection has been stopped.
    #[error("connection closed: {0}")]
    Closed(ConnectionId),
    /// The context could not be encoded, or the request had no context.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// The encoded frame was rejected by the codec.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] FramingError),
}

/// Server-wide collaborators shared by every connection.
pub(crate) struct ConnectionEnv {
    pub(crate) codec: PacketCodec,
    pub(crate) buffers: Pool<BytesMut>,
    pub(crate) replies: Pool<Context>,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) tracker: TaskTracker,
}

impl ConnectionEnv {
    pub(crate) fn new(
        codec: PacketCodec,
        hooks: LifecycleHooks,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Dispatcher,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            codec,
            buffers: Pool::default(),
            replies: Pool::default(),
            hooks,
            registry,
            dispatcher,
            tracker,
        }
    }
}

/// A live client connection.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: AtomicState,
    start_gate: StartGate,
    outbound: mpsc::Sender<BytesMut>,
    shutdown: CancellationToken,
    properties: PropertyStore,
    env: Arc<ConnectionEnv>,
}

impl Connection {
    /// Register a connection for `stream` and spawn its reader and writer.
    pub(crate) fn start(
        stream: TcpStream,
        peer_addr: SocketAddr,
        id: ConnectionId,
        env: &Arc<ConnectionEnv>,
    ) -> Arc<Self> {
        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let conn = Arc::new(Self {
            id,
            peer_addr,
            state: AtomicState::new(),
            start_gate: StartGate::new(),
            outbound,
            shutdown: CancellationToken::new(),
            properties: PropertyStore::default(),
            env: Arc::clone(env),
        });

        env.registry.add(Arc::clone(&conn));
        conn.state.mark_started();
        metrics::inc_connections();
        debug!("connection started: conn_id={id}, peer_addr={peer_addr}");

        spawn_task(
            &conn,
            "writer",
            write_loop(Arc::clone(&conn), writer, outbound_rx),
        );
        spawn_task(&conn, "reader", read_loop(Arc::clone(&conn), reader));
        conn
    }

    /// Identifier assigned by the server.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Address of the remote peer.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer_addr }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.state.get() }

    /// Return `true` once [`Connection::stop`] has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.state.get() == ConnectionState::Stopped }

    /// Tear the connection down. Only the first call has any effect.
    ///
    /// Sends fail as soon as this is called. If the start hook is still
    /// running, the stop hook and the rest of teardown run when it returns;
    /// if the start hook has not begun, it never runs.
    pub async fn stop(self: &Arc<Self>) {
        if !self.state.mark_stopped() {
            return;
        }
        if !self.start_gate.stop() {
            debug!("connection stop deferred to start hook: conn_id={}", self.id);
            return;
        }
        self.teardown().await;
    }

    async fn teardown(self: &Arc<Self>) {
        debug!("connection stopping: conn_id={}", self.id);
        self.env.hooks.run_stop(Arc::clone(self)).await;
        self.shutdown.cancel();
        self.env.registry.remove(self.id);
        metrics::dec_connections();
    }

    /// Send `ctx` to the peer.
    ///
    /// Waits until the writer accepts the frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection is stopped,
    /// [`ConnectionError::Context`] if `ctx` cannot be encoded and
    /// [`ConnectionError::Encode`] if the frame exceeds the maximum package
    /// size.
    pub async fn send_context(&self, ctx: &Context) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.id));
        }
        let msg = Message::from_context(ctx)?;
        let mut buf = self.env.buffers.acquire();
        if let Err(e) = self.env.codec.encode_into(&msg, &mut buf) {
            self.env.buffers.release(buf);
            return Err(e.into());
        }
        self.outbound.send(buf).await.map_err(|mpsc::error::SendError(buf)| {
            self.env.buffers.release(buf);
            ConnectionError::Closed(self.id)
        })
    }

    /// Send `data` addressed to `service_id` / `method_id`.
    ///
    /// # Errors
    ///
    /// See [`Connection::send_context`].
    pub async fn send(
        &self,
        service_id: u32,
        method_id: u32,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), ConnectionError> {
        self.send_context(&Context::new(service_id, method_id).with_data(data.into()))
            .await
    }

    /// Send a context carrying only `code`.
    ///
    /// # Errors
    ///
    /// See [`Connection::send_context`].
    pub async fn send_error_code(&self, code: ResultCode) -> Result<(), ConnectionError> {
        let mut ctx = self.env.replies.acquire();
        ctx.result = code;
        let sent = self.send_context(&ctx).await;
        self.env.replies.release(ctx);
        sent
    }

    /// Property store of this connection.
    #[must_use]
    pub fn properties(&self) -> &PropertyStore { &self.properties }

    /// Store a property.
    pub fn set_property<T: std::any::Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.properties.set(key, value);
    }

    /// Read a property as a `T`.
    ///
    /// # Errors
    ///
    /// See [`PropertyStore::get`].
    pub fn get_property<T: std::any::Any + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Arc<T>, PropertyError> {
        self.properties.get(key)
    }

    /// Remove a property, returning the stored value.
    pub fn remove_property(&self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    /// Handle one decoded frame. Returns `false` when the reader must stop.
    async fn accept_frame(self: &Arc<Self>, msg: Message) -> bool {
        metrics::inc_frames(Direction::Inbound);
        if let Err(e) = msg.verify_checksum() {
            warn!("dropping frame: conn_id={}, error={e}", self.id);
            metrics::inc_errors();
            let conn = Arc::clone(self);
            self.env.tracker.spawn(async move {
                if let Err(e) = conn.send_error_code(ResultCode::ErrChecksum).await {
                    debug!("checksum reply not sent: conn_id={}, error={e}", conn.id);
                }
            });
            return true;
        }
        if msg.is_empty() {
            debug!("skipping empty frame: conn_id={}", self.id);
            return true;
        }
        match self
            .env
            .dispatcher
            .submit(Request::new(Arc::clone(self), msg))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("request not dispatched: conn_id={}, error={e}", self.id);
                false
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Spawn a connection task, logging any panic and stopping the connection.
fn spawn_task<F>(conn: &Arc<Connection>, role: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let conn = Arc::clone(conn);
    let tracker = conn.env.tracker.clone();
    tracker.spawn(async move {
        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            let panic_msg = crate::panic::format_panic(panic);
            let conn_id = conn.id;
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: task={role}, conn_id={conn_id}, panic={panic_msg}");
            tracing::error!(task = role, %conn_id, panic = %panic_msg, "connection task panicked");
            conn.stop().await;
        }
    });
}

async fn read_loop(conn: Arc<Connection>, reader: OwnedReadHalf) {
    if !conn.start_gate.begin() {
        return;
    }
    let started = std::panic::AssertUnwindSafe(conn.env.hooks.run_start(Arc::clone(&conn)))
        .catch_unwind()
        .await;
    let stop_owed = conn.start_gate.finish();
    if let Err(panic) = &started {
        let panic_msg = crate::panic::panic_text(panic.as_ref());
        error!("start hook panicked: conn_id={}, panic={panic_msg}", conn.id);
    }
    if stop_owed {
        conn.teardown().await;
        return;
    }
    if started.is_err() {
        conn.stop().await;
        return;
    }
    let mut frames = FramedRead::new(reader, conn.env.codec);
    loop {
        let next = select! {
            biased;

            () = conn.shutdown.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            None => {
                debug!("peer closed connection: conn_id={}", conn.id);
                break;
            }
            Some(Err(e)) => {
                warn!("read failed: conn_id={}, error={e}", conn.id);
                metrics::inc_errors();
                break;
            }
            Some(Ok(msg)) => {
                if !conn.accept_frame(msg).await {
                    break;
                }
            }
        }
    }
    conn.stop().await;
}

async fn write_loop(
    conn: Arc<Connection>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<BytesMut>,
) {
    loop {
        let buf = select! {
            biased;

            () = conn.shutdown.cancelled() => break,
            next = outbound.recv() => match next {
                Some(buf) => buf,
                None => break,
            },
        };
        let written = select! {
            biased;

            () = conn.shutdown.cancelled() => break,
            res = writer.write_all(&buf) => res,
        };
        conn.env.buffers.release(buf);
        if let Err(e) = written {
            warn!("write failed: conn_id={}, error={e}", conn.id);
            metrics::inc_errors();
            break;
        }
        metrics::inc_frames(Direction::Outbound);
    }
    conn.stop().await;
}
