//! Minimal client for the checksummed frame protocol.
//!
//! [`Client`] writes frames with [`PacketCodec`] and reads replies with the
//! two-phase [`read_frame`]. It is the reference peer for the server and is
//! used by the integration tests.

use std::net::SocketAddr;

use bytes::BytesMut;
use thiserror::Error;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{
    codec::{CodecError, FramingError, PacketCodec, read_frame},
    context::{Context, ContextError},
    message::Message,
};

/// Errors raised by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket I/O failed.
    #[error("client I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A reply frame could not be read.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A frame was oversized or failed its checksum.
    #[error("invalid frame: {0}")]
    Framing(#[from] FramingError),
    /// A context could not be encoded or decoded.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Connected client.
///
/// # Examples
///
/// ```no_run
/// use wirepool::client::Client;
///
/// # async fn demo() -> Result<(), wirepool::client::ClientError> {
/// let mut client = Client::connect("127.0.0.1:9999", 4096).await?;
/// client.send(1, 1, b"ada".to_vec()).await?;
/// if let Some(reply) = client.recv_context().await? {
///     println!("{}", String::from_utf8_lossy(&reply.data));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    codec: PacketCodec,
    buf: BytesMut,
}

impl Client {
    /// Connect to `addr`, accepting replies up to `max_package_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs, max_package_size: usize) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            codec: PacketCodec::new(max_package_size),
            buf: BytesMut::new(),
        })
    }

    /// Local address of the socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> { Ok(self.writer.local_addr()?) }

    /// Send `data` addressed to `service_id` / `method_id`.
    ///
    /// # Errors
    ///
    /// See [`Client::send_context`].
    pub async fn send(
        &mut self,
        service_id: u32,
        method_id: u32,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), ClientError> {
        self.send_context(&Context::new(service_id, method_id).with_data(data.into()))
            .await
    }

    /// Encode and send `ctx` as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Context`] or [`ClientError::Framing`] if the
    /// frame cannot be built, and [`ClientError::Io`] if the write fails.
    pub async fn send_context(&mut self, ctx: &Context) -> Result<(), ClientError> {
        let msg = Message::from_context(ctx)?;
        self.send_message(&msg).await
    }

    /// Send a pre-built message exactly as its header describes it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Framing`] if the payload is oversized and
    /// [`ClientError::Io`] if the write fails.
    pub async fn send_message(&mut self, msg: &Message) -> Result<(), ClientError> {
        self.buf.clear();
        self.codec.encode_into(msg, &mut self.buf)?;
        self.writer.write_all(&self.buf).await?;
        Ok(())
    }

    /// Write raw bytes to the socket in one call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Receive the next frame, or `None` once the server closes the socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Codec`] if the stream ends mid-frame or a frame
    /// is oversized, and [`ClientError::Framing`] if its checksum is wrong.
    pub async fn recv(&mut self) -> Result<Option<Message>, ClientError> {
        let Some(msg) = read_frame(&mut self.reader, &self.codec).await? else {
            return Ok(None);
        };
        msg.verify_checksum()?;
        Ok(Some(msg))
    }

    /// Receive the next frame and decode its context.
    ///
    /// # Errors
    ///
    /// As [`Client::recv`], plus [`ClientError::Context`] if the payload is
    /// not a context.
    pub async fn recv_context(&mut self) -> Result<Option<Context>, ClientError> {
        match self.recv().await? {
            Some(msg) => Ok(Some(Context::from_bytes(msg.data())?)),
            None => Ok(None),
        }
    }

    /// Close the write half, signalling end of stream to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
