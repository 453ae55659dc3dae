//! Inbound request handed to a [`Router`](crate::router::Router).
//!
//! A [`Request`] pairs the originating [`Connection`] with the decoded
//! [`Message`]. It is moved from the reader task into exactly one worker, so
//! nothing else observes it while the handler chain runs. The context inside
//! the payload is parsed at most once, on first access.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    connection::{Connection, ConnectionError},
    context::{Context, ContextError},
    message::Message,
};

/// A decoded frame together with the connection it arrived on.
#[derive(Debug)]
pub struct Request {
    conn: Arc<Connection>,
    msg: Message,
}

impl Request {
    /// Pair `msg` with the connection it was read from.
    #[must_use]
    pub fn new(conn: Arc<Connection>, msg: Message) -> Self { Self { conn, msg } }

    /// Connection the request arrived on.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> { &self.conn }

    /// Underlying frame.
    #[must_use]
    pub fn message(&self) -> &Message { &self.msg }

    /// Raw frame payload.
    #[must_use]
    pub fn data(&self) -> &Bytes { self.msg.data() }

    /// Structured context carried by the payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the payload is not a context.
    pub fn context(&self) -> Result<&Context, ContextError> { self.msg.context() }

    /// Service id of the request.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the payload is not a context.
    pub fn service_id(&self) -> Result<u32, ContextError> { self.msg.service_id() }

    /// Method id of the request.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the payload is not a context.
    pub fn method_id(&self) -> Result<u32, ContextError> { self.msg.method_id() }

    /// Send `data` back to the peer, echoing the request's service, method
    /// and session ids.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Context`] if the request has no valid
    /// context, or any error from [`Connection::send_context`].
    pub async fn reply(&self, data: impl Into<Vec<u8>>) -> Result<(), ConnectionError> {
        let reply = self.msg.context()?.reply(data.into());
        self.conn.send_context(&reply).await
    }
}
