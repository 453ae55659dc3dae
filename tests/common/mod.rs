//! Routers and helpers shared by the integration tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::timeout;
use wirepool::{
    client::Client,
    context::Context,
    request::Request,
    router::Router,
};

/// Service id the [`Echo`] router is registered under.
pub const ECHO_SERVICE: u32 = 1;

/// Replies with the request data unchanged.
///
/// Method 2 panics and method 3 sleeps for a second before replying.
pub struct Echo;

#[async_trait]
impl Router for Echo {
    async fn handle(&self, req: &Request) {
        let Ok(ctx) = req.context() else { return };
        match ctx.method_id {
            2 => panic!("echo asked to panic"),
            3 => tokio::time::sleep(Duration::from_secs(1)).await,
            _ => {}
        }
        let _ = req.reply(ctx.data.clone()).await;
    }
}

/// Counts the pre-, main and post-handle calls it receives.
#[derive(Clone, Default)]
pub struct Counting {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Router for Counting {
    async fn pre_handle(&self, _req: &Request) { self.calls.fetch_add(1, Ordering::SeqCst); }

    async fn handle(&self, req: &Request) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = req.reply(b"counted".to_vec()).await;
    }

    async fn post_handle(&self, _req: &Request) { self.calls.fetch_add(1, Ordering::SeqCst); }
}

/// Receive the next reply context, failing the test after one second.
pub async fn recv_reply(client: &mut Client) -> Context {
    timeout(Duration::from_secs(1), client.recv_context())
        .await
        .expect("reply in time")
        .expect("valid reply")
        .expect("connection open")
}

/// Returns `true` once the server has closed `client`'s connection.
pub async fn closed_by_server(client: &mut Client) -> bool {
    matches!(
        timeout(Duration::from_secs(1), client.recv()).await,
        Ok(Ok(None) | Err(_))
    )
}
