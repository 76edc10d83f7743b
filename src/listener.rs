//! TCP listeners for the two feeds.
//!
//! Each feed gets one accept loop and one task per accepted connection. A
//! connection is framed into newline-delimited JSON objects; every object is
//! stamped with its local arrival time as soon as it parses and handed to the
//! shared store synchronously, so the read loop waits behind the fusion it
//! triggers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use firewatch_types::Feed;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ControllerError, FusionError};
use crate::framing::{parse_object, FrameStats, LineFramer};
use crate::store::SharedStore;

const READ_CHUNK: usize = 8 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listener for one feed.
#[derive(Debug)]
pub struct StreamListener {
    feed: Feed,
    listener: TcpListener,
    store: Arc<SharedStore>,
    clock: Arc<Clock>,
    max_line: usize,
}

impl StreamListener {
    /// Bind the feed's socket and mark its server as up in the store.
    pub async fn bind(
        feed: Feed,
        addr: &str,
        store: Arc<SharedStore>,
        clock: Arc<Clock>,
        max_line: usize,
    ) -> Result<Self, ControllerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ControllerError::Bind {
                feed,
                addr: addr.to_string(),
                source,
            })?;
        store.mark_server_up(feed);

        if let Ok(local) = listener.local_addr() {
            info!(feed = %feed, addr = %local, "listening");
        }
        Ok(Self {
            feed,
            listener,
            store,
            clock,
            max_line,
        })
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Accept connections until the process exits.
    pub async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(feed = %self.feed, error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            info!(feed = %self.feed, peer = %peer, "connection accepted");

            let feed = self.feed;
            let store = self.store.clone();
            let clock = self.clock.clone();
            let max_line = self.max_line;
            tokio::spawn(async move {
                let result = handle_connection(feed, stream, max_line, &clock, |body, rx_ns| {
                    deliver(&store, feed, body, rx_ns)
                })
                .await;
                match result {
                    Ok(stats) => info!(
                        feed = %feed,
                        peer = %peer,
                        lines = stats.lines,
                        parsed = stats.parsed,
                        malformed = stats.malformed,
                        overlong = stats.overlong,
                        "connection closed"
                    ),
                    Err(e) => {
                        warn!(feed = %feed, peer = %peer, error = %e, "connection read failed")
                    }
                }
            });
        }
    }
}

/// Hand one parsed message to the store.
///
/// Evaluation errors stop here: they are logged and the trigger is skipped.
pub fn deliver(store: &SharedStore, feed: Feed, body: Map<String, Value>, rx_ns: i64) {
    match store.ingest(feed, body, rx_ns) {
        Ok(_) => {}
        Err(e @ FusionError::Decode { .. }) => {
            warn!(feed = %feed, error = %e, "skipping undecodable message");
        }
        Err(e) => warn!(feed = %feed, error = %e, "fusion evaluation failed"),
    }
}

/// Frame one connection until end-of-stream.
///
/// Malformed and overlong lines are counted and dropped; the connection
/// carries on. Returns the framing counters once the peer closes.
pub async fn handle_connection<R, F>(
    feed: Feed,
    mut reader: R,
    max_line: usize,
    clock: &Clock,
    mut on_message: F,
) -> io::Result<FrameStats>
where
    R: AsyncRead + Unpin,
    F: FnMut(Map<String, Value>, i64),
{
    let mut framer = LineFramer::new(max_line);
    let mut stats = FrameStats::default();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        for line in framer.push(&chunk[..n]) {
            stats.lines += 1;
            match parse_object(&line) {
                Some(body) => {
                    let rx_ns = clock.now_ns();
                    stats.parsed += 1;
                    on_message(body, rx_ns);
                }
                None => {
                    stats.malformed += 1;
                    debug!(feed = %feed, len = line.len(), "discarding malformed line");
                }
            }
        }
    }

    stats.overlong = framer.overlong();
    if framer.pending() > 0 {
        debug!(feed = %feed, bytes = framer.pending(), "dropping unterminated trailing line");
    }
    Ok(stats)
}
