//! Block-hash feed port (SPEC_FULL.md §6): a subscription to a ZMQ-style
//! publisher delivering new-block-hash notifications, with the inter-block
//! interval derived from adjacent notifications (§4.3).

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use bitcoin::BlockHash;

/// What the feed's background thread hands back to the app loop.
pub enum BlockEvent {
    /// The subscription (re)connected successfully; purely for observability.
    Open,
    /// A new block hash, together with the inter-block interval since the
    /// previous one (`None` for the very first block seen this process).
    Block(BlockHash, Option<Duration>),
}

/// A running block-hash subscription. Dropping the sender side (by dropping
/// this handle) lets the background thread notice on its next send and exit.
pub struct BlockHashFeed {
    rx: mpsc::Receiver<BlockEvent>,
    _worker: thread::JoinHandle<()>,
}

impl BlockHashFeed {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BlockEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(feature = "zmq-feed")]
mod zmq_feed {
    use super::*;

    const MAX_RECONNECT_ATTEMPTS: u32 = 10;
    const RECONNECT_BACKOFF: Duration = Duration::from_secs(20);

    impl BlockHashFeed {
        pub fn start(url: String) -> Self {
            let (tx, rx) = mpsc::channel();
            let worker = thread::spawn(move || run(url, tx));
            BlockHashFeed { rx, _worker: worker }
        }
    }

    fn run(url: String, tx: mpsc::Sender<BlockEvent>) {
        let mut attempt = 0u32;
        let mut last_block_at: Option<Instant> = None;

        loop {
            match subscribe_once(&url, &tx, &mut last_block_at) {
                Ok(()) => return, // receiver dropped, shut down cleanly
                Err(e) => {
                    attempt += 1;
                    warn!(
                        "block-hash feed error (attempt {}/{}): {:#}",
                        attempt, MAX_RECONNECT_ATTEMPTS, e
                    );
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        error!("block-hash feed exhausted reconnection attempts, giving up");
                        return;
                    }
                }
            }
            thread::sleep(RECONNECT_BACKOFF);
        }
    }

    fn subscribe_once(
        url: &str,
        tx: &mpsc::Sender<BlockEvent>,
        last_block_at: &mut Option<Instant>,
    ) -> crate::error::Result<()> {
        use crate::error::OptionExt;
        use bitcoin::hashes::Hash;

        let ctx = zmq::Context::new();
        let socket = ctx.socket(zmq::SUB)?;
        socket.connect(url)?;
        socket.set_subscribe(b"hashblock")?;

        if tx.send(BlockEvent::Open).is_err() {
            return Ok(());
        }
        info!("block-hash feed connected to {}", url);

        loop {
            let parts = socket.recv_multipart(0)?;
            let hash_bytes = parts.get(1).or_err("malformed zmq hashblock message")?;
            let hash = BlockHash::from_slice(hash_bytes)?;

            let now = Instant::now();
            let ibi = last_block_at.map(|prev| now.saturating_duration_since(prev));
            *last_block_at = Some(now);

            if tx.send(BlockEvent::Block(hash, ibi)).is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(not(feature = "zmq-feed"))]
impl BlockHashFeed {
    /// Without the `zmq-feed` feature there is no block-hash subscription;
    /// the app loop falls back to polling the mempool on `time_res` alone.
    pub fn start(_url: String) -> Self {
        let (_tx, rx) = mpsc::channel();
        let worker = thread::spawn(|| {});
        BlockHashFeed { rx, _worker: worker }
    }
}
