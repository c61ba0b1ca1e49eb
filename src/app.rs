use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use bitcoincore_rpc::Client as RpcClient;

use crate::blockfeed::{BlockEvent, BlockHashFeed};
use crate::config::Config;
use crate::error::Result;
use crate::estimator::Estimator;
#[cfg(feature = "pubsub")]
use crate::pubsub::HttpPublisher;
use crate::pubsub::{NullPublisher, Publisher};
use crate::rpc::MempoolRpc;

/// Backoff applied by the supervisor loop after a transport (RPC/pub-sub) or
/// subscription error, per SPEC_FULL.md §7.
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(20);

/// Assembles the external ports (RPC client, ZMQ feed, publisher) and drives
/// the estimation DAG from a single-threaded sync loop, mirroring the
/// teacher's `App::boot`/`App::sync` (src/app.rs) — substituting "pipeline
/// registry + pub/sub publisher" for "indexer + electrum/http/webhook sinks".
pub struct App {
    config: Config,
    rpc: Arc<RpcClient>,
    feed: BlockHashFeed,
    publisher: Box<dyn Publisher>,
    estimator: Estimator,
    running: Arc<AtomicBool>,
    last_skipped: u64,
}

impl App {
    pub fn boot(config: Config) -> Result<Self> {
        info!("{:?}", config);

        let rpc = Arc::new(RpcClient::new(config.rpc_url(), config.rpc_auth()?)?);
        let feed = BlockHashFeed::start(config.zmq_url.clone());

        #[cfg(feature = "pubsub")]
        let publisher: Box<dyn Publisher> = match &config.wamp_url {
            Some(url) => Box::new(HttpPublisher::start(url.clone(), config.wamp_realm.clone())),
            None => {
                warn!("no wamp.url configured, recommendations will only be logged");
                Box::new(NullPublisher)
            }
        };
        #[cfg(not(feature = "pubsub"))]
        let publisher: Box<dyn Publisher> = {
            if config.wamp_url.is_some() {
                warn!("wamp.url configured but built without the `pubsub` feature; recommendations will only be logged");
            }
            Box::new(NullPublisher)
        };

        let mut estimator = Estimator::new(&config.constants());

        // An initial blocking poll so the first snapshot exists before the
        // loop starts, same as the teacher's initial `indexer.sync(false)`.
        let (raw, skipped) = rpc.get_raw_mempool()?;
        if skipped > 0 {
            debug!("skipped {} malformed mempool entries on initial poll", skipped);
        }
        estimator.tick(&raw, Instant::now(), config.min_savings_rate);

        Ok(App {
            config,
            rpc,
            feed,
            publisher,
            estimator,
            running: Arc::new(AtomicBool::new(true)),
            last_skipped: skipped,
        })
    }

    /// A shared flag the caller can clear (e.g. from a signal handler) to
    /// stop the loop after its current iteration.
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Runs the sync loop until `running_handle()` is cleared. Transport and
    /// subscription errors are logged and retried after `RETRY_BACKOFF`
    /// rather than propagated out — no error here is user-facing (§7).
    pub fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.tick() {
                error!("fee estimation loop error: {}", crate::error::fmt_error_chain(&e));
                thread::sleep(RETRY_BACKOFF);
            }
        }
        info!("shutting down");
    }

    fn tick(&mut self) -> Result<()> {
        match self.feed.recv_timeout(self.config.time_res) {
            Some(BlockEvent::Open) => info!("block-hash feed connected"),
            Some(BlockEvent::Block(hash, ibi)) => {
                debug!("new block {}", hash);
                if let Some(ibi) = ibi {
                    self.estimator.observe_ibi(ibi);
                }
            }
            None => (),
        }

        let (raw, skipped) = self.rpc.get_raw_mempool()?;
        if skipped > 0 {
            debug!("skipped {} malformed mempool entries", skipped);
        }

        let update = self
            .estimator
            .tick(&raw, Instant::now(), self.config.min_savings_rate);

        if let Some(summary) = &update.mined_summary {
            self.publisher.publish_mined_summary(summary);
        }
        if !update.fee_diff.is_empty() {
            self.publisher.publish_fee_diff(&update.fee_diff);
        }
        if !update.recommendations.is_empty() {
            self.publisher.publish_recommendations(&update.recommendations);
        }

        let skipped_total = self.estimator.skipped_entries();
        if skipped_total > self.last_skipped {
            debug!(
                "{} mempool entries skipped so far (non-finite fee rate or zero size)",
                skipped_total
            );
            self.last_skipped = skipped_total;
        }

        Ok(())
    }
}
