//! Pub/sub egress port (SPEC_FULL.md §6): three named topics recommendations
//! and mined-block summaries are published to. The teacher's `WebHookNotifier`
//! (src/webhooks.rs) is the closest analogue in the pack — a background
//! thread draining an mpsc channel into blocking `reqwest` POSTs — generalized
//! here from "one URL per webhook" to "one base URL + realm, three topics".
//!
//! `wamp.url`/`wamp.realm` name a WAMP pub/sub endpoint in the distilled spec;
//! this crate does not pull in a WAMP client (none of the pack's dependency
//! stacks carry one) and instead POSTs each topic's payload as JSON to
//! `<wamp_url>/<wamp_realm>/<topic>`, which preserves the three-topic,
//! last-value-wins publication contract (§6, §7) without inventing a
//! dependency. See DESIGN.md.
//!
//! `HttpPublisher` depends on `reqwest` and is only compiled with the
//! `pubsub` feature, mirroring how the teacher gates its own
//! `reqwest`-backed `WebHookNotifier` behind its `webhooks` feature
//! (`#[cfg(feature = "webhooks")]` in the teacher's `app.rs`). `Publisher`
//! and `NullPublisher` carry no such dependency and are always compiled.

use crate::types::{FeeDiffEntry, MinedSummary, Recommendation};

/// What the estimator hands to the publisher after a tick.
pub trait Publisher: Send {
    fn publish_mined_summary(&self, summary: &MinedSummary);
    fn publish_fee_diff(&self, entries: &[FeeDiffEntry]);
    fn publish_recommendations(&self, entries: &[Recommendation]);
}

#[cfg(feature = "pubsub")]
mod http {
    use std::sync::mpsc;
    use std::thread;

    use reqwest::blocking as reqwest;
    use serde_json::Value;

    use super::Publisher;
    use crate::types::{FeeDiffEntry, MinedSummary, Recommendation};

    const TOPIC_MINED_SUMMARY: &str = "com.fee.minedtxssummary";
    const TOPIC_FEE_DIFF: &str = "com.fee.feediff";
    const TOPIC_MIN_DIFF: &str = "com.fee.mindiff";

    struct Message {
        topic: &'static str,
        body: Value,
    }

    /// Publishes over HTTP on a background thread, mirroring the teacher's
    /// webhook notifier: publication never blocks the estimation loop, and a
    /// failed POST is logged and dropped rather than retried (publication is
    /// best-effort and idempotent-on-replace, SPEC_FULL.md §7).
    pub struct HttpPublisher {
        tx: mpsc::Sender<Message>,
        _worker: thread::JoinHandle<()>,
    }

    impl HttpPublisher {
        pub fn start(base_url: String, realm: String) -> Self {
            let (tx, rx) = mpsc::channel::<Message>();

            let worker = thread::spawn(move || {
                let client = reqwest::Client::new();
                while let Ok(msg) = rx.recv() {
                    let url = format!("{}/{}/{}", base_url.trim_end_matches('/'), realm, msg.topic);
                    debug!("publishing to {}", url);
                    match client.post(&url).json(&msg.body).send() {
                        Ok(resp) => debug!("publish to {} succeeded: {:#?}", msg.topic, resp.status()),
                        Err(e) => warn!("publish to {} failed: {:#}", msg.topic, e),
                    }
                }
            });

            HttpPublisher { tx, _worker: worker }
        }

        fn send(&self, topic: &'static str, body: Value) {
            self.tx.send(Message { topic, body }).ok();
        }
    }

    impl Publisher for HttpPublisher {
        fn publish_mined_summary(&self, summary: &MinedSummary) {
            self.send(
                TOPIC_MINED_SUMMARY,
                serde_json::to_value(summary).expect("MinedSummary always serializes"),
            );
        }

        fn publish_fee_diff(&self, entries: &[FeeDiffEntry]) {
            self.send(
                TOPIC_FEE_DIFF,
                serde_json::to_value(entries).expect("FeeDiffEntry always serializes"),
            );
        }

        fn publish_recommendations(&self, entries: &[Recommendation]) {
            self.send(
                TOPIC_MIN_DIFF,
                serde_json::to_value(entries).expect("Recommendation always serializes"),
            );
        }
    }
}

#[cfg(feature = "pubsub")]
pub use http::HttpPublisher;

/// Used when no `wamp.url` is configured: logs what would have been
/// published at debug level instead of sending it anywhere.
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish_mined_summary(&self, summary: &MinedSummary) {
        debug!("(no publisher configured) mined summary: {} txs", summary.txs);
    }

    fn publish_fee_diff(&self, entries: &[FeeDiffEntry]) {
        debug!("(no publisher configured) fee diff: {} entries", entries.len());
    }

    fn publish_recommendations(&self, entries: &[Recommendation]) {
        debug!(
            "(no publisher configured) recommendations: {} entries",
            entries.len()
        );
    }
}
