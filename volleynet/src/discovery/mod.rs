//! Opponent discovery over a shared multicast group.
//!
//! The [`Beacon`] trait is the contract of the external multicast primitive;
//! [`DiscoveryChannel`] owns the protocol logic on top of it: idempotent
//! start/stop, self-echo and foreign-protocol filtering, and the
//! missing-credential drop rule.

use crate::error::Result;
use crate::protocol::announce::Announcement;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Multicast announce/listen primitive.
pub trait Beacon: Send + Sync {
    /// Starts periodic broadcast of the given record. Bind failures must be
    /// surfaced, not swallowed: without a beacon no session can start.
    fn start_broadcast(
        &self,
        record: &Announcement,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Stops broadcasting. Must be a no-op when not broadcasting.
    fn stop_broadcast(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Starts receiving announcements from the group.
    fn start_listening(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Stops receiving. Must be a no-op when not listening.
    fn stop_listening(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Stream of raw records observed on the group, own echoes included.
    fn announcements(&self) -> Pin<Box<dyn Stream<Item = Announcement> + Send>>;
}

/// Discovery protocol logic over a [`Beacon`].
///
/// Filters the raw announcement stream down to usable opponent candidates:
/// own echoes and records of foreign protocols are dropped silently, records
/// without encryption key material are logged and dropped.
pub struct DiscoveryChannel<B> {
    beacon: Arc<B>,
    descriptor: Announcement,
    active: Mutex<Option<CancellationToken>>,
    accepted_tx: mpsc::UnboundedSender<Announcement>,
    accepted_rx: Mutex<Option<mpsc::UnboundedReceiver<Announcement>>>,
}

impl<B: Beacon + 'static> DiscoveryChannel<B> {
    /// Creates the channel around the node's immutable self-description.
    pub fn new(beacon: Arc<B>, descriptor: Announcement) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            beacon,
            descriptor,
            active: Mutex::new(None),
            accepted_tx,
            accepted_rx: Mutex::new(Some(accepted_rx)),
        }
    }

    /// The record this node broadcasts.
    pub fn descriptor(&self) -> &Announcement {
        &self.descriptor
    }

    /// Starts broadcast and listening. Idempotent: beginning an already
    /// active channel is a no-op. A previous `end` tears the filter task
    /// down, so beginning again recreates it.
    pub async fn begin(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            tracing::debug!("discovery already active");
            return Ok(());
        }

        self.beacon.start_broadcast(&self.descriptor).await?;
        self.beacon.start_listening().await?;

        let token = CancellationToken::new();
        let mut raw = self.beacon.announcements();
        let accepted_tx = self.accepted_tx.clone();
        let own_name = self.descriptor.name.clone();
        let session_type = self.descriptor.session_type.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    record = raw.next() => {
                        let Some(record) = record else { break };
                        if record.name == own_name {
                            continue; // self-echo
                        }
                        if record.session_type != session_type {
                            continue; // foreign protocol sharing the group
                        }
                        if let Err(e) = record.validate() {
                            tracing::warn!("dropping announcement from {:?}: {}", record.name, e);
                            continue;
                        }
                        let _ = accepted_tx.send(record);
                    }
                }
            }
        });

        *active = Some(token);
        tracing::info!("started opponent search");
        Ok(())
    }

    /// Stops broadcast and listening. Safe to call when never started or
    /// already stopped.
    pub async fn end(&self) {
        let mut active = self.active.lock().await;
        let Some(token) = active.take() else {
            tracing::debug!("discovery already stopped");
            return;
        };
        token.cancel();
        self.beacon.stop_broadcast().await;
        self.beacon.stop_listening().await;
        tracing::info!("stopped opponent search");
    }

    /// Whether discovery is currently running.
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Takes the stream of accepted opponent candidates. The receiver
    /// survives stop/start cycles; only one consumer may take it.
    pub async fn accepted(&self) -> Option<mpsc::UnboundedReceiver<Announcement>> {
        self.accepted_rx.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Beacon fake: counts lifecycle calls and replays a scripted record set.
    struct ScriptedBeacon {
        records: Vec<Announcement>,
        broadcasts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ScriptedBeacon {
        fn new(records: Vec<Announcement>) -> Arc<Self> {
            Arc::new(Self {
                records,
                broadcasts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            })
        }
    }

    impl Beacon for ScriptedBeacon {
        async fn start_broadcast(&self, _record: &Announcement) -> Result<()> {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_broadcast(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn start_listening(&self) -> Result<()> {
            Ok(())
        }

        async fn stop_listening(&self) {}

        fn announcements(&self) -> Pin<Box<dyn Stream<Item = Announcement> + Send>> {
            let records = self.records.clone();
            Box::pin(futures::stream::iter(records).chain(futures::stream::pending()))
        }
    }

    fn ann(name: &str, session_type: &str, enc_key: &str) -> Announcement {
        Announcement {
            addr: "127.0.0.1:5000".parse().unwrap(),
            name: name.to_string(),
            enc_key: enc_key.to_string(),
            sign_key: "ff".to_string(),
            session_type: session_type.to_string(),
        }
    }

    #[tokio::test]
    async fn filters_self_echo_foreign_type_and_missing_keys() {
        let beacon = ScriptedBeacon::new(vec![
            ann("alice", "pong", "aa"),   // self-echo
            ann("carol", "chess", "aa"),  // foreign protocol
            ann("mallory", "pong", ""),   // no encryption key
            ann("bob", "pong", "bb"),     // accepted
        ]);
        let channel = DiscoveryChannel::new(beacon, ann("alice", "pong", "aa"));
        let mut accepted = channel.accepted().await.unwrap();

        channel.begin().await.unwrap();

        let record = accepted.recv().await.unwrap();
        assert_eq!(record.name, "bob");
        assert!(accepted.try_recv().is_err());
    }

    #[tokio::test]
    async fn begin_twice_is_idempotent() {
        let beacon = ScriptedBeacon::new(Vec::new());
        let channel = DiscoveryChannel::new(beacon.clone(), ann("alice", "pong", "aa"));

        channel.begin().await.unwrap();
        channel.begin().await.unwrap();

        assert_eq!(beacon.broadcasts.load(Ordering::SeqCst), 1);
        assert!(channel.is_active().await);
    }

    #[tokio::test]
    async fn end_without_begin_is_a_noop() {
        let beacon = ScriptedBeacon::new(Vec::new());
        let channel = DiscoveryChannel::new(beacon.clone(), ann("alice", "pong", "aa"));

        channel.end().await;
        channel.end().await;

        assert_eq!(beacon.stops.load(Ordering::SeqCst), 0);
        assert!(!channel.is_active().await);
    }

    #[tokio::test]
    async fn restart_after_end_recreates_the_filter() {
        let beacon = ScriptedBeacon::new(vec![ann("bob", "pong", "bb")]);
        let channel = DiscoveryChannel::new(beacon.clone(), ann("alice", "pong", "aa"));
        let mut accepted = channel.accepted().await.unwrap();

        channel.begin().await.unwrap();
        assert_eq!(accepted.recv().await.unwrap().name, "bob");
        channel.end().await;

        channel.begin().await.unwrap();
        assert_eq!(accepted.recv().await.unwrap().name, "bob");
        assert_eq!(beacon.broadcasts.load(Ordering::SeqCst), 2);
    }
}
