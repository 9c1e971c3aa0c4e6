//! Ambient NAT detection service.
//!
//! [`AmbientAutoNat`] owns the status record and a background task that
//! periodically probes peers from the [`PeerRegistry`]:
//!
//! 1. Wait out the boot delay so the host can collect peers
//! 2. Run a detection cycle (skipped entirely when no peers are known)
//! 3. Sleep for the retry interval while the status is unknown, or the
//!    refresh interval once it is public or private
//! 4. Repeat until cancelled
//!
//! Probes within a cycle run one at a time, each bounded by the request
//! timeout. Cancellation is observed at every wait. A cycle interrupted by
//! cancellation is dropped without touching the status.

use crate::client::DialBack;
use crate::config::AutoNatConfig;
use crate::error::{ProbeError, Result};
use crate::host::{ConnectionObserver, Host, NetAddr, PeerId};
use crate::registry::PeerRegistry;
use crate::status::{Confidence, CycleOutcome, CycleTally, NatStatus, StatusRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ambient NAT status detector
///
/// Readers see the status committed by the most recent completed cycle. The
/// detector stops when the cancellation token passed at construction fires,
/// when [`shutdown`](Self::shutdown) is called, or when it is dropped.
pub struct AmbientAutoNat {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: AutoNatConfig,
    host: Arc<dyn Host>,
    client: Arc<dyn DialBack>,
    registry: Arc<PeerRegistry>,
    record: RwLock<StatusRecord>,
    status_tx: watch::Sender<NatStatus>,
    cancel: CancellationToken,
}

impl AmbientAutoNat {
    /// Start a detector with the default configuration
    ///
    /// Registers the peer registry with `host` and spawns the detection task.
    /// Must be called from within a Tokio runtime.
    pub fn new(cancel: CancellationToken, host: Arc<dyn Host>, client: Arc<dyn DialBack>) -> Self {
        Self::start(AutoNatConfig::default(), cancel, host, client)
    }

    /// Start a detector with an explicit configuration
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation. Nothing is
    /// registered or spawned in that case.
    pub fn with_config(
        config: AutoNatConfig,
        cancel: CancellationToken,
        host: Arc<dyn Host>,
        client: Arc<dyn DialBack>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::start(config, cancel, host, client))
    }

    fn start(
        config: AutoNatConfig,
        cancel: CancellationToken,
        host: Arc<dyn Host>,
        client: Arc<dyn DialBack>,
    ) -> Self {
        let registry = Arc::new(PeerRegistry::new());
        let observer: Arc<dyn ConnectionObserver> = registry.clone();
        host.register_observer(observer);

        let (status_tx, _) = watch::channel(NatStatus::Unknown);

        let inner = Arc::new(Inner {
            config,
            host,
            client,
            registry,
            record: RwLock::new(StatusRecord::new()),
            status_tx,
            cancel: cancel.child_token(),
        });

        let task = tokio::spawn(inner.clone().run());

        Self {
            inner,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current NAT status
    pub async fn status(&self) -> NatStatus {
        self.inner.record.read().await.status()
    }

    /// Public address, available only while the status is public
    ///
    /// # Errors
    ///
    /// Returns `NotPublic` when the status is unknown or private.
    pub async fn public_addr(&self) -> Result<NetAddr> {
        self.inner.record.read().await.public_addr().cloned()
    }

    /// Current confidence in the status
    pub async fn confidence(&self) -> Confidence {
        self.inner.record.read().await.confidence()
    }

    /// Snapshot of status, confidence and address as of the last commit
    pub async fn snapshot(&self) -> StatusRecord {
        self.inner.record.read().await.clone()
    }

    /// Peers known to speak the AutoNAT protocol
    #[must_use]
    pub fn known_peers(&self) -> Vec<PeerId> {
        self.inner.registry.snapshot()
    }

    /// Peer registry fed by the host's connection notifications
    #[must_use]
    pub fn registry(&self) -> Arc<PeerRegistry> {
        self.inner.registry.clone()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &AutoNatConfig {
        &self.inner.config
    }

    /// Subscribe to status changes
    ///
    /// The receiver holds the current status and is notified whenever a
    /// cycle commits a different one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NatStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Whether a stop has been requested
    ///
    /// The background task may still be unwinding; see
    /// [`is_stopped`](Self::is_stopped).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Whether the detection task has exited
    pub async fn is_stopped(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Stop detection and wait for the background task to exit
    ///
    /// Only this detector is stopped; the token passed at construction is
    /// left untouched.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("AutoNAT detection task failed: {}", e);
            }
        }
    }
}

impl Drop for AmbientAutoNat {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        tracing::debug!(
            "AutoNAT detection starting in {:?}",
            self.config.boot_delay
        );

        if !self.sleep(self.config.boot_delay).await {
            tracing::debug!("AutoNAT detection cancelled during boot delay");
            return;
        }

        loop {
            self.detect().await;

            let delay = match self.record.read().await.status() {
                NatStatus::Unknown => self.config.retry_interval,
                NatStatus::Public | NatStatus::Private => self.config.refresh_interval,
            };

            if !self.sleep(delay).await {
                break;
            }
        }

        tracing::debug!("AutoNAT detection stopped");
    }

    /// Sleep for `duration`, returning false if cancelled first
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    /// Run one detection cycle and commit its outcome
    async fn detect(&self) {
        let peers = {
            let mut rng = rand::thread_rng();
            self.registry.select_probe_peers(self.host.as_ref(), &mut rng)
        };

        if peers.is_empty() {
            tracing::debug!("No AutoNAT peers known, skipping detection cycle");
            return;
        }

        let prior = self.record.read().await.confidence();
        let mut tally = CycleTally::new(prior);

        tracing::debug!(
            "Starting detection cycle with {} peers (confidence {})",
            peers.len(),
            prior
        );

        for peer in peers {
            let result = match self.probe(&peer).await {
                Some(result) => result,
                None => {
                    tracing::debug!("Detection cycle cancelled while probing {}", peer);
                    return;
                }
            };

            match &result {
                Ok(addr) => tracing::debug!("Peer {} dialed us back at {}", peer, addr),
                Err(e) => tracing::debug!("Dial back via {} failed: {}", peer, e),
            }

            if tally.record(result).is_some() {
                break;
            }
        }

        if self.cancel.is_cancelled() {
            return;
        }

        self.commit(tally.finish()).await;
    }

    /// Probe one peer under the request timeout, or `None` if cancelled
    async fn probe(&self, peer: &PeerId) -> Option<std::result::Result<NetAddr, ProbeError>> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = tokio::time::timeout(self.config.request_timeout, self.client.dial_back(peer)) => {
                Some(result.unwrap_or(Err(ProbeError::Timeout)))
            }
        }
    }

    async fn commit(&self, outcome: CycleOutcome) {
        let mut record = self.record.write().await;
        let previous = record.apply(outcome);
        let current = record.status();

        if previous == current {
            tracing::debug!(
                "NAT status remains {} (confidence {})",
                current,
                record.confidence()
            );
        } else {
            match record.public_addr() {
                Ok(addr) => tracing::info!("NAT status changed: {} -> {} ({})", previous, current, addr),
                Err(_) => tracing::info!(
                    "NAT status changed: {} -> {} (confidence {})",
                    previous,
                    current,
                    record.confidence()
                ),
            }
            self.status_tx.send_replace(current);
        }
    }
}
