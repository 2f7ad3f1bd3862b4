//! Link lifecycle: target resolution, connect-with-retry, command writes,
//! teardown.
//!
//! All lifecycle transitions run under one async lock that owns the current
//! [`Link`] slot and the in-flight attempt ticket. The retry loop itself runs
//! on a spawned task without holding that lock, so `disconnect()` can cancel
//! it at any suspension point. A write in progress holds the lock, so
//! `disconnect()` first raises an interrupt that aborts the pending write.

use std::sync::Arc;
use std::time::Duration;

use rc_link_transport::{PairedDeviceRegistry, SerialTransport};
use rc_link_types::{Command, ConnectionState, PairedDevice, SessionState};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::LinkPolicy;
use crate::link::Link;
use crate::session::{SessionStore, SessionView};

/// Upper bound on the best-effort STOP written during teardown.
///
/// A stalled link must not keep `disconnect()` from releasing it.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// STOP writes issued by [`LinkManager::emergency_stop`].
pub const EMERGENCY_STOP_REPEATS: usize = 3;

/// Owns the serial link to the vehicle and publishes its session state.
///
/// Cloning is cheap; all clones drive the same link. Operational methods
/// never return errors: transport failures become state transitions that
/// observers read through [`LinkManager::session`].
#[derive(Clone)]
pub struct LinkManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn PairedDeviceRegistry>,
    transport: Arc<dyn SerialTransport>,
    policy: LinkPolicy,
    session: SessionStore,
    lifecycle: Mutex<Lifecycle>,
    /// Bumped by `disconnect()` before it waits for the lifecycle lock.
    interrupts: watch::Sender<u64>,
}

/// State guarded by the lifecycle lock.
#[derive(Default)]
struct Lifecycle {
    /// Present exactly while the session is Connected.
    link: Option<Link>,
    /// Bumped whenever the in-flight attempt is superseded.
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
}

impl Lifecycle {
    fn cancel_attempt(&mut self) {
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            cancel.send_replace(true);
        }
    }
}

/// Ticket held by one connect attempt sequence.
struct Attempt {
    generation: u64,
    cancelled: watch::Receiver<bool>,
}

impl Attempt {
    /// Resolves once the attempt has been cancelled or its sender dropped.
    async fn cancelled(&mut self) {
        loop {
            if *self.cancelled.borrow_and_update() {
                return;
            }
            if self.cancelled.changed().await.is_err() {
                return;
            }
        }
    }
}

impl LinkManager {
    /// Create a manager and snapshot the paired device names.
    ///
    /// An unavailable adapter is not an error; the snapshot is then empty.
    pub async fn new(
        registry: Arc<dyn PairedDeviceRegistry>,
        transport: Arc<dyn SerialTransport>,
        policy: LinkPolicy,
    ) -> Self {
        let bonded = paired_devices(registry.as_ref()).await;
        let names: Vec<String> = bonded.into_iter().map(|d| d.name).collect();
        info!(count = names.len(), target = %policy.device_name, "paired devices loaded");

        Self {
            inner: Arc::new(Inner {
                registry,
                transport,
                policy,
                session: SessionStore::new(SessionState::with_bonded_devices(names)),
                lifecycle: Mutex::new(Lifecycle::default()),
                interrupts: watch::channel(0).0,
            }),
        }
    }

    /// Read-only session handle for observers.
    pub fn session(&self) -> SessionView {
        self.inner.session.view()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.session.current().connection
    }

    /// The policy this manager connects with.
    pub fn policy(&self) -> &LinkPolicy {
        &self.inner.policy
    }

    /// Query the registry for paired device names.
    ///
    /// An unavailable adapter yields an empty list.
    pub async fn list_paired_devices(&self) -> Vec<String> {
        paired_devices(self.inner.registry.as_ref())
            .await
            .into_iter()
            .map(|d| d.name)
            .collect()
    }

    /// Connect to the target device.
    ///
    /// Ignored while Connecting or Connected. Otherwise supersedes any
    /// previous attempt, runs the retry sequence on a worker task and
    /// returns the state it ended in. A sequence cancelled by
    /// [`disconnect`](Self::disconnect) returns whatever state that left.
    pub async fn connect(&self) -> ConnectionState {
        let Some(attempt) = self.inner.begin_attempt().await else {
            let state = self.state();
            debug!(%state, "connect ignored");
            return state;
        };

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(inner.run_attempt(attempt)).await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "connect task ended abnormally");
                self.state()
            }
        }
    }

    /// Command the vehicle to stop, then close the link.
    ///
    /// Also cancels any in-flight connect and aborts a pending write. Always
    /// ends Disconnected, even when the STOP write or a close fails. Safe to
    /// call repeatedly.
    pub async fn disconnect(&self) {
        self.inner.interrupts.send_modify(|n| *n = n.wrapping_add(1));
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.teardown(&mut lifecycle).await;
    }

    /// Write one command to the vehicle.
    ///
    /// Ignored unless Connected. A failed write tears the link down and
    /// leaves the session in Error. A write still pending when
    /// [`disconnect`](Self::disconnect) is called is abandoned, and the
    /// command is not recorded.
    pub async fn send_command(&self, command: Command) {
        if !self.state().accepts_commands() {
            debug!(%command, "not connected, command dropped");
            return;
        }

        let mut interrupted = self.inner.interrupts.subscribe();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(link) = lifecycle.link.as_mut() else {
            debug!(%command, "link gone, command dropped");
            return;
        };

        let written = tokio::select! {
            biased;
            _ = interrupted.changed() => {
                debug!(%command, "write abandoned for disconnect");
                return;
            }
            result = link.write(command) => result,
        };

        match written {
            Ok(()) => {
                self.inner.session.publish(|s| s.with_command(command));
            }
            Err(e) => {
                warn!(%command, error = %e, "write failed, tearing down link");
                self.inner.teardown(&mut lifecycle).await;
                self.inner
                    .session
                    .publish(|s| s.with_connection(ConnectionState::Error));
            }
        }
    }

    /// Send STOP several times in a row.
    ///
    /// Each write goes through [`send_command`](Self::send_command), so the
    /// burst ends early if the link fails or is torn down.
    pub async fn emergency_stop(&self) {
        warn!("emergency stop");
        for _ in 0..EMERGENCY_STOP_REPEATS {
            if !self.state().accepts_commands() {
                break;
            }
            self.send_command(Command::Stop).await;
        }
    }
}

impl Inner {
    /// Claim the attempt slot and publish Connecting, unless busy.
    async fn begin_attempt(&self) -> Option<Attempt> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !self.session.current().connection.can_connect() {
            return None;
        }

        debug_assert!(lifecycle.link.is_none(), "link kept outside Connected");
        lifecycle.cancel_attempt();
        let (cancel, cancelled) = watch::channel(false);
        lifecycle.cancel = Some(cancel);

        self.session
            .publish(|s| s.with_connection(ConnectionState::Connecting));
        info!(device = %self.policy.device_name, "connecting");

        Some(Attempt {
            generation: lifecycle.generation,
            cancelled,
        })
    }

    async fn run_attempt(self: Arc<Self>, mut attempt: Attempt) -> ConnectionState {
        let Some(device) = self.resolve_target().await else {
            warn!(device = %self.policy.device_name, "target device is not paired");
            return self.finish(&attempt, None).await;
        };

        let max_attempts = self.policy.max_attempts;
        for n in 1..=max_attempts {
            let opened = tokio::select! {
                biased;
                () = attempt.cancelled() => return self.abandon(n),
                result = self.transport.open(&device, self.policy.service_uuid) => result,
            };

            match opened {
                Ok(connection) => {
                    let link = Link::new(device, connection);
                    return self.finish(&attempt, Some(link)).await;
                }
                Err(e) => {
                    warn!(
                        device = %device.name,
                        attempt = n,
                        max_attempts,
                        error = %e,
                        "connection attempt failed"
                    );
                    if n < max_attempts {
                        tokio::select! {
                            biased;
                            () = attempt.cancelled() => return self.abandon(n),
                            () = tokio::time::sleep(self.policy.retry_backoff) => {}
                        }
                    }
                }
            }
        }

        warn!(device = %device.name, max_attempts, "giving up on connection");
        self.finish(&attempt, None).await
    }

    async fn resolve_target(&self) -> Option<PairedDevice> {
        paired_devices(self.registry.as_ref())
            .await
            .into_iter()
            .find(|d| d.matches_name(&self.policy.device_name))
    }

    fn abandon(&self, attempt: u32) -> ConnectionState {
        debug!(attempt, "connect sequence cancelled");
        self.session.current().connection
    }

    /// Apply the outcome of an attempt sequence unless it was superseded.
    async fn finish(&self, attempt: &Attempt, link: Option<Link>) -> ConnectionState {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.generation != attempt.generation {
            drop(lifecycle);
            debug!("discarding result of superseded connect attempt");
            if let Some(link) = link {
                link.close().await;
            }
            return self.session.current().connection;
        }

        lifecycle.cancel = None;
        let state = match link {
            Some(link) => {
                info!(device = %link.device().name, "connected");
                lifecycle.link = Some(link);
                ConnectionState::Connected
            }
            None => ConnectionState::Error,
        };
        self.session.publish(|s| s.with_connection(state));
        state
    }

    /// STOP (best effort), cancel any attempt, close the link, publish
    /// Disconnected.
    async fn teardown(&self, lifecycle: &mut Lifecycle) {
        if let Some(link) = lifecycle.link.as_mut() {
            match tokio::time::timeout(STOP_GRACE, link.write(Command::Stop)).await {
                Ok(Ok(())) => {
                    self.session.publish(|s| s.with_command(Command::Stop));
                }
                Ok(Err(e)) => debug!(error = %e, "stop before disconnect failed"),
                Err(_) => warn!(grace = ?STOP_GRACE, "stop before disconnect timed out"),
            }
        }

        lifecycle.cancel_attempt();
        if let Some(link) = lifecycle.link.take() {
            link.close().await;
        }

        if self
            .session
            .publish(|s| s.with_connection(ConnectionState::Disconnected))
        {
            info!("disconnected");
        }
    }
}

async fn paired_devices(registry: &dyn PairedDeviceRegistry) -> Vec<PairedDevice> {
    match registry.paired_devices().await {
        Ok(devices) => devices,
        Err(e) => {
            info!(error = %e, "paired device registry unavailable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_link_transport::mock::{MockRegistry, MockTransport, MockTransportHandle};

    async fn manager() -> (LinkManager, Arc<MockTransport>, MockTransportHandle) {
        let transport = Arc::new(MockTransport::new());
        let handle = transport.handle();
        let manager = LinkManager::new(
            Arc::new(MockRegistry::with_names(["HC-05"])),
            transport.clone(),
            LinkPolicy::default(),
        )
        .await;
        (manager, transport, handle)
    }

    /// Run an attempt up to a successful open without applying it.
    async fn open_link(manager: &LinkManager, transport: &MockTransport) -> (Attempt, Link) {
        let attempt = manager.inner.begin_attempt().await.unwrap();
        let device = manager.inner.resolve_target().await.unwrap();
        let connection = transport
            .open(&device, manager.policy().service_uuid)
            .await
            .unwrap();
        (attempt, Link::new(device, connection))
    }

    #[tokio::test]
    async fn superseded_attempt_closes_its_opened_link() {
        let (manager, transport, handle) = manager().await;
        let (attempt, link) = open_link(&manager, &transport).await;

        // Disconnect lands after the open returned, before the result is applied.
        manager.disconnect().await;
        let state = manager.inner.finish(&attempt, Some(link)).await;

        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(handle.output_closes(), 1);
        assert_eq!(handle.handle_closes(), 1);
        assert!(handle.written().is_empty());
        assert!(manager.inner.lifecycle.lock().await.link.is_none());
    }

    #[tokio::test]
    async fn stale_result_does_not_override_newer_attempt() {
        let (manager, transport, handle) = manager().await;
        let (stale, stale_link) = open_link(&manager, &transport).await;
        manager.disconnect().await;

        let (current, link) = open_link(&manager, &transport).await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let state = manager.inner.finish(&stale, Some(stale_link)).await;
        assert_eq!(state, ConnectionState::Connecting);
        assert_eq!(handle.handle_closes(), 1);

        let state = manager.inner.finish(&current, Some(link)).await;
        assert_eq!(state, ConnectionState::Connected);
        manager.send_command(Command::Forward).await;
        assert_eq!(handle.written(), b"F");
        assert_eq!(handle.handle_closes(), 1);
    }
}
