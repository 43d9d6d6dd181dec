use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::{Body, ChannelId, Envelope, EnvelopeId};

use super::handlers::{invoke, HandlerId, HandlerRegistry, Incoming, MessageHandler};
use super::millis;
use super::pending::PendingTable;
use super::state::{ChannelConfig, ChannelState, Role};
use crate::policy::{normalize_origin, WILDCARD};
use crate::transport::router::{ChannelRouter, Routed};
use crate::transport::WindowRef;

/// One logical conversation between this context and a peer window.
///
/// Cheap to clone; all clones drive the same channel. Must be created inside
/// a tokio runtime (each channel owns an inbox task).
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    id: ChannelId,
    role: Role,
    router: ChannelRouter,
    peer: WindowRef,
    peer_origin: String,
    cfg: ChannelConfig,
    state: watch::Sender<ChannelState>,
    pending: PendingTable,
    handlers: HandlerRegistry,
    sends: mpsc::UnboundedSender<SendJob>,
    pump: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// One inbound `send` and the handlers registered for it when it arrived.
type SendJob = (Vec<Arc<dyn MessageHandler>>, Incoming);

impl Channel {
    /// Initiating side with a freshly generated channel id.
    pub fn initiator(
        router: ChannelRouter,
        peer: WindowRef,
        peer_origin: &str,
        cfg: ChannelConfig,
    ) -> Result<Self> {
        Self::open(ChannelId::generate(), Role::Initiator, router, peer, peer_origin, cfg)
    }

    /// Initiating side whose id was generated ahead of time (it had to be
    /// written into the frame URL before the frame existed).
    pub fn initiator_with_id(
        id: ChannelId,
        router: ChannelRouter,
        peer: WindowRef,
        peer_origin: &str,
        cfg: ChannelConfig,
    ) -> Result<Self> {
        Self::open(id, Role::Initiator, router, peer, peer_origin, cfg)
    }

    /// Responding side for a channel id announced by the initiator.
    pub fn responder(
        id: ChannelId,
        router: ChannelRouter,
        peer: WindowRef,
        peer_origin: &str,
        cfg: ChannelConfig,
    ) -> Result<Self> {
        Self::open(id, Role::Responder, router, peer, peer_origin, cfg)
    }

    fn open(
        id: ChannelId,
        role: Role,
        router: ChannelRouter,
        peer: WindowRef,
        peer_origin: &str,
        cfg: ChannelConfig,
    ) -> Result<Self> {
        let peer_origin = normalize_origin(peer_origin)?;

        // Listener goes in before anything can be sent.
        let (tx, rx) = mpsc::unbounded_channel();
        router.register(&id, tx)?;

        let (state, _) = watch::channel(ChannelState::Uninitialized);
        let (sends, jobs) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            id,
            role,
            router,
            peer,
            peer_origin,
            cfg,
            state,
            pending: PendingTable::default(),
            handlers: HandlerRegistry::default(),
            sends,
            pump: Mutex::new(None),
            worker: Mutex::new(None),
        });

        *inner.worker.lock() = Some(spawn_send_worker(&inner, jobs));
        *inner.pump.lock() = Some(spawn_pump(&inner, rx));

        tracing::debug!(channel_id = %inner.id, role = ?inner.role, peer_origin = %inner.peer_origin, "channel created");
        Ok(Self { inner })
    }

    pub fn id(&self) -> &ChannelId {
        &self.inner.id
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn peer_origin(&self) -> &str {
        &self.inner.peer_origin
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.cfg
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state()
    }

    /// Number of requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Run the initiator handshake: post `handshake-syn` (repeating every
    /// `handshake_retry`) until the peer acks or `handshake_timeout` elapses.
    /// On timeout the channel is closed.
    pub async fn start(&self) -> Result<()> {
        if self.inner.role != Role::Initiator {
            return Err(ChannelError::Internal(
                "only the initiating side starts a handshake".into(),
            ));
        }
        if !self
            .inner
            .transition(&[ChannelState::Uninitialized], ChannelState::SynSent)
        {
            return Err(match self.state() {
                ChannelState::Closed => ChannelError::ChannelClosed,
                s => ChannelError::Internal(format!("handshake already started ({s:?})")),
            });
        }

        let timeout = self.inner.cfg.handshake_timeout;
        tracing::debug!(channel_id = %self.inner.id, timeout_ms = millis(timeout), "handshake started");

        match tokio::time::timeout(timeout, self.inner.handshake()).await {
            Ok(res) => res,
            Err(_) => {
                let err = ChannelError::handshake_timeout(timeout);
                tracing::warn!(channel_id = %self.inner.id, error = %err, "handshake failed");
                self.inner.shutdown("handshake timeout");
                Err(err)
            }
        }
    }

    /// Wait until the channel is established (either side).
    pub async fn wait_established(&self, timeout: Duration) -> Result<()> {
        let mut state = self.inner.state.subscribe();
        let wait = async {
            loop {
                let current = *state.borrow_and_update();
                match current {
                    ChannelState::Established => return Ok(()),
                    ChannelState::Closed => return Err(ChannelError::ChannelClosed),
                    _ => {}
                }
                if state.changed().await.is_err() {
                    return Err(ChannelError::ChannelClosed);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ChannelError::handshake_timeout(timeout))?
    }

    /// Resolves once the channel is closed.
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        loop {
            if *state.borrow_and_update() == ChannelState::Closed {
                return;
            }
            if state.changed().await.is_err() {
                return;
            }
        }
    }

    /// Fire-and-forget message.
    pub fn send(&self, name: &str, payload: Value) -> Result<()> {
        self.inner.ensure_established()?;
        let env = Envelope::send(self.inner.id.clone(), name, payload);
        self.inner.post(&env)
    }

    /// Send a request and wait for its response, error, or `timeout`.
    pub async fn request(&self, name: &str, payload: Value, timeout: Duration) -> Result<Value> {
        self.inner.ensure_established()?;

        let env = Envelope::request(self.inner.id.clone(), name, payload);
        let envelope_id = env.envelope_id.clone();
        let (tx, rx) = oneshot::channel();

        let weak = Arc::downgrade(&self.inner);
        let timer_id = envelope_id.clone();
        let timer_name = name.to_string();
        self.inner
            .pending
            .register(envelope_id.clone(), name, tx, move || {
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    let Some(inner) = weak.upgrade() else { return };
                    let err = ChannelError::request_timeout(timer_name, timeout);
                    if inner.pending.settle(&timer_id, Err(err)) {
                        tracing::debug!(channel_id = %inner.id, envelope_id = %timer_id, "request timed out");
                    }
                })
            });

        // `close` may have drained the table between the state check and here.
        if self.state() == ChannelState::Closed {
            self.inner
                .pending
                .settle(&envelope_id, Err(ChannelError::ChannelClosed));
        } else if let Err(e) = self.inner.post(&env) {
            self.inner.pending.settle(&envelope_id, Err(e));
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ChannelError::ChannelClosed),
        }
    }

    /// Register a handler for messages named `name`.
    pub fn on<H>(&self, name: &str, handler: H) -> Result<HandlerId>
    where
        H: MessageHandler + 'static,
    {
        self.on_shared(name, Arc::new(handler))
    }

    pub fn on_shared(&self, name: &str, handler: Arc<dyn MessageHandler>) -> Result<HandlerId> {
        if self.state() == ChannelState::Closed {
            return Err(ChannelError::ChannelClosed);
        }
        Ok(self.inner.handlers.insert(name, handler))
    }

    /// Remove one registration. Returns whether it existed.
    pub fn off(&self, name: &str, id: HandlerId) -> bool {
        self.inner.handlers.remove(name, id)
    }

    /// Close the channel: reject pending requests, drop handlers, stop
    /// routing. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown("closed by owner");
    }
}

impl Inner {
    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn transition(&self, from: &[ChannelState], to: ChannelState) -> bool {
        self.state.send_if_modified(|s| {
            if from.contains(s) {
                *s = to;
                true
            } else {
                false
            }
        })
    }

    fn ensure_established(&self) -> Result<()> {
        match self.state() {
            ChannelState::Established => Ok(()),
            ChannelState::Closed => Err(ChannelError::ChannelClosed),
            _ => Err(ChannelError::NotEstablished),
        }
    }

    fn origin_matches(&self, origin: &str) -> bool {
        self.peer_origin == WILDCARD || self.peer_origin == origin
    }

    fn post(&self, env: &Envelope) -> Result<()> {
        if self.peer.is_closed() {
            self.shutdown("peer window destroyed");
            return Err(ChannelError::ChannelClosed);
        }
        self.router.post(self.peer.as_ref(), &self.peer_origin, env)
    }

    async fn handshake(&self) -> Result<()> {
        let mut state = self.state.subscribe();
        let mut retry = tokio::time::interval(self.cfg.handshake_retry);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let current = *state.borrow_and_update();
            match current {
                ChannelState::Established => return Ok(()),
                ChannelState::Closed => return Err(ChannelError::ChannelClosed),
                _ => {}
            }

            tokio::select! {
                _ = retry.tick() => {
                    let syn = Envelope::syn(self.id.clone(), self.router.origin());
                    self.post(&syn)?;
                    tracing::trace!(channel_id = %self.id, "handshake-syn posted");
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return Err(ChannelError::ChannelClosed);
                    }
                }
            }
        }
    }

    fn shutdown(&self, reason: &str) {
        let prev = self.state.send_replace(ChannelState::Closed);
        if prev == ChannelState::Closed {
            return;
        }

        let rejected = self.pending.reject_all(&ChannelError::ChannelClosed);
        self.handlers.clear();
        self.router.unregister(&self.id);
        tracing::info!(channel_id = %self.id, reason, rejected, "channel closed");

        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    /// `sender` is the origin the transport observed, not the one the
    /// envelope claims.
    fn on_envelope(self: &Arc<Self>, env: Envelope, sender: &str) {
        let state = self.state();
        let envelope_id = env.envelope_id;

        match env.body {
            Body::HandshakeSyn { origin } => self.on_syn(&origin, sender),
            Body::HandshakeAck { origin } => self.on_ack(&origin, sender),
            body if state != ChannelState::Established => {
                tracing::debug!(kind = body.kind().as_str(), ?state, "message before handshake completed dropped");
            }
            Body::Send { name, payload } => self.deliver_send(name, payload),
            Body::Request { name, payload } => self.deliver_request(envelope_id, name, payload),
            Body::Response {
                in_reply_to,
                name,
                payload,
            } => {
                if !self.pending.settle(&in_reply_to, Ok(payload)) {
                    tracing::debug!(in_reply_to = %in_reply_to, name, "response for unknown or expired request ignored");
                }
            }
            Body::Error {
                in_reply_to,
                message,
            } => {
                if !self
                    .pending
                    .settle(&in_reply_to, Err(ChannelError::Handler(message)))
                {
                    tracing::debug!(in_reply_to = %in_reply_to, "error for unknown or expired request ignored");
                }
            }
        }
    }

    /// The handshake peer must be the expected origin, and must say so
    /// truthfully.
    fn handshake_origin_ok(&self, kind: &str, claimed: &str, sender: &str) -> bool {
        if claimed != sender {
            tracing::warn!(kind, claimed, sender, "handshake origin does not match event origin; ignored");
            return false;
        }
        if !self.origin_matches(sender) {
            tracing::warn!(kind, sender, expected = %self.peer_origin, "handshake from unexpected origin ignored");
            return false;
        }
        true
    }

    fn on_syn(&self, origin: &str, sender: &str) {
        if self.role != Role::Responder {
            tracing::debug!("handshake-syn on initiating side ignored");
            return;
        }
        if !self.handshake_origin_ok("handshake-syn", origin, sender) {
            return;
        }
        self.transition(&[ChannelState::Uninitialized], ChannelState::SynReceived);
        if self.state() == ChannelState::Closed {
            return;
        }

        // Repeated syns (the initiator retries) get a fresh ack each time.
        let ack = Envelope::ack(self.id.clone(), self.router.origin());
        if let Err(e) = self.post(&ack) {
            tracing::warn!(error = %e, "handshake-ack not sent");
            return;
        }

        if self.transition(&[ChannelState::SynReceived], ChannelState::Established) {
            tracing::info!(channel_id = %self.id, peer_origin = origin, "channel established");
        }
    }

    fn on_ack(&self, origin: &str, sender: &str) {
        if self.role != Role::Initiator {
            tracing::debug!("handshake-ack on responding side ignored");
            return;
        }
        if !self.handshake_origin_ok("handshake-ack", origin, sender) {
            return;
        }
        if self.transition(&[ChannelState::SynSent], ChannelState::Established) {
            tracing::info!(channel_id = %self.id, peer_origin = origin, "channel established");
        } else {
            tracing::trace!(state = ?self.state(), "handshake-ack ignored");
        }
    }

    /// Hand a `send` to the ordered worker; the pump never waits on a handler.
    fn deliver_send(&self, name: String, payload: Value) {
        let handlers = self.handlers.all(&name);
        if handlers.is_empty() {
            tracing::debug!(name, "no handler for message; dropped");
            return;
        }

        let msg = Incoming {
            name,
            payload,
            expects_reply: false,
        };
        if self.sends.send((handlers, msg)).is_err() {
            tracing::debug!("send worker gone; message dropped");
        }
    }

    fn deliver_request(self: &Arc<Self>, envelope_id: EnvelopeId, name: String, payload: Value) {
        let Some(handler) = self.handlers.first(&name) else {
            tracing::warn!(name, "request without handler answered with error");
            let reply = Envelope::error(
                self.id.clone(),
                envelope_id,
                format!("no handler registered for '{name}'"),
            );
            if let Err(e) = self.post(&reply) {
                tracing::debug!(error = %e, "error reply not sent");
            }
            return;
        };

        let weak = Arc::downgrade(self);
        let msg = Incoming {
            name: name.clone(),
            payload,
            expects_reply: true,
        };

        tokio::spawn(
            async move {
                let outcome = invoke(handler, msg).await;
                let Some(inner) = weak.upgrade() else { return };
                if inner.state() != ChannelState::Established {
                    tracing::debug!(name, "channel closed before reply; dropped");
                    return;
                }

                let reply = match outcome {
                    Ok(value) => Envelope::response(inner.id.clone(), envelope_id, name, value),
                    Err(e) => {
                        tracing::warn!(name, error = %e, "request handler failed");
                        Envelope::error(inner.id.clone(), envelope_id, e.message())
                    }
                };
                if let Err(e) = inner.post(&reply) {
                    tracing::debug!(error = %e, "reply not sent");
                }
            }
            .instrument(tracing::Span::current()),
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.router.unregister(&self.id);
        self.pending.reject_all(&ChannelError::ChannelClosed);
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

fn spawn_pump(inner: &Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Routed>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let mut peer_closed = inner.peer.close_signal();
    let span = tracing::info_span!("channel", channel_id = %inner.id, role = ?inner.role);

    tokio::spawn(
        async move {
            let reason = loop {
                tokio::select! {
                    routed = rx.recv() => {
                        let Some(routed) = routed else {
                            // Router dropped our route (disposed).
                            break "transport disposed";
                        };
                        let Some(inner) = weak.upgrade() else { return };
                        match routed {
                            Routed::Envelope { env, origin } => inner.on_envelope(env, &origin),
                            Routed::Malformed(reason) => {
                                tracing::warn!(reason, "malformed message for this channel dropped");
                            }
                        }
                    }
                    // An error means the window itself is gone.
                    _ = peer_closed.wait_for(|closed| *closed) => break "peer window destroyed",
                }
            };
            if let Some(inner) = weak.upgrade() {
                inner.shutdown(reason);
            }
        }
        .instrument(span),
    )
}

/// Runs `send` handlers one message at a time, in arrival order, off the
/// inbox pump so a handler may await traffic on its own channel.
fn spawn_send_worker(inner: &Arc<Inner>, mut jobs: mpsc::UnboundedReceiver<SendJob>) -> JoinHandle<()> {
    let span = tracing::info_span!("channel_sends", channel_id = %inner.id, role = ?inner.role);

    tokio::spawn(
        async move {
            while let Some((handlers, msg)) = jobs.recv().await {
                for handler in handlers {
                    if let Err(e) = invoke(handler, msg.clone()).await {
                        tracing::warn!(name = %msg.name, error = %e, "message handler failed");
                    }
                }
            }
        }
        .instrument(span),
    )
}
