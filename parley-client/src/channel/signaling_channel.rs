use crate::channel::backoff::BackoffPolicy;
use crate::channel::transport::{SignalingTransport, TransportFrame, TransportLink};
use crate::error::{ChannelError, ConnectError};
use parley_core::{ParticipantId, RoomId, SignalBody, SignalMessage, is_deliberate_close};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a subscriber of the signaling channel observes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(SignalMessage),
    Reconnecting { attempt: u32, delay: Duration },
    Reconnected,
    /// Backoff exhausted. The channel has stopped; the caller must start over.
    MaxReconnectAttemptsReached,
    /// The relay closed the connection on purpose. No reconnect follows.
    ClosedByServer { code: u16, reason: String },
    /// Closed locally via [`SignalingChannel::close`].
    Closed,
}

enum Control {
    Send(SignalMessage),
    Subscribe(mpsc::UnboundedSender<ChannelEvent>),
}

/// Handle to a persistent, self-reconnecting connection to the relay.
///
/// A driver task owns the live link. Handles are cheap to clone; `send` only
/// enqueues, so callers never wait on the network.
#[derive(Clone)]
pub struct SignalingChannel {
    participant: ParticipantId,
    control: mpsc::UnboundedSender<Control>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SignalingChannel {
    /// Opens the first link right away and fails if that does not work.
    pub async fn connect(
        transport: Arc<dyn SignalingTransport>,
        participant: ParticipantId,
        auth_token: Option<String>,
        backoff: BackoffPolicy,
    ) -> Result<Self, ConnectError> {
        let link = transport.open(&participant, auth_token.as_deref()).await?;
        info!(participant = %participant, "Signaling channel connected");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = ChannelDriver {
            transport,
            participant: participant.clone(),
            auth_token,
            backoff,
            control: control_rx,
            shutdown: shutdown_rx,
            subscribers: Vec::new(),
            rooms: HashMap::new(),
            pending: VecDeque::new(),
        };
        tokio::spawn(driver.run(link));

        Ok(Self {
            participant,
            control: control_tx,
            shutdown: Arc::new(shutdown_tx),
        })
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Queues `message` for the relay. While reconnecting, messages wait for the next link.
    pub fn send(&self, message: SignalMessage) -> Result<(), ChannelError> {
        self.control
            .send(Control::Send(message))
            .map_err(|_| ChannelError::Closed)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.control.send(Control::Subscribe(tx.clone())).is_err() {
            let _ = tx.send(ChannelEvent::Closed);
        }
        rx
    }

    /// Stops the driver, cancelling any pending backoff. Safe to call repeatedly.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// True once closed locally or once the driver gave up.
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow() || self.control.is_closed()
    }
}

enum PumpExit {
    Shutdown,
    Lost,
    ClosedByServer { code: u16, reason: String },
}

struct ChannelDriver {
    transport: Arc<dyn SignalingTransport>,
    participant: ParticipantId,
    auth_token: Option<String>,
    backoff: BackoffPolicy,
    control: mpsc::UnboundedReceiver<Control>,
    shutdown: watch::Receiver<bool>,
    subscribers: Vec<mpsc::UnboundedSender<ChannelEvent>>,

    /// Last `Join` sent per room; replayed after every reconnection.
    rooms: HashMap<RoomId, SignalMessage>,

    /// Outbound messages queued while no link is up.
    pending: VecDeque<SignalMessage>,
}

impl ChannelDriver {
    async fn run(mut self, mut link: TransportLink) {
        loop {
            match self.pump(&mut link).await {
                PumpExit::Shutdown => {
                    debug!(participant = %self.participant, "Signaling channel closed locally");
                    drop(link);
                    self.emit(ChannelEvent::Closed);
                    return;
                }
                PumpExit::ClosedByServer { code, reason } => {
                    info!(participant = %self.participant, code, reason = %reason, "Relay closed the channel");
                    self.emit(ChannelEvent::ClosedByServer { code, reason });
                    return;
                }
                PumpExit::Lost => {
                    warn!(participant = %self.participant, "Signaling link lost");
                    drop(link);
                    match self.reconnect().await {
                        Some(next) => {
                            link = next;
                            self.emit(ChannelEvent::Reconnected);
                            self.resync(&link);
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn pump(&mut self, link: &mut TransportLink) -> PumpExit {
        loop {
            if *self.shutdown.borrow() {
                return PumpExit::Shutdown;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return PumpExit::Shutdown;
                    }
                }

                control = self.control.recv() => match control {
                    Some(Control::Send(message)) => {
                        self.track(&message);
                        if !write(link, &message) {
                            self.pending.push_back(message);
                            return PumpExit::Lost;
                        }
                    }
                    Some(Control::Subscribe(tx)) => self.subscribers.push(tx),
                    None => return PumpExit::Shutdown,
                },

                frame = link.inbound.recv() => match frame {
                    Some(TransportFrame::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(message) => self.emit(ChannelEvent::Message(message)),
                        Err(e) => warn!(participant = %self.participant, "Dropping malformed signal: {}", e),
                    },
                    Some(TransportFrame::Closed { code: Some(code), reason }) if is_deliberate_close(code) => {
                        return PumpExit::ClosedByServer { code, reason };
                    }
                    Some(TransportFrame::Closed { .. }) | None => return PumpExit::Lost,
                },
            }
        }
    }

    /// Backoff loop. Returns `None` when exhausted or shut down.
    async fn reconnect(&mut self) -> Option<TransportLink> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let Some(delay) = self.backoff.delay_for(attempt) else {
                warn!(participant = %self.participant, attempts = attempt - 1, "Giving up on reconnecting");
                self.emit(ChannelEvent::MaxReconnectAttemptsReached);
                return None;
            };

            info!(participant = %self.participant, attempt, ?delay, "Reconnecting");
            self.emit(ChannelEvent::Reconnecting { attempt, delay });

            if !self.sleep_or_shutdown(delay).await {
                self.emit(ChannelEvent::Closed);
                return None;
            }

            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    self.emit(ChannelEvent::Closed);
                    return None;
                }
                result = self.transport.open(&self.participant, self.auth_token.as_deref()) => match result {
                    Ok(link) => {
                        info!(participant = %self.participant, attempt, "Reconnected");
                        return Some(link);
                    }
                    Err(e) => warn!(participant = %self.participant, attempt, error = %e, "Reconnect attempt failed"),
                },
            }
        }
    }

    /// Sleeps for `delay` while still accepting sends and subscriptions.
    /// Returns `false` if the channel was closed meanwhile.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;

        loop {
            if *self.shutdown.borrow() {
                return false;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return true,
                control = self.control.recv() => match control {
                    Some(Control::Send(message)) => {
                        self.track(&message);
                        self.pending.push_back(message);
                    }
                    Some(Control::Subscribe(tx)) => self.subscribers.push(tx),
                    None => return false,
                },
            }
        }
    }

    /// Re-sends `Join` for every tracked room, then whatever queued up meanwhile.
    fn resync(&mut self, link: &TransportLink) {
        for join in self.rooms.values() {
            debug!(participant = %self.participant, room = %join.room_id, "Rejoining after reconnect");
            write(link, join);
        }

        while let Some(message) = self.pending.pop_front() {
            if matches!(message.body, SignalBody::Join { .. }) {
                continue;
            }
            write(link, &message);
        }
    }

    fn track(&mut self, message: &SignalMessage) {
        match message.body {
            SignalBody::Join { .. } => {
                self.rooms.insert(message.room_id.clone(), message.clone());
            }
            SignalBody::Leave { .. } => {
                self.rooms.remove(&message.room_id);
            }
            _ => {}
        }
    }

    fn emit(&mut self, event: ChannelEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn write(link: &TransportLink, message: &SignalMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => link.outbound.send(text).is_ok(),
        Err(e) => {
            warn!("Failed to encode signal: {}", e);
            true
        }
    }
}
