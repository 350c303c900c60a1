use parley_core::ParticipantId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One-shot deadlines of the session actor. Each carries the record
/// generation and epoch it was scheduled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Timer {
    Grace {
        participant: ParticipantId,
        generation: u64,
        epoch: u64,
    },
    Negotiation {
        participant: ParticipantId,
        generation: u64,
        negotiation: u64,
    },
    CandidateExpiry {
        participant: ParticipantId,
        token: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKind {
    Grace,
    Negotiation,
    CandidateExpiry,
}

impl Timer {
    fn key(&self) -> (ParticipantId, TimerKind) {
        match self {
            Timer::Grace { participant, .. } => (participant.clone(), TimerKind::Grace),
            Timer::Negotiation { participant, .. } => {
                (participant.clone(), TimerKind::Negotiation)
            }
            Timer::CandidateExpiry { participant, .. } => {
                (participant.clone(), TimerKind::CandidateExpiry)
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct Expired {
    id: u64,
    timer: Timer,
}

/// Cancellable timers delivered back to the actor as messages.
///
/// At most one timer per (participant, kind); scheduling again replaces it.
/// A cancelled timer whose message was already queued is filtered out by
/// [`Timers::expired`].
pub(crate) struct Timers {
    tx: mpsc::UnboundedSender<Expired>,
    scheduled: HashMap<(ParticipantId, TimerKind), (u64, JoinHandle<()>)>,
    next_id: u64,
}

impl Timers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Expired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Self {
            tx,
            scheduled: HashMap::new(),
            next_id: 0,
        };
        (timers, rx)
    }

    pub fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.next_id += 1;
        let id = self.next_id;
        let key = timer.key();

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Expired { id, timer });
        });

        if let Some((_, previous)) = self.scheduled.insert(key, (id, handle)) {
            previous.abort();
        }
    }

    pub fn cancel_negotiation(&mut self, participant: &ParticipantId) {
        self.cancel(participant, TimerKind::Negotiation);
    }

    pub fn cancel_grace(&mut self, participant: &ParticipantId) {
        self.cancel(participant, TimerKind::Grace);
    }

    pub fn cancel_candidate_expiry(&mut self, participant: &ParticipantId) {
        self.cancel(participant, TimerKind::CandidateExpiry);
    }

    /// Cancels the grace and negotiation timers of one record.
    pub fn cancel_peer(&mut self, participant: &ParticipantId) {
        self.cancel(participant, TimerKind::Grace);
        self.cancel(participant, TimerKind::Negotiation);
    }

    pub fn clear(&mut self) {
        for (_, (_, handle)) in self.scheduled.drain() {
            handle.abort();
        }
    }

    /// Returns the timer if it is still the current one for its slot.
    pub fn expired(&mut self, expired: Expired) -> Option<Timer> {
        let key = expired.timer.key();
        match self.scheduled.get(&key) {
            Some((id, _)) if *id == expired.id => {
                self.scheduled.remove(&key);
                Some(expired.timer)
            }
            _ => None,
        }
    }

    fn cancel(&mut self, participant: &ParticipantId, kind: TimerKind) {
        if let Some((_, handle)) = self.scheduled.remove(&(participant.clone(), kind)) {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.clear();
    }
}
