use parley_core::{IceCandidate, ParticipantId};
use std::collections::HashMap;

struct Buffered {
    token: u64,
    candidates: Vec<IceCandidate>,
}

/// Candidates from participants that have no record yet, kept until their
/// offer arrives or the buffer expires.
#[derive(Default)]
pub(crate) struct PendingCandidates {
    buffers: HashMap<ParticipantId, Buffered>,
    next_token: u64,
}

impl PendingCandidates {
    /// Buffers `candidate`. Returns the token of a freshly opened buffer so the
    /// caller can schedule its expiry; `None` when appended to an existing one.
    pub fn push(&mut self, from: &ParticipantId, candidate: IceCandidate) -> Option<u64> {
        if let Some(buffer) = self.buffers.get_mut(from) {
            buffer.candidates.push(candidate);
            return None;
        }

        self.next_token += 1;
        let token = self.next_token;
        self.buffers.insert(
            from.clone(),
            Buffered {
                token,
                candidates: vec![candidate],
            },
        );
        Some(token)
    }

    /// Hands over everything buffered for `from`, in arrival order.
    pub fn take(&mut self, from: &ParticipantId) -> Vec<IceCandidate> {
        self.buffers
            .remove(from)
            .map(|b| b.candidates)
            .unwrap_or_default()
    }

    /// Drops the buffer opened with `token`. Returns how many candidates were discarded.
    pub fn expire(&mut self, from: &ParticipantId, token: u64) -> usize {
        match self.buffers.get(from) {
            Some(buffer) if buffer.token == token => self
                .buffers
                .remove(from)
                .map_or(0, |b| b.candidates.len()),
            _ => 0,
        }
    }

    pub fn len(&self, from: &ParticipantId) -> usize {
        self.buffers.get(from).map_or(0, |b| b.candidates.len())
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
