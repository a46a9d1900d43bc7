use crate::peer::transport::PeerTransport;
use crate::peer::types::IceCandidate;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Кандидаты, полученные до установки remote description
#[derive(Debug)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
    limit: usize,
}

impl CandidateBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            limit,
        }
    }

    /// false, если буфер полон и кандидат отброшен
    pub fn push(&mut self, candidate: IceCandidate) -> bool {
        if self.pending.len() >= self.limit {
            return false;
        }
        self.pending.push_back(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Забирает все кандидаты в порядке поступления
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.pending.drain(..).collect()
    }
}

/// Результат применения пачки отложенных кандидатов
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub rejected: Vec<(IceCandidate, String)>,
}

/// Применяет все отложенные кандидаты после установки remote description.
/// Ошибка одного кандидата не мешает остальным.
pub async fn apply_pending_candidates(
    peer: &str,
    transport: &dyn PeerTransport,
    buffer: &mut CandidateBuffer,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let candidates = buffer.drain();
    if candidates.is_empty() {
        return outcome;
    }

    debug!(event = "pending_candidates_flush", peer, count = candidates.len(), "Applying pending candidates");
    for candidate in candidates {
        match transport.add_ice_candidate(candidate.clone()).await {
            Ok(()) => outcome.applied += 1,
            Err(e) => {
                warn!(event = "pending_candidate_rejected", peer, error = %e, "Failed to apply pending candidate");
                outcome.rejected.push((candidate, e.to_string()));
            }
        }
    }
    outcome
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateTally {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
    pub other: usize,
}

pub fn analyze_candidates(peer: &str, candidates: &[IceCandidate]) -> CandidateTally {
    let mut tally = CandidateTally::default();

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            tally.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            tally.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            tally.relay += 1;
        } else {
            tally.other += 1;
        }
    }

    info!(
        event = "candidate_analysis",
        peer,
        host = tally.host,
        srflx = tally.srflx,
        relay = tally.relay,
        "Candidate analysis"
    );

    if tally.relay == 0 && !candidates.is_empty() {
        warn!(event = "no_relay_candidates", peer, "No TURN relay candidates found, connection through NAT may fail");
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_arrival_order_and_limit() {
        let mut buffer = CandidateBuffer::new(2);
        assert!(buffer.push(IceCandidate::new("a")));
        assert!(buffer.push(IceCandidate::new("b")));
        assert!(!buffer.push(IceCandidate::new("c")));
        assert_eq!(buffer.len(), 2);

        let drained: Vec<_> = buffer.drain().into_iter().map(|c| c.candidate).collect();
        assert_eq!(drained, ["a", "b"]);
        assert!(buffer.is_empty());
        assert!(buffer.push(IceCandidate::new("d")));
    }

    #[test]
    fn tally_counts_candidate_types() {
        let candidates = [
            IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host"),
            IceCandidate::new("candidate:2 1 udp 1686052607 198.51.100.7 50000 typ srflx raddr 10.0.0.2 rport 50000"),
            IceCandidate::new("candidate:3 1 udp 41885439 203.0.113.9 3478 typ relay raddr 198.51.100.7 rport 50000"),
            IceCandidate::new("candidate:4 1 udp 1 10.0.0.2 9 typ prflx"),
        ];
        let tally = analyze_candidates("bob", &candidates);
        assert_eq!(
            tally,
            CandidateTally {
                host: 1,
                srflx: 1,
                relay: 1,
                other: 1
            }
        );
    }
}
