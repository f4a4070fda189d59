use common_crypto::{Hash, NodeAddress};
use protocol::types::{BlockAvailability, BlockHeight};

/// The four states of §4.C's block-sync automaton, carrying exactly the data
/// each state needs to act and nothing more. A peer's advertised range is
/// the `BlockAvailability` it returns in reply to a broadcast request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Car { responses: Vec<BlockAvailability> },
    FinishedCar { responses: Vec<BlockAvailability> },
    WaitingForChunks { peer: NodeAddress, requested: Vec<BlockHeight> },
}

impl SyncState {
    pub fn tag(&self) -> i64 {
        match self {
            SyncState::Idle => 0,
            SyncState::Car { .. } => 1,
            SyncState::FinishedCar { .. } => 2,
            SyncState::WaitingForChunks { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    NoCommitTimerFired,
    CommitNotification,
    AvailabilityResponse(BlockAvailability),
    CollectResponsesTimeout,
    BroadcastFailure,
    PeerChosen { peer: NodeAddress, requested: Vec<BlockHeight> },
    NoAcceptablePeer,
    ChunksReceived,
    ChunksTimeout,
    GossipError,
}

/// The single transition function the whole automaton reduces to. Events
/// that don't apply to the current state are dropped silently, matching the
/// "drain non-matching events" rule in §4.C.
pub fn step(state: SyncState, event: SyncEvent) -> SyncState {
    match (state, event) {
        (SyncState::Idle, SyncEvent::NoCommitTimerFired) => SyncState::Car { responses: Vec::new() },
        (SyncState::Idle, SyncEvent::CommitNotification) => SyncState::Idle,

        (SyncState::Car { responses }, SyncEvent::CommitNotification) => SyncState::Car { responses },
        (SyncState::Car { mut responses }, SyncEvent::AvailabilityResponse(r)) => {
            responses.push(r);
            SyncState::Car { responses }
        }
        (SyncState::Car { responses }, SyncEvent::CollectResponsesTimeout) => SyncState::FinishedCar { responses },
        (SyncState::Car { .. }, SyncEvent::BroadcastFailure) => SyncState::Idle,

        (SyncState::FinishedCar { .. }, SyncEvent::PeerChosen { peer, requested }) => {
            SyncState::WaitingForChunks { peer, requested }
        }
        (SyncState::FinishedCar { .. }, SyncEvent::NoAcceptablePeer) => SyncState::Idle,

        (SyncState::WaitingForChunks { .. }, SyncEvent::ChunksReceived) => SyncState::Idle,
        (SyncState::WaitingForChunks { .. }, SyncEvent::ChunksTimeout) => SyncState::Car { responses: Vec::new() },
        (SyncState::WaitingForChunks { .. }, SyncEvent::GossipError) => SyncState::Car { responses: Vec::new() },

        (state, _unmatched) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(tag: u8) -> BlockAvailability {
        BlockAvailability {
            sender:       NodeAddress([tag; 20]),
            first_height: 1,
            last_height:  10,
            last_hash:    Hash::ZERO,
        }
    }

    #[test]
    fn idle_ticks_into_car_on_no_commit_timeout() {
        let state = step(SyncState::Idle, SyncEvent::NoCommitTimerFired);
        assert_eq!(state, SyncState::Car { responses: Vec::new() });
    }

    #[test]
    fn sync_state_transitions_collect_then_finish() {
        let state = SyncState::Idle;
        let state = step(state, SyncEvent::NoCommitTimerFired);
        assert_eq!(state, SyncState::Car { responses: Vec::new() });

        let injected = response(0xaa);
        let state = step(state, SyncEvent::AvailabilityResponse(injected.clone()));

        let state = step(state, SyncEvent::CollectResponsesTimeout);
        match state {
            SyncState::FinishedCar { responses } => {
                assert_eq!(responses.len(), 1);
                assert_eq!(responses[0].sender, injected.sender);
            }
            other => panic!("expected FinishedCar, got {:?}", other),
        }
    }

    #[test]
    fn commit_notification_during_car_is_absorbed_without_losing_responses() {
        let state = SyncState::Car { responses: vec![response(0x01)] };
        let state = step(state, SyncEvent::CommitNotification);
        assert_eq!(state, SyncState::Car { responses: vec![response(0x01)] });
    }

    #[test]
    fn broadcast_failure_returns_to_idle() {
        let state = SyncState::Car { responses: vec![response(0x01)] };
        assert_eq!(step(state, SyncEvent::BroadcastFailure), SyncState::Idle);
    }

    #[test]
    fn no_acceptable_peer_returns_to_idle() {
        let state = SyncState::FinishedCar { responses: vec![response(0x01)] };
        assert_eq!(step(state, SyncEvent::NoAcceptablePeer), SyncState::Idle);
    }

    #[test]
    fn finished_car_with_chosen_peer_enters_waiting_for_chunks() {
        let state = SyncState::FinishedCar { responses: vec![response(0x01)] };
        let peer = NodeAddress([0x01; 20]);
        let state = step(state, SyncEvent::PeerChosen { peer, requested: vec![11, 12] });
        assert_eq!(state, SyncState::WaitingForChunks { peer, requested: vec![11, 12] });
    }

    #[test]
    fn chunks_timeout_and_gossip_error_both_fall_back_to_fresh_car() {
        let waiting = SyncState::WaitingForChunks { peer: NodeAddress([0x01; 20]), requested: vec![11] };
        assert_eq!(step(waiting.clone(), SyncEvent::ChunksTimeout), SyncState::Car { responses: Vec::new() });
        assert_eq!(step(waiting, SyncEvent::GossipError), SyncState::Car { responses: Vec::new() });
    }

    #[test]
    fn completed_chunks_return_to_idle() {
        let waiting = SyncState::WaitingForChunks { peer: NodeAddress([0x01; 20]), requested: vec![11] };
        assert_eq!(step(waiting, SyncEvent::ChunksReceived), SyncState::Idle);
    }

    #[test]
    fn unmatched_event_is_dropped_in_place() {
        let state = SyncState::Idle;
        assert_eq!(step(state.clone(), SyncEvent::ChunksReceived), state);
    }
}
