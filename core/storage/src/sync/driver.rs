use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_crypto::NodeAddress;
use common_logger::Metrics;
use protocol::shutdown::CancellationToken;
use protocol::traits::BlockStorage;
use protocol::types::{BlockAvailability, BlockHeight, BlockPair};
use tokio::sync::mpsc;

use super::state::{step, SyncEvent, SyncState};

/// Side effects the state machine needs from the outside world: sending the
/// availability broadcast, pulling a batch of blocks from a chosen peer, and
/// validating+committing each block once it arrives. Kept as a trait so the
/// pure transitions in `state.rs` stay testable without a network.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn broadcast_availability_request(&self, since_height: BlockHeight, descending: bool) -> bool;

    async fn request_batch(&self, peer: NodeAddress, heights: &[BlockHeight]) -> Option<Vec<BlockPair>>;
}

pub struct SyncConfig {
    pub no_commit_interval:             Duration,
    pub collect_response_timeout:       Duration,
    pub collect_chunks_timeout:         Duration,
    pub num_blocks_in_batch:            u32,
    pub reference_max_allowed_distance: u64,
    pub descending:                     bool,
}

fn pick_best_peer(
    responses: &[BlockAvailability],
    local_reference_time: u64,
    max_allowed_distance: u64,
) -> Option<&BlockAvailability> {
    responses
        .iter()
        .filter(|r| {
            let distance = if r.last_height > local_reference_time {
                r.last_height - local_reference_time
            } else {
                local_reference_time - r.last_height
            };
            distance <= max_allowed_distance
        })
        .max_by(|a, b| a.last_height.cmp(&b.last_height).then_with(|| a.last_hash.cmp(&b.last_hash)))
}

/// Outcome of waiting in `Idle`: either the event channel closed or the
/// shutdown token fired (both terminal), the no-commit timer elapsed, or an
/// event arrived to be matched against the current state's interest.
enum Wait {
    Terminate,
    TimerFired,
    Event(SyncEvent),
}

/// Drives the block-sync automaton for the lifetime of the node. Reduces
/// every external happening to a `SyncEvent`, feeds it through the pure
/// `step` function, and performs whatever side effect the newly entered
/// state calls for.
pub async fn run<T: SyncTransport>(
    transport: Arc<T>,
    storage: Arc<dyn BlockStorage>,
    mut events: mpsc::Receiver<SyncEvent>,
    config: SyncConfig,
    shutdown: CancellationToken,
    metrics: Arc<dyn Metrics>,
) {
    let mut state = SyncState::Idle;

    loop {
        if shutdown.is_cancelled() {
            return;
        }
        metrics.gauge("sync.state", state.tag());

        state = match state {
            SyncState::Idle => match wait(&mut events, config.no_commit_interval, &shutdown).await {
                Wait::Terminate => return,
                Wait::TimerFired => step(SyncState::Idle, SyncEvent::NoCommitTimerFired),
                Wait::Event(_) => SyncState::Idle,
            },

            SyncState::Car { responses } => {
                let top = storage.top_height().await.unwrap_or(0);
                let ok = transport.broadcast_availability_request(top, config.descending).await;
                if !ok {
                    step(SyncState::Car { responses }, SyncEvent::BroadcastFailure)
                } else {
                    match collect_responses(responses, &mut events, config.collect_response_timeout, &shutdown).await {
                        Some(next) => next,
                        None => return,
                    }
                }
            }

            SyncState::FinishedCar { responses } => {
                let local_reference_time = storage.top_height().await.unwrap_or(0);
                match pick_best_peer(&responses, local_reference_time, config.reference_max_allowed_distance) {
                    Some(best) => {
                        let start = local_reference_time + 1;
                        let batch_span = u64::from(config.num_blocks_in_batch).saturating_sub(1);
                        let end = std::cmp::min(best.last_height, start + batch_span);
                        let requested: Vec<BlockHeight> = if config.descending {
                            (start..=end).rev().collect()
                        } else {
                            (start..=end).collect()
                        };
                        step(
                            SyncState::FinishedCar { responses: responses.clone() },
                            SyncEvent::PeerChosen { peer: best.sender, requested },
                        )
                    }
                    None => step(SyncState::FinishedCar { responses }, SyncEvent::NoAcceptablePeer),
                }
            }

            SyncState::WaitingForChunks { peer, requested } => {
                let fetch = transport.request_batch(peer, &requested);
                let outcome = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::delay_for(config.collect_chunks_timeout) => None,
                    blocks = fetch => blocks,
                };
                match outcome {
                    None => step(SyncState::WaitingForChunks { peer, requested }, SyncEvent::ChunksTimeout),
                    Some(blocks) => {
                        let mut failed = false;
                        for block in blocks {
                            if storage.commit_block(block).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            step(SyncState::WaitingForChunks { peer, requested }, SyncEvent::GossipError)
                        } else {
                            step(SyncState::WaitingForChunks { peer, requested }, SyncEvent::ChunksReceived)
                        }
                    }
                }
            }
        };
    }
}

/// Waits for either the no-commit timer or an incoming event while idle.
async fn wait(events: &mut mpsc::Receiver<SyncEvent>, no_commit_interval: Duration, shutdown: &CancellationToken) -> Wait {
    tokio::select! {
        _ = shutdown.cancelled() => Wait::Terminate,
        _ = tokio::time::delay_for(no_commit_interval) => Wait::TimerFired,
        event = events.recv() => match event {
            Some(event) => Wait::Event(event),
            None => Wait::Terminate,
        },
    }
}

/// Collects availability responses until `collect_response_timeout` fires,
/// discarding anything else (commit notifications included, per §4.C).
/// Returns `None` on shutdown or a closed event channel.
async fn collect_responses(
    mut responses: Vec<BlockAvailability>,
    events: &mut mpsc::Receiver<SyncEvent>,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> Option<SyncState> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let now = tokio::time::Instant::now();
        let remaining = if deadline > now { deadline - now } else { Duration::from_secs(0) };
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::delay_for(remaining) => {
                return Some(step(SyncState::Car { responses }, SyncEvent::CollectResponsesTimeout));
            }
            event = events.recv() => match event {
                Some(SyncEvent::AvailabilityResponse(r)) => responses.push(r),
                Some(_) => {}
                None => return None,
            },
        }
    }
}
