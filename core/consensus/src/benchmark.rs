use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common_crypto::{node_address_from_public_key_bytes, sha256, verify, Hash, NodeAddress, PrivateKey};
use common_logger::Metrics;
use parking_lot::{Mutex, RwLock};
use protocol::codec::FixedCodec;
use protocol::traits::{BlockStorage, ConsensusAlgorithm, ConsensusContext, Gossip, MessageHandler};
use protocol::types::{BlockHeight, BlockPair, BlockProof, CommitteeMember};
use protocol::ProtocolResult;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ConsensusError;

pub const BENCHMARK_TOPIC: &str = "benchmark-round";

/// Everything the leader broadcasts or a follower replies with (§4.G).
/// `Commit` is admitted only from the transport-authenticated constant
/// leader address; `Committed` carries its own pubkey and signature over
/// the signable payload, since votes can arrive from any committee member
/// and the voter's identity has to be established from the message itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BenchmarkMessage {
    Commit { block_pair: BlockPair, signature: Bytes },
    Committed { height: BlockHeight, accepted: bool, signer_pubkey: Bytes, signature: Bytes },
}

impl BenchmarkMessage {
    fn commit_signable(block_pair: &BlockPair) -> Hash {
        block_pair.hash()
    }

    fn committed_signable(height: BlockHeight, accepted: bool) -> Hash {
        sha256(&[&height.to_le_bytes(), &[accepted as u8]])
    }
}

/// One voter's standing vote; only the latest vote from each address counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteStatus {
    pub accepted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorum {
    pub height: BlockHeight,
}

/// Owns the voter set for one height and tells the caller the moment weight
/// crosses the configured quorum percentage. Replaces a mutex-guarded map
/// plus a side-channel notification with a single synchronized accumulator.
pub struct QuorumTally {
    height:             BlockHeight,
    committee:          Vec<CommitteeMember>,
    total_weight:       u64,
    required_percentage: u8,
    votes:              Mutex<HashMap<NodeAddress, VoteStatus>>,
}

impl QuorumTally {
    pub fn new(height: BlockHeight, committee: Vec<CommitteeMember>, required_percentage: u8) -> Self {
        let total_weight = committee.iter().map(|m| m.weight).sum();
        QuorumTally { height, committee, total_weight, required_percentage, votes: Mutex::new(HashMap::new()) }
    }

    /// Records `status` for `addr` and returns `Some(Quorum)` the first time
    /// the accepted weight crosses the required percentage of total weight.
    /// Votes from addresses outside the committee are ignored.
    pub fn add_voter(&self, addr: NodeAddress, status: VoteStatus) -> Option<Quorum> {
        if !self.committee.iter().any(|m| m.address == addr) {
            return None;
        }
        if self.total_weight == 0 {
            return None;
        }

        let mut votes = self.votes.lock();
        let was_already_counted = votes.get(&addr).map(|v| v.accepted) == Some(true);
        votes.insert(addr, status);

        if was_already_counted {
            return None;
        }

        let accepted_weight: u64 = votes
            .iter()
            .filter(|(_, v)| v.accepted)
            .filter_map(|(a, _)| self.committee.iter().find(|m| &m.address == a))
            .map(|m| m.weight)
            .sum();

        if accepted_weight.saturating_mul(100) >= self.total_weight.saturating_mul(self.required_percentage as u64) {
            Some(Quorum { height: self.height })
        } else {
            None
        }
    }
}

pub struct BenchmarkConfig {
    pub node_address:            NodeAddress,
    pub signing_key:             Arc<PrivateKey>,
    pub constant_leader:         Option<NodeAddress>,
    pub retry_interval:          Duration,
    pub required_quorum_percentage: u8,
}

/// The constant-leader round (§4.G): the leader assembles and broadcasts a
/// block pair, followers validate and persist it and reply with a signed
/// vote, the leader tallies weighted votes until quorum and advances. No
/// view change: a dead leader stalls the chain, which is acceptable for a
/// benchmark algorithm.
pub struct BenchmarkConsensus {
    config:  BenchmarkConfig,
    context: Arc<dyn ConsensusContext>,
    storage: Arc<dyn BlockStorage>,
    gossip:  Arc<dyn Gossip>,
    metrics: Arc<dyn Metrics>,
    height:  RwLock<BlockHeight>,
    tally:   RwLock<Option<Arc<QuorumTally>>>,
    quorum_tx: watch::Sender<Option<Quorum>>,
    quorum_rx: watch::Receiver<Option<Quorum>>,
}

impl BenchmarkConsensus {
    pub fn new(
        config: BenchmarkConfig,
        context: Arc<dyn ConsensusContext>,
        storage: Arc<dyn BlockStorage>,
        gossip: Arc<dyn Gossip>,
        metrics: Arc<dyn Metrics>,
    ) -> Arc<Self> {
        let (quorum_tx, quorum_rx) = watch::channel(None);
        Arc::new(BenchmarkConsensus {
            config,
            context,
            storage,
            gossip,
            metrics,
            height: RwLock::new(0),
            tally: RwLock::new(None),
            quorum_tx,
            quorum_rx,
        })
    }

    fn is_leader(&self) -> bool {
        self.config.constant_leader.map(|l| l == self.config.node_address).unwrap_or(false)
    }

    async fn committee_for(&self, height: BlockHeight) -> ProtocolResult<Vec<CommitteeMember>> {
        // Reference time for committee selection is the height itself until
        // a richer notion of epoch boundaries is wired in.
        self.context.select_committee(height).await
    }

    async fn run_leader(&self) -> ProtocolResult<()> {
        loop {
            let tx_block = self.context.request_new_transactions_block().await?;
            let results_block = self.context.request_new_results_block(&tx_block).await?;
            let height = tx_block.header.height;
            let block_pair = BlockPair { transactions_block: tx_block, results_block };

            let committee = self.committee_for(height).await?;
            let tally = Arc::new(QuorumTally::new(height, committee, self.config.required_quorum_percentage));
            *self.tally.write() = Some(Arc::clone(&tally));
            let _ = self.quorum_tx.broadcast(None);

            let signature = Bytes::from(
                self.config.signing_key.sign(BenchmarkMessage::commit_signable(&block_pair).as_bytes()),
            );
            let message = BenchmarkMessage::Commit { block_pair, signature };
            self.gossip.broadcast(BENCHMARK_TOPIC, message.encode_fixed()?).await?;

            let mut quorum_rx = self.quorum_rx.clone();
            // The fresh clone's first `recv()` yields the just-reset `None`
            // immediately, so the retry loop only breaks on a genuine change.
            let _ = quorum_rx.recv().await;
            loop {
                tokio::select! {
                    changed = quorum_rx.recv() => {
                        if let Some(Some(quorum)) = changed {
                            if quorum.height == height {
                                break;
                            }
                        }
                    }
                    _ = tokio::time::delay_for(self.config.retry_interval) => {
                        let resend = BenchmarkMessage::Commit {
                            block_pair: self.storage
                                .get_block_by_height(height)
                                .await?
                                .ok_or(ConsensusError::MissingBlock(height))?,
                            signature: Bytes::new(),
                        };
                        let _ = self.gossip.broadcast(BENCHMARK_TOPIC, resend.encode_fixed()?).await;
                    }
                }
            }

            *self.height.write() = height;
            self.metrics.gauge("consensus.height", height as i64);
        }
    }

    async fn handle_commit(&self, block_pair: BlockPair, sender: NodeAddress) -> ProtocolResult<()> {
        if Some(sender) != self.config.constant_leader {
            return Err(ConsensusError::UntrustedLeader(sender).into());
        }

        let accepted = self.context.validate_transactions_block(&block_pair.transactions_block).await.is_ok()
            && self
                .context
                .validate_results_block(&block_pair.transactions_block, &block_pair.results_block)
                .await
                .is_ok();

        let height = block_pair.height();
        if accepted {
            let mut pair = block_pair;
            pair.transactions_block.block_proof = BlockProof::Benchmark { signatures: Vec::new() };
            self.storage.commit_block(pair).await?;
            *self.height.write() = height;
        }

        let signature = Bytes::from(
            self.config.signing_key.sign(BenchmarkMessage::committed_signable(height, accepted).as_bytes()),
        );
        let signer_pubkey = Bytes::from(self.config.signing_key.public_key().as_bytes().to_vec());
        let reply = BenchmarkMessage::Committed { height, accepted, signer_pubkey, signature };
        self.gossip.unicast(sender, BENCHMARK_TOPIC, reply.encode_fixed()?).await
    }

    /// Verifies the vote's signature against the pubkey it carries and
    /// derives the voter's address from that same verified pubkey, never
    /// from a self-declared field - a forged address in the payload cannot
    /// pass a signature made with a different key. Committee membership
    /// (checked inside `add_voter`) is the remaining admission gate.
    fn handle_committed(&self, height: BlockHeight, accepted: bool, signer_pubkey: &[u8], signature: &[u8]) {
        if verify(signer_pubkey, BenchmarkMessage::committed_signable(height, accepted).as_bytes(), signature).is_err() {
            return;
        }
        let addr = match node_address_from_public_key_bytes(signer_pubkey) {
            Ok(addr) => addr,
            Err(_) => return,
        };

        let tally = match self.tally.read().clone() {
            Some(t) if t.height == height => t,
            _ => return,
        };
        if let Some(quorum) = tally.add_voter(addr, VoteStatus { accepted }) {
            let _ = self.quorum_tx.broadcast(Some(quorum));
        }
    }
}

struct BenchmarkMessageHandler {
    node: Arc<BenchmarkConsensus>,
}

#[async_trait]
impl MessageHandler for BenchmarkMessageHandler {
    async fn handle(&self, sender: NodeAddress, _topic: String, data: Bytes) {
        let message = match BenchmarkMessage::decode_fixed(data) {
            Ok(m) => m,
            Err(_) => return,
        };
        match message {
            BenchmarkMessage::Commit { block_pair, .. } => {
                let _ = self.node.handle_commit(block_pair, sender).await;
            }
            BenchmarkMessage::Committed { height, accepted, signer_pubkey, signature } => {
                self.node.handle_committed(height, accepted, &signer_pubkey, &signature);
            }
        }
    }
}

#[async_trait]
impl ConsensusAlgorithm for BenchmarkConsensus {
    async fn run(&self) -> ProtocolResult<()> {
        if self.is_leader() {
            self.run_leader().await
        } else {
            std::future::pending().await
        }
    }

    fn current_height(&self) -> BlockHeight {
        *self.height.read()
    }
}

/// Registers the node's listener on the benchmark topic. Call once during
/// bootstrap before `run` so follower replies are never dropped.
pub fn register(node: Arc<BenchmarkConsensus>, gossip: &dyn Gossip) {
    gossip.register_listener(BENCHMARK_TOPIC, Arc::new(BenchmarkMessageHandler { node }));
}

#[cfg(test)]
mod tests {
    use common_crypto::PrivateKey;

    use super::*;

    fn member(key: &PrivateKey, weight: u64) -> CommitteeMember {
        CommitteeMember { address: key.node_address(), weight }
    }

    #[test]
    fn quorum_is_reached_once_weighted_majority_accepts() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        let c = PrivateKey::generate();
        let committee = vec![member(&a, 34), member(&b, 33), member(&c, 33)];
        let tally = QuorumTally::new(1, committee, 67);

        assert_eq!(tally.add_voter(a.node_address(), VoteStatus { accepted: true }), None);
        assert_eq!(
            tally.add_voter(b.node_address(), VoteStatus { accepted: true }),
            Some(Quorum { height: 1 })
        );
    }

    #[test]
    fn votes_from_outside_the_committee_are_ignored() {
        let a = PrivateKey::generate();
        let outsider = PrivateKey::generate();
        let tally = QuorumTally::new(1, vec![member(&a, 100)], 67);

        assert_eq!(tally.add_voter(outsider.node_address(), VoteStatus { accepted: true }), None);
    }

    #[test]
    fn rejecting_vote_does_not_count_toward_quorum() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        let tally = QuorumTally::new(1, vec![member(&a, 50), member(&b, 50)], 67);

        assert_eq!(tally.add_voter(a.node_address(), VoteStatus { accepted: false }), None);
        assert_eq!(tally.add_voter(b.node_address(), VoteStatus { accepted: true }), None);
    }

    #[test]
    fn repeated_accept_from_the_same_voter_does_not_re_trigger_quorum() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        let tally = QuorumTally::new(1, vec![member(&a, 60), member(&b, 40)], 51);

        assert_eq!(tally.add_voter(a.node_address(), VoteStatus { accepted: true }), Some(Quorum { height: 1 }));
        assert_eq!(tally.add_voter(a.node_address(), VoteStatus { accepted: true }), None);
    }

    #[test]
    fn zero_weight_committee_never_reaches_quorum() {
        let a = PrivateKey::generate();
        let committee = vec![CommitteeMember { address: a.node_address(), weight: 0 }];
        let tally = QuorumTally::new(1, committee, 1);

        assert_eq!(tally.add_voter(a.node_address(), VoteStatus { accepted: true }), None);
    }
}
