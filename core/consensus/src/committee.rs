use std::convert::TryInto;

use common_crypto::sha256;
use protocol::types::{CommitteeMember, TimestampSeconds};

use crate::error::ConsensusError;

/// One PRF draw: `sha256(ref_time)` re-hashed with an appended counter,
/// the first 8 digest bytes read as a little-endian u64 (§4.F).
fn draw(reference_time: TimestampSeconds, counter: u64) -> u64 {
    let base = sha256(&[&reference_time.to_le_bytes()]);
    let digest = sha256(&[base.as_ref(), &counter.to_le_bytes()]);
    u64::from_le_bytes(digest.as_bytes()[0..8].try_into().expect("sha256 digest is 32 bytes"))
}

/// Deterministic Fisher-Yates permutation of `0..n`, seeded by `reference_time`.
/// Every honest node computing the same `reference_time` derives the same order.
pub fn fisher_yates_order(n: usize, reference_time: TimestampSeconds) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut counter = 0u64;
    for i in (1..n).rev() {
        let r = draw(reference_time, counter);
        counter += 1;
        let j = (r % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
    order
}

/// Reindexes `members` by `order`, carrying each member's weight along with
/// its address so a reordered committee keeps its weights lined up with the
/// addresses they belong to.
pub fn apply_committee_order(members: &[CommitteeMember], order: &[usize]) -> Result<Vec<CommitteeMember>, ConsensusError> {
    if order.len() != members.len() {
        return Err(ConsensusError::CommitteeLengthMismatch { members: members.len(), order: order.len() });
    }
    Ok(order.iter().map(|&i| members[i].clone()).collect())
}
