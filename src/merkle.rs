//! Merkle roots and inclusion proofs over hex leaf hashes.
//!
//! Parent = `Hash(left ++ right)` where the operands are the hex digests as
//! text. A level with an odd count carries its last node up unchanged; it is
//! never paired with a copy of itself. This changes the root compared to the
//! duplicate-last-leaf scheme and must be kept as is, since roots are compared
//! against values computed by the ledger.

use crate::canonical::hash_pair;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One step of a Merkle path: the sibling hash and the side it sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStep {
    /// Sibling is on the left: `Hash(sibling ++ current)`.
    Left(String),
    /// Sibling is on the right: `Hash(current ++ sibling)`.
    Right(String),
}

impl ProofStep {
    /// Apply this step to the running hash.
    pub fn apply(&self, current: &str) -> String {
        match self {
            ProofStep::Left(sibling) => hash_pair(sibling, current),
            ProofStep::Right(sibling) => hash_pair(current, sibling),
        }
    }
}

/// Inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub path: Vec<ProofStep>,
}

/// Outcome of checking a proof against an expected root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleVerification {
    pub verified: bool,
    pub calculated_root: String,
    pub expected_root: String,
}

/// Recompute the root implied by `leaf_hash` and `path`.
pub fn compute_root(leaf_hash: &str, path: &[ProofStep]) -> String {
    path.iter()
        .fold(leaf_hash.to_string(), |current, step| step.apply(&current))
}

/// Check a proof against an expected root. Pure; no I/O.
pub fn verify_proof(leaf_hash: &str, path: &[ProofStep], expected_root: &str) -> MerkleVerification {
    let calculated_root = compute_root(leaf_hash, path);
    let verified = calculated_root == expected_root;
    debug!(
        verified,
        calculated_root = %calculated_root,
        expected_root = %expected_root,
        "Merkle proof checked"
    );
    MerkleVerification {
        verified,
        calculated_root,
        expected_root: expected_root.to_string(),
    }
}

/// Build the next level up from `level`.
fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            // Odd count: carried up as is.
            _ => pair[0].clone(),
        })
        .collect()
}

/// Root of an ordered list of leaf hashes.
///
/// Returns `None` for an empty list and the leaf itself for a single leaf.
pub fn merkle_root(leaves: &[String]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.pop()
}

/// Inclusion proof for `leaves[index]`, consistent with [`merkle_root`].
///
/// A node carried up unchanged contributes no step at that level.
pub fn build_proof(leaves: &[String], index: usize) -> Option<MerkleProof> {
    let leaf_hash = leaves.get(index)?.clone();
    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;

    while level.len() > 1 {
        if position % 2 == 1 {
            path.push(ProofStep::Left(level[position - 1].clone()));
        } else if position + 1 < level.len() {
            path.push(ProofStep::Right(level[position + 1].clone()));
        }
        level = next_level(&level);
        position /= 2;
    }

    Some(MerkleProof { leaf_hash, path })
}
