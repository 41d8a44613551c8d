//! Property-based tests for hashing and Merkle determinism
