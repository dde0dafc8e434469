//! Guarded transaction building blocks.
//!
//! A [`Txn`] is the only way state is mutated in the meta store:
//! `if (comparisons) then (operations)`. Every persistent mutation the
//! leader performs carries a comparison against the leader key's current
//! value, so a deposed leader's writes fail without side effect.

use bytes::Bytes;

use super::store::LeaseId;

/// A single comparison evaluated inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compare {
    /// The key's creation revision equals the given value.
    /// `create_revision == 0` means "the key does not exist".
    CreateRevision { key: String, revision: i64 },
    /// The key exists and its value equals the given bytes.
    Value { key: String, value: Bytes },
}

impl Compare {
    /// Require that `key` does not exist.
    pub fn absent(key: impl Into<String>) -> Self {
        Compare::CreateRevision {
            key: key.into(),
            revision: 0,
        }
    }

    /// Require that `key` currently holds exactly `value`.
    pub fn value_eq(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Compare::Value {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A mutation applied when all comparisons hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    /// Write `value` at `key`, optionally attached to a lease.
    Put {
        key: String,
        value: Bytes,
        lease: Option<LeaseId>,
    },
    /// Remove `key`.
    Delete { key: String },
}

impl TxnOp {
    /// Plain put without a lease.
    pub fn put(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        TxnOp::Put {
            key: key.into(),
            value: value.into(),
            lease: None,
        }
    }

    /// Put attached to a lease; the key vanishes when the lease dies.
    pub fn put_with_lease(key: impl Into<String>, value: impl Into<Bytes>, lease: LeaseId) -> Self {
        TxnOp::Put {
            key: key.into(),
            value: value.into(),
            lease: Some(lease),
        }
    }

    /// Delete a key.
    pub fn delete(key: impl Into<String>) -> Self {
        TxnOp::Delete { key: key.into() }
    }
}

/// A compare-then-apply transaction.
#[derive(Debug, Clone, Default)]
pub struct Txn {
    pub when: Vec<Compare>,
    pub then: Vec<TxnOp>,
}

impl Txn {
    /// Start an empty transaction.
    pub fn new() -> Self {
        Txn::default()
    }

    /// Add a comparison.
    pub fn when(mut self, cmp: Compare) -> Self {
        self.when.push(cmp);
        self
    }

    /// Add an operation to apply when all comparisons hold.
    pub fn then(mut self, op: TxnOp) -> Self {
        self.then.push(op);
        self
    }

    /// Add several operations at once.
    pub fn then_all(mut self, ops: impl IntoIterator<Item = TxnOp>) -> Self {
        self.then.extend(ops);
        self
    }
}

/// Result of a transaction commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnOutcome {
    /// Whether every comparison held and the operations were applied.
    pub succeeded: bool,
}
