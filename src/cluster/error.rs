//! Error types for the leader-only subsystems.
//!
//! # Error Handling Patterns
//!
//! Two patterns, chosen by what the failure means:
//!
//! ## Fail-fast (propagate)
//!
//! Anything that touches persistent state fails fast: a guarded
//! transaction whose leader comparison no longer holds means leadership
//! moved, and the only safe reaction is to stop issuing and abdicate.
//! [`ClusterError::LeadershipLost`] is terminal for the current term.
//!
//! ## Surface on the wire (respond and continue)
//!
//! Validation failures, bootstrap races, and oracle backpressure are
//! normal operation. They map onto typed wire codes via
//! [`ClusterError::to_error_code`] and travel in response bodies with the
//! original correlation id; the connection stays open. The one exception
//! is `NotLeader`: after responding, the server closes the connection so
//! the client re-resolves the leader.

use thiserror::Error;

use crate::error::ErrorCode;
use crate::meta::MetaError;
use crate::types::{RegionId, StoreId};

/// Result type for cluster-layer operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors from leadership, the oracle, the allocator, and cluster state.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// This replica is not the leader.
    #[error("not the cluster leader")]
    NotLeader,

    /// A guarded write failed because the leader key changed hands.
    /// Terminal for this term; triggers abdication.
    #[error("leadership lost during a guarded write")]
    LeadershipLost,

    /// Cluster operation before bootstrap.
    #[error("cluster is not bootstrapped")]
    NotBootstrapped,

    /// A second bootstrap attempt.
    #[error("cluster is already bootstrapped")]
    AlreadyBootstrapped,

    /// A request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The timestamp oracle is not ready to issue.
    #[error("timestamp oracle unavailable")]
    TsoUnavailable,

    /// A timestamp batch exceeded the remaining logical capacity.
    #[error("timestamp batch of {requested} exceeds remaining logical capacity {remaining}")]
    TsoOverflow { requested: u32, remaining: u32 },

    /// No region contains the key.
    #[error("no region found containing the requested key")]
    RegionNotFound,

    /// Unknown store.
    #[error("store {0} not found")]
    StoreNotFound(StoreId),

    /// Unknown region.
    #[error("region {0} not found")]
    RegionUnknown(RegionId),

    /// A pending operation already exists for the region.
    #[error("region {0} already has a pending change-peer")]
    ConflictingOperator(RegionId),

    /// The allocator exhausted its CAS retry budget.
    #[error("id allocator failed to reserve a window after {attempts} attempts")]
    AllocExhausted { attempts: usize },

    /// A meta-store call failed.
    #[error("meta store error: {0}")]
    Meta(#[from] MetaError),

    /// A response body failed to encode.
    #[error("response encoding failed: {0}")]
    Encode(#[from] crate::error::Error),

    /// A persisted record could not be decoded.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl ClusterError {
    /// Map onto the typed wire code carried in response bodies.
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            ClusterError::NotLeader => ErrorCode::NotLeader,
            // A deposed leader cannot distinguish itself from a
            // non-leader as far as the client is concerned.
            ClusterError::LeadershipLost => ErrorCode::NotLeader,
            ClusterError::NotBootstrapped => ErrorCode::NotBootstrapped,
            ClusterError::AlreadyBootstrapped => ErrorCode::AlreadyBootstrapped,
            ClusterError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ClusterError::TsoUnavailable => ErrorCode::TsoUnavailable,
            ClusterError::TsoOverflow { .. } => ErrorCode::TsoOverflow,
            ClusterError::RegionNotFound => ErrorCode::RegionNotFound,
            ClusterError::StoreNotFound(_) => ErrorCode::StoreNotFound,
            ClusterError::RegionUnknown(_) => ErrorCode::InvalidRequest,
            ClusterError::ConflictingOperator(_) => ErrorCode::ConflictingOperator,
            ClusterError::AllocExhausted { .. } => ErrorCode::Internal,
            ClusterError::Meta(_) => ErrorCode::Internal,
            ClusterError::Encode(_) => ErrorCode::Internal,
            ClusterError::Corrupt { .. } => ErrorCode::Internal,
        }
    }

    /// Whether the current leadership term must end over this error.
    pub fn is_fatal_for_term(&self) -> bool {
        matches!(self, ClusterError::LeadershipLost)
    }
}
