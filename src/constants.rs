//! Centralized protocol and configuration constants.
//!
//! This module consolidates the magic numbers used throughout the placement
//! driver. Having them in one place makes it easier to:
//!
//! - Understand the protocol constraints
//! - Update values consistently
//! - Document the rationale for each constant
//!
//! # Categories
//!
//! - **Protocol Constants**: wire framing sizes and limits
//! - **Leadership Constants**: lease and timestamp-oracle timing
//! - **Allocator Constants**: ID window sizing and retry bounds

// =============================================================================
// Protocol Constants
// =============================================================================

/// Magic value opening every frame ("PL" in ASCII).
///
/// A mismatch means the peer is not speaking this protocol and the
/// connection is dropped immediately.
pub const FRAME_MAGIC: u16 = 0x504C;

/// Current wire protocol version.
pub const FRAME_VERSION: u16 = 1;

/// Size of the fixed frame header:
/// magic (2) + version (2) + correlation id (8) + payload length (4).
pub const FRAME_HEADER_SIZE: usize = 16;

/// Default maximum payload size for a single frame (4 MB).
///
/// Placement-driver messages are small (timestamps, IDs, region metadata);
/// anything near this bound is malformed or hostile. Over-cap frames close
/// the connection. Can be overridden via `Config.max_frame_size`.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Read buffer size for client connections.
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Write buffer size for client connections.
pub const WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// Maximum allowed array element count in protocol parsing.
///
/// Prevents memory exhaustion from malformed messages that claim to carry
/// millions of elements. 100,000 is generous but bounded.
pub const MAX_PROTOCOL_ARRAY_SIZE: i32 = 100_000;

// =============================================================================
// Leadership Constants
// =============================================================================

/// Default leader lease duration in seconds.
///
/// The leader key in the meta store is attached to a lease of this length;
/// if the leader stops keeping it alive, the key expires and followers
/// campaign. Shorter leases mean faster failover but less tolerance for
/// keep-alive hiccups.
pub const DEFAULT_LEADER_LEASE_SECS: u64 = 3;

/// Default interval between timestamp-oracle checkpoint writes (3 s).
///
/// The oracle persists `physical + save_interval` as the high-water mark it
/// promises never to cross, so timestamps stay monotonic across failover
/// without a meta-store write per tick.
pub const DEFAULT_TSO_SAVE_INTERVAL_MS: u64 = 3000;

/// Default timestamp-oracle advance tick (50 ms).
///
/// Each tick moves the in-memory physical clock forward and, when less than
/// half the save interval of headroom remains, refreshes the checkpoint.
pub const DEFAULT_TSO_UPDATE_STEP_MS: u64 = 50;

/// Maximum logical counter value within one physical millisecond (2^18).
///
/// A `Tso` request asking for more timestamps than the remaining logical
/// capacity is rejected rather than rolling the physical clock forward.
pub const DEFAULT_TSO_MAX_LOGICAL: u32 = 1 << 18;

/// Default timeout for every meta-store call (10 s).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Pause between failed campaign rounds.
///
/// Avoids hot-looping against the meta store when campaigning repeatedly
/// fails, e.g. while another candidate holds a fresh lease.
pub const CAMPAIGN_RETRY_DELAY_MS: u64 = 200;

// =============================================================================
// Allocator Constants
// =============================================================================

/// Default number of IDs reserved per allocator window (1000).
///
/// Larger windows mean fewer meta-store round trips but more IDs leaked
/// when leadership moves mid-window. Leaked IDs are never reused; the
/// allocator trades density for a round trip per `alloc_step` issuances.
pub const DEFAULT_ALLOC_STEP: u64 = 1000;

/// Bound on consecutive CAS attempts when reserving an allocator window.
///
/// Contention on the allocator key is only expected briefly around leader
/// changes; persistent failure past this bound is surfaced as a fatal
/// allocator error.
pub const MAX_ALLOC_RESERVE_ATTEMPTS: usize = 8;

// =============================================================================
// Cluster Constants
// =============================================================================

/// Replica count written into the cluster config at bootstrap (3).
///
/// Adjustable afterwards via `PutClusterConfig`.
pub const DEFAULT_MAX_REPLICAS: u32 = 3;
