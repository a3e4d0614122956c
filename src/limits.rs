//! Hard caps that keep a single allocator instance bounded.

use std::time::Duration;

/// Max events one engine will track.
pub const MAX_EVENTS: usize = 10_000;

/// Max byte length of an event name.
pub const MAX_NAME_LEN: usize = 256;

/// Max byte length of a client identity.
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Max seats a single event may be created with.
pub const MAX_SEATS_PER_EVENT: u32 = 1_000_000;

/// Max clients waiting on one event.
pub const MAX_WAITLIST_LEN: usize = 100_000;

/// Max byte length of one protocol line.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Longest confirmation window a hold can be given.
pub const MAX_HOLD_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Max lapsed holds one event remembers for stale-confirmation answers.
pub const MAX_LAPSED_PER_EVENT: usize = 10_000;

/// Delay before retrying an expiry whose save failed.
pub const EXPIRY_RETRY_MS: u64 = 1_000;
