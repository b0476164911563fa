//! Metric helpers for `hivewire`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::kind::FrameKind;

/// Name of the gauge tracking sessions with a live cell connection.
pub const SESSIONS_ACTIVE: &str = "hivewire_sessions_active";
/// Name of the gauge tracking bands attached to a session.
pub const BANDS_ACTIVE: &str = "hivewire_bands_active";
/// Name of the counter tracking frames read or written.
pub const FRAMES_PROCESSED: &str = "hivewire_frames_processed_total";
/// Name of the counter tracking connections closed for a protocol violation.
pub const VIOLATIONS_TOTAL: &str = "hivewire_protocol_violations_total";
/// Name of the counter tracking successful mount registrations.
pub const MOUNTS_REGISTERED: &str = "hivewire_mounts_registered_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames read from the peer.
    Inbound,
    /// Frames written to the peer.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Increment the active bands gauge.
pub fn inc_bands() {
    #[cfg(feature = "metrics")]
    gauge!(BANDS_ACTIVE).increment(1.0);
}

/// Decrement the active bands gauge.
pub fn dec_bands() {
    #[cfg(feature = "metrics")]
    gauge!(BANDS_ACTIVE).decrement(1.0);
}

/// Record a processed frame of `kind` for the given direction.
pub fn inc_frames(direction: Direction, kind: FrameKind) {
    #[cfg(feature = "metrics")]
    counter!(
        FRAMES_PROCESSED,
        "direction" => direction.as_str(),
        "kind" => kind.name()
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, kind);
}

/// Record a connection closed for a protocol violation.
pub fn inc_violations() {
    #[cfg(feature = "metrics")]
    counter!(VIOLATIONS_TOTAL).increment(1);
}

/// Record a mount accepted into the mount table.
pub fn inc_mounts() {
    #[cfg(feature = "metrics")]
    counter!(MOUNTS_REGISTERED).increment(1);
}
