//! Metric helpers for `binrelay`.
//!
//! This module defines metric names and simple helper functions wrapping
//! the [`metrics`](https://docs.rs/metrics) crate. Exporting is left to
//! the embedding process.

use metrics::{counter, gauge};

/// Name of the gauge tracking active master-originated links.
pub const MASTER_CONNECTIONS_ACTIVE: &str = "binrelay_master_connections_active";
/// Name of the counter tracking relayed binlog commands.
pub const FRAMES_RELAYED: &str = "binrelay_frames_relayed_total";
/// Name of the counter tracking connection-fatal errors.
pub const ERRORS_TOTAL: &str = "binrelay_errors_total";

/// Increment the active master connections gauge.
pub fn inc_master_connections() { gauge!(MASTER_CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the active master connections gauge.
pub fn dec_master_connections() { gauge!(MASTER_CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record one relayed binlog command.
pub fn inc_frames() { counter!(FRAMES_RELAYED).increment(1); }

/// Record a connection-fatal error.
pub fn inc_errors() { counter!(ERRORS_TOTAL).increment(1); }
