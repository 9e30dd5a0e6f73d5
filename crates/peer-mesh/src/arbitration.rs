//! Duplicate connection arbitration.
//!
//! Two nodes may dial each other at the same moment, leaving each side with an
//! outbound and an inbound socket for the same pair. Both sides evaluate
//! [`keep_existing`] independently and, with no further message exchange,
//! agree on the same surviving socket.

/// Decide whether the active connection survives a challenger.
///
/// `existing_is_local` is true when this node dialed the active connection.
/// Ids are given from the evaluating node's perspective.
pub fn keep_existing(
    existing_serial: u64,
    existing_is_local: bool,
    challenger_serial: u64,
    local_peer_id: &str,
    remote_peer_id: &str,
) -> bool {
    if existing_serial != challenger_serial {
        // The most recent attempt wins
        return existing_serial > challenger_serial;
    }

    // Simultaneous dial: the connection initiated by the lower id survives
    if local_peer_id < remote_peer_id {
        existing_is_local
    } else {
        !existing_is_local
    }
}
