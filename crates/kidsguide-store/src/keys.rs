//! Key encoding for `RocksDB` column families.

use kidsguide_core::{HistoryEntryId, SessionId, VenueId};

/// Entitlement key: the venue id bytes.
#[must_use]
pub fn entitlement_key(venue_id: &VenueId) -> Vec<u8> {
    venue_id.as_bytes().to_vec()
}

/// History key: `venue_id (16 bytes) || entry_id (16 bytes)`.
///
/// Entry ids are ULIDs, so a venue's entries iterate in creation order.
#[must_use]
pub fn history_key(venue_id: &VenueId, entry_id: &HistoryEntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(venue_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Prefix for iterating a venue's history.
#[must_use]
pub fn history_prefix(venue_id: &VenueId) -> Vec<u8> {
    venue_id.as_bytes().to_vec()
}

/// Session key: the session id bytes.
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_key_starts_with_prefix() {
        let venue_id = VenueId::generate();
        let entry_id = HistoryEntryId::generate();
        let key = history_key(&venue_id, &entry_id);

        assert_eq!(key.len(), 32);
        assert!(key.starts_with(&history_prefix(&venue_id)));
        assert_eq!(&key[16..], entry_id.to_bytes());
    }
}
