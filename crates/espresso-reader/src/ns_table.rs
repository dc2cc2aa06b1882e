//! Namespace table decoding.
//!
//! Wire format: little-endian `u32` entry count, then `count` 8-byte
//! entries whose first 4 bytes are the namespace id. The remaining 4 bytes
//! of each entry (the payload offset) are not needed here.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("namespace table truncated: {len} bytes for {count} entries")]
pub struct NsTableError {
    len: usize,
    count: u32,
}

/// Namespace ids present in a block, in table order.
pub fn parse_namespace_ids(table: &[u8]) -> Result<Vec<u32>, NsTableError> {
    let header: [u8; 4] = table
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(NsTableError {
            len: table.len(),
            count: 0,
        })?;
    let count = u32::from_le_bytes(header);

    if table.len() < 4 + 8 * count as usize {
        return Err(NsTableError {
            len: table.len(),
            count,
        });
    }

    let mut ids = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 4 + 8 * i;
        let id = u32::from_le_bytes(table[at..at + 4].try_into().expect("4-byte slice"));
        ids.push(id);
    }
    Ok(ids)
}

/// Builds a table for tests and tooling; inverse of [`parse_namespace_ids`].
pub fn build_namespace_table(ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 8 * ids.len());
    out.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    for (i, id) in ids.iter().enumerate() {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(i as u32).to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let ids = [7u32, 55_555, 1];
        let table = build_namespace_table(&ids);
        assert_eq!(parse_namespace_ids(&table).unwrap(), ids);
    }

    #[test]
    fn test_empty_table() {
        let table = build_namespace_table(&[]);
        assert!(parse_namespace_ids(&table).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_table_rejected() {
        let mut table = build_namespace_table(&[1, 2]);
        table.truncate(table.len() - 1);
        assert!(parse_namespace_ids(&table).is_err());
        assert!(parse_namespace_ids(&[1, 0]).is_err());
    }
}
