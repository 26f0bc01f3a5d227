//! Header page (page id 0): a persisted list of `(index name, root
//! page id)` records. Every named [`crate::BPlusTreeIndex`] sharing one
//! buffer pool reads and updates its own record here so a reopened
//! database can find each tree's root again.
//!
//! Unlike leaf/internal pages, the header page's layout is not part of
//! the bit-exact B+ tree wire format — it is a small side table, so it
//! is encoded with `bincode`, matching how the rest of the workspace
//! serializes catalog-style metadata.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::PageId;
use storage::PAGE_SIZE;

fn bincode_config() -> impl Config {
    config::legacy()
}

type Records = Vec<(String, PageId)>;

/// Zero a header page and write an empty record list. Must run exactly
/// once, on the page returned by the first ever `new_page` call against
/// a fresh buffer pool/disk file — see [`crate::BPlusTreeIndex::init_header`].
pub fn init(bytes: &mut [u8; PAGE_SIZE]) {
    bytes.fill(0);
    write_records(bytes, &Records::new());
}

/// Look up the root page id recorded for `name`, if any.
pub fn lookup(bytes: &[u8; PAGE_SIZE], name: &str) -> Option<PageId> {
    read_records(bytes)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, root)| root)
}

/// Insert or overwrite the root page id recorded for `name`.
pub fn upsert(bytes: &mut [u8; PAGE_SIZE], name: &str, root: PageId) {
    let mut records = read_records(bytes);
    match records.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = root,
        None => records.push((name.to_string(), root)),
    }
    write_records(bytes, &records);
}

fn read_records(bytes: &[u8; PAGE_SIZE]) -> Records {
    decode_from_slice(bytes, bincode_config())
        .map(|(records, _)| records)
        .unwrap_or_default()
}

fn write_records(bytes: &mut [u8; PAGE_SIZE], records: &Records) {
    let encoded = encode_to_vec(records, bincode_config())
        .expect("header page records always fit bincode's legacy encoding");
    assert!(
        encoded.len() <= PAGE_SIZE,
        "header page holds too many named indexes to fit in one page"
    );
    bytes.fill(0);
    bytes[..encoded.len()].copy_from_slice(&encoded);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_on_freshly_initialized_page_is_empty() {
        let mut buf = [0u8; PAGE_SIZE];
        init(&mut buf);
        assert_eq!(lookup(&buf, "primary"), None);
    }

    #[test]
    fn upsert_then_lookup_round_trips() {
        let mut buf = [0u8; PAGE_SIZE];
        init(&mut buf);
        upsert(&mut buf, "primary", PageId(7));
        assert_eq!(lookup(&buf, "primary"), Some(PageId(7)));
        assert_eq!(lookup(&buf, "secondary"), None);
    }

    #[test]
    fn upsert_overwrites_existing_record() {
        let mut buf = [0u8; PAGE_SIZE];
        init(&mut buf);
        upsert(&mut buf, "primary", PageId(7));
        upsert(&mut buf, "primary", PageId(12));
        assert_eq!(lookup(&buf, "primary"), Some(PageId(12)));
    }

    #[test]
    fn multiple_named_indexes_coexist() {
        let mut buf = [0u8; PAGE_SIZE];
        init(&mut buf);
        upsert(&mut buf, "by_id", PageId(1));
        upsert(&mut buf, "by_email", PageId(2));
        assert_eq!(lookup(&buf, "by_id"), Some(PageId(1)));
        assert_eq!(lookup(&buf, "by_email"), Some(PageId(2)));
    }
}
