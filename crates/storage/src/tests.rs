use super::*;
use common::PageId;
use tempfile::tempdir;

#[test]
fn allocate_page_is_monotonic() {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::open(dir.path().join("pages.db")).unwrap();
    assert_eq!(dm.allocate_page().unwrap(), PageId(0));
    assert_eq!(dm.allocate_page().unwrap(), PageId(1));
    assert_eq!(dm.allocate_page().unwrap(), PageId(2));
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::open(dir.path().join("pages.db")).unwrap();
    let page_id = dm.allocate_page().unwrap();

    let mut written = [0u8; PAGE_SIZE];
    written[0] = 0xAB;
    written[PAGE_SIZE - 1] = 0xCD;
    dm.write_page(page_id, &written).unwrap();

    let mut read = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut read).unwrap();
    assert_eq!(written, read);
}

#[test]
fn unwritten_allocated_page_reads_as_zeroed() {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::open(dir.path().join("pages.db")).unwrap();
    let page_id = dm.allocate_page().unwrap();

    let mut read = [0xFFu8; PAGE_SIZE];
    dm.read_page(page_id, &mut read).unwrap();
    assert_eq!(read, [0u8; PAGE_SIZE]);
}

#[test]
fn reopen_resumes_page_id_allocation_from_file_length() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pages.db");
    {
        let dm = FileDiskManager::open(&path).unwrap();
        let p0 = dm.allocate_page().unwrap();
        let p1 = dm.allocate_page().unwrap();
        dm.write_page(p0, &[1u8; PAGE_SIZE]).unwrap();
        dm.write_page(p1, &[2u8; PAGE_SIZE]).unwrap();
    }

    let dm = FileDiskManager::open(&path).unwrap();
    assert_eq!(dm.allocate_page().unwrap(), PageId(2));

    let mut buf = [0u8; PAGE_SIZE];
    dm.read_page(PageId(0), &mut buf).unwrap();
    assert_eq!(buf, [1u8; PAGE_SIZE]);
}

#[test]
fn read_or_write_rejects_invalid_page_id() {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::open(dir.path().join("pages.db")).unwrap();
    let mut buf = [0u8; PAGE_SIZE];
    assert!(dm.read_page(PageId::INVALID, &mut buf).is_err());
    assert!(dm.write_page(PageId::INVALID, &buf).is_err());
}

#[test]
fn deallocate_page_does_not_error() {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::open(dir.path().join("pages.db")).unwrap();
    let page_id = dm.allocate_page().unwrap();
    assert!(dm.deallocate_page(page_id).is_ok());
}

#[test]
fn noop_log_manager_reports_everything_persisted() {
    let lm = NoopLogManager;
    assert_eq!(lm.persisted_lsn(), u32::MAX);
    assert!(lm.flush_log_to(12345).is_ok());
}
