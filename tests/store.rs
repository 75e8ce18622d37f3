//! Black-box tests against `Store`'s public API, in the style of the
//! teacher crate's `tests/custom.rs` (`tempfile`-backed, no peeking at
//! internals).

use std::fs;
use std::io::Write;

use minibitcask::{Record, Result, Store, StoreOptions};
use tempfile::TempDir;

fn record_size(key: &str, value: &str) -> u64 {
    Record::put(key.as_bytes().to_vec(), value.as_bytes().to_vec()).encoded_len()
}

#[test]
fn basic_put_get() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.put("dbname", "minibitcask")?;
    assert_eq!(store.get("dbname")?, b"minibitcask");

    Ok(())
}

#[test]
fn overwrite_moves_the_index_to_the_latest_record() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.put("k", "v1")?;
    store.put("k", "v2")?;
    assert_eq!(store.get("k")?, b"v2");

    let log_len = fs::metadata(dir.path().join("minibitcask.data"))?.len();
    assert_eq!(log_len, record_size("k", "v1") + record_size("k", "v2"));

    Ok(())
}

#[test]
fn delete_then_get_returns_empty_without_error() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.put("k", "v")?;
    store.delete("k")?;

    assert_eq!(store.get("k")?, Vec::<u8>::new());
    assert!(store.get_opt("k")?.is_none());
    assert!(!store.contains_key("k")?);

    Ok(())
}

#[test]
fn persistence_across_reopen() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path())?;
        store.put("a", "1")?;
        store.put("b", "2")?;
        store.delete("a")?;
        store.close()?;
    }

    let store = Store::open(dir.path())?;
    assert!(store.get_opt("a")?.is_none());
    assert_eq!(store.get("b")?, b"2");

    Ok(())
}

#[test]
fn merge_removes_garbage() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.put("k", "v1")?;
    store.put("k", "v2")?;
    store.put("j", "w")?;
    store.delete("j")?;
    store.merge()?;

    assert_eq!(store.get("k")?, b"v2");
    assert!(store.get_opt("j")?.is_none());

    let log_len = fs::metadata(dir.path().join("minibitcask.data"))?.len();
    assert_eq!(log_len, record_size("k", "v2"));
    assert!(!dir.path().join("minibitcask.data.merge").exists());

    Ok(())
}

#[test]
fn merge_on_an_empty_log_is_a_no_op() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.merge()?;
    assert_eq!(fs::metadata(dir.path().join("minibitcask.data"))?.len(), 0);

    Ok(())
}

#[test]
fn merged_log_replays_to_the_same_index() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path())?;
        store.put("k", "v1")?;
        store.put("k", "v2")?;
        store.put("j", "w")?;
        store.delete("j")?;
        store.merge()?;
        store.close()?;
    }

    let store = Store::open(dir.path())?;
    assert_eq!(store.get("k")?, b"v2");
    assert!(store.get_opt("j")?.is_none());

    Ok(())
}

#[test]
fn empty_key_put_is_a_no_op() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.put("", "v")?;
    assert_eq!(fs::metadata(dir.path().join("minibitcask.data"))?.len(), 0);

    Ok(())
}

#[test]
fn delete_of_absent_key_is_a_no_op() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.delete("nope")?;
    assert_eq!(fs::metadata(dir.path().join("minibitcask.data"))?.len(), 0);

    Ok(())
}

#[test]
fn get_opt_distinguishes_absent_from_empty_value() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;

    store.put("k", "")?;
    assert_eq!(store.get_opt("k")?, Some(Vec::new()));
    assert_eq!(store.get_opt("missing")?, None);

    Ok(())
}

#[test]
fn close_then_any_operation_fails_with_invalid_log_file() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path())?;
    store.close()?;

    assert!(store.put("k", "v").is_err());
    assert!(store.close().is_err());
    assert!(store.contains_key("k").is_err());

    Ok(())
}

#[test]
fn reopening_after_a_torn_tail_write_recovers_the_last_complete_record() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let store = Store::open(dir.path())?;
        store.put("a", "1")?;
        store.close()?;
    }

    // Simulate a crash mid-append: a second record whose header claims a
    // value longer than what actually got flushed to disk.
    let log_path = dir.path().join("minibitcask.data");
    {
        let mut file = fs::OpenOptions::new().append(true).open(&log_path)?;
        let mut torn = Record::put(b"b".to_vec(), b"2".to_vec()).encode().unwrap();
        torn.truncate(torn.len() - 1);
        file.write_all(&torn)?;
    }

    let store = Store::open(dir.path())?;
    assert_eq!(store.get("a")?, b"1");
    assert!(store.get_opt("b")?.is_none());

    let expected_len = record_size("a", "1");
    assert_eq!(fs::metadata(&log_path)?.len(), expected_len);

    Ok(())
}

#[test]
fn sync_on_write_option_round_trips() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = Store::open_with_options(
        dir.path(),
        StoreOptions {
            sync_on_write: true,
        },
    )?;

    store.put("k", "v")?;
    assert_eq!(store.get("k")?, b"v");

    Ok(())
}
