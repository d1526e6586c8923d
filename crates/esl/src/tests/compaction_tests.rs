use crate::tests::helpers::{count_files, small_options};
use crate::{Options, Store};
use anyhow::Result;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

// --------------------- Merge ---------------------

#[test]
fn merge_drops_deleted_keys_and_pairs_hints() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), small_options())?;

    // ten keys, all deleted again, then six fresh keys; only the fresh ones
    // survive the merge
    for i in 0..10 {
        store.put(format!("key-{i}").as_bytes(), format!("value-{i}").as_bytes())?;
    }
    for i in 0..10 {
        store.delete(format!("key-{i}").as_bytes())?;
    }
    for i in 0..6 {
        let mut value = format!("fresh-{i}").into_bytes();
        value.resize(30, b'.');
        store.put(format!("new-{i}").as_bytes(), &value)?;
    }

    let active_before = store.active_file_id();
    store.merge_now()?;

    assert_eq!(store.active_file_id(), active_before);
    assert_eq!(store.list_keys().len(), 6);
    assert_eq!(count_files(dir.path(), ".bak"), 0);

    // compacted files sit below the active id, each with a hint sibling
    let hints = count_files(dir.path(), ".hint");
    let data = count_files(dir.path(), ".esld");
    assert_eq!(hints, 2, "expected two compacted data files, each hinted");
    assert_eq!(data, hints + 1, "compacted files plus the active file");

    for i in 0..6 {
        let mut expect = format!("fresh-{i}").into_bytes();
        expect.resize(30, b'.');
        assert_eq!(store.get(format!("new-{i}").as_bytes())?, expect);
    }
    for i in 0..10 {
        assert!(store.get(format!("key-{i}").as_bytes()).is_err());
    }
    Ok(())
}

#[test]
fn merge_keeps_only_the_newest_version() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), small_options())?;

    // three generations of the same keys spread across several files
    for round in 0..3 {
        for i in 0..8 {
            store.put(
                format!("key-{i}").as_bytes(),
                format!("round-{round}-{i}").as_bytes(),
            )?;
        }
    }
    store.merge_now()?;

    for i in 0..8 {
        assert_eq!(
            store.get(format!("key-{i}").as_bytes())?,
            format!("round-2-{i}").as_bytes()
        );
    }
    assert_eq!(store.list_keys().len(), 8);
    Ok(())
}

#[test]
fn merge_never_resurrects_a_deleted_key() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), small_options())?;

    for i in 0..8 {
        store.put(format!("key-{i}").as_bytes(), format!("value-{i}").as_bytes())?;
    }
    // push the tombstone into an immutable file too
    store.delete(b"key-0")?;
    for i in 0..8 {
        store.put(format!("pad-{i}").as_bytes(), format!("value-{i}").as_bytes())?;
    }

    store.merge_now()?;
    assert!(store.get(b"key-0").is_err());
    store.close()?;

    let store = Store::open(dir.path(), small_options())?;
    assert!(store.get(b"key-0").is_err(), "tombstone resurrected by merge");
    Ok(())
}

#[test]
fn merge_twice_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), small_options())?;

    for i in 0..12 {
        store.put(format!("key-{i}").as_bytes(), format!("value-{i}").as_bytes())?;
    }
    store.delete(b"key-3")?;

    store.merge_now()?;
    let mut keys_after_first = store.list_keys();
    keys_after_first.sort();

    store.merge_now()?;
    let mut keys_after_second = store.list_keys();
    keys_after_second.sort();

    assert_eq!(keys_after_first, keys_after_second);
    assert_eq!(count_files(dir.path(), ".bak"), 0);
    for key in &keys_after_second {
        assert!(store.get(key).is_ok());
    }
    Ok(())
}

#[test]
fn merge_of_a_store_with_only_an_active_file_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), Options::default())?;

    store.put(b"k", b"v")?;
    store.merge_now()?;

    assert_eq!(store.get(b"k")?, b"v");
    assert_eq!(count_files(dir.path(), ".esld"), 1);
    assert_eq!(count_files(dir.path(), ".hint"), 0);
    Ok(())
}

#[test]
fn merge_survives_close_and_open() -> Result<()> {
    let dir = tempdir()?;
    {
        let store = Store::open(dir.path(), small_options())?;
        for i in 0..16 {
            store.put(format!("key-{i:02}").as_bytes(), format!("value-{i:02}").as_bytes())?;
        }
        for i in 0..8 {
            store.delete(format!("key-{i:02}").as_bytes())?;
        }
        store.merge_now()?;
        store.close()?;
    }

    let store = Store::open(dir.path(), small_options())?;
    assert_eq!(store.list_keys().len(), 8);
    for i in 8..16 {
        assert_eq!(
            store.get(format!("key-{i:02}").as_bytes())?,
            format!("value-{i:02}").as_bytes()
        );
    }
    for i in 0..8 {
        assert!(store.get(format!("key-{i:02}").as_bytes()).is_err());
    }
    Ok(())
}

#[test]
fn writes_during_normal_operation_race_no_merge_state() -> Result<()> {
    // a merge between write batches must leave later writes untouched
    let dir = tempdir()?;
    let store = Store::open(dir.path(), small_options())?;

    for i in 0..8 {
        store.put(format!("old-{i}").as_bytes(), b"value..")?;
    }
    store.merge_now()?;

    for i in 0..8 {
        store.put(format!("new-{i}").as_bytes(), b"value..")?;
    }
    store.merge_now()?;

    assert_eq!(store.list_keys().len(), 16);
    for i in 0..8 {
        assert_eq!(store.get(format!("old-{i}").as_bytes())?, b"value..");
        assert_eq!(store.get(format!("new-{i}").as_bytes())?, b"value..");
    }
    Ok(())
}

// --------------------- Background compactor ---------------------

#[test]
fn explicit_merge_request_is_processed_in_the_background() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), small_options())?;

    for i in 0..20 {
        store.put(format!("key-{i:02}").as_bytes(), format!("value-{i:02}").as_bytes())?;
    }
    let files_before = count_files(dir.path(), ".esld");
    assert!(files_before >= 4);

    store.merge();

    // the one-slot channel hands the command to the compactor thread; give
    // it a moment and watch the file count drop
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if count_files(dir.path(), ".hint") > 0 && count_files(dir.path(), ".bak") == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "background merge never ran");
        thread::sleep(Duration::from_millis(20));
    }

    for i in 0..20 {
        assert_eq!(
            store.get(format!("key-{i:02}").as_bytes())?,
            format!("value-{i:02}").as_bytes()
        );
    }
    Ok(())
}

#[test]
fn ticker_triggers_merge_past_the_threshold() -> Result<()> {
    let dir = tempdir()?;
    let options = Options::default()
        .with_max_file_bytes(100)
        .with_compact_threshold(3)
        .with_compact_interval(Duration::from_millis(25));
    let store = Store::open(dir.path(), options)?;

    // pile up immutable files, then delete enough that the merged result
    // settles below the threshold again
    for i in 0..20 {
        store.put(format!("key-{i:02}").as_bytes(), format!("value-{i:02}").as_bytes())?;
    }
    for i in 0..12 {
        store.delete(format!("key-{i:02}").as_bytes())?;
    }
    assert!(count_files(dir.path(), ".esld") > 4);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if count_files(dir.path(), ".hint") > 0 {
            break;
        }
        assert!(Instant::now() < deadline, "ticker never triggered a merge");
        thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(store.list_keys().len(), 8);
    for i in 12..20 {
        assert_eq!(
            store.get(format!("key-{i:02}").as_bytes())?,
            format!("value-{i:02}").as_bytes()
        );
    }
    store.close()?;
    Ok(())
}
