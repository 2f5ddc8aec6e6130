use std::sync::Once;

use caskdb::{Engine, IndexType, IteratorOptions, Options, WriteBatchOptions};
use simplelog::{Config, LevelFilter, SimpleLogger};
use tempfile::TempDir;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        let _ = SimpleLogger::init(LevelFilter::Debug, Config::default());
    });
}

fn open_with(index_type: IndexType) -> (TempDir, Engine) {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options {
        dir_path: dir.path().to_path_buf(),
        data_file_size: 64 * 1024,
        sync_write: false,
        index_type,
    };
    let engine = Engine::open(options).unwrap();
    (dir, engine)
}

#[test]
fn put_get_delete_roundtrip() {
    let (_dir, engine) = open_with(IndexType::BTree);

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");

    engine.put(b"a", b"11").unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"11");

    engine.delete(b"a").unwrap();
    assert!(engine.get(b"a").is_err());
    assert!(engine.delete(b"a").is_ok());

    assert!(engine.put(b"", b"x").is_err());
    assert!(engine.get(b"").is_err());
}

#[test]
fn restart_recovers_all_keys() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options { dir_path: dir.path().to_path_buf(), data_file_size: 64 * 1024, ..Options::default() };

    {
        let engine = Engine::open(options.clone()).unwrap();
        for i in 0..50u32 {
            engine.put(format!("key-{i}").as_bytes(), format!("value-{i}").as_bytes()).unwrap();
        }
        engine.delete(b"key-5").unwrap();
        engine.sync().unwrap();
    }

    let engine = Engine::open(options).unwrap();
    assert_eq!(engine.get(b"key-0").unwrap(), b"value-0");
    assert_eq!(engine.get(b"key-49").unwrap(), b"value-49");
    assert!(engine.get(b"key-5").is_err());
    assert_eq!(engine.list_keys().len(), 49);
}

#[test]
fn write_batch_is_invisible_until_commit_and_survives_restart() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options { dir_path: dir.path().to_path_buf(), data_file_size: 64 * 1024, ..Options::default() };

    {
        let engine = Engine::open(options.clone()).unwrap();
        engine.put(b"before", b"1").unwrap();

        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"batched-1", b"v1").unwrap();
        batch.put(b"batched-2", b"v2").unwrap();
        batch.delete(b"before").unwrap();

        assert!(engine.get(b"batched-1").is_err());
        assert!(engine.get(b"before").is_ok());

        batch.commit().unwrap();

        assert_eq!(engine.get(b"batched-1").unwrap(), b"v1");
        assert_eq!(engine.get(b"batched-2").unwrap(), b"v2");
        assert!(engine.get(b"before").is_err());
    }

    let engine = Engine::open(options).unwrap();
    assert_eq!(engine.get(b"batched-1").unwrap(), b"v1");
    assert_eq!(engine.get(b"batched-2").unwrap(), b"v2");
    assert!(engine.get(b"before").is_err());
}

#[test]
fn segment_rotation_spans_multiple_files() {
    let (_dir, engine) = open_with(IndexType::BTree);
    let value = vec![b'x'; 512];
    for i in 0..500u32 {
        engine.put(format!("rot-{i:04}").as_bytes(), &value).unwrap();
    }
    let stat = engine.stat().unwrap();
    assert!(stat.data_file_num > 1, "expected rotation to produce multiple data files, got {}", stat.data_file_num);
    assert_eq!(stat.key_num, 500);

    for i in 0..500u32 {
        assert_eq!(engine.get(format!("rot-{i:04}").as_bytes()).unwrap(), value);
    }
}

#[test]
fn merge_preserves_data_and_shrinks_disk_usage() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options { dir_path: dir.path().to_path_buf(), data_file_size: 8 * 1024, ..Options::default() };

    let engine = Engine::open(options.clone()).unwrap();
    let value = vec![b'y'; 256];
    for round in 0..10 {
        for i in 0..30u32 {
            engine.put(format!("k-{i}").as_bytes(), &value).unwrap();
        }
        let _ = round;
    }
    for i in 0..30u32 {
        if i % 3 == 0 {
            engine.delete(format!("k-{i}").as_bytes()).unwrap();
        }
    }

    let before = engine.stat().unwrap();
    engine.merge().unwrap();
    drop(engine);

    let engine = Engine::open(options).unwrap();
    let after = engine.stat().unwrap();
    assert!(after.disk_size <= before.disk_size);

    for i in 0..30u32 {
        let key = format!("k-{i}");
        if i % 3 == 0 {
            assert!(engine.get(key.as_bytes()).is_err());
        } else {
            assert_eq!(engine.get(key.as_bytes()).unwrap(), value);
        }
    }
}

#[test]
fn iterator_respects_prefix_and_direction() {
    let (_dir, engine) = open_with(IndexType::BTree);
    for key in ["apple", "apricot", "banana", "avocado", "cherry"] {
        engine.put(key.as_bytes(), b"v").unwrap();
    }

    let mut iter = engine.new_iterator(IteratorOptions { prefix: b"ap".to_vec(), reverse: false });
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(String::from_utf8(iter.key().to_vec()).unwrap());
        iter.next();
    }
    assert_eq!(keys, vec!["apple", "apricot"]);

    let mut iter = engine.new_iterator(IteratorOptions { prefix: Vec::new(), reverse: true });
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(String::from_utf8(iter.key().to_vec()).unwrap());
        iter.next();
    }
    assert_eq!(keys, vec!["cherry", "banana", "avocado", "apricot", "apple"]);
}

#[test]
fn fold_visits_every_live_pair_and_can_stop_early() {
    let (_dir, engine) = open_with(IndexType::BTree);
    for i in 0..10u32 {
        engine.put(format!("f-{i}").as_bytes(), format!("{i}").as_bytes()).unwrap();
    }

    let mut visited = Vec::new();
    engine
        .fold(|key, value| {
            visited.push((String::from_utf8(key.to_vec()).unwrap(), String::from_utf8(value.to_vec()).unwrap()));
            visited.len() < 3
        })
        .unwrap();
    assert_eq!(visited.len(), 3);
}

#[test]
fn corrupted_record_is_rejected_on_reopen() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let options = Options { dir_path: dir.path().to_path_buf(), data_file_size: 64 * 1024, ..Options::default() };

    {
        let engine = Engine::open(options.clone()).unwrap();
        engine.put(b"intact", b"ok").unwrap();
        engine.sync().unwrap();
    }

    let data_file = dir.path().join("000000000.data");
    let mut bytes = std::fs::read(&data_file).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&data_file, bytes).unwrap();

    assert!(Engine::open(options).is_err());
}

#[test]
fn merge_on_empty_database_is_a_no_op() {
    let (_dir, engine) = open_with(IndexType::BTree);
    engine.put(b"a", b"1").unwrap();
    engine.merge().unwrap();
    engine.merge().unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");
}

#[test]
fn art_and_bplus_tree_backends_round_trip() {
    for index_type in [IndexType::Art, IndexType::BPlusTree] {
        let (_dir, engine) = open_with(index_type);
        engine.put(b"hello", b"world").unwrap();
        engine.put(b"foo", b"bar").unwrap();
        engine.delete(b"foo").unwrap();
        assert_eq!(engine.get(b"hello").unwrap(), b"world");
        assert!(engine.get(b"foo").is_err());
    }
}
