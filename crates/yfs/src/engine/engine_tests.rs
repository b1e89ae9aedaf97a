use prost::Message;
use tempfile::TempDir;

use super::*;

/// Small blocks keep chains interesting: 124 usable bytes per data block
/// and 18 ids per index record.
const SMALL: FsOptions = FsOptions {
    block_size: 128,
    checksum_enabled: true,
};

fn open_small(dir: &TempDir) -> Yfs {
    Yfs::open_with(dir.path(), SMALL).expect("open volume")
}

fn used_blocks(fs: &Yfs) -> u64 {
    fs.get_stats().expect("stats")["used_blocks"]
}

#[test]
fn round_trip_small_file() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/a.txt", b"hello").expect("write");
    assert_eq!(fs.read_file("/a.txt").expect("read"), b"hello");

    let entries = fs.ls("/").expect("ls");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[0].size, 5);
    assert!(!entries[0].is_directory);
}

#[test]
fn create_is_idempotent_across_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let fs = open_small(&dir);
        fs.write_file("/keep.bin", b"payload").expect("write");
    }
    let fs = Yfs::open(dir.path()).expect("reopen");
    assert_eq!(fs.block_size(), 128);
    assert_eq!(fs.read_file("/keep.bin").expect("read"), b"payload");
}

#[test]
fn multi_index_chain_round_trips() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
    fs.write_file("/big.bin", &payload).expect("write");

    let info = fs.stat("/big.bin").expect("stat");
    assert_eq!(info.size, 5000);
    assert_eq!(info.block_count, 41);

    assert_eq!(fs.read_file("/big.bin").expect("read"), payload);
    fs.verify_integrity().expect("integrity");
}

#[test]
fn read_length_always_matches_stat_size() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    for (path, len) in [("/a", 0usize), ("/b", 1), ("/c", 124), ("/d", 125), ("/e", 3000)] {
        fs.write_file(path, &vec![0x5A; len]).expect("write");
        let info = fs.stat(path).expect("stat");
        assert_eq!(fs.read_file(path).expect("read").len() as i64, info.size);
    }
}

#[test]
fn payload_boundaries_around_the_frame_header() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/exact", &vec![1u8; 124]).expect("write");
    assert_eq!(fs.stat("/exact").expect("stat").block_count, 1);

    fs.write_file("/spill", &vec![1u8; 125]).expect("write");
    assert_eq!(fs.stat("/spill").expect("stat").block_count, 2);
}

#[test]
fn overwrite_shrinks_allocation() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    let baseline = used_blocks(&fs);

    fs.write_file("/x", &vec![b'A'; 10_000]).expect("large write");
    let after_large = used_blocks(&fs);

    fs.write_file("/x", b"short").expect("small write");
    let after_small = used_blocks(&fs);

    assert!(after_small < after_large);
    // One data block plus one index block.
    assert_eq!(after_small, baseline + 2);
}

#[test]
fn empty_payload_frees_the_chain() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    let baseline = used_blocks(&fs);

    fs.write_file("/tmp.bin", &vec![9u8; 2000]).expect("write");
    assert!(used_blocks(&fs) > baseline);

    fs.write_file("/tmp.bin", b"").expect("truncate");
    assert_eq!(used_blocks(&fs), baseline);

    let info = fs.stat("/tmp.bin").expect("stat");
    assert_eq!(info.size, 0);
    assert_eq!(info.block_count, 0);
    assert!(fs.read_file("/tmp.bin").expect("read").is_empty());
}

#[test]
fn delete_frees_every_block() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    let baseline = used_blocks(&fs);

    fs.write_file("/doomed", &vec![7u8; 4000]).expect("write");
    fs.delete_file("/doomed").expect("delete");

    assert_eq!(used_blocks(&fs), baseline);
    assert!(matches!(
        fs.read_file("/doomed").unwrap_err(),
        FsError::NotFound(_)
    ));
}

#[test]
fn move_preserves_bytes_and_removes_source() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/a", b"payload").expect("write");
    fs.move_file("/a", "/d/b").expect("move");

    assert_eq!(fs.read_file("/d/b").expect("read"), b"payload");
    assert!(matches!(
        fs.read_file("/a").unwrap_err(),
        FsError::NotFound(_)
    ));

    let entries = fs.ls("/d").expect("ls");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "b");
}

#[test]
fn copy_produces_an_independent_chain() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/a", b"X").expect("write a");
    fs.copy_file("/a", "/b").expect("copy");
    fs.write_file("/a", b"Y").expect("rewrite a");

    assert_eq!(fs.read_file("/a").expect("read a"), b"Y");
    assert_eq!(fs.read_file("/b").expect("read b"), b"X");
}

#[test]
fn writing_creates_missing_parents() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/deep/nested/file.txt", b"down here")
        .expect("write");

    let entries = fs.ls("/deep/nested").expect("ls");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "file.txt");

    let deep = fs.stat("/deep").expect("stat");
    assert!(deep.is_directory);
}

#[test]
fn writing_over_a_directory_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    fs.create_directory("/d").expect("mkdir");

    assert!(matches!(
        fs.write_file("/d", b"nope").unwrap_err(),
        FsError::IsADirectory(_)
    ));
    assert!(matches!(
        fs.write_file("/", b"nope").unwrap_err(),
        FsError::IsADirectory(_)
    ));
}

#[test]
fn directory_lifecycle_and_refusals() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.create_directory("/a/b").expect("mkdir");
    assert!(matches!(
        fs.create_directory("/a/b").unwrap_err(),
        FsError::AlreadyExists(_)
    ));

    fs.write_file("/a/b/f", b"x").expect("write");
    assert!(matches!(
        fs.delete_directory("/a/b").unwrap_err(),
        FsError::NotEmpty(_)
    ));

    fs.delete_file("/a/b/f").expect("rm");
    fs.delete_directory("/a/b").expect("rmdir");
    fs.delete_directory("/a").expect("rmdir parent");

    assert!(matches!(
        fs.delete_directory("/").unwrap_err(),
        FsError::RootDirectory
    ));
    assert!(matches!(
        fs.delete_directory("/ghost").unwrap_err(),
        FsError::NotFound(_)
    ));
}

#[test]
fn deleting_a_directory_as_a_file_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    fs.create_directory("/d").expect("mkdir");

    assert!(matches!(
        fs.delete_file("/d").unwrap_err(),
        FsError::IsADirectory(_)
    ));
}

#[test]
fn ls_rejects_files_and_missing_paths() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    fs.write_file("/f", b"x").expect("write");

    assert!(matches!(
        fs.ls("/f").unwrap_err(),
        FsError::NotADirectory(_)
    ));
    assert!(matches!(fs.ls("/ghost").unwrap_err(), FsError::NotFound(_)));
}

#[test]
fn ls_all_walks_the_whole_tree() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/top.txt", b"1").expect("write");
    fs.write_file("/docs/readme.md", b"22").expect("write");
    fs.create_directory("/empty").expect("mkdir");

    let tree = fs.ls_all();
    assert_eq!(tree.name, "/");
    assert!(tree.is_directory);

    let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["docs", "empty", "top.txt"]);

    let docs = &tree.children[0];
    assert_eq!(docs.children.len(), 1);
    assert_eq!(docs.children[0].name, "readme.md");
    assert_eq!(docs.children[0].size, 2);
}

#[test]
fn reopened_volume_matches_the_synced_state() {
    let dir = TempDir::new().expect("tempdir");
    let payload: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();
    {
        let fs = open_small(&dir);
        fs.write_file("/data/blob.bin", &payload).expect("write");
        fs.write_file("/data/note.txt", b"remember").expect("write");
        fs.create_directory("/spare").expect("mkdir");
        fs.sync().expect("sync");
    }

    let fs = Yfs::open(dir.path()).expect("reopen");
    assert_eq!(fs.read_file("/data/blob.bin").expect("read"), payload);
    assert_eq!(fs.read_file("/data/note.txt").expect("read"), b"remember");
    assert!(fs.stat("/spare").expect("stat").is_directory);
    fs.verify_integrity().expect("integrity after reopen");
}

#[test]
fn stats_expose_the_documented_keys() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);
    fs.write_file("/f", &vec![1u8; 300]).expect("write");

    let stats = fs.get_stats().expect("stats");
    for key in [
        "version",
        "block_size",
        "total_blocks",
        "allocated_blocks",
        "used_blocks",
        "free_blocks",
        "checksum_enabled",
        "bitmap_search_pos",
        "blocks_file_size",
    ] {
        assert!(stats.contains_key(key), "missing key {key}");
    }

    assert_eq!(stats["version"], 2);
    assert_eq!(stats["block_size"], 128);
    assert_eq!(stats["checksum_enabled"], 1);
    assert_eq!(stats["total_blocks"], 8192);
    // 300 bytes over 124-byte slots: three data blocks and one index block.
    assert_eq!(stats["used_blocks"], 4);
    assert_eq!(stats["free_blocks"], 8192 - 4);
    assert_eq!(stats["allocated_blocks"], 4);
    assert_eq!(stats["blocks_file_size"], 4 + 4 * 128);
}

#[test]
fn defragment_resets_the_search_position() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    fs.write_file("/f", &vec![1u8; 1000]).expect("write");
    assert!(fs.get_stats().expect("stats")["bitmap_search_pos"] > 0);

    fs.defragment().expect("defragment");
    assert_eq!(fs.get_stats().expect("stats")["bitmap_search_pos"], 0);
}

#[test]
fn verify_integrity_detects_a_chain_cycle() {
    let dir = TempDir::new().expect("tempdir");
    let fs = open_small(&dir);

    // Two index blocks at this block size.
    fs.write_file("/big", &vec![3u8; 3000]).expect("write");
    fs.verify_integrity().expect("healthy");

    let head = {
        let state = fs.read_state();
        state.namespace.file("/big").expect("entry").first_index_block_id
    };
    let first = fs.chain().read_index_record(head).expect("first record");
    let tail_id = first.next_index_block_id;
    assert_ne!(tail_id, NULL_BLOCK_ID);

    let mut tail = fs.chain().read_index_record(tail_id).expect("tail record");
    tail.next_index_block_id = head;
    tail.crc32 = wire::index_crc(&tail.block_ids, &tail.extents, tail.next_index_block_id);
    fs.device
        .write_block(tail_id, &tail.encode_to_vec())
        .expect("tamper");

    let err = fs.verify_integrity().unwrap_err();
    assert!(matches!(err, FsError::CorruptChain(_)));
}

#[test]
fn tampered_metadata_fails_the_checksum_on_reload() {
    let dir = TempDir::new().expect("tempdir");
    {
        let fs = open_small(&dir);
        fs.write_file("/f", b"guarded").expect("write");
    }

    let root_path = dir.path().join("root.yfs");
    let raw = std::fs::read(&root_path).expect("read root");
    let mut header = FilesystemHeader::decode(raw.as_slice()).expect("decode");
    header
        .root
        .files
        .get_mut("f")
        .expect("entry")
        .metadata
        .mod_time += 1;
    std::fs::write(&root_path, header.encode_to_vec()).expect("write root");

    let fs = Yfs::open(dir.path()).expect("reopen");
    assert!(matches!(
        fs.read_file("/f").unwrap_err(),
        FsError::ChecksumMismatch(_)
    ));
    assert!(matches!(
        fs.stat("/f").unwrap_err(),
        FsError::ChecksumMismatch(_)
    ));
    assert!(matches!(
        fs.verify_integrity().unwrap_err(),
        FsError::ChecksumMismatch(_)
    ));
}

#[test]
fn concurrent_readers_and_writers_stay_consistent() {
    use std::sync::Arc;

    let dir = TempDir::new().expect("tempdir");
    let fs = Arc::new(open_small(&dir));

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let fs = Arc::clone(&fs);
            std::thread::spawn(move || {
                let path = format!("/w{i}.bin");
                let body = vec![i as u8; 600];
                fs.write_file(&path, &body).expect("write");
                assert_eq!(fs.read_file(&path).expect("read"), body);
            })
        })
        .collect();
    for handle in writers {
        handle.join().expect("writer thread");
    }

    assert_eq!(fs.ls("/").expect("ls").len(), 4);
    fs.verify_integrity().expect("integrity");
}
