use tempfile::TempDir;

use super::*;

/// A bitmap with `total` block positions and the given raw bytes.
fn bitmap_with(total: u64, bytes: &[u8]) -> Bitmap {
    let mut raw = total.to_le_bytes().to_vec();
    raw.extend_from_slice(bytes);
    Bitmap::from_bytes(&raw).expect("parse bitmap")
}

#[test]
fn fresh_bitmap_starts_fully_free() {
    let bitmap = Bitmap::new();
    assert_eq!(bitmap.total_blocks(), 8192);
    assert_eq!(bitmap.used_count(), 0);
    assert!(bitmap.is_dirty());
}

#[test]
fn allocation_returns_distinct_one_based_ids() {
    let mut bitmap = Bitmap::new();
    let ids = bitmap.allocate(5).expect("allocate");

    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(bitmap.used_count(), 5);
    assert_eq!(bitmap.search_pos(), 5);
}

#[test]
fn allocation_of_zero_blocks_is_empty() {
    let mut bitmap = Bitmap::new();
    assert!(bitmap.allocate(0).expect("allocate").is_empty());
    assert_eq!(bitmap.used_count(), 0);
}

#[test]
fn freed_blocks_are_reused() {
    let mut bitmap = Bitmap::new();
    let ids = bitmap.allocate(4).expect("allocate");
    bitmap.free(&ids);
    assert_eq!(bitmap.used_count(), 0);

    bitmap.reset_search();
    let again = bitmap.allocate(4).expect("reallocate");
    assert_eq!(again, ids);
}

#[test]
fn free_ignores_the_null_id_and_double_frees() {
    let mut bitmap = Bitmap::new();
    let ids = bitmap.allocate(2).expect("allocate");

    bitmap.free(&[0]);
    assert_eq!(bitmap.used_count(), 2);

    bitmap.free(&ids);
    bitmap.free(&ids);
    assert_eq!(bitmap.used_count(), 0);
}

#[test]
fn scattered_allocation_kicks_in_without_a_contiguous_run() {
    // 16 positions, even ones used: no run of two anywhere.
    let mut bitmap = bitmap_with(16, &[0b0101_0101, 0b0101_0101]);
    let ids = bitmap.allocate(4).expect("scattered allocate");

    assert_eq!(ids, vec![2, 4, 6, 8]);
    assert_eq!(bitmap.used_count(), 12);
}

#[test]
fn scattered_shortfall_releases_everything_it_gathered() {
    // Only three free positions in total.
    let mut bitmap = bitmap_with(16, &[0b0101_0111, 0b1111_1111]);
    let used_before = bitmap.used_count();

    let err = bitmap.allocate(4).unwrap_err();
    assert!(matches!(err, FsError::CapacityExhausted));
    assert_eq!(bitmap.used_count(), used_before);
}

#[test]
fn single_block_request_grows_a_full_bitmap() {
    let mut bitmap = bitmap_with(8, &[0xFF]);
    let ids = bitmap.allocate(1).expect("allocate after growth");

    assert_eq!(ids, vec![9]);
    assert_eq!(bitmap.total_blocks(), 8 + 8192);
}

#[test]
fn search_position_stays_below_capacity() {
    let mut bitmap = bitmap_with(8, &[0b0111_1111]);
    let ids = bitmap.allocate(1).expect("allocate last position");

    assert_eq!(ids, vec![8]);
    assert!(bitmap.search_pos() < bitmap.total_blocks());
}

#[test]
fn allocation_scans_cyclically_from_the_search_hint() {
    let mut bitmap = Bitmap::new();
    let first = bitmap.allocate(3).expect("allocate");
    bitmap.free(&first);

    // The hint moved past the freed run, so the next allocation lands after
    // it and only a wrapped scan can find the gap again.
    let next = bitmap.allocate(2).expect("allocate");
    assert_eq!(next, vec![4, 5]);

    let huge = bitmap.allocate(8191).unwrap_err();
    assert!(matches!(huge, FsError::CapacityExhausted));
}

#[test]
fn serialization_round_trips() {
    let mut bitmap = Bitmap::new();
    bitmap.allocate(10).expect("allocate");
    bitmap.free(&[3, 7]);

    let raw = bitmap.to_bytes();
    let restored = Bitmap::from_bytes(&raw).expect("parse");

    assert_eq!(restored.total_blocks(), bitmap.total_blocks());
    assert_eq!(restored.used_count(), bitmap.used_count());
    assert!(!restored.is_dirty());
}

#[test]
fn short_header_is_rejected() {
    let err = Bitmap::from_bytes(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, FsError::InvalidFormat(_)));
}

#[test]
fn save_skips_clean_bitmaps() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bitmap.yfs");

    let mut bitmap = Bitmap::new();
    bitmap.save(&path).expect("first save");
    assert!(!bitmap.is_dirty());

    std::fs::remove_file(&path).expect("remove");
    bitmap.save(&path).expect("clean save");
    assert!(!path.exists());

    bitmap.allocate(1).expect("allocate");
    bitmap.save(&path).expect("dirty save");
    assert!(path.exists());
}
