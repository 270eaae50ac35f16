use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::tempdir;

use dirbridge::collection::DefaultStrategy;
use dirbridge::import::{CachingLocalImportDirectory, ImportDirectory};

#[test]
fn unlocked_writes_reach_both_sides_of_a_caching_import() {
    let origin = tempdir().unwrap();
    let cache = tempdir().unwrap();
    let mirror = cache.path().join("mirror");

    let import = CachingLocalImportDirectory::new(
        origin.path(),
        &mirror,
        Arc::new(DefaultStrategy::new()),
    )
    .unwrap();
    assert_eq!(import.directory(), mirror);

    import
        .write_unlocked_file("log.txt", &mut Cursor::new(b"entry\n".to_vec()))
        .unwrap();
    assert_eq!(
        fs::read_to_string(origin.path().join("log.txt")).unwrap(),
        "entry\n"
    );
    assert_eq!(fs::read_to_string(mirror.join("log.txt")).unwrap(), "entry\n");

    import.delete_unlocked_file("log.txt").unwrap();
    assert!(!origin.path().join("log.txt").exists());
    assert!(!mirror.join("log.txt").exists());
}
