use lumidisk_scan::{FileEntry, JwalkScanner, ScanConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn build_tree(root: &std::path::Path) {
    for dir in ["a", "a/b", "a/b/c", "d", "e/f/g"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    for i in 0..40 {
        let dir = ["a", "a/b", "a/b/c", "d", "e/f/g"][i % 5];
        let ext = ["txt", "JPG", "rs", "", "tar.gz"][i % 5];
        let name = if ext.is_empty() {
            format!("file{i}")
        } else {
            format!("file{i}.{ext}")
        };
        fs::write(root.join(dir).join(name), vec![b'x'; i * 7 + 1]).unwrap();
    }
}

fn key_of(entry: &FileEntry) -> (u64, std::time::SystemTime, bool, bool, String) {
    (
        entry.size,
        entry.modified,
        entry.is_dir,
        entry.is_hidden,
        entry.extension().to_string(),
    )
}

#[test]
fn test_totals_match_entries() {
    let temp = TempDir::new().unwrap();
    build_tree(temp.path());

    let inventory = JwalkScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

    let files: Vec<_> = inventory.entries.iter().filter(|e| !e.is_dir).collect();
    let dirs = inventory.entries.iter().filter(|e| e.is_dir).count() as u64;

    assert_eq!(inventory.total_size(), files.iter().map(|e| e.size).sum::<u64>());
    assert_eq!(inventory.total_files(), files.len() as u64);
    assert_eq!(inventory.total_dirs(), dirs);
    assert_eq!(inventory.recompute_stats(), inventory.stats);
    assert_eq!(inventory.total_files(), 40);
    // root + a, a/b, a/b/c, d, e, e/f, e/f/g
    assert_eq!(inventory.total_dirs(), 8);
    assert!(inventory.extension_sizes().contains_key("jpg"));
    assert!(inventory.extension_sizes().contains_key("gz"));
}

#[test]
fn test_repeated_scans_agree() {
    let temp = TempDir::new().unwrap();
    build_tree(temp.path());
    let config = ScanConfig::builder().root(temp.path()).threads(4usize).build().unwrap();

    let first = JwalkScanner::new().scan(&config).unwrap();
    let second = JwalkScanner::new().scan(&config).unwrap();

    assert_eq!(first.stats, second.stats);

    let as_map = |entries: &[FileEntry]| -> BTreeMap<PathBuf, _> {
        entries.iter().map(|e| (e.path.clone(), key_of(e))).collect()
    };
    assert_eq!(as_map(&first.entries), as_map(&second.entries));
}

#[test]
fn test_concrete_three_file_tree() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), vec![b'a'; 100]).unwrap();
    fs::write(temp.path().join("b.txt"), vec![b'a'; 100]).unwrap();
    fs::write(temp.path().join("c.txt"), vec![b'c'; 50]).unwrap();

    let inventory = JwalkScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

    assert_eq!(inventory.total_files(), 3);
    assert_eq!(inventory.total_size(), 250);
    assert_eq!(inventory.extension_sizes().get("txt"), Some(&250));
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_partial_result() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("visible.txt"), "1234").unwrap();
    let locked = temp.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("inner.txt"), "hidden from scan").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read the directory anyway; nothing to check then.
    let enforced = fs::read_dir(&locked).is_err();

    let result = JwalkScanner::new().scan(&ScanConfig::new(temp.path()));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let inventory = result.unwrap();

    if enforced {
        assert!(inventory.has_warnings());
        assert_eq!(inventory.total_files(), 1);
        assert_eq!(inventory.total_size(), 4);
        // The locked directory itself is still listed by its parent.
        assert!(inventory.entries.iter().any(|e| e.path.ends_with("locked")));
    } else {
        assert_eq!(inventory.total_files(), 2);
    }
}
