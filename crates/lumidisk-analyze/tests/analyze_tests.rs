use lumidisk_analyze::{DuplicateConfig, DuplicateFinder, FileEntry};
use lumidisk_scan::{JwalkScanner, ScanConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn scan(root: &Path) -> lumidisk_analyze::Inventory {
    JwalkScanner::new().scan(&ScanConfig::new(root)).unwrap()
}

fn sorted_paths<'a>(paths: impl Iterator<Item = &'a Path>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = paths.map(Path::to_path_buf).collect();
    out.sort();
    out
}

#[test]
fn test_three_file_tree() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), vec![b'a'; 100]).unwrap();
    fs::write(temp.path().join("b.txt"), vec![b'a'; 100]).unwrap();
    fs::write(temp.path().join("c.txt"), vec![b'c'; 50]).unwrap();

    let mut inventory = scan(temp.path());
    assert_eq!(inventory.total_files(), 3);
    assert_eq!(inventory.total_size(), 250);

    let report = DuplicateFinder::new().find_in_inventory(&mut inventory);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].count(), 2);
    assert_eq!(report.groups[0].wasted_bytes, 100);
    assert_eq!(report.total_wasted_space, 100);

    let names: Vec<_> = report.groups[0].members.iter().map(|e| e.name().to_string()).collect();
    assert!(names.contains(&"a.txt".to_string()));
    assert!(names.contains(&"b.txt".to_string()));
}

#[test]
fn test_groups_ordered_by_wasted_space() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    // Three copies of 10 bytes: 20 wasted.
    for name in ["s1", "s2", "s3"] {
        fs::write(root.join(name), vec![b's'; 10]).unwrap();
    }
    // Two copies of 40 bytes: 40 wasted.
    for name in ["l1", "l2"] {
        fs::write(root.join(name), vec![b'l'; 40]).unwrap();
    }
    // Two copies of 20 bytes: 20 wasted, larger size than the first group.
    for name in ["m1", "m2"] {
        fs::write(root.join(name), vec![b'm'; 20]).unwrap();
    }

    let mut inventory = scan(root);
    let report = DuplicateFinder::new().find_in_inventory(&mut inventory);

    let summary: Vec<_> = report.groups.iter().map(|g| (g.wasted_bytes, g.size)).collect();
    assert_eq!(summary, vec![(40, 40), (20, 20), (20, 10)]);
    assert_eq!(report.total_wasted_space, 80);
    assert_eq!(report.total_duplicate_files(), 7);

    for group in &report.groups {
        assert_eq!(group.wasted_bytes, group.size * (group.count() as u64 - 1));
        assert!(group.members.iter().all(|m| m.size == group.size));
        assert!(group.members.iter().all(|m| m.content_hash() == Some(group.hash)));
    }
}

#[test]
fn test_thread_count_does_not_change_result() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    for i in 0..60 {
        let body = format!("payload-{}", i % 7);
        fs::write(root.join(format!("f{i:02}.bin")), body).unwrap();
    }

    let run = |threads: usize, threshold: usize| {
        let config = DuplicateConfig::builder()
            .threads(threads)
            .parallel_threshold(threshold)
            .build()
            .unwrap();
        let mut inventory = scan(root);
        let report = DuplicateFinder::with_config(config).find_in_inventory(&mut inventory);
        report
            .groups
            .iter()
            .map(|g| (g.hash, g.wasted_bytes, sorted_paths(g.paths())))
            .collect::<Vec<_>>()
    };

    let sequential = run(1, usize::MAX);
    assert_eq!(sequential.len(), 7);
    assert_eq!(run(4, 2), sequential);
    assert_eq!(run(0, 10), sequential);
}

#[test]
fn test_existing_hashes_are_reused() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("one"), "same bytes").unwrap();
    fs::write(root.join("two"), "same bytes").unwrap();

    let mut inventory = scan(root);
    {
        let report = DuplicateFinder::new().find_in_inventory(&mut inventory);
        assert_eq!(report.groups.len(), 1);
    }

    // With the content gone, only recorded hashes can produce a group.
    fs::remove_file(root.join("one")).unwrap();
    fs::remove_file(root.join("two")).unwrap();

    let report = DuplicateFinder::new().find_in_inventory(&mut inventory);
    assert_eq!(report.groups.len(), 1);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_size_filters_and_group_limit() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    for (size, copies) in [(5usize, 2), (50, 2), (500, 2)] {
        for copy in 0..copies {
            fs::write(root.join(format!("{size}-{copy}")), vec![b'z'; size]).unwrap();
        }
    }

    let config = DuplicateConfig::builder().min_size(10u64).max_size(100u64).build().unwrap();
    let mut inventory = scan(root);
    let report = DuplicateFinder::with_config(config).find_in_inventory(&mut inventory);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].size, 50);
    assert_eq!(report.files_analyzed, 2);

    let config = DuplicateConfig::builder().max_groups(2usize).build().unwrap();
    let mut inventory = scan(root);
    let report = DuplicateFinder::with_config(config).find_in_inventory(&mut inventory);
    let sizes: Vec<_> = report.groups.iter().map(|g| g.size).collect();
    assert_eq!(sizes, vec![500, 50]);
    assert_eq!(report.total_wasted_space, 550);
}

#[test]
fn test_empty_files_and_dirs_never_grouped() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("empty1"), "").unwrap();
    fs::write(root.join("empty2"), "").unwrap();
    fs::create_dir(root.join("d1")).unwrap();
    fs::create_dir(root.join("d2")).unwrap();

    let mut inventory = scan(root);
    let report = DuplicateFinder::new().find_in_inventory(&mut inventory);
    assert!(!report.has_duplicates());
    assert_eq!(report.candidates_hashed, 0);
}

#[test]
fn test_empty_input() {
    let mut entries: Vec<FileEntry> = Vec::new();
    let report = DuplicateFinder::new().find_duplicates(&mut entries);
    assert!(report.groups.is_empty());
    assert_eq!(report.total_wasted_space, 0);
    assert_eq!(report.files_analyzed, 0);
}

#[test]
fn test_report_serializes() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("x.md"), "dup").unwrap();
    fs::write(temp.path().join("y.md"), "dup").unwrap();

    let mut inventory = scan(temp.path());
    let report = DuplicateFinder::new().find_in_inventory(&mut inventory);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["total_wasted_space"], 3);
    assert_eq!(json["groups"][0]["extension"], "md");
    assert_eq!(json["groups"][0]["members"].as_array().unwrap().len(), 2);
}
