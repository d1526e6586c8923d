use crate::Options;
use std::fs;
use std::path::Path;

/// Options sized for tests: tiny files so rotation happens after a handful
/// of writes, with the automatic merge trigger pushed out of the way.
pub fn small_options() -> Options {
    Options::default()
        .with_max_file_bytes(100)
        .with_compact_threshold(1000)
}

pub fn count_files(dir: &Path, suffix: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false)
        })
        .count()
}

pub fn largest_data_file_id(dir: &Path) -> u16 {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.ends_with(datafile::DATA_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .filter_map(|e| datafile::file_id_from_path(&e.path()).ok())
        .max()
        .expect("no data files found")
}
