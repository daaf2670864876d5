use std::fs;
use std::path::Path;

pub fn value(i: u64) -> Vec<u8> {
    format!("testing record {i}").into_bytes()
}

/// Number of `.store` files in the log directory — one per segment.
pub fn store_file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "store")
                .unwrap_or(false)
        })
        .count()
}

/// Number of `.index` files in the log directory.
pub fn index_file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "index")
                .unwrap_or(false)
        })
        .count()
}
