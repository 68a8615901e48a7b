#![allow(dead_code)]

use std::path::Path as StdPath;

use psilo_bundle::*;
use walkdir::WalkDir;

pub fn crate_root() -> &'static StdPath {
    StdPath::new(env!("CARGO_MANIFEST_DIR"))
}

/// `testdata` and everything in it, in the order of a sorted recursive walk,
/// with bundle paths relative to the crate root.
pub fn testdata_entries() -> Vec<Entry> {
    WalkDir::new(crate_root().join("testdata"))
        .sort_by_file_name()
        .into_iter()
        .map(|x| {
            let x = x.unwrap();
            Entry::from_real_path(crate_root(), x.path()).unwrap()
        })
        .collect()
}

/// The paths a real recursive walk of `dir` finds, relative to `root`,
/// spelled exactly as the filesystem spells them.
pub fn real_walk(root: &StdPath, dir: &StdPath) -> Vec<String> {
    WalkDir::new(root.join(dir))
        .sort_by_file_name()
        .into_iter()
        .map(|x| {
            let x = x.unwrap();
            let relative = x.path().strip_prefix(root).unwrap();
            relative.to_str().unwrap().replace('\\', "/")
        })
        .collect()
}

/// The paths a real recursive walk of `testdata` finds.
pub fn walked_paths() -> Vec<String> {
    real_walk(crate_root(), StdPath::new("testdata"))
}

pub fn testdata_bundle(quality: Quality) -> Vec<u8> {
    pack(&testdata_entries(), quality).unwrap()
}

pub fn testdata_fs() -> VirtualFs {
    load(testdata_bundle(Quality::default()))
}

pub fn read_real(path: &str) -> Vec<u8> {
    std::fs::read(crate_root().join(path)).unwrap()
}
