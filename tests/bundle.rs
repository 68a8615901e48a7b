#![cfg(feature = "fs")]

use std::io::Read;

use psilo_bundle::*;

mod common;
use common::*;

#[test]
fn walk_matches_real_walk() {
    let fs = testdata_fs();
    let mut paths = vec![];
    fs.walk("testdata", |path, _| -> Result<()> {
        paths.push(path.to_string());
        Ok(())
    }).unwrap();
    assert_eq!(paths, walked_paths());
    // the iterator agrees
    let iterated: Vec<String> = fs.walk_iter("/testdata/").unwrap()
        .map(|x| x.unwrap().path().to_string()).collect();
    assert_eq!(iterated, paths);
}

#[test]
fn precomposed_names_survive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("t")).unwrap();
    std::fs::write(dir.path().join("t/\u{e9}.txt"), b"accent").unwrap();
    std::fs::write(dir.path().join("t/f.txt"), b"plain").unwrap();
    let entries: Vec<Entry> = walkdir::WalkDir::new(dir.path().join("t"))
        .sort_by_file_name()
        .into_iter()
        .map(|x| Entry::from_real_path(dir.path(), x.unwrap().path())
             .unwrap())
        .collect();
    let fs = load(pack(&entries, Quality::default()).unwrap());
    let mut walked = vec![];
    fs.walk("t", |path, _| -> Result<()> {
        walked.push(path.to_string());
        Ok(())
    }).unwrap();
    let real = real_walk(dir.path(), "t".as_ref());
    assert_eq!(walked, real);
    // U+00E9 sorts after every ASCII name, unless the filesystem itself
    // decomposes names
    if real[2] == "t/\u{e9}.txt" {
        assert_eq!(walked, ["t", "t/f.txt", "t/\u{e9}.txt"]);
    }
    // either spelling opens it
    for path in ["t/\u{e9}.txt", "t/e\u{301}.txt"] {
        let mut content = String::new();
        fs.open(path).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "accent", "{:?}", path);
    }
}

#[test]
fn testdata_keeps_its_spelling() {
    let fs = testdata_fs();
    let names: Vec<String> = fs.open("testdata/intl").unwrap()
        .readdir(0).unwrap().iter()
        .map(|x| x.name().to_string()).collect();
    let real: Vec<String> = real_walk(crate_root(),
                                      "testdata/intl".as_ref())[1..].iter()
        .map(|x| x.rsplit('/').next().unwrap().to_string()).collect();
    assert_eq!(names, real);
    assert_eq!(names.len(), 3);
}

#[test]
fn disk_backed() {
    let fs = VirtualFs::from_disk(crate_root()).unwrap();
    let mut file = fs.open("testdata/index.html").unwrap();
    let mut content = vec![];
    file.read_to_end(&mut content).unwrap();
    assert_eq!(content, read_real("testdata/index.html"));
    // the same walk as a bundle of the same tree
    let mut walked = vec![];
    fs.walk("testdata", |path, _| -> Result<()> {
        walked.push(path.to_string());
        Ok(())
    }).unwrap();
    assert_eq!(walked, walked_paths());
    let packed = testdata_fs();
    for path in walked_paths() {
        let a = fs.stat(&path).unwrap();
        let b = packed.stat(&path).unwrap();
        assert_eq!(a, b, "{}", path);
    }
    assert!(matches!(fs.open("testdata/bad"), Err(Error::NotFound(..))));
    assert!(matches!(fs.stat("bad"), Err(Error::NotFound(..))));
    let mut dir = fs.open("testdata/readdir").unwrap();
    for expected in ["1.txt", "2.txt", "3.txt"] {
        assert_eq!(dir.readdir(1).unwrap()[0].name(), expected);
    }
    assert!(dir.readdir(1).unwrap_err().is_eof());
    let result = fs.walk("testdata", |_, _| Err(Search::Found("x".into())));
    assert!(matches!(result, Err(Search::Found(..))));
}

#[test]
fn content_survives_every_quality() {
    let entries = testdata_entries();
    for level in 0 ..= Quality::MAX.level() {
        let fs = load(testdata_bundle(Quality::new(level).unwrap()));
        for entry in entries.iter().filter(|x| !x.is_dir()) {
            let mut file = fs.open(entry.path()).unwrap();
            let mut content = vec![];
            file.read_to_end(&mut content).unwrap();
            assert_eq!(content, read_real(entry.path().as_str()),
                       "{} at quality {}", entry.path(), level);
        }
    }
}

#[test]
fn kinds_survive() {
    let fs = testdata_fs();
    for entry in testdata_entries() {
        let meta = fs.stat(entry.path()).unwrap();
        assert_eq!(meta.is_dir(), entry.content().is_none(), "{}",
                   entry.path());
        assert_eq!(meta.is_dir(), meta.mode().is_dir());
        assert_eq!(meta.kind(), entry.kind());
        assert_eq!(meta.size(), entry.size());
        assert_eq!(meta.modified_unix(), entry.modified_unix());
        let handle = fs.open(entry.path()).unwrap();
        assert_eq!(handle.is_dir(), entry.is_dir());
    }
}

#[test]
fn times_match_the_real_files() {
    let fs = testdata_fs();
    for path in ["testdata/index.html", "testdata/html"] {
        let real = std::fs::metadata(crate_root().join(path)).unwrap()
            .modified().unwrap()
            .duration_since(std::time::UNIX_EPOCH).unwrap()
            .as_secs();
        let meta = fs.stat(path).unwrap();
        assert_eq!(meta.modified_unix(), real as i64, "{}", path);
        assert_eq!(meta.mod_time(),
                   std::time::UNIX_EPOCH
                   + std::time::Duration::from_secs(real));
    }
}

#[test]
fn seeking() {
    let fs = testdata_fs();
    let original = read_real("testdata/index.html");
    let size = original.len() as i64;
    let mut file = fs.open("testdata/index.html").unwrap();
    assert_eq!(file.size(), size as u64);
    for whence in [Whence::Start, Whence::Current, Whence::End] {
        assert!(matches!(file.seek(size + 1, whence),
                         Err(Error::InvalidArgument("seek: bad offset"))));
    }
    assert_eq!(file.seek(0, Whence::End).unwrap(), size as u64);
    for (k, n) in [(0, 10), (7, 1), (40, 25), (size as usize - 5, 5)] {
        assert_eq!(file.seek(k as i64, Whence::Start).unwrap(), k as u64);
        let mut buf = vec![0; n];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(buf, &original[k .. k + n]);
    }
    assert!(matches!(Whence::try_from(3),
                     Err(Error::InvalidArgument("seek: bad whence"))));
    assert!(matches!(Whence::try_from(-1),
                     Err(Error::InvalidArgument(..))));
}

#[test]
fn readdir_pages() {
    let fs = testdata_fs();
    let mut dir = fs.open("testdata/readdir").unwrap();
    assert_eq!(dir.readdir(-1).unwrap().len(), 3);
    assert_eq!(dir.readdir(0).unwrap().len(), 3);
    for expected in ["1.txt", "2.txt", "3.txt"] {
        let page = dir.readdir(1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name(), expected);
        assert_eq!(page[0].path().parent().unwrap(), "testdata/readdir");
    }
    assert!(dir.readdir(1).unwrap_err().is_eof());
}

#[test]
fn missing_things() {
    let fs = testdata_fs();
    assert!(matches!(fs.stat("testdata/nope.html"), Err(Error::NotFound(..))));
    match fs.open("testdata/nope.html") {
        Err(x) => assert_eq!(x.kind(), std::io::ErrorKind::NotFound),
        Ok(x) => panic!("opened a file that doesn't exist: {:?}", x),
    }
    assert!(!fs.exists("testdata/index.htm"));
    assert!(fs.exists("testdata/index.html"));
}

#[test]
#[should_panic]
fn loading_nothing_panics() {
    load(Vec::new());
}

#[test]
fn closed_handles() {
    let fs = testdata_fs();
    let mut file = fs.open("testdata/index.html").unwrap();
    file.close().unwrap();
    assert!(matches!(file.read(&mut [0; 1]), Err(Error::Closed)));
    assert!(matches!(file.seek(0, Whence::Start), Err(Error::Closed)));
    assert!(matches!(file.readdir(0), Err(Error::Closed)));
    assert!(matches!(file.close(), Err(Error::Closed)));
    assert_eq!(file.name(), "index.html");
    file.reopen().unwrap();
    let mut buf = [0; 1];
    assert_eq!(file.read(&mut buf).unwrap(), 1);
    assert_eq!(buf[0], b'<');
}

#[derive(Debug)]
enum Search {
    Found(String),
    Fs(Error),
}

impl From<Error> for Search {
    fn from(x: Error) -> Search { Search::Fs(x) }
}

#[test]
fn walk_stops_when_told() {
    let fs = testdata_fs();
    let mut visited = vec![];
    let result = fs.walk("testdata", |path, meta| {
        visited.push(path.to_string());
        if !meta.is_dir() && path.file_name() == "2.txt" {
            Err(Search::Found(path.to_string()))
        }
        else { Ok(()) }
    });
    match result {
        Err(Search::Found(x)) => assert_eq!(x, "testdata/readdir/2.txt"),
        x => panic!("expected to find 2.txt, got {:?}", x),
    }
    let expected = walked_paths();
    let stop = expected.iter().position(|x| x == "testdata/readdir/2.txt")
        .unwrap();
    assert_eq!(visited, &expected[..= stop]);
    match fs.walk("testdata/nowhere", |_, _| Ok(())) {
        Err(Search::Fs(Error::NotFound(..))) => (),
        x => panic!("expected NotFound, got {:?}", x),
    }
}

#[test]
fn shared_between_threads() {
    let fs = testdata_fs();
    let original = read_real("testdata/index.html");
    std::thread::scope(|scope| {
        for _ in 0 .. 8 {
            let fs = fs.clone();
            let original = &original;
            scope.spawn(move || {
                for _ in 0 .. 10 {
                    let mut file = fs.open("testdata/index.html").unwrap();
                    let mut content = vec![];
                    file.read_to_end(&mut content).unwrap();
                    assert_eq!(&content, original);
                }
            });
        }
    });
}

#[test]
fn one_corrupt_entry() {
    let bundle = pack(&[
        Entry::file(PathBuf::from_str("good.txt"), 0,
                    b"good content, nothing wrong here".to_vec()),
        Entry::file(PathBuf::from_str("bad.txt"), 0,
                    b"this one is about to be damaged".to_vec()),
    ], Quality::default()).unwrap();
    let mut bundle = bundle;
    // the last payload's checksum
    let last = bundle.len() - 1;
    bundle[last] ^= 0xFF;
    let fs = load(bundle);
    assert_eq!(fs.stat("bad.txt").unwrap().size(), 31);
    match fs.open("bad.txt") {
        Err(Error::CorruptBundle { path, .. }) => assert_eq!(path, "bad.txt"),
        x => panic!("expected CorruptBundle, got {:?}", x),
    }
    // and again, it isn't cached as good
    assert!(fs.open("bad.txt").is_err());
    let mut good = fs.open("good.txt").unwrap();
    let mut content = String::new();
    good.read_to_string(&mut content).unwrap();
    assert_eq!(content, "good content, nothing wrong here");
}

#[test]
fn synthesized_parents() {
    // only the files, none of the directories
    let files: Vec<Entry> = testdata_entries().into_iter()
        .filter(|x| !x.is_dir()).collect();
    let fs = load(pack(&files, Quality::FASTEST).unwrap());
    let paths: Vec<String> = fs.walk_iter("testdata").unwrap()
        .map(|x| x.unwrap().path().to_string()).collect();
    assert_eq!(paths, walked_paths());
    let css = fs.stat("testdata/assets/css").unwrap();
    assert!(css.is_dir());
    assert_eq!(css.modified_unix(), 0);
}

#[tokio::test]
async fn streams_with_tokio() {
    let fs = testdata_fs();
    let mut file = fs.open("testdata/assets/css/site.css").unwrap();
    let mut out: Vec<u8> = vec![];
    tokio::io::copy(&mut file, &mut out).await.unwrap();
    assert_eq!(out, read_real("testdata/assets/css/site.css"));
}
