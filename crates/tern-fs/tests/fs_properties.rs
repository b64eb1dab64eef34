use tern_fs::{
    AnyStats, Contents, Fs, MkdirOptions, OpendirOptions, ReadArgs, ReadFileOptions, ReadRequest,
    StatOptions, StatsBase, WriteFileOptions,
};
use tempfile::tempdir;
use tokio::sync::oneshot;

fn sample_payloads() -> Vec<Vec<u8>> {
    vec![
        Vec::new(),
        vec![0],
        b"plain ascii".to_vec(),
        (0..=255u8).collect(),
        "ünïcödé ✓".as_bytes().to_vec(),
        vec![0xff; 70_000],
        (0..200_000u32).map(|i| (i * 31 % 251) as u8).collect(),
    ]
}

#[test]
fn write_file_then_read_file_round_trips() {
    let dir = tempdir().expect("tempdir");
    let fs = Fs::std();
    for (i, payload) in sample_payloads().into_iter().enumerate() {
        let path = dir.path().join(format!("payload-{i}"));
        fs.write_file_sync(&path, payload.clone(), WriteFileOptions::default())
            .expect("write");
        let read = fs
            .read_file_sync(&path, ReadFileOptions::default())
            .expect("read");
        assert_eq!(read, Contents::Buffer(payload), "payload {i}");
    }
}

#[test]
fn bigint_size_matches_number_size() {
    let dir = tempdir().expect("tempdir");
    let fs = Fs::std();
    for (i, payload) in sample_payloads().into_iter().enumerate() {
        let path = dir.path().join(format!("sized-{i}"));
        std::fs::write(&path, &payload).expect("seed");
        let number = fs.stat_sync(&path).expect("stat");
        let big = fs
            .stat_sync_with(
                &path,
                StatOptions {
                    bigint: true,
                    ..Default::default()
                },
            )
            .expect("stat")
            .expect("present");
        let AnyStats::BigInt(big) = big else {
            panic!("expected bigint stats");
        };
        assert_eq!(big.size, number.size);
        assert_eq!(big.size, payload.len() as u64);
    }
}

#[test]
fn dir_yields_n_entries_then_none_then_closed() {
    for n in [0usize, 1, 31, 32, 33, 100] {
        let dir = tempdir().expect("tempdir");
        for i in 0..n {
            std::fs::write(dir.path().join(format!("e{i}")), b"").expect("seed");
        }
        let fs = Fs::std();
        let handle = fs
            .opendir_sync(dir.path(), OpendirOptions::default())
            .expect("opendir");
        for _ in 0..n {
            let entry = handle.read_sync().expect("read").expect("entry");
            assert_ne!(entry.name, ".");
            assert_ne!(entry.name, "..");
        }
        assert!(handle.read_sync().expect("read").is_none(), "n = {n}");
        handle.close_sync().expect("close");
        let err = handle.read_sync().expect_err("closed");
        assert_eq!(err.code, "ERR_DIR_CLOSED");
    }
}

#[test]
fn rename_requires_source_and_free_destination() {
    let dir = tempdir().expect("tempdir");
    let fs = Fs::std();
    let names = ["a", "b", "c"];
    for src in names {
        for dst in names {
            if src == dst {
                continue;
            }
            let src_path = dir.path().join(src);
            let dst_path = dir.path().join(dst);
            let err = fs.rename_sync(&src_path, &dst_path).expect_err("missing src");
            assert_eq!(err.code, "ENOENT");

            std::fs::write(&src_path, b"s").expect("seed");
            std::fs::write(&dst_path, b"d").expect("seed");
            let err = fs.rename_sync(&src_path, &dst_path).expect_err("dst exists");
            assert_eq!(err.code, "EEXIST");
            assert_eq!(std::fs::read(&dst_path).expect("read"), b"d");

            std::fs::remove_file(&src_path).expect("cleanup");
            std::fs::remove_file(&dst_path).expect("cleanup");
        }
    }
}

#[tokio::test]
async fn zero_length_read_is_rejected_for_any_fd() {
    let dir = tempdir().expect("tempdir");
    let fs = Fs::std();
    let path = dir.path().join("f");
    std::fs::write(&path, b"data").expect("seed");
    let valid = fs.open_sync(&path, "r", None).expect("open");

    for fd in [valid, 9999, -1] {
        let mut empty: [u8; 0] = [];
        let err = fs
            .read_sync(fd, &mut empty, ReadArgs::default())
            .expect_err("sync");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");

        let err = fs
            .read(fd, ReadRequest::Into(Vec::new(), ReadArgs::default()), |_| {})
            .expect_err("callback");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    }
    fs.close_sync(valid).expect("close");
}

#[tokio::test]
async fn recursive_mkdir_reports_first_created_ancestor() {
    let root = tempdir().expect("tempdir");
    let fs = Fs::std();
    let target = root.path().join("a/b/c");
    let options = MkdirOptions {
        recursive: true,
        ..Default::default()
    };

    let first = fs.mkdir_sync(&target, options).expect("mkdir");
    assert_eq!(first, Some(root.path().join("a").to_string_lossy().into_owned()));
    assert_eq!(fs.mkdir_sync(&target, options).expect("again"), None);

    let deeper = root.path().join("a/b/c/d/e");
    let (tx, rx) = oneshot::channel();
    fs.mkdir(&deeper, options, move |r| {
        let _ = tx.send(r);
    })
    .expect("scheduled");
    let first = rx.await.expect("callback").expect("mkdir");
    assert_eq!(first, Some(root.path().join("a/b/c/d").to_string_lossy().into_owned()));
}

#[test]
fn invalid_utf8_byte_paths_are_rejected_not_rewritten() {
    let fs = Fs::std();
    let err = fs
        .stat_sync(b"/tmp/\xff\xfe".to_vec())
        .expect_err("invalid utf-8");
    assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    assert_eq!(err.syscall, None);

    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join("ok"), b"").expect("seed");
    let bytes = dir.path().join("ok").to_str().expect("utf8").as_bytes().to_vec();
    assert!(fs.stat_sync(bytes).expect("stat").is_file());
}
