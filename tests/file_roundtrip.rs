//! End-to-end reads and writes through the engine and the bundled event loop.

use safer_aio::{
    initialize_logger, is_io_uring_available, AioEngine, BackendKind, ConfigBuilder, EventLoop,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn backend_kinds() -> Vec<BackendKind> {
    let mut kinds = vec![BackendKind::ThreadPool];
    if is_io_uring_available() {
        kinds.push(BackendKind::IoUring);
    }
    kinds
}

fn engine_for(kind: BackendKind) -> (AioEngine, EventLoop) {
    initialize_logger();
    let event_loop = EventLoop::new();
    let config = ConfigBuilder::new()
        .backend(kind)
        .worker_threads(2)
        .build()
        .unwrap();
    let engine = AioEngine::new(event_loop.reactor(), config).unwrap();
    (engine, event_loop)
}

#[test]
fn test_read_whole_file() {
    for kind in backend_kinds() {
        let (engine, event_loop) = engine_for(kind);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, b"whole file contents").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .read_file(&path, move |outcome| {
                sink.lock()
                    .unwrap()
                    .push((outcome.path().to_path_buf(), outcome.content().to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(event_loop.run().unwrap(), 1, "{kind}");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "callback must run exactly once");
        assert_eq!(seen[0].0, path);
        assert_eq!(seen[0].1, b"whole file contents");
        assert_eq!(engine.pending_requests(), 0);
    }
}

#[test]
fn test_write_then_read_back() {
    for kind in backend_kinds() {
        let (engine, event_loop) = engine_for(kind);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.bin");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let written = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&written);
        engine
            .write_file_with(&path, &payload, move |outcome| {
                *sink.lock().unwrap() = Some(outcome.written());
                Ok(())
            })
            .unwrap();
        event_loop.run().unwrap();

        assert_eq!(*written.lock().unwrap(), Some(payload.len()), "{kind}");
        assert_eq!(std::fs::read(&path).unwrap(), payload);

        let read_back = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&read_back);
        engine
            .read_file(&path, move |outcome| {
                sink.lock().unwrap().extend_from_slice(outcome.content());
                Ok(())
            })
            .unwrap();
        event_loop.run().unwrap();
        assert_eq!(*read_back.lock().unwrap(), payload);
    }
}

#[test]
fn test_write_truncates_existing_file() {
    let (engine, event_loop) = engine_for(BackendKind::ThreadPool);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shrink.txt");
    std::fs::write(&path, b"a much longer original body").unwrap();

    engine.write_file(&path, b"short").unwrap();
    event_loop.run().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"short");
}

#[test]
fn test_many_files_in_flight() {
    for kind in backend_kinds() {
        let (engine, event_loop) = engine_for(kind);
        let dir = tempfile::tempdir().unwrap();
        let results: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>> = Arc::new(Mutex::new(HashMap::new()));

        for i in 0..20 {
            let path = dir.path().join(format!("file-{i}.txt"));
            std::fs::write(&path, format!("contents of file {i}")).unwrap();

            let sink = Arc::clone(&results);
            engine
                .read_file(&path, move |outcome| {
                    sink.lock()
                        .unwrap()
                        .insert(outcome.path().to_path_buf(), outcome.content().to_vec());
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(engine.pending_requests(), 20);

        assert_eq!(event_loop.run().unwrap(), 20, "{kind}");
        let results = results.lock().unwrap();
        for i in 0..20 {
            let path = dir.path().join(format!("file-{i}.txt"));
            assert_eq!(results[&path], format!("contents of file {i}").as_bytes());
        }

        let stats = engine.stats();
        assert_eq!(stats.reads_submitted, 20);
        assert_eq!(stats.completions, 20);
        assert_eq!(stats.descriptors_closed, 20);
        assert_eq!(stats.completion_errors(), 0);
    }
}

#[test]
fn test_file_at_size_ceiling() {
    let event_loop = EventLoop::new();
    let config = ConfigBuilder::new()
        .backend(BackendKind::ThreadPool)
        .max_file_size(64 * 1024)
        .build()
        .unwrap();
    let engine = AioEngine::new(event_loop.reactor(), config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exact.bin");
    std::fs::write(&path, vec![7u8; 64 * 1024]).unwrap();

    let length = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&length);
    engine
        .read_file(&path, move |outcome| {
            *sink.lock().unwrap() = outcome.content().len();
            Ok(())
        })
        .unwrap();
    event_loop.run().unwrap();

    assert_eq!(*length.lock().unwrap(), 64 * 1024);
}

#[test]
fn test_descriptor_level_round_trip() {
    for kind in backend_kinds() {
        let (engine, event_loop) = engine_for(kind);
        let file = tempfile::tempfile().unwrap();
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&file);

        engine
            .write_at(fd, b"0123456789", 0, "scratch", |_| Ok(()))
            .unwrap();
        event_loop.run().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .read_at(fd, 4, 3, "scratch", move |outcome| {
                sink.lock().unwrap().extend_from_slice(outcome.content());
                Ok(())
            })
            .unwrap();
        event_loop.run().unwrap();

        assert_eq!(*seen.lock().unwrap(), b"3456", "{kind}");
        assert_eq!(engine.stats().descriptors_closed, 0);
    }
}

/// Directory on the build disk; tmpfs rejects `O_DIRECT`.
#[cfg(target_os = "linux")]
fn direct_io_dir() -> Option<tempfile::TempDir> {
    use std::os::unix::fs::OpenOptionsExt;

    let dir = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap();
    let check = dir.path().join("o_direct");
    std::fs::write(&check, b"x").unwrap();
    let opened = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECT)
        .open(&check);
    match opened {
        Ok(_) => Some(dir),
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            eprintln!("skipping: {} does not support O_DIRECT", dir.path().display());
            None
        }
        Err(e) => panic!("probing O_DIRECT: {e}"),
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_direct_io_read_around_page_boundary() {
    let Some(dir) = direct_io_dir() else {
        return;
    };
    let page = safer_aio::buffer::page_size();

    for kind in backend_kinds() {
        let event_loop = EventLoop::new();
        let config = ConfigBuilder::new()
            .backend(kind)
            .worker_threads(2)
            .direct_io(true)
            .build()
            .unwrap();
        let engine = AioEngine::new(event_loop.reactor(), config).unwrap();

        for size in [10, page, page + 904] {
            let path = dir.path().join(format!("direct-{kind}-{size}.bin"));
            let contents: Vec<u8> = (0..size).map(|i| (i % 241) as u8).collect();
            std::fs::write(&path, &contents).unwrap();

            let seen = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&seen);
            engine
                .read_file(&path, move |outcome| {
                    *sink.lock().unwrap() = Some((outcome.is_short(), outcome.content().to_vec()));
                    Ok(())
                })
                .unwrap();
            assert_eq!(event_loop.run().unwrap(), 1, "{kind} {size}");

            let (short, content) = seen.lock().unwrap().take().unwrap();
            assert!(!short, "{kind} {size}");
            assert_eq!(content, contents, "{kind} {size}");
        }

        let stats = engine.stats();
        assert_eq!(stats.completions, 3, "{kind}");
        assert_eq!(stats.descriptors_closed, 3);
        assert_eq!(stats.buffers_released, 3);
        assert_eq!(stats.completion_errors(), 0);
    }
}
