use super::*;

fn pipe_pair() -> (os_pipe::PipeReader, os_pipe::PipeWriter) {
    os_pipe::pipe().expect("pipe")
}

fn read_all(mut reader: os_pipe::PipeReader) -> Vec<u8> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).expect("drain pipe");
    out
}

#[tokio::test]
async fn test_text_source_writes_bytes_and_closes() {
    let (reader, writer) = pipe_pair();
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::Text(b"Hello\n".to_vec()),
        "cli-assert-io-0-stdin".into(),
    );
    let drained = tokio::task::spawn_blocking(move || read_all(reader))
        .await
        .expect("reader task");
    assert_eq!(drained, b"Hello\n");
    assert!(producer.join().await.is_empty());
}

#[tokio::test]
async fn test_file_source_streams_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stdin.txt");
    std::fs::write(&path, b"from a file").expect("write input");

    let (reader, writer) = pipe_pair();
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::File(path),
        "cli-assert-io-0-stdin".into(),
    );
    let drained = tokio::task::spawn_blocking(move || read_all(reader))
        .await
        .expect("reader task");
    assert_eq!(drained, b"from a file");
    assert!(producer.join().await.is_empty());
}

#[tokio::test]
async fn test_missing_file_is_a_failure() {
    let (reader, writer) = pipe_pair();
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::File("/nonexistent/input".into()),
        "cli-assert-io-7-stdin".into(),
    );
    let failures = producer.join().await;
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("[cli-assert-io-7-stdin] stdin file failed:"));
    drop(reader);
}

#[tokio::test]
async fn test_callback_writes_interactively() {
    let (reader, writer) = pipe_pair();
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::Callback(Box::new(|sink| {
            writeln!(sink, "first")?;
            writeln!(sink, "second")?;
            sink.flush()
        })),
        "cli-assert-io-0-stdin".into(),
    );
    let drained = tokio::task::spawn_blocking(move || read_all(reader))
        .await
        .expect("reader task");
    assert_eq!(drained, b"first\nsecond\n");
    assert!(producer.join().await.is_empty());
}

#[tokio::test]
async fn test_callback_error_is_collected() {
    let (reader, writer) = pipe_pair();
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::Callback(Box::new(|_sink| {
            Err(std::io::Error::other("user callback gave up"))
        })),
        "cli-assert-io-1-stdin".into(),
    );
    let failures = producer.join().await;
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("stdin callback failed: user callback gave up"));
    drop(reader);
}

#[tokio::test]
async fn test_writes_after_cancel_fail_with_cancellation_error() {
    let (reader, writer) = pipe_pair();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::Callback(Box::new(move |sink| {
            sink.write_all(b"before\n")?;
            ready_tx.send(()).ok();
            go_rx.recv().ok();
            let err = sink.write_all(b"after\n").expect_err("write past cancel");
            assert!(is_sink_cancelled(&err));
            let err = sink.flush().expect_err("flush past cancel");
            assert!(is_sink_cancelled(&err));
            Err(err)
        })),
        "cli-assert-io-0-stdin".into(),
    );

    tokio::task::spawn_blocking(move || ready_rx.recv())
        .await
        .expect("join")
        .expect("callback started");
    producer.cancel();
    go_tx.send(()).expect("resume callback");

    // The cancellation error must not surface as a failure.
    assert!(producer.join().await.is_empty());
    drop(reader);
}

#[tokio::test]
async fn test_broken_pipe_on_canned_input_is_benign() {
    let (reader, writer) = pipe_pair();
    drop(reader);
    let pool = WorkerPool::shared();
    let mut producer = InputProducer::start(
        &pool,
        writer,
        StdinSource::Text(vec![b'x'; 1 << 20]),
        "cli-assert-io-0-stdin".into(),
    );
    assert!(producer.join().await.is_empty());
}

#[test]
fn test_double_close_is_a_noop() {
    let (reader, writer) = pipe_pair();
    let shared = Arc::new(SinkShared {
        cancelled: AtomicBool::new(false),
        writer: Mutex::new(Some(writer)),
    });
    let mut sink = StdinSink {
        shared: shared.clone(),
    };
    sink.close();
    sink.close();
    let err = sink.write(b"x").expect_err("closed sink");
    assert!(is_sink_cancelled(&err));
    drop(reader);
}
