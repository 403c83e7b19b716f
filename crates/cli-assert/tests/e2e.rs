//! End-to-end scenarios against real processes.

use std::io::Write;
use std::time::Duration;

use cli_assert::{CmdAssert, line_matching};

#[tokio::test]
async fn echo_hello_joe() {
    let result = CmdAssert::command("echo", ["Hello Joe"])
        .stdout(|s| s.has_lines(["Hello Joe"]).has_line_count(1))
        .execute()
        .await
        .expect("echo must pass");
    assert_eq!(result.exit_code(), 0);
    assert!([10, 11].contains(&result.stdout_byte_count()));
    assert_eq!(result.stderr_byte_count(), 0);
}

#[tokio::test]
async fn write_helper_in_a_working_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = CmdAssert::command("sh", ["-c", "printf 'Hello Dolly' > hello.txt"])
        .cd(dir.path())
        .stdout(|s| s.has_line_count(0))
        .stderr(|s| s.has_line_count(0))
        .execute()
        .await
        .expect("writer must pass");
    assert_eq!(result.exit_code(), 0);
    let written = std::fs::read_to_string(dir.path().join("hello.txt")).expect("hello.txt");
    assert_eq!(written, "Hello Dolly");
}

#[tokio::test]
async fn sleeper_times_out() {
    let result = CmdAssert::command(
        "sh",
        ["-c", "echo 'About to sleep for 500 ms'; sleep 0.5"],
    )
    .stdout(|s| s.has_lines(["About to sleep for 500 ms"]))
    .execute_with_timeout(Duration::from_millis(200))
    .await
    .expect("run");
    assert!(result.timed_out());
    assert_eq!(result.exit_code(), -1);
    assert!(result.duration() >= Duration::from_millis(200));
    result.assert_timeout().expect("assert_timeout must pass");
    let report = result.assert_success().unwrap_err().to_string();
    assert!(report.contains("has not finished within 200 ms"));
}

#[tokio::test]
async fn awaiter_extracts_the_port_from_a_server_banner() {
    let (cmd, port) = CmdAssert::command(
        "sh",
        ["-c", "echo 'listening on port: 4567'; sleep 5"],
    )
    .auto_close_forcibly()
    .stdout_awaits(line_matching(r"listening on port: (\d+)").try_map(|s| s.parse::<u16>()));
    let mut handle = cmd.start().await.expect("start");
    let port = port.wait(Duration::from_secs(10)).await.expect("port");
    assert_eq!(port, 4567);
    handle.kill(true, true);
    let result = handle.wait().await.expect("wait after kill");
    assert_ne!(result.exit_code(), 0);
}

#[tokio::test]
async fn exit_code_template_failure() {
    let err = CmdAssert::command("sh", ["-c", "exit 1"])
        .exit_code_satisfies(|code| code == 42, "Expected 42 but got ${actual}")
        .execute()
        .await
        .unwrap_err();
    assert!(err.to_string().ends_with("Failure 1/1: Expected 42 but got 1"));
}

#[tokio::test]
async fn bounded_capture_frames_the_failure_report() {
    let emit_35 = "i=1; while [ $i -le 35 ]; do echo \"line $i\"; i=$((i+1)); done";
    let err = CmdAssert::command("sh", ["-c", emit_35])
        .stdout(|s| s.capture(3, 3).has_lines(["Foo"]))
        .execute()
        .await
        .unwrap_err();
    let report = err.to_string();
    let head = report.find("    line 1\n").expect("head start");
    let marker = report.find("[29 lines omitted;").expect("omitted marker");
    let tail = report.find("    line 35").expect("tail end");
    assert!(head < marker && marker < tail, "out of order: {report}");
    assert!(report.contains("    line 3\n"));
    assert!(report.contains("    line 33\n"));
    assert!(!report.contains("line 17"));
}

#[tokio::test]
async fn silent_stderr_satisfies_emptiness_checks() {
    CmdAssert::command("echo", ["only stdout"])
        .stderr(|s| s.is_empty().has_byte_count(0))
        .execute()
        .await
        .expect("silent stderr must pass");
}

#[tokio::test]
async fn silent_stream_renders_no_output_in_the_report() {
    let err = CmdAssert::command("true", [] as [&str; 0])
        .stderr(|s| s.has_lines(["never printed"]))
        .execute()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stderr:\n    <no output>"));
}

#[tokio::test]
async fn capture_none_renders_no_lines_captured() {
    let err = CmdAssert::command("sh", ["-c", "echo a; echo b"])
        .stdout(|s| s.capture_none().has_lines(["c"]))
        .execute()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stdout:\n    <no lines captured>"));
}

#[tokio::test]
async fn instant_exit_keeps_assertions_working() {
    let result = CmdAssert::command("true", [] as [&str; 0])
        .execute()
        .await
        .expect("true must pass");
    assert_eq!(result.stdout_byte_count(), 0);
    assert_eq!(result.stderr_byte_count(), 0);

    let err = CmdAssert::command("false", [] as [&str; 0])
        .execute()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Expected exit code 0 but was 1"));
}

#[tokio::test]
async fn interactive_stdin_callback_drives_cat() {
    let (cmd, echoed) = CmdAssert::command("cat", [] as [&str; 0])
        .stdin_with(|sink| {
            writeln!(sink, "ping")?;
            sink.flush()
        })
        .stdout_awaits(line_matching("^ping$"));
    let mut handle = cmd.start().await.expect("start");
    let line = echoed.wait(Duration::from_secs(5)).await.expect("echoed line");
    assert_eq!(line, "ping");
    let result = handle.wait().await.expect("wait");
    result.assert_success().expect("cat run must pass");
}

#[tokio::test]
async fn stdin_file_feeds_the_child() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "alpha\nbeta\n").expect("write input");
    CmdAssert::command("cat", [] as [&str; 0])
        .stdin_file(&input)
        .stdout(|s| s.has_lines(["alpha", "beta"]).has_line_count(2))
        .execute()
        .await
        .expect("cat must pass");
}

#[tokio::test]
async fn redirect_mirrors_stdout_to_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mirror = dir.path().join("mirror.log");
    CmdAssert::command("sh", ["-c", "echo one; echo two"])
        .stdout(|s| s.redirect_to_file(&mirror).has_line_count(2))
        .execute()
        .await
        .expect("run");
    assert_eq!(
        std::fs::read_to_string(&mirror).expect("mirror"),
        "one\ntwo\n"
    );
}

#[tokio::test]
async fn negative_substring_failure_quotes_the_offending_line() {
    let err = CmdAssert::command("sh", ["-c", "echo 'an error occurred'"])
        .stdout(|s| s.does_not_have_lines_containing(["error"]))
        .execute()
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("an >>error<< occurred"),
        "got: {err}"
    );
}

#[tokio::test]
async fn multiple_failures_keep_stream_bucket_order() {
    let err = CmdAssert::command("sh", ["-c", "echo out; echo err 1>&2; exit 3"])
        .stdout(|s| s.has_lines(["missing out"]))
        .stderr(|s| s.has_lines(["missing err"]))
        .execute()
        .await
        .unwrap_err();
    let report = err.to_string();
    assert!(report.starts_with("3 assertion failures occurred while executing"));
    let exit_at = report.find("Expected exit code 0 but was 3").expect("exit");
    let stdout_at = report.find("missing out").expect("stdout");
    let stderr_at = report.find("missing err").expect("stderr");
    assert!(exit_at < stdout_at && stdout_at < stderr_at, "order: {report}");
    assert!(report.contains("Failure 1/3"));
    assert!(report.contains("Failure 3/3"));
}

#[tokio::test]
async fn scope_exit_kills_a_lingering_child() {
    let pid = {
        let handle = CmdAssert::command("sleep", ["30"])
            .auto_close_forcibly()
            .start()
            .await
            .expect("start");
        handle.pid().expect("pid")
    };
    // The drop above signalled the child; give the kernel a beat, then make
    // sure the process is gone (or at most a zombie being reaped by tokio).
    tokio::time::sleep(Duration::from_millis(300)).await;
    let alive = std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .map(|stat| !stat.contains(" Z "))
        .unwrap_or(false);
    assert!(!alive, "child {pid} survived scope exit");
}
