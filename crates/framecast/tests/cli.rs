#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/fccli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn framecast() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_framecast"));
    cmd.env_remove("FRAMECAST_SOCKET")
        .arg("--log-level")
        .arg("error");
    cmd
}

#[test]
fn version_prints_package_version() {
    let output = framecast().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("framecast {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn stream_frames_reach_listener() {
    let dir = unique_temp_dir("stream");
    let sock_path = dir.join("capture.sock");
    let image_path = dir.join("frame.jpg");
    std::fs::write(&image_path, [0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4, 0xFF, 0xD9])
        .expect("image should be writable");

    let listener = framecast()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&sock_path)
        .arg("--count")
        .arg("2")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    let streamer = framecast()
        .arg("--format")
        .arg("json")
        .arg("stream")
        .arg(&sock_path)
        .arg("--file")
        .arg(&image_path)
        .arg("--width")
        .arg("640")
        .arg("--height")
        .arg("480")
        .arg("--orientation")
        .arg("6")
        .arg("--fps")
        .arg("50")
        .arg("--frames")
        .arg("6")
        .arg("--stride")
        .arg("3")
        .output()
        .expect("stream should run");
    assert!(
        streamer.status.success(),
        "stream failed: {}",
        String::from_utf8_lossy(&streamer.stderr)
    );
    let summary = String::from_utf8_lossy(&streamer.stdout);
    assert!(summary.contains("\"frames_seen\":6"));
    assert!(summary.contains("\"accepted\":2"));

    let output = listener.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        assert!(line.contains("\"width\":640"));
        assert!(line.contains("\"height\":480"));
        assert!(line.contains("\"orientation\":6"));
        assert!(line.contains("\"payload_size\":10"));
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stream_without_consumer_times_out_with_124() {
    let dir = unique_temp_dir("timeout");
    let image_path = dir.join("frame.jpg");
    std::fs::write(&image_path, b"jpeg").expect("image should be writable");

    let start = Instant::now();
    let output = framecast()
        .arg("stream")
        .arg(dir.join("missing.sock"))
        .arg("--file")
        .arg(&image_path)
        .arg("--connect-timeout")
        .arg("200ms")
        .output()
        .expect("stream should run");

    assert_eq!(output.status.code(), Some(124));
    assert!(start.elapsed() < Duration::from_secs(5));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("consumer not listening"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stream_rejects_missing_image() {
    let dir = unique_temp_dir("noimage");

    let output = framecast()
        .arg("stream")
        .arg(dir.join("capture.sock"))
        .arg("--file")
        .arg(dir.join("absent.jpg"))
        .output()
        .expect("stream should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed reading"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_rejects_overlong_socket_path() {
    let long = PathBuf::from(format!("/tmp/{}.sock", "x".repeat(200)));

    let output = framecast()
        .arg("listen")
        .arg(&long)
        .output()
        .expect("listen should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn listen_exits_when_producer_disconnects() {
    let dir = unique_temp_dir("eof");
    let sock_path = dir.join("capture.sock");

    let listener = framecast()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&sock_path)
        .stdout(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    let deadline = Instant::now() + Duration::from_secs(3);
    let stream = loop {
        match std::os::unix::net::UnixStream::connect(&sock_path) {
            Ok(stream) => break stream,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Err(err) => panic!("listener never came up: {err}"),
        }
    };
    drop(stream);

    let output = listener.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}
