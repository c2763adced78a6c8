//! Cross-process tests against the `sidecar-helper` binary.

mod common;

use std::process::{Child, Command as Process, Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sidecar::{Command, SidecarHost};

use common::{Recorder, init_tracing, unique_name};

fn helper(args: &[&str]) -> Child {
    Process::new(env!("CARGO_BIN_EXE_sidecar-helper"))
        .args(args)
        .env("RUST_LOG", "info")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn sidecar-helper")
}

/// Wait for the child, killing it if it runs for more than ten seconds.
fn finish(mut child: Child) -> Output {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if child.try_wait().expect("try_wait failed").is_some() {
            return child.wait_with_output().expect("wait_with_output failed");
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let output = child.wait_with_output().expect("wait_with_output failed");
            panic!(
                "sidecar-helper did not exit; stderr:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn helper_processes_frames_until_shutdown() {
    init_tracing();
    let name = unique_name("xproc");
    let mut host = SidecarHost::new(&name, 256, Arc::new(Recorder::default())).unwrap();

    let child = helper(&[&format!("--name={}", name), "--capacity=256"]);

    let timeout = Duration::from_secs(10);
    host.send_frame(&Command::process_data(&b"hello"[..]), timeout)
        .unwrap();
    host.send_frame(&Command::ping(), timeout).unwrap();
    host.send_frame(&Command::shutdown(), timeout).unwrap();

    let output = finish(child);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "stderr:\n{}", stderr);
    assert!(stderr.contains("[sidecar-helper] process-data len=5"), "{}", stderr);
    assert!(stderr.contains("[sidecar-helper] ping"), "{}", stderr);
    assert!(stderr.contains("[sidecar-helper] shutdown"), "{}", stderr);

    // The helper consumed everything it was sent.
    assert_eq!(host.available_to_write(), 256);
}

#[test]
fn helper_without_name_is_a_usage_error() {
    let output = finish(helper(&[]));
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn helper_exits_when_region_is_missing() {
    let name = unique_name("xnone");
    let output = finish(helper(&[&format!("--name={}", name)]));
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn helper_checks_capacity() {
    init_tracing();
    let name = unique_name("xcap");
    let _host = SidecarHost::new(&name, 64, Arc::new(Recorder::default())).unwrap();
    let output = finish(helper(&[&format!("--name={}", name), "--capacity=128"]));
    assert_eq!(output.status.code(), Some(3));
}
