//! Real-process tests for `SystemRunner`.
//!
//! Uses `sh -c` so the scripts control interleaving, exit codes and timing.

use std::time::{Duration, Instant};

use morph::core::types::StreamKind;
use morph::io::notifier::Event;
use morph::io::process::{CommandRunner, Invocation, SystemRunner};
use morph::test_support::RecordingNotifier;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

fn runner() -> SystemRunner {
    SystemRunner::new(Duration::from_secs(10), 64 * 1024)
}

/// Verifies output lines are forwarded in arrival order across both streams.
#[test]
fn streams_lines_in_arrival_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args = sh("echo one; sleep 0.2; echo two >&2; sleep 0.2; echo three");
    let invocation = Invocation {
        program: "sh",
        args: &args,
        cwd: temp.path(),
    };
    let notifier = RecordingNotifier::default();

    let result = runner().run(&invocation, &notifier);

    assert!(result.success());
    assert_eq!(result.stdout, "one\nthree\n");
    assert_eq!(result.stderr, "two\n");
    assert_eq!(
        notifier.log_lines(),
        vec![
            (StreamKind::Stdout, "one".to_string()),
            (StreamKind::Stderr, "two".to_string()),
            (StreamKind::Stdout, "three".to_string()),
        ]
    );
    assert!(matches!(
        notifier.events().first(),
        Some(Event::Info { text }) if text.starts_with("Running: sh -c")
    ));
}

/// Verifies a non-zero exit is reported as data with its code.
#[test]
fn non_zero_exit_is_a_failed_result() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args = sh("echo 'assertion failed' >&2; exit 3");
    let invocation = Invocation {
        program: "sh",
        args: &args,
        cwd: temp.path(),
    };

    let result = runner().run(&invocation, &RecordingNotifier::default());

    assert_eq!(result.exit_code, Some(3));
    assert!(!result.success());
    assert_eq!(result.failure_detail(), "assertion failed");
}

/// Verifies commands run in the invocation's working directory.
#[test]
fn runs_in_working_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
    let args = sh("cat marker.txt");
    let invocation = Invocation {
        program: "sh",
        args: &args,
        cwd: temp.path(),
    };

    let result = runner().run(&invocation, &RecordingNotifier::default());

    assert_eq!(result.stdout, "here");
}

/// Verifies a missing program is a spawn failure with a `Spawn error:` log line.
#[test]
fn missing_program_is_spawn_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args: Vec<String> = Vec::new();
    let invocation = Invocation {
        program: "morph-definitely-not-installed",
        args: &args,
        cwd: temp.path(),
    };
    let notifier = RecordingNotifier::default();

    let result = runner().run(&invocation, &notifier);

    assert_eq!(result.exit_code, None);
    assert!(!result.success());
    assert!(!result.stderr.is_empty());
    let logs = notifier.log_lines();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].0, StreamKind::Stderr);
    assert!(logs[0].1.starts_with("Spawn error:"));
}

/// Verifies a command exceeding its timeout is killed and reported as timed out.
#[test]
fn timeout_kills_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args = sh("echo started; exec sleep 30");
    let invocation = Invocation {
        program: "sh",
        args: &args,
        cwd: temp.path(),
    };
    let runner = SystemRunner::new(Duration::from_millis(300), 1024);
    let started = Instant::now();

    let result = runner.run(&invocation, &RecordingNotifier::default());

    assert!(result.timed_out);
    assert!(!result.success());
    assert_eq!(result.stdout, "started\n");
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// Verifies captured output stops at the limit while truncation is counted.
#[test]
fn output_beyond_limit_is_truncated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let args = sh("printf 'abcdefghij\\n'");
    let invocation = Invocation {
        program: "sh",
        args: &args,
        cwd: temp.path(),
    };
    let runner = SystemRunner::new(Duration::from_secs(10), 4);

    let result = runner.run(&invocation, &RecordingNotifier::default());

    assert!(result.success());
    assert_eq!(result.stdout, "abcd");
    assert_eq!(result.stdout_truncated, 7);
}
