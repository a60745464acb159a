use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

/// Flags that turn every privileged step off, so the launch is a plain
/// gated fork any user can run
const UNPRIVILEGED: [&str; 4] = ["--no-user", "--no-net", "--no-mount", "--no-interface"];

fn launcher() -> Command {
    Command::new(env!("CARGO_BIN_EXE_launcher"))
}

#[test]
fn test_help_command() {
    launcher()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Launch a program in new user, network and mount namespaces",
        ))
        .stdout(predicate::str::contains("--id-map"))
        .stdout(predicate::str::contains("--interface"))
        .stdout(predicate::str::contains("--helper"))
        .stdout(predicate::str::contains("--propagate-exit"))
        .stdout(predicate::str::contains("<PROGRAM>"));
}

#[test]
fn test_version_command() {
    launcher()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("launcher"));
}

#[test]
fn test_missing_program() {
    launcher()
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_invalid_id_map() {
    launcher()
        .args(["--id-map", "0:1000", "/bin/true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INNER:OUTER:LENGTH"));
}

#[test]
fn test_id_map_must_cover_root() {
    launcher()
        .args(["--id-map", "1:1000:10", "--no-interface", "/bin/true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cover in-namespace id 0"));
}

#[test]
fn test_invalid_interface_name() {
    launcher()
        .args(["--interface", "a-name-far-too-long-for-linux", "/bin/true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Interface name"));
}

#[test]
fn test_unprivileged_echo() {
    launcher()
        .args(UNPRIVILEGED)
        .args(["/bin/echo", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::diff("hello\n"));
}

#[test]
fn test_arguments_pass_through_unchanged() {
    launcher()
        .args(UNPRIVILEGED)
        .args(["/bin/sh", "-c", "printf '%s|' \"$@\"", "sh", "-n", "two words", "--x"])
        .assert()
        .success()
        .stdout(predicate::str::diff("-n|two words|--x|"));
}

#[test]
fn test_exit_status_ignored_by_default() {
    launcher()
        .args(UNPRIVILEGED)
        .args(["/bin/sh", "-c", "exit 3"])
        .assert()
        .code(0);
}

#[test]
fn test_propagate_exit() {
    launcher()
        .arg("--propagate-exit")
        .args(UNPRIVILEGED)
        .args(["/bin/sh", "-c", "exit 3"])
        .assert()
        .code(3);
}

#[test]
fn test_nonexistent_program() {
    launcher()
        .args(UNPRIVILEGED)
        .arg("/nonexistent/program")
        .assert()
        .code(0)
        .stderr(predicate::str::contains("Exec error"));
}

#[test]
fn test_nonexistent_program_propagated() {
    launcher()
        .arg("--propagate-exit")
        .args(UNPRIVILEGED)
        .arg("/nonexistent/program")
        .assert()
        .code(127);
}

#[test]
fn test_interface_needs_network_namespace() {
    launcher()
        .args(["--no-user", "--no-net", "--no-mount"])
        .args(["--interface", "eth0", "/bin/echo", "should-not-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("should-not-run").not())
        .stderr(predicate::str::contains("requires a network namespace"));
}

#[test]
fn test_no_net_skips_default_interface() {
    // No --no-interface: the default interface is dropped with the namespace.
    launcher()
        .args(["--no-user", "--no-net", "--no-mount", "/bin/echo", "ran"])
        .assert()
        .success()
        .stdout(predicate::str::diff("ran\n"));
}

#[test]
fn test_config_file_completed_by_flags() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"interface": "waytoolonginterface"}}"#).unwrap();

    launcher()
        .arg("--config")
        .arg(file.path())
        .args(UNPRIVILEGED)
        .args(["/bin/echo", "fixed"])
        .assert()
        .success()
        .stdout(predicate::str::diff("fixed\n"));
}

#[test]
fn test_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "namespaces": {{ "user": false, "network": false, "mount": false }},
            "interface": null
        }}"#
    )
    .unwrap();

    launcher()
        .arg("--config")
        .arg(file.path())
        .args(["/bin/echo", "from-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-config"));
}

#[test]
fn test_invalid_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();

    launcher()
        .arg("--config")
        .arg(file.path())
        .arg("/bin/true")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_verbose_logs_to_stderr() {
    launcher()
        .arg("--verbose")
        .args(UNPRIVILEGED)
        .args(["/bin/echo", "quiet-stdout"])
        .assert()
        .success()
        .stdout(predicate::str::diff("quiet-stdout\n"))
        .stderr(predicate::str::contains("Launch configuration"));
}

#[test]
fn test_identity_map_needs_privilege() {
    // Skip if running as root
    if is_root() {
        return;
    }

    launcher()
        .args(["--no-interface", "/bin/echo", "should-not-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("should-not-run").not())
        .stderr(predicate::str::contains("Not running as root"));
}

#[test]
#[ignore] // Requires root
fn test_full_isolation_as_root() {
    if !is_root() {
        return;
    }

    launcher()
        .args(["--no-interface", "/bin/sh", "-c", "echo $(id -u):$(id -g)"])
        .assert()
        .success()
        .stdout(predicate::str::diff("0:0\n"));
}

#[test]
#[ignore] // Requires root
fn test_full_isolation_has_fresh_network_namespace() {
    if !is_root() {
        return;
    }

    let host = std::fs::read_link("/proc/self/ns/net").unwrap();
    let host = host.to_string_lossy().into_owned();

    launcher()
        .args(["--no-interface", "/bin/readlink", "/proc/self/ns/net"])
        .assert()
        .success()
        .stdout(predicate::str::contains("net:["))
        .stdout(predicate::str::contains(host).not());
}

#[test]
#[ignore] // Requires root
fn test_deny_setgroups_as_root() {
    if !is_root() {
        return;
    }

    launcher()
        .args(["--no-interface", "--deny-setgroups", "/bin/cat", "/proc/self/setgroups"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deny"));
}

#[test]
#[ignore] // Requires root
fn test_failing_helper_aborts_launch() {
    if !is_root() {
        return;
    }

    launcher()
        .args(["--interface", "eth0", "--helper", "/bin/false"])
        .args(["/bin/echo", "should-not-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("should-not-run").not())
        .stderr(predicate::str::contains("Migration error (helper)"));
}

#[test]
#[ignore] // Requires root
fn test_missing_helper_aborts_launch() {
    if !is_root() {
        return;
    }

    launcher()
        .args(["--helper", "/nonexistent/helper"])
        .args(["/bin/echo", "should-not-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("should-not-run").not())
        .stderr(predicate::str::contains("Migration error (exec)"));
}
