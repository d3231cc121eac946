use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::new(env!("CARGO_BIN_EXE_knowme-tui"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::new(env!("CARGO_BIN_EXE_knowme-tui"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("KnowMe").and(predicate::str::contains("--version")));
}

#[test]
fn short_version_flag_matches_long() {
    let long = Command::new(env!("CARGO_BIN_EXE_knowme-tui"))
        .arg("--version")
        .output()
        .expect("run knowme-tui --version");
    let short = Command::new(env!("CARGO_BIN_EXE_knowme-tui"))
        .arg("-V")
        .output()
        .expect("run knowme-tui -V");
    assert_eq!(long.stdout, short.stdout);
}
