use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn command_invalid() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("sapling")?;
    cmd.arg("foobar");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("recognized"));

    Ok(())
}

#[test]
fn command_place_help() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("sapling")?;
    let output = cmd.arg("place").arg("--help").output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert!(output.status.success());
    assert!(stdout.contains("--ali-threads"));
    assert!(stdout.contains("--load-scores"));

    Ok(())
}

#[test]
fn command_place_requires_file() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("sapling")?;
    cmd.arg("place");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--file"));

    Ok(())
}
