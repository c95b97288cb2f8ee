use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn build_state(dir: &Path, name: &str, extra: &[&str]) -> anyhow::Result<String> {
    let state = dir.join(name);
    let state_str = state.to_str().unwrap().to_string();

    let mut cmd = cargo_bin_cmd!("tfam");
    cmd.arg("build")
        .arg("tests/items/pool.tsv")
        .arg("-c")
        .arg("tests/items/mismatch.toml")
        .args(extra)
        .arg("-o")
        .arg(&state_str)
        .assert()
        .success();

    Ok(state_str)
}

fn family_table(state: &str) -> anyhow::Result<String> {
    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd.arg("show").arg(state).output()?;
    Ok(String::from_utf8(output.stdout)?)
}

#[test]
fn command_assign() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let state = build_state(tempdir.path(), "state.json", &[])?;
    let updated = tempdir.path().join("updated.json");

    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd
        .arg("assign")
        .arg(&state)
        .arg("tests/items/new.tsv")
        .arg("--state")
        .arg(updated.to_str().unwrap())
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert!(output.status.success());
    assert_eq!(stdout.lines().count(), 4);
    assert!(stdout.starts_with("#item\tfamily\tstatus"));
    assert!(stdout.contains("\nS\t-\tskipped\t"));
    assert!(stdout
        .lines()
        .any(|l| l.starts_with("A4\t") && l.contains("\tjoined\t")));
    assert!(stdout
        .lines()
        .any(|l| l.starts_with("D1\t") && l.contains("\tjoined\t1.0000\t")));

    // 6 old items and 2 assigned ones, still 3 families
    let table = family_table(updated.to_str().unwrap())?;
    assert_eq!(table.lines().count(), 4);
    assert!(table.contains("C1,D1") || table.contains("D1,C1"));
    assert!(!table.contains("\tS\n") && !table.contains(",S"));

    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd
        .arg("show")
        .arg(updated.to_str().unwrap())
        .arg("--new")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.starts_with("#family\titem\n"));
    assert!(stdout.lines().any(|l| l.ends_with("\tA4")));
    assert!(stdout.lines().any(|l| l.ends_with("\tD1")));

    // a fresh build has no new members
    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd.arg("show").arg(&state).arg("--new").output()?;
    assert_eq!(String::from_utf8(output.stdout)?.lines().count(), 1);

    tempdir.close()?;
    Ok(())
}

#[test]
fn command_assign_duplicate() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let state = build_state(tempdir.path(), "state.json", &[])?;

    let mut cmd = cargo_bin_cmd!("tfam");
    cmd.arg("assign")
        .arg(&state)
        .arg("tests/items/pool.tsv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate item id"));

    tempdir.close()?;
    Ok(())
}

#[test]
fn command_remove() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let state = build_state(tempdir.path(), "state.json", &[])?;
    let updated = tempdir.path().join("removed.json");

    let mut cmd = cargo_bin_cmd!("tfam");
    cmd.arg("remove")
        .arg(&state)
        .arg("A2")
        .arg("C1")
        .arg("-o")
        .arg(updated.to_str().unwrap())
        .assert()
        .success();

    let table = family_table(updated.to_str().unwrap())?;
    assert_eq!(table.lines().count(), 3);
    assert!(!table.contains("A2"));
    assert!(!table.contains("C1"));
    assert!(table.contains("A1,A3") || table.contains("A3,A1"));

    let mut cmd = cargo_bin_cmd!("tfam");
    cmd.arg("remove")
        .arg(&state)
        .arg("nope")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No item with id 'nope'"));

    tempdir.close()?;
    Ok(())
}

#[test]
fn command_split() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let state = build_state(tempdir.path(), "state.json", &["--cut", "10"])?;
    let updated = tempdir.path().join("split.json");

    assert_eq!(family_table(&state)?.lines().count(), 2);

    let mut cmd = cargo_bin_cmd!("tfam");
    cmd.arg("split")
        .arg(&state)
        .arg("1")
        .arg("-o")
        .arg(updated.to_str().unwrap())
        .assert()
        .success()
        .stderr(predicate::str::starts_with("1\t2"));

    let table = family_table(updated.to_str().unwrap())?;
    assert!(table.lines().count() >= 3);
    assert!(table.lines().any(|l| l.starts_with("1\t")));
    assert!(table.lines().any(|l| l.starts_with("2\t")));

    tempdir.close()?;
    Ok(())
}

#[test]
fn command_split_singleton() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let state = build_state(tempdir.path(), "state.json", &[])?;

    // C1 is alone in its family
    let table = family_table(&state)?;
    let c1 = table
        .lines()
        .find(|l| l.ends_with("\tC1"))
        .and_then(|l| l.split('\t').next())
        .unwrap()
        .to_string();

    let mut cmd = cargo_bin_cmd!("tfam");
    cmd.arg("split")
        .arg(&state)
        .arg(&c1)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Can not split family"));

    tempdir.close()?;
    Ok(())
}

#[test]
fn command_related() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    // A3 ends up apart from A1 and A2
    let state = build_state(tempdir.path(), "state.json", &["--linkage", "single", "--cut", "0.5"])?;

    let table = family_table(&state)?;
    let a1 = table
        .lines()
        .find(|l| l.contains("A1"))
        .and_then(|l| l.split('\t').next())
        .unwrap()
        .to_string();

    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd.arg("related").arg(&state).arg(&a1).output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert!(output.status.success());
    assert!(stdout.starts_with("#member\tfamily\tother\tcost\tlog10_p\n"));
    assert!(stdout.lines().any(|l| l.contains("\tA3\t1.0000\t")));

    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd
        .arg("related")
        .arg(&state)
        .arg(&a1)
        .arg("--pvalue")
        .arg("1e-12")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 1);

    tempdir.close()?;
    Ok(())
}

#[test]
fn command_pvalue() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let state = build_state(tempdir.path(), "state.json", &[])?;

    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd
        .arg("pvalue")
        .arg(&state)
        .arg("tests/items/new.tsv")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout.lines().count(), 4);
    assert!(stdout.starts_with("#item\tclosest\tdistance\tsignificant\tlog10_p\n"));

    let mut cmd = cargo_bin_cmd!("tfam");
    let output = cmd
        .arg("pvalue")
        .arg(&state)
        .arg("tests/items/new.tsv")
        .arg("--all")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 1 + 3 * 3);

    // the state is unchanged
    assert_eq!(family_table(&state)?.lines().count(), 4);

    tempdir.close()?;
    Ok(())
}
