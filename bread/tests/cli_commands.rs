//! CLI tests for the `bread` binary.
//!
//! Spawns the binary against a temporary site file and checks exit codes
//! and stdout.

use std::process::{Command, Output};

use bread::exit_codes;
use bread::test_support::{SITE_TOML, TempSite};

fn bread(site: &TempSite, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bread"))
        .current_dir(site.dir())
        .args(args)
        .output()
        .expect("run bread")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_reads_bread_toml_from_current_dir() {
    let site = TempSite::new(SITE_TOML).expect("site");
    let output = bread(&site, &["check"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    assert!(out.contains("testmodels\tBreadTestModel\tviews=BREAD"), "{out}");
    assert!(out.contains("ok: 3 models, 1 breads"), "{out}");
}

#[test]
fn check_fails_without_site_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_bread"))
        .current_dir(temp.path())
        .arg("check")
        .status()
        .expect("run bread");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn check_rejects_invalid_bread() {
    let broken = SITE_TOML.replace(
        "plural_name = \"testmodels\"",
        "plural_name = \"testmodels\"\nviews = \"BX\"",
    );
    let site = TempSite::new(&broken).expect("site");
    let output = bread(&site, &["check"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown view letter 'X'"));
}

#[test]
fn urls_lists_every_view() {
    let site = TempSite::new(SITE_TOML).expect("site");
    let output = bread(&site, &["urls"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    assert!(out.contains("browse_testmodels\ttestmodels/\t"), "{out}");
    assert!(out.contains("edit_breadtestmodel\ttestmodels/<int:pk>/edit/\t"), "{out}");

    let output = bread(&site, &["urls", "--no-prefix"]);
    assert!(stdout(&output).contains("read_breadtestmodel\t<int:pk>/\t"));
}

#[test]
fn order_appends_default_ordering() {
    let site = TempSite::new(SITE_TOML).expect("site");
    let output = bread(&site, &["order", "--bread", "testmodels", "-o", "-1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "-other__text\nname\n");
}

#[test]
fn order_on_unsortable_column_is_a_bad_request() {
    let site = TempSite::new(SITE_TOML).expect("site");
    let output = bread(&site, &["order", "--bread", "testmodels", "-o", "2"]);
    assert_eq!(output.status.code(), Some(exit_codes::BAD_REQUEST));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a valid column number"));
}

#[test]
fn search_matches_across_relations() {
    let site = TempSite::new(SITE_TOML).expect("site");
    let output = bread(&site, &["search", "--bread", "testmodels", "-q", "rhino"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "3\tAnn\n1\tRudy Vallee\n");
}
