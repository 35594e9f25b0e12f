//! End-to-end CLI scenarios, grounded on the literal examples in the build
//! engine description (§8) and on `cargo-geiger`'s `Command::cargo_bin` +
//! `current_dir` integration-test style.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn sake() -> Command {
    Command::cargo_bin("sake").unwrap()
}

fn write_sakefile(dir: &Path, text: &str) {
    fs::write(dir.join("Sakefile"), text).unwrap();
}

const FOUR_OBJECT_SAKEFILE: &str = r#"
compile a:
  help: compile object a
  formula: cat a.c > a.o
  dependencies:
    - a.c
  output:
    - a.o

compile b:
  help: compile object b
  formula: cat b.c > b.o
  dependencies:
    - b.c
  output:
    - b.o

compile c:
  help: compile object c
  formula: cat c.c > c.o
  dependencies:
    - c.c
  output:
    - c.o

compile d:
  help: compile object d
  formula: cat d.c > d.o
  dependencies:
    - d.c
  output:
    - d.o

link:
  help: link the program
  formula: cat a.o b.o c.o d.o > prog
  dependencies:
    - a.o
    - b.o
    - c.o
    - d.o
  output:
    - prog
"#;

fn seed_four_object_program() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_sakefile(dir.path(), FOUR_OBJECT_SAKEFILE);
    for f in ["a.c", "b.c", "c.c", "d.c"] {
        fs::write(dir.path().join(f), "int x;").unwrap();
    }
    dir
}

#[test]
fn clean_build_runs_every_compile_then_link_and_prints_done() {
    let dir = seed_four_object_program();

    sake()
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Running target compile a")
                .and(predicate::str::contains("Running target compile b"))
                .and(predicate::str::contains("Running target compile c"))
                .and(predicate::str::contains("Running target compile d"))
                .and(predicate::str::contains("Running target link"))
                .and(predicate::str::ends_with("Done\n")),
        );

    assert!(dir.path().join("prog").exists());
    for f in ["a.o", "b.o", "c.o", "d.o"] {
        assert!(dir.path().join(f).exists());
    }
    assert!(dir.path().join(".shastore").exists());
}

#[test]
fn idempotent_rerun_emits_only_done() {
    let dir = seed_four_object_program();
    sake().current_dir(dir.path()).assert().success();

    sake()
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout("Done\n");
}

#[test]
fn content_change_rebuilds_only_the_changed_compile_and_link() {
    let dir = seed_four_object_program();
    sake().current_dir(dir.path()).assert().success();

    fs::write(dir.path().join("a.c"), "int a_changed;").unwrap();

    sake()
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Running target compile a")
                .and(predicate::str::contains("Running target link"))
                .and(predicate::str::contains("Running target compile b").not())
                .and(predicate::str::ends_with("Done\n")),
        );
}

#[test]
fn unknown_target_reports_fixed_stderr_and_exits_nonzero() {
    let dir = seed_four_object_program();

    sake()
        .current_dir(dir.path())
        .arg("build twinary")
        .assert()
        .failure()
        .stderr("Error: Couldn't find target 'build twinary' in Sakefile\n");
}

#[test]
fn recon_parallel_plan_matches_fixed_phrasing() {
    let dir = seed_four_object_program();

    sake()
        .current_dir(dir.path())
        .arg("-r")
        .arg("-p")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Would run targets 'compile a, compile b, compile c, compile d' in parallel",
        ).and(predicate::str::contains("Would run target 'link'")));
}

#[test]
fn recon_does_not_create_any_file_other_than_the_store() {
    let dir = seed_four_object_program();

    sake().current_dir(dir.path()).arg("-r").assert().success();

    assert!(!dir.path().join("prog").exists());
    for f in ["a.o", "b.o", "c.o", "d.o"] {
        assert!(!dir.path().join(f).exists());
    }
}

#[test]
fn ties_closure_notice_lists_both_shared_targets() {
    let dir = TempDir::new().unwrap();
    write_sakefile(
        dir.path(),
        r#"
compile a:
  help: compile a
  formula: touch a.o
  dependencies:
    - shared.h
    - a.c
  output:
    - a.o

compile b:
  help: compile b
  formula: touch b.o
  dependencies:
    - shared.h
    - b.c
  output:
    - b.o
"#,
    );
    fs::write(dir.path().join("shared.h"), "").unwrap();
    fs::write(dir.path().join("a.c"), "").unwrap();
    fs::write(dir.path().join("b.c"), "").unwrap();

    sake()
        .current_dir(dir.path())
        .arg("compile a")
        .assert()
        .success()
        .stdout(
            predicate::str::contains(
                "The following targets share dependencies and must be run together:",
            )
            .and(predicate::str::contains("  - compile a"))
            .and(predicate::str::contains("  - compile b")),
        );

    assert!(dir.path().join("b.o").exists());
}

#[test]
fn clean_removes_outputs_and_store() {
    let dir = seed_four_object_program();
    sake().current_dir(dir.path()).assert().success();

    sake()
        .current_dir(dir.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::ends_with("All clean\n"));

    assert!(!dir.path().join("prog").exists());
    assert!(!dir.path().join(".shastore").exists());
}

#[test]
fn help_listing_sorts_names_and_pins_clean_and_visual_last() {
    let dir = seed_four_object_program();

    sake()
        .current_dir(dir.path())
        .arg("help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("clean\tremove all targets' outputs and start from scratch")
                .and(predicate::str::contains(
                    "visual\toutput visual representation of project's dependencies",
                )),
        );
}
