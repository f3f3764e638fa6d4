//! CLI-level smoke tests: argument surface and exit codes.

mod support;

use assert_cmd::Command;
use predicates::str::contains;
use support::TestRepo;

fn datum() -> Command {
    Command::cargo_bin("datum").expect("binary")
}

#[test]
fn help_works() {
    datum()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("dataset provenance"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        "create", "add", "ls-files", "unlink", "rm", "edit", "export", "import", "update", "tag",
        "ls-tags", "rm-tags",
    ];

    for cmd in subcommands {
        datum()
            .args(["dataset", cmd, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn outside_a_repository_fails_with_state_error() {
    let dir = tempfile::tempdir().unwrap();
    datum()
        .current_dir(dir.path())
        .args(["dataset", "create", "demo"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("error:"));
}

#[test]
fn create_and_list_datasets() {
    let repo = TestRepo::with_initial_commit();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "create", "demo"])
        .assert()
        .success()
        .stdout(contains("Created dataset 'demo'"));

    datum()
        .current_dir(repo.path())
        .args(["dataset", "ls"])
        .assert()
        .success()
        .stdout(contains("demo"));
}

#[test]
fn duplicate_create_exits_with_parameter_code() {
    let repo = TestRepo::with_initial_commit();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "create", "demo"])
        .assert()
        .success();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "create", "demo"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("already exists"));
}

#[test]
fn unknown_dataset_removal_exits_with_parameter_code() {
    let repo = TestRepo::with_initial_commit();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "rm", "ghost"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Unknown datasets"));
}

#[test]
fn add_and_ls_files_and_tags_roundtrip() {
    let repo = TestRepo::with_initial_commit();
    repo.write_file("input/data.csv", "1,2,3\n").unwrap();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "add", "demo", "input/data.csv", "--create"])
        .assert()
        .success();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "ls-files", "demo"])
        .assert()
        .success()
        .stdout(contains("data.csv"));

    datum()
        .current_dir(repo.path())
        .args(["dataset", "tag", "demo", "1.0"])
        .assert()
        .success()
        .stdout(contains("Tagged 'demo' as '1.0'"));

    datum()
        .current_dir(repo.path())
        .args(["dataset", "ls-tags", "demo"])
        .assert()
        .success()
        .stdout(contains("1.0"));

    datum()
        .current_dir(repo.path())
        .args(["dataset", "rm-tags", "demo", "1.0"])
        .assert()
        .success();

    // Removing the tag again fails: it no longer exists.
    datum()
        .current_dir(repo.path())
        .args(["dataset", "rm-tags", "demo", "1.0"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("not found"));
}

#[test]
fn invalid_tag_name_is_rejected() {
    let repo = TestRepo::with_initial_commit();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "create", "demo"])
        .assert()
        .success();

    datum()
        .current_dir(repo.path())
        .args(["dataset", "tag", "demo", "not a tag"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Invalid tag name"));
}

#[test]
fn json_output_wraps_errors() {
    let repo = TestRepo::with_initial_commit();

    datum()
        .current_dir(repo.path())
        .args(["--json", "dataset", "ls-tags", "ghost"])
        .assert()
        .failure()
        .stdout(contains("\"status\": \"error\""));
}
