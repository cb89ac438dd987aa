use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{create_dir_all, write};
use tempfile::{NamedTempFile, TempDir};

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("notion-migrate").expect("Binary exists");
    // Keep the developer's .env and shell from leaking into the run.
    for name in [
        "NOTION_API_KEY",
        "OUTLINE_EXPORT_PATH",
        "NOTION_DESTINATION_PAGE_ID",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
    ] {
        cmd.env_remove(name);
    }
    cmd
}

fn export_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    create_dir_all(dir.path().join("guides")).unwrap();
    create_dir_all(dir.path().join("uploads")).unwrap();
    write(dir.path().join("welcome.md"), "Hello").unwrap();
    write(dir.path().join("guides/setup.md"), "Setup").unwrap();
    write(dir.path().join("uploads/ignored.md"), "asset").unwrap();
    dir
}

fn disabled_assets_config(root: &std::path::Path) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        format!(
            "source:\n  root: {}\ndestination:\n  root_page_id: page-1\nassets:\n  mode: disabled\n",
            root.display()
        ),
    )
    .expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_the_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("migrate")
                .and(predicate::str::contains("count"))
                .and(predicate::str::contains("inspect")),
        );
}

#[test]
fn count_prints_the_number_of_documents() {
    let tree = export_tree();

    cli()
        .arg("count")
        .arg("--root")
        .arg(tree.path())
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn count_honours_custom_asset_directories() {
    let tree = export_tree();

    cli()
        .args(["count", "--asset-dir", "guides", "--root"])
        .arg(tree.path())
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn count_rejects_a_missing_root() {
    let tree = export_tree();

    cli()
        .arg("count")
        .arg("--root")
        .arg(tree.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
}

#[test]
fn migrate_refuses_to_start_without_an_api_key() {
    let tree = export_tree();
    let config = disabled_assets_config(tree.path());

    cli()
        .arg("migrate")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOTION_API_KEY missing in environment"));
}

#[test]
fn migrate_refuses_a_missing_destination() {
    let tree = export_tree();
    let config = NamedTempFile::new().unwrap();
    write(
        config.path(),
        format!("source:\n  root: {}\nassets:\n  mode: disabled\n", tree.path().display()),
    )
    .unwrap();

    cli()
        .arg("migrate")
        .arg("--config")
        .arg(config.path())
        .env("NOTION_API_KEY", "secret_abc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No destination page configured"));
}

#[test]
fn migrate_flags_override_the_config_root() {
    let tree = export_tree();
    let config = disabled_assets_config(tree.path());

    cli()
        .arg("migrate")
        .arg("--config")
        .arg(config.path())
        .arg("--root")
        .arg(tree.path().join("missing"))
        .env("NOTION_API_KEY", "secret_abc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
}
