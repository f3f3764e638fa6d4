//! Updating dataset files that are based on another git repository.

mod support;

use datum::datasets;
use datum::transaction::{Transaction, TransactionOptions};
use support::TestRepo;

fn diff_transaction(message: &str) -> TransactionOptions {
    TransactionOptions {
        commit_message: Some(message.into()),
        ..TransactionOptions::diff()
    }
}

/// Add a file from an upstream repository and track its lineage.
fn add_from_upstream(repo: &TestRepo, upstream: &TestRepo) -> datum::dataset::DatasetFile {
    let project = repo.project();
    let added = Transaction::run(&project, diff_transaction("add from upstream"), |project| {
        datasets::add_to_dataset(
            project,
            &[upstream.path().display().to_string()],
            "tracked",
            datasets::AddOptions {
                sources: vec!["data/source.csv".to_string()],
                create: true,
                ..datasets::AddOptions::default()
            },
        )
    })
    .unwrap();
    assert_eq!(added.len(), 1);
    added.into_iter().next().unwrap()
}

#[test]
fn add_from_repository_records_lineage() {
    let upstream = TestRepo::with_initial_commit();
    upstream
        .commit_file("data/source.csv", "v1\n", "add source data")
        .unwrap();

    let repo = TestRepo::with_initial_commit();
    let file = add_from_upstream(&repo, &upstream);

    let based_on = file.based_on.expect("repository sources carry lineage");
    assert_eq!(based_on.path, std::path::Path::new("data/source.csv"));
    assert_eq!(based_on.reference, upstream.head_commit().to_string());
    assert!(based_on.label.starts_with("data/source.csv@"));

    let content =
        std::fs::read_to_string(repo.path().join("data").join("tracked").join("source.csv"))
            .unwrap();
    assert_eq!(content, "v1\n");
}

#[test]
fn update_refreshes_changed_upstream_content() {
    let upstream = TestRepo::with_initial_commit();
    upstream
        .commit_file("data/source.csv", "v1\n", "add source data")
        .unwrap();

    let repo = TestRepo::with_initial_commit();
    let file = add_from_upstream(&repo, &upstream);
    let added_at = file.added;

    // Upstream moves on.
    upstream
        .commit_file("data/source.csv", "v2\n", "update source data")
        .unwrap();

    let project = repo.project();
    let outcome = Transaction::run(&project, diff_transaction("update"), |project| {
        datasets::update_datasets(project, &[], &[], &[], &[], None, false)
    })
    .unwrap();

    assert_eq!(outcome.updated.len(), 1);
    assert!(outcome.deleted.is_empty());

    let content =
        std::fs::read_to_string(repo.path().join("data").join("tracked").join("source.csv"))
            .unwrap();
    assert_eq!(content, "v2\n");

    // Lineage moved to the new commit; the added timestamp is preserved.
    let dataset = datasets::get_dataset(&project, "tracked").unwrap();
    let file = &dataset.files[0];
    assert_eq!(file.added, added_at);
    assert_eq!(
        file.based_on.as_ref().unwrap().reference,
        upstream.head_commit().to_string()
    );
}

#[test]
fn update_is_a_noop_when_upstream_is_unchanged() {
    let upstream = TestRepo::with_initial_commit();
    upstream
        .commit_file("data/source.csv", "v1\n", "add source data")
        .unwrap();

    let repo = TestRepo::with_initial_commit();
    let file = add_from_upstream(&repo, &upstream);

    let project = repo.project();
    let outcome = Transaction::run(&project, diff_transaction("update"), |project| {
        datasets::update_datasets(project, &[], &[], &[], &[], None, false)
    })
    .unwrap();

    assert!(outcome.updated.is_empty());
    assert!(outcome.deleted.is_empty());

    let dataset = datasets::get_dataset(&project, "tracked").unwrap();
    assert_eq!(dataset.files[0].based_on, file.based_on);
}

#[test]
fn upstream_deletion_respects_the_delete_flag() {
    let upstream = TestRepo::with_initial_commit();
    upstream
        .commit_file("data/source.csv", "v1\n", "add source data")
        .unwrap();

    let repo = TestRepo::with_initial_commit();
    add_from_upstream(&repo, &upstream);

    // The upstream file disappears between refs.
    upstream.remove_file("data/source.csv").unwrap();
    upstream.commit_all("remove source data").unwrap();

    let project = repo.project();
    let local_copy = repo.path().join("data").join("tracked").join("source.csv");

    // Without --delete: reported, local copy kept, metadata intact.
    let outcome = Transaction::run(&project, diff_transaction("update"), |project| {
        datasets::update_datasets(project, &[], &[], &[], &[], None, false)
    })
    .unwrap();
    assert_eq!(outcome.deleted.len(), 1);
    assert!(local_copy.exists());
    assert_eq!(
        datasets::get_dataset(&project, "tracked").unwrap().files.len(),
        1
    );

    // With --delete: local copy and metadata entry removed.
    let outcome = Transaction::run(&project, diff_transaction("update --delete"), |project| {
        datasets::update_datasets(project, &[], &[], &[], &[], None, true)
    })
    .unwrap();
    assert_eq!(outcome.deleted.len(), 1);
    assert!(!local_copy.exists());
    assert!(datasets::get_dataset(&project, "tracked")
        .unwrap()
        .files
        .is_empty());
}

#[test]
fn explicit_ref_with_multiple_upstreams_is_ambiguous() {
    let upstream_a = TestRepo::with_initial_commit();
    upstream_a
        .commit_file("data/source.csv", "a\n", "add source data")
        .unwrap();
    let upstream_b = TestRepo::with_initial_commit();
    upstream_b
        .commit_file("data/source.csv", "b\n", "add source data")
        .unwrap();

    let repo = TestRepo::with_initial_commit();
    let project = repo.project();

    for (upstream, dataset) in [(&upstream_a, "from-a"), (&upstream_b, "from-b")] {
        Transaction::run(&project, diff_transaction("add"), |project| {
            datasets::add_to_dataset(
                project,
                &[upstream.path().display().to_string()],
                dataset,
                datasets::AddOptions {
                    sources: vec!["data/source.csv".to_string()],
                    create: true,
                    ..datasets::AddOptions::default()
                },
            )
        })
        .unwrap();
    }

    let err = datasets::update_datasets(&project, &[], &[], &[], &[], Some("main"), false)
        .unwrap_err();
    assert!(err.to_string().contains("more than one git repository"));
}
