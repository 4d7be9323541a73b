//! Remote content verification properties.

use gitter_runner_core::fakes::MemoryHost;
use gitter_runner_core::{
    verify, ArtifactRole, ChangedFile, ContentKind, FileKind, RepositoryRef, RequiredArtifact,
    RequiredArtifacts,
};

fn repo() -> RepositoryRef {
    RepositoryRef::new("acme", "fleet-changes")
}

fn changed(names: &[&str]) -> Vec<ChangedFile> {
    names.iter().map(|n| ChangedFile::new(*n, "added")).collect()
}

#[tokio::test]
async fn test_valid_files_yield_no_errors() {
    let host = MemoryHost::new()
        .with_file("script.sh", b"echo ok\n")
        .with_file("config.yaml", b"repo: [a/b]\n");

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["script.sh", "config.yaml", "notes.txt"]),
        &RequiredArtifacts::default(),
    )
    .await;

    assert!(outcome.passed());
    assert!(outcome.errors().is_empty());
    assert!(outcome.files.iter().all(|f| f.present && f.kind == FileKind::File));
}

#[tokio::test]
async fn test_every_missing_file_named_once() {
    let host = MemoryHost::new();

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["README.md"]),
        &RequiredArtifacts::default(),
    )
    .await;

    assert_eq!(
        outcome.errors(),
        vec![
            "`script.sh` does not exist".to_string(),
            "`config.yaml` does not exist".to_string(),
        ]
    );
    assert!(host.content_requests().is_empty());
}

#[tokio::test]
async fn test_directory_yields_only_directory_message() {
    let host = MemoryHost::new()
        .with_directory("script.sh")
        .with_file("config.yaml", b"a: b\n");

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["script.sh", "config.yaml"]),
        &RequiredArtifacts::default(),
    )
    .await;

    assert_eq!(outcome.errors(), vec!["`script.sh` is a directory".to_string()]);
    assert!(!outcome.files[0].empty);
}

#[tokio::test]
async fn test_wrong_kind_names_the_kind() {
    let host = MemoryHost::new()
        .with_file("script.sh", b"echo\n")
        .with_entry("config.yaml", ContentKind::Symlink, b"../shared/config.yaml");

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["script.sh", "config.yaml"]),
        &RequiredArtifacts::default(),
    )
    .await;

    assert_eq!(
        outcome.errors(),
        vec!["`config.yaml` is not a file - is a `symlink`".to_string()]
    );
}

#[tokio::test]
async fn test_empty_file_reported_with_its_own_name() {
    let host = MemoryHost::new()
        .with_file("script.sh", b"echo\n")
        .with_file("config.yaml", b"");

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["script.sh", "config.yaml"]),
        &RequiredArtifacts::default(),
    )
    .await;

    assert_eq!(outcome.errors(), vec!["`config.yaml` is empty".to_string()]);
}

#[tokio::test]
async fn test_fetch_failure_isolated_to_one_file() {
    let host = MemoryHost::new()
        .with_file("script.sh", b"echo\n")
        .fail_path("config.yaml", 502);

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["script.sh", "config.yaml"]),
        &RequiredArtifacts::default(),
    )
    .await;

    assert_eq!(
        outcome.errors(),
        vec!["`config.yaml` could not be verified".to_string()]
    );
    assert_eq!(outcome.files[0].kind, FileKind::File);
    assert_eq!(outcome.files[1].kind, FileKind::Unverified);
}

#[tokio::test]
async fn test_errors_follow_required_order() {
    let required = RequiredArtifacts::new(vec![
        RequiredArtifact::new("deploy/config.yaml", ArtifactRole::Config),
        RequiredArtifact::new("deploy/run.sh", ArtifactRole::Script),
    ])
    .unwrap();
    let host = MemoryHost::new().with_file("deploy/run.sh", b"");

    let outcome = verify(
        &host,
        &repo(),
        "h3ad",
        &changed(&["deploy/run.sh"]),
        &required,
    )
    .await;

    assert_eq!(
        outcome.errors(),
        vec![
            "`deploy/config.yaml` does not exist".to_string(),
            "`deploy/run.sh` is empty".to_string(),
        ]
    );
}
