use iconrepo_core::content::{apply_change, iconfile_path, ContentChange};
use iconrepo_core::{ContentError, ContentStore, GitContentStore, Iconfile, IconfileDescriptor};
use std::fs;
use std::path::Path;

fn init_store(dir: &Path) -> GitContentStore {
    GitContentStore::initialize(dir.join("content"))
        .unwrap()
        .with_simulated_commit_failure(false)
}

fn add_iconfiles(store: &GitContentStore, icon_name: &str, iconfiles: &[Iconfile], author: &str) {
    apply_change(store, &ContentChange::IconfilesAdded, author, |store| {
        iconfiles
            .iter()
            .map(|iconfile| store.write_file(icon_name, iconfile))
            .collect()
    })
    .unwrap();
}

#[test]
fn initialize_creates_a_configured_repository_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = init_store(dir.path());

    assert!(store.location().join(".git").is_dir());
    assert_eq!(
        store.run_command(&["config", "user.name"]).unwrap().trim(),
        "Icon Repo Server"
    );
    assert_eq!(
        store.run_command(&["config", "user.email"]).unwrap().trim(),
        "IconRepoServer@UIToolBox"
    );
    assert_eq!(store.commit_count().unwrap(), 0);
    assert_eq!(store.head_commit().unwrap(), None);

    add_iconfiles(&store, "arrow", &[Iconfile::new("png", "24px", vec![1; 16])], "ux");
    let head = store.head_commit().unwrap();

    let reopened = GitContentStore::initialize(dir.path().join("content")).unwrap();
    assert_eq!(reopened.head_commit().unwrap(), head);
    assert_eq!(reopened.commit_count().unwrap(), 1);
}

#[test]
fn initialize_rejects_a_regular_file_location() {
    let dir = tempfile::tempdir().unwrap();
    let location = dir.path().join("content");
    fs::write(&location, b"not a directory").unwrap();

    let err = GitContentStore::initialize(&location).unwrap_err();
    match err {
        ContentError::Init { source, .. } => {
            assert!(matches!(*source, ContentError::NotADirectory(_)))
        }
        other => panic!("expected an init error, got {other:?}"),
    }
}

#[test]
fn one_change_commits_every_written_path_with_author() {
    let dir = tempfile::tempdir().unwrap();
    let store = init_store(dir.path());
    let iconfiles = [
        Iconfile::new("png", "24px", vec![7; 32]),
        Iconfile::new("svg", "36px", b"<svg/>".to_vec()),
    ];

    add_iconfiles(&store, "arrow", &iconfiles, "zazie");

    assert_eq!(store.commit_count().unwrap(), 1);
    assert!(store.status().unwrap().is_empty());

    let message = store.last_commit_message().unwrap();
    for iconfile in &iconfiles {
        assert!(message.contains(&iconfile_path("arrow", &iconfile.descriptor())));
    }
    assert!(message.ends_with("icon file(s) added by zazie"));
    assert_eq!(
        store.last_commit_author().unwrap(),
        "zazie@IconRepoServer <zazie>"
    );

    let written = store.absolute_path("arrow", &IconfileDescriptor::new("svg", "36px"));
    assert_eq!(fs::read(&written).unwrap(), b"<svg/>".to_vec());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&written).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}

#[test]
fn failed_commit_restores_the_working_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = init_store(dir.path());
    add_iconfiles(&store, "arrow", &[Iconfile::new("png", "24px", vec![1; 16])], "ux");
    let head = store.head_commit().unwrap();

    store.set_simulated_commit_failure(true);
    let err = apply_change(&store, &ContentChange::IconfilesAdded, "ux", |store| {
        Ok(vec![store.write_file("bell", &Iconfile::new("png", "24px", vec![2; 16]))?])
    })
    .unwrap_err();

    assert!(matches!(err, ContentError::Commit { .. }), "got {err:?}");
    assert!(store.status().unwrap().is_empty());
    assert_eq!(store.head_commit().unwrap(), head);
    assert!(!store
        .absolute_path("bell", &IconfileDescriptor::new("png", "24px"))
        .exists());
}

#[test]
fn rollback_before_the_first_commit_removes_new_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = init_store(dir.path());

    let relative = store
        .write_file("arrow", &Iconfile::new("png", "24px", vec![1; 16]))
        .unwrap();
    store.run_command(&["add", "-A"]).unwrap();
    assert!(!store.status().unwrap().is_empty());

    store.rollback();

    assert!(store.status().unwrap().is_empty());
    assert!(!store.location().join(relative).exists());
    assert_eq!(store.commit_count().unwrap(), 0);
}

#[test]
fn removing_a_missing_file_is_not_found_and_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = init_store(dir.path());
    add_iconfiles(&store, "arrow", &[Iconfile::new("png", "24px", vec![1; 16])], "ux");

    let change = ContentChange::IconfileDeleted {
        icon_name: "arrow".to_string(),
    };
    let err = apply_change(&store, &change, "ux", |store| {
        Ok(vec![
            store.remove_file("arrow", &IconfileDescriptor::new("png", "36px"))?
        ])
    })
    .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.commit_count().unwrap(), 1);
    assert!(store.status().unwrap().is_empty());
}

#[test]
fn delete_commit_message_names_the_icon_and_paths() {
    let dir = tempfile::tempdir().unwrap();
    let store = init_store(dir.path());
    let descriptor = IconfileDescriptor::new("png", "24px");
    add_iconfiles(&store, "arrow", &[Iconfile::new("png", "24px", vec![1; 16])], "ux");

    let change = ContentChange::IconfileDeleted {
        icon_name: "arrow".to_string(),
    };
    apply_change(&store, &change, "dev", |store| {
        Ok(vec![store.remove_file("arrow", &descriptor)?])
    })
    .unwrap();

    let message = store.last_commit_message().unwrap();
    assert!(message.starts_with("iconfile for icon \"arrow\" deleted:"));
    assert!(message.contains(&iconfile_path("arrow", &descriptor)));
    assert!(message.ends_with(" by dev"));
    assert!(!store.absolute_path("arrow", &descriptor).exists());
}
