use feature_atlas::core::config::{AtlasConfig, CONFIG_FILE_NAME};
use feature_atlas::core::discovery::{DEFAULT_MANIFEST_NAME, discover};
use feature_atlas::core::error::AtlasError;
use feature_atlas::core::lock::{AdvisoryLock, FileLock, LockPolicy, NoopLock, lock_path_for};
use feature_atlas::core::manifest::{FeatureRecord, Manifest, NewFeature, SCHEMA_VERSION, update_locked};
use feature_atlas::core::time;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn tags(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn add(m: &mut Manifest, id: &str, name: &str) -> Result<(), AtlasError> {
    m.add_feature(NewFeature {
        id,
        name,
        summary: "summary",
        owner: None,
        tags: &[],
    })
}

fn fast_policy() -> LockPolicy {
    LockPolicy::new(Box::new(FileLock::new(Duration::from_millis(10))), Duration::from_secs(5))
}

// ===== Record store =====

#[test]
fn test_add_save_load_concrete_example() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let mut m = Manifest::new();

    m.add_feature(NewFeature {
        id: "FT-LOCAL-auth",
        name: "Auth",
        summary: "Authentication flow",
        owner: Some("Security"),
        tags: &tags(&["auth", "security"]),
    })
    .unwrap();

    let err = m
        .add_feature(NewFeature {
            id: "FT-LOCAL-auth",
            name: "Auth again",
            summary: "Duplicate",
            owner: None,
            tags: &[],
        })
        .unwrap_err();
    assert!(matches!(err, AtlasError::IdExists(_)));

    m.save(&path).unwrap();
    let loaded = Manifest::load(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    let record = loaded.get_feature("FT-LOCAL-auth").unwrap();
    assert!(!record.synced);
    assert_eq!(record.owner.as_deref(), Some("Security"));
    assert!(record.tags.contains("auth") && record.tags.contains("security"));
    assert!(record.synced_at.is_none());
    assert!(record.alias.is_none());
}

#[test]
fn test_add_validation_order_and_no_side_effects() {
    let mut m = Manifest::new();
    let before = m.clone();

    let cases = [
        ("FT-LOCAL-x", "  ", "s", "name"),
        ("FT-LOCAL-x", "n", "", "summary"),
        ("FT-LOCAL-Bad", "n", "s", "format"),
    ];
    for (id, name, summary, kind) in cases {
        let err = m
            .add_feature(NewFeature {
                id,
                name,
                summary,
                owner: None,
                tags: &[],
            })
            .unwrap_err();
        match kind {
            "name" => assert!(matches!(err, AtlasError::EmptyName)),
            "summary" => assert!(matches!(err, AtlasError::EmptySummary)),
            _ => assert!(matches!(err, AtlasError::InvalidFormat(_))),
        }
    }
    // Blank name wins over an invalid identifier.
    assert!(matches!(add(&mut m, "nope", " "), Err(AtlasError::EmptyName)));
    assert_eq!(m, before);
}

#[test]
fn test_round_trip_preserves_every_field() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let mut m = Manifest::new();
    m.add_feature(NewFeature {
        id: "FT-LOCAL-search",
        name: "Search",
        summary: "Full-text search\nacross features",
        owner: Some("Discovery"),
        tags: &tags(&["search", "ux"]),
    })
    .unwrap();
    add(&mut m, "FT-LOCAL-export", "Export").unwrap();
    m.promote("FT-LOCAL-search", "FT-000123", time::now_utc()).unwrap();

    m.save(&path).unwrap();
    let loaded = Manifest::load(&path).unwrap();
    assert_eq!(loaded, m);
    assert_eq!(loaded.version, SCHEMA_VERSION);
}

#[test]
fn test_list_features_returns_independent_copy() {
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    add(&mut m, "FT-LOCAL-b", "B").unwrap();

    let mut listed = m.list_features(false);
    listed.remove("FT-LOCAL-a");
    listed.get_mut("FT-LOCAL-b").unwrap().name = "mutated".to_string();
    listed.insert(
        "FT-LOCAL-c".to_string(),
        FeatureRecord::unsynced("C", "c", None, &[]),
    );

    assert!(m.has_feature("FT-LOCAL-a"));
    assert_eq!(m.get_feature("FT-LOCAL-b").unwrap().name, "B");
    assert!(!m.has_feature("FT-LOCAL-c"));
}

#[test]
fn test_list_features_unsynced_filter() {
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    add(&mut m, "FT-LOCAL-b", "B").unwrap();
    m.promote("FT-LOCAL-a", "FT-000001", time::now_utc()).unwrap();

    let unsynced = m.list_features(true);
    assert_eq!(unsynced.keys().collect::<Vec<_>>(), vec!["FT-LOCAL-b"]);
    assert_eq!(m.list_features(false).len(), 2);
}

#[test]
fn test_promote_rekeys_and_sets_alias() {
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-auth", "Auth").unwrap();
    let at = time::now_utc();
    let promoted = m.promote("FT-LOCAL-auth", "FT-000042", at).unwrap().clone();

    assert!(promoted.synced);
    assert_eq!(promoted.synced_at, Some(at));
    assert_eq!(promoted.alias.as_deref(), Some("FT-LOCAL-auth"));
    assert!(!m.has_feature("FT-LOCAL-auth"));
    assert_eq!(m.find_by_alias("FT-LOCAL-auth"), Some("FT-000042"));

    // The retired local id can not be minted again.
    assert!(matches!(
        add(&mut m, "FT-LOCAL-auth", "Auth"),
        Err(AtlasError::IdExists(_))
    ));
}

#[test]
fn test_promote_rejects_bad_inputs() {
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    add(&mut m, "FT-LOCAL-b", "B").unwrap();
    m.promote("FT-LOCAL-a", "FT-000001", time::now_utc()).unwrap();

    assert!(matches!(
        m.promote("FT-LOCAL-b", "FT-1", time::now_utc()),
        Err(AtlasError::InvalidFormat(_))
    ));
    assert!(matches!(
        m.promote("FT-LOCAL-b", "FT-000001", time::now_utc()),
        Err(AtlasError::Conflict(_))
    ));
    assert!(matches!(
        m.promote("FT-LOCAL-missing", "FT-000002", time::now_utc()),
        Err(AtlasError::NotFound(_))
    ));
    assert!(matches!(
        m.promote("FT-000001", "FT-000003", time::now_utc()),
        Err(AtlasError::Conflict(_))
    ));
    assert!(m.has_feature("FT-LOCAL-b"));
}

#[test]
fn test_replace_feature_only_for_unsynced() {
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    add(&mut m, "FT-LOCAL-b", "B").unwrap();
    m.promote("FT-LOCAL-b", "FT-000002", time::now_utc()).unwrap();

    let replacement = FeatureRecord::unsynced("A2", "new summary", Some("Team"), &tags(&["x"]));
    m.replace_feature("FT-LOCAL-a", replacement.clone()).unwrap();
    assert_eq!(m.get_feature("FT-LOCAL-a"), Some(&replacement));

    assert!(matches!(
        m.replace_feature("FT-000002", replacement.clone()),
        Err(AtlasError::Conflict(_))
    ));
    let mut sneaky = replacement;
    sneaky.alias = Some("FT-LOCAL-zzz".to_string());
    assert!(matches!(
        m.replace_feature("FT-LOCAL-a", sneaky),
        Err(AtlasError::Conflict(_))
    ));
}

#[test]
fn test_load_missing_file_is_not_found() {
    let tmp = tempdir().unwrap();
    let err = Manifest::load(&tmp.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, AtlasError::NotFound(_)));
}

#[test]
fn test_load_normalizes_missing_features_section() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    fs::write(&path, "version: \"1\"\n").unwrap();
    let m = Manifest::load(&path).unwrap();
    assert!(m.is_empty());
    assert!(m.list_features(false).is_empty());

    fs::write(&path, "version: \"1\"\nfeatures:\n").unwrap();
    assert!(Manifest::load(&path).unwrap().is_empty());
}

#[test]
fn test_load_rejects_malformed_content() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let bad = [
        "version: [unterminated",
        "features: {}\n",
        "version: \"2\"\nfeatures: {}\n",
        "version: \"1\"\nfeatures:\n  FT-LOCAL-a:\n    name: A\n    summary: s\n    synced: true\n",
        "version: \"1\"\nfeatures:\n  FT-000001:\n    name: A\n    summary: s\n    synced: false\n",
        "version: \"1\"\nfeatures:\n  FT-000001:\n    name: A\n    summary: s\n    synced: true\n",
        "version: \"1\"\nfeatures:\n  bogus:\n    name: A\n    summary: s\n    synced: false\n",
        "version: \"1\"\nfeatures:\n  FT-LOCAL-a:\n    name: A\n    summary: s\n",
    ];
    for content in bad {
        fs::write(&path, content).unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(
            matches!(err, AtlasError::FormatError(_)),
            "expected FormatError for {:?}, got {:?}",
            content,
            err
        );
    }
}

#[cfg(unix)]
#[test]
fn test_save_sets_world_readable_mode() {
    use std::os::unix::fs::PermissionsExt;
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    Manifest::new().save(&path).unwrap();
    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}

#[test]
fn test_save_leaves_no_temp_files() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    m.save(&path).unwrap();
    m.save_with_lock(&path, &fast_policy()).unwrap();

    let names: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(names.is_empty(), "leftover temp files: {:?}", names);
}

#[test]
fn test_save_into_missing_directory_fails_cleanly() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("missing").join(DEFAULT_MANIFEST_NAME);
    assert!(matches!(Manifest::new().save(&path), Err(AtlasError::IoError(_))));
    assert!(!path.exists());
}

#[test]
fn test_update_locked_skips_write_on_error() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    m.save(&path).unwrap();
    let before = fs::read(&path).unwrap();

    let err = update_locked(&path, &fast_policy(), |m| add(m, "FT-LOCAL-a", "dup")).unwrap_err();
    assert!(matches!(err, AtlasError::IdExists(_)));
    assert_eq!(fs::read(&path).unwrap(), before);

    update_locked(&path, &fast_policy(), |m| add(m, "FT-LOCAL-b", "B")).unwrap();
    assert!(Manifest::load(&path).unwrap().has_feature("FT-LOCAL-b"));
}

// ===== Advisory lock =====

#[test]
fn test_lock_times_out_while_held() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let holder = fast_policy();
    let _held = holder.guard(&path).unwrap();

    let waiter = LockPolicy::new(
        Box::new(FileLock::new(Duration::from_millis(10))),
        Duration::from_millis(150),
    );
    let started = Instant::now();
    let err = waiter.guard(&path).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(err.is_retryable());
    match err {
        AtlasError::LockTimeout { path: locked, .. } => assert_eq!(locked, lock_path_for(&path)),
        other => panic!("expected LockTimeout, got {other:?}"),
    }
}

#[test]
fn test_lock_reacquirable_after_guard_drop() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    let policy = fast_policy();
    {
        let guard = policy.guard(&path).unwrap();
        assert_eq!(guard.path(), lock_path_for(&path).as_path());
    }
    let short = LockPolicy::new(Box::new(FileLock::default()), Duration::from_millis(0));
    assert!(short.guard(&path).is_ok());
}

#[test]
fn test_save_with_lock_blocked_by_holder() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join(DEFAULT_MANIFEST_NAME);
    Manifest::new().save(&path).unwrap();
    let before = fs::read(&path).unwrap();

    let holder = fast_policy();
    let _held = holder.guard(&path).unwrap();
    let mut m = Manifest::new();
    add(&mut m, "FT-LOCAL-a", "A").unwrap();
    let short = LockPolicy::new(Box::new(FileLock::new(Duration::from_millis(5))), Duration::from_millis(50));
    assert!(matches!(
        m.save_with_lock(&path, &short),
        Err(AtlasError::LockTimeout { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_noop_lock_reports_degraded_guarantee() {
    let tmp = tempdir().unwrap();
    let file = fs::File::create(tmp.path().join("x.lock")).unwrap();
    let noop = NoopLock;
    assert!(!noop.is_enforcing());
    noop.acquire(&file, Path::new("x.lock"), Duration::ZERO).unwrap();
    noop.release(&file);
    assert!(FileLock::default().is_enforcing());
    assert!(LockPolicy::default().is_enforcing());
}

// ===== Discovery =====

#[test]
fn test_discover_explicit_path() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("custom.yaml");
    assert!(matches!(
        discover(Some(&path), tmp.path()),
        Err(AtlasError::NotFound(_))
    ));
    // No fallback search even when a default manifest is right there.
    fs::write(tmp.path().join(DEFAULT_MANIFEST_NAME), "version: \"1\"\n").unwrap();
    assert!(matches!(
        discover(Some(&path), tmp.path()),
        Err(AtlasError::NotFound(_))
    ));
    fs::write(&path, "version: \"1\"\n").unwrap();
    assert_eq!(discover(Some(&path), tmp.path()).unwrap(), path);
}

#[test]
fn test_discover_explicit_directory_is_not_found() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("manifests");
    fs::create_dir(&dir).unwrap();
    assert!(matches!(
        discover(Some(&dir), tmp.path()),
        Err(AtlasError::NotFound(_))
    ));
}

#[test]
fn test_discover_walks_up_to_manifest() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir(root.join(".git")).unwrap();
    let nested = root.join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    let manifest = root.join("a").join(DEFAULT_MANIFEST_NAME);
    fs::write(&manifest, "version: \"1\"\n").unwrap();

    assert_eq!(discover(None, &nested).unwrap(), manifest);
}

#[test]
fn test_discover_stops_at_repo_root() {
    let tmp = tempdir().unwrap();
    let outer = tmp.path();
    // Manifest above the repository boundary must not be found.
    fs::write(outer.join(DEFAULT_MANIFEST_NAME), "version: \"1\"\n").unwrap();
    let repo = outer.join("repo");
    let nested = repo.join("src");
    fs::create_dir_all(&nested).unwrap();
    fs::write(repo.join(".git"), "gitdir: elsewhere\n").unwrap();

    assert!(matches!(discover(None, &nested), Err(AtlasError::NotFound(_))));
}

#[test]
fn test_discover_prefers_manifest_in_repo_root_itself() {
    let tmp = tempdir().unwrap();
    let repo = tmp.path();
    fs::create_dir(repo.join(".git")).unwrap();
    fs::write(repo.join(DEFAULT_MANIFEST_NAME), "version: \"1\"\n").unwrap();
    assert_eq!(
        discover(None, repo).unwrap(),
        repo.join(DEFAULT_MANIFEST_NAME)
    );
}

// ===== Config =====

#[test]
fn test_config_loaded_next_to_manifest() {
    let tmp = tempdir().unwrap();
    let manifest = tmp.path().join(DEFAULT_MANIFEST_NAME);
    assert_eq!(AtlasConfig::load_for_manifest(&manifest).unwrap(), AtlasConfig::default());

    fs::write(
        tmp.path().join(CONFIG_FILE_NAME),
        "[lock]\ntimeout_ms = 1200\n\n[sync]\nremote_timeout_secs = 3\n\n[registry]\npath = \"registry\"\n",
    )
    .unwrap();
    let config = AtlasConfig::load_for_manifest(&manifest).unwrap();
    assert_eq!(config.lock.timeout_ms, 1200);
    assert_eq!(config.lock_policy().timeout(), Duration::from_millis(1200));
    assert_eq!(config.remote_timeout(), Duration::from_secs(3));
    assert_eq!(config.registry.path, Some(tmp.path().join("registry")));
}

#[test]
fn test_config_parse_error_is_config_error() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join(CONFIG_FILE_NAME), "[lock\n").unwrap();
    let err = AtlasConfig::load_for_manifest(&tmp.path().join(DEFAULT_MANIFEST_NAME)).unwrap_err();
    assert!(matches!(err, AtlasError::ConfigError(_)));
}
