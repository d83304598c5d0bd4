//! Integration tests for index reconciliation against a mock backend

use conan_scout::backend::Client;
use conan_scout::conan::BuildProfile;
use conan_scout::index::CanonicalIndex;
use conan_scout::pipeline::deps::DependencyRecord;
use conan_scout::pipeline::reconcile::reconcile;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INDEX_CSV: &str = "conanDownloadUrl,indexOwner,name,indexVersion,repoUrl,indexDownloadUrl\n\
    http://zlib.net/zlib-1.2.13.tar.gz,madler,zlib,1.2.13,https://github.com/madler/zlib,https://github.com/madler/zlib/archive/v1.2.13.tar.gz\n";

fn dependency(reference: &str, conandata_path: Option<PathBuf>) -> DependencyRecord {
    let (name, version) = reference.split_once('/').expect("valid reference");
    DependencyRecord {
        reference: reference.to_owned(),
        name: name.to_owned(),
        version: version.to_owned(),
        package_slug: reference.replace('/', "-"),
        revision: "r1".to_owned(),
        is_build_requirement: false,
        export_folder: PathBuf::new(),
        source_folder: PathBuf::new(),
        recovered_source_dir: None,
        conandata_path,
        download_url: None,
        key_uuid: None,
        match_count: 42, // reconciliation must zero this
    }
}

fn manifest_with_url(dir: &std::path::Path, url: &str) -> PathBuf {
    let manifest = dir.join("conandata.yml");
    fs::write(&manifest, format!("sources:\n  \"1.2.13\":\n    url: {url}\n")).expect("manifest written");
    manifest
}

#[tokio::test]
async fn test_index_hit_records_canonical_url_and_identity() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1.4"))
        .and(body_partial_json(json!({
            "requestType": "getSourceLibraryInfo",
            "owner": "madler",
            "name": "zlib",
            "version": "1.2.13",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keyUuid": "uuid-zlib" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir");
    let manifest = manifest_with_url(dir.path(), "http://zlib.net/zlib-1.2.13.tar.gz");

    let index = CanonicalIndex::parse_csv(INDEX_CSV.as_bytes()).expect("index parsed");
    let backend = Client::new(&server.uri(), "user-key", "org-token").expect("client");
    let profile = BuildProfile::from_settings([("os_build", "Linux"), ("arch_build", "x86_64")]);

    let mut deps = vec![dependency("zlib/1.2.13", Some(manifest))];
    reconcile(&mut deps, &index, &backend, &profile).await;

    assert_eq!(
        deps[0].download_url.as_deref(),
        Some("https://github.com/madler/zlib/archive/v1.2.13.tar.gz")
    );
    assert_eq!(deps[0].key_uuid.as_deref(), Some("uuid-zlib"));
    assert_eq!(deps[0].match_count, 0);
}

#[tokio::test]
async fn test_sync_conflict_leaves_dependency_without_identity() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1.4"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir");
    let manifest = manifest_with_url(dir.path(), "http://zlib.net/zlib-1.2.13.tar.gz");

    let index = CanonicalIndex::parse_csv(INDEX_CSV.as_bytes()).expect("index parsed");
    let backend = Client::new(&server.uri(), "user-key", "org-token").expect("client");
    let profile = BuildProfile::from_settings([("os_build", "Linux"), ("arch_build", "x86_64")]);

    let mut deps = vec![dependency("zlib/1.2.13", Some(manifest))];
    reconcile(&mut deps, &index, &backend, &profile).await;

    // The canonical URL is still recorded; only the identity handle is absent.
    assert_eq!(
        deps[0].download_url.as_deref(),
        Some("https://github.com/madler/zlib/archive/v1.2.13.tar.gz")
    );
    assert_eq!(deps[0].key_uuid, None);
}

#[tokio::test]
async fn test_dependency_without_manifest_gets_no_url() {
    let server = MockServer::start().await;

    let index = CanonicalIndex::parse_csv(INDEX_CSV.as_bytes()).expect("index parsed");
    let backend = Client::new(&server.uri(), "user-key", "org-token").expect("client");
    let profile = BuildProfile::from_settings([("os_build", "Linux"), ("arch_build", "x86_64")]);

    // System pseudo-packages carry no conandata.yml at all.
    let mut deps = vec![dependency("ncurses/system", None)];
    reconcile(&mut deps, &index, &backend, &profile).await;

    assert_eq!(deps[0].download_url, None);
    assert_eq!(deps[0].key_uuid, None);
}
