//! Remote registry and HTTP fetcher tests against an in-process
//! `tiny_http` server.

use std::collections::HashMap;
use std::thread;

use datum_core::{
    Checksum, ChecksumAlgorithm, DatasetIdentifier, DatasetManifest, FetchError, Fetcher,
    HttpFetcher, PublisherInfo, Registry, RegistryError, RemoteRegistry, SourceDescriptor,
};

fn sha256_of(data: &[u8]) -> Checksum {
    let digest = ChecksumAlgorithm::Sha256.digest_bytes(data);
    Checksum::new(ChecksumAlgorithm::Sha256, &digest).unwrap()
}

fn manifest(version: &str) -> DatasetManifest {
    DatasetManifest {
        id: "acme.weather.oslo-hourly".to_string(),
        version: version.to_string(),
        title: "Oslo hourly weather".to_string(),
        description: None,
        license: None,
        publisher: PublisherInfo {
            name: "Acme Data".to_string(),
            url: None,
        },
        tags: Vec::new(),
        sources: vec![SourceDescriptor {
            url: "https://x.example/data.csv".to_string(),
            format: "csv".to_string(),
            size: 11,
            checksum: sha256_of(b"hello bytes"),
        }],
        created: None,
        updated: None,
    }
}

/// Serve a fixed route table from a background thread. Unknown paths
/// answer 404. The thread runs for the lifetime of the test process.
fn spawn_server(routes: HashMap<String, String>) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let path = request.url().to_string();
            match routes.get(&path) {
                Some(body) => {
                    let response = tiny_http::Response::from_string(body.clone());
                    let _ = request.respond(response);
                }
                None => {
                    let response = tiny_http::Response::from_string("not found")
                        .with_status_code(404);
                    let _ = request.respond(response);
                }
            }
        }
    });
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn remote_registry_serves_pinned_version() {
    let m = manifest("2024-01");
    let mut routes = HashMap::new();
    routes.insert(
        "/api/v1/packages/acme.weather.oslo-hourly/2024-01".to_string(),
        serde_json::to_string(&m).unwrap(),
    );
    let base = spawn_server(routes);

    let registry = RemoteRegistry::new(&base).unwrap();
    let id: DatasetIdentifier = "acme.weather.oslo-hourly:2024-01".parse().unwrap();
    let got = registry.get_metadata(&id).await.unwrap();
    assert_eq!(got, m);
}

#[tokio::test]
async fn remote_registry_resolves_latest() {
    let m = manifest("2024-03");
    let mut routes = HashMap::new();
    routes.insert(
        "/api/v1/packages/acme.weather.oslo-hourly/latest".to_string(),
        serde_json::to_string(&m).unwrap(),
    );
    let base = spawn_server(routes);

    let registry = RemoteRegistry::new(&base).unwrap();
    let id: DatasetIdentifier = "acme.weather.oslo-hourly".parse().unwrap();
    let resolved = registry.resolve_version(&id).await.unwrap();
    assert_eq!(resolved.version(), Some("2024-03"));
}

#[tokio::test]
async fn remote_registry_maps_404_to_not_found() {
    let base = spawn_server(HashMap::new());
    let registry = RemoteRegistry::new(&base).unwrap();
    let id: DatasetIdentifier = "acme.weather.missing:1".parse().unwrap();
    assert!(matches!(
        registry.get_metadata(&id).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn remote_registry_rejects_invalid_manifest() {
    let mut routes = HashMap::new();
    routes.insert(
        "/api/v1/packages/acme.weather.oslo-hourly/2024-01".to_string(),
        "{\"id\": 42}".to_string(),
    );
    let base = spawn_server(routes);

    let registry = RemoteRegistry::new(&base).unwrap();
    let id: DatasetIdentifier = "acme.weather.oslo-hourly:2024-01".parse().unwrap();
    assert!(matches!(
        registry.get_metadata(&id).await,
        Err(RegistryError::InvalidManifest { .. })
    ));
}

#[tokio::test]
async fn remote_registry_unreachable_host() {
    // Nothing listens on this port.
    let registry = RemoteRegistry::new("http://127.0.0.1:1").unwrap();
    let id: DatasetIdentifier = "acme.weather.oslo-hourly:2024-01".parse().unwrap();
    assert!(matches!(
        registry.get_metadata(&id).await,
        Err(RegistryError::Unreachable(_))
    ));
}

#[tokio::test]
async fn http_fetcher_streams_body_to_dest() {
    let mut routes = HashMap::new();
    routes.insert("/files/data.csv".to_string(), "a,b\n1,2\n".to_string());
    let base = spawn_server(routes);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("staged");
    let fetcher = HttpFetcher::new().unwrap();
    let written = fetcher
        .fetch(&format!("{base}/files/data.csv"), &dest)
        .await
        .unwrap();

    assert_eq!(written, 8);
    assert_eq!(std::fs::read(&dest).unwrap(), b"a,b\n1,2\n");
}

#[tokio::test]
async fn http_fetcher_surfaces_status_errors() {
    let base = spawn_server(HashMap::new());
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("staged");

    let fetcher = HttpFetcher::new().unwrap();
    let err = fetcher
        .fetch(&format!("{base}/files/missing.csv"), &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
}
