use cogs_core::{CoreError, Decryptor, DefaultLoader, Gear, LinkFilter, ResolveOptions, Resolver};
use cogs_schema::{FlatMap, Format, Value};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tiny_http::{Header, Response, Server, StatusCode};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    url: String,
    body: String,
    accept: Option<String>,
    team: Option<String>,
}

/// Serves canned configuration documents and records every request.
struct ConfigServer {
    url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl ConfigServer {
    fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let srv = Arc::clone(&server);
        let log = Arc::clone(&seen);
        let handle = std::thread::spawn(move || {
            for mut request in srv.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let header = |name: &str| {
                    request
                        .headers()
                        .iter()
                        .find(|h| h.field.to_string().eq_ignore_ascii_case(name))
                        .map(|h| h.value.to_string())
                };
                let entry = Seen {
                    method: request.method().to_string(),
                    url: request.url().to_owned(),
                    body,
                    accept: header("Accept"),
                    team: header("X-Team"),
                };
                log.lock().unwrap().push(entry);

                let response = match request.url() {
                    "/api" => Response::from_string(r#"{"db": {"host": "db.qa", "port": 5432}}"#)
                        .with_header(
                            Header::from_bytes("Content-Type", "application/json").unwrap(),
                        ),
                    "/cfg.yaml" => Response::from_string("region: eu-west-1\n"),
                    "/secret.yaml" => Response::from_string("ENC:token: s3cr3t\n"),
                    _ => Response::from_string("denied").with_status_code(StatusCode(403)),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            seen,
            server,
            _handle: handle,
        }
    }

    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for ConfigServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

fn manifest(url: &str) -> String {
    format!(
        r#"
name = "remote"

[json]
path = ["{url}/api", ".db"]
method = "post"
body = {{ env = "qa" }}
header = {{ accept = "application/json" }}
[json.vars]
host.path = []
port.path = []

[yaml.vars]
region.path = "{url}/cfg.yaml"
team_region = {{ path = "{url}/cfg.yaml", name = "region", header = {{ x-team = "infra" }} }}

[forbidden.vars]
secret.path = "{url}/nope.json"

[sealed.enc.vars]
token.path = "{url}/secret.yaml"

[sealed_raw.enc.vars]
token = {{ path = "{url}/secret.yaml", type = "raw" }}
"#
    )
}

/// Test decryption: ciphertext is plaintext behind an `ENC:` marker.
struct StripPrefix;

impl Decryptor for StripPrefix {
    fn decrypt(&self, ciphertext: &[u8], _format: Format) -> Result<Vec<u8>, CoreError> {
        ciphertext
            .strip_prefix(b"ENC:")
            .map(<[u8]>::to_vec)
            .ok_or_else(|| CoreError::Decrypt("missing ENC: marker".to_owned()))
    }
}

/// Fails every decryption, proving it was never needed.
struct NoDecrypt;

impl Decryptor for NoDecrypt {
    fn decrypt(&self, _ciphertext: &[u8], _format: Format) -> Result<Vec<u8>, CoreError> {
        Err(CoreError::Decrypt("decryption was not expected".to_owned()))
    }
}

fn resolve(path: &Path, context: &str) -> Result<FlatMap, CoreError> {
    resolve_with(&DefaultLoader::new(), path, context, ResolveOptions::default())
}

fn resolve_with(
    loader: &DefaultLoader,
    path: &Path,
    context: &str,
    options: ResolveOptions,
) -> Result<FlatMap, CoreError> {
    let gear = Gear::load(path, false)?;
    let resolver = Resolver::new(loader, options)?;
    resolver.resolve(&gear, context, &LinkFilter::default(), Format::Json)
}

#[test]
fn remote_source_is_fetched_once_with_request_options() {
    let server = ConfigServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.cog.toml");
    std::fs::write(&path, manifest(&server.url)).unwrap();

    let out = resolve(&path, "json").unwrap();
    assert_eq!(out["host"], Value::String("db.qa".into()));
    assert_eq!(out["port"], Value::Number(5432.into()));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].url, "/api");
    assert_eq!(requests[0].body, r#"{"env":"qa"}"#);
    assert_eq!(requests[0].accept.as_deref(), Some("application/json"));
}

#[test]
fn differing_headers_are_distinct_sources() {
    let server = ConfigServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.cog.toml");
    std::fs::write(&path, manifest(&server.url)).unwrap();

    let out = resolve(&path, "yaml").unwrap();
    assert_eq!(out["region"], Value::String("eu-west-1".into()));
    assert_eq!(out["team_region"], out["region"]);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.method == "GET"));
    assert_eq!(requests.iter().filter(|r| r.team.is_some()).count(), 1);
}

#[test]
fn error_status_is_fatal() {
    let server = ConfigServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.cog.toml");
    std::fs::write(&path, manifest(&server.url)).unwrap();

    let err = resolve(&path, "forbidden").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("GET returned status code of 403: denied"), "{text}");
}

#[test]
fn encrypted_remote_source_is_fetched_once_and_decrypted() {
    let server = ConfigServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.cog.toml");
    std::fs::write(&path, manifest(&server.url)).unwrap();

    let loader = DefaultLoader::new().with_decryptor(Box::new(StripPrefix));
    let out = resolve_with(&loader, &path, "sealed", ResolveOptions::default()).unwrap();
    assert_eq!(out["token"], Value::String("s3cr3t".into()));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].url, "/secret.yaml");
}

#[test]
fn skip_decrypt_returns_the_remote_body_as_is() {
    let server = ConfigServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.cog.toml");
    std::fs::write(&path, manifest(&server.url)).unwrap();

    let loader = DefaultLoader::new().with_decryptor(Box::new(NoDecrypt));
    let options = ResolveOptions {
        skip_decrypt: true,
        ..ResolveOptions::default()
    };
    let out = resolve_with(&loader, &path, "sealed_raw", options).unwrap();
    assert_eq!(out["token"], Value::String("ENC:token: s3cr3t\n".into()));
    assert_eq!(server.requests().len(), 1);
}
