//! HTTP status probe against a real in-process server.

use kiln_core::{Context, HttpProbe, PlatformEnv};
use kiln_schema::BuildpackId;
use kiln_store::StoreLayout;
use std::sync::Arc;
use tiny_http::{Response, Server, StatusCode};

struct TestServer {
    url: String,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                let code = match request.url() {
                    "/dotnet/6.0.100/sdk.tar.gz" => 200,
                    "/broken" => 500,
                    _ => 404,
                };
                let _ = request.respond(Response::empty(StatusCode(code)));
            }
        });
        Self {
            url: format!("http://127.0.0.1:{port}"),
            server,
            handle: Some(handle),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn status_codes_are_results() {
    let server = TestServer::start();
    let probe = HttpProbe::new();
    assert_eq!(
        probe
            .status(&format!("{}/dotnet/6.0.100/sdk.tar.gz", server.url))
            .unwrap(),
        200
    );
    assert_eq!(probe.status(&format!("{}/nope", server.url)).unwrap(), 404);
    assert_eq!(probe.status(&format!("{}/broken", server.url)).unwrap(), 500);
}

#[test]
fn transport_failure_is_an_error() {
    let probe = HttpProbe::new();
    assert!(probe.status("http://127.0.0.1:1/unreachable").is_err());
}

#[test]
fn context_probe_works_during_detect() {
    let server = TestServer::start();
    let root = tempfile::tempdir().unwrap();
    let app = tempfile::tempdir().unwrap();
    let ctx = Context::for_detect(
        &StoreLayout::new(root.path()),
        BuildpackId::parse("dotnet").unwrap(),
        app.path(),
        PlatformEnv::new(),
    )
    .unwrap();
    assert_eq!(
        ctx.http_status(&format!("{}/missing", server.url)).unwrap(),
        404
    );
}
