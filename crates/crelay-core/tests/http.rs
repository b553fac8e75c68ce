//! End-to-end HTTP scenarios: router-level with fake hardware, and a live
//! listener over real TCP.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use crelay_core::http::{AppState, router};
use crelay_core::{Dispatcher, RelayState};
use crelay_test_utils::{FakeSysfs, RecordingBackend, TestConfigBuilder, TestServer};

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn state(dispatcher: Dispatcher) -> Arc<AppState> {
    Arc::new(AppState {
        dispatcher,
        labels: TestConfigBuilder::new().build().labels_with_overrides(&[]),
    })
}

#[tokio::test]
async fn gpio_card_switches_over_api() {
    let sysfs = FakeSysfs::with_pins(&[17, 18, 27, 22]);
    let config = TestConfigBuilder::new()
        .gpio(sysfs.root(), &[17, 18, 27, 22], 1)
        .build();
    let app = router(state(Dispatcher::from_config(&config)));

    let req = Request::get("/gpio?pin=2&status=1")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    for line in ["Relay 1:0", "Relay 2:1", "Relay 3:0", "Relay 4:0"] {
        assert!(body.lines().any(|l| l == line), "missing {line} in {body:?}");
    }
    assert_eq!(sysfs.level(18), 1);
    assert_eq!(sysfs.level(17), 0);
}

#[tokio::test]
async fn gpio_active_low_page_reflects_levels() {
    let sysfs = FakeSysfs::with_pins(&[5, 6]);
    sysfs.set_level(5, 1);
    let config = TestConfigBuilder::new().gpio(sysfs.root(), &[5, 6], 0).build();
    let app = router(state(Dispatcher::from_config(&config)));

    let resp = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let html = body_text(resp).await;
    // Level 0 energises an active-low relay.
    assert!(html.contains("data-pin=\"2\" checked"));
    assert!(!html.contains("data-pin=\"1\" checked"));
}

#[tokio::test(start_paused = true)]
async fn pulse_over_post_holds_channel_off() {
    let backend = RecordingBackend::new("REC", 4);
    backend.preset(1, RelayState::On).await;
    let dispatcher = Dispatcher::with_backends(vec![backend.boxed()], Duration::from_secs(2));
    let app = router(state(dispatcher));

    let req = Request::post("/gpio")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("pin=1&status={}", crelay_core::PULSE_CODE)))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.starts_with("Relay 1:1\n"));

    let sets = backend.sets();
    assert_eq!(sets[0].1, RelayState::Off);
    assert_eq!(sets[1].1, RelayState::On);
    assert!(sets[1].2 - sets[0].2 >= Duration::from_secs(2));
}

#[tokio::test]
async fn serial_parameter_selects_card() {
    let first = RecordingBackend::new("AAA", 2);
    let second = RecordingBackend::new("BBB", 2);
    let dispatcher =
        Dispatcher::with_backends(vec![first.boxed(), second.boxed()], Duration::from_secs(1));
    let app = router(state(dispatcher));

    let req = Request::get("/gpio?pin=2&status=1&serial=BBB")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(second.state(2).await, RelayState::On);
    assert_eq!(first.state(2).await, RelayState::Off);

    let req = Request::get("/gpio?serial=ZZZ").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn backend_failure_is_503() {
    let backend = RecordingBackend::new("REC", 2);
    backend.fail_set_on(1);
    let dispatcher = Dispatcher::with_backends(vec![backend.boxed()], Duration::from_secs(1));
    let app = router(state(dispatcher));

    let req = Request::get("/gpio?pin=1&status=1")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_text(resp).await.starts_with("ERROR: "));
}

#[tokio::test]
async fn live_server_without_hardware() {
    let server = TestServer::start(TestConfigBuilder::new().build()).await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/gpio?pin=1")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    assert_eq!(resp.headers()["connection"], "close");
    assert!(resp.headers()["server"].to_str().unwrap().starts_with("crelay/"));
    assert_eq!(resp.text().await.unwrap(), "ERROR: No compatible device detected\n");

    let resp = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    assert!(resp.text().await.unwrap().contains("No compatible relay card detected"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn live_server_with_virtual_card() {
    let config = TestConfigBuilder::new().virtual_card(4).build();
    let server = TestServer::start(config).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/gpio"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("pin=3&status=1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        "Relay 1:0\nRelay 2:0\nRelay 3:1\nRelay 4:0\n"
    );

    let resp = client.get(server.url("/gpio")).send().await.unwrap();
    assert_eq!(
        resp.text().await.unwrap(),
        "Relay 1:0\nRelay 2:0\nRelay 3:1\nRelay 4:0\n"
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unplugged_gpio_pin_falls_through_to_next_backend() {
    crelay_test_utils::init_test_tracing();
    let sysfs = FakeSysfs::with_pins(&[17, 18]);
    let config = TestConfigBuilder::new()
        .gpio(sysfs.root(), &[17, 18], 1)
        .virtual_card(2)
        .build();
    let state = state(Dispatcher::from_config(&config));

    let resp = router(state.clone())
        .oneshot(Request::get("/gpio?pin=1&status=1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(sysfs.level(17), 1);

    // Cards are re-detected per request, so the virtual card takes over.
    sysfs.remove_pin(18);
    let resp = router(state)
        .oneshot(Request::get("/gpio").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_text(resp).await, "Relay 1:0\nRelay 2:0\n");
    assert_eq!(sysfs.exported(), "18");
}

#[tokio::test]
async fn live_server_over_recording_backend() {
    let backend = RecordingBackend::new("REC", 2);
    let dispatcher = Dispatcher::with_backends(vec![backend.boxed()], Duration::from_secs(1));
    let server = TestServer::with_dispatcher(TestConfigBuilder::new().build(), dispatcher).await;

    let resp = reqwest::get(server.url("/gpio?pin=2&status=1")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(backend.sets().len(), 1);
    assert_eq!(backend.state(2).await, RelayState::On);

    backend.clear_calls();
    let resp = reqwest::get(server.url("/gpio?pin=3&status=1")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert!(backend.hardware_calls().is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn pulse_completes_after_client_disconnects() {
    use tokio::io::AsyncWriteExt;

    let backend = RecordingBackend::new("REC", 2);
    let dispatcher = Dispatcher::with_backends(vec![backend.boxed()], Duration::from_secs(1));
    let server = TestServer::with_dispatcher(TestConfigBuilder::new().build(), dispatcher).await;

    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /gpio?pin=1&status=2 HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(stream);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let states: Vec<RelayState> = backend.sets().into_iter().map(|s| s.1).collect();
    assert_eq!(states, vec![RelayState::On, RelayState::Off]);
    assert_eq!(backend.state(1).await, RelayState::Off);

    server.stop().await.unwrap();
}
