use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use iris_capture::{CaptureError, CapturePort, Measurement};
use iris_grabber::{DeviceFactory, FrameGrabber};
use iris_server::{AppState, ServerConfig, router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const JPEG_PAYLOAD: &[u8] = &[0xFF, 0xD8, 0x00, 0x11, 0x22, 0xFF, 0xD9];

// ── Mock capture port ────────────────────────────────────────────────

struct MockPort {
    open: bool,
    payload: Option<Vec<u8>>,
    fail_open: bool,
}

impl CapturePort for MockPort {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.fail_open {
            return Err(CaptureError::DeviceUnavailable("mock: no device".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Measurement>, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        thread::sleep(Duration::from_millis(2));
        match &self.payload {
            Some(payload) => {
                let mut metadata = HashMap::new();
                metadata.insert("width".to_string(), "640".to_string());
                metadata.insert("height".to_string(), "480".to_string());
                metadata.insert("format".to_string(), "jpeg".to_string());
                Ok(Some(Measurement::new(payload.clone(), metadata)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn device(&self) -> Option<String> {
        self.open.then(|| "/dev/mock0".to_string())
    }
}

fn frame_factory(opens: &Arc<AtomicUsize>) -> DeviceFactory {
    let opens = Arc::clone(opens);
    Box::new(move || {
        opens.fetch_add(1, Ordering::SeqCst);
        Box::new(MockPort {
            open: false,
            payload: Some(JPEG_PAYLOAD.to_vec()),
            fail_open: false,
        })
    })
}

fn empty_factory() -> DeviceFactory {
    Box::new(|| {
        Box::new(MockPort {
            open: false,
            payload: None,
            fail_open: false,
        })
    })
}

fn failing_factory() -> DeviceFactory {
    Box::new(|| {
        Box::new(MockPort {
            open: false,
            payload: None,
            fail_open: true,
        })
    })
}

// ── Server and raw-HTTP helpers ──────────────────────────────────────

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::from_lookup(|_| None);
    config.settle = Duration::from_millis(10);
    config
}

async fn serve(grabber: FrameGrabber) -> (SocketAddr, Arc<FrameGrabber>) {
    let grabber = Arc::new(grabber);
    let state = AppState::new(Arc::clone(&grabber), test_config());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (addr, grabber)
}

async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> (u16, String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut head = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    if let Some(body) = body {
        head.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        ));
    }
    head.push_str("\r\n");

    let mut raw = head.into_bytes();
    if let Some(body) = body {
        raw.extend_from_slice(body.as_bytes());
    }
    stream.write_all(&raw).await.unwrap();

    let mut response = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();
    parse_response(&response)
}

fn parse_response(raw: &[u8]) -> (u16, String, Vec<u8>) {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("status line");
    (status, head, raw[split + 4..].to_vec())
}

fn json_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).expect("json body")
}

/// Retry a request until the expected status shows up; frames appear only
/// after the background loop's first publish.
async fn request_until_status(
    addr: SocketAddr,
    method: &str,
    path: &str,
    expected: u16,
) -> (u16, String, Vec<u8>) {
    for _ in 0..100 {
        let response = request(addr, method, path, None).await;
        if response.0 == expected {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{method} {path} never returned {expected}");
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_always_succeeds() {
    let (addr, _grabber) = serve(FrameGrabber::new(empty_factory(), false)).await;

    let (status, _, body) = request(addr, "GET", "/health", None).await;
    assert_eq!(status, 200);

    let json = json_body(&body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["enabled"], false);
    assert_eq!(json["running"], false);
}

#[tokio::test]
async fn test_status_reports_configuration() {
    let opens = Arc::new(AtomicUsize::new(0));
    let (addr, grabber) = serve(FrameGrabber::new(frame_factory(&opens), true)).await;
    grabber.start().unwrap();

    let (status, _, body) = request(addr, "GET", "/camera/status", None).await;
    assert_eq!(status, 200);

    let json = json_body(&body);
    assert_eq!(json["enabled"], true);
    assert_eq!(json["running"], true);
    assert_eq!(json["device"], "/dev/mock0");
    assert_eq!(json["width"], 640);
    assert_eq!(json["height"], 480);
    assert_eq!(json["fps"], 10);
}

#[tokio::test]
async fn test_frame_conflict_when_disabled() {
    let (addr, _grabber) = serve(FrameGrabber::new(empty_factory(), false)).await;

    let (status, _, body) = request(addr, "GET", "/camera/frame", None).await;
    assert_eq!(status, 409);
    assert_eq!(json_body(&body)["detail"], "Camera disabled");
}

#[tokio::test]
async fn test_stream_conflict_when_disabled() {
    let (addr, _grabber) = serve(FrameGrabber::new(empty_factory(), false)).await;

    let (status, _, _) = request(addr, "GET", "/camera/stream", None).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_reopen_conflict_when_disabled() {
    let (addr, _grabber) = serve(FrameGrabber::new(empty_factory(), false)).await;

    let (status, _, _) = request(addr, "POST", "/camera/reopen", None).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_frame_not_found_before_first_capture() {
    // Enabled but the device never yields: enabled=true, empty slot.
    let (addr, grabber) = serve(FrameGrabber::new(empty_factory(), true)).await;
    grabber.start().unwrap();

    let (status, _, body) = request(addr, "GET", "/camera/frame", None).await;
    assert_eq!(status, 404);
    assert_eq!(json_body(&body)["detail"], "No frame available yet");
}

#[tokio::test]
async fn test_enable_then_fetch_frame() {
    let opens = Arc::new(AtomicUsize::new(0));
    let (addr, _grabber) = serve(FrameGrabber::new(frame_factory(&opens), false)).await;

    let (status, _, body) =
        request(addr, "PUT", "/camera/enable", Some(r#"{"enabled": true}"#)).await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["enabled"], true);

    let (status, head, body) = request_until_status(addr, "GET", "/camera/frame", 200).await;
    assert_eq!(status, 200);
    assert!(head.to_lowercase().contains("content-type: image/jpeg"));
    assert_eq!(body, JPEG_PAYLOAD);

    let (status, _, body) =
        request(addr, "PUT", "/camera/enable", Some(r#"{"enabled": false}"#)).await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["enabled"], false);

    let (status, _, _) = request(addr, "GET", "/camera/frame", None).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_enable_missing_field_is_bad_request() {
    let (addr, _grabber) = serve(FrameGrabber::new(empty_factory(), false)).await;

    let (status, _, body) = request(addr, "PUT", "/camera/enable", Some("{}")).await;
    assert_eq!(status, 400);
    assert!(
        json_body(&body)["detail"]
            .as_str()
            .unwrap()
            .contains("enabled")
    );
}

#[tokio::test]
async fn test_enable_start_failure_is_server_error() {
    let (addr, grabber) = serve(FrameGrabber::new(failing_factory(), false)).await;

    let (status, _, body) =
        request(addr, "PUT", "/camera/enable", Some(r#"{"enabled": true}"#)).await;
    assert_eq!(status, 500);
    assert!(
        json_body(&body)["detail"]
            .as_str()
            .unwrap()
            .contains("no device")
    );
    assert!(!grabber.running());
}

#[tokio::test]
async fn test_reopen_recreates_the_device() {
    let opens = Arc::new(AtomicUsize::new(0));
    let (addr, grabber) = serve(FrameGrabber::new(frame_factory(&opens), true)).await;
    grabber.start().unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    let (status, _, body) = request(addr, "POST", "/camera/reopen", None).await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["ok"], true);
    assert_eq!(opens.load(Ordering::SeqCst), 2);

    // The fresh device delivers frames again.
    let (status, _, body) = request_until_status(addr, "GET", "/camera/frame", 200).await;
    assert_eq!(status, 200);
    assert_eq!(body, JPEG_PAYLOAD);
}

#[tokio::test]
async fn test_enable_when_already_enabled_is_noop() {
    let opens = Arc::new(AtomicUsize::new(0));
    let (addr, grabber) = serve(FrameGrabber::new(frame_factory(&opens), true)).await;
    grabber.start().unwrap();

    let (status, _, body) =
        request(addr, "PUT", "/camera/enable", Some(r#"{"enabled": true}"#)).await;
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["enabled"], true);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stream_emits_parts_and_ends_on_disable() {
    let opens = Arc::new(AtomicUsize::new(0));
    let (addr, grabber) = serve(FrameGrabber::new(frame_factory(&opens), true)).await;
    grabber.start().unwrap();

    // HTTP/1.0 keeps the body unframed: bytes arrive exactly as emitted.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /camera/stream HTTP/1.0\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    while !contains(&collected, b"--frame\r\nContent-Type: image/jpeg\r\n")
        || !contains(&collected, JPEG_PAYLOAD)
    {
        let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("stream stalled")
            .unwrap();
        assert!(n > 0, "stream closed before emitting a part");
        collected.extend_from_slice(&buf[..n]);
    }
    let head = String::from_utf8_lossy(&collected);
    assert!(head.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(head.contains(&format!("Content-Length: {}", JPEG_PAYLOAD.len())));

    // Disabling mid-stream must terminate the connection promptly.
    let (status, _, _) =
        request(addr, "PUT", "/camera/enable", Some(r#"{"enabled": false}"#)).await;
    assert_eq!(status, 200);

    let mut rest = Vec::new();
    timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
        .await
        .expect("stream did not end after disable")
        .unwrap();
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
