#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camstream::capture::{CameraDriver, CameraHandle, Frame, FrameMetadata};
use camstream::profile::DeviceSettings;
use camstream::{Error, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// What the stub camera observed, shared with the test.
#[derive(Default)]
pub struct StubObserver {
    pub configured: Mutex<Option<DeviceSettings>>,
    pub frames: AtomicU64,
    pub stopped: AtomicBool,
    pub closed: AtomicBool,
}

/// Scriptable camera driver.
pub struct StubDriver {
    pub fail_open: bool,
    pub reject_config: bool,
    /// Fail the frame sequence after this many frames.
    pub fail_after: Option<u64>,
    pub interval: Duration,
    /// Pad every frame to this many bytes; 0 keeps the `frame-<n>` payload.
    pub payload_size: usize,
    pub observer: Arc<StubObserver>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            fail_open: false,
            reject_config: false,
            fail_after: None,
            interval: Duration::from_millis(5),
            payload_size: 0,
            observer: Arc::new(StubObserver::default()),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }
}

pub struct StubCamera {
    reject_config: bool,
    fail_after: Option<u64>,
    interval: Duration,
    payload_size: usize,
    started: bool,
    sequence: u64,
    observer: Arc<StubObserver>,
}

impl CameraDriver for StubDriver {
    type Handle = StubCamera;

    fn open(&mut self) -> camstream::Result<StubCamera> {
        if self.fail_open {
            return Err(Error::DeviceUnavailable("/dev/stub: no such device".into()));
        }
        Ok(StubCamera {
            reject_config: self.reject_config,
            fail_after: self.fail_after,
            interval: self.interval,
            payload_size: self.payload_size,
            started: false,
            sequence: 0,
            observer: self.observer.clone(),
        })
    }
}

impl CameraHandle for StubCamera {
    fn configure(&mut self, settings: &DeviceSettings) -> camstream::Result<()> {
        if self.reject_config {
            return Err(Error::ConfigurationRejected("brightness: Invalid argument".into()));
        }
        *self.observer.configured.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    fn start_continuous_capture(&mut self) -> camstream::Result<()> {
        self.started = true;
        Ok(())
    }

    fn next_frame(&mut self) -> camstream::Result<Option<Frame>> {
        if !self.started {
            return Ok(None);
        }
        std::thread::sleep(self.interval);
        if let Some(limit) = self.fail_after {
            if self.sequence >= limit {
                return Err(Error::CaptureFailure("sensor disconnected".into()));
            }
        }
        self.sequence += 1;
        self.observer.frames.fetch_add(1, Ordering::SeqCst);
        if self.payload_size > 0 {
            return Ok(Some(large_frame(self.sequence, self.payload_size)));
        }
        Ok(Some(test_frame(self.sequence)))
    }

    fn stop(&mut self) -> camstream::Result<()> {
        self.started = false;
        self.observer.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(self) -> camstream::Result<()> {
        self.observer.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Frame whose payload is `frame-<sequence>`.
pub fn test_frame(sequence: u64) -> Frame {
    Frame::new(
        format!("frame-{sequence}").into_bytes(),
        FrameMetadata {
            sequence,
            width: 4,
            height: 4,
            device_timestamp: None,
        },
    )
}

/// Frame of `size` zero bytes.
pub fn large_frame(sequence: u64, size: usize) -> Frame {
    Frame::new(
        vec![0u8; size],
        FrameMetadata {
            sequence,
            width: 4,
            height: 4,
            device_timestamp: None,
        },
    )
}

pub fn local_server_config() -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1".into(),
        port: 0,
        shutdown_grace_ms: 300,
        ..ServerConfig::default()
    }
}

/// Plain GET that reads the whole response.
pub async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write failed");

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .expect("read failed");
    String::from_utf8_lossy(&response).into_owned()
}

/// Open a stream request and leave the connection running.
pub async fn open_stream(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write failed");
    stream
}

/// Read until `needle` has appeared `times` times in `buf`. False on timeout or EOF.
pub async fn read_until(stream: &mut TcpStream, buf: &mut Vec<u8>, needle: &[u8], times: usize) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut chunk = [0u8; 4096];
    while count(buf, needle) < times {
        match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return false,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    true
}

/// Read until the peer closes the connection. False on timeout.
pub async fn read_to_eof(stream: &mut TcpStream) -> bool {
    let mut rest = Vec::new();
    matches!(
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await,
        Ok(_)
    )
}

pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
