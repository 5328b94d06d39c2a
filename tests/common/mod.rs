//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use infra_container::adapters::{Acquisition, ResourceAdapter};
use infra_container::lifecycle::{BoxError, Release, Resources};

/// Shared, ordered log of acquire/release events.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Resource names released, in release order.
    pub fn released(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix("release:").map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    Fail,
    /// Hands back a release along with the error.
    FailAfterConnect,
    Panic,
}

/// Resource handed out by `Recording`.
#[derive(Debug)]
pub struct FakeResource {
    pub name: String,
}

/// Adapter that records every acquire and release in a journal.
pub struct Recording {
    name: String,
    outcome: Outcome,
    journal: Journal,
    release_delay: Duration,
}

impl Recording {
    pub fn new(name: &str, outcome: Outcome, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            journal: journal.clone(),
            release_delay: Duration::ZERO,
        }
    }

    /// Make the release take `delay` before it is journaled.
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    fn release(&self) -> Release {
        let journal = self.journal.clone();
        let name = self.name.clone();
        let delay = self.release_delay;
        Release::new(self.name.clone(), move || async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            journal.push(format!("release:{}", name));
            Ok::<(), BoxError>(())
        })
    }
}

#[async_trait]
impl ResourceAdapter for Recording {
    type Resource = FakeResource;

    fn name(&self) -> &str {
        &self.name
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<FakeResource> {
        self.journal.push(format!("acquire:{}", self.name));
        match self.outcome {
            Outcome::Succeed => Acquisition::ready(
                FakeResource {
                    name: self.name.clone(),
                },
                self.release(),
            ),
            Outcome::Fail => Acquisition::failed("connection refused"),
            Outcome::FailAfterConnect => {
                Acquisition::partial("schema check failed", self.release())
            }
            Outcome::Panic => panic!("adapter bug"),
        }
    }
}

/// A request received by the capture endpoint.
#[derive(Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Start an HTTP endpoint that answers 200 to everything and forwards each
/// request it receives.
pub async fn start_capture_endpoint() -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut socket).await {
                    let _ = tx.send(request);
                }
                let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}";
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(body_start + content_length);
    let body = String::from_utf8_lossy(&buf[body_start..body_end]).to_string();

    Some(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// HTTP client that never reuses connections or goes through a proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
