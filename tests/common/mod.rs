//! Local HTTP test doubles for probe runs.
//!
//! `wiremock` covers request/response cases; the raw TCP servers here cover
//! bodies that wiremock cannot produce (endless or stalling streams).

#![allow(dead_code)]

use netprobe::settings::MIB;
use netprobe::Settings;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const CHUNK: usize = 64 * 1024;

/// Settings with short windows so tests finish quickly.
pub fn fast_settings(ping_url: &str, download_url: &str, upload_url: &str) -> Settings {
    Settings {
        ping_url: ping_url.to_string(),
        download_url: download_url.to_string(),
        upload_url: upload_url.to_string(),
        ping_timeout_ms: 1_000,
        download_duration_ms: 500,
        download_hard_timeout_ms: 1_500,
        upload_probe_timeout_ms: 2_000,
        upload_final_timeout_ms: 2_000,
        upload_max_bytes: 4 * MIB,
        ..Settings::default()
    }
}

/// URL on a port nothing listens on.
pub async fn unreachable_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{path}")
}

#[derive(Debug, Clone, Copy)]
pub enum BodyBehavior {
    /// Chunks forever until the client hangs up.
    Endless,
    /// A few chunks, then the connection goes quiet but stays open.
    StallAfter(usize),
    /// Never sends a status line.
    Silent,
}

pub struct RawServer {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl RawServer {
    pub async fn start(behavior: BodyBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior));
            }
        });

        Self {
            addr,
            _handle: handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn serve(mut stream: TcpStream, behavior: BodyBehavior) {
    let mut buffer = [0u8; 4096];
    if stream.read(&mut buffer).await.is_err() {
        return;
    }

    if let BodyBehavior::Silent = behavior {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return;
    }

    let headers = concat!(
        "HTTP/1.1 200 OK\r\n",
        "Content-Type: application/octet-stream\r\n",
        "Connection: close\r\n\r\n",
    );
    if stream.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    let chunk = vec![0u8; CHUNK];
    let mut sent = 0usize;
    loop {
        if let BodyBehavior::StallAfter(limit) = behavior {
            if sent >= limit {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
        }
        if stream.write_all(&chunk).await.is_err() {
            return;
        }
        sent += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
