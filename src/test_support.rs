//! Shared fixtures and a minimal HTTP stub for client tests.

use crate::config::ClientConfig;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers `(status, body)` for a request target and how many times its path was hit before
pub type StubHandler = Arc<dyn Fn(&str, usize) -> (u16, String) + Send + Sync>;

/// Request targets (path and query) in arrival order
pub type RequestLog = Arc<Mutex<Vec<String>>>;

pub struct StubServer {
    pub base_url: String,
    pub log: RequestLog,
}

impl StubServer {
    /// Paths without query strings, in arrival order
    pub fn paths(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|target| target.split('?').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.paths().iter().filter(|p| p.as_str() == path).count()
    }

    pub fn targets(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// Serve one response per connection until the test runtime shuts down
pub async fn spawn_stub(handler: StubHandler) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let accept_log = log.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let log = accept_log.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut read = 0;
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                        break;
                    }
                }

                let request = String::from_utf8_lossy(&buf[..read]).to_string();
                let target = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let path = target.split('?').next().unwrap_or_default().to_string();
                let nth = {
                    let mut log = log.lock().unwrap();
                    let nth = log
                        .iter()
                        .filter(|t| t.split('?').next() == Some(path.as_str()))
                        .count();
                    log.push(target.clone());
                    nth
                };

                let (status, body) = handler(&target, nth);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{}", addr),
        log,
    }
}

/// Cookie priming answers 404 like the real endpoint; the crumb is plain text
pub fn session_route(target: &str) -> Option<(u16, String)> {
    match target.split('?').next() {
        Some("/cookie") => Some((404, String::new())),
        Some("/v1/test/getcrumb") => Some((200, "stubcrumb".to_string())),
        _ => None,
    }
}

/// Session, chart and options endpoints all answering with the fixtures below
pub fn fixture_route(target: &str) -> (u16, String) {
    if let Some(response) = session_route(target) {
        return response;
    }
    let path = target.split('?').next().unwrap_or_default();
    if path.starts_with("/v8/finance/chart/") {
        (200, chart_fixture().to_string())
    } else if path.starts_with("/v7/finance/options/") {
        (200, options_fixture().to_string())
    } else {
        (404, "{}".to_string())
    }
}

/// Client settings aimed at a stub: no rate limit, fixed agent, short timeout
pub fn stub_client_config(base_url: &str, max_retries: u32) -> ClientConfig {
    ClientConfig {
        query_base_url: base_url.to_string(),
        cookie_url: format!("{}/cookie", base_url),
        rate_limit_per_minute: 0,
        random_agent: false,
        max_retries,
        timeout: Duration::from_secs(5),
    }
}

pub fn chart_fixture() -> Value {
    // 09:30 New York on 2020-06-25, 26 and 29, delivered out of order
    json!({
        "chart": {
            "result": [{
                "meta": {
                    "currency": "USD",
                    "symbol": "NVDA",
                    "exchangeTimezoneName": "America/New_York",
                    "regularMarketPrice": 379.5
                },
                "timestamp": [1593178200, 1593091800, 1593437400, 1593437400],
                "indicators": {
                    "quote": [{
                        "open": [370.0, 360.0, 368.0, null],
                        "high": [372.0, 371.5, 369.0, null],
                        "low": [365.0, 359.0, 360.5, null],
                        "close": [366.0, 370.1, 368.5, null],
                        "volume": [12000000, 11000000.0, null, null]
                    }],
                    "adjclose": [{ "adjclose": [365.9, 370.0, null, null] }]
                }
            }],
            "error": null
        }
    })
}

pub fn options_fixture() -> Value {
    json!({
        "optionChain": {
            "result": [{
                "underlyingSymbol": "NVDA",
                "expirationDates": [1661472000, 1660867200, 1660867200, 1663286400],
                "strikes": [150.0, 160.0, 170.0],
                "options": [{
                    "expirationDate": 1660867200,
                    "calls": [
                        {
                            "contractSymbol": "NVDA220819C00170000",
                            "strike": 170.0,
                            "currency": "USD",
                            "lastPrice": 9.05,
                            "change": 1.25,
                            "percentChange": 16.02,
                            "volume": 2200,
                            "openInterest": 15000,
                            "bid": 9.0,
                            "ask": 9.1,
                            "lastTradeDate": 1660680000,
                            "impliedVolatility": 0.4531,
                            "inTheMoney": true
                        },
                        {
                            "contractSymbol": "NVDA220819C00150000",
                            "strike": 150.0,
                            "lastPrice": 28.1,
                            "inTheMoney": true
                        }
                    ],
                    "puts": [
                        {
                            "contractSymbol": "NVDA220819P00160000",
                            "strike": 160.0,
                            "bid": 0.1,
                            "ask": 0.12,
                            "inTheMoney": false
                        }
                    ]
                }]
            }],
            "error": null
        }
    })
}

