//! HTTP client for a MetaTrader 5 REST bridge.
//!
//! The bridge runs next to the terminal and exposes the terminal's session,
//! positions, market data, and trade requests as JSON endpoints. Read
//! queries are retried on transient transport failures; trade requests are
//! sent exactly once.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::models::{MarketTick, PositionSnapshot, SymbolInfo};

use super::broker::{Broker, Credentials, OrderOutcome, StopModification};
use super::types::*;

pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8228";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on time spent retrying a single read query
const READ_RETRY_WINDOW: Duration = Duration::from_secs(3);

/// How a read query treats a non-2xx answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStatus {
    Found,
    /// Resource does not exist; not an error
    Missing,
    Retry,
    Fail,
}

fn classify_read_status(status: StatusCode) -> ReadStatus {
    if status.is_success() {
        ReadStatus::Found
    } else if status == StatusCode::NOT_FOUND {
        ReadStatus::Missing
    } else if status.is_server_error() {
        ReadStatus::Retry
    } else {
        ReadStatus::Fail
    }
}

/// Client for the terminal's REST bridge.
pub struct BridgeClient {
    http: Client,
    base_url: String,
    connected: bool,
}

impl BridgeClient {
    /// Create a client for the bridge at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid bridge URL {}", base_url))?;

        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            connected: false,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bridge URL for `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid bridge URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Bridge URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON resource, retrying transport errors and 5xx responses.
    /// A 404 yields `None`.
    async fn get_json<T>(&self, url: Url) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        debug!(url = %url, "Bridge GET");

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(READ_RETRY_WINDOW))
            .build();

        retry(policy, || {
            let http = self.http.clone();
            let url = url.clone();
            async move {
                let response = http.get(url.clone()).send().await.map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        backoff::Error::transient(anyhow!(e).context(format!("GET {} failed", url)))
                    } else {
                        backoff::Error::permanent(anyhow!(e).context(format!("GET {} failed", url)))
                    }
                })?;

                let status = response.status();
                match classify_read_status(status) {
                    ReadStatus::Found => {}
                    ReadStatus::Missing => return Ok(None),
                    class => {
                        let body = response.text().await.unwrap_or_default();
                        let err = anyhow!("GET {} returned {} - {}", url, status, body);
                        return Err(if class == ReadStatus::Retry {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        });
                    }
                }

                response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(|e| {
                        backoff::Error::permanent(
                            anyhow!(e).context(format!("Failed to parse response from {}", url)),
                        )
                    })
            }
        })
        .await
    }

    /// POST a JSON body once and parse the JSON answer.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.endpoint(&[path])?;
        debug!(url = %url, "Bridge POST");

        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("POST {} returned {} - {}", url, status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl Broker for BridgeClient {
    async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        if credentials.is_empty() {
            info!(bridge = %self.base_url, "Attaching to the terminal's active session");
        } else {
            info!(
                bridge = %self.base_url,
                login = ?credentials.login,
                server = ?credentials.server,
                "Logging in to trading account"
            );
        }

        let response: SessionResponse = self.post_json("initialize", credentials).await?;
        if !response.success {
            bail!(
                "Terminal initialization failed: {}",
                response.last_error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        self.connected = true;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        let response: SessionResponse = self
            .post_json("shutdown", &serde_json::json!({}))
            .await?;
        if !response.success {
            warn!(error = ?response.last_error, "Terminal reported an unclean shutdown");
        }
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<PositionSnapshot>> {
        let items: Vec<PositionResponse> = self
            .get_json(self.endpoint(&["positions"])?)
            .await?
            .context("Bridge has no positions endpoint")?;

        let positions = items
            .into_iter()
            .filter_map(|p| match p.into_snapshot() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed position");
                    None
                }
            })
            .collect();

        Ok(positions)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>> {
        let info: Option<SymbolInfoResponse> =
            self.get_json(self.endpoint(&["symbols", symbol])?).await?;
        Ok(info.map(SymbolInfo::from))
    }

    async fn tick(&self, symbol: &str) -> Result<Option<MarketTick>> {
        let tick: Option<TickResponse> =
            self.get_json(self.endpoint(&["symbols", symbol, "tick"])?).await?;
        Ok(tick.map(MarketTick::from))
    }

    async fn modify_stops(&self, request: &StopModification) -> Result<OrderOutcome> {
        let body = TradeRequest {
            action: TradeAction::Sltp,
            symbol: request.symbol.clone(),
            sl: request.stop_loss,
            tp: request.take_profit,
            position: request.ticket,
        };

        let result: TradeResultResponse = self.post_json("order", &body).await?;
        Ok(OrderOutcome::from_retcode(result.retcode, result.comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering each connection with the next canned
    /// `(status, body)`; the last one repeats. Returns the base URL and the
    /// request lines seen.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        let mut queue: VecDeque<_> = responses.into();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf);
                let line = head.lines().next().unwrap_or_default().to_string();
                seen.lock().unwrap().push(line);

                let (status, body) = if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    *queue.front().unwrap()
                };
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("");
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), requests)
    }

    #[test]
    fn test_read_status_classes() {
        assert_eq!(classify_read_status(StatusCode::OK), ReadStatus::Found);
        assert_eq!(classify_read_status(StatusCode::NOT_FOUND), ReadStatus::Missing);
        assert_eq!(classify_read_status(StatusCode::SERVICE_UNAVAILABLE), ReadStatus::Retry);
        assert_eq!(classify_read_status(StatusCode::INTERNAL_SERVER_ERROR), ReadStatus::Retry);
        assert_eq!(classify_read_status(StatusCode::BAD_REQUEST), ReadStatus::Fail);
        assert_eq!(classify_read_status(StatusCode::UNAUTHORIZED), ReadStatus::Fail);
    }

    #[test]
    fn test_endpoint_encodes_symbol_segments() {
        let client = BridgeClient::new("http://localhost:8228/").unwrap();

        let url = client.endpoint(&["symbols", "#AAPL", "tick"]).unwrap();
        assert_eq!(url.path(), "/symbols/%23AAPL/tick");
        assert_eq!(url.fragment(), None);

        let url = client.endpoint(&["symbols", "EUR/USD"]).unwrap();
        assert_eq!(url.path(), "/symbols/EUR%2FUSD");

        let url = client.endpoint(&["symbols", "US30?cash"]).unwrap();
        assert_eq!(url.path(), "/symbols/US30%3Fcash");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = BridgeClient::new("http://localhost:8228/mt5/").unwrap();
        let url = client.endpoint(&["positions"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8228/mt5/positions");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(BridgeClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_tick_request_path_is_encoded() {
        let (url, requests) = serve(vec![(200, r#"{"bid": 190.12, "ask": 190.15}"#)]).await;
        let client = BridgeClient::new(&url).unwrap();

        let tick = client.tick("#AAPL").await.unwrap().unwrap();
        assert_eq!(tick.bid, dec!(190.12));
        let seen = requests.lock().unwrap().clone();
        assert_eq!(seen, vec!["GET /symbols/%23AAPL/tick HTTP/1.1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_symbol_is_none() {
        let (url, requests) = serve(vec![(404, r#"{"error": "not found"}"#)]).await;
        let client = BridgeClient::new(&url).unwrap();

        assert_eq!(client.symbol_info("NOPE").await.unwrap(), None);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (url, requests) = serve(vec![
            (503, r#"{"error": "busy"}"#),
            (200, r#"{"point": 0.001, "digits": 3}"#),
        ])
        .await;
        let client = BridgeClient::new(&url).unwrap();

        let info = client.symbol_info("USDJPYm").await.unwrap();
        assert_eq!(
            info,
            Some(SymbolInfo {
                point: dec!(0.001),
                digits: 3
            })
        );
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, requests) = serve(vec![(400, r#"{"error": "bad symbol"}"#)]).await;
        let client = BridgeClient::new(&url).unwrap();

        let err = client.symbol_info("USDJPYm").await.unwrap_err();
        assert!(err.to_string().contains("400"));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_positions_skip_unknown_type() {
        let body = r#"[
            {"ticket": 1, "symbol": "USDJPYm", "type": 0, "price_open": 150.0, "profit": 12.0},
            {"ticket": 2, "symbol": "XAUUSD", "type": 4, "price_open": 2300.0},
            {"ticket": 3, "symbol": "EURUSD", "type": 1, "price_open": 1.085, "sl": 1.09}
        ]"#;
        let (url, _) = serve(vec![(200, body)]).await;
        let client = BridgeClient::new(&url).unwrap();

        let positions = client.positions().await.unwrap();
        let tickets: Vec<u64> = positions.iter().map(|p| p.ticket).collect();
        assert_eq!(tickets, vec![1, 3]);
        assert_eq!(positions[1].stop_loss, Some(dec!(1.09)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BridgeClient::new("http://localhost:8228/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8228");
    }

    #[tokio::test]
    async fn test_shutdown_without_session_is_noop() {
        // Nothing listens on this port; shutdown must not touch the network
        let mut client = BridgeClient::new("http://127.0.0.1:1").unwrap();
        assert!(client.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let mut client = BridgeClient::new("http://127.0.0.1:1").unwrap();
        let result = client.connect(&Credentials::default()).await;
        assert!(result.is_err());
        assert!(!client.connected);
    }
}
