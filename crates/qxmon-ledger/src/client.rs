//! HTTP clients for the Qubic RPC and the QX query API.
//!
//! - [`RpcClient`]: tick info and transaction broadcast
//! - [`QxApiClient`]: asset order books and entity trade history

use std::time::Duration;

use qxmon_core::{AssetKey, BookOrder, BookSide, EntityId, SignedTransaction, Tick, TickInfo, TradeRecord};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::source::{BoxFuture, BroadcastReceipt, Broadcaster, LedgerReader, TickClock};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Orders returned per page by the QX order endpoints.
const ORDER_PAGE_SIZE: usize = 256;

/// Upper bound on pages fetched for one book side.
const MAX_ORDER_PAGES: usize = 8;

fn build_http_client() -> LedgerResult<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| LedgerError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// Send a request and decode a JSON body, mapping non-2xx to `Status`.
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> LedgerResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| LedgerError::HttpClient(format!("HTTP request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LedgerError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| LedgerError::Parse(format!("Failed to parse response: {e}")))
}

fn trim_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

// ============================================================================
// RpcClient
// ============================================================================

#[derive(Debug, Deserialize)]
struct TickInfoResponse {
    #[serde(rename = "tickInfo")]
    tick_info: TickInfo,
}

#[derive(Debug, Serialize)]
struct BroadcastRequest<'a> {
    #[serde(rename = "encodedTransaction")]
    encoded_transaction: &'a str,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(rename = "transactionId", default)]
    transaction_id: Option<String>,
    #[serde(rename = "peersBroadcasted", default)]
    peers_broadcasted: u32,
}

/// Client for the Qubic RPC (tick clock and broadcast).
pub struct RpcClient {
    client: Client,
    base_url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    ///
    /// # Arguments
    /// * `base_url` - RPC root (e.g., "https://rpc.qubic.org")
    pub fn new(base_url: impl Into<String>) -> LedgerResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: trim_base(base_url),
        })
    }

    /// Fetch the full tick info snapshot.
    pub async fn fetch_tick_info(&self) -> LedgerResult<TickInfo> {
        let url = format!("{}/v1/tick-info", self.base_url);
        let response: TickInfoResponse = send_json(self.client.get(&url)).await?;
        debug!(tick = %response.tick_info.tick, epoch = response.tick_info.epoch, "Tick info fetched");
        Ok(response.tick_info)
    }

    /// Broadcast a signed transaction.
    ///
    /// A 4xx answer or a response without `transactionId` is a rejection.
    pub async fn broadcast(&self, tx: &SignedTransaction) -> LedgerResult<BroadcastReceipt> {
        let url = format!("{}/v1/broadcast-transaction", self.base_url);
        let encoded = tx.to_base64();
        let request = self.client.post(&url).json(&BroadcastRequest {
            encoded_transaction: &encoded,
        });

        let response: BroadcastResponse = match send_json(request).await {
            Ok(response) => response,
            Err(LedgerError::Status { status, body }) if (400..500).contains(&status) => {
                warn!(status, %body, "Broadcast refused by RPC");
                return Err(LedgerError::Rejected(format!("HTTP {status}: {body}")));
            }
            Err(e) => return Err(e),
        };

        match response.transaction_id.filter(|id| !id.is_empty()) {
            Some(transaction_id) => {
                info!(
                    %transaction_id,
                    peers = response.peers_broadcasted,
                    tick = %tx.tick(),
                    "Transaction broadcast"
                );
                Ok(BroadcastReceipt {
                    transaction_id,
                    peers_broadcasted: response.peers_broadcasted,
                })
            }
            None => Err(LedgerError::Rejected(
                "response carried no transactionId".to_string(),
            )),
        }
    }
}

impl TickClock for RpcClient {
    fn current_tick(&self) -> BoxFuture<'_, LedgerResult<Tick>> {
        Box::pin(async move { Ok(self.fetch_tick_info().await?.tick) })
    }
}

impl Broadcaster for RpcClient {
    fn submit<'a>(
        &'a self,
        tx: &'a SignedTransaction,
    ) -> BoxFuture<'a, LedgerResult<BroadcastReceipt>> {
        Box::pin(self.broadcast(tx))
    }
}

// ============================================================================
// QxApiClient
// ============================================================================

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    orders: Vec<BookOrder>,
}

/// Trades come back either wrapped (`{"trades": [...]}`) or as a bare array
/// depending on the deployment.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TradesResponse {
    Wrapped { trades: Vec<TradeRecord> },
    Bare(Vec<TradeRecord>),
}

impl TradesResponse {
    fn into_trades(self) -> Vec<TradeRecord> {
        match self {
            Self::Wrapped { trades } | Self::Bare(trades) => trades,
        }
    }
}

/// Client for the QX order-book and trade query API.
pub struct QxApiClient {
    client: Client,
    base_url: String,
}

impl QxApiClient {
    /// Create a new QX API client.
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., "https://api.qubic.org")
    pub fn new(base_url: impl Into<String>) -> LedgerResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: trim_base(base_url),
        })
    }

    /// Fetch every resting order on one side, following pagination.
    pub async fn fetch_orders(&self, asset: &AssetKey, side: BookSide) -> LedgerResult<Vec<BookOrder>> {
        let endpoint = match side {
            BookSide::Bid => "getAssetBidOrders",
            BookSide::Ask => "getAssetAskOrders",
        };
        let url = format!("{}/v1/qx/{endpoint}", self.base_url);

        let mut orders = Vec::new();
        for page in 0..MAX_ORDER_PAGES {
            let offset = (page * ORDER_PAGE_SIZE).to_string();
            let request = self.client.get(&url).query(&[
                ("assetName", asset.name.as_str()),
                ("issuerId", asset.issuer.as_str()),
                ("offset", offset.as_str()),
            ]);
            let response: OrdersResponse = send_json(request).await?;
            let page_len = response.orders.len();
            orders.extend(response.orders);
            if page_len < ORDER_PAGE_SIZE {
                debug!(asset = %asset, %side, count = orders.len(), "Orders fetched");
                return Ok(orders);
            }
        }

        // A missing order would read as "removed" to a removal predicate.
        warn!(asset = %asset, %side, count = orders.len(), "Order book exceeds page limit");
        Err(LedgerError::Parse(format!(
            "order book truncated after {} orders",
            orders.len()
        )))
    }

    /// Fetch the trade history of an entity.
    pub async fn fetch_entity_trades(&self, entity: &EntityId) -> LedgerResult<Vec<TradeRecord>> {
        let url = format!("{}/v1/qx/getEntityTrades", self.base_url);
        let request = self.client.get(&url).query(&[("entityId", entity.as_str())]);
        let response: TradesResponse = send_json(request).await?;
        let trades = response.into_trades();
        debug!(entity = %entity, count = trades.len(), "Trades fetched");
        Ok(trades)
    }
}

impl LedgerReader for QxApiClient {
    fn orders<'a>(
        &'a self,
        asset: &'a AssetKey,
        side: BookSide,
    ) -> BoxFuture<'a, LedgerResult<Vec<BookOrder>>> {
        Box::pin(self.fetch_orders(asset, side))
    }

    fn trades<'a>(&'a self, entity: &'a EntityId) -> BoxFuture<'a, LedgerResult<Vec<TradeRecord>>> {
        Box::pin(self.fetch_entity_trades(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_base_strips_trailing_slash() {
        assert_eq!(trim_base("https://rpc.qubic.org/"), "https://rpc.qubic.org");
        assert_eq!(trim_base("http://x"), "http://x");
    }

    #[test]
    fn test_trades_response_both_shapes() {
        let wrapped = r#"{"trades":[{"price":1,"quantity":1,"taker":"A"}]}"#;
        let bare = r#"[{"price":1,"quantity":1,"taker":"A"},{"price":2,"quantity":1,"taker":"B"}]"#;

        let w: TradesResponse = serde_json::from_str(wrapped).unwrap();
        let b: TradesResponse = serde_json::from_str(bare).unwrap();
        assert_eq!(w.into_trades().len(), 1);
        assert_eq!(b.into_trades().len(), 2);
    }

    #[test]
    fn test_broadcast_response_without_id() {
        let raw = r#"{"peersBroadcasted": 0}"#;
        let response: BroadcastResponse = serde_json::from_str(raw).unwrap();
        assert!(response.transaction_id.is_none());
    }

    #[test]
    fn test_tick_info_response_shape() {
        let raw = r#"{"tickInfo":{"tick":100,"duration":2,"epoch":9,"initialTick":90}}"#;
        let response: TickInfoResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.tick_info.tick, Tick::new(100));
    }

    /// Serve `full_pages` pages of 256 orders, then an empty page.
    async fn spawn_order_server(full_pages: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let order = r#"{"entityId":"OWNER","price":10,"numberOfShares":1}"#;
        let full_page = format!("{{\"orders\":[{}]}}", vec![order; ORDER_PAGE_SIZE].join(","));

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let full_page = full_page.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let offset: usize = head
                        .split("offset=")
                        .nth(1)
                        .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
                        .and_then(|digits| digits.parse().ok())
                        .unwrap_or(0);
                    let body = if offset / ORDER_PAGE_SIZE < full_pages {
                        full_page
                    } else {
                        r#"{"orders":[]}"#.to_string()
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    fn local_client(base_url: String) -> QxApiClient {
        QxApiClient {
            client: Client::builder().no_proxy().build().unwrap(),
            base_url,
        }
    }

    fn test_asset() -> AssetKey {
        AssetKey::new(EntityId::new("ISSUER").unwrap(), "CFB").unwrap()
    }

    #[tokio::test]
    async fn test_order_pages_followed_until_short_page() {
        let client = local_client(spawn_order_server(2).await);

        let orders = client.fetch_orders(&test_asset(), BookSide::Bid).await.unwrap();
        assert_eq!(orders.len(), 2 * ORDER_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_full_last_page_is_an_error() {
        let client = local_client(spawn_order_server(MAX_ORDER_PAGES).await);

        let err = client
            .fetch_orders(&test_asset(), BookSide::Ask)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Parse(ref msg) if msg.contains("truncated")));
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_clients_build() {
        assert!(RpcClient::new("http://127.0.0.1:1").is_ok());
        assert!(QxApiClient::new("http://127.0.0.1:1/").is_ok());
    }
}
