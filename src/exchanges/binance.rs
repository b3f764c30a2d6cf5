use crate::core::events::{
    DepthLevel, DepthUpdate, ExecutionReport, MarketEvent, NewOrder, OrderId, OrderSide,
    OrderStatus, OrderType, PriceTick, TimeInForce,
};
use crate::exchanges::{ExchangeClient, ExchangeError, MarketDataStream, UserDataStream};
use crate::types::{Price, Size, Symbol};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use hmac::{Hmac, Mac};
use log::{info, warn};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const EXCHANGE_ID: &str = "binance";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Binance REST client
pub struct BinanceClient {
    api_key: String,
    api_secret: String,
    rest_url: String,
    ws_url: String,
    http: Client,
    recv_window_ms: u64,
}

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> Self {
        let (rest_url, ws_url) = if testnet {
            (
                "https://testnet.binance.vision".to_string(),
                "wss://testnet.binance.vision/ws".to_string(),
            )
        } else {
            (
                "https://api.binance.com".to_string(),
                "wss://stream.binance.com:9443/ws".to_string(),
            )
        };

        Self {
            api_key,
            api_secret,
            rest_url,
            ws_url,
            http: Client::new(),
            recv_window_ms: 5000,
        }
    }

    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(query_string.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, mut params: Vec<(String, String)>) -> String {
        params.push((
            "timestamp".to_string(),
            chrono::Utc::now().timestamp_millis().to_string(),
        ));
        params.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<Value, ExchangeError> {
        let url = format!("{}{}?{}", self.rest_url, path, self.signed_query(params));
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, ExchangeError> {
        let mut params = vec![
            ("symbol".to_string(), order.symbol.as_str().to_string()),
            ("side".to_string(), side_param(order.side).to_string()),
            (
                "type".to_string(),
                order_type_param(order.order_type).to_string(),
            ),
            ("quantity".to_string(), order.size.abs().to_string()),
        ];
        if let Some(price) = order.price {
            params.push(("price".to_string(), price.to_string()));
            params.push((
                "timeInForce".to_string(),
                time_in_force_param(order.time_in_force).to_string(),
            ));
        }
        if let Some(client_order_id) = &order.client_order_id {
            params.push(("newClientOrderId".to_string(), client_order_id.clone()));
        }

        let json = self
            .send_signed(Method::POST, "/api/v3/order", params)
            .await?;
        json.get("orderId")
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string())
            .ok_or_else(|| ExchangeError::Parse("missing orderId in response".to_string()))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        self.send_signed(Method::DELETE, "/api/v3/order", params)
            .await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<ExecutionReport, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let json = self
            .send_signed(Method::GET, "/api/v3/order", params)
            .await?;
        parse_rest_order(&json)
    }

    async fn get_open_orders(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<ExecutionReport>, ExchangeError> {
        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), symbol.to_string()));
        }
        let json = self
            .send_signed(Method::GET, "/api/v3/openOrders", params)
            .await?;
        parse_rest_orders(&json)
    }

    async fn get_order_history(
        &self,
        symbol: Option<&str>,
        lookback: Duration,
    ) -> Result<Vec<ExecutionReport>, ExchangeError> {
        let start_time = chrono::Utc::now().timestamp_millis() as u64
            - lookback.as_millis().min(u64::MAX as u128) as u64;
        let mut params = vec![("startTime".to_string(), start_time.to_string())];
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), symbol.to_string()));
        }
        let json = self
            .send_signed(Method::GET, "/api/v3/allOrders", params)
            .await?;
        parse_rest_orders(&json)
    }

    async fn get_listen_key(&self) -> Result<String, ExchangeError> {
        let url = format!("{}/api/v3/userDataStream", self.rest_url);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;
        json.get("listenKey")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ExchangeError::Parse("missing listenKey in response".to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() {
        ExchangeError::Timeout(Duration::from_secs(30))
    } else {
        ExchangeError::ConnectionReset(e.to_string())
    }
}

/// HTTP status and Binance error-code mapping to the error taxonomy
fn classify_http_error(status: StatusCode, body: &str) -> ExchangeError {
    if let Some(code) = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(|c| c.as_i64()))
    {
        match code {
            -2010 => return ExchangeError::InsufficientFunds(body.to_string()),
            -1013 | -2011 => return ExchangeError::InvalidOrder(body.to_string()),
            _ => {}
        }
    }
    match status.as_u16() {
        408 => ExchangeError::Timeout(Duration::from_secs(30)),
        418 | 429 => ExchangeError::RateLimited,
        500..=599 => ExchangeError::ConnectionReset(format!("{}: {}", status, body)),
        _ => ExchangeError::Api(format!("{}: {}", status, body)),
    }
}

fn side_param(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn order_type_param(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopLoss => "STOP_LOSS",
        OrderType::StopLimit => "STOP_LOSS_LIMIT",
    }
}

fn time_in_force_param(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::GoodTillCancelled => "GTC",
        TimeInForce::ImmediateOrCancel => "IOC",
        TimeInForce::FillOrKill => "FOK",
    }
}

fn parse_status(status: &str) -> Option<OrderStatus> {
    match status {
        "PENDING_NEW" => Some(OrderStatus::Pending),
        "NEW" => Some(OrderStatus::Open),
        "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
        "FILLED" => Some(OrderStatus::Filled),
        // Expired orders are dead without fills, same as cancelled here
        "CANCELED" | "CANCELLED" | "EXPIRED" => Some(OrderStatus::Cancelled),
        "REJECTED" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

fn parse_side(side: &str) -> Option<OrderSide> {
    match side {
        "BUY" => Some(OrderSide::Buy),
        "SELL" => Some(OrderSide::Sell),
        _ => None,
    }
}

fn parse_rest_orders(json: &Value) -> Result<Vec<ExecutionReport>, ExchangeError> {
    json.as_array()
        .ok_or_else(|| ExchangeError::Parse("expected an order array".to_string()))?
        .iter()
        .map(parse_rest_order)
        .collect()
}

/// Parse one REST order object (shared by order/openOrders/allOrders)
fn parse_rest_order(order: &Value) -> Result<ExecutionReport, ExchangeError> {
    let parse = |msg: &str| ExchangeError::Parse(msg.to_string());

    let order_id = order
        .get("orderId")
        .and_then(|v| v.as_i64())
        .map(|id| id.to_string())
        .ok_or_else(|| parse("missing orderId"))?;
    let client_order_id = order
        .get("clientOrderId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let symbol = order
        .get("symbol")
        .and_then(|v| v.as_str())
        .ok_or_else(|| parse("missing symbol"))?;
    let side = order
        .get("side")
        .and_then(|v| v.as_str())
        .and_then(parse_side)
        .ok_or_else(|| parse("missing side"))?;
    let status = order
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(parse_status)
        .ok_or_else(|| parse("unknown order status"))?;

    let orig_qty = order
        .get("origQty")
        .and_then(|v| v.as_str())
        .and_then(|s| Size::from_str(s).ok())
        .ok_or_else(|| parse("missing origQty"))?;
    let executed_qty = order
        .get("executedQty")
        .and_then(|v| v.as_str())
        .and_then(|s| Size::from_str(s).ok())
        .ok_or_else(|| parse("missing executedQty"))?;

    // Average fill price from the cumulative quote volume when filled
    let average_price = order
        .get("cummulativeQuoteQty")
        .and_then(|v| v.as_str())
        .and_then(|s| Price::from_str(s).ok())
        .filter(|_| !executed_qty.is_zero())
        .map(|quote| Price::new(quote.value() / executed_qty.value()));

    let timestamp = order
        .get("updateTime")
        .or_else(|| order.get("time"))
        .and_then(|v| v.as_u64())
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);

    Ok(ExecutionReport {
        order_id,
        client_order_id,
        symbol: Symbol::new(symbol),
        exchange_id: EXCHANGE_ID.to_string(),
        side,
        status,
        filled_size: executed_qty,
        remaining_size: orig_qty - executed_qty,
        average_price,
        timestamp,
    })
}

/// Parse one market-data websocket message (ticker or depth).
/// Combined-stream envelopes are unwrapped; unrecognised payloads yield None.
fn parse_market_message(text: &str) -> Result<Option<MarketEvent>, ExchangeError> {
    let json: Value =
        serde_json::from_str(text).map_err(|e| ExchangeError::Parse(e.to_string()))?;
    let data = json.get("data").unwrap_or(&json);

    match data.get("e").and_then(|v| v.as_str()) {
        Some("24hrTicker") => {
            let symbol = data
                .get("s")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ExchangeError::Parse("ticker missing symbol".to_string()))?;
            let price = data
                .get("c")
                .and_then(|v| v.as_str())
                .and_then(|s| Price::from_str(s).ok())
                .ok_or_else(|| ExchangeError::Parse("ticker missing last price".to_string()))?;
            let timestamp = data.get("E").and_then(|v| v.as_u64()).unwrap_or_default();
            Ok(Some(MarketEvent::Tick(PriceTick {
                symbol: Symbol::new(symbol),
                exchange_id: EXCHANGE_ID.to_string(),
                price,
                timestamp,
            })))
        }
        Some("depthUpdate") => {
            let symbol = data
                .get("s")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ExchangeError::Parse("depth missing symbol".to_string()))?;
            let timestamp = data.get("E").and_then(|v| v.as_u64()).unwrap_or_default();
            Ok(Some(MarketEvent::Depth(DepthUpdate {
                symbol: Symbol::new(symbol),
                exchange_id: EXCHANGE_ID.to_string(),
                bids: parse_depth_levels(data.get("b")),
                asks: parse_depth_levels(data.get("a")),
                timestamp,
            })))
        }
        _ => Ok(None),
    }
}

fn parse_depth_levels(levels: Option<&Value>) -> Vec<DepthLevel> {
    levels
        .and_then(|v| v.as_array())
        .map(|levels| {
            levels
                .iter()
                .filter_map(|level| {
                    let price = Price::from_str(level.get(0)?.as_str()?).ok()?;
                    let size = Size::from_str(level.get(1)?.as_str()?).ok()?;
                    Some(DepthLevel::new(price, size))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse one user-stream executionReport event; other event kinds yield None
fn parse_user_event(text: &str) -> Result<Option<ExecutionReport>, ExchangeError> {
    let json: Value =
        serde_json::from_str(text).map_err(|e| ExchangeError::Parse(e.to_string()))?;
    if json.get("e").and_then(|v| v.as_str()) != Some("executionReport") {
        return Ok(None);
    }
    let parse = |msg: &str| ExchangeError::Parse(msg.to_string());

    let order_id = json
        .get("i")
        .and_then(|v| v.as_i64())
        .map(|id| id.to_string())
        .ok_or_else(|| parse("executionReport missing order id"))?;
    let symbol = json
        .get("s")
        .and_then(|v| v.as_str())
        .ok_or_else(|| parse("executionReport missing symbol"))?;
    let side = json
        .get("S")
        .and_then(|v| v.as_str())
        .and_then(parse_side)
        .ok_or_else(|| parse("executionReport missing side"))?;
    let status = json
        .get("X")
        .and_then(|v| v.as_str())
        .and_then(parse_status)
        .ok_or_else(|| parse("executionReport with unknown status"))?;
    let orig_qty = json
        .get("q")
        .and_then(|v| v.as_str())
        .and_then(|s| Size::from_str(s).ok())
        .ok_or_else(|| parse("executionReport missing quantity"))?;
    let filled = json
        .get("z")
        .and_then(|v| v.as_str())
        .and_then(|s| Size::from_str(s).ok())
        .ok_or_else(|| parse("executionReport missing filled quantity"))?;
    let average_price = json
        .get("Z")
        .and_then(|v| v.as_str())
        .and_then(|s| Price::from_str(s).ok())
        .filter(|_| !filled.is_zero())
        .map(|quote| Price::new(quote.value() / filled.value()));

    Ok(Some(ExecutionReport {
        order_id,
        client_order_id: json
            .get("c")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        symbol: Symbol::new(symbol),
        exchange_id: EXCHANGE_ID.to_string(),
        side,
        status,
        filled_size: filled,
        remaining_size: orig_qty - filled,
        average_price,
        timestamp: json.get("E").and_then(|v| v.as_u64()).unwrap_or_default(),
    }))
}

/// Binance public market-data websocket (ticker + depth per symbol)
pub struct BinanceMarketStream {
    ws_url: String,
    stream: Option<WsStream>,
    subscriptions: Vec<String>,
}

impl BinanceMarketStream {
    pub fn new(testnet: bool) -> Self {
        let ws_url = if testnet {
            "wss://testnet.binance.vision".to_string()
        } else {
            "wss://stream.binance.com:9443".to_string()
        };
        Self {
            ws_url,
            stream: None,
            subscriptions: Vec::new(),
        }
    }

    async fn reconnect(&mut self) -> Result<(), ExchangeError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        if self.subscriptions.is_empty() {
            return Ok(());
        }

        let streams: Vec<String> = self
            .subscriptions
            .iter()
            .flat_map(|s| {
                let s = s.to_lowercase();
                [format!("{}@ticker", s), format!("{}@depth", s)]
            })
            .collect();
        let url = format!("{}/stream?streams={}", self.ws_url, streams.join("/"));
        info!("connecting market stream: {}", url);

        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| ExchangeError::ConnectionReset(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}

#[async_trait]
impl MarketDataStream for BinanceMarketStream {
    async fn subscribe(&mut self, symbols: &[&str]) -> Result<(), ExchangeError> {
        for symbol in symbols {
            if !self.subscriptions.iter().any(|s| s == symbol) {
                self.subscriptions.push(symbol.to_string());
            }
        }
        self.reconnect().await
    }

    async fn unsubscribe(&mut self, symbols: &[&str]) -> Result<(), ExchangeError> {
        self.subscriptions.retain(|s| !symbols.contains(&s.as_str()));
        self.reconnect().await
    }

    async fn next(&mut self) -> Option<Result<MarketEvent, ExchangeError>> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_market_message(&text) {
                    Ok(Some(event)) => return Some(Ok(event)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    warn!("market stream closed by peer");
                    self.stream = None;
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Some(Err(ExchangeError::ConnectionReset(e.to_string())))
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Binance authenticated user-data websocket, keyed by a listen key obtained
/// through the REST client
pub struct BinanceUserStream {
    client: Arc<BinanceClient>,
    stream: Option<WsStream>,
}

impl BinanceUserStream {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self {
            client,
            stream: None,
        }
    }
}

#[async_trait]
impl UserDataStream for BinanceUserStream {
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        let listen_key = self.client.get_listen_key().await?;
        let url = format!("{}/{}", self.client.ws_url, listen_key);
        info!("connecting user stream");

        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| ExchangeError::ConnectionReset(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<ExecutionReport, ExchangeError>> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_user_event(&text) {
                    Ok(Some(report)) => return Some(Ok(report)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    warn!("user stream closed by peer");
                    self.stream = None;
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Some(Err(ExchangeError::ConnectionReset(e.to_string())))
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let client = BinanceClient::new("key".to_string(), "secret".to_string(), true);
        let a = client.sign("symbol=BTCUSDT&side=BUY");
        let b = client.sign("symbol=BTCUSDT&side=BUY");
        assert_eq!(a, b);
        assert_ne!(a, client.sign("symbol=ETHUSDT&side=BUY"));
    }

    #[test]
    fn test_http_error_classification() {
        assert_eq!(
            classify_http_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ExchangeError::RateLimited
        );
        assert_eq!(
            classify_http_error(StatusCode::IM_A_TEAPOT, ""),
            ExchangeError::RateLimited
        );
        assert!(matches!(
            classify_http_error(StatusCode::REQUEST_TIMEOUT, ""),
            ExchangeError::Timeout(_)
        ));
        assert!(matches!(
            classify_http_error(StatusCode::BAD_GATEWAY, "upstream"),
            ExchangeError::ConnectionReset(_)
        ));

        // Binance error codes take precedence over the HTTP status
        assert!(matches!(
            classify_http_error(
                StatusCode::BAD_REQUEST,
                r#"{"code":-2010,"msg":"Account has insufficient balance"}"#
            ),
            ExchangeError::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_http_error(
                StatusCode::BAD_REQUEST,
                r#"{"code":-2011,"msg":"Unknown order sent"}"#
            ),
            ExchangeError::InvalidOrder(_)
        ));
        assert!(matches!(
            classify_http_error(
                StatusCode::BAD_REQUEST,
                r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#
            ),
            ExchangeError::InvalidOrder(_)
        ));
        assert!(matches!(
            classify_http_error(StatusCode::BAD_REQUEST, r#"{"code":-1000}"#),
            ExchangeError::Api(_)
        ));
    }

    #[test]
    fn test_parse_rest_order() {
        let json: Value = serde_json::from_str(
            r#"{
                "orderId": 12345,
                "clientOrderId": "cid-1",
                "symbol": "BTCUSDT",
                "side": "BUY",
                "status": "PARTIALLY_FILLED",
                "origQty": "2.0",
                "executedQty": "0.5",
                "cummulativeQuoteQty": "25000.0",
                "updateTime": 1700000000000
            }"#,
        )
        .unwrap();

        let report = parse_rest_order(&json).unwrap();
        assert_eq!(report.order_id, "12345");
        assert_eq!(report.client_order_id.as_deref(), Some("cid-1"));
        assert_eq!(report.status, OrderStatus::PartiallyFilled);
        assert_eq!(report.filled_size, Size::from_str("0.5").unwrap());
        assert_eq!(report.remaining_size, Size::from_str("1.5").unwrap());
        assert_eq!(report.average_price, Some(Price::from_str("50000").unwrap()));
        assert_eq!(report.timestamp, 1700000000000);
    }

    #[test]
    fn test_parse_rest_order_expired_maps_to_cancelled() {
        let json: Value = serde_json::from_str(
            r#"{
                "orderId": 7,
                "symbol": "ETHUSDT",
                "side": "SELL",
                "status": "EXPIRED",
                "origQty": "1.0",
                "executedQty": "0.0",
                "time": 1700000000001
            }"#,
        )
        .unwrap();

        let report = parse_rest_order(&json).unwrap();
        assert_eq!(report.status, OrderStatus::Cancelled);
        assert_eq!(report.average_price, None);
    }

    #[test]
    fn test_parse_market_ticker_and_depth() {
        let tick = parse_market_message(
            r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","E":1700000000002,"s":"BTCUSDT","c":"50123.45"}}"#,
        )
        .unwrap()
        .unwrap();
        match tick {
            MarketEvent::Tick(tick) => {
                assert_eq!(tick.symbol.as_str(), "BTCUSDT");
                assert_eq!(tick.price, Price::from_str("50123.45").unwrap());
            }
            other => panic!("expected a tick, got {:?}", other),
        }

        let depth = parse_market_message(
            r#"{"e":"depthUpdate","E":1700000000003,"s":"BTCUSDT","b":[["50000.0","1.5"]],"a":[["50001.0","0.7"]]}"#,
        )
        .unwrap()
        .unwrap();
        match depth {
            MarketEvent::Depth(update) => {
                assert_eq!(update.bids.len(), 1);
                assert_eq!(update.asks[0].size, Size::from_str("0.7").unwrap());
            }
            other => panic!("expected depth, got {:?}", other),
        }

        // Unknown payloads are skipped, not errors
        assert!(parse_market_message(r#"{"result":null,"id":1}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_user_execution_report() {
        let report = parse_user_event(
            r#"{"e":"executionReport","E":1700000000004,"s":"BTCUSDT","c":"cid-9",
                "S":"SELL","X":"FILLED","i":99,"q":"1.0","z":"1.0","Z":"51000.0"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(report.order_id, "99");
        assert_eq!(report.side, OrderSide::Sell);
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.remaining_size, Size::ZERO);
        assert_eq!(report.average_price, Some(Price::from_str("51000").unwrap()));

        // Balance updates and other event kinds are skipped
        assert!(parse_user_event(r#"{"e":"outboundAccountPosition"}"#)
            .unwrap()
            .is_none());
    }
}
