use crate::exchange::{ExchangeError, ExchangeGateway, OrderAck, OrderStatus};
use crate::models::{BookLevel, Candle, OrderBookSnapshot, OrderSide, Tick, TickSide, Timeframe};
use crate::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

const BINANCE_FUTURES_BASE: &str = "https://fapi.binance.com";

/// REST client for Binance USDT-margined futures
///
/// Market data endpoints are unauthenticated; account and order endpoints
/// are signed with HMAC-SHA256 over the query string.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    symbol: String,
    api_key: String,
    api_secret: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct DepthRaw {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct AggTradeRaw {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    timestamp_ms: i64,
    /// true when the buyer is the maker, i.e. an aggressive sell
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndexRaw {
    mark_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRaw {
    asset: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRaw {
    order_id: i64,
    status: String,
}

// ============== Implementation ==============

impl BinanceFuturesClient {
    pub fn new(symbol: String, api_key: String, api_secret: String) -> Self {
        Self::with_base_url(BINANCE_FUTURES_BASE.to_string(), symbol, api_key, api_secret)
    }

    /// Testing constructor pointing at a mock server
    pub fn with_base_url(
        base_url: String,
        symbol: String,
        api_key: String,
        api_secret: String,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url,
            symbol,
            api_key,
            api_secret,
        }
    }

    /// HMAC-SHA256 signature over the query string, hex encoded
    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| ExchangeError::InvalidSecret)?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(&self, endpoint: &str, params: &str) -> Result<String> {
        let query = format!("{}&timestamp={}", params, Utc::now().timestamp_millis());
        let signature = self.sign(&query)?;
        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, endpoint, query, signature
        ))
    }

    async fn get_public<T: for<'de> Deserialize<'de>>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn send_signed<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        params: &str,
    ) -> Result<T> {
        let url = self.signed_url(endpoint, params)?;
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

fn parse_f64(s: &str, field: &'static str) -> Result<f64> {
    s.parse::<f64>().map_err(|_| {
        ExchangeError::Parse {
            field,
            value: s.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl ExchangeGateway for BinanceFuturesClient {
    /// Endpoint: GET /fapi/v1/klines
    ///
    /// Klines come back as positional arrays:
    /// [openTime, open, high, low, close, volume, ...]
    async fn fetch_candles(&self, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let path = format!(
            "/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.symbol,
            timeframe.as_interval(),
            limit
        );
        let rows: Vec<Vec<Value>> = self.get_public(&path).await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 6 {
                return Err(ExchangeError::Malformed("kline row too short").into());
            }
            let open_time_ms = row[0]
                .as_i64()
                .ok_or(ExchangeError::Malformed("kline open time not an integer"))?;
            let field = |i: usize, name: &'static str| -> Result<f64> {
                let s = row[i]
                    .as_str()
                    .ok_or(ExchangeError::Malformed("kline field not a string"))?;
                parse_f64(s, name)
            };
            candles.push(Candle {
                open_time: Utc
                    .timestamp_millis_opt(open_time_ms)
                    .single()
                    .ok_or(ExchangeError::Malformed("kline open time out of range"))?,
                open: field(1, "open")?,
                high: field(2, "high")?,
                low: field(3, "low")?,
                close: field(4, "close")?,
                volume: field(5, "volume")?,
            });
        }
        Ok(candles)
    }

    /// Endpoint: GET /fapi/v1/depth
    async fn fetch_order_book(&self, depth: usize) -> Result<OrderBookSnapshot> {
        let path = format!("/fapi/v1/depth?symbol={}&limit={}", self.symbol, depth);
        let raw: DepthRaw = self.get_public(&path).await?;

        let parse_side = |levels: Vec<(String, String)>| -> Result<Vec<BookLevel>> {
            levels
                .into_iter()
                .map(|(price, size)| {
                    Ok(BookLevel {
                        price: parse_f64(&price, "depth price")?,
                        size: parse_f64(&size, "depth size")?,
                    })
                })
                .collect()
        };

        Ok(OrderBookSnapshot {
            bids: parse_side(raw.bids)?,
            asks: parse_side(raw.asks)?,
        })
    }

    /// Endpoint: GET /fapi/v1/aggTrades
    async fn fetch_recent_trades(&self, limit: usize) -> Result<Vec<Tick>> {
        let path = format!("/fapi/v1/aggTrades?symbol={}&limit={}", self.symbol, limit);
        let rows: Vec<AggTradeRaw> = self.get_public(&path).await?;

        rows.into_iter()
            .map(|t| {
                Ok(Tick {
                    timestamp: Utc
                        .timestamp_millis_opt(t.timestamp_ms)
                        .single()
                        .ok_or(ExchangeError::Malformed("trade timestamp out of range"))?,
                    price: parse_f64(&t.price, "trade price")?,
                    size: parse_f64(&t.quantity, "trade size")?,
                    side: if t.buyer_is_maker {
                        TickSide::Sell
                    } else {
                        TickSide::Buy
                    },
                })
            })
            .collect()
    }

    /// Endpoint: GET /fapi/v1/premiumIndex
    async fn fetch_mark_price(&self) -> Result<f64> {
        let path = format!("/fapi/v1/premiumIndex?symbol={}", self.symbol);
        let raw: PremiumIndexRaw = self.get_public(&path).await?;
        parse_f64(&raw.mark_price, "mark price")
    }

    /// Endpoint: GET /fapi/v2/balance (signed); available USDT balance
    async fn fetch_equity(&self) -> Result<f64> {
        let balances: Vec<BalanceRaw> = self
            .send_signed(reqwest::Method::GET, "/fapi/v2/balance", "")
            .await?;

        let usdt = balances
            .iter()
            .find(|b| b.asset == "USDT")
            .ok_or(ExchangeError::Malformed("no USDT balance in account"))?;
        parse_f64(&usdt.available_balance, "available balance")
    }

    /// Endpoint: POST /fapi/v1/order (signed)
    ///
    /// timeInForce GTX makes the order post-only: it is rejected instead of
    /// crossing the spread.
    async fn place_limit_order(
        &self,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> Result<OrderAck> {
        let params = format!(
            "symbol={}&side={}&type=LIMIT&timeInForce=GTX&price={:.2}&quantity={:.4}&newOrderRespType=RESULT",
            self.symbol,
            side.as_str(),
            price,
            quantity
        );
        let raw: OrderRaw = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/order", &params)
            .await?;

        Ok(OrderAck {
            order_id: raw.order_id.to_string(),
            status: OrderStatus::from_exchange(&raw.status),
        })
    }

    /// Endpoint: POST /fapi/v1/order (signed), MARKET + reduceOnly
    async fn place_market_order(&self, side: OrderSide, quantity: f64) -> Result<()> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={:.4}&reduceOnly=true",
            self.symbol,
            side.as_str(),
            quantity
        );
        let _: OrderRaw = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/order", &params)
            .await?;
        Ok(())
    }

    /// Endpoint: DELETE /fapi/v1/order (signed)
    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let params = format!("symbol={}&orderId={}", self.symbol, order_id);
        let _: OrderRaw = self
            .send_signed(reqwest::Method::DELETE, "/fapi/v1/order", &params)
            .await?;
        Ok(())
    }

    /// Endpoint: GET /fapi/v1/order (signed)
    async fn fetch_order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let params = format!("symbol={}&orderId={}", self.symbol, order_id);
        let raw: OrderRaw = self
            .send_signed(reqwest::Method::GET, "/fapi/v1/order", &params)
            .await?;
        Ok(OrderStatus::from_exchange(&raw.status))
    }

    /// Endpoint: POST /fapi/v1/leverage (signed)
    async fn set_leverage(&self, leverage: u32) -> Result<()> {
        let params = format!("symbol={}&leverage={}", self.symbol, leverage);
        let _: Value = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/leverage", &params)
            .await?;
        Ok(())
    }
}
