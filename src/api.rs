//! REST and WebSocket router over an [`Exchange`].
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! State is shared through `Extension`, so the router is `Router<()>` and works with
//! `into_make_service()`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{EngineError, ExchangeError};
use crate::exchange::{Exchange, PlaceOrderRequest};
use crate::execution::Trade;
use crate::types::{AccountId, MarketId, OrderId, OrderType, Side};

/// Builds the router. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(exchange: Arc<Exchange>) -> Router<()> {
    Router::new()
        .route("/health", get(health))
        .route("/order", post(place_order))
        .route("/order/:id", get(orders_for_user).delete(cancel_order))
        .route("/book/:market", get(book))
        .route("/book/:market/bid", get(best_bid))
        .route("/book/:market/ask", get(best_ask))
        .route("/book/:market/spread", get(spread))
        .route("/trades/:market", get(trades))
        .route("/settlement", get(settlement))
        .route("/ws/market-data/:market", get(market_data_ws))
        .layer(Extension(exchange))
}

/// Error body: `{ "error": CODE, "message": text }`.
#[derive(Debug)]
pub struct ApiError(pub ExchangeError);

impl From<ExchangeError> for ApiError {
    fn from(e: ExchangeError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            ExchangeError::UnknownMarket(_) => (StatusCode::NOT_FOUND, "MARKET_NOT_FOUND"),
            ExchangeError::UnknownAccount(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
            ExchangeError::Engine(EngineError::NoLiquidity(_)) => {
                (StatusCode::NOT_FOUND, "NO_LIQUIDITY")
            }
            ExchangeError::Engine(EngineError::DuplicateOrder(_)) => {
                (StatusCode::CONFLICT, "DUPLICATE_ORDER")
            }
            ExchangeError::Engine(_) => (StatusCode::BAD_REQUEST, "INVALID_ORDER"),
        };
        debug!("request failed status={} code={} error={}", status, code, self.0);
        let body = Json(serde_json::json!({
            "error": code,
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(serde::Deserialize)]
struct PlaceOrderBody {
    user_id: u64,
    #[serde(rename = "type")]
    order_type: OrderType,
    side: Side,
    size: Decimal,
    #[serde(default)]
    price: Option<Decimal>,
    market: String,
}

async fn place_order(
    Extension(exchange): Extension<Arc<Exchange>>,
    Json(body): Json<PlaceOrderBody>,
) -> Result<Response, ApiError> {
    let request = PlaceOrderRequest {
        account_id: AccountId(body.user_id),
        order_type: body.order_type,
        side: body.side,
        size: body.size,
        price: body.price,
        market: MarketId::new(body.market),
    };
    let response = exchange.place_order(request).map_err(|e| {
        warn!("order rejected error={}", e);
        e
    })?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

async fn cancel_order(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(id): Path<u64>,
) -> Response {
    #[derive(serde::Serialize)]
    struct Out {
        canceled: bool,
    }
    let canceled = exchange.cancel_order(OrderId(id));
    (StatusCode::OK, Json(Out { canceled })).into_response()
}

async fn orders_for_user(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(user_id): Path<u64>,
) -> Result<Response, ApiError> {
    let orders = exchange.orders_for_account(AccountId(user_id))?;
    Ok((StatusCode::OK, Json(orders)).into_response())
}

async fn book(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(market): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = exchange.book_snapshot(&MarketId::new(market))?;
    Ok((StatusCode::OK, Json(snapshot)).into_response())
}

#[derive(serde::Serialize)]
struct PriceOut {
    price: Decimal,
}

async fn best_bid(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(market): Path<String>,
) -> Result<Response, ApiError> {
    let price = exchange.best_bid(&MarketId::new(market))?;
    Ok((StatusCode::OK, Json(PriceOut { price })).into_response())
}

async fn best_ask(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(market): Path<String>,
) -> Result<Response, ApiError> {
    let price = exchange.best_ask(&MarketId::new(market))?;
    Ok((StatusCode::OK, Json(PriceOut { price })).into_response())
}

async fn spread(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(market): Path<String>,
) -> Result<Response, ApiError> {
    #[derive(serde::Serialize)]
    struct Out {
        spread: Decimal,
    }
    let spread = exchange.spread(&MarketId::new(market))?;
    Ok((StatusCode::OK, Json(Out { spread })).into_response())
}

async fn trades(
    Extension(exchange): Extension<Arc<Exchange>>,
    Path(market): Path<String>,
) -> Result<Response, ApiError> {
    let trades = exchange.trades(&MarketId::new(market))?;
    Ok((StatusCode::OK, Json(trades)).into_response())
}

async fn settlement(Extension(exchange): Extension<Arc<Exchange>>) -> Response {
    (StatusCode::OK, Json(exchange.settlement_summary())).into_response()
}

/// Frames pushed on the market-data socket.
#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum MarketDataFrame {
    Snapshot {
        market: MarketId,
        best_bid: Option<Decimal>,
        best_ask: Option<Decimal>,
        bid_volume: Decimal,
        ask_volume: Decimal,
    },
    Trade {
        #[serde(flatten)]
        trade: Trade,
    },
}

async fn market_data_ws(
    ws: WebSocketUpgrade,
    Path(market): Path<String>,
    Extension(exchange): Extension<Arc<Exchange>>,
) -> Result<Response, ApiError> {
    let market = MarketId::new(market);
    // Reject unknown markets before upgrading.
    exchange.book_snapshot(&market)?;
    Ok(ws.on_upgrade(move |socket| stream_market_data(socket, exchange, market)))
}

async fn stream_market_data(mut socket: WebSocket, exchange: Arc<Exchange>, market: MarketId) {
    // Subscribe before the snapshot so no trade falls between the two.
    let mut feed = exchange.subscribe();
    let Ok(snapshot) = exchange.book_snapshot(&market) else {
        return;
    };
    let frame = MarketDataFrame::Snapshot {
        market: market.clone(),
        best_bid: snapshot.bids.first().map(|l| l.price),
        best_ask: snapshot.asks.first().map(|l| l.price),
        bid_volume: snapshot.bid_volume,
        ask_volume: snapshot.ask_volume,
    };
    if send_frame(&mut socket, &frame).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            received = feed.recv() => match received {
                Ok(trade) if trade.market == market => {
                    if send_frame(&mut socket, &MarketDataFrame::Trade { trade }).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("market data subscriber lagged market={} skipped={}", market, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("market data socket closed market={}", market);
}

/// Encodes a frame as a text message. An unencodable frame ends the stream.
fn frame_message(frame: &MarketDataFrame) -> Result<Message, axum::Error> {
    serde_json::to_string(frame).map(Message::Text).map_err(|e| {
        warn!("market data frame not serializable error={}", e);
        axum::Error::new(e)
    })
}

async fn send_frame(socket: &mut WebSocket, frame: &MarketDataFrame) -> Result<(), axum::Error> {
    socket.send(frame_message(frame)?).await
}
