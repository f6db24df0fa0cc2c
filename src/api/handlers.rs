use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::counters::{
    Aggregator, Amount, DimensionFilter, EventRecorder, RecordOutcome, RecordSummary, TimeWindow,
    TrackedEvent,
};
use crate::error::CounterError;
use crate::visitor::{Visitor, VisitorSigner};

/// 1x1 transparent GIF
const TRANSPARENT_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub struct AppState {
    pub recorder: EventRecorder,
    pub aggregator: Aggregator,
    pub signer: VisitorSigner,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ConversionRequest {
    pub goal_id: i64,
    pub timestamp: Option<i64>,
    pub value: Option<Amount>,
}

#[derive(Debug, Deserialize)]
pub struct ImpressionRequest {
    pub variant_id: i64,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VariantConversionRequest {
    pub variant_id: i64,
    pub goal_id: i64,
    pub timestamp: Option<i64>,
    pub value: Option<Amount>,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub visitor_id: String,
    #[serde(flatten)]
    pub outcome: RecordSummary,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub goal_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl StatsQuery {
    fn filter(&self) -> DimensionFilter {
        DimensionFilter {
            goal_id: self.goal_id,
            variant_id: self.variant_id,
        }
    }

    fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TotalValueResponse {
    pub total_value: Amount,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: CounterError) -> ApiError {
    let status = match &err {
        CounterError::InvalidGranularity(_)
        | CounterError::InvalidTimestamp(_)
        | CounterError::InvalidAmount(_)
        | CounterError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        CounterError::UnsupportedQuery { .. } => StatusCode::NOT_IMPLEMENTED,
        CounterError::Overflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CounterError::StorageUnavailable(_) | CounterError::PartialFailure { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::debug!(error = %err, "rejected request");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Attach the signed visitor cookie when the visitor was minted for this request
fn with_visitor_cookie(signer: &VisitorSigner, visitor: &Visitor, mut response: Response) -> Response {
    if !visitor.fresh {
        return response;
    }

    match signer
        .set_cookie(&visitor.id)
        .map_err(|e| e.to_string())
        .and_then(|cookie| HeaderValue::from_str(&cookie).map_err(|e| e.to_string()))
    {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "failed to set visitor cookie"),
    }
    response
}

fn resolve_visitor(state: &AppState, headers: &HeaderMap) -> Visitor {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok());
    state.signer.resolve(cookie_header)
}

async fn record_event(state: &AppState, headers: &HeaderMap, event: TrackedEvent) -> Response {
    let visitor = resolve_visitor(state, headers);

    let response = match state.recorder.record(event).await {
        Ok(outcome) => outcome_response(&visitor, outcome),
        Err(e) => error_response(e).into_response(),
    };

    with_visitor_cookie(&state.signer, &visitor, response)
}

fn outcome_response(visitor: &Visitor, outcome: RecordOutcome) -> Response {
    if outcome.applied.is_empty() {
        // Nothing was counted at any granularity
        return match outcome.into_result() {
            Err(e) => error_response(e).into_response(),
            Ok(_) => StatusCode::ACCEPTED.into_response(),
        };
    }

    if !outcome.is_complete() {
        tracing::warn!(
            visitor_id = %visitor.id,
            failed = outcome.failed.len(),
            "event only partially recorded"
        );
    }

    (
        StatusCode::ACCEPTED,
        Json(RecordResponse {
            visitor_id: visitor.id.clone(),
            outcome: outcome.summary(),
        }),
    )
        .into_response()
}

/// Record a goal conversion
pub async fn record_conversion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ConversionRequest>,
) -> Response {
    let event = TrackedEvent::Conversion {
        goal_id: payload.goal_id,
        timestamp: payload.timestamp.unwrap_or_else(now),
        value: payload.value,
    };
    record_event(&state, &headers, event).await
}

/// Record a variant impression
pub async fn record_impression(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ImpressionRequest>,
) -> Response {
    let event = TrackedEvent::Impression {
        variant_id: payload.variant_id,
        timestamp: payload.timestamp.unwrap_or_else(now),
    };
    record_event(&state, &headers, event).await
}

/// Record a goal conversion attributed to a variant
pub async fn record_variant_conversion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<VariantConversionRequest>,
) -> Response {
    let event = TrackedEvent::VariantConversion {
        variant_id: payload.variant_id,
        goal_id: payload.goal_id,
        timestamp: payload.timestamp.unwrap_or_else(now),
        value: payload.value,
    };
    record_event(&state, &headers, event).await
}

/// Count events matching the query's dimension filters
pub async fn get_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state
        .aggregator
        .count(&query.filter(), &query.window())
        .await
        .map_err(error_response)?;

    Ok(Json(CountResponse { count }))
}

/// Sum conversion values matching the query's dimension filters
pub async fn get_total_value(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TotalValueResponse>, ApiError> {
    let total_value = state
        .aggregator
        .total_value(&query.filter(), &query.window())
        .await
        .map_err(error_response)?;

    Ok(Json(TotalValueResponse { total_value }))
}

/// Tracking pixel: identifies the visitor and returns a transparent GIF
pub async fn tracking_pixel(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let visitor = resolve_visitor(&state, &headers);
    tracing::debug!(visitor_id = %visitor.id, fresh = visitor.fresh, "tracking pixel hit");

    let response = (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        TRANSPARENT_PIXEL,
    )
        .into_response();

    with_visitor_cookie(&state.signer, &visitor, response)
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
