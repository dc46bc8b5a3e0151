//! HTTP surface: JSON API over axum, plus the payment webhook and a
//! per-property SSE change feed.
//!
//! Responses share one envelope: `success` plus either the payload fields
//! or a `message`. Field names are camelCase on the wire.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{MatchedPath, Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use ulid::Ulid;

use crate::engine::{BookingRequest, Engine, EngineError, NewProperty, PropertyEdit};
use crate::mailer::Mailer;
use crate::model::*;
use crate::payment::{verify_webhook_signature, PaymentGateway};

pub const SIGNATURE_HEADER: &str = "x-veranda-signature";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    /// When set, webhook deliveries must carry a valid HMAC signature.
    pub webhook_secret: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/availability", post(check_availability))
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/recent", get(recent_bookings))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
        .route("/api/payments/webhook", post(payment_webhook))
        .route("/api/properties", get(list_properties).post(create_property))
        .route(
            "/api/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/api/properties/slug/:slug", get(get_property_by_slug))
        .route("/api/properties/:id/bookings", get(property_bookings))
        .route("/api/properties/:id/events", get(property_events))
        .route("/api/users/:id/bookings", get(user_bookings))
        .layer(axum::middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn track_requests(req: Request<axum::body::Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(req).await;
    metrics::counter!(
        crate::observability::HTTP_REQUESTS_TOTAL,
        "route" => route,
        "status" => response.status().as_u16().to_string(),
    )
    .increment(1);
    response
}

// ── Error envelope ───────────────────────────────────────────────

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::PropertyNotFound(_) | EngineError::BookingNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::CapacityExceeded { .. } | EngineError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            EngineError::GuestLimitExceeded { .. }
            | EngineError::InvalidStay(_)
            | EngineError::InvalidField(_)
            | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            EngineError::PaymentError(_) => StatusCode::BAD_GATEWAY,
            EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &e {
            EngineError::PropertyNotFound(_) => "Property not found".to_string(),
            EngineError::BookingNotFound(_) => "Booking not found".to_string(),
            // Storage and provider details stay in the logs.
            EngineError::WalError(detail) => {
                tracing::error!("storage error: {detail}");
                "Booking failed".to_string()
            }
            EngineError::PaymentError(detail) => {
                tracing::error!("payment provider error: {detail}");
                "Booking failed".to_string()
            }
            other => other.to_string(),
        };
        Self { status, message }
    }
}

// ── Wire types ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityBody {
    property_id: Ulid,
    check_in: NaiveDate,
    check_out: NaiveDate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityResponse {
    success: bool,
    available_rooms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_available_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuestBody {
    name: String,
    email: String,
    phone: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingBody {
    property_id: Ulid,
    user_id: Option<Ulid>,
    check_in: NaiveDate,
    check_out: NaiveDate,
    adults: u32,
    #[serde(default)]
    children: u32,
    rooms: u32,
    guest: GuestBody,
    #[serde(default)]
    notes: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingResponse {
    success: bool,
    booking_id: Ulid,
    order_id: String,
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody {
    booking_id: Ulid,
    order_id: String,
    payment_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyBody {
    name: String,
    price: u64,
    #[serde(default)]
    discount: u8,
    max_rooms: u32,
    max_guests: u32,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PropertyEditBody {
    name: Option<String>,
    price: Option<u64>,
    discount: Option<u8>,
    max_rooms: Option<u32>,
    max_guests: Option<u32>,
    location: Option<String>,
    description: Option<String>,
    available: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PropertyView {
    id: Ulid,
    name: String,
    slug: String,
    price: u64,
    discount: u8,
    max_rooms: u32,
    max_guests: u32,
    location: String,
    description: String,
    available: bool,
    created_at: Ms,
}

impl From<Property> for PropertyView {
    fn from(p: Property) -> Self {
        Self {
            id: p.id,
            name: p.name,
            slug: p.slug,
            price: p.price,
            discount: p.discount,
            max_rooms: p.max_rooms,
            max_guests: p.max_guests,
            location: p.location,
            description: p.description,
            available: p.available,
            created_at: p.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingRowView {
    id: Ulid,
    property_id: Ulid,
    property_name: String,
    guest_name: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    status: String,
    total_price: u64,
    payment_id: String,
    created_at: Ms,
}

impl From<BookingRow> for BookingRowView {
    fn from(r: BookingRow) -> Self {
        Self {
            id: r.id,
            property_id: r.property_id,
            property_name: r.property_name,
            guest_name: r.guest_name,
            check_in: r.stay.check_in,
            check_out: r.stay.check_out,
            status: r.status.to_string(),
            total_price: r.total_price,
            payment_id: r.payment_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<usize>,
}

// ── Handlers ─────────────────────────────────────────────────────

async fn check_availability(
    State(state): State<AppState>,
    Json(body): Json<AvailabilityBody>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let report = state
        .engine
        .check_availability(body.property_id, StayRange::new(body.check_in, body.check_out))
        .await?;
    Ok(Json(AvailabilityResponse {
        success: true,
        available_rooms: report.available_rooms,
        next_available_date: report.next_available_date,
    }))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(body): Json<BookingBody>,
) -> Result<Json<BookingResponse>, ApiError> {
    let receipt = state
        .engine
        .book(
            state.gateway.as_ref(),
            BookingRequest {
                property_id: body.property_id,
                user_id: body.user_id,
                stay: StayRange::new(body.check_in, body.check_out),
                capacity: Capacity {
                    adults: body.adults,
                    children: body.children,
                    rooms: body.rooms,
                },
                guest: GuestContact {
                    name: body.guest.name,
                    email: body.guest.email,
                    phone: body.guest.phone,
                },
                notes: body.notes,
            },
        )
        .await?;
    Ok(Json(BookingResponse {
        success: true,
        booking_id: receipt.booking_id,
        order_id: receipt.order_id,
        key: receipt.key,
    }))
}

/// Payment provider callback. Verified against the raw body before the JSON
/// is parsed, so a tampered payload never reaches the engine.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_webhook_signature(secret, &body, signature) {
            metrics::counter!(crate::observability::WEBHOOKS_REJECTED_TOTAL).increment(1);
            tracing::warn!("webhook rejected: bad signature");
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid signature"));
        }
    }

    let payload: WebhookBody = serde_json::from_slice(&body).map_err(|_| {
        metrics::counter!(crate::observability::WEBHOOKS_REJECTED_TOTAL).increment(1);
        ApiError::bad_request("Invalid webhook payload")
    })?;

    let booking = state
        .engine
        .confirm_payment(payload.booking_id, &payload.order_id, &payload.payment_id)
        .await?;

    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        mailer.send_confirmation(&booking).await;
    });

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let booking = state.engine.cancel_booking(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "bookingId": booking.id.to_string(),
        "status": booking.status.to_string(),
    })))
}

async fn create_property(
    State(state): State<AppState>,
    Json(body): Json<PropertyBody>,
) -> Result<(StatusCode, Json<PropertyView>), ApiError> {
    let property = state
        .engine
        .create_property(NewProperty {
            name: body.name,
            price: body.price,
            discount: body.discount,
            max_rooms: body.max_rooms,
            max_guests: body.max_guests,
            location: body.location,
            description: body.description,
            available: body.available,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(property.into())))
}

async fn list_properties(State(state): State<AppState>) -> Json<Vec<PropertyView>> {
    let properties = state.engine.list_properties().await;
    Json(properties.into_iter().map(Into::into).collect())
}

async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<PropertyView>, ApiError> {
    let property = state
        .engine
        .property_by_id(id)
        .await
        .ok_or_else(|| ApiError::not_found("Property not found"))?;
    Ok(Json(property.into()))
}

async fn get_property_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PropertyView>, ApiError> {
    let property = state
        .engine
        .property_by_slug(&slug)
        .await
        .ok_or_else(|| ApiError::not_found("Property not found"))?;
    Ok(Json(property.into()))
}

async fn update_property(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<PropertyEditBody>,
) -> Result<Json<PropertyView>, ApiError> {
    let property = state
        .engine
        .update_property(
            id,
            PropertyEdit {
                name: body.name,
                price: body.price,
                discount: body.discount,
                max_rooms: body.max_rooms,
                max_guests: body.max_guests,
                location: body.location,
                description: body.description,
                available: body.available,
            },
        )
        .await?;
    Ok(Json(property.into()))
}

async fn delete_property(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.engine.delete_property(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn property_bookings(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<Vec<BookingRowView>>, ApiError> {
    let rows = state.engine.bookings_for_property(id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

async fn user_bookings(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Json<Vec<BookingRowView>> {
    let rows = state.engine.bookings_for_user(id).await;
    Json(rows.into_iter().map(Into::into).collect())
}

async fn recent_bookings(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Json<Vec<BookingRowView>> {
    let limit = params.limit.unwrap_or(20).min(500);
    let rows = state.engine.recent_bookings(limit).await;
    Json(rows.into_iter().map(Into::into).collect())
}

/// Live change feed for one property. Each ledger or inventory event is sent
/// as one SSE `change` event with the JSON-encoded record. Subscribers that
/// fall behind the broadcast buffer miss the lagged events and keep going.
async fn property_events(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>>, ApiError> {
    if state.engine.property_by_id(id).await.is_none() {
        return Err(ApiError::not_found("Property not found"));
    }
    let rx = state.engine.notify.subscribe(id);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = match serde_json::to_string(&event) {
                        Ok(data) => data,
                        Err(_) => continue,
                    };
                    return Some((Ok(SseEvent::default().event("change").data(data)), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
