use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, Level};

use bleibe::domain::booking::{Booking, BookingId};
use bleibe::domain::listing::ListingId;
use bleibe::domain::{Entity, UserId};
use bleibe::infrastructure::booking::EventStoreBookingRepository;
use bleibe::infrastructure::calendar::EventStoreCalendarRepository;
use bleibe::infrastructure::listing::EventStoreListingDirectory;
use bleibe::service::{BookingRequest, BookingService, ServiceError};
use bleibe::BleibeConfig;

type Service = BookingService<
    EventStoreBookingRepository,
    EventStoreCalendarRepository,
    EventStoreListingDirectory,
>;

/// Handlers clone the service per request; the repositories inside share
/// one `eventstore::Client`, so nothing serializes behind a lock.
#[derive(Clone)]
struct AppState {
    service: Service,
}

#[tokio::main]
async fn main() {
    match BleibeConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = serve(&config).await {
                error!("application error: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("application error: {}", error)
        }
    }
}

async fn serve(config: &BleibeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config.eventstore.url.parse::<eventstore::ClientSettings>()?;
    let client = eventstore::Client::new(settings)?;
    let service = BookingService::new(
        EventStoreBookingRepository::new(client.clone()),
        EventStoreCalendarRepository::new(client.clone()),
        EventStoreListingDirectory::new(client),
    );
    let state = AppState { service };
    let app = Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/confirm", post(confirm_booking))
        .route("/bookings/:id/reject", post(reject_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .with_state(state);
    let addr: SocketAddr = config.server.listen.parse()?;
    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

#[derive(Deserialize)]
struct CreateBookingBody {
    listing_id: u64,
    check_in: NaiveDate,
    check_out: NaiveDate,
    stayers: u32,
}

#[derive(Deserialize, Default)]
struct RejectBody {
    #[serde(default)]
    reason: String,
}

#[derive(Serialize)]
struct HistoryEntry {
    status: String,
    comment: String,
    changed_by: Option<u64>,
    changed_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BookingBody {
    id: u64,
    listing_id: u64,
    check_in: NaiveDate,
    check_out: NaiveDate,
    stayers: u32,
    total_price: String,
    book_status: String,
    nights_to_stay: u32,
    cancelation: bool,
    status_history: Vec<HistoryEntry>,
    created_at: DateTime<Utc>,
}

impl From<&Booking> for BookingBody {
    fn from(booking: &Booking) -> Self {
        BookingBody {
            id: *booking.id(),
            listing_id: *booking.listing_id(),
            check_in: booking.check_in(),
            check_out: booking.check_out(),
            stayers: booking.stayers(),
            total_price: booking.total_price().to_string(),
            book_status: booking.status().to_string(),
            nights_to_stay: booking.nights_to_stay(),
            cancelation: booking.cancelation(Utc::now().date_naive()),
            status_history: booking
                .history()
                .iter()
                .map(|record| HistoryEntry {
                    status: record.status.to_string(),
                    comment: record.comment.clone(),
                    changed_by: record.changed_by.map(|u| *u),
                    changed_at: record.changed_at,
                })
                .collect(),
            created_at: booking.created_at(),
        }
    }
}

/// The authentication layer in front of this service resolves the JWT and
/// forwards the caller's id in `x-user-id`.
fn actor(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(UserId::from)
        .ok_or(ApiError::Unauthorized)
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingBody>,
) -> Result<Response, ApiError> {
    let tenant = actor(&headers)?;
    let mut service = state.service.clone();
    let booking = service
        .create_booking(
            tenant,
            BookingRequest {
                listing_id: ListingId::from(body.listing_id),
                check_in: body.check_in,
                check_out: body.check_out,
                stayers: body.stayers,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(BookingBody::from(&booking))).into_response())
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let booking = state.service.booking(BookingId::from(id)).await?;
    Ok(Json(BookingBody::from(&booking)).into_response())
}

async fn confirm_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let owner = actor(&headers)?;
    let mut service = state.service.clone();
    let booking = service.confirm_booking(BookingId::from(id), owner).await?;
    Ok(Json(BookingBody::from(&booking)).into_response())
}

async fn reject_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Option<Json<RejectBody>>,
) -> Result<Response, ApiError> {
    let owner = actor(&headers)?;
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let mut service = state.service.clone();
    let booking = service
        .reject_booking(BookingId::from(id), owner, reason)
        .await?;
    Ok(Json(BookingBody::from(&booking)).into_response())
}

async fn cancel_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let tenant = actor(&headers)?;
    let mut service = state.service.clone();
    let booking = service.cancel_booking(BookingId::from(id), tenant).await?;
    Ok(Json(BookingBody::from(&booking)).into_response())
}

enum ApiError {
    Unauthorized,
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        ApiError::Service(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Missing or invalid x-user-id header" }),
            ),
            ApiError::Service(e) => match &e {
                ServiceError::Validation { field, .. } => (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": e.to_string(), "field": field }),
                ),
                ServiceError::Conflict { conflicting, .. } => (
                    StatusCode::CONFLICT,
                    json!({
                        "error": e.to_string(),
                        "conflicting_booking": (*conflicting).map(|id| *id),
                    }),
                ),
                ServiceError::Forbidden { .. } => {
                    (StatusCode::FORBIDDEN, json!({ "error": e.to_string() }))
                }
                ServiceError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, json!({ "error": e.to_string() }))
                }
                ServiceError::DataAccess(_) => {
                    error!("data access failure: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "Internal error" }),
                    )
                }
            },
        };
        (status, Json(body)).into_response()
    }
}
