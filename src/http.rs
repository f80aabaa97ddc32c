use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use ulid::Ulid;

use crate::engine::{Engine, EngineError, ErrorKind};
use crate::model::*;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Build the JSON API over `engine`, with allow-any CORS.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/facilities", post(create_facility).get(list_facilities))
        .route("/facilities/search", get(search_facilities))
        .route("/facilities/:id", get(get_facility).delete(delete_facility))
        .route("/facilities/:id/available_windows", get(available_windows))
        .route("/services", post(create_service).get(list_services))
        .route("/services/search", get(search_services))
        .route("/services/:id", axum::routing::delete(delete_service))
        .route("/clients", post(register_client))
        .route("/clients/:id", get(get_client))
        .route("/reservations", post(create_reservation))
        .route(
            "/reservations/:id",
            get(get_reservation).patch(update_reservation_state),
        )
        .route("/reservations/by_facility/:id", get(reservations_by_facility))
        .route("/reservations/by_client/:id", get(reservations_by_client))
        .route("/feedback", post(create_feedback))
        // GET takes a facility id, DELETE a feedback id.
        .route("/feedback/:id", get(feedback_for_facility).delete(delete_feedback))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(cors)
        .with_state(AppState { engine })
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().to_string();

    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();

    metrics::counter!(
        observability::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        observability::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());
    response
}

// ── Errors ───────────────────────────────────────────────────────

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl From<TimeOfDayError> for ApiError {
    fn from(e: TimeOfDayError) -> Self {
        ApiError(e.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(EngineError::invalid(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(EngineError::invalid(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(EngineError::invalid(rejection.body_text()))
    }
}

/// `Json` extractor whose rejections become `ApiError`s.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Wire types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FacilityBody {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    pub opening: String,
    pub closing: String,
    pub windows: u32,
    #[serde(default)]
    pub rating: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacilityView {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening: String,
    pub closing: String,
    pub windows: u32,
    pub rating: i32,
}

impl From<Facility> for FacilityView {
    fn from(f: Facility) -> Self {
        Self {
            id: f.id,
            name: f.name,
            address: f.address,
            latitude: f.latitude,
            longitude: f.longitude,
            opening: format_time_of_day(f.opening),
            closing: format_time_of_day(f.closing),
            windows: f.windows,
            rating: f.rating,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceBody {
    pub facility_id: Ulid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration: Minute,
}

#[derive(Debug, Deserialize)]
pub struct ClientBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReservationBody {
    pub facility_id: Ulid,
    pub service_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub start: String,
    pub end: String,
    pub window: u32,
    pub state: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReservationView {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub service_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub start: String,
    pub end: String,
    pub window: u32,
    pub state: u8,
}

impl From<Reservation> for ReservationView {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            facility_id: r.facility_id,
            service_id: r.service_id,
            client_id: r.client_id,
            date: r.date,
            start: format_time_of_day(r.span.start),
            end: format_time_of_day(r.span.end),
            window: r.window,
            state: r.state.code(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StateBody {
    pub state: u8,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub client_id: Ulid,
    pub facility_id: Ulid,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotView {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowView {
    pub window: u32,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityView {
    pub facility_id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub duration: Minute,
    pub windows: Vec<WindowView>,
}

impl From<Availability> for AvailabilityView {
    fn from(a: Availability) -> Self {
        let windows = a
            .windows
            .into_iter()
            .map(|(window, spans)| WindowView {
                window,
                slots: spans
                    .into_iter()
                    .map(|s| SlotView {
                        start: format_time_of_day(s.start),
                        end: format_time_of_day(s.end),
                    })
                    .collect(),
            })
            .collect();
        Self {
            facility_id: a.facility_id,
            service_id: a.service_id,
            date: a.date,
            duration: a.duration,
            windows,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub service_id: Ulid,
}

// ── Handlers ─────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn create_facility(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<FacilityBody>,
) -> ApiResult<(StatusCode, Json<FacilityView>)> {
    info!("POST /facilities - name: {:?}", body.name);
    let new = NewFacility {
        opening: parse_time_of_day(&body.opening)?,
        closing: parse_time_of_day(&body.closing)?,
        name: body.name,
        address: body.address,
        latitude: body.latitude,
        longitude: body.longitude,
        windows: body.windows,
        rating: body.rating,
    };
    let facility = state.engine.create_facility(new).await?;
    Ok((StatusCode::CREATED, Json(facility.into())))
}

async fn list_facilities(State(state): State<AppState>) -> Json<Vec<FacilityView>> {
    let facilities = state.engine.list_facilities().await;
    Json(facilities.into_iter().map(Into::into).collect())
}

async fn search_facilities(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<Json<Vec<FacilityView>>> {
    let found = state.engine.search_facilities(&query.name).await?;
    Ok(Json(found.into_iter().map(Into::into).collect()))
}

async fn get_facility(
    State(state): State<AppState>,
    PathParam(id): PathParam<Ulid>,
) -> ApiResult<Json<FacilityView>> {
    Ok(Json(state.engine.get_facility(id).await?.into()))
}

async fn delete_facility(State(state): State<AppState>, PathParam(id): PathParam<Ulid>) -> ApiResult<StatusCode> {
    info!("DELETE /facilities/{id}");
    state.engine.delete_facility(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn available_windows(
    State(state): State<AppState>,
    PathParam(id): PathParam<Ulid>,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityView>> {
    let availability = state
        .engine
        .available_windows(id, query.date, query.service_id)
        .await?;
    Ok(Json(availability.into()))
}

async fn create_service(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ServiceBody>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    info!("POST /services - facility: {}", body.facility_id);
    let service = state
        .engine
        .create_service(NewService {
            facility_id: body.facility_id,
            name: body.name,
            description: body.description,
            duration: body.duration,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn list_services(State(state): State<AppState>) -> Json<Vec<Service>> {
    Json(state.engine.list_services())
}

async fn search_services(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.engine.search_services(&query.name)?))
}

async fn delete_service(State(state): State<AppState>, PathParam(id): PathParam<Ulid>) -> ApiResult<StatusCode> {
    info!("DELETE /services/{id}");
    state.engine.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_client(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ClientBody>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let client = state.engine.register_client(body.name).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn get_client(State(state): State<AppState>, PathParam(id): PathParam<Ulid>) -> ApiResult<Json<Client>> {
    Ok(Json(state.engine.get_client(id)?))
}

async fn create_reservation(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ReservationBody>,
) -> ApiResult<(StatusCode, Json<ReservationView>)> {
    info!(
        "POST /reservations - facility: {} date: {} {}-{} window: {}",
        body.facility_id, body.date, body.start, body.end, body.window
    );
    let new = NewReservation {
        facility_id: body.facility_id,
        service_id: body.service_id,
        client_id: body.client_id,
        date: body.date,
        start: parse_time_of_day(&body.start)?,
        end: parse_time_of_day(&body.end)?,
        window: body.window,
        state: body.state.map(ReservationState).unwrap_or_default(),
    };
    let reservation = state.engine.create_reservation(new).await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

async fn get_reservation(
    State(state): State<AppState>,
    PathParam(id): PathParam<Ulid>,
) -> ApiResult<Json<ReservationView>> {
    Ok(Json(state.engine.get_reservation(id).await?.into()))
}

async fn update_reservation_state(
    State(state): State<AppState>,
    PathParam(id): PathParam<Ulid>,
    JsonBody(body): JsonBody<StateBody>,
) -> ApiResult<Json<ReservationView>> {
    info!("PATCH /reservations/{id} - state: {}", body.state);
    let updated = state
        .engine
        .update_reservation_state(id, ReservationState(body.state))
        .await?;
    Ok(Json(updated.into()))
}

async fn reservations_by_facility(
    State(state): State<AppState>,
    PathParam(id): PathParam<Ulid>,
    QueryParams(query): QueryParams<DateQuery>,
) -> Json<Vec<ReservationView>> {
    let found = state.engine.reservations_by_facility(id, query.date).await;
    Json(found.into_iter().map(Into::into).collect())
}

async fn reservations_by_client(
    State(state): State<AppState>,
    PathParam(id): PathParam<Ulid>,
) -> Json<Vec<ReservationView>> {
    let found = state.engine.reservations_by_client(id).await;
    Json(found.into_iter().map(Into::into).collect())
}

async fn create_feedback(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<FeedbackBody>,
) -> ApiResult<(StatusCode, Json<Feedback>)> {
    info!("POST /feedback - facility: {}", body.facility_id);
    let feedback = state
        .engine
        .create_feedback(NewFeedback {
            client_id: body.client_id,
            facility_id: body.facility_id,
            comment: body.comment,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn feedback_for_facility(
    State(state): State<AppState>,
    PathParam(facility_id): PathParam<Ulid>,
) -> Json<Vec<Feedback>> {
    Json(state.engine.feedback_for_facility(facility_id))
}

async fn delete_feedback(State(state): State<AppState>, PathParam(id): PathParam<Ulid>) -> ApiResult<StatusCode> {
    info!("DELETE /feedback/{id}");
    state.engine.delete_feedback(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::StoreFailure),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn time_of_day_errors_are_bad_requests() {
        let err: ApiError = TimeOfDayError::SubMinute("10:30:15".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn availability_view_lists_windows_in_order() {
        let availability = Availability {
            facility_id: Ulid::nil(),
            service_id: Ulid::nil(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            duration: 30,
            windows: [(2, vec![]), (1, vec![Span::new(480, 600)])].into(),
        };
        let view = AvailabilityView::from(availability);
        assert_eq!(view.windows[0].window, 1);
        assert_eq!(
            view.windows[0].slots,
            vec![SlotView {
                start: "08:00".into(),
                end: "10:00".into()
            }]
        );
        assert!(view.windows[1].slots.is_empty());
    }
}
