use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::catalog::RoomCatalog;
use super::domain::{Booking, BookingId, HostelId, RefundOutcome, RoomId, UserId};
use super::notifications::{NotificationError, NotificationId, NotificationRepository};
use super::payment::PaymentGateway;
use super::repository::BookingRepository;
use super::service::{BookingError, BookingService};

/// Router builder exposing the booking lifecycle over HTTP. Identity arrives
/// as plain parameters, resolved by the caller at the API boundary.
pub fn booking_router<R, N, G, C>(service: Arc<BookingService<R, N, G, C>>) -> Router
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    Router::new()
        .route("/api/v1/bookings", post(create_handler::<R, N, G, C>))
        .route("/api/v1/bookings/:booking_id", get(fetch_handler::<R, N, G, C>))
        .route(
            "/api/v1/bookings/:booking_id/approve",
            post(approve_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/bookings/:booking_id/reject",
            post(reject_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/bookings/:booking_id/cancel",
            post(cancel_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/bookings/:booking_id/payment",
            post(initiate_payment_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/payments/verify",
            post(verify_payment_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/students/:student_id/bookings",
            get(student_bookings_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/hostels/:hostel_id/bookings",
            get(hostel_bookings_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/hostels/:hostel_id/dashboard",
            get(dashboard_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/notifications/:recipient_id",
            get(list_notifications_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            patch(mark_read_handler::<R, N, G, C>),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(mark_all_read_handler::<R, N, G, C>),
        )
        .with_state(service)
}

/// Sanitized representation of a booking for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub room_id: RoomId,
    pub hostel_id: HostelId,
    pub student_id: UserId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_outcome: Option<RefundOutcome>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            room_id: booking.room_id,
            hostel_id: booking.hostel_id,
            student_id: booking.student_id,
            check_in: booking.stay.check_in(),
            check_out: booking.stay.check_out(),
            status: booking.status.label(),
            created_at: booking.created_at,
            approved_at: booking.approved_at,
            payment_reference: booking.payment_reference,
            cancelled_at: booking.cancelled_at,
            refund_outcome: booking.refund_outcome,
        }
    }
}

fn error_response(err: BookingError) -> Response {
    let status = match &err {
        BookingError::RoomUnavailable | BookingError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        BookingError::Unauthorized => StatusCode::FORBIDDEN,
        BookingError::NotFound => StatusCode::NOT_FOUND,
        BookingError::PaymentVerificationFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        BookingError::ExternalGatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        BookingError::InvalidStay(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::GatewayProtocol(_)
        | BookingError::Repository(_)
        | BookingError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = axum::Json(json!({ "error": err.to_string() }));
    (status, body).into_response()
}

fn notification_error_response(err: NotificationError) -> Response {
    let status = match &err {
        NotificationError::NotFound => StatusCode::NOT_FOUND,
        NotificationError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = axum::Json(json!({ "error": err.to_string() }));
    (status, body).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateBookingRequest {
    pub(crate) student_id: String,
    pub(crate) room_id: String,
    pub(crate) check_in: NaiveDate,
    pub(crate) check_out: NaiveDate,
}

pub(crate) async fn create_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    axum::Json(request): axum::Json<CreateBookingRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    let result = service.create_booking(
        &UserId(request.student_id),
        &RoomId(request.room_id),
        request.check_in,
        request.check_out,
    );
    match result {
        Ok(booking) => {
            (StatusCode::CREATED, axum::Json(BookingView::from(booking))).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn fetch_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.booking(&BookingId(booking_id)) {
        Ok(booking) => (StatusCode::OK, axum::Json(BookingView::from(booking))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerActionRequest {
    pub(crate) owner_id: String,
}

pub(crate) async fn approve_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(booking_id): Path<String>,
    axum::Json(request): axum::Json<OwnerActionRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.approve(&UserId(request.owner_id), &BookingId(booking_id)) {
        Ok(booking) => (StatusCode::OK, axum::Json(BookingView::from(booking))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(booking_id): Path<String>,
    axum::Json(request): axum::Json<OwnerActionRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.reject(&UserId(request.owner_id), &BookingId(booking_id)) {
        Ok(booking) => (StatusCode::OK, axum::Json(BookingView::from(booking))).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelBookingRequest {
    pub(crate) actor_id: String,
    /// Evaluation date override for the refund policy; defaults to today.
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) async fn cancel_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(booking_id): Path<String>,
    axum::Json(request): axum::Json<CancelBookingRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    let today = request.today.unwrap_or_else(|| Local::now().date_naive());
    match service.cancel(&UserId(request.actor_id), &BookingId(booking_id), today) {
        Ok(receipt) => {
            let body = json!({
                "booking": BookingView::from(receipt.booking),
                "refund": receipt.refund,
            });
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitiatePaymentRequest {
    pub(crate) student_id: String,
}

pub(crate) async fn initiate_payment_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(booking_id): Path<String>,
    axum::Json(request): axum::Json<InitiatePaymentRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service
        .initiate_payment(&UserId(request.student_id), &BookingId(booking_id))
        .await
    {
        Ok(intent) => (StatusCode::ACCEPTED, axum::Json(intent)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyPaymentRequest {
    pub(crate) payment_intent_id: String,
}

pub(crate) async fn verify_payment_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    axum::Json(request): axum::Json<VerifyPaymentRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.verify_payment(&request.payment_intent_id).await {
        Ok(booking) => (StatusCode::OK, axum::Json(BookingView::from(booking))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn student_bookings_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(student_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.bookings_for_student(&UserId(student_id)) {
        Ok(bookings) => {
            let views: Vec<BookingView> = bookings.into_iter().map(BookingView::from).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerQuery {
    pub(crate) owner_id: String,
}

pub(crate) async fn hostel_bookings_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(hostel_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.bookings_for_hostel(&UserId(query.owner_id), &HostelId(hostel_id)) {
        Ok(bookings) => {
            let views: Vec<BookingView> = bookings.into_iter().map(BookingView::from).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn dashboard_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(hostel_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.dashboard(&UserId(query.owner_id), &HostelId(hostel_id)) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_notifications_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(recipient_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service.notifications().list(&UserId(recipient_id)) {
        Ok(notifications) => (StatusCode::OK, axum::Json(notifications)).into_response(),
        Err(err) => notification_error_response(err),
    }
}

pub(crate) async fn mark_read_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    Path(notification_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service
        .notifications()
        .mark_read(&NotificationId(notification_id))
    {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(json!({ "message": "notification marked as read" })),
        )
            .into_response(),
        Err(err) => notification_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkAllReadRequest {
    pub(crate) recipient_id: String,
}

pub(crate) async fn mark_all_read_handler<R, N, G, C>(
    State(service): State<Arc<BookingService<R, N, G, C>>>,
    axum::Json(request): axum::Json<MarkAllReadRequest>,
) -> Response
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    match service
        .notifications()
        .mark_all_read(&UserId(request.recipient_id))
    {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(json!({ "message": "all notifications marked as read" })),
        )
            .into_response(),
        Err(err) => notification_error_response(err),
    }
}
