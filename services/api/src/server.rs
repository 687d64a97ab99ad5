use crate::cli::ServeArgs;
use crate::infra::{
    AppState, FileBookingRepository, FileNotificationRepository, SeededRoomCatalog,
};
use crate::routes::with_booking_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hostel_booking::booking::service::BookingError;
use hostel_booking::booking::{
    AvailabilityIndex, BookingRepository, BookingService, KhaltiGateway, NotificationDispatcher,
    NotificationRepository, PaymentGateway, RetryPolicy, RetryingGateway, RoomCatalog,
    ServiceConfig,
};
use hostel_booking::config::AppConfig;
use hostel_booking::error::AppError;
use hostel_booking::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (repository, notifications, catalog) = match &config.engine.data_dir {
        Some(dir) => (
            Arc::new(FileBookingRepository::open(dir)?),
            Arc::new(FileNotificationRepository::open(dir)?),
            Arc::new(SeededRoomCatalog::open(dir)?),
        ),
        None => (
            Arc::new(FileBookingRepository::in_memory()),
            Arc::new(FileNotificationRepository::in_memory()),
            Arc::new(SeededRoomCatalog::demo()),
        ),
    };

    // Re-derive the reservation set from the store before accepting traffic.
    let availability = Arc::new(AvailabilityIndex::new());
    availability.rebuild(
        repository
            .all()
            .map_err(|err| AppError::Booking(BookingError::Repository(err)))?,
    );

    let khalti = KhaltiGateway::new(&config.payment)
        .map_err(|err| AppError::Booking(BookingError::GatewayProtocol(err.to_string())))?;
    let gateway = Arc::new(RetryingGateway::new(
        khalti,
        RetryPolicy {
            max_attempts: config.payment.max_attempts,
            ..RetryPolicy::default()
        },
    ));

    let dispatcher = Arc::new(NotificationDispatcher::with_sequence(
        notifications.clone(),
        notifications.next_sequence(),
    ));
    let service = Arc::new(BookingService::new(
        repository.clone(),
        dispatcher,
        gateway,
        catalog,
        availability.clone(),
        ServiceConfig {
            pending_expiry_hours: config.engine.pending_expiry_hours,
            next_booking_sequence: repository.next_sequence(),
        },
    ));

    spawn_expiry_sweep(service.clone());

    let app = with_booking_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        active_reservations = availability.active_count(),
        "hostel booking engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Background sweep expiring Pending bookings that outlived the payment
/// window. Runs every 15 minutes; failures are logged and retried on the
/// next tick.
fn spawn_expiry_sweep<R, N, G, C>(service: Arc<BookingService<R, N, G, C>>)
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(15 * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.expire_overdue(Utc::now()) {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "expired overdue pending bookings");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "expiry sweep failed"),
            }
        }
    });
}
