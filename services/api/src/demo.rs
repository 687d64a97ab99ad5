use crate::infra::{FileBookingRepository, FileNotificationRepository, SeededRoomCatalog};
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use std::sync::Arc;

use hostel_booking::booking::{
    AvailabilityIndex, BookingError, BookingId, BookingService, GatewayError,
    NotificationDispatcher, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentReceipt,
    RoomId, ServiceConfig, UserId,
};
use hostel_booking::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Check-in date (YYYY-MM-DD). Defaults to a week from today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) check_in: Option<NaiveDate>,
    /// Check-out date (YYYY-MM-DD). Defaults to check-in + 5 days.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) check_out: Option<NaiveDate>,
}

/// Gateway stand-in for offline demos: every intent settles on first verify.
struct SettlingGateway;

#[async_trait]
impl PaymentGateway for SettlingGateway {
    async fn initiate(
        &self,
        booking_id: &BookingId,
        amount_paisa: u64,
    ) -> Result<PaymentIntent, GatewayError> {
        Ok(PaymentIntent {
            intent_id: format!("pidx-{}", booking_id.0),
            redirect_url: format!(
                "https://pay.example/checkout/{}?amount={amount_paisa}",
                booking_id.0
            ),
        })
    }

    async fn verify(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError> {
        Ok(PaymentOutcome::Succeeded(PaymentReceipt {
            reference: format!("txn-{intent_id}"),
            amount_paisa: 0,
        }))
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = Local::now().date_naive();
    let check_in = args.check_in.unwrap_or(today + Duration::days(7));
    let check_out = args.check_out.unwrap_or(check_in + Duration::days(5));

    let repository = Arc::new(FileBookingRepository::in_memory());
    let notifications = Arc::new(FileNotificationRepository::in_memory());
    let dispatcher = Arc::new(NotificationDispatcher::new(notifications.clone()));
    let service = Arc::new(BookingService::new(
        repository,
        dispatcher,
        Arc::new(SettlingGateway),
        Arc::new(SeededRoomCatalog::demo()),
        Arc::new(AvailabilityIndex::new()),
        ServiceConfig::default(),
    ));

    let student = UserId("student-1".to_string());
    let rival = UserId("student-2".to_string());
    let owner = UserId("owner-1".to_string());
    let room = RoomId("R-101".to_string());

    println!("Hostel booking lifecycle demo");
    println!("  stay: {check_in} to {check_out} in room {}", room.0);

    let booking = service
        .create_booking(&student, &room, check_in, check_out)
        .map_err(AppError::Booking)?;
    println!("\n1. {} requests the room -> booking {} ({})", student.0, booking.id, booking.status);

    match service.create_booking(&rival, &room, check_in, check_out) {
        Err(BookingError::RoomUnavailable) => {
            println!("2. {} tries the same dates -> refused, room already held", rival.0);
        }
        other => {
            println!("2. unexpected outcome for the rival request: {other:?}");
        }
    }

    let approved = service
        .approve(&owner, &booking.id)
        .map_err(AppError::Booking)?;
    println!("3. {} approves -> still {} until payment lands", owner.0, approved.status);

    let intent = service
        .initiate_payment(&student, &booking.id)
        .await
        .map_err(AppError::Booking)?;
    println!("4. payment initiated -> redirect {}", intent.redirect_url);

    let confirmed = service
        .verify_payment(&intent.intent_id)
        .await
        .map_err(AppError::Booking)?;
    println!(
        "5. provider settles {} -> booking {}",
        intent.intent_id, confirmed.status
    );

    let receipt = service
        .cancel(&student, &booking.id, today)
        .map_err(AppError::Booking)?;
    match receipt.refund {
        Some(outcome) => println!(
            "6. {} cancels {} days out -> {}% refund",
            student.0,
            (check_in - today).num_days(),
            outcome.percentage()
        ),
        None => println!("6. {} withdraws before payment -> no refund due", student.0),
    }

    let summary = service
        .dashboard(&owner, &confirmed.hostel_id)
        .map_err(AppError::Booking)?;
    println!(
        "\nDashboard for {}: {} total, {} pending, {} confirmed, {} cancelled",
        confirmed.hostel_id.0, summary.total, summary.pending, summary.confirmed, summary.cancelled
    );

    println!("\nInbox for {}:", owner.0);
    match service.notifications().list(&owner) {
        Ok(inbox) => {
            for notification in inbox {
                println!("  - {}", notification.message);
            }
        }
        Err(err) => println!("  (inbox unavailable: {err})"),
    }

    Ok(())
}
