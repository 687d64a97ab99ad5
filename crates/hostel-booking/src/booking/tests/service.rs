use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};

use super::common::{
    date, fixture, hostel, owner, room, second_room, student, GatewayScript,
};
use crate::booking::domain::{BookingStatus, RefundOutcome, UserId};
use crate::booking::repository::BookingRepository;
use crate::booking::service::BookingError;

#[test]
fn create_booking_enters_pending_and_notifies_owner() {
    let fx = fixture(GatewayScript::Settle);

    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    assert_eq!(booking.status, BookingStatus::Pending);
    assert!(fx.availability.holds(&booking.id));

    let inbox = fx.notifications.all();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].recipient, owner());
    assert!(inbox[0].message.contains(&booking.id.0));
}

#[test]
fn inverted_stay_range_is_rejected_up_front() {
    let fx = fixture(GatewayScript::Settle);

    match fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 7), date(2024, 6, 5))
    {
        Err(BookingError::InvalidStay(_)) => {}
        other => panic!("expected invalid stay range, got {other:?}"),
    }
    assert!(fx.notifications.all().is_empty());
}

#[test]
fn concurrent_overlapping_requests_admit_exactly_one() {
    let fx = fixture(GatewayScript::Settle);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [
        (date(2024, 6, 5), date(2024, 6, 7)),
        (date(2024, 6, 6), date(2024, 6, 8)),
    ]
    .into_iter()
    .map(|(check_in, check_out)| {
        let service = fx.service.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            service.create_booking(&student(), &room(), check_in, check_out)
        })
    })
    .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread completes"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one request may win");
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(BookingError::RoomUnavailable))));
}

#[tokio::test]
async fn rejected_booking_cannot_be_confirmed_by_late_payment() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    let intent = fx
        .service
        .initiate_payment(&student(), &booking.id)
        .await
        .expect("pending booking accepts payment");

    fx.service
        .reject(&owner(), &booking.id)
        .expect("owner rejects pending booking");

    // The delayed payment callback loses the race.
    match fx.service.verify_payment(&intent.intent_id).await {
        Err(BookingError::InvalidTransition { actual }) => {
            assert_eq!(actual, BookingStatus::Rejected)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let stored = fx.service.booking(&booking.id).expect("still on record");
    assert_eq!(stored.status, BookingStatus::Rejected);
    assert!(stored.payment_reference.is_none());
    assert!(!fx.availability.holds(&booking.id));
}

#[tokio::test]
async fn verify_payment_is_idempotent() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");
    let intent = fx
        .service
        .initiate_payment(&student(), &booking.id)
        .await
        .expect("payment initiates");

    let confirmed = fx
        .service
        .verify_payment(&intent.intent_id)
        .await
        .expect("first verification confirms");
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(confirmed.payment_reference.is_some());

    match fx.service.verify_payment(&intent.intent_id).await {
        Err(BookingError::InvalidTransition { actual }) => {
            assert_eq!(actual, BookingStatus::Confirmed)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[tokio::test]
async fn declined_payment_leaves_booking_pending_and_retryable() {
    let fx = fixture(GatewayScript::Decline);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");
    let intent = fx
        .service
        .initiate_payment(&student(), &booking.id)
        .await
        .expect("payment initiates");

    match fx.service.verify_payment(&intent.intent_id).await {
        Err(BookingError::PaymentVerificationFailed { .. }) => {}
        other => panic!("expected verification failure, got {other:?}"),
    }
    assert_eq!(
        fx.service.booking(&booking.id).expect("present").status,
        BookingStatus::Pending
    );

    // The student retries once the provider cooperates.
    fx.gateway.set_script(GatewayScript::Settle);
    let retry_intent = fx
        .service
        .initiate_payment(&student(), &booking.id)
        .await
        .expect("retry initiates");
    let confirmed = fx
        .service
        .verify_payment(&retry_intent.intent_id)
        .await
        .expect("retry confirms");
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn gateway_timeout_surfaces_as_typed_error() {
    let fx = fixture(GatewayScript::Timeout);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    match fx.service.initiate_payment(&student(), &booking.id).await {
        Err(BookingError::ExternalGatewayTimeout) => {}
        other => panic!("expected gateway timeout, got {other:?}"),
    }
    assert_eq!(
        fx.service.booking(&booking.id).expect("present").status,
        BookingStatus::Pending
    );
}

#[tokio::test]
async fn payment_reference_cannot_confirm_two_bookings() {
    let fx = fixture(GatewayScript::FixedReference("txn-dup".to_string()));
    let first = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("first room free");
    let second = fx
        .service
        .create_booking(&student(), &second_room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("second room free");

    let first_intent = fx
        .service
        .initiate_payment(&student(), &first.id)
        .await
        .expect("first initiates");
    let second_intent = fx
        .service
        .initiate_payment(&student(), &second.id)
        .await
        .expect("second initiates");

    fx.service
        .verify_payment(&first_intent.intent_id)
        .await
        .expect("first confirms");

    match fx.service.verify_payment(&second_intent.intent_id).await {
        Err(BookingError::PaymentVerificationFailed { reason }) => {
            assert!(reason.contains("consumed"))
        }
        other => panic!("expected consumed-reference failure, got {other:?}"),
    }
}

#[test]
fn approval_records_but_does_not_confirm() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    let approved = fx
        .service
        .approve(&owner(), &booking.id)
        .expect("owner approves");
    assert_eq!(approved.status, BookingStatus::Pending);
    assert!(approved.approved_at.is_some());

    match fx.service.approve(&owner(), &booking.id) {
        Err(BookingError::InvalidTransition { .. }) => {}
        other => panic!("expected invalid transition on double approve, got {other:?}"),
    }

    let inbox = fx.notifications.all();
    assert!(inbox
        .iter()
        .any(|n| n.recipient == student() && n.message.contains("approved")));
}

#[test]
fn only_the_owning_owner_may_review() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    let impostor = UserId("owner-2".to_string());
    assert!(matches!(
        fx.service.approve(&impostor, &booking.id),
        Err(BookingError::Unauthorized)
    ));
    assert!(matches!(
        fx.service.reject(&impostor, &booking.id),
        Err(BookingError::Unauthorized)
    ));
}

#[tokio::test]
async fn cancelling_confirmed_booking_records_refund_and_frees_room() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 15), date(2024, 6, 17))
        .expect("room starts free");
    let intent = fx
        .service
        .initiate_payment(&student(), &booking.id)
        .await
        .expect("payment initiates");
    fx.service
        .verify_payment(&intent.intent_id)
        .await
        .expect("payment confirms");

    // Ten days before check-in: full refund tier.
    let receipt = fx
        .service
        .cancel(&student(), &booking.id, date(2024, 6, 5))
        .expect("confirmed booking cancels");
    assert_eq!(receipt.refund, Some(RefundOutcome::Full));

    let stored = fx.service.booking(&booking.id).expect("retained for audit");
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.refund_outcome, Some(RefundOutcome::Full));
    assert!(stored.cancelled_at.is_some());

    // The range opens up again.
    fx.service
        .create_booking(&student(), &room(), date(2024, 6, 15), date(2024, 6, 17))
        .expect("released range is bookable");
}

#[test]
fn student_withdraws_pending_booking_without_refund_outcome() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    let receipt = fx
        .service
        .cancel(&student(), &booking.id, date(2024, 6, 1))
        .expect("student withdraws");
    assert_eq!(receipt.refund, None);
    assert_eq!(receipt.booking.status, BookingStatus::Cancelled);
    assert!(!fx.availability.holds(&booking.id));

    // Terminal: cancelling again is refused.
    match fx.service.cancel(&student(), &booking.id, date(2024, 6, 1)) {
        Err(BookingError::InvalidTransition { actual }) => {
            assert_eq!(actual, BookingStatus::Cancelled)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn owner_must_use_reject_for_pending_bookings() {
    let fx = fixture(GatewayScript::Settle);
    let booking = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");

    assert!(matches!(
        fx.service.cancel(&owner(), &booking.id, date(2024, 6, 1)),
        Err(BookingError::Unauthorized)
    ));
}

#[test]
fn expiry_sweep_expires_only_stale_pending_bookings() {
    let fx = fixture(GatewayScript::Settle);
    let stale = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");
    let fresh = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 10), date(2024, 6, 12))
        .expect("disjoint range");

    fx.repository
        .backdate(&stale.id, Utc::now() - Duration::hours(72));

    let expired = fx.service.expire_overdue(Utc::now()).expect("sweep runs");
    assert_eq!(expired, vec![stale.id.clone()]);

    assert_eq!(
        fx.service.booking(&stale.id).expect("retained").status,
        BookingStatus::Expired
    );
    assert_eq!(
        fx.service.booking(&fresh.id).expect("retained").status,
        BookingStatus::Pending
    );
    assert!(!fx.availability.holds(&stale.id));
    assert!(fx.availability.holds(&fresh.id));
}

#[test]
fn hostel_listing_and_dashboard_require_the_owner() {
    let fx = fixture(GatewayScript::Settle);
    fx.service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");
    fx.service
        .create_booking(&student(), &second_room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("second room free");

    let bookings = fx
        .service
        .bookings_for_hostel(&owner(), &hostel())
        .expect("owner lists bookings");
    assert_eq!(bookings.len(), 2);

    let summary = fx
        .service
        .dashboard(&owner(), &hostel())
        .expect("owner dashboard");
    assert_eq!(summary.total, 2);
    assert_eq!(summary.pending, 2);

    assert!(matches!(
        fx.service
            .bookings_for_hostel(&UserId("owner-2".to_string()), &hostel()),
        Err(BookingError::Unauthorized)
    ));
}

#[test]
fn student_history_lists_all_outcomes() {
    let fx = fixture(GatewayScript::Settle);
    let first = fx
        .service
        .create_booking(&student(), &room(), date(2024, 6, 5), date(2024, 6, 7))
        .expect("room starts free");
    fx.service
        .create_booking(&student(), &room(), date(2024, 6, 10), date(2024, 6, 12))
        .expect("disjoint range");
    fx.service.reject(&owner(), &first.id).expect("owner rejects");

    let history = fx
        .service
        .bookings_for_student(&student())
        .expect("history lists");
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .any(|b| b.status == BookingStatus::Rejected));

    // No overlap among room-holding bookings, rejected one excluded.
    let active = fx
        .repository
        .active_for_room(&room())
        .expect("active listing");
    for (i, a) in active.iter().enumerate() {
        for b in active.iter().skip(i + 1) {
            assert!(!a.stay.overlaps(&b.stay), "active bookings must not overlap");
        }
    }
}
