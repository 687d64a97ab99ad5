use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::booking::availability::AvailabilityIndex;
use crate::booking::catalog::{CatalogError, RoomCatalog, RoomInfo};
use crate::booking::domain::{
    Booking, BookingId, CancellationPolicy, HostelId, RoomId, UserId,
};
use crate::booking::notifications::{
    Notification, NotificationDispatcher, NotificationError, NotificationId,
    NotificationRepository,
};
use crate::booking::payment::{
    GatewayError, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentReceipt,
};
use crate::booking::repository::{BookingChange, BookingRepository, RepositoryError};
use crate::booking::service::{BookingService, ServiceConfig};

pub(super) type TestService =
    BookingService<MemoryBookingRepository, MemoryNotificationRepository, StubGateway, StaticCatalog>;

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn student() -> UserId {
    UserId("student-1".to_string())
}

pub(super) fn owner() -> UserId {
    UserId("owner-1".to_string())
}

pub(super) fn room() -> RoomId {
    RoomId("R-101".to_string())
}

pub(super) fn second_room() -> RoomId {
    RoomId("R-102".to_string())
}

pub(super) fn hostel() -> HostelId {
    HostelId("H-1".to_string())
}

pub(super) struct Fixture {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryBookingRepository>,
    pub(super) notifications: Arc<MemoryNotificationRepository>,
    pub(super) availability: Arc<AvailabilityIndex>,
    pub(super) gateway: Arc<StubGateway>,
}

pub(super) fn fixture(script: GatewayScript) -> Fixture {
    let repository = Arc::new(MemoryBookingRepository::default());
    let notifications = Arc::new(MemoryNotificationRepository::default());
    let availability = Arc::new(AvailabilityIndex::new());
    let gateway = Arc::new(StubGateway::new(script));
    let dispatcher = Arc::new(NotificationDispatcher::new(notifications.clone()));

    let service = Arc::new(BookingService::new(
        repository.clone(),
        dispatcher,
        gateway.clone(),
        Arc::new(StaticCatalog::standard()),
        availability.clone(),
        ServiceConfig::default(),
    ));

    Fixture {
        service,
        repository,
        notifications,
        availability,
        gateway,
    }
}

#[derive(Default)]
pub(super) struct MemoryBookingRepository {
    records: Mutex<HashMap<BookingId, Booking>>,
}

impl MemoryBookingRepository {
    /// Test hook: rewinds a booking's creation time for expiry scenarios.
    pub(super) fn backdate(&self, id: &BookingId, created_at: DateTime<Utc>) {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if let Some(record) = guard.get_mut(id) {
            record.created_at = created_at;
        }
    }
}

impl BookingRepository for MemoryBookingRepository {
    fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&booking.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    fn fetch(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn transition(
        &self,
        id: &BookingId,
        expected: crate::booking::domain::BookingStatus,
        change: BookingChange,
    ) -> Result<Booking, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if record.status != expected {
            return Err(RepositoryError::StaleStatus {
                expected,
                actual: record.status,
            });
        }
        change.apply(record);
        Ok(record.clone())
    }

    fn active_for_room(&self, room: &RoomId) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|b| b.room_id == *room && b.status.holds_room())
            .cloned()
            .collect())
    }

    fn for_student(&self, student: &UserId) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut bookings: Vec<Booking> = guard
            .values()
            .filter(|b| b.student_id == *student)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(bookings)
    }

    fn for_hostel(&self, hostel: &HostelId) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut bookings: Vec<Booking> = guard
            .values()
            .filter(|b| b.hostel_id == *hostel)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(bookings)
    }

    fn find_by_payment_intent(&self, intent: &str) -> Result<Option<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|b| b.payment_intent.as_deref() == Some(intent))
            .cloned())
    }

    fn payment_reference_in_use(&self, reference: &str) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .any(|b| b.payment_reference.as_deref() == Some(reference)))
    }

    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|b| {
                b.status == crate::booking::domain::BookingStatus::Pending
                    && b.created_at < cutoff
            })
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotificationRepository {
    records: Mutex<Vec<Notification>>,
}

impl MemoryNotificationRepository {
    pub(super) fn all(&self) -> Vec<Notification> {
        self.records
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationRepository for MemoryNotificationRepository {
    fn insert(&self, notification: Notification) -> Result<Notification, NotificationError> {
        let mut guard = self.records.lock().expect("notification mutex poisoned");
        guard.push(notification.clone());
        Ok(notification)
    }

    fn for_recipient(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationError> {
        let guard = self.records.lock().expect("notification mutex poisoned");
        Ok(guard
            .iter()
            .rev()
            .filter(|n| n.recipient == *recipient)
            .cloned()
            .collect())
    }

    fn mark_read(&self, id: &NotificationId) -> Result<(), NotificationError> {
        let mut guard = self.records.lock().expect("notification mutex poisoned");
        let record = guard
            .iter_mut()
            .find(|n| n.id == *id)
            .ok_or(NotificationError::NotFound)?;
        record.is_read = true;
        Ok(())
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<(), NotificationError> {
        let mut guard = self.records.lock().expect("notification mutex poisoned");
        for record in guard.iter_mut().filter(|n| n.recipient == *recipient) {
            record.is_read = true;
        }
        Ok(())
    }
}

/// Catalog fixture: one hostel ("H-1", owner-1) with two rooms and the
/// policy from the cancellation scenarios.
pub(super) struct StaticCatalog {
    rooms: HashMap<RoomId, RoomInfo>,
    owners: HashMap<HostelId, UserId>,
    policies: HashMap<HostelId, CancellationPolicy>,
}

impl StaticCatalog {
    pub(super) fn standard() -> Self {
        let mut rooms = HashMap::new();
        for id in [room(), second_room()] {
            rooms.insert(
                id.clone(),
                RoomInfo {
                    id,
                    hostel_id: hostel(),
                    owner_id: owner(),
                    price: 5000,
                },
            );
        }

        let mut owners = HashMap::new();
        owners.insert(hostel(), owner());

        let mut policies = HashMap::new();
        policies.insert(
            hostel(),
            CancellationPolicy {
                full_refund_days: 7,
                partial_refund_days: 3,
                partial_refund_percentage: 50,
            },
        );

        Self {
            rooms,
            owners,
            policies,
        }
    }
}

impl RoomCatalog for StaticCatalog {
    fn room(&self, id: &RoomId) -> Result<Option<RoomInfo>, CatalogError> {
        Ok(self.rooms.get(id).cloned())
    }

    fn hostel_owner(&self, hostel: &HostelId) -> Result<Option<UserId>, CatalogError> {
        Ok(self.owners.get(hostel).cloned())
    }

    fn cancellation_policy(&self, hostel: &HostelId) -> Result<CancellationPolicy, CatalogError> {
        self.policies
            .get(hostel)
            .copied()
            .ok_or_else(|| CatalogError::Unavailable(format!("no policy for {}", hostel.0)))
    }
}

/// Scripted gateway behavior; swappable mid-test.
#[derive(Debug, Clone)]
pub(super) enum GatewayScript {
    /// Settle every intent with a reference derived from it.
    Settle,
    /// Settle every intent with the same fixed reference.
    FixedReference(String),
    Decline,
    Timeout,
}

pub(super) struct StubGateway {
    script: Mutex<GatewayScript>,
}

impl StubGateway {
    pub(super) fn new(script: GatewayScript) -> Self {
        Self {
            script: Mutex::new(script),
        }
    }

    pub(super) fn set_script(&self, script: GatewayScript) {
        *self.script.lock().expect("gateway mutex poisoned") = script;
    }

    fn current(&self) -> GatewayScript {
        self.script.lock().expect("gateway mutex poisoned").clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initiate(
        &self,
        booking_id: &BookingId,
        _amount_paisa: u64,
    ) -> Result<PaymentIntent, GatewayError> {
        match self.current() {
            GatewayScript::Timeout => Err(GatewayError::Timeout),
            _ => Ok(PaymentIntent {
                intent_id: format!("pidx-{}", booking_id.0),
                redirect_url: format!("https://pay.example/{}", booking_id.0),
            }),
        }
    }

    async fn verify(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError> {
        match self.current() {
            GatewayScript::Settle => Ok(PaymentOutcome::Succeeded(PaymentReceipt {
                reference: format!("txn-{intent_id}"),
                amount_paisa: 500_000,
            })),
            GatewayScript::FixedReference(reference) => {
                Ok(PaymentOutcome::Succeeded(PaymentReceipt {
                    reference,
                    amount_paisa: 500_000,
                }))
            }
            GatewayScript::Decline => Ok(PaymentOutcome::Declined {
                reason: "insufficient balance".to_string(),
            }),
            GatewayScript::Timeout => Err(GatewayError::Timeout),
        }
    }
}
