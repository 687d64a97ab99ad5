use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use super::availability::AvailabilityIndex;
use super::catalog::{CatalogError, RoomCatalog, RoomInfo};
use super::domain::{
    ActorRole, Booking, BookingEvent, BookingId, BookingStatus, HostelId, InvalidStayRange,
    RefundOutcome, RoomId, StayRange, UserId,
};
use super::notifications::{NotificationDispatcher, NotificationRepository};
use super::payment::{GatewayError, PaymentGateway, PaymentIntent, PaymentOutcome};
use super::policy::evaluate_refund;
use super::repository::{BookingChange, BookingRepository, RepositoryError};

/// Error raised by the booking state machine.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("room is unavailable for the requested dates")]
    RoomUnavailable,
    #[error("booking is {actual}; the requested transition is not permitted")]
    InvalidTransition { actual: BookingStatus },
    #[error("actor is not a party to this booking")]
    Unauthorized,
    #[error("payment verification failed: {reason}")]
    PaymentVerificationFailed { reason: String },
    #[error("payment gateway timed out")]
    ExternalGatewayTimeout,
    #[error("payment gateway error: {0}")]
    GatewayProtocol(String),
    #[error("booking or room not found")]
    NotFound,
    #[error(transparent)]
    InvalidStay(#[from] InvalidStayRange),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Outcome of a cancellation. `refund` is `None` when no payment had been
/// taken (cancelling a Pending booking has nothing to refund).
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationReceipt {
    pub booking: Booking,
    pub refund: Option<RefundOutcome>,
}

/// Booking counts by status for one hostel's owner dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub expired: usize,
}

/// Engine tunables supplied by the host application.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Pending bookings unpaid for longer than this window are swept.
    pub pending_expiry_hours: i64,
    /// First value of the booking id sequence; seeded from the store so
    /// restarts of a durable deployment do not collide.
    pub next_booking_sequence: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pending_expiry_hours: 48,
            next_booking_sequence: 1,
        }
    }
}

/// The booking state machine.
///
/// Owns every `Booking` mutation. Creation reserves through the
/// [`AvailabilityIndex`] before anything is stored; every later transition is
/// a compare-and-set on the stored status, so concurrent attempts (a payment
/// callback racing an owner rejection, two cancellations, a double verify)
/// are serialized by the store and the loser fails with `InvalidTransition`
/// and no side effects.
pub struct BookingService<R, N, G, C> {
    repository: Arc<R>,
    notifications: Arc<NotificationDispatcher<N>>,
    gateway: Arc<G>,
    catalog: Arc<C>,
    availability: Arc<AvailabilityIndex>,
    pending_expiry: Duration,
    sequence: AtomicU64,
}

impl<R, N, G, C> BookingService<R, N, G, C>
where
    R: BookingRepository + 'static,
    N: NotificationRepository + 'static,
    G: PaymentGateway + 'static,
    C: RoomCatalog + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<NotificationDispatcher<N>>,
        gateway: Arc<G>,
        catalog: Arc<C>,
        availability: Arc<AvailabilityIndex>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            repository,
            notifications,
            gateway,
            catalog,
            availability,
            pending_expiry: Duration::hours(config.pending_expiry_hours),
            sequence: AtomicU64::new(config.next_booking_sequence.max(1)),
        }
    }

    fn next_booking_id(&self) -> BookingId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        BookingId(format!("bkg-{id:06}"))
    }

    fn room(&self, room_id: &RoomId) -> Result<RoomInfo, BookingError> {
        self.catalog.room(room_id)?.ok_or(BookingError::NotFound)
    }

    fn must_fetch(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.repository
            .fetch(id)
            .map_err(BookingError::Repository)?
            .ok_or(BookingError::NotFound)
    }

    fn commit(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        change: BookingChange,
    ) -> Result<Booking, BookingError> {
        self.repository
            .transition(id, expected, change)
            .map_err(|err| match err {
                RepositoryError::NotFound => BookingError::NotFound,
                RepositoryError::StaleStatus { actual, .. } => {
                    BookingError::InvalidTransition { actual }
                }
                other => BookingError::Repository(other),
            })
    }

    /// Notifications are best-effort records of an already-committed
    /// transition; a storage hiccup here must not report the transition as
    /// failed.
    fn notify(&self, event: &BookingEvent) {
        if let Err(err) = self.notifications.dispatch(event) {
            tracing::warn!(error = %err, "failed to record lifecycle notification");
        }
    }

    /// Student requests a room: reserve-or-reject, then insert as Pending.
    pub fn create_booking(
        &self,
        student: &UserId,
        room_id: &RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Booking, BookingError> {
        let stay = StayRange::new(check_in, check_out)?;
        let room = self.room(room_id)?;
        let id = self.next_booking_id();

        self.availability
            .reserve_if_available(room_id, &id, stay)
            .map_err(|_| BookingError::RoomUnavailable)?;

        let booking = Booking {
            id: id.clone(),
            room_id: room.id.clone(),
            hostel_id: room.hostel_id.clone(),
            student_id: student.clone(),
            stay,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            payment_intent: None,
            payment_reference: None,
            cancelled_at: None,
            refund_outcome: None,
        };

        let stored = match self.repository.insert(booking) {
            Ok(stored) => stored,
            Err(err) => {
                // Reservation must not outlive a failed insert.
                self.availability.release(&id);
                return Err(BookingError::Repository(err));
            }
        };

        info!(booking = %stored.id, room = %room_id.0, "booking requested");
        self.notify(&BookingEvent::Created {
            booking: stored.clone(),
            owner_id: room.owner_id,
        });
        Ok(stored)
    }

    /// Owner approval. Approval alone never confirms: the booking stays
    /// Pending until payment verification. Approving twice is an invalid
    /// transition.
    pub fn approve(&self, owner: &UserId, id: &BookingId) -> Result<Booking, BookingError> {
        let booking = self.must_fetch(id)?;
        let room = self.room(&booking.room_id)?;
        if room.owner_id != *owner {
            return Err(BookingError::Unauthorized);
        }
        if booking.approved_at.is_some() {
            return Err(BookingError::InvalidTransition {
                actual: booking.status,
            });
        }

        let change = BookingChange::default().approved_at(Utc::now());
        let updated = self.commit(id, BookingStatus::Pending, change)?;

        info!(booking = %updated.id, "booking approved by owner");
        self.notify(&BookingEvent::Approved {
            booking: updated.clone(),
        });
        Ok(updated)
    }

    /// Owner rejection: Pending -> Rejected, reservation released.
    pub fn reject(&self, owner: &UserId, id: &BookingId) -> Result<Booking, BookingError> {
        let booking = self.must_fetch(id)?;
        let room = self.room(&booking.room_id)?;
        if room.owner_id != *owner {
            return Err(BookingError::Unauthorized);
        }

        let updated = self.commit(
            id,
            BookingStatus::Pending,
            BookingChange::to_status(BookingStatus::Rejected),
        )?;
        self.availability.release(id);

        info!(booking = %updated.id, "booking rejected by owner");
        self.notify(&BookingEvent::Rejected {
            booking: updated.clone(),
        });
        Ok(updated)
    }

    /// Student starts a payment attempt for a Pending booking. The intent is
    /// recorded on the booking; a later attempt (after a declined
    /// verification) replaces it.
    pub async fn initiate_payment(
        &self,
        student: &UserId,
        id: &BookingId,
    ) -> Result<PaymentIntent, BookingError> {
        let booking = self.must_fetch(id)?;
        if booking.student_id != *student {
            return Err(BookingError::Unauthorized);
        }
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidTransition {
                actual: booking.status,
            });
        }
        let room = self.room(&booking.room_id)?;
        let amount_paisa = u64::from(room.price) * 100;

        let intent = self
            .gateway
            .initiate(id, amount_paisa)
            .await
            .map_err(map_gateway)?;

        self.commit(
            id,
            BookingStatus::Pending,
            BookingChange::default().payment_intent(intent.intent_id.clone()),
        )?;

        info!(booking = %id, intent = %intent.intent_id, "payment initiated");
        Ok(intent)
    }

    /// Payment-verification callback. Confirms the booking iff the provider
    /// settled the intent, the receipt's reference is unconsumed, the
    /// reservation is still held, and the status CAS from Pending wins. A
    /// second verify of the same intent observes Confirmed and fails with
    /// `InvalidTransition`; so does a verify that lost the race against an
    /// owner rejection.
    pub async fn verify_payment(&self, intent_id: &str) -> Result<Booking, BookingError> {
        let booking = self
            .repository
            .find_by_payment_intent(intent_id)
            .map_err(BookingError::Repository)?
            .ok_or(BookingError::NotFound)?;

        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidTransition {
                actual: booking.status,
            });
        }

        match self.gateway.verify(intent_id).await.map_err(map_gateway)? {
            PaymentOutcome::Declined { reason } => {
                // Booking stays Pending; the student may initiate again.
                Err(BookingError::PaymentVerificationFailed { reason })
            }
            PaymentOutcome::Succeeded(receipt) => {
                if self
                    .repository
                    .payment_reference_in_use(&receipt.reference)
                    .map_err(BookingError::Repository)?
                {
                    return Err(BookingError::PaymentVerificationFailed {
                        reason: "payment reference already consumed".to_string(),
                    });
                }
                if !self.availability.holds(&booking.id) {
                    return Err(BookingError::RoomUnavailable);
                }

                let updated = self.commit(
                    &booking.id,
                    BookingStatus::Pending,
                    BookingChange::to_status(BookingStatus::Confirmed)
                        .payment_reference(receipt.reference),
                )?;

                info!(booking = %updated.id, "booking confirmed by payment");
                self.notify(&BookingEvent::Confirmed {
                    booking: updated.clone(),
                });
                Ok(updated)
            }
        }
    }

    /// Cancellation by either party. Pending bookings may only be withdrawn
    /// by the requesting student (the owner's path is `reject`); Confirmed
    /// bookings may be cancelled by either side and carry a policy-evaluated
    /// refund outcome, recorded on the booking for audit.
    pub fn cancel(
        &self,
        actor_id: &UserId,
        id: &BookingId,
        today: NaiveDate,
    ) -> Result<CancellationReceipt, BookingError> {
        let booking = self.must_fetch(id)?;
        let room = self.room(&booking.room_id)?;

        let role = if booking.student_id == *actor_id {
            ActorRole::Student
        } else if room.owner_id == *actor_id {
            ActorRole::HostelOwner
        } else {
            return Err(BookingError::Unauthorized);
        };

        match booking.status {
            BookingStatus::Pending => {
                if role != ActorRole::Student {
                    return Err(BookingError::Unauthorized);
                }
                let updated = self.commit(
                    id,
                    BookingStatus::Pending,
                    BookingChange::to_status(BookingStatus::Cancelled).cancelled_at(Utc::now()),
                )?;
                self.availability.release(id);

                info!(booking = %updated.id, "pending booking withdrawn");
                self.notify(&BookingEvent::Cancelled {
                    booking: updated.clone(),
                    owner_id: room.owner_id,
                    cancelled_by: role,
                    refund: None,
                });
                Ok(CancellationReceipt {
                    booking: updated,
                    refund: None,
                })
            }
            BookingStatus::Confirmed => {
                let policy = self.catalog.cancellation_policy(&booking.hostel_id)?;
                let outcome = evaluate_refund(booking.stay.check_in(), today, &policy);

                let updated = self.commit(
                    id,
                    BookingStatus::Confirmed,
                    BookingChange::to_status(BookingStatus::Cancelled)
                        .cancelled_at(Utc::now())
                        .refund_outcome(outcome),
                )?;
                self.availability.release(id);

                info!(
                    booking = %updated.id,
                    refund = outcome.percentage(),
                    "confirmed booking cancelled"
                );
                self.notify(&BookingEvent::Cancelled {
                    booking: updated.clone(),
                    owner_id: room.owner_id,
                    cancelled_by: role,
                    refund: Some(outcome),
                });
                Ok(CancellationReceipt {
                    booking: updated,
                    refund: Some(outcome),
                })
            }
            other => Err(BookingError::InvalidTransition { actual: other }),
        }
    }

    /// Expires one Pending booking; same CAS guard as every transition. No
    /// notification is produced for expiry.
    pub fn expire(&self, id: &BookingId) -> Result<Booking, BookingError> {
        let updated = self.commit(
            id,
            BookingStatus::Pending,
            BookingChange::to_status(BookingStatus::Expired),
        )?;
        self.availability.release(id);
        info!(booking = %updated.id, "pending booking expired");
        Ok(updated)
    }

    /// Sweep entry point driven by an external scheduler: expires every
    /// Pending booking older than the configured window. Bookings that
    /// transition concurrently are skipped, not errors.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<BookingId>, BookingError> {
        let cutoff = now - self.pending_expiry;
        let stale = self
            .repository
            .pending_created_before(cutoff)
            .map_err(BookingError::Repository)?;

        let mut expired = Vec::new();
        for booking in stale {
            match self.expire(&booking.id) {
                Ok(_) => expired.push(booking.id),
                Err(BookingError::InvalidTransition { .. }) | Err(BookingError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(expired)
    }

    pub fn booking(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.must_fetch(id)
    }

    pub fn bookings_for_student(&self, student: &UserId) -> Result<Vec<Booking>, BookingError> {
        self.repository
            .for_student(student)
            .map_err(BookingError::Repository)
    }

    /// Owner's view of a hostel's bookings; the caller must be the hostel's
    /// owner per the catalog.
    pub fn bookings_for_hostel(
        &self,
        owner: &UserId,
        hostel: &HostelId,
    ) -> Result<Vec<Booking>, BookingError> {
        let hostel_owner = self
            .catalog
            .hostel_owner(hostel)?
            .ok_or(BookingError::NotFound)?;
        if hostel_owner != *owner {
            return Err(BookingError::Unauthorized);
        }
        self.repository
            .for_hostel(hostel)
            .map_err(BookingError::Repository)
    }

    pub fn dashboard(
        &self,
        owner: &UserId,
        hostel: &HostelId,
    ) -> Result<DashboardSummary, BookingError> {
        let bookings = self.bookings_for_hostel(owner, hostel)?;
        let mut summary = DashboardSummary {
            total: bookings.len(),
            ..DashboardSummary::default()
        };
        for booking in &bookings {
            match booking.status {
                BookingStatus::Pending => summary.pending += 1,
                BookingStatus::Confirmed => summary.confirmed += 1,
                BookingStatus::Rejected => summary.rejected += 1,
                BookingStatus::Cancelled => summary.cancelled += 1,
                BookingStatus::Expired => summary.expired += 1,
            }
        }
        Ok(summary)
    }

    pub fn notifications(&self) -> &NotificationDispatcher<N> {
        self.notifications.as_ref()
    }
}

fn map_gateway(err: GatewayError) -> BookingError {
    match err {
        GatewayError::Timeout => BookingError::ExternalGatewayTimeout,
        GatewayError::Protocol(message) => BookingError::GatewayProtocol(message),
    }
}
