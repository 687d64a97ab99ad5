use chrono::{DateTime, Utc};

use super::domain::{
    Booking, BookingId, BookingStatus, HostelId, RefundOutcome, RoomId, UserId,
};

/// Field updates applied together with a status compare-and-set. `None`
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct BookingChange {
    pub status: Option<BookingStatus>,
    pub approved_at: Option<DateTime<Utc>>,
    pub payment_intent: Option<String>,
    pub payment_reference: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refund_outcome: Option<RefundOutcome>,
}

impl BookingChange {
    pub fn to_status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn approved_at(mut self, at: DateTime<Utc>) -> Self {
        self.approved_at = Some(at);
        self
    }

    pub fn payment_intent(mut self, intent: impl Into<String>) -> Self {
        self.payment_intent = Some(intent.into());
        self
    }

    pub fn payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }

    pub fn cancelled_at(mut self, at: DateTime<Utc>) -> Self {
        self.cancelled_at = Some(at);
        self
    }

    pub fn refund_outcome(mut self, outcome: RefundOutcome) -> Self {
        self.refund_outcome = Some(outcome);
        self
    }

    /// Applies the change to a booking snapshot. Used by stores after the
    /// expected-status check passes.
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(at) = self.approved_at {
            booking.approved_at = Some(at);
        }
        if let Some(intent) = &self.payment_intent {
            booking.payment_intent = Some(intent.clone());
        }
        if let Some(reference) = &self.payment_reference {
            booking.payment_reference = Some(reference.clone());
        }
        if let Some(at) = self.cancelled_at {
            booking.cancelled_at = Some(at);
        }
        if let Some(outcome) = self.refund_outcome {
            booking.refund_outcome = Some(outcome);
        }
    }
}

/// Storage abstraction for bookings.
///
/// `transition` is the serialization point for the whole state machine: the
/// store must check the expected status and apply the change atomically, so
/// a payment verification racing an owner rejection is decided by whichever
/// commits first. The loser observes [`RepositoryError::StaleStatus`].
pub trait BookingRepository: Send + Sync {
    fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError>;
    fn fetch(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError>;

    /// Compare-and-set: applies `change` iff the stored status equals
    /// `expected`, returning the updated booking.
    fn transition(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        change: BookingChange,
    ) -> Result<Booking, RepositoryError>;

    /// Bookings in a room-holding status (Pending/Confirmed) for one room.
    fn active_for_room(&self, room: &RoomId) -> Result<Vec<Booking>, RepositoryError>;
    fn for_student(&self, student: &UserId) -> Result<Vec<Booking>, RepositoryError>;
    fn for_hostel(&self, hostel: &HostelId) -> Result<Vec<Booking>, RepositoryError>;
    fn find_by_payment_intent(&self, intent: &str) -> Result<Option<Booking>, RepositoryError>;

    /// Whether any booking already carries this provider reference; guards
    /// against one receipt confirming two bookings.
    fn payment_reference_in_use(&self, reference: &str) -> Result<bool, RepositoryError>;

    /// Pending bookings created before the cutoff, for the expiry sweep.
    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError>;

    /// All bookings, used to rebuild the availability index at startup.
    fn all(&self) -> Result<Vec<Booking>, RepositoryError>;
}

/// Error enumeration for booking storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("booking is {actual}, expected {expected}")]
    StaleStatus {
        expected: BookingStatus,
        actual: BookingStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
