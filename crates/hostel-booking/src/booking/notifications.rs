use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorRole, BookingEvent, UserId};

/// Identifier wrapper for notification records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// Per-user notification record; lifecycle independent of the booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Storage abstraction for notifications.
pub trait NotificationRepository: Send + Sync {
    fn insert(&self, notification: Notification) -> Result<Notification, NotificationError>;
    /// Newest first.
    fn for_recipient(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationError>;
    /// Idempotent flip; already-read records succeed unchanged.
    fn mark_read(&self, id: &NotificationId) -> Result<(), NotificationError>;
    fn mark_all_read(&self, recipient: &UserId) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error("notification store unavailable: {0}")]
    Unavailable(String),
}

/// Turns lifecycle events into notification records for the counterparty of
/// whoever triggered the event, with one fixed template per event type.
pub struct NotificationDispatcher<N> {
    repository: Arc<N>,
    sequence: AtomicU64,
}

impl<N> NotificationDispatcher<N>
where
    N: NotificationRepository,
{
    pub fn new(repository: Arc<N>) -> Self {
        Self::with_sequence(repository, 1)
    }

    /// Seeds the id sequence, e.g. from a persistent store after restart.
    pub fn with_sequence(repository: Arc<N>, next: u64) -> Self {
        Self {
            repository,
            sequence: AtomicU64::new(next.max(1)),
        }
    }

    fn next_id(&self) -> NotificationId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        NotificationId(format!("ntf-{id:06}"))
    }

    /// Creates the notification(s) for one lifecycle event.
    pub fn dispatch(&self, event: &BookingEvent) -> Result<Vec<Notification>, NotificationError> {
        let (recipient, message) = match event {
            BookingEvent::Created { booking, owner_id } => (
                owner_id.clone(),
                format!(
                    "New booking request {} for room {} from {} to {}.",
                    booking.id,
                    booking.room_id.0,
                    booking.stay.check_in(),
                    booking.stay.check_out()
                ),
            ),
            BookingEvent::Approved { booking } => (
                booking.student_id.clone(),
                format!(
                    "Your booking {} has been approved. Complete the payment to confirm your room.",
                    booking.id
                ),
            ),
            BookingEvent::Rejected { booking } => (
                booking.student_id.clone(),
                format!("Your booking {} has been rejected.", booking.id),
            ),
            BookingEvent::Confirmed { booking } => (
                booking.student_id.clone(),
                format!("Your booking {} is confirmed. See you at check-in!", booking.id),
            ),
            BookingEvent::Cancelled {
                booking,
                owner_id,
                cancelled_by,
                refund,
            } => {
                let recipient = match cancelled_by {
                    ActorRole::Student => owner_id.clone(),
                    ActorRole::HostelOwner => booking.student_id.clone(),
                };
                let message = match refund {
                    Some(outcome) => format!(
                        "Booking {} was cancelled by the {} with a {}% refund.",
                        booking.id,
                        cancelled_by.label(),
                        outcome.percentage()
                    ),
                    None => format!(
                        "Booking {} was cancelled by the {}.",
                        booking.id,
                        cancelled_by.label()
                    ),
                };
                (recipient, message)
            }
        };

        let notification = self.repository.insert(Notification {
            id: self.next_id(),
            recipient,
            message,
            is_read: false,
            created_at: Utc::now(),
        })?;

        Ok(vec![notification])
    }

    pub fn list(&self, recipient: &UserId) -> Result<Vec<Notification>, NotificationError> {
        self.repository.for_recipient(recipient)
    }

    pub fn mark_read(&self, id: &NotificationId) -> Result<(), NotificationError> {
        self.repository.mark_read(id)
    }

    pub fn mark_all_read(&self, recipient: &UserId) -> Result<(), NotificationError> {
        self.repository.mark_all_read(recipient)
    }
}
