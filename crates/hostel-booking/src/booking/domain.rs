use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for bookings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for rooms (owned by the catalog collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

/// Identifier wrapper for hostels (owned by the catalog collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostelId(pub String);

/// Identifier wrapper for users; the acting role is resolved per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Role of the party acting on a booking, resolved at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    Student,
    HostelOwner,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Student => "student",
            ActorRole::HostelOwner => "hostel owner",
        }
    }
}

/// Half-open `[check_in, check_out)` window during which a room is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayRange {
    /// Builds a stay range, rejecting empty or inverted windows.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, InvalidStayRange> {
        if check_in < check_out {
            Ok(Self {
                check_in,
                check_out,
            })
        } else {
            Err(InvalidStayRange {
                check_in,
                check_out,
            })
        }
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Half-open overlap: `[a,b)` and `[c,d)` collide iff `a < d && c < b`.
    /// Same-day check-out/check-in is not a collision.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("check-in {check_in} must fall before check-out {check_out}")]
pub struct InvalidStayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// Closed set of booking states; transitions only through
/// [`super::service::BookingService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions. A cancelled-after-
    /// confirmation booking is terminal too; the refund outcome stays on the
    /// record for audit.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Expired
        )
    }

    /// States whose reservations count against room availability.
    pub const fn holds_room(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A reservation request and its lifecycle trail. Owned exclusively by the
/// booking service; terminal records are retained, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    pub hostel_id: HostelId,
    pub student_id: UserId,
    pub stay: StayRange,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Intent issued by the gateway at initiate time; replaced on retry.
    pub payment_intent: Option<String>,
    /// Provider transaction reference; set exactly when the booking confirms.
    pub payment_reference: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refund_outcome: Option<RefundOutcome>,
}

/// Per-hostel thresholds mapping days-before-check-in to a refund tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationPolicy {
    pub full_refund_days: i64,
    pub partial_refund_days: i64,
    pub partial_refund_percentage: u8,
}

/// Refund tier produced when a confirmed booking is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", content = "percentage", rename_all = "snake_case")]
pub enum RefundOutcome {
    Full,
    Partial(u8),
    None,
}

impl RefundOutcome {
    pub fn percentage(&self) -> u8 {
        match self {
            RefundOutcome::Full => 100,
            RefundOutcome::Partial(pct) => *pct,
            RefundOutcome::None => 0,
        }
    }
}

/// Lifecycle events emitted by the booking service and consumed by the
/// notification dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    Created {
        booking: Booking,
        owner_id: UserId,
    },
    Approved {
        booking: Booking,
    },
    Rejected {
        booking: Booking,
    },
    Confirmed {
        booking: Booking,
    },
    Cancelled {
        booking: Booking,
        owner_id: UserId,
        cancelled_by: ActorRole,
        refund: Option<RefundOutcome>,
    },
}
