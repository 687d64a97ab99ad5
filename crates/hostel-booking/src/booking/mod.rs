//! Booking lifecycle engine: availability tracking, the booking state
//! machine, refund policy evaluation, the payment gateway boundary, and
//! lifecycle notifications.

pub mod availability;
pub mod catalog;
pub mod domain;
pub mod notifications;
pub mod payment;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use availability::AvailabilityIndex;
pub use catalog::{CatalogError, RoomCatalog, RoomInfo};
pub use domain::{
    ActorRole, Booking, BookingEvent, BookingId, BookingStatus, CancellationPolicy, HostelId,
    RefundOutcome, RoomId, StayRange, UserId,
};
pub use notifications::{
    Notification, NotificationDispatcher, NotificationError, NotificationId,
    NotificationRepository,
};
pub use payment::{
    GatewayError, KhaltiGateway, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentReceipt,
    RetryPolicy, RetryingGateway,
};
pub use policy::evaluate_refund;
pub use repository::{BookingChange, BookingRepository, RepositoryError};
pub use router::booking_router;
pub use service::{
    BookingError, BookingService, CancellationReceipt, DashboardSummary, ServiceConfig,
};
