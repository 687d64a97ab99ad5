//! Booking lifecycle and availability consistency engine for hostel reservations.
//!
//! The `booking` module owns the state machine that drives a reservation from a
//! student's request through owner review, payment confirmation, and
//! cancellation. Catalog data (hostels, rooms, pricing) and identity are
//! external collaborators reached through read-only traits.

pub mod booking;
pub mod config;
pub mod error;
pub mod telemetry;
