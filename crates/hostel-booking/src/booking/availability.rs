use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{Booking, BookingId, RoomId, StayRange};

/// Raised when a reservation would collide with an active booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("room already reserved for an overlapping date range")]
pub struct RangeConflict;

type RoomSlots = Arc<Mutex<HashMap<BookingId, StayRange>>>;

/// Tracks the active (Pending/Confirmed) reservation set per room and
/// answers overlap queries.
///
/// Each room has its own mutex, so concurrent create requests for the same
/// room serialize on that room alone: of two overlapping requests exactly one
/// observes the room free and wins. The index is derived state; it is rebuilt
/// from the booking store at startup and never outlives it.
#[derive(Default)]
pub struct AvailabilityIndex {
    rooms: Mutex<HashMap<RoomId, RoomSlots>>,
    placements: Mutex<HashMap<BookingId, RoomId>>,
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots_for(&self, room_id: &RoomId) -> RoomSlots {
        let mut rooms = self.rooms.lock().expect("availability mutex poisoned");
        rooms.entry(room_id.clone()).or_default().clone()
    }

    /// True iff no active reservation for the room overlaps the range.
    pub fn is_available(&self, room_id: &RoomId, range: &StayRange) -> bool {
        let slots = self.slots_for(room_id);
        let guard = slots.lock().expect("room mutex poisoned");
        guard.values().all(|held| !held.overlaps(range))
    }

    /// Atomic check-and-insert: reserves the range for `booking_id` or fails
    /// without side effects when any active reservation overlaps.
    pub fn reserve_if_available(
        &self,
        room_id: &RoomId,
        booking_id: &BookingId,
        range: StayRange,
    ) -> Result<(), RangeConflict> {
        let slots = self.slots_for(room_id);
        {
            let mut guard = slots.lock().expect("room mutex poisoned");
            if guard.values().any(|held| held.overlaps(&range)) {
                return Err(RangeConflict);
            }
            guard.insert(booking_id.clone(), range);
        }

        let mut placements = self.placements.lock().expect("placement mutex poisoned");
        placements.insert(booking_id.clone(), room_id.clone());
        Ok(())
    }

    /// Removes a booking from the active set; no-op if already released.
    pub fn release(&self, booking_id: &BookingId) {
        let room_id = {
            let mut placements = self.placements.lock().expect("placement mutex poisoned");
            placements.remove(booking_id)
        };

        if let Some(room_id) = room_id {
            let slots = self.slots_for(&room_id);
            let mut guard = slots.lock().expect("room mutex poisoned");
            guard.remove(booking_id);
        }
    }

    /// Whether the index still holds a reservation for this booking.
    pub fn holds(&self, booking_id: &BookingId) -> bool {
        let placements = self.placements.lock().expect("placement mutex poisoned");
        placements.contains_key(booking_id)
    }

    /// Reconstructs the index from the authoritative booking store, keeping
    /// only reservations that count against availability.
    pub fn rebuild<I>(&self, bookings: I)
    where
        I: IntoIterator<Item = Booking>,
    {
        let mut rooms = self.rooms.lock().expect("availability mutex poisoned");
        let mut placements = self.placements.lock().expect("placement mutex poisoned");
        rooms.clear();
        placements.clear();

        for booking in bookings {
            if !booking.status.holds_room() {
                continue;
            }
            let slots = rooms.entry(booking.room_id.clone()).or_default().clone();
            slots
                .lock()
                .expect("room mutex poisoned")
                .insert(booking.id.clone(), booking.stay);
            placements.insert(booking.id, booking.room_id);
        }
    }

    /// Number of active reservations across all rooms; used by readiness
    /// logging after a rebuild.
    pub fn active_count(&self) -> usize {
        let placements = self.placements.lock().expect("placement mutex poisoned");
        placements.len()
    }
}
