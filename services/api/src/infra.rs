//! Infrastructure implementations of the engine's storage and catalog
//! boundaries: JSON-snapshot repositories for bookings and notifications,
//! and a file-seeded room catalog. Every mutation rewrites the snapshot
//! while the record lock is held, so the file always reflects the last
//! committed transition.

use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use hostel_booking::booking::{
    Booking, BookingChange, BookingId, BookingRepository, BookingStatus, CancellationPolicy,
    CatalogError, HostelId, Notification, NotificationError, NotificationId,
    NotificationRepository, RepositoryError, RoomCatalog, RoomId, RoomInfo, UserId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn write_snapshot<T: Serialize>(path: &Path, records: &T) -> Result<(), std::io::Error> {
    let bytes = serde_json::to_vec_pretty(records)?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)
}

fn read_snapshot<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, std::io::Error> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Booking store with an optional write-through JSON snapshot.
pub(crate) struct FileBookingRepository {
    records: Mutex<HashMap<BookingId, Booking>>,
    snapshot: Option<PathBuf>,
}

impl FileBookingRepository {
    pub(crate) fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            snapshot: None,
        }
    }

    pub(crate) fn open(data_dir: &Path) -> Result<Self, std::io::Error> {
        fs::create_dir_all(data_dir)?;
        let snapshot = data_dir.join("bookings.json");
        let bookings: Vec<Booking> = read_snapshot(&snapshot)?.unwrap_or_default();
        let records = bookings
            .into_iter()
            .map(|booking| (booking.id.clone(), booking))
            .collect();
        Ok(Self {
            records: Mutex::new(records),
            snapshot: Some(snapshot),
        })
    }

    /// First free value of the `bkg-NNNNNN` sequence given what is stored.
    pub(crate) fn next_sequence(&self) -> u64 {
        let guard = self.records.lock().expect("booking mutex poisoned");
        next_numeric_suffix(guard.keys().map(|id| id.0.as_str()))
    }

    fn persist(&self, guard: &HashMap<BookingId, Booking>) -> Result<(), RepositoryError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let mut bookings: Vec<&Booking> = guard.values().collect();
        bookings.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        write_snapshot(path, &bookings)
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))
    }
}

impl BookingRepository for FileBookingRepository {
    fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut guard = self.records.lock().expect("booking mutex poisoned");
        if guard.contains_key(&booking.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(booking.id.clone(), booking.clone());
        self.persist(&guard)?;
        Ok(booking)
    }

    fn fetch(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn transition(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        change: BookingChange,
    ) -> Result<Booking, RepositoryError> {
        let mut guard = self.records.lock().expect("booking mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if record.status != expected {
            return Err(RepositoryError::StaleStatus {
                expected,
                actual: record.status,
            });
        }
        change.apply(record);
        let updated = record.clone();
        self.persist(&guard)?;
        Ok(updated)
    }

    fn active_for_room(&self, room: &RoomId) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        Ok(guard
            .values()
            .filter(|b| b.room_id == *room && b.status.holds_room())
            .cloned()
            .collect())
    }

    fn for_student(&self, student: &UserId) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        let mut bookings: Vec<Booking> = guard
            .values()
            .filter(|b| b.student_id == *student)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(bookings)
    }

    fn for_hostel(&self, hostel: &HostelId) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        let mut bookings: Vec<Booking> = guard
            .values()
            .filter(|b| b.hostel_id == *hostel)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(bookings)
    }

    fn find_by_payment_intent(&self, intent: &str) -> Result<Option<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        Ok(guard
            .values()
            .find(|b| b.payment_intent.as_deref() == Some(intent))
            .cloned())
    }

    fn payment_reference_in_use(&self, reference: &str) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        Ok(guard
            .values()
            .any(|b| b.payment_reference.as_deref() == Some(reference)))
    }

    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        Ok(guard
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < cutoff)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<Booking>, RepositoryError> {
        let guard = self.records.lock().expect("booking mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

/// Notification store with an optional write-through JSON snapshot.
pub(crate) struct FileNotificationRepository {
    records: Mutex<Vec<Notification>>,
    snapshot: Option<PathBuf>,
}

impl FileNotificationRepository {
    pub(crate) fn in_memory() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            snapshot: None,
        }
    }

    pub(crate) fn open(data_dir: &Path) -> Result<Self, std::io::Error> {
        fs::create_dir_all(data_dir)?;
        let snapshot = data_dir.join("notifications.json");
        let records: Vec<Notification> = read_snapshot(&snapshot)?.unwrap_or_default();
        Ok(Self {
            records: Mutex::new(records),
            snapshot: Some(snapshot),
        })
    }

    /// First free value of the `ntf-NNNNNN` sequence given what is stored.
    pub(crate) fn next_sequence(&self) -> u64 {
        let guard = self.records.lock().expect("notification mutex poisoned");
        next_numeric_suffix(guard.iter().map(|n| n.id.0.as_str()))
    }

    fn persist(&self, guard: &[Notification]) -> Result<(), NotificationError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        write_snapshot(path, &guard)
            .map_err(|err| NotificationError::Unavailable(err.to_string()))
    }
}

impl NotificationRepository for FileNotificationRepository {
    fn insert(&self, notification: Notification) -> Result<Notification, NotificationError> {
        let mut guard = self.records.lock().expect("notification mutex poisoned");
        guard.push(notification.clone());
        self.persist(&guard)?;
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
        self.persist(&guard)
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<(), NotificationError> {
        let mut guard = self.records.lock().expect("notification mutex poisoned");
        for record in guard.iter_mut().filter(|n| n.recipient == *recipient) {
            record.is_read = true;
        }
        self.persist(&guard)
    }
}

/// Highest `prefix-NNNNNN` numeric suffix plus one, or 1 on an empty store.
fn next_numeric_suffix<'a>(ids: impl Iterator<Item = &'a str>) -> u64 {
    ids.filter_map(|id| id.rsplit('-').next())
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .map_or(1, |highest| highest + 1)
}

/// One room entry of the seeded catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogRoomEntry {
    room_id: String,
    hostel_id: String,
    owner_id: String,
    price: u32,
}

/// One hostel entry of the seeded catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogHostelEntry {
    hostel_id: String,
    owner_id: String,
    policy: CancellationPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogSeed {
    hostels: Vec<CatalogHostelEntry>,
    rooms: Vec<CatalogRoomEntry>,
}

impl CatalogSeed {
    fn demo() -> Self {
        let policy = CancellationPolicy {
            full_refund_days: 7,
            partial_refund_days: 3,
            partial_refund_percentage: 50,
        };
        Self {
            hostels: vec![CatalogHostelEntry {
                hostel_id: "H-1".to_string(),
                owner_id: "owner-1".to_string(),
                policy,
            }],
            rooms: vec![
                CatalogRoomEntry {
                    room_id: "R-101".to_string(),
                    hostel_id: "H-1".to_string(),
                    owner_id: "owner-1".to_string(),
                    price: 5000,
                },
                CatalogRoomEntry {
                    room_id: "R-102".to_string(),
                    hostel_id: "H-1".to_string(),
                    owner_id: "owner-1".to_string(),
                    price: 6500,
                },
            ],
        }
    }
}

/// Read-only catalog seeded from `catalog.json` in the data directory, or
/// from the built-in demo set when no file is present.
pub(crate) struct SeededRoomCatalog {
    rooms: HashMap<RoomId, RoomInfo>,
    owners: HashMap<HostelId, UserId>,
    policies: HashMap<HostelId, CancellationPolicy>,
}

impl SeededRoomCatalog {
    pub(crate) fn demo() -> Self {
        Self::from_seed(CatalogSeed::demo())
    }

    pub(crate) fn open(data_dir: &Path) -> Result<Self, std::io::Error> {
        let seed = read_snapshot(&data_dir.join("catalog.json"))?
            .unwrap_or_else(CatalogSeed::demo);
        Ok(Self::from_seed(seed))
    }

    fn from_seed(seed: CatalogSeed) -> Self {
        let mut rooms = HashMap::new();
        for entry in seed.rooms {
            rooms.insert(
                RoomId(entry.room_id.clone()),
                RoomInfo {
                    id: RoomId(entry.room_id),
                    hostel_id: HostelId(entry.hostel_id),
                    owner_id: UserId(entry.owner_id),
                    price: entry.price,
                },
            );
        }

        let mut owners = HashMap::new();
        let mut policies = HashMap::new();
        for entry in seed.hostels {
            let hostel = HostelId(entry.hostel_id);
            owners.insert(hostel.clone(), UserId(entry.owner_id));
            policies.insert(hostel, entry.policy);
        }

        Self {
            rooms,
            owners,
            policies,
        }
    }
}

impl RoomCatalog for SeededRoomCatalog {
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
            .ok_or_else(|| CatalogError::Unavailable(format!("no policy for hostel {}", hostel.0)))
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
