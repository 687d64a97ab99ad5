use super::domain::{CancellationPolicy, HostelId, RoomId, UserId};

/// Room metadata consumed from the catalog collaborator; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub hostel_id: HostelId,
    pub owner_id: UserId,
    /// Security deposit charged to confirm a booking, in rupees.
    pub price: u32,
}

/// Boundary to the hostel/room catalog. Implementations fetch by id and never
/// mutate; the engine treats everything returned as a snapshot.
pub trait RoomCatalog: Send + Sync {
    fn room(&self, id: &RoomId) -> Result<Option<RoomInfo>, CatalogError>;
    fn hostel_owner(&self, hostel: &HostelId) -> Result<Option<UserId>, CatalogError>;
    fn cancellation_policy(&self, hostel: &HostelId) -> Result<CancellationPolicy, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}
