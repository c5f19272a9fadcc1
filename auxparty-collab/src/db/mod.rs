use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod http;
pub use http::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the core api
    #[error("Internal error: {0}")]
    Internal(String),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the core api doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
}

/// Represents a type that can fetch auxparty data from the external store.
///
/// The store itself is not part of this system, it is only reachable through
/// this narrow request/response surface.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, auxparty_id: &str) -> Result<UserData>;
    /// Replaces a user's access token after a refresh
    async fn update_user_token(&self, auxparty_id: &str, access_token: &str) -> Result<UserData>;

    async fn room_by_id(&self, auxparty_id: &str) -> Result<RoomData>;
    async fn room_by_name(&self, name: &str) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn update_room_active(&self, auxparty_id: &str, active: bool) -> Result<RoomData>;
    async fn update_room_queue(&self, auxparty_id: &str, queue: &[SongData]) -> Result<RoomData>;
    async fn delete_room(&self, auxparty_id: &str) -> Result<()>;
}

#[derive(Debug)]
pub struct NewRoom {
    /// The id of the owning user, which doubles as the room's id
    pub auxparty_id: PrimaryKey,
    pub name: String,
    /// Already hashed by the caller
    pub password: String,
    pub playlist_id: String,
    pub uri: String,
}
