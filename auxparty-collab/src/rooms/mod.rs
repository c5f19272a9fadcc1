mod connection;
mod room;

use std::sync::Arc;

use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use log::info;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{
    CollabContext, Database, DatabaseError, NewRoom, PrimaryKey, QueueError, SpotifyApi,
    SpotifyError,
};

pub use connection::*;
pub use room::*;

/// Loads, creates, and deletes rooms, and holds the password gate
pub struct RoomManager<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    context: CollabContext<Db, S>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room {0} doesn't exist")]
    RoomNotFound(String),
    #[error("Only the room owner may do this")]
    Unauthorized,
    #[error("Invalid room password")]
    InvalidPassword,
    #[error("{0} is not a track uri")]
    InvalidTrackUri(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
    #[error(transparent)]
    Spotify(#[from] SpotifyError),
    #[error("HashError: {0}")]
    Hash(String),
}

/// The parameters for creating a new room
#[derive(Debug)]
pub struct NewRoomParams {
    /// The creating user, who becomes the owner
    pub user_id: PrimaryKey,
    pub name: String,
    /// Plaintext, hashed before it is stored
    pub password: String,
}

impl<Db, S> RoomManager<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    pub fn new(context: &CollabContext<Db, S>) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
        }
    }

    /// Restores the rooms from the database on init
    pub async fn restore(&self) -> Result<(), DatabaseError> {
        let rooms: Vec<_> = self
            .context
            .database
            .list_rooms()
            .await?
            .into_iter()
            .map(|r| (r.auxparty_id.clone(), Room::new(&self.context, r)))
            .collect();

        info!("Restored {} rooms", rooms.len());

        for (id, room) in rooms {
            self.context.rooms.insert(id, room);
        }

        Ok(())
    }

    /// Creates a new room, along with the Spotify playlist backing it
    pub async fn create_room(
        &self,
        new_room: NewRoomParams,
    ) -> Result<Arc<Room<Db, S>>, RoomError> {
        let owner = self.context.database.user_by_id(&new_room.user_id).await?;
        let credential = (&owner).into();

        let created = self
            .context
            .spotify
            .create_playlist(&credential, &owner.spotify_user_id, &new_room.name)
            .await?;

        if let Some(token) = created.refreshed_token {
            self.context
                .database
                .update_user_token(&owner.auxparty_id, &token)
                .await?;
        }

        let password = self.hash_password(&new_room.password)?;

        let room_data = self
            .context
            .database
            .create_room(NewRoom {
                auxparty_id: new_room.user_id,
                name: new_room.name,
                password,
                playlist_id: created.value.playlist_id,
                uri: created.value.uri,
            })
            .await?;

        let room = Room::new(&self.context, room_data);

        info!("Created room {}", room.name());
        self.context.rooms.insert(room.id(), room.clone());

        Ok(room)
    }

    /// Get a loaded room by its auxparty id
    pub fn room_by_id(&self, auxparty_id: &str) -> Result<Arc<Room<Db, S>>, RoomError> {
        self.context
            .rooms
            .get(auxparty_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RoomError::RoomNotFound(auxparty_id.to_string()))
    }

    /// Get a loaded room by name, checking the room password on the way in
    pub fn room_by_name(&self, name: &str, password: &str) -> Result<Arc<Room<Db, S>>, RoomError> {
        let room = self
            .context
            .rooms
            .iter()
            .find(|r| r.value().name() == name)
            .map(|r| r.value().clone())
            .ok_or_else(|| RoomError::RoomNotFound(name.to_string()))?;

        let stored_password = room.password_hash();
        let stored_password = PasswordHash::parse(&stored_password, Encoding::default())
            .map_err(|e| RoomError::Hash(e.to_string()))?;

        self.argon
            .verify_password(password.as_bytes(), &stored_password)
            .map_err(|_| RoomError::InvalidPassword)?;

        Ok(room)
    }

    /// Get all rooms in memory
    pub fn list_all(&self) -> Vec<Arc<Room<Db, S>>> {
        self.context.rooms.iter().map(|r| r.value().clone()).collect()
    }

    /// Deletes a room on behalf of a user, which must be the owner
    pub async fn delete_room(&self, auxparty_id: &str, user_id: &str) -> Result<(), RoomError> {
        let room = self.room_by_id(auxparty_id)?;
        room.delete(user_id).await
    }

    fn hash_password(&self, password: &str) -> Result<String, RoomError> {
        let salt = SaltString::generate(&mut OsRng);

        let hashed = self
            .argon
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| RoomError::Hash(e.to_string()))?
            .to_string();

        Ok(hashed)
    }
}
