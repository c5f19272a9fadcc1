use auxparty_collab::{DatabaseError, QueueError, RoomError, SpotifyError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Invalid room password")]
    InvalidPassword,
    #[error("Only the room owner may do this")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("Spotify request failed: {0}")]
    Upstream(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidPassword => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::RoomNotFound(identifier) => Self::NotFound {
                resource: "room",
                identifier,
            },
            RoomError::Unauthorized => Self::Forbidden,
            RoomError::InvalidPassword => Self::InvalidPassword,
            RoomError::InvalidTrackUri(uri) => {
                Self::BadRequest(format!("{} is not a track uri", uri))
            }
            RoomError::Queue(QueueError::SongNotFound) => Self::NotFound {
                resource: "song",
                identifier: "queue".to_string(),
            },
            RoomError::Queue(QueueError::OutOfBounds(index)) => Self::NotFound {
                resource: "song",
                identifier: index.to_string(),
            },
            RoomError::Db(e) => e.into(),
            RoomError::Spotify(SpotifyError::CredentialExpired) => {
                Self::BadRequest("The owner must re-authenticate with Spotify".to_string())
            }
            RoomError::Spotify(e) => Self::Upstream(e.to_string()),
            e => Self::Unknown(e.to_string()),
        }
    }
}
