use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use super::{Database, DatabaseError, NewRoom, Result, RoomData, SongData, UserData};

/// A [Database] backed by the auxparty core api over http.
///
/// The core api owns the actual records, this client only shuttles narrow
/// request/response pairs back and forth.
pub struct HttpDatabase {
    client: Client,
    base_url: String,
}

/// Every core api payload is wrapped in this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    error: Option<String>,
    data: Option<T>,
}

impl HttpDatabase {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        resource: &'static str,
        identifier: &str,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DatabaseError::Internal(e.to_string()))?;

        let envelope = unwrap_envelope(response, resource, identifier).await?;

        envelope.data.ok_or(DatabaseError::NotFound {
            resource,
            identifier: identifier.to_string(),
        })
    }

    /// Like [Self::post], but for requests where the response carries no data
    async fn post_unit<B>(
        &self,
        path: &str,
        body: &B,
        resource: &'static str,
        identifier: &str,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DatabaseError::Internal(e.to_string()))?;

        unwrap_envelope::<serde_json::Value>(response, resource, identifier).await?;

        Ok(())
    }

    async fn get<T>(&self, path: &str, resource: &'static str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DatabaseError::Internal(e.to_string()))?;

        let envelope = unwrap_envelope(response, resource, "all").await?;

        envelope.data.ok_or(DatabaseError::NotFound {
            resource,
            identifier: "all".to_string(),
        })
    }
}

async fn unwrap_envelope<T>(
    response: Response,
    resource: &'static str,
    identifier: &str,
) -> Result<Envelope<T>>
where
    T: DeserializeOwned,
{
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(DatabaseError::NotFound {
            resource,
            identifier: identifier.to_string(),
        });
    }

    if status == StatusCode::CONFLICT {
        return Err(DatabaseError::Conflict {
            resource,
            field: "name",
            value: identifier.to_string(),
        });
    }

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(DatabaseError::Internal(text));
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| DatabaseError::Internal(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Err(DatabaseError::Internal(error));
    }

    Ok(envelope)
}

#[async_trait]
impl Database for HttpDatabase {
    async fn user_by_id(&self, auxparty_id: &str) -> Result<UserData> {
        self.post(
            "/users/get",
            &json!({ "auxpartyId": auxparty_id }),
            "user",
            auxparty_id,
        )
        .await
    }

    async fn update_user_token(&self, auxparty_id: &str, access_token: &str) -> Result<UserData> {
        self.post(
            "/users/update-access-token",
            &json!({ "auxpartyId": auxparty_id, "accessToken": access_token }),
            "user",
            auxparty_id,
        )
        .await
    }

    async fn room_by_id(&self, auxparty_id: &str) -> Result<RoomData> {
        self.post(
            "/rooms/get-by-auxparty-id",
            &json!({ "auxpartyId": auxparty_id }),
            "room",
            auxparty_id,
        )
        .await
    }

    async fn room_by_name(&self, name: &str) -> Result<RoomData> {
        self.post(
            "/rooms/get-by-name",
            &json!({ "name": name }),
            "room",
            name,
        )
        .await
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        self.get("/rooms/all", "room").await
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let identifier = new_room.name.clone();

        self.post(
            "/rooms/create",
            &json!({
                "auxpartyId": new_room.auxparty_id,
                "roomName": new_room.name,
                "roomPassword": new_room.password,
                "playlistId": new_room.playlist_id,
                "uri": new_room.uri,
            }),
            "room",
            &identifier,
        )
        .await
    }

    async fn update_room_active(&self, auxparty_id: &str, active: bool) -> Result<RoomData> {
        self.post(
            "/rooms/update-active",
            &json!({ "auxpartyId": auxparty_id, "active": active }),
            "room",
            auxparty_id,
        )
        .await
    }

    async fn update_room_queue(&self, auxparty_id: &str, queue: &[SongData]) -> Result<RoomData> {
        self.post(
            "/rooms/update-queue",
            &json!({ "auxpartyId": auxparty_id, "queue": queue }),
            "room",
            auxparty_id,
        )
        .await
    }

    async fn delete_room(&self, auxparty_id: &str) -> Result<()> {
        self.post_unit(
            "/rooms/delete",
            &json!({ "auxpartyId": auxparty_id }),
            "room",
            auxparty_id,
        )
        .await
    }
}
