use auxparty_collab::{NewRoomParams, SerializedSong, TrackHit};
use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json,
};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{
        AddSongSchema, DeleteRoomSchema, EventsQuery, JoinRoomSchema, NewRoomSchema, SearchQuery,
        UpdateTokenSchema, ValidatedJson, VoteSchema,
    },
    serialized::{SerializedRoom, SerializedTrack, ToSerialized},
    sse::EventStream,
    Router,
};

async fn list_rooms(State(context): State<ServerContext>) -> impl IntoResponse {
    let rooms: Vec<SerializedRoom> = context.collab.rooms.list_all().to_serialized();

    Json(rooms)
}

async fn create_room(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<SerializedRoom>> {
    let room = context
        .collab
        .rooms
        .create_room(NewRoomParams {
            user_id: body.user_id,
            name: body.name,
            password: body.password,
        })
        .await?;

    Ok(Json(room.to_serialized()))
}

/// Looks a room up by name, checking the password on the way in
async fn join_room(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<JoinRoomSchema>,
) -> ServerResult<Json<SerializedRoom>> {
    let room = context.collab.rooms.room_by_name(&body.name, &body.password)?;

    Ok(Json(room.to_serialized()))
}

async fn room(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
) -> ServerResult<Json<SerializedRoom>> {
    let room = context.collab.rooms.room_by_id(&id)?;

    Ok(Json(room.to_serialized()))
}

/// Joins the room as a member, receiving its events over SSE.
/// The first event is always a snapshot of the room's current state.
async fn events(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ServerResult<Sse<EventStream>> {
    let room = context.collab.rooms.room_by_id(&id)?;
    let handle = room.connect(query.user_id).await?;

    Ok(Sse::new(EventStream(handle)).keep_alive(KeepAlive::default()))
}

async fn add_song(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<AddSongSchema>,
) -> ServerResult<Json<Vec<SerializedSong>>> {
    let room = context.collab.rooms.room_by_id(&id)?;

    let songs = room
        .add_song(TrackHit {
            uri: body.uri,
            title: body.title,
            artist: body.artist,
            artwork: body.artwork,
        })
        .await?;

    Ok(Json(songs))
}

async fn add_vote(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<Vec<SerializedSong>>> {
    let room = context.collab.rooms.room_by_id(&id)?;
    let songs = room.add_vote(&body.user_id, &body.uri).await?;

    Ok(Json(songs))
}

/// Stores an access token the client refreshed on its own, and tells the
/// other members about it
async fn update_access_token(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateTokenSchema>,
) -> ServerResult<()> {
    let room = context.collab.rooms.room_by_id(&id)?;
    room.update_access_token(&body.user_id, &body.access_token)
        .await?;

    Ok(())
}

async fn delete_room(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<DeleteRoomSchema>,
) -> ServerResult<()> {
    context.collab.rooms.delete_room(&id, &body.user_id).await?;

    Ok(())
}

/// Searches Spotify with the room owner's credentials
async fn search(
    State(context): State<ServerContext>,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ServerResult<Json<Vec<SerializedTrack>>> {
    let room = context.collab.rooms.room_by_id(&id)?;
    let hits = room.search(&query.query).await?;

    Ok(Json(hits.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/join", post(join_room))
        .route("/:id", get(room).delete(delete_room))
        .route("/:id/events", get(events))
        .route("/:id/queue", post(add_song))
        .route("/:id/votes", post(add_vote))
        .route("/:id/access-token", post(update_access_token))
        .route("/:id/search", get(search))
}
