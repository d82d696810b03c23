//! Routes for the game context.
//!
//! Writes always answer `200` with a `success` flag. A refused command, a
//! malformed body and a store failure all read the same to the caller; the
//! reason only goes to the log.

use std::fmt::Display;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use avalon_core::error::DomainError;
use avalon_game::application::command_handlers::{self, GameCommandResult};
use avalon_game::application::query_handlers::{self, GameView};
use avalon_game::domain::commands;
use avalon_game::domain::events::{ProposalVote, QuestVote};
use avalon_game::domain::roles::Role;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    /// The creator's display name.
    pub player_name: String,
}

/// Request body for POST /{game_id}/join.
#[derive(Debug, Deserialize)]
pub struct JoinGameRequest {
    /// The joining player's display name.
    pub player_name: String,
}

/// Request body for POST /{game_id}/start.
#[derive(Debug, Deserialize)]
pub struct StartGameRequest {
    /// Must be the creator.
    pub player_id: Uuid,
    /// One role per player.
    pub role_list: Vec<Role>,
    /// Every player name, in seating order.
    pub player_order: Vec<String>,
}

/// Request body for POST /{game_id}/quests/{quest_id}/proposal.
#[derive(Debug, Deserialize)]
pub struct ProposeQuestRequest {
    /// Must be the attempt's leader.
    pub player_id: Uuid,
    /// The proposed team.
    pub members: Vec<String>,
}

/// Request body for POST /{game_id}/quests/{quest_id}/proposal-votes.
#[derive(Debug, Deserialize)]
pub struct ProposalVoteRequest {
    pub player_id: Uuid,
    pub vote: ProposalVote,
}

/// Request body for POST /{game_id}/quests/{quest_id}/quest-votes.
#[derive(Debug, Deserialize)]
pub struct QuestVoteRequest {
    pub player_id: Uuid,
    pub vote: QuestVote,
}

/// Response body for every write.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    /// Whether the command took effect.
    pub success: bool,
    /// Set when a game was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
    /// The new player's token, set on create and join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<Uuid>,
}

impl WriteResponse {
    fn ok() -> Self {
        Self {
            success: true,
            game_id: None,
            player_id: None,
        }
    }

    fn failed() -> Json<Self> {
        Json(Self {
            success: false,
            game_id: None,
            player_id: None,
        })
    }
}

/// Logs an extractor rejection and discards it.
fn extracted<T, E: Display>(operation: &'static str, input: Result<T, E>) -> Option<T> {
    match input {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation, error = %e, "malformed request");
            None
        }
    }
}

/// Collapses a handler result into a write response.
fn respond(
    operation: &'static str,
    result: Result<GameCommandResult, DomainError>,
    shape: impl FnOnce(GameCommandResult) -> WriteResponse,
) -> Json<WriteResponse> {
    match result {
        Ok(outcome) => Json(shape(outcome)),
        Err(e) => {
            warn!(operation, code = e.code(), error = %e, "command refused");
            WriteResponse::failed()
        }
    }
}

/// POST /
#[instrument(skip_all)]
async fn create_game(
    State(state): State<AppState>,
    body: Result<Json<CreateGameRequest>, JsonRejection>,
) -> Json<WriteResponse> {
    let Some(Json(request)) = extracted("create_game", body) else {
        return WriteResponse::failed();
    };
    let command = commands::CreateGame {
        correlation_id: state.ids.new_id(),
        player_name: request.player_name,
    };

    info!(correlation_id = %command.correlation_id, "handling create_game command");

    let result = command_handlers::handle_create_game(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        &*state.event_repository,
    )
    .await;

    respond("create_game", result, |outcome| WriteResponse {
        success: true,
        game_id: Some(outcome.aggregate_id),
        player_id: outcome.player_id,
    })
}

/// POST /{game_id}/join
#[instrument(skip_all)]
async fn join_game(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<JoinGameRequest>, JsonRejection>,
) -> Json<WriteResponse> {
    let (Some(Path(game_id)), Some(Json(request))) =
        (extracted("join_game", path), extracted("join_game", body))
    else {
        return WriteResponse::failed();
    };
    let command = commands::JoinGame {
        correlation_id: state.ids.new_id(),
        game_id,
        player_name: request.player_name,
    };

    info!(correlation_id = %command.correlation_id, %game_id, "handling join_game command");

    let result = command_handlers::handle_join_game(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        &state.policy,
        &*state.event_repository,
    )
    .await;

    respond("join_game", result, |outcome| WriteResponse {
        player_id: outcome.player_id,
        ..WriteResponse::ok()
    })
}

/// POST /{game_id}/start
#[instrument(skip_all)]
async fn start_game(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<StartGameRequest>, JsonRejection>,
) -> Json<WriteResponse> {
    let (Some(Path(game_id)), Some(Json(request))) =
        (extracted("start_game", path), extracted("start_game", body))
    else {
        return WriteResponse::failed();
    };
    let command = commands::StartGame {
        correlation_id: state.ids.new_id(),
        game_id,
        player_id: request.player_id,
        role_list: request.role_list,
        player_order: request.player_order,
    };

    info!(correlation_id = %command.correlation_id, %game_id, "handling start_game command");

    let result = command_handlers::handle_start_game(
        &command,
        state.clock.as_ref(),
        &*state.rng,
        state.ids.as_ref(),
        &state.policy,
        &*state.event_repository,
    )
    .await;

    respond("start_game", result, |_| WriteResponse::ok())
}

/// POST /{game_id}/quests/{quest_id}/proposal
#[instrument(skip_all)]
async fn propose_quest(
    State(state): State<AppState>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    body: Result<Json<ProposeQuestRequest>, JsonRejection>,
) -> Json<WriteResponse> {
    let (Some(Path((game_id, quest_id))), Some(Json(request))) = (
        extracted("propose_quest", path),
        extracted("propose_quest", body),
    ) else {
        return WriteResponse::failed();
    };
    let command = commands::ProposeQuest {
        correlation_id: state.ids.new_id(),
        game_id,
        quest_id,
        player_id: request.player_id,
        members: request.members,
    };

    info!(correlation_id = %command.correlation_id, %game_id, %quest_id, "handling propose_quest command");

    let result = command_handlers::handle_propose_quest(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        &state.policy,
        &*state.event_repository,
    )
    .await;

    respond("propose_quest", result, |_| WriteResponse::ok())
}

/// POST /{game_id}/quests/{quest_id}/proposal-votes
#[instrument(skip_all)]
async fn vote_on_proposal(
    State(state): State<AppState>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    body: Result<Json<ProposalVoteRequest>, JsonRejection>,
) -> Json<WriteResponse> {
    let (Some(Path((game_id, quest_id))), Some(Json(request))) = (
        extracted("vote_on_proposal", path),
        extracted("vote_on_proposal", body),
    ) else {
        return WriteResponse::failed();
    };
    let command = commands::VoteOnProposal {
        correlation_id: state.ids.new_id(),
        game_id,
        quest_id,
        player_id: request.player_id,
        vote: request.vote,
    };

    info!(correlation_id = %command.correlation_id, %game_id, %quest_id, "handling vote_on_proposal command");

    let result = command_handlers::handle_vote_on_proposal(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        &state.policy,
        &*state.event_repository,
    )
    .await;

    respond("vote_on_proposal", result, |_| WriteResponse::ok())
}

/// POST /{game_id}/quests/{quest_id}/quest-votes
#[instrument(skip_all)]
async fn vote_in_quest(
    State(state): State<AppState>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    body: Result<Json<QuestVoteRequest>, JsonRejection>,
) -> Json<WriteResponse> {
    let (Some(Path((game_id, quest_id))), Some(Json(request))) = (
        extracted("vote_in_quest", path),
        extracted("vote_in_quest", body),
    ) else {
        return WriteResponse::failed();
    };
    let command = commands::VoteInQuest {
        correlation_id: state.ids.new_id(),
        game_id,
        quest_id,
        player_id: request.player_id,
        vote: request.vote,
    };

    info!(correlation_id = %command.correlation_id, %game_id, %quest_id, "handling vote_in_quest command");

    let result = command_handlers::handle_vote_in_quest(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        &state.policy,
        &*state.event_repository,
    )
    .await;

    respond("vote_in_quest", result, |_| WriteResponse::ok())
}

/// GET /{game_id}/players/{player_id}/state
#[instrument(skip(state), fields(game_id = %game_id))]
async fn get_game_state(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GameView>, ApiError> {
    let view =
        query_handlers::get_game_state(game_id, player_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// Returns the router for the game context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_game))
        .route("/{game_id}/join", post(join_game))
        .route("/{game_id}/start", post(start_game))
        .route("/{game_id}/quests/{quest_id}/proposal", post(propose_quest))
        .route(
            "/{game_id}/quests/{quest_id}/proposal-votes",
            post(vote_on_proposal),
        )
        .route("/{game_id}/quests/{quest_id}/quest-votes", post(vote_in_quest))
        .route("/{game_id}/players/{player_id}/state", get(get_game_state))
}
