use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{TEAM_MANAGERS, authorize_team_action, resolve_caller};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::models::{
    CreateTeamRequest, InviteRequest, NotificationType, Team, TeamInvite, TeamRole, TeamWithMembers,
};
use crate::state::AppState;

const MAX_TEAM_NAME: usize = 100;
const MAX_TEAM_DESCRIPTION: usize = 500;

fn invalid() -> ApiError {
    ApiError::BadRequest("Invalid request data".into())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

// Caller record first, then the team, then membership
async fn existing_team(state: &AppState, identity: &Identity, team_id: Uuid) -> Result<Team, ApiError> {
    resolve_caller(&state.store, identity).await?;
    state
        .store
        .team(team_id)
        .ok_or_else(|| ApiError::NotFound("Team not found".into()))
}

pub async fn list_teams_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<TeamWithMembers>>, ApiError> {
    let user = resolve_caller(&state.store, &identity).await?;
    Ok(Json(state.store.teams_for(user.id)))
}

pub async fn create_team_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: Result<Json<CreateTeamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamWithMembers>), ApiError> {
    let user = resolve_caller(&state.store, &identity).await?;
    let Json(payload) = payload?;

    let name = payload.name.trim();
    if name.is_empty() || name.chars().count() > MAX_TEAM_NAME {
        return Err(invalid());
    }
    if payload
        .description
        .as_deref()
        .is_some_and(|d| d.chars().count() > MAX_TEAM_DESCRIPTION)
    {
        return Err(invalid());
    }

    let team = state.store.create_team(&user, name.to_string(), payload.description);
    info!(team_id = %team.team.id, owner = %user.id, "created team");
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn create_invite_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(team_id): Path<Uuid>,
    payload: Result<Json<InviteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamInvite>), ApiError> {
    let team = existing_team(&state, &identity, team_id).await?;
    let (user, _) = authorize_team_action(&state.store, &identity, team_id, TEAM_MANAGERS).await?;
    let Json(payload) = payload?;

    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) || payload.role == TeamRole::Owner {
        return Err(invalid());
    }
    if state.store.has_pending_invite(team_id, &email) {
        return Err(ApiError::BadRequest("Invite already sent to this email".into()));
    }
    if state.store.is_member_email(team_id, &email) {
        return Err(ApiError::BadRequest("User is already a team member".into()));
    }

    let invite = state.store.create_invite(team_id, email, payload.role);
    state.store.notify(
        user.id,
        NotificationType::TeamInvite,
        "Team Invitation Sent",
        format!("Invitation sent to {} for {}", invite.email, team.name),
        None,
    );
    info!(team_id = %team_id, invite_id = %invite.id, role = %invite.role, "created team invite");

    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn list_invites_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(team_id): Path<Uuid>,
) -> Result<Json<Vec<TeamInvite>>, ApiError> {
    existing_team(&state, &identity, team_id).await?;
    authorize_team_action(&state.store, &identity, team_id, TEAM_MANAGERS).await?;

    Ok(Json(state.store.invites_for(team_id)))
}
