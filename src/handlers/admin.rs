use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminAction, authorize_global, guard_self_target};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::models::{GlobalRole, Pagination, UpdateUserRequest, User, UserList, UserListQuery, UserSummary};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserList>, ApiError> {
    authorize_global(&state.store, &identity, GlobalRole::Admin).await?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let (users, total) = state.store.list_users(query.search.as_deref(), page, limit);

    Ok(Json(UserList {
        users,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        },
    }))
}

pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<UserSummary>, ApiError> {
    authorize_global(&state.store, &identity, GlobalRole::Admin).await?;

    state
        .store
        .user_summary(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let actor = authorize_global(&state.store, &identity, GlobalRole::SuperAdmin).await?;
    let Json(payload) = payload?;

    let updated = match payload.role {
        Some(role) => {
            guard_self_target(&actor, id, AdminAction::ChangeRole(role))?;
            let user = state.store.update_role(id, role);
            if user.is_some() {
                info!(actor = %actor.id, target = %id, %role, "changed user role");
            }
            user
        }
        None => state.store.user(id),
    };

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let actor = authorize_global(&state.store, &identity, GlobalRole::SuperAdmin).await?;
    guard_self_target(&actor, id, AdminAction::Delete)?;

    if !state.store.delete_user(id) {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(actor = %actor.id, target = %id, "deleted user");
    Ok(Json(json!({ "success": true })))
}
