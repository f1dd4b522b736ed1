use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::auth::{require_identity, resolve_caller};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::models::{CreateNotificationRequest, Notification, NotificationList, User};
use crate::state::AppState;

// First request after sign-in provisions the user record
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<User>, ApiError> {
    let external_id = require_identity(&identity)?;
    Ok(Json(state.store.get_or_create_user(external_id, identity.profile())))
}

pub async fn notifications_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<NotificationList>, ApiError> {
    let user = resolve_caller(&state.store, &identity).await?;
    Ok(Json(state.store.notifications_for(user.id)))
}

pub async fn create_notification_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: Result<Json<CreateNotificationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let user = resolve_caller(&state.store, &identity).await?;
    let Json(payload) = payload?;

    if payload.title.is_empty() || payload.message.is_empty() {
        return Err(ApiError::BadRequest("Invalid request data".into()));
    }

    let notification = state.store.notify(
        user.id,
        payload.kind,
        &payload.title,
        payload.message,
        payload.data,
    );
    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn mark_notifications_read_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Value>, ApiError> {
    let user = resolve_caller(&state.store, &identity).await?;

    let marked = state.store.mark_all_read(user.id);
    info!(user_id = %user.id, marked, "marked notifications read");
    Ok(Json(json!({ "success": true })))
}
