mod admin;
mod ai;
mod health;
mod metrics;
mod teams;
mod users;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;

use crate::metrics::REQUEST_TOTAL;
use crate::state::AppState;

pub use admin::{delete_user_handler, get_user_handler, list_users_handler, update_user_handler};
pub use ai::{categorize_handler, search_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use teams::{create_invite_handler, create_team_handler, list_invites_handler, list_teams_handler};
pub use users::{
    create_notification_handler, mark_notifications_read_handler, me_handler, notifications_handler,
};

async fn track_requests(request: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    next.run(request).await
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/me", get(me_handler))
        .route("/api/ai/categorize", post(categorize_handler))
        .route("/api/ai/search", post(search_handler))
        .route("/api/admin/users", get(list_users_handler))
        .route(
            "/api/admin/users/{id}",
            get(get_user_handler)
                .patch(update_user_handler)
                .delete(delete_user_handler),
        )
        .route("/api/teams", get(list_teams_handler).post(create_team_handler))
        .route(
            "/api/teams/{id}/invite",
            get(list_invites_handler).post(create_invite_handler),
        )
        .route(
            "/api/notifications",
            get(notifications_handler)
                .post(create_notification_handler)
                .patch(mark_notifications_read_handler),
        )
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::Assistant;
    use crate::error::ApiError;
    use crate::identity::USER_ID_HEADER;
    use crate::models::{Categorization, GlobalRole, NoteType, SearchAnswer, Source, TeamRole, User};
    use crate::rate_limit::{Limit, REMAINING_HEADER, RESET_HEADER, RateLimiter, RateLimits};
    use crate::store::{Profile, Store};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct CannedAssistant;

    #[async_trait]
    impl Assistant for CannedAssistant {
        async fn categorize(&self, command: &str) -> Result<Categorization, ApiError> {
            Ok(Categorization {
                title: command.chars().take(100).collect(),
                kind: NoteType::Note,
                icon: "description".into(),
                icon_color: None,
            })
        }

        async fn search(&self, query: &str) -> Result<SearchAnswer, ApiError> {
            Ok(SearchAnswer {
                text: format!("answer to {query}"),
                sources: vec![Source {
                    title: "Source".into(),
                    uri: "#".into(),
                }],
            })
        }
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            store: Store::new(),
            rate_limiter: Arc::new(RateLimiter::new(RateLimits {
                categorize: Limit::new(20, 60_000),
                search: Limit::new(2, 60_000),
                default: Limit::new(100, 60_000),
            })),
            assistant: Arc::new(CannedAssistant),
        })
    }

    fn seed(state: &AppState, external_id: &str, role: GlobalRole) -> User {
        let user = state.store.get_or_create_user(
            external_id,
            Profile {
                email: format!("{external_id}@example.com"),
                ..Profile::default()
            },
        );
        state.store.update_role(user.id, role).unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        caller: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(USER_ID_HEADER, caller);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, value)
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = router(test_state());
        let (status, _, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn ai_routes_require_identity() {
        let app = router(test_state());
        let (status, _, body) =
            send(&app, "POST", "/api/ai/search", None, Some(json!({ "query": "rust" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn search_is_rate_limited_per_caller() {
        let app = router(test_state());
        let query = json!({ "query": "what is a borrow checker" });

        let (status, headers, body) =
            send(&app, "POST", "/api/ai/search", Some("u1"), Some(query.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(REMAINING_HEADER).unwrap(), "1");
        assert_eq!(body["sources"][0]["uri"], "#");

        let (status, headers, _) =
            send(&app, "POST", "/api/ai/search", Some("u1"), Some(query.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(REMAINING_HEADER).unwrap(), "0");

        let (status, headers, body) =
            send(&app, "POST", "/api/ai/search", Some("u1"), Some(query.clone())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers.get(REMAINING_HEADER).unwrap(), "0");
        assert!(headers.contains_key(RESET_HEADER));
        assert_eq!(body["error"], "Rate limit exceeded. Try again later.");

        // other callers and other classes keep their own budget
        let (status, _, _) = send(&app, "POST", "/api/ai/search", Some("u2"), Some(query)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, body) = send(
            &app,
            "POST",
            "/api/ai/categorize",
            Some("u1"),
            Some(json!({ "command": "save this article about lifetimes" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "NOTE");
    }

    #[tokio::test]
    async fn blank_command_is_rejected() {
        let app = router(test_state());
        let (status, _, _) = send(
            &app,
            "POST",
            "/api/ai/categorize",
            Some("u1"),
            Some(json!({ "command": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_from_anonymous_callers_are_unauthorized() {
        let app = router(test_state());
        let target = format!("/api/admin/users/{}", uuid::Uuid::new_v4());

        let (status, _, body) =
            send(&app, "PATCH", &target, None, Some(json!({ "role": "ROOT" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, _, body) = send(&app, "POST", "/api/ai/categorize", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, _, _) = send(&app, "POST", "/api/teams", None, Some(json!({ "name": 7 }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_error_envelope() {
        let state = test_state();
        let target = seed(&state, "target", GlobalRole::User);
        seed(&state, "root", GlobalRole::SuperAdmin);
        let app = router(state);

        let uri = format!("/api/admin/users/{}", target.id);
        let (status, _, body) =
            send(&app, "PATCH", &uri, Some("root"), Some(json!({ "role": "ROOT" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request data");

        // a plain user is refused before the body is looked at
        let (status, _, _) =
            send(&app, "PATCH", &uri, Some("target"), Some(json!({ "role": "ROOT" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(&app, "POST", "/api/teams", Some("root"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request data");
    }

    #[tokio::test]
    async fn malformed_ai_calls_still_count_toward_the_window() {
        let app = router(test_state());

        for _ in 0..2 {
            let (status, _, body) =
                send(&app, "POST", "/api/ai/search", Some("u3"), Some(json!({}))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Invalid request data");
        }

        let (status, headers, _) = send(
            &app,
            "POST",
            "/api/ai/search",
            Some("u3"),
            Some(json!({ "query": "now a real one" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers.get(REMAINING_HEADER).unwrap(), "0");
    }

    #[tokio::test]
    async fn notifications_can_be_created_and_marked_read() {
        let state = test_state();
        seed(&state, "reader", GlobalRole::User);
        let app = router(state);

        let note = json!({ "type": "SYSTEM", "title": "Backup", "message": "Nightly export finished" });
        let (status, _, body) =
            send(&app, "POST", "/api/notifications", Some("reader"), Some(note)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["type"], "SYSTEM");
        assert_eq!(body["read"], false);

        let blank = json!({ "type": "SYSTEM", "title": "", "message": "x" });
        let (status, _, _) = send(&app, "POST", "/api/notifications", Some("reader"), Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let unknown = json!({ "type": "PAGER", "title": "t", "message": "m" });
        let (status, _, body) =
            send(&app, "POST", "/api/notifications", Some("reader"), Some(unknown)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request data");

        let (_, _, body) = send(&app, "GET", "/api/notifications", Some("reader"), None).await;
        assert_eq!(body["unreadCount"], 1);

        let (status, _, body) = send(&app, "PATCH", "/api/notifications", Some("reader"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, _, body) = send(&app, "GET", "/api/notifications", Some("reader"), None).await;
        assert_eq!(body["unreadCount"], 0);
        assert_eq!(body["notifications"][0]["read"], true);

        let (status, _, _) = send(&app, "PATCH", "/api/notifications", Some("ghost"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_listing_requires_admin() {
        let state = test_state();
        seed(&state, "plain", GlobalRole::User);
        seed(&state, "admin", GlobalRole::Admin);
        let app = router(state);

        let (status, _, _) = send(&app, "GET", "/api/admin/users", Some("plain"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(&app, "GET", "/api/admin/users", Some("stranger"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, body) =
            send(&app, "GET", "/api/admin/users?page=1&limit=1", Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["pagination"]["totalPages"], 2);
        assert_eq!(body["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn role_changes_need_super_admin() {
        let state = test_state();
        let admin = seed(&state, "admin", GlobalRole::Admin);
        let target = seed(&state, "target", GlobalRole::User);
        let root = seed(&state, "root", GlobalRole::SuperAdmin);
        let app = router(state);

        let uri = format!("/api/admin/users/{}", target.id);
        let (status, _, _) =
            send(&app, "PATCH", &uri, Some("admin"), Some(json!({ "role": "ADMIN" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) =
            send(&app, "PATCH", &uri, Some("root"), Some(json!({ "role": "ADMIN" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "ADMIN");

        let own = format!("/api/admin/users/{}", root.id);
        let (status, _, _) = send(&app, "PATCH", &own, Some("root"), Some(json!({ "role": "USER" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(&app, "GET", &format!("/api/admin/users/{}", admin.id), Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "ADMIN");
    }

    #[tokio::test]
    async fn super_admin_cannot_delete_self() {
        let state = test_state();
        let root = seed(&state, "root", GlobalRole::SuperAdmin);
        let target = seed(&state, "target", GlobalRole::User);
        let app = router(state);

        let (status, _, body) =
            send(&app, "DELETE", &format!("/api/admin/users/{}", root.id), Some("root"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Cannot delete your own account");

        let uri = format!("/api/admin/users/{}", target.id);
        let (status, _, body) = send(&app, "DELETE", &uri, Some("root"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _, _) = send(&app, "DELETE", &uri, Some("root"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invites_are_gated_by_team_role() {
        let state = test_state();
        let owner = seed(&state, "owner", GlobalRole::User);
        let viewer = seed(&state, "viewer", GlobalRole::User);
        seed(&state, "root", GlobalRole::SuperAdmin);
        let app = router(Arc::clone(&state));

        let (status, _, team) = send(
            &app,
            "POST",
            "/api/teams",
            Some("owner"),
            Some(json!({ "name": "Reading group" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(team["members"][0]["role"], "OWNER");
        assert_eq!(team["ownerId"], owner.id.to_string());

        let team_id: uuid::Uuid = team["id"].as_str().unwrap().parse().unwrap();
        state.store.add_member(team_id, viewer.id, TeamRole::Viewer);
        let uri = format!("/api/teams/{team_id}/invite");
        let invite = json!({ "email": "new@example.com", "role": "VIEWER" });

        let (status, _, _) = send(&app, "POST", &uri, Some("viewer"), Some(invite.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = send(&app, "POST", &uri, Some("root"), Some(invite.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(&app, "POST", &uri, Some("owner"), Some(invite.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "PENDING");

        let (status, _, body) = send(&app, "POST", &uri, Some("owner"), Some(invite)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invite already sent to this email");

        let member = json!({ "email": "viewer@example.com" });
        let (status, _, body) = send(&app, "POST", &uri, Some("owner"), Some(member)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User is already a team member");

        let (status, _, body) = send(&app, "GET", &uri, Some("owner"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        let (status, _, _) = send(&app, "GET", &uri, Some("viewer"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, _, body) = send(&app, "GET", "/api/notifications", Some("owner"), None).await;
        assert_eq!(body["unreadCount"], 1);
        assert_eq!(body["notifications"][0]["type"], "TEAM_INVITE");
    }

    #[tokio::test]
    async fn unknown_team_is_not_found() {
        let state = test_state();
        seed(&state, "owner", GlobalRole::User);
        let app = router(state);

        let uri = format!("/api/teams/{}/invite", uuid::Uuid::new_v4());
        let (status, _, body) = send(
            &app,
            "POST",
            &uri,
            Some("owner"),
            Some(json!({ "email": "x@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Team not found");

        // the caller's own record is resolved before the team
        let (status, _, body) = send(&app, "GET", &uri, Some("stranger"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");
    }

    #[tokio::test]
    async fn me_provisions_once() {
        let app = router(test_state());

        let (status, _, first) = send(&app, "GET", "/api/me", Some("ext_new"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["role"], "USER");

        let (_, _, second) = send(&app, "GET", "/api/me", Some("ext_new"), None).await;
        assert_eq!(first["id"], second["id"]);

        let (status, _, _) = send(&app, "GET", "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
