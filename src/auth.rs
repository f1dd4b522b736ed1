use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::metrics::AUTH_DENIALS;
use crate::models::{GlobalRole, TeamMember, TeamRole, User};
use crate::store::Directory;

/// Roles allowed to invite members and view a team's invites.
pub const TEAM_MANAGERS: &[TeamRole] = &[TeamRole::Owner, TeamRole::Admin];

// Destructive admin actions that may not target the acting account
#[derive(Debug, Clone, Copy)]
pub enum AdminAction {
    Delete,
    ChangeRole(GlobalRole),
}

fn deny(reason: &'static str, err: ApiError) -> ApiError {
    AUTH_DENIALS.with_label_values(&[reason]).inc();
    warn!(reason, error = %err, "authorization denied");
    err
}

/// The caller's external id, or 401 when the request carries none.
pub fn require_identity(identity: &Identity) -> Result<&str, ApiError> {
    identity
        .external_id
        .as_deref()
        .ok_or_else(|| deny("unauthenticated", ApiError::Unauthorized("Unauthorized".into())))
}

/// Maps the forwarded identity to a stored user record.
pub async fn resolve_caller(directory: &dyn Directory, identity: &Identity) -> Result<User, ApiError> {
    let external_id = require_identity(identity)?;

    match directory.user_by_external_id(external_id).await? {
        Some(user) => Ok(user),
        None => Err(deny("not_found", ApiError::NotFound("User not found".into()))),
    }
}

/// Allows callers whose global role is at least `required`.
pub async fn authorize_global(
    directory: &dyn Directory,
    identity: &Identity,
    required: GlobalRole,
) -> Result<User, ApiError> {
    let user = resolve_caller(directory, identity).await?;

    if user.role < required {
        let message = match required {
            GlobalRole::SuperAdmin => "Super admin access required",
            _ => "Admin access required",
        };
        return Err(deny("forbidden", ApiError::Forbidden(message.into())));
    }
    Ok(user)
}

/// Rejects destructive admin actions aimed at the actor's own account,
/// whatever the actor's role.
pub fn guard_self_target(actor: &User, target: Uuid, action: AdminAction) -> Result<(), ApiError> {
    if actor.id != target {
        return Ok(());
    }

    match action {
        AdminAction::Delete => Err(deny(
            "self_target",
            ApiError::Forbidden("Cannot delete your own account".into()),
        )),
        AdminAction::ChangeRole(role) if role < actor.role => Err(deny(
            "self_target",
            ApiError::Forbidden("Cannot revoke your own role".into()),
        )),
        AdminAction::ChangeRole(_) => Ok(()),
    }
}

/// Allows callers whose membership role in `team_id` is listed in `allowed`.
/// No role implies another.
pub async fn authorize_team_action(
    directory: &dyn Directory,
    identity: &Identity,
    team_id: Uuid,
    allowed: &[TeamRole],
) -> Result<(User, TeamMember), ApiError> {
    let user = resolve_caller(directory, identity).await?;

    let Some(membership) = directory.membership(team_id, user.id).await? else {
        return Err(deny(
            "not_a_member",
            ApiError::Forbidden("Not a member of this team".into()),
        ));
    };

    if !allowed.contains(&membership.role) {
        return Err(deny(
            "forbidden",
            ApiError::Forbidden(format!("Team role {} is not permitted", membership.role)),
        ));
    }
    Ok((user, membership))
}
