use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    GlobalRole, InviteStatus, Notification, NotificationList, NotificationType, Team, TeamInvite,
    TeamMember, TeamRole, TeamWithMembers, User, UserCounts, UserSummary,
};

const INVITE_TTL_DAYS: i64 = 7;
const NOTIFICATION_PAGE: usize = 50;

/// Lookups the authorization gate needs from the user datastore.
///
/// Errors are passed through to the caller untouched.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>, ApiError>;

    async fn membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<TeamMember>, ApiError>;
}

// Profile fields forwarded by the identity provider
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

// In-process datastore
#[derive(Default)]
pub struct Store {
    users: DashMap<Uuid, User>,
    by_external: DashMap<String, Uuid>,
    teams: DashMap<Uuid, Team>,
    members: DashMap<Uuid, TeamMember>,
    invites: DashMap<Uuid, TeamInvite>,
    notifications: DashMap<Uuid, Notification>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// The external-id entry stays locked while the record is created, so
    /// concurrent first requests for one identity provision a single user.
    pub fn get_or_create_user(&self, external_id: &str, profile: Profile) -> User {
        let mut slot = self
            .by_external
            .entry(external_id.to_string())
            .or_insert(Uuid::nil());
        if let Some(user) = self.user(*slot) {
            return user;
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            email: profile.email,
            name: profile.name,
            image_url: profile.image_url,
            role: GlobalRole::User,
            created_at: now,
            updated_at: now,
        };
        *slot = user.id;
        self.users.insert(user.id, user.clone());
        tracing::info!(user_id = %user.id, "provisioned user record");
        user
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn user_summary(&self, id: Uuid) -> Option<UserSummary> {
        self.user(id).map(|user| self.summarize(user))
    }

    fn summarize(&self, user: User) -> UserSummary {
        let counts = UserCounts {
            teams: self.members.iter().filter(|m| m.user_id == user.id).count() as u64,
            notifications: self
                .notifications
                .iter()
                .filter(|n| n.user_id == user.id)
                .count() as u64,
        };
        UserSummary { user, counts }
    }

    /// Newest first. `search` matches a substring of email or name.
    pub fn list_users(&self, search: Option<&str>, page: u32, limit: u32) -> (Vec<UserSummary>, u64) {
        let needle = search.map(str::to_lowercase).filter(|s| !s.is_empty());

        let mut matched: Vec<User> = self
            .users
            .iter()
            .filter(|u| match &needle {
                Some(n) => {
                    u.email.to_lowercase().contains(n)
                        || u.name.as_deref().is_some_and(|name| name.to_lowercase().contains(n))
                }
                None => true,
            })
            .map(|u| u.clone())
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let users = matched
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .map(|u| self.summarize(u))
            .collect();
        (users, total)
    }

    pub fn update_role(&self, id: Uuid, role: GlobalRole) -> Option<User> {
        let mut user = self.users.get_mut(&id)?;
        user.role = role;
        user.updated_at = Utc::now();
        Some(user.clone())
    }

    /// Removes the user together with their memberships, notifications and
    /// the teams they own.
    pub fn delete_user(&self, id: Uuid) -> bool {
        let Some((_, user)) = self.users.remove(&id) else {
            return false;
        };
        self.by_external.remove_if(&user.external_id, |_, mapped| *mapped == id);

        let owned: Vec<Uuid> = self
            .teams
            .iter()
            .filter(|t| t.owner_id == id)
            .map(|t| t.id)
            .collect();
        for team_id in &owned {
            self.teams.remove(team_id);
            self.invites.retain(|_, i| i.team_id != *team_id);
        }
        self.members
            .retain(|_, m| m.user_id != id && !owned.contains(&m.team_id));
        self.notifications.retain(|_, n| n.user_id != id);
        true
    }

    pub fn create_team(&self, owner: &User, name: String, description: Option<String>) -> TeamWithMembers {
        let team = Team {
            id: Uuid::new_v4(),
            name,
            description,
            owner_id: owner.id,
            created_at: Utc::now(),
        };
        self.teams.insert(team.id, team.clone());
        let owner_membership = self.add_member(team.id, owner.id, TeamRole::Owner);

        TeamWithMembers {
            team,
            members: vec![owner_membership],
        }
    }

    pub fn team(&self, id: Uuid) -> Option<Team> {
        self.teams.get(&id).map(|t| t.clone())
    }

    fn members_of(&self, team_id: Uuid) -> Vec<TeamMember> {
        let mut members: Vec<TeamMember> = self
            .members
            .iter()
            .filter(|m| m.team_id == team_id)
            .map(|m| m.clone())
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        members
    }

    /// Teams the user owns or belongs to, newest first.
    pub fn teams_for(&self, user_id: Uuid) -> Vec<TeamWithMembers> {
        let mut teams: Vec<Team> = self
            .teams
            .iter()
            .filter(|t| {
                t.owner_id == user_id
                    || self
                        .members
                        .iter()
                        .any(|m| m.team_id == t.id && m.user_id == user_id)
            })
            .map(|t| t.clone())
            .collect();
        teams.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        teams
            .into_iter()
            .map(|team| TeamWithMembers {
                members: self.members_of(team.id),
                team,
            })
            .collect()
    }

    pub fn add_member(&self, team_id: Uuid, user_id: Uuid, role: TeamRole) -> TeamMember {
        let member = TeamMember {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            role,
            joined_at: Utc::now(),
        };
        self.members.insert(member.id, member.clone());
        member
    }

    pub fn is_member_email(&self, team_id: Uuid, email: &str) -> bool {
        self.members.iter().any(|m| {
            m.team_id == team_id
                && self
                    .users
                    .get(&m.user_id)
                    .is_some_and(|u| u.email.eq_ignore_ascii_case(email))
        })
    }

    pub fn has_pending_invite(&self, team_id: Uuid, email: &str) -> bool {
        self.invites.iter().any(|i| {
            i.team_id == team_id
                && i.status == InviteStatus::Pending
                && i.email.eq_ignore_ascii_case(email)
        })
    }

    pub fn create_invite(&self, team_id: Uuid, email: String, role: TeamRole) -> TeamInvite {
        let now = Utc::now();
        let invite = TeamInvite {
            id: Uuid::new_v4(),
            team_id,
            email,
            role,
            status: InviteStatus::Pending,
            expires_at: now + Duration::days(INVITE_TTL_DAYS),
            created_at: now,
        };
        self.invites.insert(invite.id, invite.clone());
        invite
    }

    pub fn invites_for(&self, team_id: Uuid) -> Vec<TeamInvite> {
        let mut invites: Vec<TeamInvite> = self
            .invites
            .iter()
            .filter(|i| i.team_id == team_id)
            .map(|i| i.clone())
            .collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        invites
    }

    pub fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationType,
        title: &str,
        message: String,
        data: Option<String>,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.to_string(),
            message,
            data,
            read: false,
            created_at: Utc::now(),
        };
        self.notifications.insert(notification.id, notification.clone());
        notification
    }

    pub fn notifications_for(&self, user_id: Uuid) -> NotificationList {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.clone())
            .collect();
        let unread_count = notifications.iter().filter(|n| !n.read).count() as u64;

        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(NOTIFICATION_PAGE);

        NotificationList {
            notifications,
            unread_count,
        }
    }

    /// Marks every unread notification of the user as read and returns how
    /// many changed.
    pub fn mark_all_read(&self, user_id: Uuid) -> usize {
        let mut marked = 0;
        for mut notification in self.notifications.iter_mut() {
            if notification.user_id == user_id && !notification.read {
                notification.read = true;
                marked += 1;
            }
        }
        marked
    }
}

#[async_trait]
impl Directory for Store {
    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>, ApiError> {
        let id = self.by_external.get(external_id).map(|id| *id);
        Ok(id.and_then(|id| self.user(id)))
    }

    async fn membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<TeamMember>, ApiError> {
        Ok(self
            .members
            .iter()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .map(|m| m.clone()))
    }
}
