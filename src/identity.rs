use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use crate::store::Profile;

// Claims forwarded by the identity provider after it verified the session
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_IMAGE_HEADER: &str = "x-user-image";

/// Caller identity as seen by handlers. Never rejects: a missing subject
/// is left as `None` and turned into 401 by the authorization gate.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

impl Identity {
    pub fn profile(&self) -> Profile {
        Profile {
            email: self.email.clone().unwrap_or_default(),
            name: self.name.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            external_id: header(USER_ID_HEADER),
            email: header(USER_EMAIL_HEADER),
            name: header(USER_NAME_HEADER),
            image_url: header(USER_IMAGE_HEADER),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Identity {
        let (mut parts, _) = request.into_parts();
        Identity::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn reads_forwarded_claims() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "user_2abc")
            .header(USER_EMAIL_HEADER, "ada@example.com")
            .body(())
            .unwrap();

        let identity = extract(request).await;
        assert_eq!(identity.external_id.as_deref(), Some("user_2abc"));
        assert_eq!(identity.profile().email, "ada@example.com");
        assert!(identity.name.is_none());
    }

    #[tokio::test]
    async fn blank_subject_counts_as_missing() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "   ")
            .body(())
            .unwrap();

        assert!(extract(request).await.external_id.is_none());
    }
}
