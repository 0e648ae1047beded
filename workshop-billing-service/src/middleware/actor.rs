//! Actor context extractor.
//!
//! The upstream auth layer authenticates the caller and forwards who they are
//! in headers. Requests without a valid actor are rejected with 401.

use crate::models::{parse_store_permissions, Actor, Role};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const STORE_PERMISSIONS_HEADER: &str = "x-store-permissions";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = header(parts, ACTOR_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing X-Actor-ID header"))
        })?;
        let actor_id = Uuid::parse_str(actor_id.trim()).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Invalid X-Actor-ID header"))
        })?;

        let role: Role = header(parts, ACTOR_ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-Actor-Role header")))?
            .parse()?;

        let store_permissions = match header(parts, STORE_PERMISSIONS_HEADER) {
            Some(raw) => parse_store_permissions(raw)?,
            None => Vec::new(),
        };

        tracing::Span::current().record("actor_id", tracing::field::display(actor_id));

        Ok(Actor {
            actor_id,
            role,
            store_permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Capability;
    use axum::http::Request;

    async fn extract(headers: &[(&str, String)]) -> Result<Actor, AppError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_actor_with_store_permissions() {
        let id = Uuid::new_v4();
        let store = Uuid::new_v4();
        let actor = extract(&[
            (ACTOR_ID_HEADER, id.to_string()),
            (ACTOR_ROLE_HEADER, "staff".to_string()),
            (STORE_PERMISSIONS_HEADER, format!("{store}:CREATE_INVOICES")),
        ])
        .await
        .unwrap();

        assert_eq!(actor.actor_id, id);
        assert_eq!(actor.role, Role::Staff);
        assert!(actor.can(store, Capability::CreateInvoices));
    }

    #[tokio::test]
    async fn missing_or_malformed_actor_is_unauthorized() {
        assert!(matches!(extract(&[]).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(
            extract(&[
                (ACTOR_ID_HEADER, "nope".to_string()),
                (ACTOR_ROLE_HEADER, "customer".to_string()),
            ])
            .await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[
                (ACTOR_ID_HEADER, Uuid::new_v4().to_string()),
                (ACTOR_ROLE_HEADER, "mechanic".to_string()),
            ])
            .await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
