//! Admin identity extractor guarding every backup endpoint.

use crate::error::AppError;
use crate::models::user;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const ADMIN_USER_HEADER: &str = "x-admin-user";

/// An authenticated administrator plus the request details the audit log keeps.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.config.admin_token.as_deref() {
            let provided = bearer_token(&parts.headers).unwrap_or_default();
            if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
                return Err(AppError::Unauthorized("Invalid or missing admin token".into()));
            }
        }

        let username = parts
            .headers
            .get(ADMIN_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?
            .to_string();

        let db = state.db.clone();
        let lookup = username.clone();
        let found = tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            user::find_by_username(&conn, &lookup)
        })
        .await??;

        let user = found.ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;
        if !user.is_admin() {
            tracing::warn!("Rejected backup request from non-admin user {}", user.username);
            return Err(AppError::Forbidden("Administrator access required".into()));
        }

        Ok(AdminUser {
            id: user.id,
            username: user.username,
            ip_address: client_ip(&parts.headers),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_helpers() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.1.1.1, 172.16.0.1"));
        assert_eq!(bearer_token(&headers), Some("s3cret"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.1.1.1"));

        let empty = HeaderMap::new();
        assert_eq!(bearer_token(&empty), None);
        assert_eq!(client_ip(&empty), None);
    }
}
