use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{AppState, Role};

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub session_token_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    email: String,
    role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Access denied. {} privileges required.",
                capitalized(role)
            )))
        }
    }

    pub fn require_admin_or_doctor(&self) -> Result<(), ApiError> {
        if self.is_admin() || self.is_doctor() {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "Access denied. Admin or doctor privileges required.",
            ))
        }
    }

    pub fn require_admin_or_self(&self, user_id: Uuid) -> Result<(), ApiError> {
        if self.is_admin() || self.user_id == user_id {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "Access denied. You can only access your own resources.",
            ))
        }
    }
}

fn capitalized(role: Role) -> &'static str {
    match role {
        Role::Admin => "Admin",
        Role::Doctor => "Doctor",
        Role::Patient => "Patient",
    }
}

/// The doctor profile id linked to a doctor-role user.
pub async fn resolve_doctor_id_by_user_id(
    state: &AppState,
    user_id: Uuid,
) -> Result<Uuid, ApiError> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id
        FROM doctors
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Doctor"))
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
            TypedHeader::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthorized("NO_TOKEN", "Missing or malformed bearer token".into())
                })?;

        let token_hash = hash_access_token(authz.token());

        let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
            r#"
            SELECT st.session_token_id, st.user_id, u.email, u.role
            FROM session_token st
            JOIN users u ON u.id = st.user_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > now()
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(ApiError::session_expired)?;

        // Best-effort activity stamp.
        let _ = sqlx::query(
            r#"
            UPDATE session_token
            SET last_seen_at = now()
            WHERE session_token_id = $1
            "#,
        )
        .bind(row.session_token_id)
        .execute(&state.db)
        .await;

        Ok(AuthContext {
            user_id: row.user_id,
            email: row.email,
            role: row.role,
            session_token_id: row.session_token_id,
        })
    }
}
