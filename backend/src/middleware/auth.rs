//! Authentication middleware
//!
//! Bearer-token authentication and role-group checks

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use shared::{Role, RoleGroup};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::services::AuthService;
use crate::AppState;

/// Authenticated user information loaded for each request
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_in(&self, group: RoleGroup) -> bool {
        group.permits(self.role)
    }

    /// Fail with 403 unless the user's role belongs to `group`
    pub fn require(&self, group: RoleGroup) -> AppResult<()> {
        if self.is_in(group) {
            Ok(())
        } else {
            tracing::warn!(
                user = %self.username,
                role = %self.role,
                required = ?group,
                "Role not permitted"
            );
            Err(AppError::InsufficientPermissions)
        }
    }

    /// Fail with 403 unless the user belongs to at least one of `groups`
    pub fn require_any(&self, groups: &[RoleGroup]) -> AppResult<()> {
        if groups.iter().any(|g| self.is_in(*g)) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// Validates the access token and loads the user behind it
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return unauthorized_response("Missing or invalid Authorization header");
    };

    let auth_service = AuthService::new(state.db.clone(), &state.config, state.instance_id);
    let auth_user = match auth_service.authenticate(bearer.token()).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new("UNAUTHORIZED", "Authentication required"),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            username: "asha".to_string(),
            email: "asha@doorworks.in".to_string(),
            role,
        }
    }

    #[test]
    fn test_admin_passes_every_group() {
        let admin = user(Role::Admin);
        assert!(admin.require(RoleGroup::FinanceHead).is_ok());
        assert!(admin.require(RoleGroup::CarpenterCaptain).is_ok());
    }

    #[test]
    fn test_role_outside_group_is_forbidden() {
        let driver = user(Role::Driver);
        assert!(driver.require(RoleGroup::LogisticsUser).is_ok());
        assert!(matches!(
            driver.require(RoleGroup::AccountsManager),
            Err(AppError::InsufficientPermissions)
        ));
        assert!(driver
            .require_any(&[RoleGroup::SalesUser, RoleGroup::LogisticsUser])
            .is_ok());
    }
}
