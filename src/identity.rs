use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::AppError;

/// Header carrying the caller's id, set by the trusted gateway in front of
/// this service after it has authenticated the request.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized(format!("{USER_ID_HEADER} header missing")))?;

        let user_id = Uuid::parse_str(value.trim())
            .map_err(|_| AppError::unauthorized(format!("{USER_ID_HEADER} is not a valid uuid")))?;

        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<AuthUser, AppError> {
        let (mut parts, _) = request.into_parts();
        AuthUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_from_header() {
        let id = Uuid::new_v4();
        let request = Request::builder().header(USER_ID_HEADER, id.to_string()).body(()).unwrap();

        assert_eq!(extract(request).await.unwrap().user_id, id);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(AppError::Unauthorized(_))));

        let malformed = Request::builder().header(USER_ID_HEADER, "nope").body(()).unwrap();
        assert!(matches!(extract(malformed).await, Err(AppError::Unauthorized(_))));
    }
}
