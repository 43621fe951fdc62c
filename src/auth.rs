use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{post, web, FromRequest, HttpRequest, HttpResponse};
use futures_util::future::LocalBoxFuture;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::models::User;
use crate::{db_conn, query, DbPool};

const USERNAME_MAX: usize = 150;

/// The user resolved from the request's `Authorization: Token <uuid>` header.
pub(crate) struct AuthUser(pub User);

fn parse_token(header: &str) -> Option<&str> {
    let key = header.strip_prefix("Token ")?.trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<AuthUser, ApiError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let pool = req.app_data::<web::Data<DbPool>>().cloned();
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let key = match header.as_deref().and_then(parse_token) {
                Some(key) => key.to_owned(),
                None => return Err(ApiError::Unauthorized),
            };
            let pool = pool.ok_or(ApiError::Internal)?;
            let user = web::block(move || -> Result<Option<User>, ApiError> {
                let conn = db_conn(&pool)?;
                Ok(query::find_user_by_token(&key, &conn)?)
            })
            .await??;
            user.map(AuthUser).ok_or(ApiError::Unauthorized)
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CredentialRequest {
    pub username: String,
}

fn validate_username(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("Username must not be empty".into()));
    }
    if name.chars().count() > USERNAME_MAX {
        return Err(ApiError::BadRequest(format!(
            "Username must be at most {} characters",
            USERNAME_MAX
        )));
    }
    Ok(())
}

#[post("/register")]
pub(crate) async fn register(
    pool: web::Data<DbPool>,
    body: web::Json<CredentialRequest>,
) -> Result<HttpResponse, ApiError> {
    let name = body.into_inner().username;
    validate_username(&name)?;

    let token = web::block(move || -> Result<String, ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_user_by_username(&name, &conn)?.is_some() {
            return Err(ApiError::BadRequest("Username already taken".into()));
        }
        let user = query::insert_user(&name, &conn)?;
        log::info!("registered user {} ({})", user.username, user.id);
        Ok(query::issue_token(user.id, &conn)?)
    })
    .await??;

    Ok(HttpResponse::Created().json(json!({ "token": token })))
}

#[post("/login")]
pub(crate) async fn login(
    pool: web::Data<DbPool>,
    body: web::Json<CredentialRequest>,
) -> Result<HttpResponse, ApiError> {
    let name = body.into_inner().username;

    let token = web::block(move || -> Result<String, ApiError> {
        let conn = db_conn(&pool)?;
        let user = query::find_user_by_username(&name, &conn)?.ok_or(ApiError::NotFound("User"))?;
        match query::find_token_for_user(user.id, &conn)? {
            Some(token) => Ok(token),
            None => Ok(query::issue_token(user.id, &conn)?),
        }
    })
    .await??;

    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn token_header_is_parsed() {
        assert_eq!(parse_token("Token abc123"), Some("abc123"));
        assert_eq!(parse_token("Token   abc123  "), Some("abc123"));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(parse_token("Bearer abc123"), None);
        assert_eq!(parse_token("Token "), None);
        assert_eq!(parse_token(""), None);
    }

    #[test]
    fn usernames_are_validated() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"x".repeat(USERNAME_MAX + 1)).is_err());
    }

    #[test]
    fn username_limit_counts_characters_not_bytes() {
        assert!(validate_username(&"ü".repeat(USERNAME_MAX)).is_ok());
        assert!(validate_username(&"ü".repeat(USERNAME_MAX + 1)).is_err());
    }

    #[actix_web::test]
    async fn missing_header_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        let mut payload = Payload::None;
        let res = AuthUser::from_request(&req, &mut payload).await;
        assert!(matches!(res, Err(ApiError::Unauthorized)));
    }

    #[actix_web::test]
    async fn wrong_scheme_is_unauthorized() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc"))
            .to_http_request();
        let mut payload = Payload::None;
        let res = AuthUser::from_request(&req, &mut payload).await;
        assert!(matches!(res, Err(ApiError::Unauthorized)));
    }
}
