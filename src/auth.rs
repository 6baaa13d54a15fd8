use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::entity::user;
use crate::error::AppError;

pub const ROLE_USER: &str = "USER";
pub const ROLE_MODERATOR: &str = "MODERATOR";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_moderator(&self) -> bool {
        self.role.as_deref() == Some(ROLE_MODERATOR)
    }

    /// Identifier used in composite keys of favorite marks and reports.
    pub fn principal(&self) -> String {
        self.user_id.to_string()
    }
}

#[derive(Clone, Debug)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "loginId")]
    login_id: i32,
    exp: usize,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let token = extract_token(req, &config);

        Box::pin(async move {
            let token = token.ok_or_else(AppError::need_login)?;
            let auth = authenticate_token(&db, &config, &token).await?;
            Ok(auth)
        })
    }
}

impl FromRequest for OptionalAuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Ok(OptionalAuthUser(None)) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Ok(OptionalAuthUser(None)) });
            }
        };
        let token = extract_token(req, &config);

        Box::pin(async move {
            if let Some(token) = token {
                let auth = authenticate_token(&db, &config, &token).await.ok();
                return Ok(OptionalAuthUser(auth));
            }
            Ok(OptionalAuthUser(None))
        })
    }
}

pub fn require_moderator(auth: &AuthUser) -> Result<(), AppError> {
    if auth.is_moderator() {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

pub fn issue_token(config: &AppConfig, user_id: i32) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::days(30)).timestamp() as usize;
    let claims = Claims { login_id: user_id, exp };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        log::error!("jwt encode failed: {}", e);
        AppError::system_exception()
    })
}

fn extract_token(req: &HttpRequest, config: &AppConfig) -> Option<String> {
    let header = config.token_header.as_str();
    req.headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn authenticate_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    token: &str,
) -> Result<AuthUser, AppError> {
    let user_id = decode_user_id(config, token)?;
    let found = user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(|_| AppError::system_exception())?
        .ok_or_else(AppError::need_login)?;

    Ok(AuthUser { user_id, role: found.role })
}

fn decode_user_id(config: &AppConfig, token: &str) -> Result<i32, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims.login_id)
        .map_err(|_| AppError::need_login())
}
