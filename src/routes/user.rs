use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::{hash, verify};
use chrono::{Datelike, Duration, Utc};
use log::{error, info};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};

use crate::auth::{issue_token, AuthUser, ROLE_MODERATOR, ROLE_USER};
use crate::config::AppConfig;
use crate::entity::{password_reset, user};
use crate::error::{db_error, AppError};
use crate::health::{ActivityLevel, Sex};
use crate::response::{ok, ok_empty};
use crate::routes::to_rfc3339;
use crate::sys_config;

const BCRYPT_COST: u32 = 10;
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register_user)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/logout").route(web::post().to(logout)))
        .service(web::resource("/current").route(web::post().to(current_user)))
        .service(web::resource("/update").route(web::post().to(update_user)))
        .service(web::resource("/resetPassword/request").route(web::post().to(request_reset)))
        .service(web::resource("/resetPassword/confirm").route(web::post().to(confirm_reset)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterUserRequest {
    email: Option<String>,
    password: Option<String>,
    confirm_password: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    display_name: Option<String>,
    avatar_url: Option<String>,
    sex: Option<Sex>,
    birth_year: Option<i32>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    activity_level: Option<ActivityLevel>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct ResetRequest {
    email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetConfirmRequest {
    token: Option<String>,
    password: Option<String>,
    confirm_password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user: UserDto,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetTokenResponse {
    token: String,
    expires: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    id: i32,
    email: String,
    display_name: Option<String>,
    role: Option<String>,
    avatar_url: Option<String>,
    sex: Option<String>,
    birth_year: Option<i32>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    activity_level: Option<String>,
    created: Option<String>,
    updated: Option<String>,
}

async fn register_user(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<RegisterUserRequest>,
) -> Result<HttpResponse, AppError> {
    let email = payload.email.clone().unwrap_or_default().trim().to_lowercase();
    let password = payload.password.clone().unwrap_or_default();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::param_error("email is invalid"));
    }
    check_new_password(&password, payload.confirm_password.as_deref())?;

    let open_register = sys_config::get_boolean(db.get_ref(), sys_config::OPEN_REGISTER)
        .await
        .map_err(db_error("read OPEN_REGISTER"))?;
    if !open_register {
        return Err(AppError::fail("registration is closed"));
    }

    // the first account moderates
    let existing_users = user::Entity::find()
        .count(db.get_ref())
        .await
        .map_err(db_error("count users"))?;
    let role = if existing_users == 0 { ROLE_MODERATOR } else { ROLE_USER };

    let display_name = payload
        .display_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let password_hash = hash(password, BCRYPT_COST).map_err(|_| AppError::system_exception())?;
    let now = Utc::now();
    let user_model = user::ActiveModel {
        email: Set(email.clone()),
        password_hash: Set(password_hash),
        display_name: Set(Some(display_name)),
        role: Set(Some(role.to_string())),
        created: Set(Some(now)),
        updated: Set(Some(now)),
        ..Default::default()
    };

    match user_model.insert(db.get_ref()).await {
        Ok(saved) => {
            info!("user {} registered as {}", saved.id, role);
            Ok(ok(to_user_dto(saved)))
        }
        Err(err) => {
            let msg = err.to_string();
            if msg.contains("Duplicate") || msg.contains("UNIQUE") {
                return Err(AppError::fail("email already registered"));
            }
            error!("register user failed: {}", msg);
            Err(AppError::system_exception())
        }
    }
}

async fn login(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let email = payload.email.clone().unwrap_or_default().trim().to_lowercase();
    let password = payload.password.clone().unwrap_or_default();
    if email.is_empty() {
        return Err(AppError::param_error("email cannot be null"));
    }
    if password.is_empty() {
        return Err(AppError::param_error("password cannot be null"));
    }

    let found = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db.get_ref())
        .await
        .map_err(db_error("find user by email"))?
        .ok_or_else(|| AppError::fail("wrong email or password"))?;

    let matches = verify(password, &found.password_hash).unwrap_or(false);
    if !matches {
        return Err(AppError::fail("wrong email or password"));
    }

    let token = issue_token(&config, found.id)?;
    Ok(ok(LoginResponse {
        token,
        user: to_user_dto(found),
    }))
}

async fn logout(_auth: AuthUser) -> Result<HttpResponse, AppError> {
    Ok(ok_empty())
}

async fn current_user(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    let found = user::Entity::find_by_id(auth.user_id)
        .one(db.get_ref())
        .await
        .map_err(db_error("current_user find_by_id"))?
        .ok_or_else(AppError::need_login)?;
    Ok(ok(to_user_dto(found)))
}

async fn update_user(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    let mut active = user::ActiveModel {
        id: Set(auth.user_id),
        ..Default::default()
    };
    active.updated = Set(Some(Utc::now()));

    if let Some(v) = payload.display_name.clone() {
        if v.trim().is_empty() {
            return Err(AppError::param_error("displayName cannot be blank"));
        }
        active.display_name = Set(Some(v));
    }
    if let Some(v) = payload.avatar_url.clone() {
        active.avatar_url = Set(Some(v));
    }
    if let Some(v) = payload.sex {
        active.sex = Set(Some(v.as_str().to_string()));
    }
    if let Some(v) = payload.birth_year {
        if !(1900..=Utc::now().year()).contains(&v) {
            return Err(AppError::param_error("birthYear is out of range"));
        }
        active.birth_year = Set(Some(v));
    }
    if let Some(v) = payload.height_cm {
        if !(v > 0.0) {
            return Err(AppError::param_error("heightCm must be positive"));
        }
        active.height_cm = Set(Some(v));
    }
    if let Some(v) = payload.weight_kg {
        if !(v > 0.0) {
            return Err(AppError::param_error("weightKg must be positive"));
        }
        active.weight_kg = Set(Some(v));
    }
    if let Some(v) = payload.activity_level {
        active.activity_level = Set(Some(v.as_str().to_string()));
    }
    if let Some(password) = payload.password.clone() {
        if !password.is_empty() {
            check_new_password(&password, None)?;
            let hashed = hash(password, BCRYPT_COST).map_err(|_| AppError::system_exception())?;
            active.password_hash = Set(hashed);
        }
    }

    let saved = active
        .update(db.get_ref())
        .await
        .map_err(db_error("update user"))?;
    Ok(ok(to_user_dto(saved)))
}

async fn request_reset(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    payload: web::Json<ResetRequest>,
) -> Result<HttpResponse, AppError> {
    let email = payload.email.clone().unwrap_or_default().trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::param_error("email cannot be null"));
    }
    let found = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db.get_ref())
        .await
        .map_err(db_error("find user by email"))?
        .ok_or_else(|| AppError::fail("user not found"))?;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let now = Utc::now();
    let expires = now + Duration::minutes(config.reset_token_ttl_minutes);

    password_reset::ActiveModel {
        token: Set(token.clone()),
        user_id: Set(found.id),
        expires: Set(expires),
        created: Set(Some(now)),
    }
    .insert(db.get_ref())
    .await
    .map_err(db_error("insert reset token"))?;

    info!("password reset requested for user {}", found.id);
    Ok(ok(ResetTokenResponse {
        token,
        expires: to_rfc3339(expires),
    }))
}

async fn confirm_reset(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<ResetConfirmRequest>,
) -> Result<HttpResponse, AppError> {
    let token = payload.token.clone().unwrap_or_default();
    let password = payload.password.clone().unwrap_or_default();
    if token.trim().is_empty() {
        return Err(AppError::param_error("token cannot be null"));
    }
    check_new_password(&password, payload.confirm_password.as_deref())?;

    let reset = password_reset::Entity::find_by_id(token.trim().to_string())
        .one(db.get_ref())
        .await
        .map_err(db_error("find reset token"))?
        .ok_or_else(|| AppError::fail("reset token is invalid"))?;

    if reset.expires < Utc::now() {
        password_reset::Entity::delete_by_id(reset.token)
            .exec(db.get_ref())
            .await
            .map_err(db_error("delete expired reset token"))?;
        return Err(AppError::fail("reset token has expired"));
    }

    let hashed = hash(password, BCRYPT_COST).map_err(|_| AppError::system_exception())?;
    user::ActiveModel {
        id: Set(reset.user_id),
        password_hash: Set(hashed),
        updated: Set(Some(Utc::now())),
        ..Default::default()
    }
    .update(db.get_ref())
    .await
    .map_err(db_error("reset password"))?;

    password_reset::Entity::delete_many()
        .filter(password_reset::Column::UserId.eq(reset.user_id))
        .exec(db.get_ref())
        .await
        .map_err(db_error("clear reset tokens"))?;

    Ok(ok_empty())
}

fn check_new_password(password: &str, confirm: Option<&str>) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::param_error("password must have at least 6 characters"));
    }
    if let Some(confirm) = confirm {
        if confirm != password {
            return Err(AppError::param_error("passwords do not match"));
        }
    }
    Ok(())
}

pub fn to_user_dto(model: user::Model) -> UserDto {
    UserDto {
        id: model.id,
        email: model.email,
        display_name: model.display_name,
        role: model.role,
        avatar_url: model.avatar_url,
        sex: model.sex,
        birth_year: model.birth_year,
        height_cm: model.height_cm,
        weight_kg: model.weight_kg,
        activity_level: model.activity_level,
        created: model.created.map(to_rfc3339),
        updated: model.updated.map(to_rfc3339),
    }
}
