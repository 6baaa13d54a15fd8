use actix_web::web;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::auth::AuthUser;
use crate::error::AppError;

#[cfg(test)]
macro_rules! test_app {
    ($db:expr, $config:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($config.clone()))
                .app_data(actix_web::web::Data::new($db.clone()))
                .app_data(
                    actix_web::web::JsonConfig::default()
                        .error_handler(crate::response::json_error_handler),
                )
                .configure(crate::routes::configure),
        )
        .await
    };
}

/// POSTs a JSON body (with an optional token header) and returns the parsed envelope.
#[cfg(test)]
macro_rules! post_json {
    ($app:expr, $uri:expr, $token:expr, $body:expr) => {
        async {
            let mut req = actix_web::test::TestRequest::post().uri($uri).set_json($body);
            let token: Option<&str> = $token;
            if let Some(token) = token {
                req = req.insert_header(("token", token.to_string()));
            }
            let value: serde_json::Value =
                actix_web::test::call_and_read_body_json($app, req.to_request()).await;
            value
        }
    };
}

pub mod article;
pub mod cors;
pub mod diary;
pub mod exercise;
pub mod favorite;
pub mod health;
pub mod menu;
pub mod report;
pub mod resource;
pub mod user;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::scope("/user").configure(user::config))
            .service(web::scope("/article").configure(article::config))
            .service(web::scope("/menu").configure(menu::config))
            .service(web::scope("/diary").configure(diary::config))
            .service(web::scope("/exercise").configure(exercise::config))
            .service(web::scope("/favorite").configure(favorite::config))
            .service(web::scope("/report").configure(report::config))
            .service(web::scope("/health").configure(health::config))
            .service(web::scope("/resource").configure(resource::config)),
    );
}

pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Owners may change their own documents; moderators may remove any.
pub fn ensure_owner(owner_id: i32, auth: &AuthUser, allow_moderator: bool) -> Result<(), AppError> {
    if owner_id == auth.user_id || (allow_moderator && auth.is_moderator()) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

/// Normalizes 1-based paging input to `(page_index, page_size)`.
pub fn page_params(page: Option<u64>, size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let size = size.unwrap_or(20).clamp(1, 100);
    (page - 1, size)
}
