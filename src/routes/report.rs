use std::collections::BTreeSet;

use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::auth::{require_moderator, AuthUser};
use crate::error::AppError;
use crate::report::{self, ReportReason};
use crate::response::{ok, ok_empty};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/submit").route(web::post().to(submit)))
        .service(web::resource("/list").route(web::post().to(list)))
        .service(web::resource("/remove").route(web::post().to(remove)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitReportRequest {
    article_id: i32,
    #[serde(default)]
    reasons: BTreeSet<ReportReason>,
    free_text: Option<String>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    key: String,
}

async fn submit(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SubmitReportRequest>,
) -> Result<HttpResponse, AppError> {
    let saved = report::submit(
        db.get_ref(),
        &auth.principal(),
        payload.article_id,
        &payload.reasons,
        payload.free_text.as_deref(),
    )
    .await?;
    Ok(ok(saved))
}

async fn list(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    require_moderator(&auth)?;
    Ok(ok(report::list(db.get_ref()).await?))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    require_moderator(&auth)?;
    if !report::remove(db.get_ref(), &query.key).await? {
        return Err(AppError::fail("report not found"));
    }
    Ok(ok_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::AppConfig;
    use crate::db::testing::memory_db;
    use crate::favorite::tests::seed_article;
    use crate::routes::testing::create_user;

    #[actix_rt::test]
    async fn submit_merge_and_moderate() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let article_id = seed_article(&db, 0).await;
        let (user_id, user) = create_user(&db, &config, "u@example.com", false).await;
        let (_, moderator) = create_user(&db, &config, "mod@example.com", true).await;

        let res = post_json!(&app, "/api/report/submit", Some(user.as_str()), json!({
            "articleId": article_id,
            "reasons": [],
            "freeText": ""
        }))
        .await;
        assert_eq!(res["code"], 1);
        assert_eq!(res["msg"], "no reason provided");

        post_json!(&app, "/api/report/submit", Some(user.as_str()), json!({
            "articleId": article_id,
            "reasons": ["SPAM"]
        }))
        .await;
        let res = post_json!(&app, "/api/report/submit", Some(user.as_str()), json!({
            "articleId": article_id,
            "reasons": ["OTHER"],
            "freeText": "copied from elsewhere"
        }))
        .await;
        assert_eq!(res["data"]["reasons"], json!(["OTHER", "SPAM"]));
        let key = format!("{}_{}", user_id, article_id);
        assert_eq!(res["data"]["key"], key);

        let res = post_json!(&app, "/api/report/list", Some(user.as_str()), json!({})).await;
        assert_eq!(res["code"], 5);

        let res = post_json!(&app, "/api/report/list", Some(moderator.as_str()), json!({})).await;
        assert_eq!(res["data"].as_array().unwrap().len(), 1);

        let uri = format!("/api/report/remove?key={}", key);
        let res = post_json!(&app, &uri, Some(moderator.as_str()), json!({})).await;
        assert_eq!(res["code"], 0);
        let res = post_json!(&app, &uri, Some(moderator.as_str()), json!({})).await;
        assert_eq!(res["msg"], "report not found");
    }
}
