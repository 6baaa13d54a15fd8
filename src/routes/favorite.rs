use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::favorite::{self, ItemKind};
use crate::response::ok;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/toggle").route(web::post().to(toggle)))
        .service(web::resource("/list").route(web::post().to(list)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleRequest {
    kind: ItemKind,
    item_id: String,
}

#[derive(Deserialize)]
struct ListRequest {
    kind: ItemKind,
}

async fn toggle(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<ToggleRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = favorite::toggle(db.get_ref(), &auth.principal(), payload.kind, &payload.item_id).await?;
    Ok(ok(outcome))
}

async fn list(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<ListRequest>,
) -> Result<HttpResponse, AppError> {
    let ids = favorite::list(db.get_ref(), &auth.principal(), payload.kind).await?;
    Ok(ok(ids))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::AppConfig;
    use crate::db::testing::memory_db;
    use crate::favorite::tests::seed_article;
    use crate::routes::testing::create_user;

    #[actix_rt::test]
    async fn toggle_requires_login_and_valid_kind() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let id = seed_article(&db, 0).await;

        let res = post_json!(&app, "/api/favorite/toggle", None, json!({"kind": "ARTICLE", "itemId": id.to_string()})).await;
        assert_eq!(res["code"], 3);

        let (_, token) = create_user(&db, &config, "u@example.com", false).await;
        let res = post_json!(&app, "/api/favorite/toggle", Some(token.as_str()), json!({"kind": "RECIPE", "itemId": "1"})).await;
        assert_eq!(res["code"], 1);
    }

    #[actix_rt::test]
    async fn toggle_twice_round_trips() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let id = seed_article(&db, 3).await.to_string();
        let (_, token) = create_user(&db, &config, "u@example.com", false).await;

        let on = post_json!(&app, "/api/favorite/toggle", Some(token.as_str()), json!({"kind": "ARTICLE", "itemId": id})).await;
        assert_eq!(on["data"], json!({"itemId": id, "kind": "ARTICLE", "favorited": true, "likeCount": 4}));

        let listed = post_json!(&app, "/api/favorite/list", Some(token.as_str()), json!({"kind": "ARTICLE"})).await;
        assert_eq!(listed["data"], json!([id]));

        let off = post_json!(&app, "/api/favorite/toggle", Some(token.as_str()), json!({"kind": "ARTICLE", "itemId": id})).await;
        assert_eq!(off["data"]["favorited"], false);
        assert_eq!(off["data"]["likeCount"], 3);
    }

    #[actix_rt::test]
    async fn diary_favorites_stay_with_owner() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let (_, owner) = create_user(&db, &config, "owner@example.com", false).await;
        let (_, other) = create_user(&db, &config, "other@example.com", false).await;

        let res = post_json!(&app, "/api/diary/save", Some(owner.as_str()), json!({
            "eatenOn": "2026-03-07",
            "meal": "LUNCH",
            "foodName": "Lentil soup",
            "calories": 410
        }))
        .await;
        let entry = res["data"]["id"].as_i64().unwrap().to_string();

        let res = post_json!(&app, "/api/favorite/toggle", Some(other.as_str()), json!({"kind": "DIARY", "itemId": entry})).await;
        assert_eq!(res["code"], 5);
        let listed = post_json!(&app, "/api/favorite/list", Some(other.as_str()), json!({"kind": "DIARY"})).await;
        assert_eq!(listed["data"], json!([]));

        let res = post_json!(&app, "/api/favorite/toggle", Some(owner.as_str()), json!({"kind": "DIARY", "itemId": entry})).await;
        assert_eq!(res["data"]["favorited"], true);
        assert_eq!(res["data"]["likeCount"], 1);
    }
}
