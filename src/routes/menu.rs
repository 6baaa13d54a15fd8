use actix_web::{web, HttpResponse};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::entity::menu;
use crate::error::{db_error, map_tx_error, AppError};
use crate::favorite::{self, ItemKind};
use crate::local_state::LocalFavorites;
use crate::response::{ok, ok_empty};
use crate::routes::{ensure_owner, to_rfc3339};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/save").route(web::post().to(save)))
        .service(web::resource("/update").route(web::post().to(update)))
        .service(web::resource("/remove").route(web::post().to(remove)))
        .service(web::resource("/list").route(web::post().to(list)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveMenuRequest {
    id: Option<i32>,
    name: Option<String>,
    description: Option<String>,
    calories: Option<i32>,
    cover_public_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMenuRequest {
    user_id: Option<i32>,
    max_calories: Option<i32>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MenuDto {
    id: i32,
    user_id: i32,
    name: String,
    description: Option<String>,
    calories: Option<i32>,
    cover_public_id: Option<String>,
    like_count: i32,
    favorited: bool,
    created: Option<String>,
    updated: Option<String>,
}

async fn save(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SaveMenuRequest>,
) -> Result<HttpResponse, AppError> {
    let name = payload.name.clone().unwrap_or_default();
    if name.trim().is_empty() {
        return Err(AppError::param_error("name cannot be blank"));
    }
    check_calories(payload.calories)?;
    let now = Utc::now();
    let saved = menu::ActiveModel {
        user_id: Set(auth.user_id),
        name: Set(name.trim().to_string()),
        description: Set(payload.description.clone()),
        calories: Set(payload.calories),
        cover_public_id: Set(payload.cover_public_id.clone()),
        like_count: Set(0),
        created: Set(Some(now)),
        updated: Set(Some(now)),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await
    .map_err(db_error("insert menu"))?;
    Ok(ok(to_dto(saved, false)))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SaveMenuRequest>,
) -> Result<HttpResponse, AppError> {
    let id = payload.id.ok_or_else(|| AppError::param_error("id cannot be null"))?;
    let existing = find_menu(&db, id).await?;
    ensure_owner(existing.user_id, &auth, false)?;
    check_calories(payload.calories)?;

    let mut active: menu::ActiveModel = existing.into();
    if let Some(name) = payload.name.clone() {
        if name.trim().is_empty() {
            return Err(AppError::param_error("name cannot be blank"));
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(v) = payload.description.clone() {
        active.description = Set(Some(v));
    }
    if let Some(v) = payload.calories {
        active.calories = Set(Some(v));
    }
    if let Some(v) = payload.cover_public_id.clone() {
        active.cover_public_id = Set(Some(v));
    }
    active.updated = Set(Some(Utc::now()));
    let saved = active.update(db.get_ref()).await.map_err(db_error("update menu"))?;
    let favorited = favorite::list(db.get_ref(), &auth.principal(), ItemKind::Menu)
        .await?
        .contains(&saved.id.to_string());
    Ok(ok(to_dto(saved, favorited)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    let existing = find_menu(&db, query.id).await?;
    ensure_owner(existing.user_id, &auth, true)?;

    let id = existing.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            menu::Entity::delete_by_id(id)
                .exec(txn)
                .await
                .map_err(db_error("delete menu"))?;
            favorite::purge_item(txn, ItemKind::Menu, &id.to_string()).await?;
            Ok(())
        })
    })
    .await
    .map_err(map_tx_error)?;
    Ok(ok_empty())
}

async fn list(
    db: web::Data<DatabaseConnection>,
    auth: OptionalAuthUser,
    payload: web::Json<ListMenuRequest>,
) -> Result<HttpResponse, AppError> {
    let mut view = LocalFavorites::new();
    if let Some(auth) = &auth.0 {
        view.refresh(favorite::list(db.get_ref(), &auth.principal(), ItemKind::Menu).await?);
    }

    let mut select = menu::Entity::find().order_by_desc(menu::Column::Created);
    if let Some(user_id) = payload.user_id {
        select = select.filter(menu::Column::UserId.eq(user_id));
    }
    if let Some(max) = payload.max_calories {
        select = select.filter(menu::Column::Calories.lte(max));
    }
    let rows = select.all(db.get_ref()).await.map_err(db_error("list menus"))?;
    let items: Vec<MenuDto> = rows
        .into_iter()
        .map(|row| {
            let favorited = view.is_favorited(&row.id.to_string());
            to_dto(row, favorited)
        })
        .collect();
    Ok(ok(items))
}

fn check_calories(calories: Option<i32>) -> Result<(), AppError> {
    if calories.map_or(false, |c| c < 0) {
        return Err(AppError::param_error("calories cannot be negative"));
    }
    Ok(())
}

async fn find_menu(db: &DatabaseConnection, id: i32) -> Result<menu::Model, AppError> {
    menu::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error("find menu"))?
        .ok_or_else(|| AppError::fail("menu not found"))
}

fn to_dto(model: menu::Model, favorited: bool) -> MenuDto {
    MenuDto {
        id: model.id,
        user_id: model.user_id,
        name: model.name,
        description: model.description,
        calories: model.calories,
        cover_public_id: model.cover_public_id,
        like_count: model.like_count,
        favorited,
        created: model.created.map(to_rfc3339),
        updated: model.updated.map(to_rfc3339),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::AppConfig;
    use crate::db::testing::memory_db;
    use crate::routes::testing::create_user;

    #[actix_rt::test]
    async fn menus_filter_by_calories() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let (_, token) = create_user(&db, &config, "chef@example.com", false).await;

        let res = post_json!(&app, "/api/menu/save", Some(token.as_str()), json!({"name": "Soup", "calories": -5})).await;
        assert_eq!(res["code"], 1);

        post_json!(&app, "/api/menu/save", Some(token.as_str()), json!({"name": "Soup", "calories": 250})).await;
        let res = post_json!(&app, "/api/menu/save", Some(token.as_str()), json!({"name": "Lasagna", "calories": 900})).await;
        let lasagna = res["data"]["id"].as_i64().unwrap();

        let res = post_json!(&app, "/api/menu/list", None, json!({"maxCalories": 500})).await;
        assert_eq!(res["data"].as_array().unwrap().len(), 1);
        assert_eq!(res["data"][0]["name"], "Soup");

        post_json!(&app, "/api/favorite/toggle", Some(token.as_str()), json!({"kind": "MENU", "itemId": lasagna.to_string()})).await;
        let res = post_json!(&app, "/api/menu/list", Some(token.as_str()), json!({})).await;
        let favorited: Vec<bool> = res["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["favorited"].as_bool().unwrap())
            .collect();
        assert_eq!(favorited.iter().filter(|f| **f).count(), 1);

        let res = post_json!(&app, "/api/menu/update", Some(token.as_str()), json!({"id": lasagna, "calories": 850})).await;
        assert_eq!(res["data"]["calories"], 850);
        assert_eq!(res["data"]["likeCount"], 1);
    }
}
