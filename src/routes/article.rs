use actix_web::{web, HttpResponse};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::entity::article;
use crate::error::{db_error, map_tx_error, AppError};
use crate::favorite::{self, ItemKind};
use crate::local_state::LocalFavorites;
use crate::response::{ok, ok_empty};
use crate::routes::{ensure_owner, page_params, to_rfc3339};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/save").route(web::post().to(save)))
        .service(web::resource("/update").route(web::post().to(update)))
        .service(web::resource("/remove").route(web::post().to(remove)))
        .service(web::resource("/list").route(web::post().to(list)))
        .service(web::resource("/{id:\\d+}").route(web::post().to(get)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveArticleRequest {
    title: Option<String>,
    content: Option<String>,
    cover_public_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateArticleRequest {
    id: i32,
    title: Option<String>,
    content: Option<String>,
    cover_public_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListArticleRequest {
    page: Option<u64>,
    size: Option<u64>,
    user_id: Option<i32>,
    favorited_only: Option<bool>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListArticleResponse {
    items: Vec<ArticleDto>,
    total: u64,
    total_page: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArticleDto {
    id: i32,
    user_id: i32,
    title: String,
    content: Option<String>,
    cover_public_id: Option<String>,
    like_count: i32,
    favorited: bool,
    created: Option<String>,
    updated: Option<String>,
}

async fn save(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SaveArticleRequest>,
) -> Result<HttpResponse, AppError> {
    let title = payload.title.clone().unwrap_or_default();
    if title.trim().is_empty() {
        return Err(AppError::param_error("title cannot be blank"));
    }
    let now = Utc::now();
    let saved = article::ActiveModel {
        user_id: Set(auth.user_id),
        title: Set(title.trim().to_string()),
        content: Set(payload.content.clone()),
        cover_public_id: Set(payload.cover_public_id.clone()),
        like_count: Set(0),
        created: Set(Some(now)),
        updated: Set(Some(now)),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await
    .map_err(db_error("insert article"))?;

    Ok(ok(to_dto(saved, false)))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<UpdateArticleRequest>,
) -> Result<HttpResponse, AppError> {
    let existing = find_article(&db, payload.id).await?;
    ensure_owner(existing.user_id, &auth, false)?;

    let mut active: article::ActiveModel = existing.into();
    if let Some(title) = payload.title.clone() {
        if title.trim().is_empty() {
            return Err(AppError::param_error("title cannot be blank"));
        }
        active.title = Set(title.trim().to_string());
    }
    if let Some(content) = payload.content.clone() {
        active.content = Set(Some(content));
    }
    if let Some(cover) = payload.cover_public_id.clone() {
        active.cover_public_id = Set(Some(cover));
    }
    active.updated = Set(Some(Utc::now()));
    let saved = active
        .update(db.get_ref())
        .await
        .map_err(db_error("update article"))?;

    let favorited = favorite::list(db.get_ref(), &auth.principal(), ItemKind::Article)
        .await?
        .contains(&saved.id.to_string());
    Ok(ok(to_dto(saved, favorited)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    let existing = find_article(&db, query.id).await?;
    ensure_owner(existing.user_id, &auth, true)?;

    let id = existing.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            article::Entity::delete_by_id(id)
                .exec(txn)
                .await
                .map_err(db_error("delete article"))?;
            favorite::purge_item(txn, ItemKind::Article, &id.to_string()).await?;
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
    payload: web::Json<ListArticleRequest>,
) -> Result<HttpResponse, AppError> {
    let (page, size) = page_params(payload.page, payload.size);

    let favorited_ids = match &auth.0 {
        Some(auth) => favorite::list(db.get_ref(), &auth.principal(), ItemKind::Article).await?,
        None => Vec::new(),
    };
    let mut view = LocalFavorites::new();
    view.refresh(favorited_ids.iter().cloned());

    let mut select = article::Entity::find().order_by_desc(article::Column::Created);
    if let Some(user_id) = payload.user_id {
        select = select.filter(article::Column::UserId.eq(user_id));
    }
    if payload.favorited_only.unwrap_or(false) {
        if auth.0.is_none() {
            return Err(AppError::need_login());
        }
        let ids: Vec<i32> = favorited_ids.iter().filter_map(|id| id.parse().ok()).collect();
        select = select.filter(article::Column::Id.is_in(ids));
    }

    let paginator = select.paginate(db.get_ref(), size);
    let total = paginator.num_items().await.map_err(db_error("count articles"))?;
    let rows = paginator.fetch_page(page).await.map_err(db_error("list articles"))?;

    let items = rows
        .into_iter()
        .map(|row| {
            view.set_count(row.id.to_string(), row.like_count);
            let favorited = view.is_favorited(&row.id.to_string());
            to_dto(row, favorited)
        })
        .collect();

    Ok(ok(ListArticleResponse {
        items,
        total,
        total_page: total.div_ceil(size),
    }))
}

async fn get(
    db: web::Data<DatabaseConnection>,
    auth: OptionalAuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let found = find_article(&db, *path).await?;
    let favorited = match &auth.0 {
        Some(auth) => favorite::list(db.get_ref(), &auth.principal(), ItemKind::Article)
            .await?
            .contains(&found.id.to_string()),
        None => false,
    };
    Ok(ok(to_dto(found, favorited)))
}

async fn find_article(db: &DatabaseConnection, id: i32) -> Result<article::Model, AppError> {
    article::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error("find article"))?
        .ok_or_else(|| AppError::fail("article not found"))
}

fn to_dto(model: article::Model, favorited: bool) -> ArticleDto {
    ArticleDto {
        id: model.id,
        user_id: model.user_id,
        title: model.title,
        content: model.content,
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
    async fn author_flow_with_favorites() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let (_, author) = create_user(&db, &config, "author@example.com", false).await;
        let (_, reader) = create_user(&db, &config, "reader@example.com", false).await;

        let res = post_json!(&app, "/api/article/save", Some(author.as_str()), json!({"title": "  "})).await;
        assert_eq!(res["code"], 1);

        let res = post_json!(&app, "/api/article/save", Some(author.as_str()), json!({
            "title": "Walking after meals",
            "content": "Ten minutes helps."
        }))
        .await;
        assert_eq!(res["code"], 0);
        let id = res["data"]["id"].as_i64().unwrap();

        let res = post_json!(&app, "/api/favorite/toggle", Some(reader.as_str()), json!({
            "kind": "ARTICLE",
            "itemId": id.to_string()
        }))
        .await;
        assert_eq!(res["data"]["favorited"], true);

        let res = post_json!(&app, "/api/article/list", Some(reader.as_str()), json!({})).await;
        assert_eq!(res["data"]["total"], 1);
        assert_eq!(res["data"]["items"][0]["favorited"], true);
        assert_eq!(res["data"]["items"][0]["likeCount"], 1);

        let res = post_json!(&app, "/api/article/list", None, json!({})).await;
        assert_eq!(res["data"]["items"][0]["favorited"], false);

        let res = post_json!(&app, "/api/article/list", Some(author.as_str()), json!({"favoritedOnly": true})).await;
        assert_eq!(res["data"]["total"], 0);

        post_json!(&app, "/api/article/save", Some(author.as_str()), json!({"title": "Second post"})).await;
        let res = post_json!(&app, "/api/article/list", Some(reader.as_str()), json!({"favoritedOnly": true})).await;
        assert_eq!(res["data"]["total"], 1);
        assert_eq!(res["data"]["items"][0]["id"], id);
        assert_eq!(res["data"]["items"][0]["favorited"], true);

        let res = post_json!(&app, "/api/article/update", Some(reader.as_str()), json!({"id": id, "title": "mine now"})).await;
        assert_eq!(res["code"], 5);

        let res = post_json!(&app, "/api/article/update", Some(author.as_str()), json!({"id": id, "title": "Walk after meals"})).await;
        assert_eq!(res["data"]["title"], "Walk after meals");

        let uri = format!("/api/article/remove?id={}", id);
        let res = post_json!(&app, &uri, Some(author.as_str()), json!({})).await;
        assert_eq!(res["code"], 0);

        let res = post_json!(&app, "/api/favorite/list", Some(reader.as_str()), json!({"kind": "ARTICLE"})).await;
        assert_eq!(res["data"], json!([]));
    }
}
