use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::entity::diary_entry;
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum Meal {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl Meal {
    fn as_str(&self) -> &'static str {
        match self {
            Meal::Breakfast => "BREAKFAST",
            Meal::Lunch => "LUNCH",
            Meal::Dinner => "DINNER",
            Meal::Snack => "SNACK",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveEntryRequest {
    id: Option<i32>,
    eaten_on: Option<String>,
    meal: Option<Meal>,
    food_name: Option<String>,
    calories: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntryRequest {
    eaten_on: String,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DayResponse {
    eaten_on: String,
    total_calories: i64,
    items: Vec<EntryDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryDto {
    id: i32,
    eaten_on: String,
    meal: String,
    food_name: String,
    calories: i32,
    like_count: i32,
    favorited: bool,
    created: Option<String>,
    updated: Option<String>,
}

async fn save(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SaveEntryRequest>,
) -> Result<HttpResponse, AppError> {
    let eaten_on = parse_day(payload.eaten_on.as_deref().unwrap_or_default())?;
    let meal = payload.meal.ok_or_else(|| AppError::param_error("meal cannot be null"))?;
    let food_name = payload.food_name.clone().unwrap_or_default();
    if food_name.trim().is_empty() {
        return Err(AppError::param_error("foodName cannot be blank"));
    }
    let calories = payload.calories.unwrap_or(0);
    if calories < 0 {
        return Err(AppError::param_error("calories cannot be negative"));
    }

    let now = Utc::now();
    let saved = diary_entry::ActiveModel {
        user_id: Set(auth.user_id),
        eaten_on: Set(eaten_on),
        meal: Set(meal.as_str().to_string()),
        food_name: Set(food_name.trim().to_string()),
        calories: Set(calories),
        like_count: Set(0),
        created: Set(Some(now)),
        updated: Set(Some(now)),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await
    .map_err(db_error("insert diary entry"))?;
    Ok(ok(to_dto(saved, false)))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SaveEntryRequest>,
) -> Result<HttpResponse, AppError> {
    let id = payload.id.ok_or_else(|| AppError::param_error("id cannot be null"))?;
    let existing = find_entry(&db, id).await?;
    ensure_owner(existing.user_id, &auth, false)?;

    let mut active: diary_entry::ActiveModel = existing.into();
    if let Some(day) = payload.eaten_on.as_deref() {
        active.eaten_on = Set(parse_day(day)?);
    }
    if let Some(meal) = payload.meal {
        active.meal = Set(meal.as_str().to_string());
    }
    if let Some(name) = payload.food_name.clone() {
        if name.trim().is_empty() {
            return Err(AppError::param_error("foodName cannot be blank"));
        }
        active.food_name = Set(name.trim().to_string());
    }
    if let Some(calories) = payload.calories {
        if calories < 0 {
            return Err(AppError::param_error("calories cannot be negative"));
        }
        active.calories = Set(calories);
    }
    active.updated = Set(Some(Utc::now()));
    let saved = active
        .update(db.get_ref())
        .await
        .map_err(db_error("update diary entry"))?;
    let favorited = favorite::list(db.get_ref(), &auth.principal(), ItemKind::Diary)
        .await?
        .contains(&saved.id.to_string());
    Ok(ok(to_dto(saved, favorited)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    let existing = find_entry(&db, query.id).await?;
    ensure_owner(existing.user_id, &auth, false)?;

    let id = existing.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            diary_entry::Entity::delete_by_id(id)
                .exec(txn)
                .await
                .map_err(db_error("delete diary entry"))?;
            favorite::purge_item(txn, ItemKind::Diary, &id.to_string()).await?;
            Ok(())
        })
    })
    .await
    .map_err(map_tx_error)?;
    Ok(ok_empty())
}

async fn list(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<ListEntryRequest>,
) -> Result<HttpResponse, AppError> {
    let eaten_on = parse_day(&payload.eaten_on)?;
    let mut view = LocalFavorites::new();
    view.refresh(favorite::list(db.get_ref(), &auth.principal(), ItemKind::Diary).await?);

    let rows = diary_entry::Entity::find()
        .filter(diary_entry::Column::UserId.eq(auth.user_id))
        .filter(diary_entry::Column::EatenOn.eq(eaten_on.clone()))
        .order_by_asc(diary_entry::Column::Created)
        .order_by_asc(diary_entry::Column::Id)
        .all(db.get_ref())
        .await
        .map_err(db_error("list diary entries"))?;

    let total_calories = rows.iter().map(|r| r.calories as i64).sum();
    let items = rows
        .into_iter()
        .map(|row| {
            let favorited = view.is_favorited(&row.id.to_string());
            to_dto(row, favorited)
        })
        .collect();

    Ok(ok(DayResponse {
        eaten_on,
        total_calories,
        items,
    }))
}

fn parse_day(raw: &str) -> Result<String, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| AppError::param_error("date must be YYYY-MM-DD"))
}

async fn find_entry(db: &DatabaseConnection, id: i32) -> Result<diary_entry::Model, AppError> {
    diary_entry::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error("find diary entry"))?
        .ok_or_else(|| AppError::fail("diary entry not found"))
}

fn to_dto(model: diary_entry::Model, favorited: bool) -> EntryDto {
    EntryDto {
        id: model.id,
        eaten_on: model.eaten_on,
        meal: model.meal,
        food_name: model.food_name,
        calories: model.calories,
        like_count: model.like_count,
        favorited,
        created: model.created.map(to_rfc3339),
        updated: model.updated.map(to_rfc3339),
    }
}
