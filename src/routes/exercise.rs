use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::entity::exercise_log;
use crate::error::{db_error, AppError};
use crate::health::{round1, track_distance_km, validate_point, GeoPoint};
use crate::response::{ok, ok_empty};
use crate::routes::{ensure_owner, to_rfc3339};

const MAX_TRACK_POINTS: usize = 20_000;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/save").route(web::post().to(save)))
        .service(web::resource("/list").route(web::post().to(list)))
        .service(web::resource("/remove").route(web::post().to(remove)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveExerciseRequest {
    kind: Option<String>,
    started: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
    #[serde(default)]
    track: Vec<GeoPoint>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExerciseListResponse {
    total_distance_km: f64,
    total_minutes: i64,
    items: Vec<ExerciseDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExerciseDto {
    id: i32,
    kind: String,
    started: Option<String>,
    duration_minutes: i32,
    distance_km: f64,
    track: Vec<GeoPoint>,
    created: Option<String>,
}

async fn save(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<SaveExerciseRequest>,
) -> Result<HttpResponse, AppError> {
    let kind = payload.kind.clone().unwrap_or_default();
    if kind.trim().is_empty() {
        return Err(AppError::param_error("kind cannot be blank"));
    }
    let duration = payload.duration_minutes.unwrap_or(0);
    if duration < 0 {
        return Err(AppError::param_error("durationMinutes cannot be negative"));
    }
    if payload.track.len() > MAX_TRACK_POINTS {
        return Err(AppError::param_error("track has too many points"));
    }
    for point in &payload.track {
        validate_point(point)?;
    }

    let distance = round1(track_distance_km(&payload.track));
    let track = if payload.track.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&payload.track).map_err(|_| AppError::system_exception())?)
    };

    let saved = exercise_log::ActiveModel {
        user_id: Set(auth.user_id),
        kind: Set(kind.trim().to_uppercase()),
        started: Set(payload.started),
        duration_minutes: Set(duration),
        track: Set(track),
        distance_km: Set(distance),
        created: Set(Some(Utc::now())),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await
    .map_err(db_error("insert exercise log"))?;
    Ok(ok(to_dto(saved)))
}

async fn list(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    let rows = exercise_log::Entity::find()
        .filter(exercise_log::Column::UserId.eq(auth.user_id))
        .order_by_desc(exercise_log::Column::Created)
        .all(db.get_ref())
        .await
        .map_err(db_error("list exercise logs"))?;

    let total_distance_km = round1(rows.iter().map(|r| r.distance_km).sum());
    let total_minutes = rows.iter().map(|r| r.duration_minutes as i64).sum();
    let items = rows.into_iter().map(to_dto).collect();
    Ok(ok(ExerciseListResponse {
        total_distance_km,
        total_minutes,
        items,
    }))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    let existing = exercise_log::Entity::find_by_id(query.id)
        .one(db.get_ref())
        .await
        .map_err(db_error("find exercise log"))?
        .ok_or_else(|| AppError::fail("exercise log not found"))?;
    ensure_owner(existing.user_id, &auth, false)?;
    exercise_log::Entity::delete_by_id(existing.id)
        .exec(db.get_ref())
        .await
        .map_err(db_error("delete exercise log"))?;
    Ok(ok_empty())
}

fn to_dto(model: exercise_log::Model) -> ExerciseDto {
    let track = model
        .track
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();
    ExerciseDto {
        id: model.id,
        kind: model.kind,
        started: model.started.map(to_rfc3339),
        duration_minutes: model.duration_minutes,
        distance_km: model.distance_km,
        track,
        created: model.created.map(to_rfc3339),
    }
}
