use actix_web::{web, HttpResponse};
use chrono::{Datelike, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::entity::user;
use crate::error::{db_error, AppError};
use crate::health::{
    blood_pressure_category, bmi, bmi_category, daily_calories, round1, ActivityLevel,
    BloodPressureCategory, BmiCategory, Sex,
};
use crate::response::ok;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/bmi").route(web::post().to(bmi_handler)))
        .service(web::resource("/bloodPressure").route(web::post().to(blood_pressure)))
        .service(web::resource("/calories").route(web::post().to(calories)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BmiRequest {
    weight_kg: Option<f64>,
    height_cm: Option<f64>,
}

#[derive(Deserialize)]
struct BloodPressureRequest {
    systolic: i32,
    diastolic: i32,
}

#[derive(Serialize)]
struct BmiResponse {
    bmi: f64,
    category: BmiCategory,
}

#[derive(Serialize)]
struct BloodPressureResponse {
    category: BloodPressureCategory,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CaloriesResponse {
    activity_level: ActivityLevel,
    daily_calories: f64,
}

/// Uses the request values first and the caller's stored profile for any
/// value left out.
async fn bmi_handler(
    db: web::Data<DatabaseConnection>,
    auth: OptionalAuthUser,
    payload: web::Json<BmiRequest>,
) -> Result<HttpResponse, AppError> {
    let mut weight = payload.weight_kg;
    let mut height = payload.height_cm;
    if weight.is_none() || height.is_none() {
        if let Some(auth) = &auth.0 {
            let profile = load_profile(&db, auth.user_id).await?;
            weight = weight.or(profile.weight_kg);
            height = height.or(profile.height_cm);
        }
    }
    let (weight, height) = match (weight, height) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(AppError::param_error("weightKg and heightCm are required")),
    };
    let value = bmi(weight, height)?;
    Ok(ok(BmiResponse {
        bmi: round1(value),
        category: bmi_category(value),
    }))
}

async fn blood_pressure(payload: web::Json<BloodPressureRequest>) -> Result<HttpResponse, AppError> {
    let category = blood_pressure_category(payload.systolic, payload.diastolic)?;
    Ok(ok(BloodPressureResponse { category }))
}

async fn calories(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    let profile = load_profile(&db, auth.user_id).await?;
    let incomplete = || AppError::fail("complete your profile first");

    let sex = profile.sex.as_deref().and_then(Sex::parse).ok_or_else(incomplete)?;
    let birth_year = profile.birth_year.ok_or_else(incomplete)?;
    let weight = profile.weight_kg.ok_or_else(incomplete)?;
    let height = profile.height_cm.ok_or_else(incomplete)?;
    let level = profile
        .activity_level
        .as_deref()
        .and_then(ActivityLevel::parse)
        .unwrap_or(ActivityLevel::Sedentary);

    let age = Utc::now().year() - birth_year;
    let value = daily_calories(sex, age, weight, height, level)?;
    Ok(ok(CaloriesResponse {
        activity_level: level,
        daily_calories: value.round(),
    }))
}

async fn load_profile(db: &DatabaseConnection, user_id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(db_error("load profile"))?
        .ok_or_else(AppError::need_login)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Utc};
    use serde_json::json;

    use crate::config::AppConfig;
    use crate::db::testing::memory_db;
    use crate::routes::testing::create_user;

    #[actix_rt::test]
    async fn bmi_from_body_or_profile() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);

        let res = post_json!(&app, "/api/health/bmi", None, json!({"weightKg": 70.0, "heightCm": 175.0})).await;
        assert_eq!(res["data"], json!({"bmi": 22.9, "category": "NORMAL"}));

        let res = post_json!(&app, "/api/health/bmi", None, json!({"weightKg": 70.0})).await;
        assert_eq!(res["code"], 1);

        let (_, token) = create_user(&db, &config, "p@example.com", false).await;
        post_json!(&app, "/api/user/update", Some(token.as_str()), json!({"heightCm": 160.0, "weightKg": 80.0})).await;
        let res = post_json!(&app, "/api/health/bmi", Some(token.as_str()), json!({})).await;
        assert_eq!(res["data"]["category"], "OBESE");
    }

    #[actix_rt::test]
    async fn blood_pressure_classification() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);

        let res = post_json!(&app, "/api/health/bloodPressure", None, json!({"systolic": 128, "diastolic": 76})).await;
        assert_eq!(res["data"]["category"], "ELEVATED");
        let res = post_json!(&app, "/api/health/bloodPressure", None, json!({"systolic": 60, "diastolic": 90})).await;
        assert_eq!(res["code"], 1);
    }

    #[actix_rt::test]
    async fn calories_need_complete_profile() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let app = test_app!(db, config);
        let (_, token) = create_user(&db, &config, "c@example.com", false).await;

        let res = post_json!(&app, "/api/health/calories", Some(token.as_str()), json!({})).await;
        assert_eq!(res["msg"], "complete your profile first");

        let birth_year = Utc::now().year() - 30;
        post_json!(&app, "/api/user/update", Some(token.as_str()), json!({
            "sex": "MALE",
            "birthYear": birth_year,
            "heightCm": 180.0,
            "weightKg": 80.0,
            "activityLevel": "SEDENTARY"
        }))
        .await;
        let res = post_json!(&app, "/api/health/calories", Some(token.as_str()), json!({})).await;
        assert_eq!(res["data"]["dailyCalories"], 2136.0);
        assert_eq!(res["data"]["activityLevel"], "SEDENTARY");
    }
}
