use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Great-circle distance between two points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

pub fn track_distance_km(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

pub fn validate_point(p: &GeoPoint) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
        return Err(AppError::param_error("coordinate out of range"));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

pub fn bmi(weight_kg: f64, height_cm: f64) -> Result<f64, AppError> {
    if !(weight_kg > 0.0) || !(height_cm > 0.0) {
        return Err(AppError::param_error("weight and height must be positive"));
    }
    let height_m = height_cm / 100.0;
    Ok(weight_kg / (height_m * height_m))
}

pub fn bmi_category(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BloodPressureCategory {
    Normal,
    Elevated,
    Stage1,
    Stage2,
    Crisis,
}

pub fn blood_pressure_category(systolic: i32, diastolic: i32) -> Result<BloodPressureCategory, AppError> {
    if systolic <= 0 || diastolic <= 0 {
        return Err(AppError::param_error("blood pressure must be positive"));
    }
    if diastolic >= systolic {
        return Err(AppError::param_error("diastolic must be lower than systolic"));
    }
    let category = if systolic > 180 || diastolic > 120 {
        BloodPressureCategory::Crisis
    } else if systolic >= 140 || diastolic >= 90 {
        BloodPressureCategory::Stage2
    } else if systolic >= 130 || diastolic >= 80 {
        BloodPressureCategory::Stage1
    } else if systolic >= 120 {
        BloodPressureCategory::Elevated
    } else {
        BloodPressureCategory::Normal
    };
    Ok(category)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "SEDENTARY",
            ActivityLevel::Light => "LIGHT",
            ActivityLevel::Moderate => "MODERATE",
            ActivityLevel::Active => "ACTIVE",
            ActivityLevel::VeryActive => "VERY_ACTIVE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SEDENTARY" => Some(ActivityLevel::Sedentary),
            "LIGHT" => Some(ActivityLevel::Light),
            "MODERATE" => Some(ActivityLevel::Moderate),
            "ACTIVE" => Some(ActivityLevel::Active),
            "VERY_ACTIVE" => Some(ActivityLevel::VeryActive),
            _ => None,
        }
    }

    fn multiplier(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "MALE",
            Sex::Female => "FEMALE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "MALE" => Some(Sex::Male),
            "FEMALE" => Some(Sex::Female),
            _ => None,
        }
    }
}

/// Daily energy need in kcal: Mifflin-St Jeor resting rate scaled by activity.
pub fn daily_calories(
    sex: Sex,
    age_years: i32,
    weight_kg: f64,
    height_cm: f64,
    level: ActivityLevel,
) -> Result<f64, AppError> {
    if age_years <= 0 || !(weight_kg > 0.0) || !(height_cm > 0.0) {
        return Err(AppError::param_error("age, weight and height must be positive"));
    }
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * age_years as f64;
    let bmr = match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    };
    Ok(bmr * level.multiplier())
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
