use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};

use crate::entity::sys_config;

pub const OPEN_REGISTER: &str = "OPEN_REGISTER";
pub const OPEN_LIKE: &str = "OPEN_LIKE";
pub const OPEN_REPORT: &str = "OPEN_REPORT";
pub const STORAGE_TYPE: &str = "STORAGE_TYPE";
pub const AWSS3_PARAM: &str = "AWSS3_PARAM";

pub async fn get_string<C: ConnectionTrait>(db: &C, key: &str) -> Result<Option<String>, sea_orm::DbErr> {
    let config = sys_config::Entity::find_by_id(key.to_string())
        .one(db)
        .await?;
    Ok(config.map(|c| {
        if let Some(value) = c.value {
            if !value.is_empty() {
                return value;
            }
        }
        c.default_value.unwrap_or_default()
    }))
}

pub async fn get_boolean<C: ConnectionTrait>(db: &C, key: &str) -> Result<bool, sea_orm::DbErr> {
    let value = get_string(db, key).await?;
    Ok(value.unwrap_or_default().to_lowercase() == "true")
}

pub async fn set_string<C: ConnectionTrait>(db: &C, key: &str, value: &str) -> Result<(), sea_orm::DbErr> {
    let existing = sys_config::Entity::find_by_id(key.to_string()).one(db).await?;
    match existing {
        Some(model) => {
            let mut active: sys_config::ActiveModel = model.into();
            active.value = Set(Some(value.to_string()));
            active.update(db).await?;
        }
        None => {
            let active = sys_config::ActiveModel {
                key: Set(key.to_string()),
                value: Set(Some(value.to_string())),
                default_value: Set(None),
            };
            sys_config::Entity::insert(active).exec(db).await?;
        }
    }
    Ok(())
}
