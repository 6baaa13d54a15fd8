use log::info;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema, Set,
};
use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::config::AppConfig;
use crate::entity::{
    article, diary_entry, exercise_log, favorite_mark, menu, password_reset, report_record,
    resource, sys_config, user,
};

/// Flags seeded into `t_sys_config` as `(key, default_value)`.
const DEFAULT_FLAGS: [(&str, &str); 5] = [
    ("OPEN_REGISTER", "true"),
    ("OPEN_LIKE", "true"),
    ("OPEN_REPORT", "true"),
    ("STORAGE_TYPE", "LOCAL"),
    ("AWSS3_PARAM", "{}"),
];

pub async fn connect_db(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    ensure_sqlite_path(config);
    let url = config.database_url();
    let db = Database::connect(&url).await?;
    init_schema(&db).await?;
    seed_flags(&db).await?;
    info!("database ready at {}", url);
    Ok(db)
}

fn ensure_sqlite_path(config: &AppConfig) {
    let raw = config.database_url();
    if !raw.starts_with("sqlite:") || raw.contains(":memory:") {
        return;
    }
    let path = raw
        .strip_prefix("sqlite://")
        .or_else(|| raw.strip_prefix("sqlite:"))
        .unwrap_or(raw.as_str());
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _ = OpenOptions::new().create(true).write(true).open(path);
}

pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmts = vec![
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(article::Entity),
        schema.create_table_from_entity(menu::Entity),
        schema.create_table_from_entity(diary_entry::Entity),
        schema.create_table_from_entity(exercise_log::Entity),
        schema.create_table_from_entity(favorite_mark::Entity),
        schema.create_table_from_entity(report_record::Entity),
        schema.create_table_from_entity(resource::Entity),
        schema.create_table_from_entity(password_reset::Entity),
        schema.create_table_from_entity(sys_config::Entity),
    ];
    for stmt in stmts.iter_mut() {
        stmt.if_not_exists();
        db.execute(backend.build(&*stmt)).await?;
    }
    Ok(())
}

async fn seed_flags(db: &DatabaseConnection) -> Result<(), DbErr> {
    for (key, default_value) in DEFAULT_FLAGS {
        let exists = sys_config::Entity::find_by_id(key.to_string())
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }
        let active = sys_config::ActiveModel {
            key: Set(key.to_string()),
            value: Set(None),
            default_value: Set(Some(default_value.to_string())),
        };
        sys_config::Entity::insert(active).exec(db).await?;
    }
    Ok(())
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use sea_orm::ConnectOptions;

    /// Fresh in-memory database with schema and default flags.
    pub async fn memory_db() -> DatabaseConnection {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .expect("open in-memory sqlite");
        init_schema(&db).await.expect("create schema");
        seed_flags(&db).await.expect("seed flags");
        db
    }
}
