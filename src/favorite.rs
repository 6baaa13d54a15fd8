//! Favorite marks on articles, menus and diary entries.
//!
//! A mark is a presence record keyed by `{user_id}_{item_id}`. Toggling
//! flips that presence and moves the item's `like_count` by one, both inside
//! one transaction so a failed write leaves neither side changed.

use chrono::Utc;
use log::debug;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entity::favorite_mark;
use crate::error::{db_error, map_tx_error, AppError};
use crate::sys_config as sys_config_store;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Article,
    Menu,
    Diary,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Article => "ARTICLE",
            ItemKind::Menu => "MENU",
            ItemKind::Diary => "DIARY",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            ItemKind::Article => "t_article",
            ItemKind::Menu => "t_menu",
            ItemKind::Diary => "t_diary_entry",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub item_id: String,
    pub kind: ItemKind,
    pub favorited: bool,
    pub like_count: i32,
}

pub fn composite_key(user_id: &str, item_id: &str) -> String {
    format!("{}_{}", user_id, item_id)
}

pub async fn toggle(
    db: &DatabaseConnection,
    user_id: &str,
    kind: ItemKind,
    item_id: &str,
) -> Result<ToggleOutcome, AppError> {
    let user_id = user_id.trim();
    let item_id = item_id.trim();
    if user_id.is_empty() {
        return Err(AppError::param_error("userId must not be empty"));
    }
    if item_id.is_empty() {
        return Err(AppError::param_error("itemId must not be empty"));
    }
    let numeric_id = item_id
        .parse::<i32>()
        .map_err(|_| AppError::param_error("itemId is not a valid id"))?;

    let open_like = sys_config_store::get_boolean(db, sys_config_store::OPEN_LIKE)
        .await
        .map_err(db_error("read OPEN_LIKE"))?;
    if !open_like {
        return Err(AppError::fail("favorites are disabled"));
    }

    let user_id = user_id.to_string();
    let item_id = item_id.to_string();
    db.transaction::<_, ToggleOutcome, AppError>(|txn| {
        Box::pin(async move {
            let owner_id = match load_item(txn, kind, numeric_id).await? {
                Some((owner_id, _)) => owner_id,
                None => return Err(AppError::fail("item not found")),
            };
            // diary entries are private to their owner
            if kind == ItemKind::Diary && owner_id.to_string() != user_id {
                return Err(AppError::forbidden());
            }

            let key = composite_key(&user_id, &item_id);
            let existing = favorite_mark::Entity::find_by_id((kind.as_str().to_string(), key.clone()))
                .one(txn)
                .await
                .map_err(db_error("find favorite mark"))?;

            let favorited = if existing.is_some() {
                remove_mark(txn, kind, &key, numeric_id).await?;
                false
            } else {
                let mark = favorite_mark::ActiveModel {
                    item_kind: Set(kind.as_str().to_string()),
                    id: Set(key.clone()),
                    user_id: Set(user_id.clone()),
                    item_id: Set(item_id.clone()),
                    created: Set(Some(Utc::now())),
                };
                if let Err(err) = favorite_mark::Entity::insert(mark).exec(txn).await {
                    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                        return Err(AppError::fail("favorite state changed, please retry"));
                    }
                    return Err(db_error("insert favorite mark")(err));
                }
                exec_sql(
                    txn,
                    &format!("update {} set like_count = like_count + 1 where id = ?", kind.table()),
                    vec![numeric_id.into()],
                )
                .await?;
                true
            };

            let like_count = load_item(txn, kind, numeric_id)
                .await?
                .map(|(_, count)| count)
                .unwrap_or(0);
            debug!(
                "favorite {} {} by {} -> favorited={} like_count={}",
                kind.as_str(),
                item_id,
                user_id,
                favorited,
                like_count
            );
            Ok(ToggleOutcome {
                item_id,
                kind,
                favorited,
                like_count,
            })
        })
    })
    .await
    .map_err(map_tx_error)
}

/// Item ids the user has favorited in one collection, newest first.
pub async fn list<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    kind: ItemKind,
) -> Result<Vec<String>, AppError> {
    let marks = favorite_mark::Entity::find()
        .filter(favorite_mark::Column::ItemKind.eq(kind.as_str()))
        .filter(favorite_mark::Column::UserId.eq(user_id))
        .order_by_desc(favorite_mark::Column::Created)
        .all(db)
        .await
        .map_err(db_error("list favorite marks"))?;
    Ok(marks.into_iter().map(|m| m.item_id).collect())
}

/// Drops every mark on one item, used when the item itself is removed.
pub async fn purge_item<C: ConnectionTrait>(db: &C, kind: ItemKind, item_id: &str) -> Result<u64, AppError> {
    let result = favorite_mark::Entity::delete_many()
        .filter(favorite_mark::Column::ItemKind.eq(kind.as_str()))
        .filter(favorite_mark::Column::ItemId.eq(item_id))
        .exec(db)
        .await
        .map_err(db_error("purge favorite marks"))?;
    Ok(result.rows_affected)
}

/// Deletes one mark and decrements the item's count. The count only moves when
/// this call actually removed the row.
async fn remove_mark(txn: &DatabaseTransaction, kind: ItemKind, key: &str, numeric_id: i32) -> Result<(), AppError> {
    let deleted = favorite_mark::Entity::delete_by_id((kind.as_str().to_string(), key.to_string()))
        .exec(txn)
        .await
        .map_err(db_error("delete favorite mark"))?;
    if deleted.rows_affected != 1 {
        return Err(AppError::fail("favorite state changed, please retry"));
    }
    exec_sql(
        txn,
        &format!(
            "update {} set like_count = like_count - 1 where id = ? and like_count >= 1",
            kind.table()
        ),
        vec![numeric_id.into()],
    )
    .await
}

/// Owner and like count of one item, `None` when it does not exist.
async fn load_item(txn: &DatabaseTransaction, kind: ItemKind, id: i32) -> Result<Option<(i32, i32)>, AppError> {
    let backend = txn.get_database_backend();
    let stmt = Statement::from_sql_and_values(
        backend,
        &format!("select user_id, like_count from {} where id = ?", kind.table()),
        vec![id.into()],
    );
    let row = match txn.query_one(stmt).await.map_err(db_error("read like_count"))? {
        Some(row) => row,
        None => return Ok(None),
    };
    let owner_id = row.try_get::<i32>("", "user_id").map_err(db_error("read user_id"))?;
    let like_count = row.try_get::<i32>("", "like_count").map_err(db_error("read like_count"))?;
    Ok(Some((owner_id, like_count)))
}

async fn exec_sql(txn: &DatabaseTransaction, sql: &str, values: Vec<sea_orm::Value>) -> Result<(), AppError> {
    let backend = txn.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    txn.execute(stmt).await.map_err(db_error("update like_count"))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::testing::memory_db;
    use crate::entity::{article, diary_entry, menu};
    use sea_orm::{ActiveModelTrait, PaginatorTrait};

    pub(crate) async fn seed_article(db: &DatabaseConnection, like_count: i32) -> i32 {
        article::ActiveModel {
            user_id: Set(1),
            title: Set("Oatmeal every morning".to_string()),
            content: Set(Some("fiber".to_string())),
            like_count: Set(like_count),
            created: Set(Some(Utc::now())),
            updated: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn seed_menu(db: &DatabaseConnection) -> i32 {
        menu::ActiveModel {
            user_id: Set(1),
            name: Set("Green salad".to_string()),
            calories: Set(Some(320)),
            like_count: Set(0),
            created: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn seed_diary(db: &DatabaseConnection, user_id: i32) -> i32 {
        diary_entry::ActiveModel {
            user_id: Set(user_id),
            eaten_on: Set("2026-03-07".to_string()),
            meal: Set("LUNCH".to_string()),
            food_name: Set("Lentil soup".to_string()),
            calories: Set(410),
            like_count: Set(0),
            created: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn mark_count(db: &DatabaseConnection) -> u64 {
        favorite_mark::Entity::find().count(db).await.unwrap()
    }

    #[test]
    fn composite_key_joins_user_and_item() {
        assert_eq!(composite_key("U", "a1"), "U_a1");
    }

    #[actix_rt::test]
    async fn toggle_on_then_off_is_net_zero() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await.to_string();

        let on = toggle(&db, "U", ItemKind::Article, &id).await.unwrap();
        assert!(on.favorited);
        assert_eq!(on.like_count, 1);
        let stored = favorite_mark::Entity::find_by_id(("ARTICLE".to_string(), format!("U_{}", id)))
            .one(&db)
            .await
            .unwrap();
        assert!(stored.is_some());

        let off = toggle(&db, "U", ItemKind::Article, &id).await.unwrap();
        assert!(!off.favorited);
        assert_eq!(off.like_count, 0);
        assert_eq!(mark_count(&db).await, 0);
    }

    #[actix_rt::test]
    async fn two_users_count_independently() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await.to_string();

        toggle(&db, "1", ItemKind::Article, &id).await.unwrap();
        let second = toggle(&db, "2", ItemKind::Article, &id).await.unwrap();
        assert_eq!(second.like_count, 2);

        let back = toggle(&db, "1", ItemKind::Article, &id).await.unwrap();
        assert!(!back.favorited);
        assert_eq!(back.like_count, 1);
        assert_eq!(list(&db, "2", ItemKind::Article).await.unwrap(), vec![id]);
    }

    #[actix_rt::test]
    async fn missing_item_writes_nothing() {
        let db = memory_db().await;
        let err = toggle(&db, "U", ItemKind::Menu, "999").await.unwrap_err();
        assert_eq!(err.code(), 2);
        assert_eq!(mark_count(&db).await, 0);
    }

    #[actix_rt::test]
    async fn rejects_blank_or_malformed_ids() {
        let db = memory_db().await;
        assert_eq!(toggle(&db, "", ItemKind::Article, "1").await.unwrap_err().code(), 1);
        assert_eq!(toggle(&db, "U", ItemKind::Article, "  ").await.unwrap_err().code(), 1);
        assert_eq!(toggle(&db, "U", ItemKind::Article, "abc").await.unwrap_err().code(), 1);
    }

    #[actix_rt::test]
    async fn disabled_flag_blocks_toggle() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await.to_string();
        sys_config_store::set_string(&db, sys_config_store::OPEN_LIKE, "false")
            .await
            .unwrap();
        let err = toggle(&db, "U", ItemKind::Article, &id).await.unwrap_err();
        assert_eq!(err.msg(), "favorites are disabled");
        assert_eq!(mark_count(&db).await, 0);
    }

    #[actix_rt::test]
    async fn same_id_in_two_collections_does_not_collide() {
        let db = memory_db().await;
        let article_id = seed_article(&db, 0).await;
        let menu_id = seed_menu(&db).await;
        assert_eq!(article_id, menu_id);

        let a = toggle(&db, "U", ItemKind::Article, &article_id.to_string()).await.unwrap();
        let m = toggle(&db, "U", ItemKind::Menu, &menu_id.to_string()).await.unwrap();
        assert!(a.favorited && m.favorited);
        assert_eq!(mark_count(&db).await, 2);
    }

    #[actix_rt::test]
    async fn count_never_goes_negative() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await.to_string();
        toggle(&db, "U", ItemKind::Article, &id).await.unwrap();
        exec_raw(&db, "update t_article set like_count = 0").await;

        let off = toggle(&db, "U", ItemKind::Article, &id).await.unwrap();
        assert!(!off.favorited);
        assert_eq!(off.like_count, 0);
    }

    #[actix_rt::test]
    async fn purge_removes_marks_of_item() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await.to_string();
        toggle(&db, "1", ItemKind::Article, &id).await.unwrap();
        toggle(&db, "2", ItemKind::Article, &id).await.unwrap();
        assert_eq!(purge_item(&db, ItemKind::Article, &id).await.unwrap(), 2);
        assert!(list(&db, "1", ItemKind::Article).await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn diary_entries_only_favorited_by_owner() {
        let db = memory_db().await;
        let id = seed_diary(&db, 1).await.to_string();

        let err = toggle(&db, "2", ItemKind::Diary, &id).await.unwrap_err();
        assert_eq!(err.code(), 5);
        assert_eq!(mark_count(&db).await, 0);
        let stored = diary_entry::Entity::find_by_id(id.parse::<i32>().unwrap()).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 0);

        let own = toggle(&db, "1", ItemKind::Diary, &id).await.unwrap();
        assert!(own.favorited);
        assert_eq!(own.like_count, 1);
    }

    #[actix_rt::test]
    async fn vanished_mark_does_not_decrement() {
        let db = memory_db().await;
        let numeric_id = seed_article(&db, 0).await;
        let id = numeric_id.to_string();
        toggle(&db, "U", ItemKind::Article, &id).await.unwrap();

        // a concurrent toggle already removed the mark this one read
        let key = composite_key("U", &id);
        let txn = db.begin().await.unwrap();
        remove_mark(&txn, ItemKind::Article, &key, numeric_id).await.unwrap();
        let err = remove_mark(&txn, ItemKind::Article, &key, numeric_id).await.unwrap_err();
        assert_eq!(err.msg(), "favorite state changed, please retry");
        txn.commit().await.unwrap();

        let stored = article::Entity::find_by_id(numeric_id).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 0);
        assert_eq!(mark_count(&db).await, 0);
    }

    async fn exec_raw(db: &DatabaseConnection, sql: &str) {
        db.execute(Statement::from_string(db.get_database_backend(), sql.to_string()))
            .await
            .unwrap();
    }
}
