//! Moderation reports against articles.
//!
//! One record per `{user_id}_{article_id}`. A repeated submission merges its
//! reason codes into the stored set instead of creating a second record.

use std::collections::BTreeSet;

use chrono::Utc;
use log::debug;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entity::{article, report_record};
use crate::error::{db_error, map_tx_error, AppError};
use crate::favorite::composite_key;
use crate::sys_config as sys_config_store;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportReason {
    Spam,
    Harassment,
    Inappropriate,
    Misinformation,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "SPAM",
            ReportReason::Harassment => "HARASSMENT",
            ReportReason::Inappropriate => "INAPPROPRIATE",
            ReportReason::Misinformation => "MISINFORMATION",
            ReportReason::Other => "OTHER",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDto {
    pub key: String,
    pub user_id: String,
    pub article_id: String,
    pub reasons: Vec<String>,
    pub free_text: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

/// Stores a report, merging reasons into any earlier report by the same user
/// on the same article.
pub async fn submit(
    db: &DatabaseConnection,
    user_id: &str,
    article_id: i32,
    reasons: &BTreeSet<ReportReason>,
    free_text: Option<&str>,
) -> Result<ReportDto, AppError> {
    let free_text = free_text.map(str::trim).filter(|t| !t.is_empty());
    if reasons.is_empty() && free_text.is_none() {
        return Err(AppError::param_error("no reason provided"));
    }

    let open_report = sys_config_store::get_boolean(db, sys_config_store::OPEN_REPORT)
        .await
        .map_err(db_error("read OPEN_REPORT"))?;
    if !open_report {
        return Err(AppError::fail("reporting is disabled"));
    }

    let user_id = user_id.to_string();
    let new_reasons: BTreeSet<String> = reasons.iter().map(|r| r.as_str().to_string()).collect();
    let free_text = free_text.map(|t| t.to_string());

    let saved = db
        .transaction::<_, report_record::Model, AppError>(|txn| {
            Box::pin(async move {
                article::Entity::find_by_id(article_id)
                    .one(txn)
                    .await
                    .map_err(db_error("find reported article"))?
                    .ok_or_else(|| AppError::fail("article not found"))?;

                let article_key = article_id.to_string();
                let key = composite_key(&user_id, &article_key);
                let now = Utc::now();
                let existing = report_record::Entity::find_by_id(key.clone())
                    .one(txn)
                    .await
                    .map_err(db_error("find report"))?;

                match existing {
                    Some(model) => {
                        let mut merged = decode_reasons(&model.reasons);
                        merged.extend(new_reasons);
                        let mut active: report_record::ActiveModel = model.into();
                        active.reasons = Set(encode_reasons(&merged));
                        if let Some(text) = free_text {
                            active.free_text = Set(Some(text));
                        }
                        active.updated = Set(Some(now));
                        debug!("report {} merged, reasons now {:?}", key, merged);
                        active.update(txn).await.map_err(db_error("merge report"))
                    }
                    None => {
                        let active = report_record::ActiveModel {
                            id: Set(key.clone()),
                            user_id: Set(user_id),
                            article_id: Set(article_key),
                            reasons: Set(encode_reasons(&new_reasons)),
                            free_text: Set(free_text),
                            created: Set(Some(now)),
                            updated: Set(Some(now)),
                        };
                        debug!("report {} created", key);
                        active.insert(txn).await.map_err(db_error("insert report"))
                    }
                }
            })
        })
        .await
        .map_err(map_tx_error)?;

    Ok(to_dto(saved))
}

pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<ReportDto>, AppError> {
    let rows = report_record::Entity::find()
        .order_by_desc(report_record::Column::Updated)
        .all(db)
        .await
        .map_err(db_error("list reports"))?;
    Ok(rows.into_iter().map(to_dto).collect())
}

/// Deletes one report. The reported article is left untouched.
pub async fn remove<C: ConnectionTrait>(db: &C, key: &str) -> Result<bool, AppError> {
    let result = report_record::Entity::delete_by_id(key.to_string())
        .exec(db)
        .await
        .map_err(db_error("remove report"))?;
    Ok(result.rows_affected > 0)
}

fn decode_reasons(raw: &str) -> BTreeSet<String> {
    serde_json::from_str::<Vec<String>>(raw)
        .map(|v| v.into_iter().collect())
        .unwrap_or_default()
}

fn encode_reasons(reasons: &BTreeSet<String>) -> String {
    serde_json::to_string(&reasons.iter().collect::<Vec<_>>()).unwrap_or_else(|_| "[]".to_string())
}

fn to_dto(model: report_record::Model) -> ReportDto {
    ReportDto {
        reasons: decode_reasons(&model.reasons).into_iter().collect(),
        key: model.id,
        user_id: model.user_id,
        article_id: model.article_id,
        free_text: model.free_text,
        created: model.created.map(crate::routes::to_rfc3339),
        updated: model.updated.map(crate::routes::to_rfc3339),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_db;
    use crate::favorite::tests::seed_article;
    use sea_orm::PaginatorTrait;

    fn reasons(list: &[ReportReason]) -> BTreeSet<ReportReason> {
        list.iter().copied().collect()
    }

    async fn record_count(db: &DatabaseConnection) -> u64 {
        report_record::Entity::find().count(db).await.unwrap()
    }

    #[actix_rt::test]
    async fn empty_report_is_rejected_without_write() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await;

        let err = submit(&db, "7", id, &BTreeSet::new(), None).await.unwrap_err();
        assert_eq!(err.code(), 1);
        assert_eq!(err.msg(), "no reason provided");

        let err = submit(&db, "7", id, &BTreeSet::new(), Some("   ")).await.unwrap_err();
        assert_eq!(err.msg(), "no reason provided");
        assert_eq!(record_count(&db).await, 0);
    }

    #[actix_rt::test]
    async fn repeat_submission_merges_reasons() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await;

        let first = submit(&db, "7", id, &reasons(&[ReportReason::Spam]), None).await.unwrap();
        assert_eq!(first.key, format!("7_{}", id));
        assert_eq!(first.reasons, vec!["SPAM"]);

        let second = submit(
            &db,
            "7",
            id,
            &reasons(&[ReportReason::Harassment, ReportReason::Spam]),
            Some("keeps posting ads"),
        )
        .await
        .unwrap();
        assert_eq!(second.reasons, vec!["HARASSMENT", "SPAM"]);
        assert_eq!(second.free_text.as_deref(), Some("keeps posting ads"));
        assert_eq!(record_count(&db).await, 1);
    }

    #[actix_rt::test]
    async fn empty_free_text_keeps_previous_text() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await;

        submit(&db, "7", id, &BTreeSet::new(), Some("misleading numbers")).await.unwrap();
        let merged = submit(&db, "7", id, &reasons(&[ReportReason::Misinformation]), Some(""))
            .await
            .unwrap();
        assert_eq!(merged.free_text.as_deref(), Some("misleading numbers"));
        assert_eq!(merged.reasons, vec!["MISINFORMATION"]);
    }

    #[actix_rt::test]
    async fn unknown_article_is_rejected() {
        let db = memory_db().await;
        let err = submit(&db, "7", 404, &reasons(&[ReportReason::Other]), None)
            .await
            .unwrap_err();
        assert_eq!(err.msg(), "article not found");
        assert_eq!(record_count(&db).await, 0);
    }

    #[actix_rt::test]
    async fn moderator_removal_leaves_article() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await;
        let saved = submit(&db, "7", id, &reasons(&[ReportReason::Spam]), None).await.unwrap();
        submit(&db, "8", id, &reasons(&[ReportReason::Other]), None).await.unwrap();
        assert_eq!(list(&db).await.unwrap().len(), 2);

        assert!(remove(&db, &saved.key).await.unwrap());
        assert!(!remove(&db, &saved.key).await.unwrap());
        assert_eq!(list(&db).await.unwrap().len(), 1);
        assert!(article::Entity::find_by_id(id).one(&db).await.unwrap().is_some());
    }

    #[actix_rt::test]
    async fn disabled_flag_blocks_reports() {
        let db = memory_db().await;
        let id = seed_article(&db, 0).await;
        sys_config_store::set_string(&db, sys_config_store::OPEN_REPORT, "false")
            .await
            .unwrap();
        let err = submit(&db, "7", id, &reasons(&[ReportReason::Spam]), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), 2);
    }
}
