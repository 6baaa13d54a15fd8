use sea_orm::entity::prelude::*;

/// Presence record of a user's favorite on one item. `id` is the
/// `{user_id}_{item_id}` composite key, unique per item kind.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "t_favorite_mark")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_kind: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub created: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
