use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "market_prices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub price_type: String,
    pub period: String,
    pub value: Decimal,
    pub status: String,
    pub source: String,
    pub change_reason: Option<String>,
    pub updated_by: String,
    pub is_locked: bool,
    pub captured_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
