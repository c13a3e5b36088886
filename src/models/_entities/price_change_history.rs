use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "price_change_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub price_type: String,
    pub period: String,
    pub action: String,
    pub old_value: Option<Decimal>,
    pub new_value: Decimal,
    pub old_status: Option<String>,
    pub new_status: String,
    pub change_reason: Option<String>,
    pub updated_by: String,
    pub source: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
