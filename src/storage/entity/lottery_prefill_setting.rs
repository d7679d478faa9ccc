use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "lottery_prefill_settings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub configuration_id: i32,
    pub company_id: i32,
    pub percentage: i32, // 0..=100
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lottery_configuration::Entity",
        from = "Column::ConfigurationId",
        to = "super::lottery_configuration::Column::Id"
    )]
    Configuration,
}

impl ActiveModelBehavior for ActiveModel {}
