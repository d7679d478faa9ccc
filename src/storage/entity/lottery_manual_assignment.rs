use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "lottery_manual_assignments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub configuration_id: i32,
    pub student_id: i32,
    pub position_id: i32,
    pub created_at: i64,
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
