use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "lottery_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub event_id: i32,
    pub status: String, // RUNNING / COMPLETED / FAILED
    pub progress: i32,  // 0..=100
    pub current_seed: i32,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>, // 最多 190 字符
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lottery_result::Entity")]
    Results,
}

impl Related<super::lottery_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Results.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
