use crate::lottery::model::{GradeOrder, ManualAssignment, PrefillReservation};
use crate::storage::entity::lottery_configuration::{
    self, ActiveModel as ConfigurationActiveModel, Entity as LotteryConfiguration,
};
use crate::storage::entity::lottery_manual_assignment::{
    self, ActiveModel as ManualActiveModel, Entity as LotteryManualAssignment,
};
use crate::storage::entity::lottery_prefill_setting::{
    self, ActiveModel as PrefillActiveModel, Entity as LotteryPrefillSetting,
};
use chrono::Utc;
use log::{info, warn};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

/// 某个学校当前的抽签配置快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub configuration_id: i32,
    pub grade_order: GradeOrder,
    pub manual: Vec<ManualAssignment>,
    pub prefill: Vec<PrefillReservation>,
}

pub struct LotteryConfigRepository;

impl LotteryConfigRepository {
    /// 不存在时按默认值（NONE）创建
    pub async fn get_or_create(
        db: &DatabaseConnection,
        school_id: i32,
    ) -> Result<lottery_configuration::Model, sea_orm::DbErr> {
        if let Some(existing) = Self::find(db, school_id).await? {
            return Ok(existing);
        }

        let now = Utc::now().timestamp();
        let am = ConfigurationActiveModel {
            school_id: Set(school_id),
            grade_order: Set(GradeOrder::None.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        // 并发创建时以先插入的为准
        LotteryConfiguration::insert(am)
            .on_conflict(
                OnConflict::column(lottery_configuration::Column::SchoolId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        info!("为学校 {} 创建默认抽签配置", school_id);

        Self::find(db, school_id).await?.ok_or_else(|| {
            sea_orm::DbErr::RecordNotFound(format!("lottery configuration for school {}", school_id))
        })
    }

    async fn find(
        db: &DatabaseConnection,
        school_id: i32,
    ) -> Result<Option<lottery_configuration::Model>, sea_orm::DbErr> {
        LotteryConfiguration::find()
            .filter(lottery_configuration::Column::SchoolId.eq(school_id))
            .one(db)
            .await
    }

    pub async fn set_grade_order(
        db: &DatabaseConnection,
        school_id: i32,
        order: GradeOrder,
    ) -> Result<(), sea_orm::DbErr> {
        let config = Self::get_or_create(db, school_id).await?;
        let mut am: ConfigurationActiveModel = config.into();
        am.grade_order = Set(order.as_str().to_string());
        am.updated_at = Set(Utc::now().timestamp());
        am.update(db).await?;
        Ok(())
    }

    /// 同一学生只保留最新的一条手动指派
    pub async fn add_manual_assignment(
        db: &DatabaseConnection,
        school_id: i32,
        student_id: i32,
        position_id: i32,
    ) -> Result<(), sea_orm::DbErr> {
        let config = Self::get_or_create(db, school_id).await?;
        LotteryManualAssignment::delete_many()
            .filter(lottery_manual_assignment::Column::ConfigurationId.eq(config.id))
            .filter(lottery_manual_assignment::Column::StudentId.eq(student_id))
            .exec(db)
            .await?;

        let am = ManualActiveModel {
            configuration_id: Set(config.id),
            student_id: Set(student_id),
            position_id: Set(position_id),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        };
        am.insert(db).await?;
        Ok(())
    }

    pub async fn remove_manual_assignment(
        db: &DatabaseConnection,
        school_id: i32,
        student_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let config = Self::get_or_create(db, school_id).await?;
        let res = LotteryManualAssignment::delete_many()
            .filter(lottery_manual_assignment::Column::ConfigurationId.eq(config.id))
            .filter(lottery_manual_assignment::Column::StudentId.eq(student_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 百分比超出 0..=100 时截断，返回实际保存的值
    pub async fn set_prefill(
        db: &DatabaseConnection,
        school_id: i32,
        company_id: i32,
        percentage: i32,
    ) -> Result<i32, sea_orm::DbErr> {
        let config = Self::get_or_create(db, school_id).await?;
        let clamped = percentage.clamp(0, 100);
        if clamped != percentage {
            warn!(
                "⚠ 预留比例 {} 超出范围，已截断为 {} (company={})",
                percentage, clamped, company_id
            );
        }

        let now = Utc::now().timestamp();
        let am = PrefillActiveModel {
            configuration_id: Set(config.id),
            company_id: Set(company_id),
            percentage: Set(clamped),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        LotteryPrefillSetting::insert(am)
            .on_conflict(
                OnConflict::columns([
                    lottery_prefill_setting::Column::ConfigurationId,
                    lottery_prefill_setting::Column::CompanyId,
                ])
                .update_columns([
                    lottery_prefill_setting::Column::Percentage,
                    lottery_prefill_setting::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        Ok(clamped)
    }

    pub async fn remove_prefill(
        db: &DatabaseConnection,
        school_id: i32,
        company_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let config = Self::get_or_create(db, school_id).await?;
        let res = LotteryPrefillSetting::delete_many()
            .filter(lottery_prefill_setting::Column::ConfigurationId.eq(config.id))
            .filter(lottery_prefill_setting::Column::CompanyId.eq(company_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 读取配置；无法识别的 grade_order 按 NONE 处理
    pub async fn load_snapshot(
        db: &DatabaseConnection,
        school_id: i32,
    ) -> Result<ConfigSnapshot, sea_orm::DbErr> {
        let config = Self::get_or_create(db, school_id).await?;
        let grade_order = config.grade_order.parse::<GradeOrder>().unwrap_or_else(|e| {
            warn!("⚠ 学校 {} 的抽签配置无效: {}，按 NONE 处理", school_id, e);
            GradeOrder::None
        });

        let manual = LotteryManualAssignment::find()
            .filter(lottery_manual_assignment::Column::ConfigurationId.eq(config.id))
            .order_by_asc(lottery_manual_assignment::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|m| ManualAssignment {
                student_id: m.student_id,
                position_id: m.position_id,
            })
            .collect();

        let prefill = LotteryPrefillSetting::find()
            .filter(lottery_prefill_setting::Column::ConfigurationId.eq(config.id))
            .order_by_asc(lottery_prefill_setting::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|p| PrefillReservation {
                company_id: p.company_id,
                percentage: p.percentage,
            })
            .collect();

        Ok(ConfigSnapshot {
            configuration_id: config.id,
            grade_order,
            manual,
            prefill,
        })
    }
}
