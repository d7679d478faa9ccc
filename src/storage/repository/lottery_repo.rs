use crate::lottery::model::{JobStatus, ResultRow};
use crate::storage::entity::lottery_job::{
    self, ActiveModel as LotteryJobActiveModel, Entity as LotteryJob,
};
use crate::storage::entity::lottery_result::{
    self, ActiveModel as LotteryResultActiveModel, Entity as LotteryResult,
};
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

/// SQLite 绑定参数有上限，结果分批写入
const RESULT_INSERT_CHUNK: usize = 500;

pub struct LotteryJobRepository;

impl LotteryJobRepository {
    /// 删除该 event 下所有旧任务及其结果，然后创建新的 RUNNING 任务（同一事务）
    pub async fn start_fresh(
        db: &DatabaseConnection,
        event_id: i32,
    ) -> Result<(i32, u64), sea_orm::DbErr> {
        let txn = db.begin().await?;
        let removed = Self::delete_jobs_for_event(&txn, event_id).await?;

        let now = Utc::now().timestamp();
        let active_model = LotteryJobActiveModel {
            event_id: Set(event_id),
            status: Set(JobStatus::Running.as_str().to_string()),
            progress: Set(0),
            current_seed: Set(0),
            started_at: Set(now),
            completed_at: Set(None),
            error_message: Set(None),
            updated_at: Set(now),
            ..Default::default()
        };
        let job = active_model.insert(&txn).await?;
        txn.commit().await?;
        Ok((job.id, removed))
    }

    pub async fn delete_jobs_for_event<C: ConnectionTrait>(
        db: &C,
        event_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let ids: Vec<i32> = LotteryJob::find()
            .filter(lottery_job::Column::EventId.eq(event_id))
            .select_only()
            .column(lottery_job::Column::Id)
            .into_tuple::<i32>()
            .all(db)
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }

        LotteryResult::delete_many()
            .filter(lottery_result::Column::JobId.is_in(ids.clone()))
            .exec(db)
            .await?;
        let res = LotteryJob::delete_many()
            .filter(lottery_job::Column::Id.is_in(ids))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 只更新仍处于 RUNNING 的任务；返回 0 说明任务已被替换或删除
    pub async fn update_progress(
        db: &DatabaseConnection,
        job_id: i32,
        progress: i32,
        current_seed: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let res = LotteryJob::update_many()
            .col_expr(lottery_job::Column::Progress, Expr::value(progress))
            .col_expr(lottery_job::Column::CurrentSeed, Expr::value(current_seed))
            .col_expr(lottery_job::Column::UpdatedAt, Expr::value(now))
            .filter(lottery_job::Column::Id.eq(job_id))
            .filter(lottery_job::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// 重复的 (job_id, student_id) 直接忽略
    pub async fn insert_results<C: ConnectionTrait>(
        db: &C,
        job_id: i32,
        rows: &[ResultRow],
    ) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let mut inserted = 0u64;
        for chunk in rows.chunks(RESULT_INSERT_CHUNK) {
            let models: Vec<LotteryResultActiveModel> = chunk
                .iter()
                .map(|r| LotteryResultActiveModel {
                    job_id: Set(job_id),
                    student_id: Set(r.student_id),
                    position_id: Set(r.position_id),
                    rank: Set(r.rank),
                    created_at: Set(now),
                    ..Default::default()
                })
                .collect();
            inserted += LotteryResult::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        lottery_result::Column::JobId,
                        lottery_result::Column::StudentId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(db)
                .await?;
        }
        Ok(inserted)
    }

    /// 写入最终结果并标记 COMPLETED。任务已不存在或不再是 RUNNING 时不写任何数据，返回 false。
    pub async fn complete_with_results(
        db: &DatabaseConnection,
        job_id: i32,
        final_seed: i32,
        rows: &[ResultRow],
    ) -> Result<bool, sea_orm::DbErr> {
        let txn = db.begin().await?;

        let alive = LotteryJob::find_by_id(job_id)
            .filter(lottery_job::Column::Status.eq(JobStatus::Running.as_str()))
            .one(&txn)
            .await?;
        if alive.is_none() {
            txn.rollback().await?;
            return Ok(false);
        }

        Self::insert_results(&txn, job_id, rows).await?;

        let now = Utc::now().timestamp();
        LotteryJob::update_many()
            .col_expr(
                lottery_job::Column::Status,
                Expr::value(JobStatus::Completed.as_str()),
            )
            .col_expr(lottery_job::Column::Progress, Expr::value(100))
            .col_expr(lottery_job::Column::CurrentSeed, Expr::value(final_seed))
            .col_expr(lottery_job::Column::CompletedAt, Expr::value(now))
            .col_expr(lottery_job::Column::UpdatedAt, Expr::value(now))
            .filter(lottery_job::Column::Id.eq(job_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    /// message 由调用方截断
    pub async fn mark_failed(
        db: &DatabaseConnection,
        job_id: i32,
        message: &str,
    ) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let res = LotteryJob::update_many()
            .col_expr(
                lottery_job::Column::Status,
                Expr::value(JobStatus::Failed.as_str()),
            )
            .col_expr(
                lottery_job::Column::ErrorMessage,
                Expr::value(message.to_string()),
            )
            .col_expr(lottery_job::Column::CompletedAt, Expr::value(now))
            .col_expr(lottery_job::Column::UpdatedAt, Expr::value(now))
            .filter(lottery_job::Column::Id.eq(job_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn find_job(
        db: &DatabaseConnection,
        job_id: i32,
    ) -> Result<Option<lottery_job::Model>, sea_orm::DbErr> {
        LotteryJob::find_by_id(job_id).one(db).await
    }

    pub async fn latest_job_for_event(
        db: &DatabaseConnection,
        event_id: i32,
    ) -> Result<Option<lottery_job::Model>, sea_orm::DbErr> {
        LotteryJob::find()
            .filter(lottery_job::Column::EventId.eq(event_id))
            .order_by_desc(lottery_job::Column::Id)
            .one(db)
            .await
    }

    pub async fn running_job_for_event(
        db: &DatabaseConnection,
        event_id: i32,
    ) -> Result<Option<lottery_job::Model>, sea_orm::DbErr> {
        LotteryJob::find()
            .filter(lottery_job::Column::EventId.eq(event_id))
            .filter(lottery_job::Column::Status.eq(JobStatus::Running.as_str()))
            .order_by_desc(lottery_job::Column::Id)
            .one(db)
            .await
    }

    pub async fn load_results(
        db: &DatabaseConnection,
        job_id: i32,
    ) -> Result<Vec<ResultRow>, sea_orm::DbErr> {
        let rows = LotteryResult::find()
            .filter(lottery_result::Column::JobId.eq(job_id))
            .order_by_asc(lottery_result::Column::StudentId)
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| ResultRow {
                student_id: r.student_id,
                position_id: r.position_id,
                rank: r.rank,
            })
            .collect())
    }

    /// 进程重启后仍为 RUNNING 的任务不可能再推进，统一标记为 FAILED
    pub async fn fail_stale_running(
        db: &DatabaseConnection,
        message: &str,
    ) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().timestamp();
        let res = LotteryJob::update_many()
            .col_expr(
                lottery_job::Column::Status,
                Expr::value(JobStatus::Failed.as_str()),
            )
            .col_expr(
                lottery_job::Column::ErrorMessage,
                Expr::value(message.to_string()),
            )
            .col_expr(lottery_job::Column::CompletedAt, Expr::value(now))
            .col_expr(lottery_job::Column::UpdatedAt, Expr::value(now))
            .filter(lottery_job::Column::Status.eq(JobStatus::Running.as_str()))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}
