use crate::config::EngineSettings;
use crate::error::LotteryError;
use crate::lottery::model::{AssignmentMap, ResultRow};
use crate::lottery::optimizer::{MultiTrialOptimizer, ProgressSink, TrialProgress};
use crate::lottery::overrides::resolve;
use crate::storage::repository::{LotteryConfigRepository, LotteryJobRepository, RosterRepository};
use async_trait::async_trait;
use log::{debug, info};
use sea_orm::DatabaseConnection;

/// 进度写回 lottery_jobs；行不存在时视为任务已被替换
pub struct DbProgressSink<'a> {
    db: &'a DatabaseConnection,
    job_id: i32,
}

impl<'a> DbProgressSink<'a> {
    pub fn new(db: &'a DatabaseConnection, job_id: i32) -> Self {
        Self { db, job_id }
    }
}

#[async_trait]
impl ProgressSink for DbProgressSink<'_> {
    async fn report(&mut self, progress: TrialProgress) -> Result<(), LotteryError> {
        let updated = LotteryJobRepository::update_progress(
            self.db,
            self.job_id,
            progress.percent,
            progress.seed as i32,
        )
        .await?;
        if updated == 0 {
            return Err(LotteryError::Superseded(self.job_id));
        }
        debug!(
            "抽签任务 [{}] 进度 {}% (seed {})",
            self.job_id, progress.percent, progress.seed
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub best_cost: i64,
    pub worst_cost: i64,
    pub best_seed: u32,
    pub trials_run: u32,
    pub assigned: usize,
    pub unassigned: usize,
    pub manual_applied: usize,
    pub manual_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed(RunSummary),
    /// 同一 event 已启动新任务，本次结果被丢弃
    Superseded,
}

pub struct LotteryWorker;

impl LotteryWorker {
    /// 一次完整运行：加载数据 -> 预处理 -> 多次试验 -> 保存最优结果
    pub async fn run(
        db: &DatabaseConnection,
        job_id: i32,
        event_id: i32,
        settings: &EngineSettings,
    ) -> Result<WorkerOutcome, LotteryError> {
        let mut sink = DbProgressSink::new(db, job_id);
        Self::run_with_sink(db, job_id, event_id, settings, &mut sink).await
    }

    /// 进度写到调用方给定的 sink；sink 返回 Superseded 时放弃本次结果
    pub async fn run_with_sink<S: ProgressSink + ?Sized>(
        db: &DatabaseConnection,
        job_id: i32,
        event_id: i32,
        settings: &EngineSettings,
        sink: &mut S,
    ) -> Result<WorkerOutcome, LotteryError> {
        let event = RosterRepository::find_event(db, event_id)
            .await?
            .ok_or(LotteryError::EventNotFound(event_id))?;
        let positions = RosterRepository::load_positions(db, event.id).await?;
        let students = RosterRepository::load_preferences(db, &event).await?;
        let roster = RosterRepository::eligible_student_ids(db, event.school_id).await?;
        let snapshot = LotteryConfigRepository::load_snapshot(db, event.school_id).await?;

        info!(
            "🚀 抽签任务 [{}] 开始: event={} 学生 {} 人, 岗位 {} 个, 排序 {}, 手动指派 {} 条, 预留 {} 条",
            job_id,
            event.id,
            students.len(),
            positions.len(),
            snapshot.grade_order,
            snapshot.manual.len(),
            snapshot.prefill.len()
        );

        let overrides = resolve(&positions, &snapshot.manual, &snapshot.prefill, &roster);
        let manual_applied = overrides.applied_manual_count();
        let manual_skipped = overrides.manual_outcomes.len() - manual_applied;

        let optimizer = MultiTrialOptimizer::new(snapshot.grade_order, settings.clone());
        let report = match optimizer.run(&students, &overrides, sink).await {
            Ok(r) => r,
            Err(LotteryError::Superseded(_)) => return Ok(WorkerOutcome::Superseded),
            Err(e) => return Err(e),
        };

        let rows = result_rows(&report.best.outcome.assignments);
        let assigned = rows.len();
        let unassigned = report.best.outcome.assignments.len() - assigned;

        let saved = LotteryJobRepository::complete_with_results(
            db,
            job_id,
            report.trials_run as i32,
            &rows,
        )
        .await?;
        if !saved {
            return Ok(WorkerOutcome::Superseded);
        }

        Ok(WorkerOutcome::Completed(RunSummary {
            best_cost: report.best.outcome.cost,
            worst_cost: report.worst_cost,
            best_seed: report.best.seed,
            trials_run: report.trials_run,
            assigned,
            unassigned,
            manual_applied,
            manual_skipped,
        }))
    }
}

/// 只保留已分配岗位的学生
pub fn result_rows(assignments: &AssignmentMap) -> Vec<ResultRow> {
    assignments
        .iter()
        .filter_map(|(student_id, p)| match (p.position_id, p.rank) {
            (Some(position_id), Some(rank)) => Some(ResultRow {
                student_id: *student_id,
                position_id,
                rank,
            }),
            _ => None,
        })
        .collect()
}
