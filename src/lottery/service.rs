use crate::app_state::AppEvent;
use crate::config::EngineSettings;
use crate::error::{truncate_message, LotteryError};
use crate::lottery::model::{GradeOrder, JobStatus, JobStatusView, ResultRow};
use crate::lottery::worker::{LotteryWorker, WorkerOutcome};
use crate::storage::entity::{event, lottery_job};
use crate::storage::repository::{LotteryConfigRepository, LotteryJobRepository, RosterRepository};
use futures::FutureExt;
use log::{error, info, warn};
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const RESTART_INTERRUPTED_MESSAGE: &str = "interrupted by process restart";

/// 已启动任务的句柄。状态以数据库记录为准，task 只用于需要等待结束的场景。
pub struct LotteryJobHandle {
    pub job_id: i32,
    pub event_id: i32,
    pub task: JoinHandle<()>,
}

pub struct LotteryService {
    db: Arc<DatabaseConnection>,
    settings: EngineSettings,
    evt_tx: mpsc::UnboundedSender<AppEvent>,
}

impl LotteryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: EngineSettings,
        evt_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            db,
            settings,
            evt_tx,
        }
    }

    /// 校验前置条件，清掉该 event 的旧任务，创建 RUNNING 任务并在后台执行。立即返回。
    pub async fn start_job(&self, admin_id: i32) -> Result<LotteryJobHandle, LotteryError> {
        self.settings.validate()?;
        let event = self.check_preconditions(admin_id).await?;

        let (job_id, removed) = LotteryJobRepository::start_fresh(&self.db, event.id).await?;
        if removed > 0 {
            warn!(
                "⚠ event {} 的 {} 个旧抽签任务及其结果已删除",
                event.id, removed
            );
        }
        info!("抽签任务 [{}] 已创建 (event={}, admin={})", job_id, event.id, admin_id);
        let _ = self.evt_tx.send(AppEvent::Message(format!(
            "已启动抽签任务 [ID: {}] (event {})",
            job_id, event.id
        )));

        let db = self.db.clone();
        let settings = self.settings.clone();
        let evt_tx = self.evt_tx.clone();
        let event_id = event.id;
        let task = tokio::spawn(async move {
            Self::drive_job(db, job_id, event_id, settings, evt_tx).await;
        });

        Ok(LotteryJobHandle {
            job_id,
            event_id,
            task,
        })
    }

    async fn check_preconditions(&self, admin_id: i32) -> Result<event::Model, LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        let event = RosterRepository::active_event(&self.db, school_id)
            .await?
            .ok_or(LotteryError::NoActiveEvent(school_id))?;

        if RosterRepository::count_positions(&self.db, event.id).await? == 0 {
            return Err(LotteryError::NoPositions(event.id));
        }
        if RosterRepository::count_students_with_choices(&self.db, &event).await? == 0 {
            return Err(LotteryError::NoStudentChoices(event.id));
        }
        Ok(event)
    }

    async fn school_for_admin(&self, admin_id: i32) -> Result<i32, LotteryError> {
        let admin = RosterRepository::find_admin(&self.db, admin_id)
            .await?
            .ok_or(LotteryError::AdminNotFound(admin_id))?;
        admin
            .school_id
            .ok_or(LotteryError::AdminHasNoSchool(admin_id))
    }

    /// 后台任务主体。job 行需已由 start_job 创建；也可直接 await 以在当前任务中同步执行。
    pub async fn drive_job(
        db: Arc<DatabaseConnection>,
        job_id: i32,
        event_id: i32,
        settings: EngineSettings,
        evt_tx: mpsc::UnboundedSender<AppEvent>,
    ) {
        let run = LotteryWorker::run(&db, job_id, event_id, &settings);
        Self::supervise(&db, job_id, &evt_tx, run).await;
    }

    /// 执行一次运行：任何错误或 panic 都落到 FAILED，不向外传播
    pub async fn supervise<F>(
        db: &DatabaseConnection,
        job_id: i32,
        evt_tx: &mpsc::UnboundedSender<AppEvent>,
        run: F,
    ) where
        F: Future<Output = Result<WorkerOutcome, LotteryError>>,
    {
        let result = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(r) => r,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Self::fail(db, job_id, &format!("internal error: {}", detail), evt_tx).await;
                return;
            }
        };

        match result {
            Ok(WorkerOutcome::Completed(summary)) => {
                info!(
                    "✓ 抽签任务 [{}] 完成: cost={} (最差 {}, seed {}/{}), 分配 {} 人, 未分配 {} 人, 手动指派 {} 条 (跳过 {})",
                    job_id,
                    summary.best_cost,
                    summary.worst_cost,
                    summary.best_seed,
                    summary.trials_run,
                    summary.assigned,
                    summary.unassigned,
                    summary.manual_applied,
                    summary.manual_skipped
                );
                let _ = evt_tx.send(AppEvent::Log(format!(
                    "✓ 抽签任务 [{}] 完成: 分配 {} 人, 未分配 {} 人, cost {}",
                    job_id, summary.assigned, summary.unassigned, summary.best_cost
                )));
            }
            Ok(WorkerOutcome::Superseded) => {
                warn!("⚠ 抽签任务 [{}] 已被新任务替换，结果丢弃", job_id);
                let _ = evt_tx.send(AppEvent::Log(format!(
                    "⚠ 抽签任务 [{}] 已被替换",
                    job_id
                )));
            }
            Err(e) => {
                Self::fail(db, job_id, &e.job_message(), evt_tx).await;
            }
        }
    }

    async fn fail(
        db: &DatabaseConnection,
        job_id: i32,
        message: &str,
        evt_tx: &mpsc::UnboundedSender<AppEvent>,
    ) {
        let message = truncate_message(message);
        error!("✗ 抽签任务 [{}] 失败: {}", job_id, message);
        match LotteryJobRepository::mark_failed(db, job_id, &message).await {
            Ok(0) => warn!("抽签任务 [{}] 记录已不存在，无法标记失败", job_id),
            Ok(_) => {}
            Err(e) => error!("标记抽签任务 [{}] 失败时出错: {}", job_id, e),
        }
        let _ = evt_tx.send(AppEvent::Error(format!(
            "✗ 抽签任务 [{}] 失败: {}",
            job_id, message
        )));
    }

    pub async fn job_status(&self, job_id: i32) -> Result<JobStatusView, LotteryError> {
        let job = LotteryJobRepository::find_job(&self.db, job_id)
            .await?
            .ok_or(LotteryError::JobNotFound(job_id))?;
        Ok(status_view(job))
    }

    /// 管理员所在学校当前活动的 RUNNING 任务
    pub async fn running_job_for_admin(&self, admin_id: i32) -> Result<Option<i32>, LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        let Some(event) = RosterRepository::active_event(&self.db, school_id).await? else {
            return Ok(None);
        };
        Ok(LotteryJobRepository::running_job_for_event(&self.db, event.id)
            .await?
            .map(|j| j.id))
    }

    pub async fn latest_job_for_event(
        &self,
        event_id: i32,
    ) -> Result<Option<JobStatusView>, LotteryError> {
        Ok(LotteryJobRepository::latest_job_for_event(&self.db, event_id)
            .await?
            .map(status_view))
    }

    pub async fn job_results(&self, job_id: i32) -> Result<Vec<ResultRow>, LotteryError> {
        if LotteryJobRepository::find_job(&self.db, job_id)
            .await?
            .is_none()
        {
            return Err(LotteryError::JobNotFound(job_id));
        }
        Ok(LotteryJobRepository::load_results(&self.db, job_id).await?)
    }

    pub async fn set_grade_order(
        &self,
        admin_id: i32,
        order: GradeOrder,
    ) -> Result<(), LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        LotteryConfigRepository::set_grade_order(&self.db, school_id, order).await?;
        Ok(())
    }

    pub async fn add_manual_assignment(
        &self,
        admin_id: i32,
        student_id: i32,
        position_id: i32,
    ) -> Result<(), LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        LotteryConfigRepository::add_manual_assignment(&self.db, school_id, student_id, position_id)
            .await?;
        Ok(())
    }

    /// 返回截断后实际保存的百分比
    pub async fn set_prefill(
        &self,
        admin_id: i32,
        company_id: i32,
        percentage: i32,
    ) -> Result<i32, LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        Ok(LotteryConfigRepository::set_prefill(&self.db, school_id, company_id, percentage).await?)
    }

    /// 返回删除的条数，0 表示该学生没有手动指派
    pub async fn remove_manual_assignment(
        &self,
        admin_id: i32,
        student_id: i32,
    ) -> Result<u64, LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        Ok(LotteryConfigRepository::remove_manual_assignment(&self.db, school_id, student_id).await?)
    }

    pub async fn remove_prefill(&self, admin_id: i32, company_id: i32) -> Result<u64, LotteryError> {
        let school_id = self.school_for_admin(admin_id).await?;
        Ok(LotteryConfigRepository::remove_prefill(&self.db, school_id, company_id).await?)
    }

    /// 启动时调用：上次进程遗留的 RUNNING 任务已无执行者
    pub async fn recover(&self) -> Result<u64, LotteryError> {
        info!("正在检查中断的抽签任务...");
        let count =
            LotteryJobRepository::fail_stale_running(&self.db, RESTART_INTERRUPTED_MESSAGE)
                .await?;
        if count > 0 {
            warn!("⚠ {} 个抽签任务因进程重启被标记为 FAILED", count);
            let _ = self.evt_tx.send(AppEvent::Log(format!(
                "⚠ 系统恢复: {} 个中断的抽签任务已标记为失败",
                count
            )));
        } else {
            info!("未发现中断的抽签任务");
        }
        Ok(count)
    }
}

fn status_view(job: lottery_job::Model) -> JobStatusView {
    let status = JobStatus::parse(&job.status).unwrap_or_else(|| {
        warn!("抽签任务 [{}] 状态未知: {}", job.id, job.status);
        JobStatus::Failed
    });
    JobStatusView {
        job_id: job.id,
        event_id: job.event_id,
        status,
        progress: job.progress,
        current_seed: job.current_seed,
        started_at: job.started_at,
        completed_at: job.completed_at,
        error: job.error_message,
    }
}
