use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set};
use shadow_lottery::app_state::AppEvent;
use shadow_lottery::config::EngineSettings;
use shadow_lottery::lottery::model::{GradeOrder, JobStatus, ResultRow, MANUAL_RANK};
use shadow_lottery::lottery::optimizer::{ProgressSink, TrialProgress};
use shadow_lottery::lottery::service::RESTART_INTERRUPTED_MESSAGE;
use shadow_lottery::lottery::worker::{DbProgressSink, LotteryWorker};
use shadow_lottery::lottery::LotteryService;
use shadow_lottery::storage::entity::{
    admin, event, lottery_configuration, lottery_result, position, school, student,
    student_choice,
};
use shadow_lottery::storage::establish_connection;
use shadow_lottery::storage::repository::{LotteryConfigRepository, LotteryJobRepository};
use shadow_lottery::LotteryError;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Fixture {
    db: Arc<DatabaseConnection>,
    service: LotteryService,
    _evt_rx: mpsc::UnboundedReceiver<AppEvent>,
    school_id: i32,
    admin_id: i32,
    event_id: i32,
}

fn test_settings() -> EngineSettings {
    EngineSettings {
        trials: 300,
        progress_interval: 100,
        rng_seed: Some(7),
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

async fn setup() -> Fixture {
    let db = Arc::new(establish_connection("sqlite::memory:").await.unwrap());

    let school = school::ActiveModel {
        name: Set("Lincoln High".to_string()),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db.as_ref())
    .await
    .unwrap();

    let admin = admin::ActiveModel {
        email: Set("admin@lincoln.test".to_string()),
        school_id: Set(Some(school.id)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db.as_ref())
    .await
    .unwrap();

    let event = event::ActiveModel {
        school_id: Set(school.id),
        name: Set("Spring Job Shadow".to_string()),
        event_date: Set(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap().timestamp()),
        is_active: Set(true),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db.as_ref())
    .await
    .unwrap();

    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    let service = LotteryService::new(db.clone(), test_settings(), evt_tx);

    Fixture {
        db,
        service,
        _evt_rx: evt_rx,
        school_id: school.id,
        admin_id: admin.id,
        event_id: event.id,
    }
}

impl Fixture {
    async fn position(&self, slots: i32, company_id: Option<i32>) -> i32 {
        self.listing(slots, company_id, false).await
    }

    async fn listing(&self, slots: i32, company_id: Option<i32>, is_test_listing: bool) -> i32 {
        position::ActiveModel {
            event_id: Set(self.event_id),
            company_id: Set(company_id),
            title: Set(format!("Shadow slot x{}", slots)),
            slots: Set(slots),
            is_test_listing: Set(is_test_listing),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .unwrap()
        .id
    }

    async fn student(&self, graduation_year: i32, is_test_account: bool) -> i32 {
        student::ActiveModel {
            school_id: Set(self.school_id),
            name: Set(format!("student {}", graduation_year)),
            graduation_year: Set(graduation_year),
            is_test_account: Set(is_test_account),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .unwrap()
        .id
    }

    async fn choose(&self, student_id: i32, prefs: &[i32]) {
        for (rank, position_id) in prefs.iter().enumerate() {
            student_choice::ActiveModel {
                student_id: Set(student_id),
                event_id: Set(self.event_id),
                position_id: Set(*position_id),
                rank: Set(rank as i32),
                created_at: Set(now()),
                ..Default::default()
            }
            .insert(self.db.as_ref())
            .await
            .unwrap();
        }
    }

    async fn run_to_end(&self) -> i32 {
        let handle = self.service.start_job(self.admin_id).await.unwrap();
        handle.task.await.unwrap();
        handle.job_id
    }
}

#[tokio::test]
async fn completed_job_persists_only_assigned_students() {
    let fx = setup().await;
    let p1 = fx.position(1, None).await;
    let p2 = fx.position(1, None).await;
    let a = fx.student(2027, false).await;
    let b = fx.student(2027, false).await;
    let c = fx.student(2027, false).await;
    fx.choose(a, &[p1, p2]).await;
    fx.choose(b, &[p2, p1]).await;
    fx.choose(c, &[p1]).await;

    let job_id = fx.run_to_end().await;

    let status = fx.service.job_status(job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(status.current_seed, 300);
    assert!(status.completed_at.is_some());
    assert!(status.error.is_none());

    let rows = fx.service.job_results(job_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let mut used: Vec<i32> = rows.iter().map(|r| r.position_id).collect();
    used.sort();
    assert_eq!(used, vec![p1.min(p2), p1.max(p2)]);
    assert!(rows.iter().all(|r| r.rank >= 0));

    assert_eq!(fx.service.running_job_for_admin(fx.admin_id).await.unwrap(), None);
}

#[tokio::test]
async fn mirrored_preferences_reach_zero_cost() {
    let fx = setup().await;
    let p1 = fx.position(1, None).await;
    let p2 = fx.position(1, None).await;
    let a = fx.student(2026, false).await;
    let b = fx.student(2026, false).await;
    fx.choose(a, &[p1, p2]).await;
    fx.choose(b, &[p2, p1]).await;

    let job_id = fx.run_to_end().await;
    let rows = fx.service.job_results(job_id).await.unwrap();
    assert_eq!(
        rows,
        vec![
            ResultRow {
                student_id: a,
                position_id: p1,
                rank: 0
            },
            ResultRow {
                student_id: b,
                position_id: p2,
                rank: 0
            },
        ]
    );
}

#[tokio::test]
async fn preconditions_fail_synchronously_without_creating_a_job() {
    let fx = setup().await;

    let err = fx.service.start_job(9999).await.err().unwrap();
    assert!(matches!(err, LotteryError::AdminNotFound(9999)));

    let orphan = admin::ActiveModel {
        email: Set("nobody@test".to_string()),
        school_id: Set(None),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(fx.db.as_ref())
    .await
    .unwrap();
    let err = fx.service.start_job(orphan.id).await.err().unwrap();
    assert!(matches!(err, LotteryError::AdminHasNoSchool(_)));

    let err = fx.service.start_job(fx.admin_id).await.err().unwrap();
    assert!(matches!(err, LotteryError::NoPositions(id) if id == fx.event_id));

    let p = fx.position(3, None).await;
    let err = fx.service.start_job(fx.admin_id).await.err().unwrap();
    assert!(matches!(err, LotteryError::NoStudentChoices(_)));

    // 只选了测试岗位的学生没有有效志愿
    let demo = fx.listing(5, None, true).await;
    let real = fx.student(2027, false).await;
    fx.choose(real, &[demo]).await;
    let err = fx.service.start_job(fx.admin_id).await.err().unwrap();
    assert!(matches!(err, LotteryError::NoStudentChoices(id) if id == fx.event_id));

    // 测试账号的志愿不算
    let tester = fx.student(2027, true).await;
    fx.choose(tester, &[p]).await;
    let err = fx.service.start_job(fx.admin_id).await.err().unwrap();
    assert!(err.is_precondition());

    assert!(fx
        .service
        .latest_job_for_event(fx.event_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn no_active_event_is_a_precondition_failure() {
    let fx = setup().await;
    let mut am: event::ActiveModel = event::Entity::find_by_id(fx.event_id)
        .one(fx.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    am.is_active = Set(false);
    am.update(fx.db.as_ref()).await.unwrap();

    let err = fx.service.start_job(fx.admin_id).await.err().unwrap();
    assert!(matches!(err, LotteryError::NoActiveEvent(id) if id == fx.school_id));
    assert_eq!(fx.service.running_job_for_admin(fx.admin_id).await.unwrap(), None);
}

#[tokio::test]
async fn restarting_removes_previous_job_and_results() {
    let fx = setup().await;
    let p = fx.position(2, None).await;
    let s1 = fx.student(2027, false).await;
    let s2 = fx.student(2028, false).await;
    fx.choose(s1, &[p]).await;
    fx.choose(s2, &[p]).await;

    let first = fx.run_to_end().await;
    assert_eq!(fx.service.job_results(first).await.unwrap().len(), 2);

    let second = fx.run_to_end().await;
    assert_ne!(first, second);

    assert!(matches!(
        fx.service.job_status(first).await,
        Err(LotteryError::JobNotFound(id)) if id == first
    ));
    assert!(matches!(
        fx.service.job_results(first).await,
        Err(LotteryError::JobNotFound(_))
    ));

    let all_results = lottery_result::Entity::find().all(fx.db.as_ref()).await.unwrap();
    assert_eq!(all_results.len(), 2);
    assert!(all_results.iter().all(|r| r.job_id == second));
}

#[tokio::test]
async fn superseded_in_flight_job_never_writes_results() {
    let fx = setup().await;
    let p = fx.position(1, None).await;
    let s = fx.student(2027, false).await;
    fx.choose(s, &[p]).await;

    let first = fx.service.start_job(fx.admin_id).await.unwrap();
    let second = fx.service.start_job(fx.admin_id).await.unwrap();
    first.task.await.unwrap();
    second.task.await.unwrap();

    assert!(matches!(
        fx.service.job_status(first.job_id).await,
        Err(LotteryError::JobNotFound(_))
    ));
    let status = fx.service.job_status(second.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);

    let all_results = lottery_result::Entity::find().all(fx.db.as_ref()).await.unwrap();
    assert_eq!(all_results.len(), 1);
    assert_eq!(all_results[0].job_id, second.job_id);
}

#[tokio::test]
async fn manual_assignment_and_prefill_share_the_withheld_pool() {
    let fx = setup().await;
    let company = 42;
    // 2 个名额，预留 50% => 抽签可用 1 个，被手动指派占用
    let p = fx.position(2, Some(company)).await;
    let other = fx.position(1, None).await;
    let x = fx.student(2027, false).await;
    let y = fx.student(2027, false).await;
    fx.choose(y, &[p, other]).await;

    LotteryConfigRepository::set_prefill(fx.db.as_ref(), fx.school_id, company, 50)
        .await
        .unwrap();
    fx.service
        .add_manual_assignment(fx.admin_id, x, p)
        .await
        .unwrap();

    let job_id = fx.run_to_end().await;
    let rows = fx.service.job_results(job_id).await.unwrap();
    assert!(rows.contains(&ResultRow {
        student_id: x,
        position_id: p,
        rank: MANUAL_RANK
    }));
    assert!(rows.contains(&ResultRow {
        student_id: y,
        position_id: other,
        rank: 1
    }));
}

#[tokio::test]
async fn grade_order_policy_is_read_from_configuration() {
    let fx = setup().await;
    let p = fx.position(1, None).await;
    let senior = fx.student(2026, false).await;
    let freshman = fx.student(2029, false).await;
    fx.choose(senior, &[p]).await;
    fx.choose(freshman, &[p]).await;

    fx.service
        .set_grade_order(fx.admin_id, GradeOrder::Descending)
        .await
        .unwrap();
    let job_id = fx.run_to_end().await;
    let rows = fx.service.job_results(job_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].student_id, senior);

    fx.service
        .set_grade_order(fx.admin_id, GradeOrder::Ascending)
        .await
        .unwrap();
    let job_id = fx.run_to_end().await;
    let rows = fx.service.job_results(job_id).await.unwrap();
    assert_eq!(rows[0].student_id, freshman);
}

#[tokio::test]
async fn configuration_is_created_lazily_with_none_policy() {
    let fx = setup().await;
    let p = fx.position(1, None).await;
    let s = fx.student(2027, false).await;
    fx.choose(s, &[p]).await;

    assert_eq!(
        lottery_configuration::Entity::find()
            .count(fx.db.as_ref())
            .await
            .unwrap(),
        0
    );
    fx.run_to_end().await;

    let configs = lottery_configuration::Entity::find()
        .all(fx.db.as_ref())
        .await
        .unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].school_id, fx.school_id);
    assert_eq!(configs[0].grade_order, "NONE");
}

#[tokio::test]
async fn failures_are_recorded_on_the_job() {
    let fx = setup().await;
    let (job_id, _) = LotteryJobRepository::start_fresh(fx.db.as_ref(), fx.event_id)
        .await
        .unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    // event 在运行中途消失
    LotteryService::drive_job(fx.db.clone(), job_id, 777, test_settings(), tx).await;

    let status = fx.service.job_status(job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error.as_deref(), Some("event 777 not found"));
    assert!(fx.service.job_results(job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn running_job_lookup_and_restart_recovery() {
    let fx = setup().await;
    let (job_id, _) = LotteryJobRepository::start_fresh(fx.db.as_ref(), fx.event_id)
        .await
        .unwrap();
    assert_eq!(
        fx.service.running_job_for_admin(fx.admin_id).await.unwrap(),
        Some(job_id)
    );

    assert_eq!(fx.service.recover().await.unwrap(), 1);
    let status = fx.service.job_status(job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error.as_deref(), Some(RESTART_INTERRUPTED_MESSAGE));
    assert_eq!(fx.service.running_job_for_admin(fx.admin_id).await.unwrap(), None);

    // 已结束的任务不再接受进度写入
    assert_eq!(
        LotteryJobRepository::update_progress(fx.db.as_ref(), job_id, 50, 10)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn result_insert_is_duplicate_safe() {
    let fx = setup().await;
    let p = fx.position(3, None).await;
    let s = fx.student(2027, false).await;
    let (job_id, _) = LotteryJobRepository::start_fresh(fx.db.as_ref(), fx.event_id)
        .await
        .unwrap();
    let rows = vec![ResultRow {
        student_id: s,
        position_id: p,
        rank: 0,
    }];

    let first = LotteryJobRepository::insert_results(fx.db.as_ref(), job_id, &rows)
        .await
        .unwrap();
    let again = LotteryJobRepository::insert_results(fx.db.as_ref(), job_id, &rows)
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(again, 0);
    assert_eq!(
        LotteryJobRepository::load_results(fx.db.as_ref(), job_id)
            .await
            .unwrap(),
        rows
    );
}

#[tokio::test]
async fn manual_assignment_for_test_account_is_ignored() {
    let fx = setup().await;
    let p = fx.position(1, None).await;
    let real = fx.student(2027, false).await;
    let tester = fx.student(2027, true).await;
    fx.choose(real, &[p]).await;
    fx.service
        .add_manual_assignment(fx.admin_id, tester, p)
        .await
        .unwrap();

    let job_id = fx.run_to_end().await;
    let rows = fx.service.job_results(job_id).await.unwrap();
    assert_eq!(
        rows,
        vec![ResultRow {
            student_id: real,
            position_id: p,
            rank: 0
        }]
    );
}

#[tokio::test]
async fn removed_overrides_no_longer_apply() {
    let fx = setup().await;
    let company = 7;
    let p = fx.position(2, Some(company)).await;
    let x = fx.student(2027, false).await;
    let y = fx.student(2027, false).await;
    fx.choose(x, &[p]).await;
    fx.choose(y, &[p]).await;

    // 超出范围的比例按截断后的值保存
    assert_eq!(fx.service.set_prefill(fx.admin_id, company, 150).await.unwrap(), 100);
    fx.service.add_manual_assignment(fx.admin_id, x, p).await.unwrap();

    let job_id = fx.run_to_end().await;
    assert!(fx.service.job_results(job_id).await.unwrap().is_empty());

    assert_eq!(fx.service.remove_prefill(fx.admin_id, company).await.unwrap(), 1);
    assert_eq!(fx.service.remove_manual_assignment(fx.admin_id, x).await.unwrap(), 1);
    assert_eq!(fx.service.remove_manual_assignment(fx.admin_id, x).await.unwrap(), 0);

    let job_id = fx.run_to_end().await;
    let rows = fx.service.job_results(job_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.rank == 0));
}

#[tokio::test]
async fn progress_for_a_deleted_job_reports_superseded() {
    let fx = setup().await;
    let (job_id, _) = LotteryJobRepository::start_fresh(fx.db.as_ref(), fx.event_id)
        .await
        .unwrap();
    let mut sink = DbProgressSink::new(fx.db.as_ref(), job_id);

    sink.report(TrialProgress { seed: 100, percent: 2 })
        .await
        .unwrap();
    let status = fx.service.job_status(job_id).await.unwrap();
    assert_eq!((status.progress, status.current_seed), (2, 100));

    LotteryJobRepository::delete_jobs_for_event(fx.db.as_ref(), fx.event_id)
        .await
        .unwrap();
    let err = sink
        .report(TrialProgress { seed: 200, percent: 4 })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, LotteryError::Superseded(id) if id == job_id));
}

struct PanickingSink;

#[async_trait]
impl ProgressSink for PanickingSink {
    async fn report(&mut self, _progress: TrialProgress) -> Result<(), LotteryError> {
        panic!("sink exploded");
    }
}

#[tokio::test]
async fn panic_during_run_is_recorded_as_failure() {
    let fx = setup().await;
    let p = fx.position(1, None).await;
    let s = fx.student(2027, false).await;
    fx.choose(s, &[p]).await;
    let (job_id, _) = LotteryJobRepository::start_fresh(fx.db.as_ref(), fx.event_id)
        .await
        .unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let settings = test_settings();
    let mut sink = PanickingSink;

    let run = LotteryWorker::run_with_sink(fx.db.as_ref(), job_id, fx.event_id, &settings, &mut sink);
    LotteryService::supervise(fx.db.as_ref(), job_id, &tx, run).await;

    let status = fx.service.job_status(job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error.as_deref(), Some("internal error: sink exploded"));
    assert!(fx.service.job_results(job_id).await.unwrap().is_empty());
}
