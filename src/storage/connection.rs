use crate::storage::entity::{
    admin, company, event, lottery_configuration, lottery_job, lottery_manual_assignment,
    lottery_prefill_setting, lottery_result, position, school, student, student_choice,
};
use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    if is_memory_url(db_url) {
        // 内存库每个连接各自独立，只能用单连接
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(10)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8));
    }
    opt.sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    if !is_memory_url(db_url) {
        // 启用 WAL 模式，状态轮询的读不会阻塞抽签任务的写
        db.execute(sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
    }

    create_tables(&db).await?;

    info!("Database connection established and tables initialized.");

    Ok(db)
}

fn is_memory_url(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmts = [
        schema.create_table_from_entity(school::Entity).if_not_exists().to_owned(),
        schema.create_table_from_entity(admin::Entity).if_not_exists().to_owned(),
        schema.create_table_from_entity(event::Entity).if_not_exists().to_owned(),
        schema.create_table_from_entity(company::Entity).if_not_exists().to_owned(),
        schema.create_table_from_entity(position::Entity).if_not_exists().to_owned(),
        schema.create_table_from_entity(student::Entity).if_not_exists().to_owned(),
        schema
            .create_table_from_entity(student_choice::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(lottery_configuration::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(lottery_manual_assignment::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(lottery_prefill_setting::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(lottery_job::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(lottery_result::Entity)
            .if_not_exists()
            .to_owned(),
    ];
    for stmt in stmts.iter() {
        db.execute(builder.build(stmt)).await?;
    }

    // 唯一索引：结果按 (job, student) 去重插入；每个学校只有一份抽签配置
    let indexes = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_lottery_results_job_student ON lottery_results(job_id, student_id);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_lottery_configurations_school ON lottery_configurations(school_id);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_lottery_prefill_config_company ON lottery_prefill_settings(configuration_id, company_id);",
        "CREATE INDEX IF NOT EXISTS idx_lottery_jobs_event ON lottery_jobs(event_id);",
        "CREATE INDEX IF NOT EXISTS idx_student_choices_event ON student_choices(event_id);",
    ];
    for sql in indexes {
        db.execute(sea_orm::Statement::from_string(
            builder,
            sql.to_string(),
        ))
        .await?;
    }

    Ok(())
}
