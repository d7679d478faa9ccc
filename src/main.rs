use anyhow::Context;
use chrono::Local;
use shadow_lottery::app_state::AppEvent;
use shadow_lottery::commands::{dispatch, AppCommand};
use shadow_lottery::config::AppSettings;
use shadow_lottery::lottery::LotteryService;
use shadow_lottery::storage;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(&log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 日志写文件，标准输出留给命令结果
        .filter_level(log::LevelFilter::Warn)
        .filter_module("shadow_lottery", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    match dotenv::dotenv() {
        Ok(path) => println!("✓ 已加载 {}", path.display()),
        Err(_) => println!("⚠ 未找到 .env 文件，使用系统环境变量"),
    }

    let settings = AppSettings::from_env().context("读取配置失败")?;
    println!(
        "抽签参数: trials={} progress_interval={} rng_seed={:?}",
        settings.engine.trials, settings.engine.progress_interval, settings.engine.rng_seed
    );

    let db = storage::establish_connection(&settings.database_url)
        .await
        .with_context(|| format!("数据库连接失败: {}", settings.database_url))?;
    let db = Arc::new(db);
    println!("✓ 数据库连接成功 (日志: {})", log_path.display());

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();
    let service = Arc::new(LotteryService::new(
        db.clone(),
        settings.engine.clone(),
        evt_tx.clone(),
    ));

    if let Err(e) = service.recover().await {
        eprintln!("✗ 恢复中断任务时出错: {}", e);
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = evt_rx.recv().await {
            print_event(event);
        }
    });

    let _ = evt_tx.send(AppEvent::Message(
        "输入 help 查看可用命令".to_string(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let cmd = line.parse::<AppCommand>().unwrap_or(AppCommand::Help);
        if !dispatch(cmd, &service, &evt_tx).await {
            break;
        }
    }

    // 后台任务可能仍持有发送端，只等待片刻把已有消息打印完
    drop(service);
    drop(evt_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_millis(200), printer).await;

    Ok(())
}

fn print_event(event: AppEvent) {
    match event {
        AppEvent::Log(msg) | AppEvent::Message(msg) => println!("{}", msg),
        AppEvent::Error(msg) => eprintln!("{}", msg),
        AppEvent::JobStatus(view) => match serde_json::to_string(&view) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("无法序列化任务状态: {}", e),
        },
        AppEvent::Results { job_id, rows } => {
            println!("抽签任务 [{}] 结果: {} 条", job_id, rows.len());
            for r in rows {
                let rank = if r.rank < 0 {
                    "手动".to_string()
                } else {
                    format!("第 {} 志愿", r.rank + 1)
                };
                println!("  学生 {} -> 岗位 {} ({})", r.student_id, r.position_id, rank);
            }
        }
    }
}
