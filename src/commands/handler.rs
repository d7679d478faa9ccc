use crate::app_state::AppEvent;
use crate::commands::app_command::{AppCommand, HELP_TEXT};
use crate::lottery::model::JobStatus;
use crate::lottery::LotteryService;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// 执行一条命令；返回 false 表示应退出命令循环
pub async fn dispatch(
    cmd: AppCommand,
    service: &Arc<LotteryService>,
    evt_tx: &mpsc::UnboundedSender<AppEvent>,
) -> bool {
    match cmd {
        AppCommand::LotteryStart { admin_id } => match service.start_job(admin_id).await {
            // 不等待任务结束，进度通过 status / watch 查询
            Ok(handle) => {
                let _ = evt_tx.send(AppEvent::Message(format!(
                    "抽签任务 [ID: {}] 已在后台运行",
                    handle.job_id
                )));
            }
            // 前置条件不满足属于正常反馈，其余错误才算故障
            Err(e) if e.is_precondition() => {
                let _ = evt_tx.send(AppEvent::Message(format!("⚠ 暂不能抽签: {}", e)));
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("✗ 无法启动抽签: {}", e)));
            }
        },
        AppCommand::LotteryStatus { job_id } => match service.job_status(job_id).await {
            Ok(view) => {
                let _ = evt_tx.send(AppEvent::JobStatus(view));
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("查询失败: {}", e)));
            }
        },
        AppCommand::LotteryWatch {
            job_id,
            interval_sec,
        } => {
            let svc = service.clone();
            let tx = evt_tx.clone();
            tokio::spawn(async move {
                loop {
                    match svc.job_status(job_id).await {
                        Ok(view) => {
                            let done = view.status != JobStatus::Running;
                            let _ = tx.send(AppEvent::JobStatus(view));
                            if done {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(AppEvent::Error(format!("查询失败: {}", e)));
                            break;
                        }
                    }
                    sleep(Duration::from_secs(interval_sec.max(1))).await;
                }
            });
        }
        AppCommand::LotteryRunning { admin_id } => {
            match service.running_job_for_admin(admin_id).await {
                Ok(Some(job_id)) => {
                    let _ = evt_tx.send(AppEvent::Message(format!("运行中的抽签任务: {}", job_id)));
                }
                Ok(None) => {
                    let _ = evt_tx.send(AppEvent::Message("没有运行中的抽签任务".to_string()));
                }
                Err(e) => {
                    let _ = evt_tx.send(AppEvent::Error(format!("查询失败: {}", e)));
                }
            }
        }
        AppCommand::LotteryResults { job_id } => match service.job_results(job_id).await {
            Ok(rows) => {
                let _ = evt_tx.send(AppEvent::Results { job_id, rows });
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("查询失败: {}", e)));
            }
        },
        AppCommand::ConfigGrade { admin_id, order } => {
            match service.set_grade_order(admin_id, order).await {
                Ok(()) => {
                    let _ = evt_tx.send(AppEvent::Message(format!("年级排序已设置为 {}", order)));
                }
                Err(e) => {
                    let _ = evt_tx.send(AppEvent::Error(format!("更新配置失败: {}", e)));
                }
            }
        }
        AppCommand::ConfigManual {
            admin_id,
            student_id,
            position_id,
        } => match service
            .add_manual_assignment(admin_id, student_id, position_id)
            .await
        {
            Ok(()) => {
                let _ = evt_tx.send(AppEvent::Message(format!(
                    "已添加手动指派: 学生 {} -> 岗位 {}",
                    student_id, position_id
                )));
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("更新配置失败: {}", e)));
            }
        },
        AppCommand::ConfigPrefill {
            admin_id,
            company_id,
            percentage,
        } => match service.set_prefill(admin_id, company_id, percentage).await {
            Ok(stored) => {
                let _ = evt_tx.send(AppEvent::Message(format!(
                    "公司 {} 预留比例已设置为 {}%",
                    company_id, stored
                )));
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("更新配置失败: {}", e)));
            }
        },
        AppCommand::ConfigUnmanual {
            admin_id,
            student_id,
        } => match service.remove_manual_assignment(admin_id, student_id).await {
            Ok(0) => {
                let _ = evt_tx.send(AppEvent::Message(format!("学生 {} 没有手动指派", student_id)));
            }
            Ok(_) => {
                let _ = evt_tx.send(AppEvent::Message(format!("已取消学生 {} 的手动指派", student_id)));
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("更新配置失败: {}", e)));
            }
        },
        AppCommand::ConfigUnprefill {
            admin_id,
            company_id,
        } => match service.remove_prefill(admin_id, company_id).await {
            Ok(0) => {
                let _ = evt_tx.send(AppEvent::Message(format!("公司 {} 没有预留设置", company_id)));
            }
            Ok(_) => {
                let _ = evt_tx.send(AppEvent::Message(format!("已取消公司 {} 的名额预留", company_id)));
            }
            Err(e) => {
                let _ = evt_tx.send(AppEvent::Error(format!("更新配置失败: {}", e)));
            }
        },
        AppCommand::Help => {
            let _ = evt_tx.send(AppEvent::Message(HELP_TEXT.to_string()));
        }
        AppCommand::Quit => {
            let _ = evt_tx.send(AppEvent::Message("收到退出命令".to_string()));
            return false;
        }
        AppCommand::Unknown(msg) => {
            if !msg.is_empty() {
                let _ = evt_tx.send(AppEvent::Error(msg));
            }
        }
    }
    true
}
