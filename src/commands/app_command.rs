use crate::lottery::model::GradeOrder;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    LotteryStart {
        admin_id: i32,
    },
    LotteryStatus {
        job_id: i32,
    },
    LotteryWatch {
        job_id: i32,
        interval_sec: u64,
    },
    LotteryRunning {
        admin_id: i32,
    },
    LotteryResults {
        job_id: i32,
    },
    ConfigGrade {
        admin_id: i32,
        order: GradeOrder,
    },
    ConfigManual {
        admin_id: i32,
        student_id: i32,
        position_id: i32,
    },
    ConfigPrefill {
        admin_id: i32,
        company_id: i32,
        percentage: i32,
    },
    ConfigUnmanual {
        admin_id: i32,
        student_id: i32,
    },
    ConfigUnprefill {
        admin_id: i32,
        company_id: i32,
    },
    Help,
    Quit,
    Unknown(String),
}

const LOTTERY_USAGE: &str = "用法: lottery start <admin_id> | lottery status <job_id> | lottery watch <job_id> [interval] | lottery running <admin_id> | lottery results <job_id>";
const CONFIG_USAGE: &str = "用法: config grade <admin_id> <none|asc|desc> | config manual <admin_id> <student_id> <position_id> | config prefill <admin_id> <company_id> <percentage> | config unmanual <admin_id> <student_id> | config unprefill <admin_id> <company_id>";

pub const HELP_TEXT: &str = "可用命令: lottery start <admin_id> | lottery status <job_id> | lottery watch <job_id> [interval] | lottery running <admin_id> | lottery results <job_id> | config grade <admin_id> <none|asc|desc> | config manual <admin_id> <student_id> <position_id> | config prefill <admin_id> <company_id> <percentage> | config unmanual <admin_id> <student_id> | config unprefill <admin_id> <company_id> | help | quit";

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        match parts[0] {
            "lottery" => {
                let id = parts.get(2).and_then(|s| s.parse::<i32>().ok());
                match (parts.get(1).copied(), id) {
                    (Some("start"), Some(admin_id)) => Ok(AppCommand::LotteryStart { admin_id }),
                    (Some("status"), Some(job_id)) => Ok(AppCommand::LotteryStatus { job_id }),
                    (Some("watch"), Some(job_id)) => {
                        let interval_sec = parts
                            .get(3)
                            .and_then(|s| parse_interval_seconds(s))
                            .unwrap_or(1);
                        Ok(AppCommand::LotteryWatch {
                            job_id,
                            interval_sec,
                        })
                    }
                    (Some("running"), Some(admin_id)) => {
                        Ok(AppCommand::LotteryRunning { admin_id })
                    }
                    (Some("results"), Some(job_id)) => Ok(AppCommand::LotteryResults { job_id }),
                    _ => Ok(AppCommand::Unknown(LOTTERY_USAGE.to_string())),
                }
            }
            "config" => {
                let nums: Vec<Option<i32>> = parts
                    .iter()
                    .skip(2)
                    .map(|s| s.parse::<i32>().ok())
                    .collect();
                match (parts.get(1).copied(), nums.as_slice()) {
                    (Some("grade"), [Some(admin_id), ..]) => {
                        match parts.get(3).map(|s| s.parse::<GradeOrder>()) {
                            Some(Ok(order)) => Ok(AppCommand::ConfigGrade {
                                admin_id: *admin_id,
                                order,
                            }),
                            _ => Ok(AppCommand::Unknown(CONFIG_USAGE.to_string())),
                        }
                    }
                    (Some("manual"), [Some(admin_id), Some(student_id), Some(position_id)]) => {
                        Ok(AppCommand::ConfigManual {
                            admin_id: *admin_id,
                            student_id: *student_id,
                            position_id: *position_id,
                        })
                    }
                    (Some("prefill"), [Some(admin_id), Some(company_id), Some(percentage)]) => {
                        Ok(AppCommand::ConfigPrefill {
                            admin_id: *admin_id,
                            company_id: *company_id,
                            percentage: *percentage,
                        })
                    }
                    (Some("unmanual"), [Some(admin_id), Some(student_id)]) => {
                        Ok(AppCommand::ConfigUnmanual {
                            admin_id: *admin_id,
                            student_id: *student_id,
                        })
                    }
                    (Some("unprefill"), [Some(admin_id), Some(company_id)]) => {
                        Ok(AppCommand::ConfigUnprefill {
                            admin_id: *admin_id,
                            company_id: *company_id,
                        })
                    }
                    _ => Ok(AppCommand::Unknown(CONFIG_USAGE.to_string())),
                }
            }
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}

/// watch 的轮询间隔：纯数字或带 s / m 后缀
fn parse_interval_seconds(s: &str) -> Option<u64> {
    let t = s.trim().to_ascii_lowercase();
    match t.strip_suffix('m') {
        Some(mins) => mins.parse::<u64>().ok()?.checked_mul(60),
        None => t.strip_suffix('s').unwrap_or(&t).parse::<u64>().ok(),
    }
}
