use crate::lottery::model::{JobStatusView, ResultRow};

/// 后台任务向前台（命令行输出）推送的事件
#[derive(Debug, Clone)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    JobStatus(JobStatusView),
    Results { job_id: i32, rows: Vec<ResultRow> },
}
