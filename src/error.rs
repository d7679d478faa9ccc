use thiserror::Error;

/// 写入任务记录的错误信息上限（字符数）
pub const ERROR_MESSAGE_LIMIT: usize = 190;

#[derive(Error, Debug)]
pub enum LotteryError {
    #[error("admin {0} not found")]
    AdminNotFound(i32),

    #[error("admin {0} is not linked to a school")]
    AdminHasNoSchool(i32),

    #[error("school {0} has no active event")]
    NoActiveEvent(i32),

    #[error("event {0} has no positions")]
    NoPositions(i32),

    #[error("no student has made a choice for event {0}")]
    NoStudentChoices(i32),

    #[error("event {0} not found")]
    EventNotFound(i32),

    #[error("lottery job {0} not found")]
    JobNotFound(i32),

    #[error("lottery job {0} was superseded by a newer run")]
    Superseded(i32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl LotteryError {
    /// 前置条件失败：在任务进入 RUNNING 之前同步返回给调用方
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LotteryError::AdminNotFound(_)
                | LotteryError::AdminHasNoSchool(_)
                | LotteryError::NoActiveEvent(_)
                | LotteryError::NoPositions(_)
                | LotteryError::NoStudentChoices(_)
        )
    }

    /// 截断后的错误信息，用于写入 lottery_jobs.error_message
    pub fn job_message(&self) -> String {
        truncate_message(&self.to_string())
    }
}

pub fn truncate_message(msg: &str) -> String {
    msg.chars().take(ERROR_MESSAGE_LIMIT).collect()
}
