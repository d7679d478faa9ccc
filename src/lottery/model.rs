use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type StudentId = i32;
pub type PositionId = i32;
pub type CompanyId = i32;

/// 手动指派的哨兵 rank，不计入 cost
pub const MANUAL_RANK: i32 = -1;
/// 只兑现 rank 0..=9 的志愿
pub const MAX_HONORED_RANK: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub position_id: PositionId,
    pub rank: i32,
}

/// 一次任务运行期间不可变的学生快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentPreferences {
    pub student_id: StudentId,
    pub grade: i32,
    pub choices: Vec<Choice>,
}

impl StudentPreferences {
    /// 当前轮次对应的志愿（同 rank 多条时取第一条）
    pub fn choice_at(&self, rank: i32) -> Option<PositionId> {
        self.choices
            .iter()
            .find(|c| c.rank == rank)
            .map(|c| c.position_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSlots {
    pub position_id: PositionId,
    pub slots: i32,
    pub company_id: Option<CompanyId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualAssignment {
    pub student_id: StudentId,
    pub position_id: PositionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefillReservation {
    pub company_id: CompanyId,
    pub percentage: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradeOrder {
    #[default]
    None,
    Ascending,
    Descending,
}

impl GradeOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeOrder::None => "NONE",
            GradeOrder::Ascending => "ASCENDING",
            GradeOrder::Descending => "DESCENDING",
        }
    }
}

impl fmt::Display for GradeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" | "" => Ok(GradeOrder::None),
            "ASCENDING" | "ASC" => Ok(GradeOrder::Ascending),
            "DESCENDING" | "DESC" => Ok(GradeOrder::Descending),
            other => Err(format!("unknown grade order: {}", other)),
        }
    }
}

/// 某个学生在一次试验中的结果；position_id 为 None 表示未分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub position_id: Option<PositionId>,
    pub rank: Option<i32>,
}

impl Placement {
    pub fn unassigned() -> Self {
        Self::default()
    }

    pub fn manual(position_id: PositionId) -> Self {
        Self {
            position_id: Some(position_id),
            rank: Some(MANUAL_RANK),
        }
    }

    pub fn ranked(position_id: PositionId, rank: i32) -> Self {
        Self {
            position_id: Some(position_id),
            rank: Some(rank),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.position_id.is_some()
    }
}

pub type AssignmentMap = BTreeMap<StudentId, Placement>;

/// 手动指派的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualOutcome {
    Applied,
    /// 学生不在本校名单中（不存在或是测试账号）
    SkippedUnknownStudent,
    SkippedNoCapacity,
    SkippedUnknownPosition,
    SkippedDuplicateStudent,
}

/// 一次试验的完整产出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialOutcome {
    pub assignments: AssignmentMap,
    pub cost: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// 供轮询方读取的任务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: i32,
    pub event_id: i32,
    pub status: JobStatus,
    pub progress: i32,
    pub current_seed: i32,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

/// 持久化后的单条抽签结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub student_id: StudentId,
    pub position_id: PositionId,
    pub rank: i32,
}
