//! 手动指派与预留名额的预处理。
//!
//! 顺序固定：先按名义 slots 扣除公司预留（floor(slots * pct / 100)），
//! 再让手动指派从扣除后的剩余名额中各占一个。名单外的学生、剩余名额不足的手动指派
//! 被跳过，结果以 [`ManualOutcome`] 标记，不作为错误返回。

use crate::lottery::model::{
    AssignmentMap, CompanyId, ManualAssignment, ManualOutcome, Placement, PositionId,
    PositionSlots, PrefillReservation, StudentId,
};
use log::warn;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOverrides {
    /// 随机阶段可用的名额
    pub capacities: HashMap<PositionId, i32>,
    /// 已经确定的手动指派（rank = -1）
    pub seeded: AssignmentMap,
    /// 每条手动指派的处理结果，顺序与输入一致
    pub manual_outcomes: Vec<(ManualAssignment, ManualOutcome)>,
}

impl ResolvedOverrides {
    pub fn applied_manual_count(&self) -> usize {
        self.manual_outcomes
            .iter()
            .filter(|(_, o)| *o == ManualOutcome::Applied)
            .count()
    }
}

/// 预留名额：floor(slots * pct / 100)，不会超过 slots
pub fn withheld_slots(slots: i32, percentage: i32) -> i32 {
    let slots = slots.max(0);
    let pct = percentage.clamp(0, 100) as i64;
    let withheld = (slots as i64 * pct) / 100;
    (withheld as i32).min(slots)
}

/// `eligible` 为可参与抽签的学生（本校、非测试账号）
pub fn resolve(
    positions: &[PositionSlots],
    manual: &[ManualAssignment],
    prefill: &[PrefillReservation],
    eligible: &HashSet<StudentId>,
) -> ResolvedOverrides {
    // 同一公司多条预留时以最后一条为准
    let prefill_by_company: HashMap<CompanyId, i32> = prefill
        .iter()
        .map(|p| (p.company_id, p.percentage))
        .collect();

    let mut capacities: HashMap<PositionId, i32> = HashMap::with_capacity(positions.len());
    for pos in positions {
        let nominal = pos.slots.max(0);
        let withheld = pos
            .company_id
            .and_then(|c| prefill_by_company.get(&c))
            .map(|pct| withheld_slots(nominal, *pct))
            .unwrap_or(0);
        capacities.insert(pos.position_id, nominal - withheld);
    }

    let mut seeded = AssignmentMap::new();
    let mut manual_outcomes = Vec::with_capacity(manual.len());
    for m in manual {
        let outcome = if !eligible.contains(&m.student_id) {
            ManualOutcome::SkippedUnknownStudent
        } else if seeded.contains_key(&m.student_id) {
            ManualOutcome::SkippedDuplicateStudent
        } else {
            match capacities.get_mut(&m.position_id) {
                None => ManualOutcome::SkippedUnknownPosition,
                Some(remaining) if *remaining < 1 => ManualOutcome::SkippedNoCapacity,
                Some(remaining) => {
                    *remaining -= 1;
                    seeded.insert(m.student_id, Placement::manual(m.position_id));
                    ManualOutcome::Applied
                }
            }
        };
        if outcome != ManualOutcome::Applied {
            warn!(
                "⚠ 手动指派被跳过: student={} position={} ({:?})",
                m.student_id, m.position_id, outcome
            );
        }
        manual_outcomes.push((*m, outcome));
    }

    ResolvedOverrides {
        capacities,
        seeded,
        manual_outcomes,
    }
}
