use crate::lottery::model::{
    AssignmentMap, GradeOrder, Placement, StudentPreferences, TrialOutcome, MAX_HONORED_RANK,
};
use crate::lottery::overrides::ResolvedOverrides;
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Reverse;

/// 单次试验：打乱顺序后按志愿轮次贪心分配
#[derive(Debug, Clone, Copy, Default)]
pub struct TrialMatcher {
    grade_order: GradeOrder,
}

impl TrialMatcher {
    pub fn new(grade_order: GradeOrder) -> Self {
        Self { grade_order }
    }

    /// Fisher-Yates 打乱后按年级做稳定排序，同年级内的先后由打乱结果决定
    pub fn order_students<'a, R: Rng + ?Sized>(
        &self,
        students: &'a [StudentPreferences],
        rng: &mut R,
    ) -> Vec<&'a StudentPreferences> {
        let mut order: Vec<&StudentPreferences> = students.iter().collect();
        order.shuffle(rng);
        match self.grade_order {
            GradeOrder::None => {}
            GradeOrder::Ascending => order.sort_by_key(|s| s.grade),
            GradeOrder::Descending => order.sort_by_key(|s| Reverse(s.grade)),
        }
        order
    }

    pub fn run<R: Rng + ?Sized>(
        &self,
        students: &[StudentPreferences],
        overrides: &ResolvedOverrides,
        rng: &mut R,
    ) -> TrialOutcome {
        let order = self.order_students(students, rng);

        // 每次试验都从预处理结果重新拷贝，试验之间互不影响
        let mut capacities = overrides.capacities.clone();
        let mut assignments: AssignmentMap = overrides.seeded.clone();
        for s in &order {
            assignments
                .entry(s.student_id)
                .or_insert_with(Placement::unassigned);
        }

        let mut cost: i64 = 0;
        for rank in 0..=MAX_HONORED_RANK {
            for s in &order {
                let placed = assignments
                    .get(&s.student_id)
                    .map(|p| p.is_assigned())
                    .unwrap_or(false);
                if placed {
                    continue;
                }
                let Some(position_id) = s.choice_at(rank) else {
                    continue;
                };
                let Some(remaining) = capacities.get_mut(&position_id) else {
                    continue;
                };
                if *remaining > 0 {
                    *remaining -= 1;
                    assignments.insert(s.student_id, Placement::ranked(position_id, rank));
                    cost += rank as i64;
                }
            }
        }

        TrialOutcome { assignments, cost }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lottery::model::{Choice, ManualAssignment, PositionSlots, MANUAL_RANK};
    use crate::lottery::overrides::resolve;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn student(id: i32, grade: i32, prefs: &[(i32, i32)]) -> StudentPreferences {
        StudentPreferences {
            student_id: id,
            grade,
            choices: prefs
                .iter()
                .map(|&(position_id, rank)| Choice { position_id, rank })
                .collect(),
        }
    }

    fn slots(list: &[(i32, i32)]) -> Vec<PositionSlots> {
        list.iter()
            .map(|&(id, n)| PositionSlots {
                position_id: id,
                slots: n,
                company_id: None,
            })
            .collect()
    }

    #[test]
    fn capacity_and_completeness_hold_for_every_seed() {
        let positions = slots(&[(1, 2), (2, 1), (3, 3)]);
        let students: Vec<StudentPreferences> = (0..12)
            .map(|i| student(i, 9 + i % 4, &[(1 + i % 3, 0), (1 + (i + 1) % 3, 1), (1 + (i + 2) % 3, 2)]))
            .collect();
        let overrides = resolve(&positions, &[], &[], &HashSet::new());
        let matcher = TrialMatcher::new(GradeOrder::None);

        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = matcher.run(&students, &overrides, &mut rng);
            assert_eq!(outcome.assignments.len(), students.len());

            let mut used: HashMap<i32, i32> = HashMap::new();
            for p in outcome.assignments.values() {
                if let Some(pid) = p.position_id {
                    *used.entry(pid).or_default() += 1;
                } else {
                    assert!(p.rank.is_none());
                }
            }
            for pos in &positions {
                assert!(used.get(&pos.position_id).copied().unwrap_or(0) <= pos.slots);
            }
            let cost: i64 = outcome
                .assignments
                .values()
                .filter_map(|p| p.rank)
                .map(|r| r as i64)
                .sum();
            assert_eq!(cost, outcome.cost);
        }
    }

    #[test]
    fn manual_assignment_blocks_competitor() {
        let positions = slots(&[(1, 1)]);
        let x = student(100, 10, &[]);
        let y = student(200, 10, &[(1, 0)]);
        let overrides = resolve(
            &positions,
            &[ManualAssignment {
                student_id: 100,
                position_id: 1,
            }],
            &[],
            &HashSet::from([100, 200]),
        );
        let matcher = TrialMatcher::new(GradeOrder::None);
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = matcher.run(&[x.clone(), y.clone()], &overrides, &mut rng);
            assert_eq!(outcome.assignments[&100], Placement::manual(1));
            assert_eq!(outcome.assignments[&100].rank, Some(MANUAL_RANK));
            assert_eq!(outcome.assignments[&200], Placement::unassigned());
            assert_eq!(outcome.cost, 0);
        }
    }

    #[test]
    fn ranks_beyond_nine_are_never_honored() {
        let positions = slots(&[(1, 5), (2, 5)]);
        let s = student(1, 11, &[(1, 10)]);
        let t = student(2, 11, &[(1, 12), (2, 9)]);
        let overrides = resolve(&positions, &[], &[], &HashSet::new());
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = TrialMatcher::default().run(&[s, t], &overrides, &mut rng);
        assert_eq!(outcome.assignments[&1], Placement::unassigned());
        assert_eq!(outcome.assignments[&2], Placement::ranked(2, 9));
        assert_eq!(outcome.cost, 9);
    }

    #[test]
    fn grade_order_decides_contention() {
        let positions = slots(&[(1, 1)]);
        let junior = student(1, 9, &[(1, 0)]);
        let senior = student(2, 12, &[(1, 0)]);
        let students = [junior, senior];
        let overrides = resolve(&positions, &[], &[], &HashSet::new());

        for seed in 0..30u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let asc = TrialMatcher::new(GradeOrder::Ascending).run(&students, &overrides, &mut rng);
            assert!(asc.assignments[&1].is_assigned());
            assert!(!asc.assignments[&2].is_assigned());

            let desc =
                TrialMatcher::new(GradeOrder::Descending).run(&students, &overrides, &mut rng);
            assert!(desc.assignments[&2].is_assigned());
            assert!(!desc.assignments[&1].is_assigned());
        }
    }

    #[test]
    fn lower_tier_is_filled_before_higher_tier() {
        // 学生 1 的第二志愿与学生 2 的第一志愿冲突：第一轮先满足学生 2
        let positions = slots(&[(1, 1), (2, 1)]);
        let a = student(1, 10, &[(2, 0), (1, 1)]);
        let b = student(2, 10, &[(1, 0)]);
        let c = student(3, 10, &[(2, 1)]);
        let overrides = resolve(&positions, &[], &[], &HashSet::new());
        for seed in 0..30u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome =
                TrialMatcher::default().run(&[a.clone(), b.clone(), c.clone()], &overrides, &mut rng);
            assert_eq!(outcome.assignments[&1], Placement::ranked(2, 0));
            assert_eq!(outcome.assignments[&2], Placement::ranked(1, 0));
            assert_eq!(outcome.assignments[&3], Placement::unassigned());
        }
    }
}
