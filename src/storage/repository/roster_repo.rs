use crate::lottery::grade::grade_for_timestamp;
use crate::lottery::model::{Choice, PositionSlots, StudentPreferences};
use crate::storage::entity::admin::{self, Entity as Admin};
use crate::storage::entity::event::{self, Entity as Event};
use crate::storage::entity::position::{self, Entity as Position};
use crate::storage::entity::student::{self, Entity as Student};
use crate::storage::entity::student_choice::{self, Entity as StudentChoice};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// 抽签所需的只读数据：活动、岗位、学生志愿。测试账号与测试岗位一律排除。
pub struct RosterRepository;

impl RosterRepository {
    pub async fn find_admin(
        db: &DatabaseConnection,
        admin_id: i32,
    ) -> Result<Option<admin::Model>, sea_orm::DbErr> {
        Admin::find_by_id(admin_id).one(db).await
    }

    pub async fn active_event(
        db: &DatabaseConnection,
        school_id: i32,
    ) -> Result<Option<event::Model>, sea_orm::DbErr> {
        Event::find()
            .filter(event::Column::SchoolId.eq(school_id))
            .filter(event::Column::IsActive.eq(true))
            .order_by_desc(event::Column::Id)
            .one(db)
            .await
    }

    pub async fn find_event(
        db: &DatabaseConnection,
        event_id: i32,
    ) -> Result<Option<event::Model>, sea_orm::DbErr> {
        Event::find_by_id(event_id).one(db).await
    }

    pub async fn count_positions(
        db: &DatabaseConnection,
        event_id: i32,
    ) -> Result<u64, sea_orm::DbErr> {
        Position::find()
            .filter(position::Column::EventId.eq(event_id))
            .filter(position::Column::IsTestListing.eq(false))
            .count(db)
            .await
    }

    /// 至少有一条有效志愿的学生数，口径与 load_preferences 一致
    pub async fn count_students_with_choices(
        db: &DatabaseConnection,
        event: &event::Model,
    ) -> Result<u64, sea_orm::DbErr> {
        let ids: Vec<i32> = StudentChoice::find()
            .inner_join(Student)
            .inner_join(Position)
            .filter(student_choice::Column::EventId.eq(event.id))
            .filter(student::Column::SchoolId.eq(event.school_id))
            .filter(student::Column::IsTestAccount.eq(false))
            .filter(position::Column::EventId.eq(event.id))
            .filter(position::Column::IsTestListing.eq(false))
            .select_only()
            .column(student_choice::Column::StudentId)
            .distinct()
            .into_tuple::<i32>()
            .all(db)
            .await?;
        Ok(ids.len() as u64)
    }

    /// 本校可参与抽签的学生（不含测试账号），不要求填过志愿
    pub async fn eligible_student_ids(
        db: &DatabaseConnection,
        school_id: i32,
    ) -> Result<HashSet<i32>, sea_orm::DbErr> {
        let ids: Vec<i32> = Student::find()
            .filter(student::Column::SchoolId.eq(school_id))
            .filter(student::Column::IsTestAccount.eq(false))
            .select_only()
            .column(student::Column::Id)
            .into_tuple::<i32>()
            .all(db)
            .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn load_positions(
        db: &DatabaseConnection,
        event_id: i32,
    ) -> Result<Vec<PositionSlots>, sea_orm::DbErr> {
        let rows = Position::find()
            .filter(position::Column::EventId.eq(event_id))
            .filter(position::Column::IsTestListing.eq(false))
            .order_by_asc(position::Column::Id)
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|p| PositionSlots {
                position_id: p.id,
                slots: p.slots,
                company_id: p.company_id,
            })
            .collect())
    }

    /// 每个学生的志愿按 rank 升序；只返回至少有一条有效志愿的学生
    pub async fn load_preferences(
        db: &DatabaseConnection,
        event: &event::Model,
    ) -> Result<Vec<StudentPreferences>, sea_orm::DbErr> {
        let students: HashMap<i32, student::Model> = Student::find()
            .filter(student::Column::SchoolId.eq(event.school_id))
            .filter(student::Column::IsTestAccount.eq(false))
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let open_positions: HashSet<i32> = Position::find()
            .filter(position::Column::EventId.eq(event.id))
            .filter(position::Column::IsTestListing.eq(false))
            .select_only()
            .column(position::Column::Id)
            .into_tuple::<i32>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        let choices = StudentChoice::find()
            .filter(student_choice::Column::EventId.eq(event.id))
            .order_by_asc(student_choice::Column::StudentId)
            .order_by_asc(student_choice::Column::Rank)
            .order_by_asc(student_choice::Column::Id)
            .all(db)
            .await?;

        let mut grouped: BTreeMap<i32, Vec<Choice>> = BTreeMap::new();
        for c in choices {
            if !students.contains_key(&c.student_id) || !open_positions.contains(&c.position_id) {
                continue;
            }
            grouped.entry(c.student_id).or_default().push(Choice {
                position_id: c.position_id,
                rank: c.rank,
            });
        }

        Ok(grouped
            .into_iter()
            .filter_map(|(student_id, choices)| {
                let s = students.get(&student_id)?;
                Some(StudentPreferences {
                    student_id,
                    grade: grade_for_timestamp(s.graduation_year, event.event_date),
                    choices,
                })
            })
            .collect())
    }
}
