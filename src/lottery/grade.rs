use chrono::{DateTime, Datelike, Utc};

/// 八月起算新学年
const SCHOOL_YEAR_START_MONTH: u32 = 8;

/// 由毕业年份和活动日期推算年级；春季学期的应届毕业生为 12 年级
pub fn grade_for(graduation_year: i32, event_date: DateTime<Utc>) -> i32 {
    let school_year_end = if event_date.month() >= SCHOOL_YEAR_START_MONTH {
        event_date.year() + 1
    } else {
        event_date.year()
    };
    12 - (graduation_year - school_year_end)
}

/// event_date 以 unix 秒存储；非法时间戳按 1970 处理
pub fn grade_for_timestamp(graduation_year: i32, event_ts: i64) -> i32 {
    let date = DateTime::<Utc>::from_timestamp(event_ts, 0).unwrap_or_default();
    grade_for(graduation_year, date)
}
