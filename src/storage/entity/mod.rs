pub mod admin;
pub mod company;
pub mod event;
pub mod lottery_configuration;
pub mod lottery_job;
pub mod lottery_manual_assignment;
pub mod lottery_prefill_setting;
pub mod lottery_result;
pub mod position;
pub mod school;
pub mod student;
pub mod student_choice;

pub use lottery_job::Entity as LotteryJob;
pub use lottery_result::Entity as LotteryResult;
