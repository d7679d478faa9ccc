pub mod app_state;
pub mod commands;
pub mod config;
pub mod error;
pub mod lottery;
pub mod storage;

pub use app_state::AppEvent;
pub use error::LotteryError;
