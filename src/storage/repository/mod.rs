pub mod config_repo;
pub mod lottery_repo;
pub mod roster_repo;

pub use config_repo::{ConfigSnapshot, LotteryConfigRepository};
pub use lottery_repo::LotteryJobRepository;
pub use roster_repo::RosterRepository;
