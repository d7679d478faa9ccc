pub mod grade;
pub mod matcher;
pub mod model;
pub mod optimizer;
pub mod overrides;
pub mod service;
pub mod worker;

pub use service::{LotteryJobHandle, LotteryService};
