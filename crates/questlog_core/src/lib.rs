pub mod domain;
pub mod ports;

pub use domain::{
    CompletionOutcome, LeaderboardEntry, Level, NewTask, Principal, Task, TaskCategory,
    TaskStatus, User, UserCredentials, UserStats,
};
pub use ports::{PortError, PortResult, Store};
