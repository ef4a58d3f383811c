//! 对话图：状态、固定拓扑与路由、步骤函数、执行器

pub mod builder;
pub mod engine;
pub mod graph;
pub mod state;
pub mod steps;
pub mod types;

pub use builder::TurnExecutorBuilder;
pub use engine::{TurnExecutor, TurnOutcome};
pub use state::{PartialStateLog, TurnState};
pub use types::*;
