//! 对话图：固定拓扑与条件路由
//!
//! entry → RequestName →[有名字]→ RequestLanguage →[有语言]→ Retrieve → Compose → exit
//! 路由是当前步骤与状态的纯函数。

use crate::workflow::state::TurnState;
use crate::workflow::types::{Route, StepId};

/// 入口步骤
pub const ENTRY: StepId = StepId::RequestName;

/// 步骤完成后的去向
pub fn route(step: StepId, state: &TurnState) -> Route {
    match step {
        StepId::RequestName if state.user_name().is_some() => Route::Continue(StepId::RequestLanguage),
        StepId::RequestName => Route::Terminate,
        StepId::RequestLanguage if state.language().is_some() => Route::Continue(StepId::Retrieve),
        StepId::RequestLanguage => Route::Terminate,
        StepId::Retrieve => Route::Continue(StepId::Compose),
        StepId::Compose => Route::Terminate,
    }
}
