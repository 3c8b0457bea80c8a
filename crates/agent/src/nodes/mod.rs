//! Graph nodes. Each node mutates the single [`AgentState`] owned by
//! the graph loop and may emit events through the channel it is given.

pub mod classify;
pub mod evaluate;
pub mod executor;
pub mod generate;
pub mod out_of_scope;
