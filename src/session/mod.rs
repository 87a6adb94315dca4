//! Session orchestration: turns, state, scheduling, persistence

mod manager;
mod state;
mod turn;

pub use manager::SessionManager;
pub use state::{
    AgentKind, Session, SessionOptions, SessionRecord, SessionSummary, TurnProcess,
};
pub use turn::{ConversationTurn, ProcessData, ProcessRound, ProcessTool, TurnStatus};
