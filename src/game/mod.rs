//! 游戏核心逻辑模块（牌面、翻牌判定、会话状态机、最终挑战）。

pub mod challenge;
pub mod config;
pub mod deck;
pub mod rules;
pub mod session;
pub mod state;

pub use challenge::{parse_answer, validate_answer, Verdict};
pub use config::{ConfigError, SessionConfig};
pub use deck::{shuffle, DeckBuilder};
pub use rules::{Deferred, FlipResolver, Resolution, RuleError};
pub use session::{
    CardView,
    Command,
    Dispatch,
    SessionController,
    SessionSnapshot,
    Ticket,
    Timer,
};
pub use state::{
    Board,
    Card,
    CardId,
    Difficulty,
    Equation,
    EquationError,
    GameEvent,
    GamePhase,
    IntegrityError,
    SessionState,
    DEFAULT_MAX_LIVES,
};
