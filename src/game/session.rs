use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::challenge::{validate_answer, Verdict};
use super::config::SessionConfig;
use super::deck::DeckBuilder;
use super::rules::{Deferred, FlipResolver, Resolution};
use super::state::{
    Board, CardId, Difficulty, Equation, GameEvent, GamePhase, IntegrityError, SessionState,
};
use crate::generator::GeneratorError;
use crate::logging;

/// 延迟回调携带的纪元令牌。每开一局加一，旧令牌的回调一律丢弃。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Timer {
    MismatchReset { first: CardId, second: CardId },
    OpenChallenge,
    NextRound,
}

/// 需要驱动层执行的异步动作，完成后经 `complete_request` / `fire_timer` 回到控制器。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Command {
    RequestEquation {
        ticket: Ticket,
        difficulty: Difficulty,
    },
    Schedule {
        ticket: Ticket,
        timer: Timer,
        delay_ms: u32,
    },
}

/// 一次意图或回调的结果：给界面的事件和给驱动层的命令。
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Dispatch {
    pub events: Vec<GameEvent>,
    pub commands: Vec<Command>,
}

impl Dispatch {
    fn from_events(events: Vec<GameEvent>) -> Self {
        Self {
            events,
            commands: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.commands.is_empty()
    }
}

/// 界面渲染用的卡牌视图；背面朝上的牌不暴露内容。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CardView {
    pub id: CardId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub face_up: bool,
    pub matched: bool,
    pub error: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub round: u64,
    pub phase: GamePhase,
    pub difficulty: Difficulty,
    pub lives: u8,
    pub max_lives: u8,
    pub input_locked: bool,
    pub pending_flips: Vec<CardId>,
    pub cards: Vec<CardView>,
    /// 挑战打开后或本局结束时才给出。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equation: Option<String>,
    /// 只在 GameOver 后揭晓。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// 会话控制器：唯一持有状态、牌面和方程，所有意图与回调都经由 `&mut self` 串行处理。
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    board: Board,
    equation: Option<Equation>,
    deck: DeckBuilder,
    rng: SmallRng,
    last_error: Option<String>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let state = SessionState::new(config.max_lives.max(1), config.default_difficulty);
        Self {
            config,
            state,
            board: Board::default(),
            equation: None,
            deck: DeckBuilder::new(),
            rng,
            last_error: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn equation(&self) -> Option<&Equation> {
        self.equation.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn ticket(&self) -> Ticket {
        Ticket(self.state.round)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket == self.ticket()
    }

    /// 开新的一局：作废上一局所有未完成的请求与定时器，然后请求方程。
    pub fn start_round(&mut self, difficulty: Difficulty) -> Dispatch {
        self.state.round += 1;
        self.state.reset_for_round(difficulty);
        self.board = Board::default();
        self.equation = None;
        self.last_error = None;
        self.enter(GamePhase::Loading);

        let round = self.state.round;
        logging::info(&format!("round {round} loading ({difficulty})"));
        Dispatch {
            events: vec![GameEvent::RoundLoading { round, difficulty }],
            commands: vec![Command::RequestEquation {
                ticket: self.ticket(),
                difficulty,
            }],
        }
    }

    pub fn change_difficulty(&mut self, difficulty: Difficulty) -> Dispatch {
        if self.state.phase == GamePhase::Loading {
            logging::debug("difficulty change ignored while loading");
            return Dispatch::default();
        }
        self.start_round(difficulty)
    }

    pub fn restart(&mut self) -> Dispatch {
        self.start_round(self.state.difficulty)
    }

    pub fn complete_request(
        &mut self,
        ticket: Ticket,
        result: Result<Equation, GeneratorError>,
    ) -> Dispatch {
        if !self.is_current(ticket) || self.state.phase != GamePhase::Loading {
            logging::debug(&format!("dropping stale equation response for {ticket:?}"));
            return Dispatch::default();
        }

        let round = self.state.round;
        match result {
            Ok(equation) => {
                self.board = self.deck.build(equation.terms(), &mut self.rng);
                self.equation = Some(equation);
                self.enter(GamePhase::Playing);
                logging::info(&format!(
                    "round {round} started with {} cards",
                    self.board.len()
                ));
                Dispatch::from_events(vec![GameEvent::RoundStarted {
                    round,
                    difficulty: self.state.difficulty,
                    card_count: self.board.len(),
                }])
            }
            Err(error) => {
                let message = error.to_string();
                logging::warn(&format!("round {round}: {message}"));
                self.last_error = Some(message.clone());
                self.enter(GamePhase::Failed);
                Dispatch::from_events(vec![GameEvent::GenerationFailed { round, message }])
            }
        }
    }

    pub fn flip(&mut self, card_id: CardId) -> Dispatch {
        match FlipResolver::flip(&mut self.state, &mut self.board, card_id) {
            Ok(resolution) => self.absorb(resolution),
            Err(rejection) => {
                logging::debug(&format!("flip {card_id} rejected: {rejection:?}"));
                Dispatch::default()
            }
        }
    }

    pub fn submit_answer(&mut self, value: &str) -> Dispatch {
        if self.state.phase != GamePhase::ChallengeOpen {
            logging::debug(&format!(
                "answer ignored in phase {:?}",
                self.state.phase
            ));
            return Dispatch::default();
        }
        let Some(equation) = self.equation.as_ref() else {
            return Dispatch::default();
        };
        let solution = equation.solution();
        let verdict = validate_answer(value, equation);

        let round = self.state.round;
        match verdict {
            Verdict::Correct => {
                self.enter(GamePhase::Won);
                logging::info(&format!("round {round} won"));
                Dispatch {
                    events: vec![GameEvent::RoundWon { round, solution }],
                    commands: vec![self.schedule(Timer::NextRound, self.config.victory_delay_ms)],
                }
            }
            Verdict::Incorrect => Dispatch::from_events(vec![GameEvent::AnswerRejected { round }]),
        }
    }

    /// 定时器到期。令牌过期（已开新局）时什么也不做。
    pub fn fire_timer(&mut self, ticket: Ticket, timer: Timer) -> Dispatch {
        if !self.is_current(ticket) {
            logging::debug(&format!("dropping stale {timer:?} for {ticket:?}"));
            return Dispatch::default();
        }

        match timer {
            Timer::MismatchReset { first, second } => self.finish_mismatch(first, second),
            Timer::OpenChallenge => self.open_challenge(),
            Timer::NextRound => {
                if self.state.phase == GamePhase::Won {
                    self.restart()
                } else {
                    Dispatch::default()
                }
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = self.state.phase;
        let reveal_equation = matches!(
            phase,
            GamePhase::ChallengeOpen | GamePhase::Won | GamePhase::GameOver
        );
        let cards = self
            .board
            .cards()
            .iter()
            .map(|card| CardView {
                id: card.id,
                term: card.face_up.then(|| card.term.clone()),
                face_up: card.face_up,
                matched: card.matched,
                error: self.state.error_flags.contains(&card.id),
            })
            .collect();

        SessionSnapshot {
            round: self.state.round,
            phase,
            difficulty: self.state.difficulty,
            lives: self.state.lives,
            max_lives: self.state.max_lives,
            input_locked: self.state.input_locked(),
            pending_flips: self.state.pending_flips.clone(),
            cards,
            equation: self
                .equation
                .as_ref()
                .filter(|_| reveal_equation)
                .map(|equation| equation.display_text().to_string()),
            solution: self
                .equation
                .as_ref()
                .filter(|_| phase == GamePhase::GameOver)
                .map(Equation::solution),
            last_error: self.last_error.clone(),
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        self.state.integrity_check(&self.board)
    }

    fn open_challenge(&mut self) -> Dispatch {
        if self.state.phase != GamePhase::AwaitingChallenge {
            return Dispatch::default();
        }
        let Some(equation) = self.equation.as_ref().map(|e| e.display_text().to_string()) else {
            return Dispatch::default();
        };
        self.enter(GamePhase::ChallengeOpen);
        Dispatch::from_events(vec![GameEvent::ChallengeOpened { equation }])
    }

    fn finish_mismatch(&mut self, first: CardId, second: CardId) -> Dispatch {
        let events =
            match FlipResolver::resolve_mismatch(&mut self.state, &mut self.board, first, second) {
                Ok(events) => events,
                Err(rejection) => {
                    logging::debug(&format!("mismatch reset skipped: {rejection:?}"));
                    return Dispatch::default();
                }
            };

        let mut dispatch = Dispatch::from_events(events);
        if self.state.phase == GamePhase::GameOver {
            if let Some(equation) = &self.equation {
                logging::info(&format!("round {} lost", self.state.round));
                dispatch.events.push(GameEvent::GameOver {
                    round: self.state.round,
                    equation: equation.display_text().to_string(),
                    solution: equation.solution(),
                });
            }
        }
        dispatch
    }

    fn absorb(&mut self, resolution: Resolution) -> Dispatch {
        let mut dispatch = Dispatch::from_events(resolution.events);
        if let Some(deferred) = resolution.deferred {
            let command = match deferred {
                Deferred::MismatchReset { first, second } => self.schedule(
                    Timer::MismatchReset { first, second },
                    self.config.mismatch_delay_ms,
                ),
                Deferred::OpenChallenge => {
                    self.schedule(Timer::OpenChallenge, self.config.challenge_delay_ms)
                }
            };
            dispatch.commands.push(command);
        }
        dispatch
    }

    fn schedule(&self, timer: Timer, delay_ms: u32) -> Command {
        Command::Schedule {
            ticket: self.ticket(),
            timer,
            delay_ms,
        }
    }

    fn enter(&mut self, next: GamePhase) {
        if let Err(error) = self.state.transition(next) {
            logging::error(&format!("illegal phase change: {error:?}"));
        }
    }
}
