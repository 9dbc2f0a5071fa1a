use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::rules::RuleError;

/// 默认生命数（与界面上的红心数量一致）。
pub const DEFAULT_MAX_LIVES: u8 = 5;

/// 卡牌标识，同一会话内单调递增，跨局不复用。
pub type CardId = u32;

/// 题目难度。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "fácil" | "facil" => Ok(Difficulty::Easy),
            "medium" | "normal" | "médio" | "medio" => Ok(Difficulty::Medium),
            "hard" | "difícil" | "dificil" => Ok(Difficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum EquationError {
    #[error("equation needs at least two terms, got {count}")]
    TooFewTerms { count: usize },
    #[error("term `{term}` appears more than once")]
    DuplicateTerm { term: String },
    #[error("term #{index} is blank")]
    BlankTerm { index: usize },
    #[error("equation display text is blank")]
    BlankDisplay,
}

/// 一局的方程。只能通过 [`Equation::new`] 构造，因此不存在半初始化的方程。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Equation {
    display_text: String,
    solution: i64,
    difficulty: Difficulty,
    terms: Vec<String>,
}

impl Equation {
    pub fn new(
        display_text: impl Into<String>,
        solution: i64,
        difficulty: Difficulty,
        terms: Vec<String>,
    ) -> Result<Self, EquationError> {
        let display_text = display_text.into().trim().to_string();
        if display_text.is_empty() {
            return Err(EquationError::BlankDisplay);
        }
        if terms.len() < 2 {
            return Err(EquationError::TooFewTerms { count: terms.len() });
        }

        let terms: Vec<String> = terms.into_iter().map(|term| term.trim().to_string()).collect();
        let mut seen = HashSet::new();
        for (index, term) in terms.iter().enumerate() {
            if term.is_empty() {
                return Err(EquationError::BlankTerm { index });
            }
            if !seen.insert(term.as_str()) {
                return Err(EquationError::DuplicateTerm { term: term.clone() });
            }
        }

        Ok(Self {
            display_text,
            solution,
            difficulty,
            terms,
        })
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn solution(&self) -> i64 {
        self.solution
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

/// 牌面上的一张卡。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub term: String,
    #[serde(default)]
    pub face_up: bool,
    #[serde(default)]
    pub matched: bool,
}

impl Card {
    pub fn new(id: CardId, term: impl Into<String>) -> Self {
        Self {
            id,
            term: term.into(),
            face_up: false,
            matched: false,
        }
    }

    pub fn hide(&mut self) {
        self.face_up = false;
        self.matched = false;
    }
}

/// 一局的牌面，创建时洗一次，之后长度不变。
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Board {
    cards: Vec<Card>,
}

impl Board {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, card_id: CardId) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == card_id)
    }

    pub fn get_mut(&mut self, card_id: CardId) -> Option<&mut Card> {
        self.cards.iter_mut().find(|card| card.id == card_id)
    }

    pub fn same_term(&self, first: CardId, second: CardId) -> bool {
        matches!(
            (self.get(first), self.get(second)),
            (Some(a), Some(b)) if a.term == b.term
        )
    }

    pub fn all_matched(&self) -> bool {
        !self.cards.is_empty() && self.cards.iter().all(|card| card.matched)
    }

    pub fn matched_pairs(&self) -> usize {
        self.cards.iter().filter(|card| card.matched).count() / 2
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        let mut per_term: HashMap<&str, usize> = HashMap::new();
        for card in &self.cards {
            if !seen.insert(card.id) {
                return Err(IntegrityError::DuplicateCardId { card_id: card.id });
            }
            if card.matched && !card.face_up {
                return Err(IntegrityError::MatchedFaceDown { card_id: card.id });
            }
            *per_term.entry(card.term.as_str()).or_default() += 1;
        }
        if let Some((term, count)) = per_term.into_iter().find(|(_, count)| *count != 2) {
            return Err(IntegrityError::UnpairedTerm {
                term: term.to_string(),
                count,
            });
        }
        Ok(())
    }
}

/// 会话阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GamePhase {
    /// 尚未开始任何一局。
    Idle,
    Loading,
    /// 方程请求失败，可重试。
    Failed,
    Playing,
    AwaitingChallenge,
    ChallengeOpen,
    Won,
    GameOver,
}

impl Default for GamePhase {
    fn default() -> Self {
        GamePhase::Idle
    }
}

impl GamePhase {
    /// 阶段迁移表。任何阶段都可以重新进入 `Loading`（重开一局）。
    pub fn can_transition_to(&self, next: GamePhase) -> bool {
        use GamePhase::*;
        matches!(
            (*self, next),
            (_, Loading)
                | (Loading, Playing)
                | (Loading, Failed)
                | (Playing, AwaitingChallenge)
                | (Playing, GameOver)
                | (AwaitingChallenge, ChallengeOpen)
                | (ChallengeOpen, Won)
        )
    }

    pub fn is_round_over(&self) -> bool {
        matches!(self, GamePhase::Won | GamePhase::GameOver)
    }
}

/// 会话状态，只由控制器持有并修改。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionState {
    pub lives: u8,
    pub max_lives: u8,
    pub difficulty: Difficulty,
    pub phase: GamePhase,
    /// 按翻牌顺序记录，最多两张。
    pub pending_flips: Vec<CardId>,
    pub error_flags: BTreeSet<CardId>,
    /// 局号，同时作为延迟回调的纪元令牌。
    pub round: u64,
}

impl SessionState {
    pub fn new(max_lives: u8, difficulty: Difficulty) -> Self {
        Self {
            lives: max_lives,
            max_lives,
            difficulty,
            phase: GamePhase::default(),
            pending_flips: Vec::new(),
            error_flags: BTreeSet::new(),
            round: 0,
        }
    }

    /// 两张待判定的牌翻开期间锁定输入。
    pub fn input_locked(&self) -> bool {
        self.pending_flips.len() >= 2
    }

    pub fn reset_for_round(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
        self.lives = self.max_lives;
        self.pending_flips.clear();
        self.error_flags.clear();
    }

    pub fn transition(&mut self, next: GamePhase) -> Result<GamePhase, RuleError> {
        if !self.phase.can_transition_to(next) {
            return Err(RuleError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        let previous = self.phase;
        self.phase = next;
        Ok(previous)
    }

    pub fn lose_life(&mut self) -> u8 {
        self.lives = self.lives.saturating_sub(1);
        self.lives
    }

    pub fn integrity_check(&self, board: &Board) -> Result<(), IntegrityError> {
        if self.lives > self.max_lives {
            return Err(IntegrityError::LivesOutOfRange {
                lives: self.lives,
                max_lives: self.max_lives,
            });
        }
        if self.pending_flips.len() > 2 {
            return Err(IntegrityError::TooManyPending {
                count: self.pending_flips.len(),
            });
        }
        for card_id in self.pending_flips.iter().chain(self.error_flags.iter()) {
            match board.get(*card_id) {
                Some(card) if card.face_up && !card.matched => {}
                Some(_) => return Err(IntegrityError::PendingNotFaceUp { card_id: *card_id }),
                None => return Err(IntegrityError::UnknownPendingCard { card_id: *card_id }),
            }
        }
        board.integrity_check()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    DuplicateCardId { card_id: CardId },
    UnpairedTerm { term: String, count: usize },
    MatchedFaceDown { card_id: CardId },
    LivesOutOfRange { lives: u8, max_lives: u8 },
    TooManyPending { count: usize },
    PendingNotFaceUp { card_id: CardId },
    UnknownPendingCard { card_id: CardId },
}

/// 推送给界面层的事件流（提示、动画）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    RoundLoading {
        round: u64,
        difficulty: Difficulty,
    },
    RoundStarted {
        round: u64,
        difficulty: Difficulty,
        card_count: usize,
    },
    GenerationFailed {
        round: u64,
        message: String,
    },
    CardFlipped {
        card_id: CardId,
        term: String,
    },
    PairMatched {
        first: CardId,
        second: CardId,
        term: String,
    },
    MismatchShown {
        first: CardId,
        second: CardId,
    },
    MismatchResolved {
        first: CardId,
        second: CardId,
        lives: u8,
    },
    BoardCleared {
        pairs: usize,
    },
    ChallengeOpened {
        equation: String,
    },
    AnswerRejected {
        round: u64,
    },
    RoundWon {
        round: u64,
        solution: i64,
    },
    GameOver {
        round: u64,
        equation: String,
        solution: i64,
    },
}
