use serde::{Deserialize, Serialize};

use super::state::{Board, CardId, GameEvent, GamePhase, SessionState};

/// 被拒绝的意图或非法迁移。守卫拒绝对玩家静默，只写调试日志。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    NotPlaying {
        phase: GamePhase,
    },
    InputLocked,
    UnknownCard {
        card_id: CardId,
    },
    AlreadyMatched {
        card_id: CardId,
    },
    AlreadyFaceUp {
        card_id: CardId,
    },
    NoPendingMismatch {
        first: CardId,
        second: CardId,
    },
    ChallengeClosed {
        phase: GamePhase,
    },
    InvalidTransition {
        from: GamePhase,
        to: GamePhase,
    },
}

/// 需要延迟执行的后续步骤，由控制器加上纪元令牌和时长后调度。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Deferred {
    MismatchReset { first: CardId, second: CardId },
    OpenChallenge,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub events: Vec<GameEvent>,
    pub deferred: Option<Deferred>,
}

impl Resolution {
    fn immediate(events: Vec<GameEvent>) -> Self {
        Self {
            events,
            deferred: None,
        }
    }

    fn deferred(events: Vec<GameEvent>, deferred: Deferred) -> Self {
        Self {
            events,
            deferred: Some(deferred),
        }
    }
}

/// 翻牌/配对判定。
pub struct FlipResolver;

impl FlipResolver {
    fn ensure_playing(state: &SessionState) -> Result<(), RuleError> {
        if state.phase != GamePhase::Playing {
            return Err(RuleError::NotPlaying { phase: state.phase });
        }
        Ok(())
    }

    fn ensure_unlocked(state: &SessionState) -> Result<(), RuleError> {
        if state.input_locked() {
            return Err(RuleError::InputLocked);
        }
        Ok(())
    }

    fn ensure_flippable(board: &Board, card_id: CardId) -> Result<(), RuleError> {
        let card = board.get(card_id).ok_or(RuleError::UnknownCard { card_id })?;
        if card.matched {
            return Err(RuleError::AlreadyMatched { card_id });
        }
        if card.face_up {
            return Err(RuleError::AlreadyFaceUp { card_id });
        }
        Ok(())
    }

    pub fn flip(
        state: &mut SessionState,
        board: &mut Board,
        card_id: CardId,
    ) -> Result<Resolution, RuleError> {
        Self::ensure_playing(state)?;
        Self::ensure_unlocked(state)?;
        Self::ensure_flippable(board, card_id)?;

        let card = board
            .get_mut(card_id)
            .ok_or(RuleError::UnknownCard { card_id })?;
        card.face_up = true;
        let term = card.term.clone();
        state.pending_flips.push(card_id);

        let mut events = vec![GameEvent::CardFlipped { card_id, term }];
        if state.pending_flips.len() < 2 {
            return Ok(Resolution::immediate(events));
        }

        // 第二张牌已提交，锁在判定完成前一直有效。
        let (first, second) = (state.pending_flips[0], state.pending_flips[1]);
        if board.same_term(first, second) {
            let mut term = String::new();
            for id in [first, second] {
                if let Some(card) = board.get_mut(id) {
                    card.matched = true;
                    card.face_up = true;
                    term = card.term.clone();
                }
            }
            state.pending_flips.clear();
            events.push(GameEvent::PairMatched {
                first,
                second,
                term,
            });

            if board.all_matched() {
                state.transition(GamePhase::AwaitingChallenge)?;
                events.push(GameEvent::BoardCleared {
                    pairs: board.matched_pairs(),
                });
                return Ok(Resolution::deferred(events, Deferred::OpenChallenge));
            }
            return Ok(Resolution::immediate(events));
        }

        state.error_flags.insert(first);
        state.error_flags.insert(second);
        events.push(GameEvent::MismatchShown { first, second });
        Ok(Resolution::deferred(
            events,
            Deferred::MismatchReset { first, second },
        ))
    }

    /// 惩罚窗口结束：两张牌扣回，扣一条命，解锁。
    pub fn resolve_mismatch(
        state: &mut SessionState,
        board: &mut Board,
        first: CardId,
        second: CardId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_playing(state)?;
        if state.pending_flips.as_slice() != [first, second] {
            return Err(RuleError::NoPendingMismatch { first, second });
        }

        for id in [first, second] {
            if let Some(card) = board.get_mut(id) {
                card.hide();
            }
            state.error_flags.remove(&id);
        }
        state.pending_flips.clear();
        let lives = state.lose_life();

        let events = vec![GameEvent::MismatchResolved {
            first,
            second,
            lives,
        }];
        if lives == 0 {
            state.transition(GamePhase::GameOver)?;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Card, Difficulty};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    // 2x:1,5  +3:2,6  =:3,7  7:4,8
    fn setup() -> (SessionState, Board) {
        let terms = ["2x", "+3", "=", "7"];
        let cards = terms
            .iter()
            .chain(terms.iter())
            .enumerate()
            .map(|(index, term)| Card::new(index as CardId + 1, *term))
            .collect();
        let mut state = SessionState::new(5, Difficulty::Medium);
        state.phase = GamePhase::Playing;
        (state, Board::new(cards))
    }

    #[test]
    fn first_flip_only_turns_the_card() {
        let (mut state, mut board) = setup();
        let resolution = FlipResolver::flip(&mut state, &mut board, 1).expect("flip accepted");

        assert_eq!(resolution.deferred, None);
        assert_eq!(state.pending_flips, vec![1]);
        assert!(board.get(1).expect("card 1").face_up);
        assert!(!state.input_locked());
    }

    #[test]
    fn matching_pair_is_resolved_immediately() {
        let (mut state, mut board) = setup();
        FlipResolver::flip(&mut state, &mut board, 1).expect("first flip");
        let resolution = FlipResolver::flip(&mut state, &mut board, 5).expect("second flip");

        assert!(resolution.events.iter().any(|event| matches!(
            event,
            GameEvent::PairMatched { first: 1, second: 5, term } if term == "2x"
        )));
        assert_eq!(resolution.deferred, None);
        assert!(state.pending_flips.is_empty());
        assert!(board.get(1).expect("card 1").matched);
        assert!(board.get(5).expect("card 5").matched);
        assert_eq!(state.lives, 5);
    }

    #[test]
    fn mismatch_holds_the_lock_until_resolved() {
        let (mut state, mut board) = setup();
        FlipResolver::flip(&mut state, &mut board, 2).expect("first flip");
        let resolution = FlipResolver::flip(&mut state, &mut board, 3).expect("second flip");

        assert_eq!(
            resolution.deferred,
            Some(Deferred::MismatchReset { first: 2, second: 3 })
        );
        assert!(state.input_locked());
        assert!(state.error_flags.contains(&2) && state.error_flags.contains(&3));
        assert_eq!(
            FlipResolver::flip(&mut state, &mut board, 4),
            Err(RuleError::InputLocked)
        );
        assert!(!board.get(4).expect("card 4").face_up, "locked flip must not turn the card");

        let events =
            FlipResolver::resolve_mismatch(&mut state, &mut board, 2, 3).expect("resolve");
        assert_eq!(
            events,
            vec![GameEvent::MismatchResolved {
                first: 2,
                second: 3,
                lives: 4
            }]
        );
        assert!(!board.get(2).expect("card 2").face_up);
        assert!(!board.get(3).expect("card 3").face_up);
        assert!(state.error_flags.is_empty());
        assert!(!state.input_locked());
    }

    #[test]
    fn guards_reject_matched_face_up_and_unknown_cards() {
        let (mut state, mut board) = setup();
        FlipResolver::flip(&mut state, &mut board, 1).expect("first flip");
        assert_eq!(
            FlipResolver::flip(&mut state, &mut board, 1),
            Err(RuleError::AlreadyFaceUp { card_id: 1 })
        );
        FlipResolver::flip(&mut state, &mut board, 5).expect("pair");
        assert_eq!(
            FlipResolver::flip(&mut state, &mut board, 5),
            Err(RuleError::AlreadyMatched { card_id: 5 })
        );
        assert_eq!(
            FlipResolver::flip(&mut state, &mut board, 99),
            Err(RuleError::UnknownCard { card_id: 99 })
        );

        state.phase = GamePhase::GameOver;
        assert_eq!(
            FlipResolver::flip(&mut state, &mut board, 2),
            Err(RuleError::NotPlaying {
                phase: GamePhase::GameOver
            })
        );
    }

    #[test]
    fn clearing_the_board_awaits_the_challenge() {
        let (mut state, mut board) = setup();
        let mut last = Resolution::default();
        for (a, b) in [(1, 5), (2, 6), (3, 7), (4, 8)] {
            FlipResolver::flip(&mut state, &mut board, a).expect("first of pair");
            last = FlipResolver::flip(&mut state, &mut board, b).expect("second of pair");
        }
        assert_eq!(state.phase, GamePhase::AwaitingChallenge);
        assert_eq!(last.deferred, Some(Deferred::OpenChallenge));
        assert!(last
            .events
            .contains(&GameEvent::BoardCleared { pairs: 4 }));
    }

    #[test]
    fn last_life_ends_the_game() {
        let (mut state, mut board) = setup();
        state.lives = 1;
        FlipResolver::flip(&mut state, &mut board, 1).expect("first flip");
        FlipResolver::flip(&mut state, &mut board, 2).expect("second flip");
        FlipResolver::resolve_mismatch(&mut state, &mut board, 1, 2).expect("resolve");

        assert_eq!(state.lives, 0);
        assert_eq!(state.phase, GamePhase::GameOver);
    }

    #[test]
    fn stale_resolution_is_refused() {
        let (mut state, mut board) = setup();
        assert_eq!(
            FlipResolver::resolve_mismatch(&mut state, &mut board, 1, 2),
            Err(RuleError::NoPendingMismatch { first: 1, second: 2 })
        );
        assert_eq!(state.lives, 5);
    }

    #[test]
    fn random_click_storms_keep_the_invariants() {
        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..200 {
            let (mut state, mut board) = setup();
            let mut previous_lives = state.lives;
            for _ in 0..60 {
                if state.phase != GamePhase::Playing {
                    break;
                }
                if state.input_locked() && rng.gen_bool(0.5) {
                    let (first, second) = (state.pending_flips[0], state.pending_flips[1]);
                    FlipResolver::resolve_mismatch(&mut state, &mut board, first, second)
                        .expect("locked pair is a pending mismatch");
                } else {
                    let target = rng.gen_range(0..=9);
                    let before = board.get(target).cloned();
                    let accepted = FlipResolver::flip(&mut state, &mut board, target).is_ok();
                    if let Some(card) = before {
                        if card.face_up || card.matched {
                            assert!(!accepted, "flip on a shown card must be rejected");
                        }
                    }
                }
                assert!(state.pending_flips.len() <= 2);
                assert!(state.lives <= previous_lives, "lives never go back up");
                previous_lives = state.lives;
                state
                    .integrity_check(&board)
                    .expect("state should stay consistent");
            }
        }
    }
}
