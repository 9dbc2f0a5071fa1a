use rand::Rng;

use super::state::{Board, Card, CardId};

/// 生成成对、洗好的牌面。卡牌标识由构建器持有的计数器分配，
/// 跨局递增，上一局迟到的回调不会命中新牌。
#[derive(Debug, Clone)]
pub struct DeckBuilder {
    next_id: CardId,
}

impl Default for DeckBuilder {
    fn default() -> Self {
        Self { next_id: 1 }
    }
}

impl DeckBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next_id: CardId) -> Self {
        Self { next_id }
    }

    pub fn next_id(&self) -> CardId {
        self.next_id
    }

    pub fn build<R: Rng + ?Sized>(&mut self, terms: &[String], rng: &mut R) -> Board {
        let mut cards = Vec::with_capacity(terms.len() * 2);
        for term in terms.iter().chain(terms.iter()) {
            let id = self.allocate();
            cards.push(Card::new(id, term.clone()));
        }
        shuffle(&mut cards, rng);
        Board::new(cards)
    }

    fn allocate(&mut self) -> CardId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

/// Fisher–Yates：从末尾向前，与 `[0, i]` 中均匀选出的位置交换。
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn terms() -> Vec<String> {
        ["2x", "+3", "=", "7"].iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn every_term_lands_on_exactly_two_face_down_cards() {
        let mut rng = SmallRng::seed_from_u64(7);
        let board = DeckBuilder::new().build(&terms(), &mut rng);

        assert_eq!(board.len(), 2 * terms().len());
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for card in board.cards() {
            assert!(!card.face_up && !card.matched, "new cards start hidden");
            *counts.entry(card.term.as_str()).or_default() += 1;
        }
        assert!(counts.values().all(|count| *count == 2));
        board.integrity_check().expect("fresh board should be consistent");
    }

    #[test]
    fn identities_are_not_reused_across_rounds() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut builder = DeckBuilder::new();
        let first = builder.build(&terms(), &mut rng);
        let second = builder.build(&terms(), &mut rng);

        let ids: HashSet<CardId> = first
            .cards()
            .iter()
            .chain(second.cards())
            .map(|card| card.id)
            .collect();
        assert_eq!(ids.len(), first.len() + second.len());
        assert_eq!(builder.next_id(), 17);
    }

    #[test]
    fn same_seed_gives_same_layout() {
        let layout = |seed| {
            let mut rng = SmallRng::seed_from_u64(seed);
            DeckBuilder::new()
                .build(&terms(), &mut rng)
                .cards()
                .iter()
                .map(|card| card.term.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(layout(42), layout(42));
    }

    #[test]
    fn shuffle_covers_all_permutations_evenly() {
        let mut rng = SmallRng::seed_from_u64(2024);
        let mut seen: HashMap<[u8; 3], usize> = HashMap::new();
        for _ in 0..6000 {
            let mut items = [0u8, 1, 2];
            shuffle(&mut items, &mut rng);
            *seen.entry(items).or_default() += 1;
        }
        assert_eq!(seen.len(), 6, "all 3! orderings should appear");
        for (order, count) in seen {
            assert!(
                (800..=1200).contains(&count),
                "ordering {order:?} appeared {count} times"
            );
        }
    }

    #[test]
    fn shuffle_handles_tiny_inputs() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut empty: [u8; 0] = [];
        shuffle(&mut empty, &mut rng);
        let mut single = [9u8];
        shuffle(&mut single, &mut rng);
        assert_eq!(single, [9]);
    }
}
