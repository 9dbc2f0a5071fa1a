use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{EquationSource, GeneratorError};
use crate::game::{Difficulty, Equation};

/// 离线方程生成器，保证整数解：
/// - easy：`x ± A = B`，数字 1..=30
/// - medium：`Ax ± B = C`，数字 2..=80
/// - hard：`Ax ± B = Cx ± D`，两边都有未知数
pub struct LocalGenerator {
    rng: SmallRng,
}

impl LocalGenerator {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn easy(&mut self) -> Result<Equation, GeneratorError> {
        let x = self.rng.gen_range(1..=30);
        let a = self.rng.gen_range(1..=30);
        let constant = if self.rng.gen_bool(0.5) { a } else { -a };
        let rhs = x + constant;

        let terms = vec!["x".to_string(), signed(constant), "=".into(), rhs.to_string()];
        let display = format!("x {} = {rhs}", spaced(constant));
        Ok(Equation::new(display, x, Difficulty::Easy, terms)?)
    }

    fn medium(&mut self) -> Result<Equation, GeneratorError> {
        let a = self.rng.gen_range(2..=9);
        let x = self.rng.gen_range(2..=12);
        let b = self.rng.gen_range(2..=80);
        let constant = if self.rng.gen_bool(0.5) { b } else { -b };
        let rhs = a * x + constant;

        let terms = vec![unknown(a), signed(constant), "=".into(), rhs.to_string()];
        let display = format!("{} {} = {rhs}", unknown(a), spaced(constant));
        Ok(Equation::new(display, x, Difficulty::Medium, terms)?)
    }

    fn hard(&mut self) -> Result<Equation, GeneratorError> {
        let a = self.rng.gen_range(3..=15);
        let c = self.rng.gen_range(1..a);
        let mut x = self.rng.gen_range(1..=15);
        if self.rng.gen_bool(0.3) {
            x = -x;
        }
        let b = self.rng.gen_range(1..=120);
        let left_constant = if self.rng.gen_bool(0.5) { b } else { -b };
        // a·x + left = c·x + right
        let right_constant = (a - c) * x + left_constant;

        let mut terms = vec![unknown(a), signed(left_constant), "=".into(), unknown(c)];
        let mut display = format!("{} {} = {}", unknown(a), spaced(left_constant), unknown(c));
        if right_constant != 0 {
            terms.push(signed(right_constant));
            display.push(' ');
            display.push_str(&spaced(right_constant));
        }
        Ok(Equation::new(display, x, Difficulty::Hard, terms)?)
    }
}

impl Default for LocalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EquationSource for LocalGenerator {
    fn generate(&mut self, difficulty: Difficulty) -> Result<Equation, GeneratorError> {
        match difficulty {
            Difficulty::Easy => self.easy(),
            Difficulty::Medium => self.medium(),
            Difficulty::Hard => self.hard(),
        }
    }
}

fn unknown(coefficient: i64) -> String {
    match coefficient {
        1 => "x".to_string(),
        -1 => "-x".to_string(),
        _ => format!("{coefficient}x"),
    }
}

fn signed(value: i64) -> String {
    if value >= 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn spaced(value: i64) -> String {
    if value >= 0 {
        format!("+ {value}")
    } else {
        format!("- {}", value.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 把 "3x" / "-x" / "+5" 还原成数字，用来代入检查解。
    fn coefficient(term: &str) -> i64 {
        match term.trim_end_matches('x') {
            "" | "+" => 1,
            "-" => -1,
            digits => digits.parse().expect("numeric coefficient"),
        }
    }

    fn side_value(terms: &[String], x: i64) -> i64 {
        terms
            .iter()
            .map(|term| {
                if term.ends_with('x') {
                    coefficient(term) * x
                } else {
                    term.parse::<i64>().expect("numeric constant")
                }
            })
            .sum()
    }

    #[test]
    fn generated_equations_hold_for_their_solution() {
        let mut generator = LocalGenerator::with_seed(5);
        for difficulty in Difficulty::ALL {
            for _ in 0..300 {
                let equation = generator.generate(difficulty).expect("generation succeeds");
                assert_eq!(equation.difficulty(), difficulty);
                let terms = equation.terms();
                let split = terms
                    .iter()
                    .position(|term| term == "=")
                    .expect("equation has an equals sign");
                let x = equation.solution();
                assert_eq!(
                    side_value(&terms[..split], x),
                    side_value(&terms[split + 1..], x),
                    "{} should hold for x = {x}",
                    equation.display_text()
                );
            }
        }
    }

    #[test]
    fn easy_equations_stay_in_range() {
        let mut generator = LocalGenerator::with_seed(11);
        for _ in 0..200 {
            let equation = generator.generate(Difficulty::Easy).expect("generation succeeds");
            assert!((1..=30).contains(&equation.solution()));
            assert_eq!(equation.terms()[0], "x");
        }
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(unknown(1), "x");
        assert_eq!(unknown(-1), "-x");
        assert_eq!(unknown(4), "4x");
        assert_eq!(signed(5), "+5");
        assert_eq!(signed(-5), "-5");
        assert_eq!(spaced(-12), "- 12");
    }
}
