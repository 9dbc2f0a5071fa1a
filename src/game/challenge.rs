//! 最终挑战：全部配对后输入 x 的值。

use serde::{Deserialize, Serialize};

use super::state::Equation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Incorrect,
}

/// 无法解析为整数的输入按答错处理，不单独报错。
pub fn parse_answer(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

pub fn validate_answer(value: &str, equation: &Equation) -> Verdict {
    match parse_answer(value) {
        Some(answer) if answer == equation.solution() => Verdict::Correct,
        _ => Verdict::Incorrect,
    }
}
