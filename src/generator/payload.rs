use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::GeneratorError;
use crate::game::{Difficulty, Equation};

/// 生成接口返回的 JSON：
/// `{ "equationDisplay": "2x + 3 = 7", "solution": 2, "difficulty": "medium", "terms": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EquationPayload {
    pub equation_display: String,
    pub solution: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub terms: Vec<String>,
}

impl EquationPayload {
    pub fn from_json(json: &str) -> Result<Self, GeneratorError> {
        serde_json::from_str(json).map_err(|error| GeneratorError::malformed(error.to_string()))
    }

    /// 校验并转换。接口给出的难度无法识别时沿用请求时的难度。
    pub fn into_equation(self, requested: Difficulty) -> Result<Equation, GeneratorError> {
        let solution = integral_solution(self.solution)?;
        let difficulty = self
            .difficulty
            .as_deref()
            .and_then(|value| Difficulty::from_str(value).ok())
            .unwrap_or(requested);
        Ok(Equation::new(
            self.equation_display,
            solution,
            difficulty,
            self.terms,
        )?)
    }
}

impl From<&Equation> for EquationPayload {
    fn from(equation: &Equation) -> Self {
        Self {
            equation_display: equation.display_text().to_string(),
            solution: equation.solution() as f64,
            difficulty: Some(equation.difficulty().to_string()),
            terms: equation.terms().to_vec(),
        }
    }
}

// JSON 数字统一按 f64 读入，这里要求它是可表示的整数。
fn integral_solution(value: f64) -> Result<i64, GeneratorError> {
    const LIMIT: f64 = 9_007_199_254_740_992.0;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > LIMIT {
        return Err(GeneratorError::malformed(format!(
            "solution {value} is not an integer"
        )));
    }
    Ok(value as i64)
}
