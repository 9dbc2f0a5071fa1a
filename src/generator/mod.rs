//! 方程来源：本地随机生成器与远程接口载荷解析。

pub mod local;
pub mod payload;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Difficulty, Equation, EquationError};

pub use local::LocalGenerator;
pub use payload::EquationPayload;

/// 方程请求失败。要么得到完整方程，要么得到这个错误。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum GeneratorError {
    #[error("equation request failed: {message}")]
    RequestFailed { message: String },
    #[error("malformed equation payload: {message}")]
    MalformedPayload { message: String },
    #[error("invalid equation: {error}")]
    InvalidEquation {
        #[from]
        error: EquationError,
    },
}

impl GeneratorError {
    pub fn request(message: impl Into<String>) -> Self {
        GeneratorError::RequestFailed {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        GeneratorError::MalformedPayload {
            message: message.into(),
        }
    }
}

/// 同步方程来源。浏览器端的异步来源（HTTP、JS 回调）在 `lib.rs` 中驱动。
pub trait EquationSource {
    fn generate(&mut self, difficulty: Difficulty) -> Result<Equation, GeneratorError>;
}
