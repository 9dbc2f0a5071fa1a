//! 浏览器控制台日志。非 wasm 目标（单元测试）下没有 JS 宿主，输出被丢弃。

const PREFIX: &str = "[equation-memory]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(target_arch = "wasm32")]
fn write(level: Level, message: &str) {
    use wasm_bindgen::JsValue;
    use web_sys::console;

    let line = JsValue::from_str(&format!("{PREFIX} {message}"));
    match level {
        Level::Debug => console::debug_1(&line),
        Level::Info => console::info_1(&line),
        Level::Warn => console::warn_1(&line),
        Level::Error => console::error_1(&line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn write(_level: Level, _message: &str) {}

/// 只在 debug 构建输出（被拒绝的意图、过期回调）。
pub fn debug(message: &str) {
    if cfg!(debug_assertions) {
        write(Level::Debug, message);
    }
}

pub fn info(message: &str) {
    write(Level::Info, message);
}

pub fn warn(message: &str) {
    write(Level::Warn, message);
}

pub fn error(message: &str) {
    write(Level::Error, message);
}
