pub mod game;
pub mod generator;
pub mod logging;

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::js_sys::{Date, Function, Promise};
use web_sys::{Request, RequestCache, RequestInit, Response};

pub use game::{
    parse_answer, validate_answer, Board, Card, CardId, CardView, Command, ConfigError,
    DeckBuilder, Difficulty, Dispatch, Equation, EquationError, FlipResolver, GameEvent,
    GamePhase, IntegrityError, RuleError, SessionConfig, SessionController, SessionSnapshot,
    SessionState, Ticket, Timer, Verdict,
};
pub use generator::{EquationPayload, EquationSource, GeneratorError, LocalGenerator};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_js_error<E: serde::Serialize + std::fmt::Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| serde_to_js_error(error))
}

fn parse_config(config_json: Option<String>) -> Result<SessionConfig, JsValue> {
    match config_json {
        Some(json) => SessionConfig::from_json(&json).map_err(to_js_error),
        None => Ok(SessionConfig::default()),
    }
}

fn parse_difficulty(value: &str) -> Result<Difficulty, JsValue> {
    Difficulty::from_str(value)
        .map_err(|_| JsValue::from_str(&format!("unknown difficulty: {value}")))
}

fn js_failure(value: JsValue) -> GeneratorError {
    GeneratorError::request(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

/// 方程从哪里来。
enum Source {
    Local(LocalGenerator),
    Endpoint(String),
    Callback(Function),
}

enum Remote {
    Endpoint(String),
    Callback(Function),
}

struct Shared {
    controller: RefCell<SessionController>,
    source: RefCell<Source>,
    listener: RefCell<Option<Function>>,
}

/// 浏览器端的一局会话。意图同步处理并返回事件 JSON；
/// 定时器和方程请求在 `spawn_local` 中完成，其结果通过监听器推送。
#[wasm_bindgen]
pub struct MemorySession {
    shared: Rc<Shared>,
}

#[wasm_bindgen]
impl MemorySession {
    /// 使用本地生成器。
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<MemorySession, JsValue> {
        let config = parse_config(config_json)?;
        let generator = match config.rng_seed {
            Some(seed) => LocalGenerator::with_seed(seed.wrapping_add(1)),
            None => LocalGenerator::new(),
        };
        Ok(Self::with_source(config, Source::Local(generator)))
    }

    /// 通过 HTTP 接口取题，例如 `/api/game/generate`。
    #[wasm_bindgen(js_name = "withEndpoint")]
    pub fn with_endpoint(
        endpoint: String,
        config_json: Option<String>,
    ) -> Result<MemorySession, JsValue> {
        let config = parse_config(config_json)?;
        Ok(Self::with_source(config, Source::Endpoint(endpoint)))
    }

    /// `callback(difficulty)` 返回方程对象、JSON 字符串，或二者之一的 Promise。
    #[wasm_bindgen(js_name = "withCallback")]
    pub fn with_callback(
        callback: Function,
        config_json: Option<String>,
    ) -> Result<MemorySession, JsValue> {
        let config = parse_config(config_json)?;
        Ok(Self::with_source(config, Source::Callback(callback)))
    }

    fn with_source(config: SessionConfig, source: Source) -> MemorySession {
        MemorySession {
            shared: Rc::new(Shared {
                controller: RefCell::new(SessionController::new(config)),
                source: RefCell::new(source),
                listener: RefCell::new(None),
            }),
        }
    }

    /// `listener(eventsJson)`，在定时器或请求完成后调用。
    #[wasm_bindgen(js_name = "setListener")]
    pub fn set_listener(&self, listener: Option<Function>) {
        *self.shared.listener.borrow_mut() = listener;
    }

    #[wasm_bindgen(js_name = "startRound")]
    pub fn start_round(&self, difficulty: Option<String>) -> Result<String, JsValue> {
        let difficulty = match difficulty {
            Some(value) => parse_difficulty(&value)?,
            None => self.shared.controller.borrow().state().difficulty,
        };
        let dispatch = self.shared.controller.borrow_mut().start_round(difficulty);
        run(&self.shared, dispatch)
    }

    #[wasm_bindgen(js_name = "changeDifficulty")]
    pub fn change_difficulty(&self, level: &str) -> Result<String, JsValue> {
        let difficulty = parse_difficulty(level)?;
        let dispatch = self
            .shared
            .controller
            .borrow_mut()
            .change_difficulty(difficulty);
        run(&self.shared, dispatch)
    }

    pub fn restart(&self) -> Result<String, JsValue> {
        let dispatch = self.shared.controller.borrow_mut().restart();
        run(&self.shared, dispatch)
    }

    pub fn flip(&self, card_id: CardId) -> Result<String, JsValue> {
        let dispatch = self.shared.controller.borrow_mut().flip(card_id);
        run(&self.shared, dispatch)
    }

    #[wasm_bindgen(js_name = "submitAnswer")]
    pub fn submit_answer(&self, value: &str) -> Result<String, JsValue> {
        let dispatch = self.shared.controller.borrow_mut().submit_answer(value);
        run(&self.shared, dispatch)
    }

    #[wasm_bindgen(js_name = "snapshotJson")]
    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        let snapshot = self.shared.controller.borrow().snapshot();
        serde_json::to_string(&snapshot).map_err(serde_to_js_error)
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        let snapshot = self.shared.controller.borrow().snapshot();
        to_value(&snapshot).map_err(JsValue::from)
    }
}

// 事件 JSON 返回给调用方，命令交给事件循环。
fn run(shared: &Rc<Shared>, dispatch: Dispatch) -> Result<String, JsValue> {
    let json = serde_json::to_string(&dispatch.events).map_err(serde_to_js_error)?;
    for command in dispatch.commands {
        spawn_command(Rc::clone(shared), command);
    }
    Ok(json)
}

fn spawn_command(shared: Rc<Shared>, command: Command) {
    spawn_local(async move {
        let dispatch = match command {
            Command::Schedule {
                ticket,
                timer,
                delay_ms,
            } => {
                if delay_ms > 0 {
                    TimeoutFuture::new(delay_ms).await;
                }
                let mut controller = shared.controller.borrow_mut();
                controller.fire_timer(ticket, timer)
            }
            Command::RequestEquation { ticket, difficulty } => {
                let result = request_equation(&shared, difficulty).await;
                let mut controller = shared.controller.borrow_mut();
                controller.complete_request(ticket, result)
            }
        };
        deliver(&shared, dispatch);
    });
}

fn deliver(shared: &Rc<Shared>, dispatch: Dispatch) {
    if dispatch.is_empty() {
        return;
    }
    match run(shared, dispatch) {
        Ok(json) => notify(shared, &json),
        Err(error) => logging::error(&format!("failed to encode events: {error:?}")),
    }
}

fn notify(shared: &Shared, events_json: &str) {
    let listener = shared.listener.borrow().clone();
    if let Some(listener) = listener {
        if let Err(error) = listener.call1(&JsValue::NULL, &JsValue::from_str(events_json)) {
            logging::warn(&format!("listener threw: {error:?}"));
        }
    }
}

async fn request_equation(
    shared: &Shared,
    difficulty: Difficulty,
) -> Result<Equation, GeneratorError> {
    // 远程来源在 await 之前取出，避免跨 await 持有借用。
    let remote = match &mut *shared.source.borrow_mut() {
        Source::Local(generator) => return generator.generate(difficulty),
        Source::Endpoint(endpoint) => Remote::Endpoint(endpoint.clone()),
        Source::Callback(callback) => Remote::Callback(callback.clone()),
    };
    match remote {
        Remote::Endpoint(endpoint) => fetch_equation(&endpoint, difficulty).await,
        Remote::Callback(callback) => call_generator(&callback, difficulty).await,
    }
}

async fn fetch_equation(endpoint: &str, difficulty: Difficulty) -> Result<Equation, GeneratorError> {
    let window = web_sys::window().ok_or_else(|| GeneratorError::request("no window"))?;
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    let url = format!(
        "{endpoint}{separator}level={difficulty}&t={}",
        Date::now() as u64
    );

    let init = RequestInit::new();
    init.set_method("GET");
    init.set_cache(RequestCache::NoStore);
    let request = Request::new_with_str_and_init(&url, &init).map_err(js_failure)?;
    let headers = request.headers();
    headers
        .set("Cache-Control", "no-cache, no-store, must-revalidate")
        .map_err(js_failure)?;
    headers.set("Pragma", "no-cache").map_err(js_failure)?;

    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(js_failure)?
        .dyn_into()
        .map_err(js_failure)?;
    if !response.ok() {
        return Err(GeneratorError::request(format!(
            "status {}",
            response.status()
        )));
    }

    let body = JsFuture::from(response.text().map_err(js_failure)?)
        .await
        .map_err(js_failure)?;
    let text = body
        .as_string()
        .ok_or_else(|| GeneratorError::malformed("response body is not text"))?;
    EquationPayload::from_json(&text)?.into_equation(difficulty)
}

async fn call_generator(
    callback: &Function,
    difficulty: Difficulty,
) -> Result<Equation, GeneratorError> {
    let returned = callback
        .call1(&JsValue::NULL, &JsValue::from_str(difficulty.as_str()))
        .map_err(js_failure)?;
    let resolved = JsFuture::from(Promise::resolve(&returned))
        .await
        .map_err(js_failure)?;

    let payload = match resolved.as_string() {
        Some(json) => EquationPayload::from_json(&json)?,
        None => serde_wasm_bindgen::from_value(resolved)
            .map_err(|error| GeneratorError::malformed(error.to_string()))?,
    };
    payload.into_equation(difficulty)
}

/// 本地生成一道题（预览或调试用），返回接口同款 JSON。
#[wasm_bindgen(js_name = "generateEquation")]
pub fn generate_equation(difficulty: &str, seed: Option<u64>) -> Result<String, JsValue> {
    let difficulty = parse_difficulty(difficulty)?;
    let mut generator = match seed {
        Some(seed) => LocalGenerator::with_seed(seed),
        None => LocalGenerator::new(),
    };
    let equation = generator.generate(difficulty).map_err(to_js_error)?;
    serde_json::to_string(&EquationPayload::from(&equation)).map_err(serde_to_js_error)
}

#[wasm_bindgen(js_name = "checkAnswer")]
pub fn check_answer(value: &str, payload_json: &str) -> Result<bool, JsValue> {
    let payload = EquationPayload::from_json(payload_json).map_err(to_js_error)?;
    let equation = payload
        .into_equation(Difficulty::default())
        .map_err(to_js_error)?;
    Ok(validate_answer(value, &equation) == Verdict::Correct)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
