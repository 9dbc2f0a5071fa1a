//! 浏览器内测试：`wasm-pack test --headless --chrome`。
#![cfg(target_arch = "wasm32")]

use equation_memory::{generate_equation, EquationPayload, MemorySession};
use gloo_timers::future::TimeoutFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const INSTANT: &str = r#"{ "rng_seed": 12, "mismatch_delay_ms": 0, "challenge_delay_ms": 0, "victory_delay_ms": 0 }"#;

fn phase(session: &MemorySession) -> String {
    let snapshot: serde_json::Value =
        serde_json::from_str(&session.snapshot_json().expect("snapshot")).expect("json");
    snapshot["phase"].as_str().unwrap_or_default().to_string()
}

#[wasm_bindgen_test]
async fn local_session_leaves_loading_after_the_request() {
    let session = MemorySession::new(Some(INSTANT.to_string())).expect("session");
    let events = session.start_round(Some("easy".into())).expect("start");
    assert!(events.contains("RoundLoading"));
    assert_eq!(phase(&session), "Loading");

    TimeoutFuture::new(10).await;
    assert_eq!(phase(&session), "Playing");
}

#[wasm_bindgen_test]
async fn difficulty_change_is_ignored_while_loading() {
    let session = MemorySession::new(Some(INSTANT.to_string())).expect("session");
    session.start_round(None).expect("start");
    let events = session.change_difficulty("hard").expect("change");
    assert_eq!(events, "[]");
}

#[wasm_bindgen_test]
fn generated_payload_round_trips_through_the_parser() {
    let json = generate_equation("medium", Some(3)).expect("generate");
    let payload = EquationPayload::from_json(&json).expect("payload");
    assert!(payload.terms.len() >= 2);
}
