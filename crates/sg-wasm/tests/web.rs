#![cfg(target_arch = "wasm32")]

use wasm_bindgen::prelude::*;
use wasm_bindgen_test::*;

use sg_wasm::{lookup_patterns, Engine};

fn get(value: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(value, &JsValue::from_str(key)).unwrap()
}

fn strings(items: &[&str]) -> JsValue {
    items.iter().map(|s| JsValue::from_str(s)).collect::<js_sys::Array>().into()
}

#[wasm_bindgen_test]
fn test_query_and_patch() {
    let mut engine = Engine::new("", strings(&["*://news.example/*"])).unwrap();

    let decision = engine.query("https://news.example/a", None);
    assert_eq!(get(&decision, "type").as_string().unwrap(), "block");

    let patch = engine.create_patch("https://news.example/a", Some("A".to_string()), false);
    assert_eq!(get(&patch, "unblock").as_bool(), Some(true));
    assert_eq!(get(&patch, "rulesToAdd").as_string().unwrap(), "@*://news.example/*");
    assert_eq!(get(&get(&patch, "props"), "title").as_string().unwrap(), "A");

    assert!(engine.modify_patch("*://news.example/*").unwrap().is_null());
    engine.apply_patch().unwrap();
    assert_eq!(engine.user_ruleset(), "@*://news.example/*");

    let decision = engine.query("https://news.example/a", None);
    assert_eq!(get(&decision, "type").as_string().unwrap(), "unblock");
    assert!(engine.apply_patch().is_err());
}

#[wasm_bindgen_test]
fn test_serialized_user_ruleset_reloads() {
    let mut engine = Engine::new("# mine\n*://example.com/*", JsValue::UNDEFINED).unwrap();
    engine.create_patch("https://example.com/", None, false);
    engine.apply_patch().unwrap();
    engine.create_patch("https://example.net/", None, false);
    engine.apply_patch().unwrap();
    let json = engine.serialize_user_ruleset().unwrap();

    let restored = Engine::from_serialized(&json, strings(&["@*://example.org/*"])).unwrap();
    assert_eq!(restored.user_ruleset(), "# mine\n*://example.net/*");
    assert!(restored.query("https://example.com/", None).is_null());
    let decision = restored.query("https://example.net/", None);
    assert_eq!(get(&decision, "type").as_string().unwrap(), "block");
    let decision = restored.query("https://example.org/", None);
    assert_eq!(get(&decision, "type").as_string().unwrap(), "unblock");

    assert!(Engine::from_serialized("{", JsValue::UNDEFINED).is_err());
}

#[wasm_bindgen_test]
fn test_highlight_decision() {
    let engine = Engine::new("@3*://*.example.org/*", JsValue::UNDEFINED).unwrap();
    let decision = engine.query("https://www.example.org/", None);
    assert_eq!(get(&decision, "type").as_string().unwrap(), "highlight");
    assert_eq!(get(&decision, "color").as_f64(), Some(3.0));
    assert!(engine.query("https://example.com/", None).is_null());
}

#[wasm_bindgen_test]
fn test_lookup_patterns() {
    let patterns = strings(&["*://*.example.com/*", "ftp://example.com/*", "https://example.com/a/*", "<all_urls>"]);
    let matched = lookup_patterns(patterns, "https://example.com/a/b").unwrap();
    let matched: Vec<f64> = matched.iter().filter_map(|v| v.as_f64()).collect();
    assert_eq!(matched, vec![0.0, 2.0, 3.0]);
}
