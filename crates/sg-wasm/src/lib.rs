//! WebAssembly bindings for serpguard

use std::rc::Rc;

use wasm_bindgen::prelude::*;

use sg_compiler::{InteractiveRuleset, Patch, Ruleset};
use sg_core::{init_public_suffix_list, Decision, EntryProps, PatternIndex};

/// User ruleset plus subscriptions, driven from the content script.
#[wasm_bindgen]
pub struct Engine {
    inner: InteractiveRuleset,
}

#[wasm_bindgen]
impl Engine {
    /// `subscriptions` is an array of rule texts.
    #[wasm_bindgen(constructor)]
    pub fn new(user: &str, subscriptions: JsValue) -> Result<Engine, JsValue> {
        Ok(Engine {
            inner: InteractiveRuleset::new(Ruleset::new(user), subscription_rulesets(&subscriptions)?),
        })
    }

    /// Rebuild from the output of `serializeUserRuleset` without reparsing.
    #[wasm_bindgen(js_name = fromSerialized)]
    pub fn from_serialized(user_json: &str, subscriptions: JsValue) -> Result<Engine, JsValue> {
        let user = Ruleset::from_json(user_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Engine {
            inner: InteractiveRuleset::new(user, subscription_rulesets(&subscriptions)?),
        })
    }

    /// `null`, or `{ type: "block" | "unblock" | "highlight", color? }`.
    pub fn query(&self, url: &str, title: Option<String>) -> JsValue {
        match self.inner.query(&entry_props(url, title)) {
            Some(decision) => decision_to_js(decision),
            None => JsValue::NULL,
        }
    }

    #[wasm_bindgen(js_name = createPatch)]
    pub fn create_patch(&mut self, url: &str, title: Option<String>, widen_to_domain: bool) -> JsValue {
        let patch = self.inner.create_patch(&entry_props(url, title), widen_to_domain);
        patch_to_js(&patch)
    }

    /// Returns `null` when the new rules would not toggle the entry.
    #[wasm_bindgen(js_name = modifyPatch)]
    pub fn modify_patch(&mut self, rules_to_add: &str) -> Result<JsValue, JsValue> {
        match self.inner.modify_patch(rules_to_add) {
            Ok(Some(patch)) => Ok(patch_to_js(&patch)),
            Ok(None) => Ok(JsValue::NULL),
            Err(e) => Err(JsValue::from_str(&e.to_string())),
        }
    }

    #[wasm_bindgen(js_name = applyPatch)]
    pub fn apply_patch(&mut self) -> Result<(), JsValue> {
        self.inner.apply_patch().map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = deletePatch)]
    pub fn delete_patch(&mut self) {
        self.inner.delete_patch();
    }

    /// Current user rule text, deleted lines dropped.
    #[wasm_bindgen(js_name = userRuleset)]
    pub fn user_ruleset(&self) -> String {
        self.inner.user().to_string()
    }

    /// Serialized user ruleset (JSON).
    #[wasm_bindgen(js_name = serializeUserRuleset)]
    pub fn serialize_user_ruleset(&self) -> Result<String, JsValue> {
        self.inner
            .user()
            .to_json()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

#[wasm_bindgen(js_name = initPublicSuffixList)]
pub fn init_psl(text: &str) -> Result<(), JsValue> {
    init_public_suffix_list(text).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Indices of the `patterns` that match `url`, ascending.
///
/// Patterns the index rejects are skipped with a console warning.
#[wasm_bindgen(js_name = lookupPatterns)]
pub fn lookup_patterns(patterns: JsValue, url: &str) -> Result<js_sys::Array, JsValue> {
    let patterns = string_array(&patterns, "Pattern must be a string")?;

    let mut index = PatternIndex::new();
    for (i, pattern) in patterns.iter().enumerate() {
        if let Err(e) = index.insert(pattern, i as u32) {
            web_sys::console::warn_1(&JsValue::from_str(&format!("pattern {}: {}", pattern, e)));
        }
    }

    let mut matched: Vec<u32> = index.lookup(url).into_iter().copied().collect();
    matched.sort_unstable();

    let result = js_sys::Array::new_with_length(matched.len() as u32);
    for (i, value) in matched.into_iter().enumerate() {
        result.set(i as u32, JsValue::from(value));
    }
    Ok(result)
}

fn subscription_rulesets(subscriptions: &JsValue) -> Result<Vec<Rc<Ruleset>>, JsValue> {
    Ok(string_array(subscriptions, "Subscription text must be a string")?
        .iter()
        .map(|text| Rc::new(Ruleset::new(text)))
        .collect())
}

fn string_array(value: &JsValue, message: &str) -> Result<Vec<String>, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Vec::new());
    }
    js_sys::Array::from(value)
        .iter()
        .map(|item| item.as_string().ok_or_else(|| JsValue::from_str(message)))
        .collect()
}

fn entry_props(url: &str, title: Option<String>) -> EntryProps {
    let mut props = EntryProps::new(url);
    if let Some(title) = title {
        props.insert(EntryProps::TITLE, title);
    }
    props
}

fn decision_to_js(decision: Decision) -> JsValue {
    let result = js_sys::Object::new();
    let kind = match decision {
        Decision::Block => "block",
        Decision::Unblock => "unblock",
        Decision::Highlight(color) => {
            let _ = js_sys::Reflect::set(&result, &"color".into(), &JsValue::from(color));
            "highlight"
        }
    };
    let _ = js_sys::Reflect::set(&result, &"type".into(), &JsValue::from_str(kind));
    result.into()
}

fn patch_to_js(patch: &Patch) -> JsValue {
    let props = js_sys::Object::new();
    for (key, value) in patch.props.iter() {
        let _ = js_sys::Reflect::set(&props, &JsValue::from_str(key), &JsValue::from_str(value));
    }

    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"unblock".into(), &JsValue::from(patch.unblock));
    let _ = js_sys::Reflect::set(&result, &"props".into(), &props);
    let _ = js_sys::Reflect::set(&result, &"rulesToAdd".into(), &JsValue::from_str(&patch.rules_to_add));
    let _ = js_sys::Reflect::set(&result, &"rulesToRemove".into(), &JsValue::from_str(&patch.rules_to_remove));
    result.into()
}
