//! WebAssembly bindings for AdXGuard custom blocking
//!
//! Stateless helpers for the extension's popup and background scripts. The
//! JavaScript side owns storage and the `declarativeNetRequest` calls; this
//! module validates patterns, compiles them and computes sync plans in the
//! host's JSON shape.

use wasm_bindgen::prelude::*;

use adx_compiler::{compile, plan};
use adx_core::{
    config::IdScheme,
    filter::UrlFilter,
    pattern::{validate_pattern as validate, ValidationError},
    store::BlockedList,
    types::{CompiledRule, InstalledRule, ResourceType, MAX_PATTERN_LEN},
};

/// Validate a pattern against the already blocked ones.
///
/// Returns `{ ok: true, pattern }` with the trimmed pattern, or
/// `{ ok: false, code, error }`.
#[wasm_bindgen]
pub fn validate_pattern(pattern: &str, existing: JsValue) -> Result<JsValue, JsValue> {
    let existing = string_array(&existing)?;
    let result = js_sys::Object::new();

    match validate(pattern, existing.iter().map(String::as_str), MAX_PATTERN_LEN) {
        Ok(trimmed) => {
            let _ = js_sys::Reflect::set(&result, &"ok".into(), &JsValue::from(true));
            let _ = js_sys::Reflect::set(&result, &"pattern".into(), &JsValue::from_str(trimmed));
        }
        Err(e) => {
            let _ = js_sys::Reflect::set(&result, &"ok".into(), &JsValue::from(false));
            let _ = js_sys::Reflect::set(&result, &"code".into(), &JsValue::from_str(error_code(&e)));
            let _ = js_sys::Reflect::set(&result, &"error".into(), &JsValue::from_str(&e.to_string()));
        }
    }

    Ok(result.into())
}

/// Compile patterns into host rules. `rule_ids` is optional; without it
/// identifiers are positional (`1000 + index`).
#[wasm_bindgen]
pub fn compile_rules(patterns: JsValue, rule_ids: JsValue) -> Result<JsValue, JsValue> {
    let list = blocked_list(&patterns, &rule_ids)?;
    Ok(rules_to_js(&compile(&list)).into())
}

/// Replace-all plan: `{ removeRuleIds, addRules }`.
#[wasm_bindgen]
pub fn plan_sync(installed_ids: JsValue, patterns: JsValue, rule_ids: JsValue) -> Result<JsValue, JsValue> {
    let installed: Vec<InstalledRule> = id_array(&installed_ids)?
        .unwrap_or_default()
        .into_iter()
        .map(|id| InstalledRule {
            id,
            condition: Default::default(),
        })
        .collect();
    let list = blocked_list(&patterns, &rule_ids)?;
    let sync_plan = plan(&compile(&list), &installed);

    let remove_ids = js_sys::Array::new();
    for id in &sync_plan.remove_rule_ids {
        remove_ids.push(&JsValue::from(*id));
    }

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"removeRuleIds".into(), &remove_ids);
    let _ = js_sys::Reflect::set(&js_result, &"addRules".into(), &rules_to_js(&sync_plan.add_rules));
    Ok(js_result.into())
}

#[wasm_bindgen]
pub fn normalize_filter(pattern: &str) -> String {
    adx_compiler::normalize_filter(pattern)
}

#[wasm_bindgen]
pub fn url_filter_matches(filter: &str, url: &str) -> bool {
    UrlFilter::parse(filter).matches(url)
}

/// First custom rule that blocks `url`: `{ blocked, ruleId }`, `ruleId` is
/// -1 when nothing matched.
#[wasm_bindgen]
pub fn match_custom_rules(
    patterns: JsValue,
    rule_ids: JsValue,
    url: &str,
    request_type: &str,
) -> Result<JsValue, JsValue> {
    let list = blocked_list(&patterns, &rule_ids)?;
    let resource_type = ResourceType::from_str(request_type);
    let hit = compile(&list)
        .into_iter()
        .find(|rule| rule.matches(url, resource_type));

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"blocked".into(), &JsValue::from(hit.is_some()));
    let _ = js_sys::Reflect::set(
        &js_result,
        &"ruleId".into(),
        &JsValue::from(hit.map(|rule| rule.id).unwrap_or(-1)),
    );
    Ok(js_result.into())
}

fn error_code(err: &ValidationError) -> &'static str {
    match err {
        ValidationError::EmptyPattern => "empty",
        ValidationError::TooLong { .. } => "tooLong",
        ValidationError::Duplicate => "duplicate",
        ValidationError::InvalidFormat => "invalidFormat",
    }
}

fn blocked_list(patterns: &JsValue, rule_ids: &JsValue) -> Result<BlockedList, JsValue> {
    let patterns = string_array(patterns)?;
    Ok(match id_array(rule_ids)? {
        Some(ids) => BlockedList::restore(patterns, Some(ids), None, IdScheme::Stable),
        None => BlockedList::from_patterns(patterns),
    })
}

fn string_array(value: &JsValue) -> Result<Vec<String>, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Vec::new());
    }
    if !js_sys::Array::is_array(value) {
        return Err(JsValue::from_str("Expected an array of strings"));
    }

    js_sys::Array::from(value)
        .iter()
        .map(|item| {
            item.as_string()
                .ok_or_else(|| JsValue::from_str("Pattern must be a string"))
        })
        .collect()
}

fn id_array(value: &JsValue) -> Result<Option<Vec<i32>>, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    if !js_sys::Array::is_array(value) {
        return Err(JsValue::from_str("Expected an array of rule ids"));
    }

    let mut ids = Vec::new();
    for item in js_sys::Array::from(value).iter() {
        match item.as_f64() {
            Some(n) if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 => {
                ids.push(n as i32)
            }
            _ => {
                web_sys::console::warn_1(&JsValue::from_str("Ignoring rule ids: non-integer entry"));
                return Ok(None);
            }
        }
    }
    Ok(Some(ids))
}

fn rules_to_js(rules: &[CompiledRule]) -> js_sys::Array {
    let array = js_sys::Array::new_with_length(rules.len() as u32);
    for (i, rule) in rules.iter().enumerate() {
        array.set(i as u32, rule_to_js(rule));
    }
    array
}

fn rule_to_js(rule: &CompiledRule) -> JsValue {
    let action = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&action, &"type".into(), &JsValue::from_str("block"));

    let resource_types = js_sys::Array::new();
    for resource_type in &rule.condition.resource_types {
        resource_types.push(&JsValue::from_str(resource_type.as_str()));
    }

    let condition = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&condition, &"urlFilter".into(), &JsValue::from_str(rule.url_filter()));
    let _ = js_sys::Reflect::set(&condition, &"resourceTypes".into(), &resource_types);

    let js_rule = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_rule, &"id".into(), &JsValue::from(rule.id));
    let _ = js_sys::Reflect::set(&js_rule, &"priority".into(), &JsValue::from(rule.priority));
    let _ = js_sys::Reflect::set(&js_rule, &"action".into(), &action);
    let _ = js_sys::Reflect::set(&js_rule, &"condition".into(), &condition);
    js_rule.into()
}
