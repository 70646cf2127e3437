use adx_core::pattern::has_wildcard;
use adx_core::store::BlockedList;
use adx_core::types::{CompiledRule, CUSTOM_RULE_ID_BASE, WILDCARD};
use adx_core::url::starts_with_scheme;

/// Turn a blocked pattern into a host `urlFilter`.
///
/// - no wildcard, no scheme: a domain fragment, matched anywhere (`*p*`)
/// - no wildcard, with scheme: a URL prefix (`p*`)
/// - wildcard present: passed through unchanged
pub fn normalize_filter(pattern: &str) -> String {
    if has_wildcard(pattern) {
        pattern.to_string()
    } else if starts_with_scheme(pattern) {
        format!("{pattern}{WILDCARD}")
    } else {
        format!("{WILDCARD}{pattern}{WILDCARD}")
    }
}

/// Compile the blocked list into block rules, one per entry, in list order,
/// each carrying the entry's assigned identifier.
pub fn compile(list: &BlockedList) -> Vec<CompiledRule> {
    list.entries()
        .iter()
        .map(|entry| CompiledRule::block(entry.rule_id, normalize_filter(&entry.pattern)))
        .collect()
}

/// Compile bare patterns with positional identifiers (`1000 + index`).
pub fn compile_patterns<P: AsRef<str>>(patterns: &[P]) -> Vec<CompiledRule> {
    patterns
        .iter()
        .zip(CUSTOM_RULE_ID_BASE..)
        .map(|(pattern, id)| CompiledRule::block(id, normalize_filter(pattern.as_ref())))
        .collect()
}
