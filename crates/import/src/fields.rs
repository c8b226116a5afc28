use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

fn pattern_cache() -> &'static Mutex<HashMap<String, Regex>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Extract the value of the first `<field>` tag in `fragment`.
///
/// Tolerates the OFX 1.x unclosed-tag convention: the tag match is
/// case-insensitive and the value runs to the next `<` or end of line.
/// Returns an empty string when the tag is absent; callers that need to
/// distinguish absent from empty apply their own validity checks on top.
pub fn extract_field(fragment: &str, field: &str) -> String {
    let re = {
        let mut cache = pattern_cache().lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(field.to_uppercase())
            .or_insert_with(|| {
                Regex::new(&format!(r"(?i)<{}>([^<\r\n]*)", regex::escape(field)))
                    .expect("invalid field pattern")
            })
            .clone()
    };
    re.captures(fragment)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default()
}
