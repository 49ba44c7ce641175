//! Response schema enforcement.
//!
//! Model output is free text that usually, but not reliably, contains a
//! JSON object. The enforcer turns it into a fully-typed value or falls
//! back to the caller-declared default shape. It never best-effort parses
//! into a partial or differently-shaped value: the returned value always
//! has exactly the default's keyset, so every downstream consumer can treat
//! it as fully typed regardless of model misbehavior.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Coerce `raw` into the shape of `default`.
///
/// Rules:
/// - `raw` must parse as a JSON object (markdown code fences are tolerated
///   and stripped); arrays, scalars, and parse failures yield `default`.
/// - Parsed fields are shallow-merged over `default`: extra keys are
///   dropped, missing keys keep their default values.
/// - If the merged object does not deserialize back into `T` (e.g. a field
///   has the wrong type), the whole thing yields `default`.
///
/// Never panics, never errors.
pub fn enforce<T>(raw: &str, default: T) -> T
where
    T: Serialize + DeserializeOwned,
{
    match try_enforce(raw, &default) {
        Some(value) => value,
        None => {
            tracing::warn!(len = raw.len(), "model output failed schema enforcement, using default shape");
            default
        }
    }
}

fn try_enforce<T>(raw: &str, default: &T) -> Option<T>
where
    T: Serialize + DeserializeOwned,
{
    let parsed: JsonValue = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let parsed = parsed.as_object()?;

    let mut merged = serde_json::to_value(default).ok()?;
    let slots = merged.as_object_mut()?;
    for (key, slot) in slots.iter_mut() {
        if let Some(value) = parsed.get(key) {
            *slot = value.clone();
        }
    }

    serde_json::from_value(merged).ok()
}

/// Strip a surrounding markdown code fence, with or without a `json` tag.
/// Models add these despite instructions not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
