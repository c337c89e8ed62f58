use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

/// 보기 목록을 순서 있는 문자열 목록으로 정규화한다.
///
/// 허용하는 모양:
/// * 배열 `["3", "4"]`
/// * 키가 있는 맵 `{"a": "3", "b": "4"}` / `{"0": "3", "1": "4"}`
/// * 위 둘을 JSON 으로 인코딩한 문자열 (한 단계만 풀어본다)
///
/// 그 외(파싱 불가 문자열, 숫자, null 등)는 빈 목록이 된다. 절대 panic 하지 않는다.
pub fn normalize_options(raw: &JsonValue) -> Vec<String> {
    normalize_inner(raw, true)
}

fn normalize_inner(raw: &JsonValue, allow_encoded: bool) -> Vec<String> {
    match raw {
        JsonValue::Array(items) => items.iter().map(option_text).collect(),
        JsonValue::Object(map) => ordered_values(map),
        JsonValue::String(encoded) if allow_encoded => {
            match serde_json::from_str::<JsonValue>(encoded.trim()) {
                Ok(parsed @ (JsonValue::Array(_) | JsonValue::Object(_))) => {
                    normalize_inner(&parsed, false)
                }
                _ => {
                    warn!("Unparseable options string, using empty option list");
                    Vec::new()
                }
            }
        }
        other => {
            warn!("Malformed options payload: {}", other);
            Vec::new()
        }
    }
}

/// 보기 하나를 문자열로. 쓸 수 없는 항목도 빈 칸으로 남겨 위치(a/b/c/d)를 지킨다.
fn option_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
            debug!("Nested option item {} replaced with a blank", nested);
            String::new()
        }
    }
}

fn ordered_values(map: &Map<String, JsonValue>) -> Vec<String> {
    let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();

    let all_numeric = entries.iter().all(|(key, _)| key.trim().parse::<u64>().is_ok());
    if all_numeric {
        entries.sort_by_key(|(key, _)| key.trim().parse::<u64>().unwrap_or(u64::MAX));
    } else {
        entries.sort_by_key(|(key, _)| key.trim().to_lowercase());
    }

    entries
        .into_iter()
        .map(|(_, value)| option_text(value))
        .collect()
}
