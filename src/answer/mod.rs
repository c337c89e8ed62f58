//! 답안 판정.
//!
//! PvP 는 서버 판정만 믿기 때문에 여기 있는 로직은 Raid 의 로컬 판정과
//! 보기 정규화에만 쓰인다.

use serde::Serialize;
use serde_json::Value as JsonValue;

mod normalize;

pub use normalize::normalize_options;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl Verdict {
    pub fn is_correct(&self) -> bool {
        matches!(self, Verdict::Correct)
    }
}

/// 정답 키를 비교 가능한 문자열로 바꾼다. 숫자/불리언 키도 문자열 형태로 다룬다.
pub fn key_text(raw: &JsonValue) -> Option<String> {
    match raw {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn canonical(s: &str) -> String {
    s.trim().to_lowercase()
}

fn letter_index(key: &str) -> Option<usize> {
    match key {
        "a" => Some(0),
        "b" => Some(1),
        "c" => Some(2),
        "d" => Some(3),
        _ => None,
    }
}

fn boolean_index(key: &str) -> Option<usize> {
    match key {
        "true" | "verdadero" => Some(0),
        "false" | "falso" => Some(1),
        _ => None,
    }
}

/// 정답 키가 가리키는 보기 번호.
///
/// 1. 보기 중 하나와 문자 그대로 일치하면 그 보기 (대소문자 무시, trim)
/// 2. 아니면 `a,b,c,d → 0,1,2,3`
/// 3. 아니면 `true/verdadero → 0`, `false/falso → 1`
pub fn correct_index(options: &[String], key: &str) -> Option<usize> {
    let key = canonical(key);
    if key.is_empty() {
        return None;
    }

    if let Some(index) = options.iter().position(|option| canonical(option) == key) {
        return Some(index);
    }

    letter_index(&key)
        .or_else(|| boolean_index(&key))
        .filter(|index| *index < options.len())
}

pub fn matches_key(options: &[String], selected: usize, key: &str) -> bool {
    selected < options.len() && correct_index(options, key) == Some(selected)
}

/// Raid 로컬 판정. 정답 키가 없으면 맞힐 수 없는 문제로 보고 오답 처리한다.
pub fn evaluate(options: &[String], key: Option<&str>, selected: usize) -> Verdict {
    match key {
        Some(key) if matches_key(options, selected, key) => Verdict::Correct,
        _ => Verdict::Incorrect,
    }
}
