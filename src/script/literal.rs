//! Literal forms shared by the tokenizer and the builder.

use crate::capability::Point;

/// Parse a duration such as `500ms`, `30秒`, `1.5s`, `2分鐘`; a bare number is milliseconds.
pub fn parse_duration_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    if number.is_empty() || number.starts_with('.') {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "毫秒" => 1.0,
        "s" | "sec" | "秒" => 1_000.0,
        "m" | "min" | "分" | "分鐘" | "分钟" => 60_000.0,
        "h" | "小時" | "小时" => 3_600_000.0,
        _ => return None,
    };
    let millis = (value * scale).round();
    if !millis.is_finite() || millis >= u64::MAX as f64 {
        return None;
    }
    Some(millis as u64)
}

/// Parse the body of a `T=` field: `0s000`, `1s500`, `1m2s300`, `1500ms`.
///
/// Digits following the last `s` are milliseconds.
pub fn parse_timestamp_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(ms) = text.strip_suffix("ms") {
        return ms.parse().ok();
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let scale = match ch {
            'h' | 'H' => 3_600_000,
            'm' | 'M' => 60_000,
            's' | 'S' => 1_000,
            _ => return None,
        };
        if digits.is_empty() {
            return None;
        }
        let part = digits.parse::<u64>().ok()?.checked_mul(scale)?;
        total = total.checked_add(part)?;
        digits.clear();
    }
    if !digits.is_empty() {
        total = total.checked_add(digits.parse::<u64>().ok()?)?;
    }
    Some(total)
}

/// If `field` is shaped like a delay (`延遲50ms`, `delay=50`, `delay 50ms`, `50ms`),
/// return the duration text it carries.
pub fn delay_text(field: &str) -> Option<&str> {
    let field = field.trim();
    for prefix in ["延遲", "延迟", "delay=", "delay:", "delay "] {
        if let Some(rest) = field.strip_prefix(prefix) {
            return Some(rest.trim());
        }
    }
    if field.eq_ignore_ascii_case("delay") {
        return Some("");
    }
    if field.starts_with(|ch: char| ch.is_ascii_digit()) {
        return Some(field);
    }
    None
}

/// Parse `(a,b,…)` into integers.
pub fn parse_tuple(text: &str) -> Option<Vec<i32>> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|part| part.trim().parse::<i32>().ok())
        .collect()
}

/// Parse `(x,y)` into a point.
pub fn parse_point(text: &str) -> Option<Point> {
    match parse_tuple(text)?.as_slice() {
        [x, y] => Some(Point::new(*x, *y)),
        _ => None,
    }
}
