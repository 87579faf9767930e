use super::ast::{ActionLine, LineKind, Script, SourceLine};
use super::literal::{delay_text, parse_duration_ms, parse_timestamp_ms};
use super::{LoadError, Result};

/// Tokenize script text into classified lines.
pub fn tokenize(name: &str, source: &str) -> Result<Script> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim_start_matches('\u{feff}').trim();
        if is_comment(text) {
            continue;
        }
        lines.push(SourceLine {
            line,
            kind: classify(line, text)?,
        });
    }
    Ok(Script::new(name, source, lines))
}

fn is_comment(text: &str) -> bool {
    if text.is_empty() || text.starts_with("//") {
        return true;
    }
    // `#` followed by whitespace is a comment, `#name` is a label.
    match text.strip_prefix('#') {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

fn classify(line: usize, text: &str) -> Result<LineKind> {
    if let Some(rest) = text.strip_prefix('#') {
        return parse_label(line, rest);
    }
    if let Some(rest) = text.strip_prefix(">>>") {
        if is_transition(rest) {
            return split_fields(line, rest).map(LineKind::Action);
        }
        return Ok(LineKind::BranchFailure(branch_target(line, rest)?));
    }
    if let Some(rest) = text.strip_prefix(">>") {
        if is_transition(rest) {
            return split_fields(line, rest).map(LineKind::Action);
        }
        return Ok(LineKind::BranchSuccess(branch_target(line, rest)?));
    }
    if let Some(rest) = text.strip_prefix('>') {
        return split_fields(line, rest).map(LineKind::Action);
    }
    Err(LoadError::Syntax {
        line,
        text: text.to_string(),
    })
}

fn parse_label(line: usize, rest: &str) -> Result<LineKind> {
    let (name, quota) = match rest.split_once('*') {
        Some((name, quota_text)) => {
            let quota = quota_text
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|count| *count > 0)
                .ok_or_else(|| LoadError::InvalidQuota {
                    line,
                    text: quota_text.trim().to_string(),
                })?;
            (name.trim(), Some(quota))
        }
        None => (rest.trim(), None),
    };
    if name.is_empty() {
        return Err(LoadError::Malformed {
            line,
            what: "label",
            text: format!("#{}", rest),
        });
    }
    Ok(LineKind::Label {
        name: name.to_string(),
        quota,
    })
}

fn is_transition(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.starts_with("切換>") || rest.starts_with("切换>") || rest.starts_with("switch>")
}

fn branch_target(line: usize, rest: &str) -> Result<Option<String>> {
    let target = rest.split([',', '，']).next().unwrap_or_default().trim();
    if target.is_empty() {
        return Ok(None);
    }
    match target.strip_prefix('#').map(str::trim) {
        Some(name) if !name.is_empty() => Ok(Some(name.to_string())),
        _ => Err(LoadError::Malformed {
            line,
            what: "branch target",
            text: target.to_string(),
        }),
    }
}

fn split_fields(line: usize, body: &str) -> Result<ActionLine> {
    let mut fields = split_top_level(body).into_iter();
    let head = fields.next().unwrap_or_default();
    if head.is_empty() {
        return Err(LoadError::Syntax {
            line,
            text: format!(">{}", body),
        });
    }

    let mut action = ActionLine {
        head,
        params: Vec::new(),
        delay_ms: None,
        timestamp_ms: None,
    };
    for field in fields {
        if field.is_empty() {
            continue;
        }
        if let Some(stamp) = field.strip_prefix("T=").or_else(|| field.strip_prefix("t=")) {
            let ms = parse_timestamp_ms(stamp).ok_or_else(|| LoadError::Malformed {
                line,
                what: "timestamp",
                text: field.clone(),
            })?;
            action.timestamp_ms = Some(ms);
        } else if let Some(duration) = delay_text(&field) {
            let ms = parse_duration_ms(duration).ok_or_else(|| LoadError::Malformed {
                line,
                what: "delay",
                text: field.clone(),
            })?;
            action.delay_ms = Some(ms);
        } else {
            action.params.push(field);
        }
    }
    Ok(action)
}

/// Split on commas that are not inside parentheses.
fn split_top_level(body: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in body.chars() {
        match ch {
            '(' | '（' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '）' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' | '，' if depth == 0 => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(text: &str) -> LineKind {
        let script = tokenize("t", text).expect("tokenize");
        assert_eq!(script.lines.len(), 1);
        script.lines[0].kind.clone()
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let script = tokenize("t", "\n# 設定\n// note\n#\n>按A\n").unwrap();
        assert_eq!(script.lines.len(), 1);
        assert_eq!(script.lines[0].line, 5);
    }

    #[test]
    fn labels_with_and_without_quota() {
        assert_eq!(
            single("#開始"),
            LineKind::Label {
                name: "開始".into(),
                quota: None
            }
        );
        assert_eq!(
            single("#刷怪*10"),
            LineKind::Label {
                name: "刷怪".into(),
                quota: Some(10)
            }
        );
    }

    #[test]
    fn rejects_non_positive_quota() {
        let err = tokenize("t", ">按A\n#loop*0").unwrap_err();
        assert!(matches!(err, LoadError::InvalidQuota { line: 2, .. }));
        let err = tokenize("t", "#loop*many").unwrap_err();
        assert!(matches!(err, LoadError::InvalidQuota { line: 1, .. }));
    }

    #[test]
    fn instruction_fields() {
        match single(">左鍵點擊(500,300), 延遲50ms, T=1s500") {
            LineKind::Action(action) => {
                assert_eq!(action.head, "左鍵點擊(500,300)");
                assert_eq!(action.delay_ms, Some(50));
                assert_eq!(action.timestamp_ms, Some(1_500));
                assert!(action.params.is_empty());
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn english_delay_form_and_params() {
        match single(">press A, delay=0,T=0s000") {
            LineKind::Action(action) => {
                assert_eq!(action.head, "press A");
                assert_eq!(action.delay_ms, Some(0));
                assert_eq!(action.timestamp_ms, Some(0));
            }
            other => panic!("expected action, got {:?}", other),
        }
        match single(">等待文字>載入完成, 最長15s, T=0s000") {
            LineKind::Action(action) => {
                assert_eq!(action.params, vec!["最長15s".to_string()]);
                assert_eq!(action.delay_ms, None);
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn branch_markers() {
        assert_eq!(single(">>"), LineKind::BranchSuccess(None));
        assert_eq!(single(">>#找到了"), LineKind::BranchSuccess(Some("找到了".into())));
        assert_eq!(single(">>>#重試"), LineKind::BranchFailure(Some("重試".into())));
        assert_eq!(single(">>>"), LineKind::BranchFailure(None));
    }

    #[test]
    fn prefixed_transition_is_an_instruction() {
        match single(">>切換>success>攻擊") {
            LineKind::Action(action) => assert_eq!(action.head, "切換>success>攻擊"),
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn malformed_fields_report_line() {
        let err = tokenize("t", ">按A\n>按B, T=abc").unwrap_err();
        assert!(matches!(err, LoadError::Malformed { line: 2, what: "timestamp", .. }));
        let err = tokenize("t", ">按A, T=99999999999999999h").unwrap_err();
        assert!(matches!(err, LoadError::Malformed { line: 1, what: "timestamp", .. }));
        let err = tokenize("t", ">按B, 延遲soon").unwrap_err();
        assert!(matches!(err, LoadError::Malformed { what: "delay", .. }));
        let err = tokenize("t", ">>retry").unwrap_err();
        assert!(matches!(err, LoadError::Malformed { what: "branch target", .. }));
    }

    #[test]
    fn unrecognised_line() {
        let err = tokenize("t", "press A").unwrap_err();
        assert_eq!(err.line(), 1);
        assert!(matches!(err, LoadError::Syntax { .. }));
    }
}
