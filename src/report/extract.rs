use lazy_regex::{Lazy, Regex, lazy_regex};

/// `expected: X, got: Y`, `want = X actual = Y` and similar keyed forms
static RE_KEYED: Lazy<Regex> = lazy_regex!(
    r#"(?i)\b(?:expected|want)\b[^:=]{0,40}?[:=]\s*(.+?)[\s,;]*\b(?:got|actual)\b[^:=]{0,40}?[:=]\s*("[^"]*"|\S+)"#
);
static RE_WANT_GOT: Lazy<Regex> = lazy_regex!(r#"(?i)\bwant\s+(.+?)\s+got\s+("[^"]*"|\S+)"#);
static RE_EXPECTED_BUT_GOT: Lazy<Regex> =
    lazy_regex!(r#"(?i)\bexpected\s+(.+?)\s+but\s+got\s+("[^"]*"|\S+)"#);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedActual {
    pub expected: String,
    pub actual: String,
}

/// Best-effort extraction of the expected and actual values from a failure message
///
/// Patterns are tried in a fixed order and the first match wins. Returns
/// `None` when nothing recognizable is found.
pub fn extract_expected_actual(text: &str) -> Option<ExpectedActual> {
    [&RE_KEYED, &RE_WANT_GOT, &RE_EXPECTED_BUT_GOT]
        .into_iter()
        .find_map(|re| {
            let caps = re.captures(text)?;
            let expected = clean(caps.get(1)?.as_str());
            let actual = clean(caps.get(2)?.as_str());
            (!expected.is_empty() && !actual.is_empty()).then(|| ExpectedActual {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        })
}

fn clean(value: &str) -> &str {
    value.trim().trim_end_matches([',', ';']).trim_end()
}
