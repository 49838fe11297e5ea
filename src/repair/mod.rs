//! Repair of Python-dict-literal JSON (`{'key': 'value'}`) emitted by some
//! upstream models inside tool-call arguments.
//!
//! Detection is a cheap regex battery. Rewriting reclassifies each single
//! quote as structural or literal from its neighbours. Each attempt runs a
//! stronger rewrite over the original text (quotes, then quotes nested in
//! strings, then `True`/`False`/`None`), and the first result that parses
//! as JSON is accepted.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::debug;

use crate::config::JsonRepairConfig;

const SHORT_FRAGMENT_CHARS: usize = 5;

static PYTHON_LITERAL_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // {'key': 'value'}
        r"\{'[^']*':\s*'[^']*'\}",
        // 'key': 'value'
        r"'[^']*':\s*'[^']*'",
        // [{'key': 'value'
        r"\[\{'[^']*':\s*'[^']*'",
        // {'key': 'value',
        r"\{'[^']*':\s*'[^']*',",
        // , 'key': 'value'
        r"',\s*'[^']*':\s*'[^']*'",
        // fragment cut right after a key: ...'key': '
        r"':\s*'$",
        // fragment opening a dict: {'  or  [{'
        r"^\s*\[?\s*\{\s*'",
        // 'key': True
        r"'[^']*':\s*(True|False|None)\b",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// True when `input` contains any Python-dict-literal marker.
#[must_use]
pub fn looks_like_python_literal(input: &str) -> bool {
    input.contains('\'') && PYTHON_LITERAL_MARKERS.iter().any(|re| re.is_match(input))
}

/// True when `input` is non-blank and parses as JSON.
#[must_use]
pub fn is_valid_json(input: &str) -> bool {
    let trimmed = input.trim();
    !trimmed.is_empty() && serde_json::from_str::<serde::de::IgnoredAny>(trimmed).is_ok()
}

/// Python-literal JSON fixer bound to one repair configuration.
#[derive(Debug, Clone, Default)]
pub struct JsonRepair {
    config: JsonRepairConfig,
}

impl JsonRepair {
    #[must_use]
    pub fn new(config: JsonRepairConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn is_target_tool(&self, tool_name: &str) -> bool {
        self.config.target_tools.iter().any(|t| t == tool_name)
    }

    /// Repair is on, the tool is targeted, and the content looks Python-styled.
    #[must_use]
    pub fn should_apply_fix(&self, tool_name: &str, content: &str) -> bool {
        self.config.enabled && self.is_target_tool(tool_name) && looks_like_python_literal(content)
    }

    /// Rewrite `input` into valid JSON if it is a Python-style literal.
    ///
    /// Returns the input unchanged with `false` when it is already valid JSON,
    /// shows no Python-literal markers, or cannot be turned into valid JSON.
    #[must_use]
    pub fn fix<'a>(&self, input: &'a str) -> (Cow<'a, str>, bool) {
        if !looks_like_python_literal(input) || is_valid_json(input) {
            return (Cow::Borrowed(input), false);
        }

        if self.config.debug_logging {
            debug!(original = input, "detected Python-style JSON, attempting fix");
        }

        let attempts = usize::try_from(self.config.max_attempts)
            .unwrap_or(usize::MAX)
            .clamp(1, REWRITE_LADDER.len());
        for (attempt, &rewrite) in REWRITE_LADDER[..attempts].iter().enumerate() {
            let rewritten = rewrite_python_literal(input, rewrite);
            if is_valid_json(&rewritten) {
                if self.config.debug_logging {
                    debug!(
                        original = input,
                        fixed = rewritten.as_str(),
                        attempt = attempt + 1,
                        "fixed Python-style JSON"
                    );
                }
                return (Cow::Owned(rewritten), true);
            }
        }

        if self.config.debug_logging {
            debug!(original = input, "Python-style JSON could not be repaired");
        }
        (Cow::Borrowed(input), false)
    }

    /// Apply [`Self::fix`] to complete tool arguments when the tool is targeted.
    #[must_use]
    pub fn repair_tool_arguments<'a>(&self, tool_name: &str, arguments: &'a str) -> Cow<'a, str> {
        if !self.should_apply_fix(tool_name, arguments) {
            return Cow::Borrowed(arguments);
        }
        let (fixed, was_fixed) = self.fix(arguments);
        if was_fixed {
            debug!(tool = tool_name, "repaired Python-style tool arguments");
        }
        fixed
    }
}

/// Rewrite strength for one attempt; each level includes the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rewrite {
    /// Structural single quotes become double quotes.
    Quotes,
    /// Also escape `"` inside single-quoted strings and unescape `\'`.
    InnerQuotes,
    /// Also map bare `True`/`False`/`None` to JSON literals.
    Literals,
}

const REWRITE_LADDER: [Rewrite; 3] = [Rewrite::Quotes, Rewrite::InnerQuotes, Rewrite::Literals];

fn rewrite_python_literal(input: &str, rewrite: Rewrite) -> String {
    let chars: Vec<char> = input.chars().collect();
    let short = chars.len() <= SHORT_FRAGMENT_CHARS;
    let mut out = String::with_capacity(input.len() + 8);
    let mut in_single = false;
    let mut in_double = false;
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        if c == '\'' && (short || is_structural_quote(&chars, pos)) {
            in_single = !in_single;
            out.push('"');
            pos += 1;
            continue;
        }

        if rewrite >= Rewrite::InnerQuotes && in_single {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => {
                    match chars.get(pos + 1) {
                        Some('\'') => out.push('\''),
                        Some('"') => out.push_str("\\\""),
                        Some(&next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push('\\'),
                    }
                    pos += 2;
                    continue;
                }
                _ => out.push(c),
            }
            pos += 1;
            continue;
        }

        if !in_single {
            if c == '"' {
                in_double = !in_double;
            } else if in_double && c == '\\' {
                out.push(c);
                if let Some(&next) = chars.get(pos + 1) {
                    out.push(next);
                }
                pos += 2;
                continue;
            }
        }

        if rewrite >= Rewrite::Literals
            && !in_single
            && !in_double
            && c.is_ascii_alphabetic()
            && (pos == 0 || !is_word_char(chars[pos - 1]))
        {
            let end = chars[pos..]
                .iter()
                .position(|&ch| !is_word_char(ch))
                .map_or(chars.len(), |len| pos + len);
            let word: String = chars[pos..end].iter().collect();
            out.push_str(match word.as_str() {
                "True" => "true",
                "False" => "false",
                "None" => "null",
                other => other,
            });
            pos = end;
            continue;
        }

        out.push(c);
        pos += 1;
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_structural_quote(chars: &[char], pos: usize) -> bool {
    let prev = chars[..pos].iter().rev().find(|c| !c.is_whitespace());
    match prev {
        None | Some('{' | '[' | ',' | ':') => return true,
        Some(_) => {}
    }

    let next = chars[pos + 1..].iter().find(|c| !c.is_whitespace());
    matches!(next, None | Some(':' | ',' | '}' | ']'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixer() -> JsonRepair {
        JsonRepair::new(JsonRepairConfig::default())
    }

    #[test]
    fn test_simple_dict_is_fixed() {
        let (fixed, was_fixed) = fixer().fix("{'a': 'b'}");
        assert!(was_fixed);
        assert_eq!(fixed, r#"{"a": "b"}"#);
        assert!(is_valid_json(&fixed));
    }

    #[test]
    fn test_todowrite_payload() {
        let input = "{'todos': [{'content': 'Write tests', 'status': 'pending', 'id': '1'}]}";
        let (fixed, was_fixed) = fixer().fix(input);
        assert!(was_fixed);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["todos"][0]["content"], "Write tests");
        assert_eq!(value["todos"][0]["status"], "pending");
    }

    #[test]
    fn test_apostrophe_inside_value_survives() {
        let input = "{'content': 'Don't break this', 'status': 'pending'}";
        let (fixed, was_fixed) = fixer().fix(input);
        assert!(was_fixed);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["content"], "Don't break this");
    }

    #[test]
    fn test_valid_json_is_untouched() {
        let input = r#"{"text":"it's 'quoted': 'x'"}"#;
        let (out, was_fixed) = fixer().fix(input);
        assert!(!was_fixed);
        assert_eq!(out, input);
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let (out, was_fixed) = fixer().fix("It's a sunny day");
        assert!(!was_fixed);
        assert_eq!(out, "It's a sunny day");
    }

    #[test]
    fn test_unrepairable_returns_original() {
        let input = "{'a': 'b', 'c': }";
        let (out, was_fixed) = fixer().fix(input);
        assert!(!was_fixed);
        assert_eq!(out, input);
    }

    #[test]
    fn test_partial_fragment_detection() {
        assert!(looks_like_python_literal("{'todos': [{'content': '"));
        assert!(looks_like_python_literal("{'"));
        assert!(looks_like_python_literal("'status': 'done'"));
        assert!(!looks_like_python_literal(r#"{"status": "done"}"#));
        assert!(!looks_like_python_literal("no quotes here"));
    }

    #[test]
    fn test_short_fragment_quotes_are_structural() {
        assert_eq!(rewrite_python_literal("{'", Rewrite::Quotes), "{\"");
        assert_eq!(rewrite_python_literal("'a'", Rewrite::Quotes), "\"a\"");
    }

    fn fixer_with_attempts(max_attempts: u32) -> JsonRepair {
        JsonRepair::new(JsonRepairConfig {
            max_attempts,
            ..JsonRepairConfig::default()
        })
    }

    #[test]
    fn test_embedded_double_quotes_need_second_attempt() {
        let input = r#"{'command': 'echo "hi"', 'description': 'Say hi'}"#;
        assert!(!is_valid_json(&rewrite_python_literal(input, Rewrite::Quotes)));

        let (out, was_fixed) = fixer_with_attempts(1).fix(input);
        assert!(!was_fixed);
        assert_eq!(out, input);

        let (fixed, was_fixed) = fixer_with_attempts(2).fix(input);
        assert!(was_fixed);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["command"], r#"echo "hi""#);
        assert_eq!(value["description"], "Say hi");
    }

    #[test]
    fn test_escaped_apostrophe_is_unescaped() {
        let input = r"{'content': 'don\'t stop', 'status': 'pending'}";
        let (fixed, was_fixed) = fixer_with_attempts(2).fix(input);
        assert!(was_fixed);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["content"], "don't stop");
    }

    #[test]
    fn test_python_literals_need_third_attempt() {
        let input = "{'id': '1', 'done': True, 'owner': None, 'note': 'None of it'}";
        assert!(looks_like_python_literal(input));

        let (_, was_fixed) = fixer_with_attempts(2).fix(input);
        assert!(!was_fixed);

        let (fixed, was_fixed) = fixer_with_attempts(3).fix(input);
        assert!(was_fixed);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["done"], true);
        assert!(value["owner"].is_null());
        assert_eq!(value["note"], "None of it");
    }

    #[test]
    fn test_attempts_beyond_ladder_are_harmless() {
        let (fixed, was_fixed) = fixer_with_attempts(50).fix("{'a': 'b'}");
        assert!(was_fixed);
        assert_eq!(fixed, r#"{"a": "b"}"#);
    }

    #[test]
    fn test_should_apply_fix_gating() {
        let fixer = fixer();
        assert!(fixer.should_apply_fix("TodoWrite", "{'a': 'b'}"));
        assert!(!fixer.should_apply_fix("Bash", "{'a': 'b'}"));
        assert!(!fixer.should_apply_fix("TodoWrite", r#"{"a": "b"}"#));

        let disabled = JsonRepair::new(JsonRepairConfig {
            enabled: false,
            ..JsonRepairConfig::default()
        });
        assert!(!disabled.should_apply_fix("TodoWrite", "{'a': 'b'}"));
    }

    #[test]
    fn test_repair_tool_arguments_only_for_targets() {
        let fixer = fixer();
        assert_eq!(
            fixer.repair_tool_arguments("TodoWrite", "{'a': 'b'}"),
            r#"{"a": "b"}"#
        );
        assert_eq!(
            fixer.repair_tool_arguments("Bash", "{'a': 'b'}"),
            "{'a': 'b'}"
        );
    }

    #[test]
    fn test_non_ascii_content_preserved() {
        let (fixed, was_fixed) = fixer().fix("{'note': 'café ✓'}");
        assert!(was_fixed);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["note"], "café ✓");
    }
}
