// src/request/parse.rs

//! Parsers for the small text formats accepted on the command line.
//!
//! - tags: `a, "b, c", d e`
//! - config: `max_epoch=10, lr=0.01, name="resnet, v2", verbose=yes`
//! - env: `FOO = bar`, and env files with one such pair per line

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};

use crate::errors::{MlrunError, Result};

static ENV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([^=]+?)\s*=\s*(.*?)\s*$").expect("valid env pattern"));

/// One comma-separated item: either a double-quoted string (escapes already
/// resolved) or raw text with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Quoted(String),
    Bare(String),
}

struct Cursor<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
        }
    }

    fn error(&self, what: &str) -> MlrunError {
        MlrunError::InvalidArgument(format!("{what} in {:?}", self.source))
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    /// Consume a `,` separator. Returns `false` at the end of input.
    fn separator(&mut self) -> Result<bool> {
        self.skip_ws();
        match self.chars.next() {
            None => Ok(false),
            Some(',') => Ok(true),
            Some(c) => Err(self.error(&format!("unexpected {c:?}"))),
        }
    }

    fn item(&mut self) -> Result<Item> {
        self.skip_ws();
        if self.chars.next_if_eq(&'"').is_some() {
            let mut out = String::new();
            loop {
                match self.chars.next() {
                    None => return Err(self.error("unterminated quoted string")),
                    Some('"') => break,
                    Some('\\') => match self.chars.next() {
                        Some(c) => out.push(c),
                        None => return Err(self.error("dangling escape")),
                    },
                    Some(c) => out.push(c),
                }
            }
            return Ok(Item::Quoted(out));
        }

        let mut out = String::new();
        while let Some(c) = self.chars.next_if(|c| *c != ',') {
            out.push(c);
        }
        Ok(Item::Bare(out.trim().to_string()))
    }

    fn identifier(&mut self) -> Result<String> {
        self.skip_ws();
        let mut out = String::new();
        if let Some(c) = self.chars.next_if(|c| c.is_ascii_alphabetic() || *c == '_') {
            out.push(c);
        } else {
            return Err(self.error("expected a key"));
        }
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
            out.push(c);
        }
        Ok(out)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        if self.chars.next_if_eq(&expected).is_some() {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}")))
        }
    }
}

/// Parse `tag1, "tag, 2", tag 3` into a list; empty items are dropped.
pub fn parse_tags(text: &str) -> Result<Vec<String>> {
    let mut cursor = Cursor::new(text);
    let mut tags = Vec::new();
    loop {
        match cursor.item()? {
            Item::Quoted(s) | Item::Bare(s) if !s.is_empty() => tags.push(s),
            _ => {}
        }
        if !cursor.separator()? {
            break;
        }
    }
    Ok(tags)
}

/// Parse `name1=value1, name2=value2` into a map of typed values.
pub fn parse_config(text: &str) -> Result<BTreeMap<String, Value>> {
    let mut cursor = Cursor::new(text);
    let mut out = BTreeMap::new();
    cursor.skip_ws();
    if cursor.at_end() {
        return Ok(out);
    }
    loop {
        let key = cursor.identifier()?;
        cursor.expect('=')?;
        let value = match cursor.item()? {
            Item::Quoted(s) => Value::String(s),
            Item::Bare(s) => typed_value(&s),
        };
        out.insert(key, value);
        if !cursor.separator()? {
            break;
        }
    }
    Ok(out)
}

fn typed_value(text: &str) -> Value {
    match text {
        "True" | "true" | "yes" | "on" => return Value::Bool(true),
        "False" | "false" | "no" | "off" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    let numeric = !text.is_empty()
        && text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if numeric {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

/// Read a JSON object of configuration values from `path`.
pub fn parse_config_file(path: &Path) -> Result<BTreeMap<String, Value>> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| MlrunError::Config(format!("parsing config file {:?}: {e}", path)))?;
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(MlrunError::Config(format!(
            "config file does not contain an object: {:?}",
            path
        ))),
    }
}

/// Parse `FOO=BAR`; whitespace around the pair and around `=` is ignored.
pub fn parse_env(source: &str) -> Result<(String, String)> {
    let caps = ENV_PATTERN.captures(source).ok_or_else(|| {
        MlrunError::InvalidArgument(format!(
            "syntax error in environment variable: {source:?}"
        ))
    })?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Read `NAME=VALUE` lines; blank lines and `#` comments are skipped.
pub fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)?;
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = parse_env(line)?;
        out.insert(name, value);
    }
    Ok(out)
}

/// Merge `--gpu` arguments into a device list: split on commas, drop
/// duplicates, numeric ids first in numeric order, then the rest by name.
pub fn device_list<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique: BTreeSet<String> = values
        .into_iter()
        .flat_map(|v| {
            v.as_ref()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();

    let mut devices: Vec<String> = unique.into_iter().collect();
    devices.sort_by_key(|d| match d.parse::<i64>() {
        Ok(n) => (String::new(), n),
        Err(_) => (d.clone(), 0),
    });
    devices.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn tags_handle_quotes_and_blanks() {
        assert!(parse_tags("").unwrap().is_empty());
        assert_eq!(parse_tags("a").unwrap(), vec!["a"]);
        assert_eq!(
            parse_tags(r#"a, "b", c d, hello "world", "hello, \"world\"""#).unwrap(),
            vec!["a", "b", "c d", r#"hello "world""#, r#"hello, "world""#]
        );
        assert_eq!(parse_tags("a,,b,").unwrap(), vec!["a", "b"]);
        assert!(parse_tags(r#""unterminated"#).is_err());
    }

    #[test]
    fn config_values_are_typed() {
        assert!(parse_config("").unwrap().is_empty());

        let parsed = parse_config(
            r#"a = 1 , b = 123.0 , c = true , d = true false , e = hello "world" , f = "hello, \"world\"", g = , h=off, i=-3"#,
        )
        .unwrap();

        assert_eq!(parsed["a"], json!(1));
        assert_eq!(parsed["b"], json!(123.0));
        assert_eq!(parsed["c"], json!(true));
        assert_eq!(parsed["d"], json!("true false"));
        assert_eq!(parsed["e"], json!(r#"hello "world""#));
        assert_eq!(parsed["f"], json!(r#"hello, "world""#));
        assert_eq!(parsed["g"], json!(""));
        assert_eq!(parsed["h"], json!(false));
        assert_eq!(parsed["i"], json!(-3));
    }

    #[test]
    fn config_rejects_missing_key() {
        assert!(parse_config("=1").is_err());
        assert!(parse_config("a 1").is_err());
    }

    #[test]
    fn env_pairs() {
        assert_eq!(
            parse_env("  FOO = bar baz ").unwrap(),
            ("FOO".to_string(), "bar baz".to_string())
        );
        assert_eq!(
            parse_env("URL=http://x/?a=b").unwrap(),
            ("URL".to_string(), "http://x/?a=b".to_string())
        );
        assert!(parse_env("no equals sign").is_err());
    }

    #[test]
    fn env_file_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.env");
        fs::write(&path, "# comment\n\nA=1\n  B = two  \n").unwrap();

        let env = parse_env_file(&path).unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "two");
    }

    #[test]
    fn config_file_must_be_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&good, r#" {"lr": 0.1} "#).unwrap();
        fs::write(&bad, "[1, 2]").unwrap();

        assert_eq!(parse_config_file(&good).unwrap()["lr"], json!(0.1));
        assert!(matches!(
            parse_config_file(&bad),
            Err(MlrunError::Config(_))
        ));
    }

    #[test]
    fn devices_sorted_numeric_first() {
        assert_eq!(device_list(["3,1", "10", "1", "cpu", "0"]), "0,1,3,10,cpu");
        assert_eq!(device_list(Vec::<String>::new()), "");
    }
}
