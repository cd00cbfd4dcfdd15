//! Regex helpers exposed to scripts as the `re` object

use regex::Regex;

use crate::error::{RlmError, RlmResult};

/// Stateless regex toolbox bound into the script scope as `re`.
///
/// Every method compiles its pattern on the fly; a bad pattern produces
/// a descriptive error the script can catch instead of crashing the
/// session.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTools;

impl RegexTools {
    fn compile(pattern: &str) -> RlmResult<Regex> {
        Regex::new(pattern).map_err(|e| RlmError::Script(format!("invalid regex {pattern:?}: {e}")))
    }

    /// All non-overlapping matches of `pattern` in `text`
    pub fn find_all(&self, pattern: &str, text: &str) -> RlmResult<Vec<String>> {
        let re = Self::compile(pattern)?;
        Ok(re.find_iter(text).map(|m| m.as_str().to_string()).collect())
    }

    /// First match of `pattern` in `text`, or an empty string
    pub fn search(&self, pattern: &str, text: &str) -> RlmResult<String> {
        let re = Self::compile(pattern)?;
        Ok(re.find(text).map(|m| m.as_str().to_string()).unwrap_or_default())
    }

    /// Split `text` on `pattern`, keeping at most `limit` pieces when `limit > 0`
    pub fn split(&self, pattern: &str, text: &str, limit: i64) -> RlmResult<Vec<String>> {
        let re = Self::compile(pattern)?;
        let pieces: Vec<String> = if limit > 0 {
            re.splitn(text, limit as usize).map(str::to_string).collect()
        } else {
            re.split(text).map(str::to_string).collect()
        };
        Ok(pieces)
    }

    /// Replace every match of `pattern` in `text` with `repl`
    pub fn replace(&self, pattern: &str, text: &str, repl: &str) -> RlmResult<String> {
        let re = Self::compile(pattern)?;
        Ok(re.replace_all(text, repl).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_all() {
        let re = RegexTools;
        let matches = re.find_all(r"\d+", "a1 b22 c333").unwrap();
        assert_eq!(matches, vec!["1", "22", "333"]);
    }

    #[test]
    fn test_find_all_no_match() {
        let re = RegexTools;
        assert!(re.find_all(r"\d+", "abc").unwrap().is_empty());
    }

    #[test]
    fn test_search_first_match() {
        let re = RegexTools;
        assert_eq!(re.search(r"b\w+", "a bee bar").unwrap(), "bee");
        assert_eq!(re.search(r"z+", "a bee bar").unwrap(), "");
    }

    #[test]
    fn test_split_with_limit() {
        let re = RegexTools;
        let pieces = re.split(r",\s*", "a, b, c, d", 2).unwrap();
        assert_eq!(pieces, vec!["a", "b, c, d"]);

        let all = re.split(r",\s*", "a, b, c", 0).unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_replace() {
        let re = RegexTools;
        assert_eq!(re.replace(r"\d+", "a1b22", "#").unwrap(), "a#b#");
    }

    #[test]
    fn test_bad_pattern_is_descriptive() {
        let re = RegexTools;
        let err = re.find_all("(unclosed", "text").unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }
}
