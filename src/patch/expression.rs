//! Directive expressions: `$fn(args)` or a bare token
//!
//! A bare token `X` means `$id(X)`. Arguments are nested expressions,
//! `"quoted"` literals, or names looked up first as variables and then as
//! block states (`"true"` / `"false"`).
//!
//! Evaluation never fails: anything unknown or malformed yields `None`,
//! which callers treat as "leave the target unchanged".

/// Source of variable values and block states for evaluation
pub trait ValueResolver {
    /// Value of the effective variable with this name
    fn variable_value(&self, name: &str) -> Option<&str>;

    /// Configured enabled flag of the block with this name (`None` when unset or unknown)
    fn block_enabled(&self, name: &str) -> Option<bool>;
}

const FUNCTION_PREFIX: char = '$';

/// A parsed expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// `None` when the text looked like a call but was malformed
    function: Option<String>,
    arguments: Vec<String>,
}

impl Expression {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if !text.starts_with(FUNCTION_PREFIX) {
            return Self {
                function: Some("id".to_string()),
                arguments: vec![text.to_string()],
            };
        }

        match (text.find('('), text.rfind(')')) {
            (Some(open), Some(close)) if open < close => Self {
                function: Some(text[FUNCTION_PREFIX.len_utf8()..open].trim().to_string()),
                arguments: split_top_level(&text[open + 1..close], |c| c == ',')
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
            _ => Self {
                function: None,
                arguments: Vec::new(),
            },
        }
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Evaluate against `current`, the present value of the patched attribute or text
    pub fn evaluate(&self, current: &str, resolver: &dyn ValueResolver) -> Option<String> {
        let function = self.function.as_deref()?;
        let values = self
            .arguments
            .iter()
            .map(|argument| resolve_argument(argument, resolver))
            .collect::<Option<Vec<String>>>()?;

        match (function, values.as_slice()) {
            ("id", [value]) => Some(value.clone()),
            ("replace", [find, replacement]) => Some(replace(current, find, replacement)),
            ("replace-if", [condition, find, replacement]) if is_true(condition) => {
                Some(replace(current, find, replacement))
            }
            ("replace-if-not", [condition, find, replacement]) if !is_true(condition) => {
                Some(replace(current, find, replacement))
            }
            ("concat", values) => Some(values.concat()),
            ("equals", [left, right]) => Some(bool_str(left.to_lowercase() == right.to_lowercase())),
            ("not", [value]) => Some(bool_str(!is_true(value))),
            _ => None,
        }
    }
}

/// Parse and evaluate in one step
pub fn evaluate(expression: &str, current: &str, resolver: &dyn ValueResolver) -> Option<String> {
    Expression::parse(expression).evaluate(current, resolver)
}

/// Case-insensitive check for `"true"`
pub fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// Case-insensitive check for `"false"`
pub fn is_false(value: &str) -> bool {
    value.eq_ignore_ascii_case("false")
}

pub fn bool_str(value: bool) -> String {
    let text = if value { "true" } else { "false" };
    text.to_string()
}

fn resolve_argument(argument: &str, resolver: &dyn ValueResolver) -> Option<String> {
    if argument.starts_with(FUNCTION_PREFIX) {
        return Expression::parse(argument).evaluate("", resolver);
    }
    if argument.len() >= 2 && argument.starts_with('"') && argument.ends_with('"') {
        return Some(argument[1..argument.len() - 1].to_string());
    }
    resolver
        .variable_value(argument)
        .map(str::to_string)
        .or_else(|| resolver.block_enabled(argument).map(bool_str))
}

fn replace(current: &str, find: &str, replacement: &str) -> String {
    if find.is_empty() {
        current.to_string()
    } else {
        current.replace(find, replacement)
    }
}

/// Split on separators that are outside `"` literals and parentheses
///
/// Pieces are trimmed and empty pieces dropped.
pub(crate) fn split_top_level(text: &str, is_separator: impl Fn(char) -> bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_literal = false;
    let mut depth: i32 = 0;
    let mut start = 0;

    for (index, c) in text.char_indices() {
        match c {
            '"' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => depth -= 1,
            c if !in_literal && depth == 0 && is_separator(c) => {
                pieces.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapResolver {
        variables: HashMap<String, String>,
        blocks: HashMap<String, bool>,
    }

    impl MapResolver {
        fn var(mut self, name: &str, value: &str) -> Self {
            self.variables.insert(name.into(), value.into());
            self
        }

        fn block(mut self, name: &str, enabled: bool) -> Self {
            self.blocks.insert(name.into(), enabled);
            self
        }
    }

    impl ValueResolver for MapResolver {
        fn variable_value(&self, name: &str) -> Option<&str> {
            self.variables.get(name).map(String::as_str)
        }

        fn block_enabled(&self, name: &str) -> Option<bool> {
            self.blocks.get(name).copied()
        }
    }

    #[test]
    fn test_bare_token_is_identity() {
        let resolver = MapResolver::default().var("A", "X");
        assert_eq!(evaluate("A", "old", &resolver), Some("X".into()));
        assert_eq!(evaluate("Missing", "old", &resolver), None);
        assert_eq!(
            Expression::parse("A"),
            Expression {
                function: Some("id".into()),
                arguments: vec!["A".into()],
            }
        );
    }

    #[test]
    fn test_literals_and_nested_calls() {
        let resolver = MapResolver::default().var("HOST", "db01");
        assert_eq!(
            evaluate(r#"$concat("Server=", HOST, ";Port=", $concat("54", "32"))"#, "", &resolver),
            Some("Server=db01;Port=5432".into())
        );
    }

    #[test]
    fn test_quoted_commas_and_parens_do_not_split() {
        let resolver = MapResolver::default();
        assert_eq!(
            evaluate(r#"$concat("a,b", "(c)")"#, "", &resolver),
            Some("a,b(c)".into())
        );
    }

    #[test]
    fn test_concat_without_arguments_is_empty() {
        let resolver = MapResolver::default();
        assert_eq!(evaluate("$concat()", "x", &resolver), Some(String::new()));
    }

    #[test]
    fn test_equals_is_case_insensitive() {
        let resolver = MapResolver::default().var("DB", "Postgres");
        assert_eq!(evaluate(r#"$equals(DB, "postgres")"#, "", &resolver), Some("true".into()));
        assert_eq!(evaluate(r#"$equals(DB, "mssql")"#, "", &resolver), Some("false".into()));
        assert_eq!(evaluate("$equals(DB, DB)", "", &resolver), Some("true".into()));
    }

    #[test]
    fn test_not() {
        let resolver = MapResolver::default().block("ON", true).block("OFF", false);
        assert_eq!(evaluate("$not(ON)", "", &resolver), Some("false".into()));
        assert_eq!(evaluate("$not(OFF)", "", &resolver), Some("true".into()));
        assert_eq!(evaluate(r#"$not("TRUE")"#, "", &resolver), Some("false".into()));
        assert_eq!(evaluate(r#"$not("anything")"#, "", &resolver), Some("true".into()));
        assert_eq!(evaluate(r#"$not($equals("a", "A"))"#, "", &resolver), Some("false".into()));
    }

    #[test]
    fn test_replace_uses_current_value() {
        let resolver = MapResolver::default().var("ENV", "prod");
        assert_eq!(
            evaluate(r#"$replace("dev", ENV)"#, "server-dev-01", &resolver),
            Some("server-prod-01".into())
        );
        assert_eq!(
            evaluate(r#"$replace("", "x")"#, "unchanged", &resolver),
            Some("unchanged".into())
        );
    }

    #[test]
    fn test_replace_if_variants() {
        let resolver = MapResolver::default().var("SSL", "True");
        assert_eq!(
            evaluate(r#"$replace-if(SSL, "http:", "https:")"#, "http://host", &resolver),
            Some("https://host".into())
        );
        assert_eq!(
            evaluate(r#"$replace-if-not(SSL, "http:", "https:")"#, "http://host", &resolver),
            None
        );
        assert_eq!(
            evaluate(r#"$replace-if-not("no", "http:", "https:")"#, "http://host", &resolver),
            Some("https://host".into())
        );
    }

    #[test]
    fn test_variable_wins_over_block_state() {
        let resolver = MapResolver::default().var("B", "custom").block("B", true);
        assert_eq!(evaluate("B", "", &resolver), Some("custom".into()));

        let resolver = MapResolver::default().block("B", false);
        assert_eq!(evaluate("B", "", &resolver), Some("false".into()));
    }

    #[test]
    fn test_no_value_cases() {
        let resolver = MapResolver::default().var("A", "1");
        // unknown function
        assert_eq!(evaluate("$upper(A)", "", &resolver), None);
        // arity mismatch
        assert_eq!(evaluate("$equals(A)", "", &resolver), None);
        // unresolved argument
        assert_eq!(evaluate("$concat(A, Missing)", "", &resolver), None);
        // malformed call
        assert_eq!(evaluate("$concat(A", "", &resolver), None);
        assert_eq!(Expression::parse("$concat(A").function(), None);
    }

    #[test]
    fn test_split_top_level_on_whitespace() {
        assert_eq!(
            split_top_level("@a=A  @b=$concat(\"x y\", B)\n@=T", char::is_whitespace),
            vec!["@a=A", "@b=$concat(\"x y\", B)", "@=T"]
        );
    }
}
