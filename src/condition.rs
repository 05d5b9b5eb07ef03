//! MSBuild condition parser and evaluator.
//!
//! `.vcxproj` files scope almost everything with a condition on the
//! configuration/platform pair:
//!
//! - `'$(Configuration)|$(Platform)'=='Debug|Win32'`
//! - `'$(Configuration)'=='Release' and '$(Platform)'=='x64'`
//! - `Exists('$(VCTargetsPath)\Microsoft.Cpp.Default.props')`
//!
//! Uses [`chumsky`] for the parsing grammar.
//!
//! ## Grammar (case-insensitive keywords)
//!
//! ```text
//! expr       = or_expr
//! or_expr    = and_expr ('or' and_expr)*
//! and_expr   = atom ('and' atom)*
//! atom       = comparison | exists | '(' expr ')'
//! comparison = quoted ('==' | '!=') quoted
//! exists     = 'Exists' '(' quoted ')'
//! quoted     = "'" chars "'"
//! ```

use std::collections::HashMap;

use chumsky::prelude::*;

use crate::error::{Error, Result};
use crate::project::ConfigKey;

// ═══════════════════════════════════════════════════════════════════════════════
//  AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `'lhs' == 'rhs'` or `'lhs' != 'rhs'`.
    Compare {
        lhs: Vec<Operand>,
        op: CompareOp,
        rhs: Vec<Operand>,
    },
    /// `Exists('path')`; no filesystem check is made, always `true`.
    Exists(Vec<Operand>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

/// A fragment of a quoted string: literal text or a `$(Property)` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(String),
    Property(String),
}

/// Split the raw text between single quotes into [`Operand`] fragments.
fn split_operands(s: &str) -> Vec<Operand> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'(') {
            if !literal.is_empty() {
                parts.push(Operand::Literal(std::mem::take(&mut literal)));
            }
            chars.next(); // consume '('
            let name: String = chars.by_ref().take_while(|&ch| ch != ')').collect();
            parts.push(Operand::Property(name));
        } else {
            literal.push(c);
        }
    }

    if !literal.is_empty() {
        parts.push(Operand::Literal(literal));
    }

    parts
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parser
// ═══════════════════════════════════════════════════════════════════════════════

fn condition_parser<'a>() -> impl Parser<'a, &'a str, Condition, extra::Err<Simple<'a, char>>> {
    recursive(|expr| {
        let quoted = just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\''))
            .map(split_operands);

        let cmp_op = just("==")
            .to(CompareOp::Equal)
            .or(just("!=").to(CompareOp::NotEqual));

        let comparison = quoted
            .padded()
            .then(cmp_op.padded())
            .then(quoted.padded())
            .map(|((lhs, op), rhs)| Condition::Compare { lhs, op, rhs });

        let word = any()
            .filter(|c: &char| c.is_ascii_alphabetic())
            .repeated()
            .at_least(1)
            .to_slice();

        let exists = word
            .filter(|s: &&str| s.eq_ignore_ascii_case("exists"))
            .ignore_then(just('(').padded())
            .ignore_then(quoted)
            .then_ignore(just(')').padded())
            .map(Condition::Exists);

        let grouped = expr.delimited_by(just('(').padded(), just(')').padded());

        let atom = choice((comparison, exists, grouped)).padded();

        let and_kw = word
            .filter(|s: &&str| s.eq_ignore_ascii_case("and"))
            .padded();

        let and_expr = atom.clone().foldl(
            and_kw.ignore_then(atom).repeated(),
            |lhs, rhs| Condition::And(Box::new(lhs), Box::new(rhs)),
        );

        let or_kw = word
            .filter(|s: &&str| s.eq_ignore_ascii_case("or"))
            .padded();

        and_expr.clone().foldl(
            or_kw.ignore_then(and_expr).repeated(),
            |lhs, rhs| Condition::Or(Box::new(lhs), Box::new(rhs)),
        )
    })
}

/// Parse a `Condition` attribute value.
pub fn parse_condition(input: &str) -> Result<Condition> {
    condition_parser()
        .parse(input)
        .into_result()
        .map_err(|errs| {
            let messages: Vec<String> = errs.iter().map(|e| format!("{e}")).collect();
            Error::Condition(format!(
                "Failed to parse condition '{}': {}",
                input,
                messages.join("; ")
            ))
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

fn expand(parts: &[Operand], vars: &HashMap<String, String>) -> String {
    parts
        .iter()
        .map(|part| match part {
            Operand::Literal(s) => s.as_str(),
            Operand::Property(name) => vars.get(name).map(String::as_str).unwrap_or(""),
        })
        .collect()
}

/// Evaluate `cond` against a set of property bindings.  Unknown properties
/// expand to the empty string.
pub fn evaluate(cond: &Condition, vars: &HashMap<String, String>) -> bool {
    match cond {
        Condition::Compare { lhs, op, rhs } => {
            let l = expand(lhs, vars);
            let r = expand(rhs, vars);
            match op {
                CompareOp::Equal => l.eq_ignore_ascii_case(&r),
                CompareOp::NotEqual => !l.eq_ignore_ascii_case(&r),
            }
        }
        Condition::Exists(_) => true,
        Condition::And(a, b) => evaluate(a, vars) && evaluate(b, vars),
        Condition::Or(a, b) => evaluate(a, vars) || evaluate(b, vars),
    }
}

/// `true` when `cond` holds for the given configuration/platform pair.
pub fn matches(cond: &Condition, key: &ConfigKey) -> bool {
    let vars = HashMap::from([
        ("Configuration".to_string(), key.configuration.clone()),
        ("Platform".to_string(), key.platform.clone()),
    ]);
    evaluate(cond, &vars)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Selector extraction
// ═══════════════════════════════════════════════════════════════════════════════

/// Match a template such as `$(Configuration)|$(Platform)` against literal
/// text such as `Debug|Win32`, recording every property binding.
fn bind_template(template: &[Operand], text: &str, out: &mut HashMap<String, String>) -> bool {
    let mut rest = text;
    let mut parts = template.iter().peekable();

    while let Some(part) = parts.next() {
        match part {
            Operand::Literal(lit) => match rest.strip_prefix(lit.as_str()) {
                Some(r) => rest = r,
                None => return false,
            },
            Operand::Property(name) => {
                let value = match parts.peek() {
                    Some(Operand::Literal(sep)) => match rest.find(sep.as_str()) {
                        Some(pos) => {
                            let v = &rest[..pos];
                            rest = &rest[pos..];
                            v
                        }
                        None => return false,
                    },
                    Some(Operand::Property(_)) => return false,
                    None => std::mem::take(&mut rest),
                };
                out.insert(name.clone(), value.to_string());
            }
        }
    }

    rest.is_empty()
}

fn literal_text(parts: &[Operand]) -> Option<String> {
    parts
        .iter()
        .map(|p| match p {
            Operand::Literal(s) => Some(s.as_str()),
            Operand::Property(_) => None,
        })
        .collect()
}

fn collect_bindings(cond: &Condition, out: &mut HashMap<String, String>) -> bool {
    match cond {
        Condition::Compare { lhs, op: CompareOp::Equal, rhs } => {
            if let Some(text) = literal_text(rhs) {
                bind_template(lhs, &text, out)
            } else if let Some(text) = literal_text(lhs) {
                bind_template(rhs, &text, out)
            } else {
                false
            }
        }
        Condition::And(a, b) => collect_bindings(a, out) && collect_bindings(b, out),
        _ => false,
    }
}

/// The configuration/platform pair a condition selects, if it is a plain
/// equality selector.  A selector naming only the configuration yields an
/// empty platform.
pub fn selector(cond: &Condition) -> Option<ConfigKey> {
    let mut bindings = HashMap::new();
    if !collect_bindings(cond, &mut bindings) {
        return None;
    }
    let configuration = bindings.remove("Configuration")?;
    let platform = bindings.remove("Platform").unwrap_or_default();
    Some(ConfigKey::new(configuration, platform))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    // ── Operand splitting ────────────────────────────────────────────────

    #[test]
    fn operands_mixed() {
        assert_eq!(
            split_operands("$(Configuration)|$(Platform)"),
            vec![
                Operand::Property("Configuration".into()),
                Operand::Literal("|".into()),
                Operand::Property("Platform".into()),
            ]
        );
    }

    #[test]
    fn operands_empty() {
        assert_eq!(split_operands(""), Vec::<Operand>::new());
    }

    // ── Parsing ──────────────────────────────────────────────────────────

    #[test]
    fn parse_config_platform_selector() {
        let cond = parse_condition("'$(Configuration)|$(Platform)'=='Debug|Win32'").unwrap();
        assert_eq!(
            cond,
            Condition::Compare {
                lhs: vec![
                    Operand::Property("Configuration".into()),
                    Operand::Literal("|".into()),
                    Operand::Property("Platform".into()),
                ],
                op: CompareOp::Equal,
                rhs: vec![Operand::Literal("Debug|Win32".into())],
            }
        );
    }

    #[test]
    fn parse_spaced_and_keywords() {
        let cond =
            parse_condition(" '$(Configuration)' == 'Release' And '$(Platform)' == 'x64' ").unwrap();
        assert!(matches!(cond, Condition::And(_, _)));
    }

    #[test]
    fn parse_grouped_or() {
        let cond = parse_condition(
            "('$(Configuration)'=='Debug' or '$(Configuration)'=='Release') and '$(Platform)'!=''",
        )
        .unwrap();
        match &cond {
            Condition::And(lhs, _) => assert!(matches!(lhs.as_ref(), Condition::Or(_, _))),
            other => panic!("expected And(Or(..), ..), got {other:?}"),
        }
    }

    #[test]
    fn parse_exists() {
        let cond = parse_condition("exists('$(VCTargetsPath)\\Microsoft.Cpp.props')").unwrap();
        assert!(matches!(cond, Condition::Exists(_)));
    }

    #[test]
    fn parse_garbage_is_error() {
        assert!(matches!(
            parse_condition("$(Configuration) ="),
            Err(Error::Condition(_))
        ));
    }

    // ── Evaluation ───────────────────────────────────────────────────────

    #[test]
    fn matches_pair() {
        let cond = parse_condition("'$(Configuration)|$(Platform)'=='Debug|x64'").unwrap();
        assert!(matches(&cond, &ConfigKey::new("Debug", "x64")));
        assert!(!matches(&cond, &ConfigKey::new("Release", "x64")));
        assert!(!matches(&cond, &ConfigKey::new("Debug", "Win32")));
    }

    #[test]
    fn matches_is_case_insensitive() {
        let cond = parse_condition("'$(Configuration)'=='release'").unwrap();
        assert!(matches(&cond, &ConfigKey::new("Release", "x64")));
    }

    #[test]
    fn evaluate_not_equal_empty() {
        let cond = parse_condition("'$(Base)'!=''").unwrap();
        assert!(!evaluate(&cond, &HashMap::new()));
        let vars = HashMap::from([("Base".to_string(), "true".to_string())]);
        assert!(evaluate(&cond, &vars));
    }

    // ── Selector extraction ──────────────────────────────────────────────

    #[test]
    fn selector_pair() {
        let cond = parse_condition("'$(Configuration)|$(Platform)'=='RelWithDebInfo|x64'").unwrap();
        assert_eq!(selector(&cond), Some(ConfigKey::new("RelWithDebInfo", "x64")));
    }

    #[test]
    fn selector_from_and() {
        let cond =
            parse_condition("'$(Configuration)'=='Debug' and '$(Platform)'=='Win32'").unwrap();
        assert_eq!(selector(&cond), Some(ConfigKey::new("Debug", "Win32")));
    }

    #[test]
    fn selector_configuration_only() {
        let cond = parse_condition("'$(Configuration)'=='Debug'").unwrap();
        assert_eq!(selector(&cond), Some(ConfigKey::new("Debug", "")));
    }

    #[test]
    fn selector_rejects_non_selectors() {
        for input in [
            "'$(Platform)'=='x64'",
            "'$(Configuration)'!='Debug'",
            "'$(Configuration)'=='Debug' or '$(Configuration)'=='Release'",
            "Exists('foo.props')",
        ] {
            let cond = parse_condition(input).unwrap();
            assert_eq!(selector(&cond), None, "{input}");
        }
    }
}
