//! Flat string-keyed property table with typed accessors.
//!
//! Every block of a `.vcxproj` (`<ClCompile>`, `<Link>`, the project level
//! scalars, ...) ends up as one [`VariableTable`].  The raw values keep their
//! MSBuild spelling; the accessors decide how to read them.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// `%(Name)` / `$(Name)` – a value inherited from a property sheet we do not
/// traverse.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[%$]\(\w+\)").expect("invalid placeholder regex"));

/// Symbol → flag lookup table used by [`VariableTable::mapped`].
pub type FlagTable = [(&'static str, &'static str)];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    variables: HashMap<String, String>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`; the last write wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Copy every entry of `other` over the entries of `self`.
    pub fn merge_from(&mut self, other: &Self) {
        for (k, v) in &other.variables {
            self.variables.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Raw value, or `""` when absent.
    pub fn string(&self, key: &str) -> &str {
        self.variables.get(key).map(String::as_str).unwrap_or("")
    }

    /// Raw value with every `%(Name)` / `$(Name)` placeholder replaced by a
    /// space and the ends trimmed.  Inner whitespace is kept as written.
    pub fn filtered_string(&self, key: &str) -> String {
        PLACEHOLDER.replace_all(self.string(key), " ").trim().to_string()
    }

    /// `;`-separated list value.  See [`split_list`].
    pub fn list(&self, key: &str) -> Vec<String> {
        split_list(self.string(key), ';')
    }

    /// Look the raw value up in `table`.  Unknown values map to `""`.
    pub fn mapped(&self, key: &str, table: &FlagTable) -> &'static str {
        let raw = self.string(key);
        table
            .iter()
            .find(|(symbol, _)| *symbol == raw)
            .map(|(_, flag)| *flag)
            .unwrap_or("")
    }

    /// `true` iff the raw value is literally `true`; `default` when absent.
    pub fn bool(&self, key: &str, default: bool) -> bool {
        match self.variables.get(key) {
            None => default,
            Some(v) if v.is_empty() => default,
            Some(v) => v == "true",
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Split `value` on `sep`, trimming every token and dropping empty tokens as
/// well as tokens that start with a `%` or `$` placeholder marker.
pub fn split_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(str::trim)
        .filter(|item| !item.is_empty() && !item.starts_with(['%', '$']))
        .map(String::from)
        .collect()
}

/// Expand `$(Var)` references in a raw string value using the given variable
/// map.  Unknown variables expand to the empty string.
pub fn expand_properties(s: &str, vars: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'(') {
            chars.next(); // consume '('
            let var_name: String = chars.by_ref().take_while(|&ch| ch != ')').collect();
            if let Some(val) = vars.get(&var_name) {
                result.push_str(val);
            }
        } else {
            result.push(c);
        }
    }

    result
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> VariableTable {
        let mut t = VariableTable::new();
        for (k, v) in pairs {
            t.insert(*k, *v);
        }
        t
    }

    #[test]
    fn string_missing_is_empty() {
        let t = VariableTable::new();
        assert_eq!(t.string("Optimization"), "");
    }

    #[test]
    fn last_write_wins() {
        let mut t = table(&[("WarningLevel", "Level1")]);
        t.insert("WarningLevel", "Level3");
        assert_eq!(t.string("WarningLevel"), "Level3");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn filtered_string_strips_placeholders() {
        let t = table(&[("AdditionalOptions", "/bigobj %(AdditionalOptions) /Zm200 $(ExtraOpts)")]);
        assert_eq!(t.filtered_string("AdditionalOptions"), "/bigobj   /Zm200");
    }

    #[test]
    fn filtered_string_keeps_quoted_spacing() {
        let t = table(&[("AdditionalOptions", " /DX=\"a  b\" %(AdditionalOptions)")]);
        assert_eq!(t.filtered_string("AdditionalOptions"), "/DX=\"a  b\"");
    }

    #[test]
    fn filtered_string_placeholder_only_is_empty() {
        let t = table(&[("AdditionalOptions", "%(AdditionalOptions)")]);
        assert_eq!(t.filtered_string("AdditionalOptions"), "");
    }

    #[test]
    fn list_drops_empty_and_placeholder_tokens() {
        let t = table(&[(
            "PreprocessorDefinitions",
            "WIN32; _WINDOWS;;NDEBUG;%(PreprocessorDefinitions);$(Inherited)",
        )]);
        assert_eq!(
            t.list("PreprocessorDefinitions"),
            vec!["WIN32", "_WINDOWS", "NDEBUG"]
        );
    }

    #[test]
    fn mapped_unknown_symbol_is_empty() {
        const TABLE: &FlagTable = &[("MaxSpeed", "/O2")];
        let t = table(&[("Optimization", "Custom")]);
        assert_eq!(t.mapped("Optimization", TABLE), "");
        assert_eq!(t.mapped("Missing", TABLE), "");

        let t = table(&[("Optimization", "MaxSpeed")]);
        assert_eq!(t.mapped("Optimization", TABLE), "/O2");
    }

    #[test]
    fn bool_semantics() {
        let t = table(&[("A", "true"), ("B", "false"), ("C", "TRUE"), ("D", "")]);
        assert!(t.bool("A", false));
        assert!(!t.bool("B", true));
        assert!(!t.bool("C", true));
        assert!(t.bool("D", true));
        assert!(t.bool("Missing", true));
        assert!(!t.bool("Missing", false));
    }

    #[test]
    fn merge_overrides_values() {
        let mut base = table(&[("A", "1"), ("B", "2")]);
        base.merge_from(&table(&[("B", "3"), ("C", "4")]));
        assert_eq!(base.string("A"), "1");
        assert_eq!(base.string("B"), "3");
        assert_eq!(base.string("C"), "4");
    }

    #[test]
    fn expand_properties_works() {
        let vars: HashMap<String, String> = [
            ("Configuration".to_string(), "Release".to_string()),
            ("Platform".to_string(), "x64".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            expand_properties("$(Platform)\\$(Configuration)\\$(Unknown)", &vars),
            "x64\\Release\\"
        );
        assert_eq!(expand_properties("no vars", &vars), "no vars");
    }
}
