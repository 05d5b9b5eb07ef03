//! Span-bounded scanning of project markup.
//!
//! This is not an XML parser.  It locates an element's opening marker, the
//! next matching closing marker, and restricts every inner search to the
//! text in between.  That is enough for the fixed schema of `.vcxproj`
//! files and keeps blocks of different configurations apart even though they
//! share tag names.
//!
//! Scanning never mutates the text: callers collect [`Range`]s and hand them
//! to [`apply_removals`] once scanning is over.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::vars::VariableTable;

/// `<Key attr="..">Value</Key>` with no nested markup in the value.
static LEAF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([\w.]+)((?:\s+[\w:.]+\s*=\s*"[^"]*")*)\s*>([^<]*)</([\w.]+)\s*>"#)
        .expect("invalid leaf regex")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w:.]+)\s*=\s*"([^"]*)""#).expect("invalid attribute regex")
});

/// One element located by [`elements`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Whole element, opening marker to end of closing marker.
    pub range: Range<usize>,
    /// Raw attribute text of the opening marker.
    pub attributes: String,
    /// Text between the opening and the closing marker.
    pub body: Range<usize>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<String> {
        attribute(&self.attributes, name)
    }

    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body.clone()]
    }
}

/// A `<Key>Value</Key>` pair, with its optional `Condition` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub name: String,
    pub condition: Option<String>,
    pub value: String,
}

/// Every `<tag ...>...</tag>` (or self-closing `<tag ... />`) in `text`, in
/// document order.  Fails when an opening marker has no closing marker.
pub fn elements(text: &str, tag: &str) -> Result<Vec<Element>, String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(rel) = text[from..].find(&open) {
        let start = from + rel;
        let name_end = start + open.len();
        let boundary = text[name_end..].chars().next();
        if !matches!(boundary, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
            from = name_end;
            continue;
        }

        let open_end = text[name_end..]
            .find('>')
            .map(|p| name_end + p)
            .ok_or_else(|| format!("unterminated <{tag}> marker"))?;
        let raw_attrs = &text[name_end..open_end];

        if let Some(attrs) = raw_attrs.strip_suffix('/') {
            found.push(Element {
                range: start..open_end + 1,
                attributes: attrs.trim().to_string(),
                body: open_end + 1..open_end + 1,
            });
            from = open_end + 1;
            continue;
        }

        let body_start = open_end + 1;
        let body_end = text[body_start..]
            .find(&close)
            .map(|p| body_start + p)
            .ok_or_else(|| format!("missing {close}"))?;
        found.push(Element {
            range: start..body_end + close.len(),
            attributes: raw_attrs.trim().to_string(),
            body: body_start..body_end,
        });
        from = body_end + close.len();
    }

    Ok(found)
}

/// Value of attribute `name` in raw attribute text, entity-decoded.
pub fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE
        .captures_iter(attrs)
        .find(|c| &c[1] == name)
        .map(|c| unescape_xml(&c[2]))
}

/// Every leaf pair in `text`, in document order.  Values are entity-decoded
/// and trimmed.
pub fn leaves(text: &str) -> Vec<Leaf> {
    LEAF.captures_iter(text)
        .filter(|c| c[1] == c[4])
        .map(|c| Leaf {
            name: c[1].to_string(),
            condition: attribute(&c[2], "Condition"),
            value: unescape_xml(c[3].trim()),
        })
        .collect()
}

/// Leaf pairs of the first `<block>` ... `</block>` span of `text`.  A missing
/// block yields an empty table.
pub fn block_variables(block: &str, text: &str) -> VariableTable {
    let mut table = VariableTable::new();
    let open = format!("<{block}>");
    let close = format!("</{block}>");
    let Some(start) = text.find(&open) else {
        return table;
    };
    let inner = start + open.len();
    let Some(end) = text[inner..].find(&close).map(|p| inner + p) else {
        return table;
    };
    for leaf in leaves(&text[inner..end]) {
        table.insert(leaf.name, leaf.value);
    }
    table
}

/// Decode the predefined XML entities and numeric character references.
pub fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Inverse of [`unescape_xml`] for text content.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Remove every range from `text`, highest offset first.  Ranges overlapping
/// an already removed one are skipped.
pub fn apply_removals(text: &mut String, mut ranges: Vec<Range<usize>>) {
    ranges.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
    let mut floor = usize::MAX;
    for range in ranges {
        if range.end > floor || range.end > text.len() {
            continue;
        }
        floor = range.start;
        text.replace_range(range, "");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_are_span_bounded() {
        let text = r#"<ItemDefinitionGroup Condition="a"><ClCompile><Optimization>Disabled</Optimization></ClCompile></ItemDefinitionGroup>
<ItemDefinitionGroup Condition="b"><ClCompile><Optimization>MaxSpeed</Optimization></ClCompile></ItemDefinitionGroup>"#;
        let found = elements(text, "ItemDefinitionGroup").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].attribute("Condition").as_deref(), Some("a"));
        assert_eq!(
            block_variables("ClCompile", found[0].body(text)).string("Optimization"),
            "Disabled"
        );
        assert_eq!(
            block_variables("ClCompile", found[1].body(text)).string("Optimization"),
            "MaxSpeed"
        );
    }

    #[test]
    fn elements_ignore_longer_tag_names() {
        let text = "<ClCompileX>1</ClCompileX><ClCompile Include=\"a.cpp\" />";
        let found = elements(text, "ClCompile").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attribute("Include").as_deref(), Some("a.cpp"));
        assert!(found[0].body.is_empty());
        assert_eq!(&text[found[0].range.clone()], "<ClCompile Include=\"a.cpp\" />");
    }

    #[test]
    fn unterminated_element_is_error() {
        assert!(elements("<CustomBuild Include=\"x\">", "CustomBuild").is_err());
    }

    #[test]
    fn leaves_with_conditions() {
        let text = r#"<OutDir Condition="'$(Configuration)|$(Platform)'=='Debug|x64'">out\</OutDir>
<TargetName>core</TargetName><Broken>x</Other>"#;
        let found = leaves(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "OutDir");
        assert_eq!(
            found[0].condition.as_deref(),
            Some("'$(Configuration)|$(Platform)'=='Debug|x64'")
        );
        assert_eq!(found[1].condition, None);
        assert_eq!(found[1].value, "core");
    }

    #[test]
    fn missing_block_is_empty_table() {
        assert!(block_variables("Lib", "<Link><SubSystem>Console</SubSystem></Link>").is_empty());
    }

    #[test]
    fn unescape_entities() {
        assert_eq!(unescape_xml("a &amp;&amp; b"), "a && b");
        assert_eq!(unescape_xml("&lt;x&gt; &quot;y&quot; &apos;"), "<x> \"y\" '");
        assert_eq!(unescape_xml("line1&#xD;&#xA;line2&#10;"), "line1\r\nline2\n");
        assert_eq!(unescape_xml("100% & more"), "100% & more");
        assert_eq!(unescape_xml("&bogus;"), "&bogus;");
    }

    #[test]
    fn escape_then_unescape() {
        let s = "\"ninja\" -t clean && \"ninja\" <all>";
        assert_eq!(unescape_xml(&escape_xml(s)), s);
    }

    #[test]
    fn removals_apply_in_descending_order() {
        let mut text = String::from("keep<A>x</A>keep<B/>keep");
        let a = text.find("<A>").unwrap()..text.find("</A>").unwrap() + 4;
        let b = text.find("<B/>").unwrap()..text.find("<B/>").unwrap() + 4;
        apply_removals(&mut text, vec![a, b]);
        assert_eq!(text, "keepkeepkeep");
    }

    #[test]
    fn overlapping_removals_are_skipped() {
        let mut text = String::from("0123456789");
        apply_removals(&mut text, vec![2..6, 4..8]);
        assert_eq!(text, "012389");
    }
}
