//! Project settings extraction.
//!
//! Reads one `.vcxproj` into the project model: target kind, one
//! [`RawConfig`] per configuration/platform pair, the compiled source and
//! resource lists, the custom build steps and the declared project
//! references.  Extraction never touches the text; the ranges of elements
//! that the hook rewriter must delete are returned instead.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::condition::{self, Condition};
use crate::error::{Error, Result};
use crate::project::{ConfigKey, CustomBuildRule, Project, RawConfig, TargetKind};
use crate::scanner::{self, Element};
use crate::vars::{VariableTable, split_list};

/// Per-configuration blocks of an `<ItemDefinitionGroup>`.
pub const COMPILE_BLOCK: &str = "ClCompile";
pub const STATIC_LIB_BLOCK: &str = "Lib";
pub const LINK_BLOCK: &str = "Link";

static CONFIGURATION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<ConfigurationType>\s*(\w+)\s*</ConfigurationType>")
        .expect("invalid configuration type regex")
});

/// Path fragments that mark generator bookkeeping.
const GENERATOR_DIR: &str = "CMakeFiles";
const GENERATOR_SCRIPT: &str = "CMakeLists.txt";
const STAMP_EXTENSIONS: [&str; 2] = [".stamp", ".depend"];
const RULE_EXTENSION: &str = ".rule";

// ═══════════════════════════════════════════════════════════════════════════════
//  Supplementary inputs
// ═══════════════════════════════════════════════════════════════════════════════

/// Inputs to use for custom build steps whose declared inputs are empty,
/// keyed by target name, optionally qualified by configuration
/// (`Target|Release`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultInputs {
    map: HashMap<String, Vec<String>>,
}

impl DefaultInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>, inputs: Vec<String>) {
        self.map.insert(target.into(), inputs);
    }

    /// Parse a `target=input1,input2` assignment.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<()> {
        let (target, inputs) = assignment
            .split_once('=')
            .filter(|(t, _)| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Workspace(format!(
                    "invalid dependency assignment '{assignment}', expected target=input1,input2"
                ))
            })?;
        self.insert(target.trim(), split_list(inputs, ','));
        Ok(())
    }

    /// Configuration-qualified entry first, then the plain target entry.
    pub fn lookup(&self, target: &str, configuration: &str) -> &[String] {
        self.map
            .get(&format!("{target}|{configuration}"))
            .or_else(|| self.map.get(target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Entry point
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte ranges of the project text that the hook rewriter removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removals {
    pub custom_build: Vec<Range<usize>>,
    pub project_references: Vec<Range<usize>>,
}

impl Removals {
    pub fn all(&self) -> Vec<Range<usize>> {
        self.custom_build.iter().chain(&self.project_references).cloned().collect()
    }
}

/// Fill `project` from its markup.
///
/// `items` is the document holding the `ClCompile` / `ResourceCompile`
/// items (the `.filters` companion when present, else `text` itself).
/// A project without a `<ConfigurationType>` is left as
/// [`TargetKind::Unknown`] with no configurations; that is not an error.
pub fn extract(
    project: &mut Project,
    path: &Path,
    text: &str,
    items: &str,
    defaults: &DefaultInputs,
) -> Result<Removals> {
    project.kind = target_kind(text);
    if project.kind == TargetKind::Unknown {
        tracing::debug!("{}: no known configuration type, skipped", project.name);
        return Ok(Removals::default());
    }

    let malformed = |message: String| Error::malformed(path, message);

    let keys = configuration_keys(text, path)?;
    let properties = conditioned(text, "PropertyGroup", path)?;
    let definitions = conditioned(text, "ItemDefinitionGroup", path)?;
    let custom_build: Vec<Element> = scanner::elements(text, "CustomBuild")
        .map_err(malformed)?
        .into_iter()
        .filter(|e| e.attribute("Include").is_some())
        .collect();
    let references = scanner::elements(text, "ProjectReference").map_err(malformed)?;

    let (sources, resources) = item_lists(items, path)?;
    project.sources = sources;
    project.resources = resources;

    for reference in &references {
        for leaf in scanner::leaves(reference.body(text)) {
            if leaf.name == "Project" {
                project.declare_dependency(&leaf.value);
            }
        }
    }

    for key in keys {
        let mut config = RawConfig::new(key);
        for (cond, element) in &properties {
            if applies(cond.as_ref(), &config.key) {
                project_leaves(element.body(text), &config.key, &mut config.project_variables)?;
            }
        }
        for (cond, element) in &definitions {
            if applies(cond.as_ref(), &config.key) {
                let body = element.body(text);
                config.cl_variables.merge_from(&scanner::block_variables(COMPILE_BLOCK, body));
                config.lib_variables.merge_from(&scanner::block_variables(STATIC_LIB_BLOCK, body));
                config.link_variables.merge_from(&scanner::block_variables(LINK_BLOCK, body));
            }
        }
        for element in &custom_build {
            let rule = custom_build_rule(element, text, &config.key, &project.name, defaults)?;
            match rule {
                Some(rule) => config.custom_build.push(rule),
                None => tracing::debug!(
                    "{} [{}]: custom build step {} produces no build node",
                    project.name,
                    config.key,
                    element.attribute("Include").unwrap_or_default()
                ),
            }
        }
        project.configs.push(config);
    }

    tracing::debug!(
        "{}: {:?}, {} configurations, {} sources, {} resources",
        project.name,
        project.kind,
        project.configs.len(),
        project.sources.len(),
        project.resources.len()
    );

    Ok(Removals {
        custom_build: custom_build.into_iter().map(|e| e.range).collect(),
        project_references: references.into_iter().map(|e| e.range).collect(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Configuration type and keys
// ═══════════════════════════════════════════════════════════════════════════════

/// The first `<ConfigurationType>` wins.
pub fn target_kind(text: &str) -> TargetKind {
    CONFIGURATION_TYPE
        .captures(text)
        .map(|c| TargetKind::from_configuration_type(&c[1]))
        .unwrap_or_default()
}

/// Configuration/platform pairs in document order: `<ProjectConfiguration>`
/// items first, then any pair only named by an `<ItemDefinitionGroup>`.
fn configuration_keys(text: &str, path: &Path) -> Result<Vec<ConfigKey>> {
    let malformed = |message: String| Error::malformed(path, message);
    let mut keys: Vec<ConfigKey> = Vec::new();

    for element in scanner::elements(text, "ProjectConfiguration").map_err(malformed)? {
        if let Some(key) = element.attribute("Include").as_deref().and_then(ConfigKey::parse) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    for element in scanner::elements(text, "ItemDefinitionGroup").map_err(malformed)? {
        let Some(raw) = element.attribute("Condition") else {
            continue;
        };
        if let Some(key) = condition::selector(&condition::parse_condition(&raw)?) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    Ok(keys)
}

/// Every `tag` element of `text` paired with its parsed `Condition`.
fn conditioned(text: &str, tag: &str, path: &Path) -> Result<Vec<(Option<Condition>, Element)>> {
    scanner::elements(text, tag)
        .map_err(|message| Error::malformed(path, message))?
        .into_iter()
        .map(|e| {
            let cond = e
                .attribute("Condition")
                .map(|raw| condition::parse_condition(&raw))
                .transpose()?;
            Ok((cond, e))
        })
        .collect()
}

/// Unconditioned blocks apply to every configuration.
fn applies(cond: Option<&Condition>, key: &ConfigKey) -> bool {
    cond.is_none_or(|c| condition::matches(c, key))
}

fn project_leaves(body: &str, key: &ConfigKey, table: &mut VariableTable) -> Result<()> {
    for leaf in scanner::leaves(body) {
        let cond = leaf.condition.as_deref().map(condition::parse_condition).transpose()?;
        if applies(cond.as_ref(), key) {
            table.insert(leaf.name, leaf.value);
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Item lists
// ═══════════════════════════════════════════════════════════════════════════════

/// `ClCompile` and `ResourceCompile` item includes, in document order.
pub fn item_lists(items: &str, path: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let items = items.strip_prefix('\u{feff}').unwrap_or(items);
    let doc = roxmltree::Document::parse(items)
        .map_err(|source| Error::Xml { path: path.to_path_buf(), source })?;

    let mut sources = Vec::new();
    let mut resources = Vec::new();

    for node in doc.descendants().filter(|n| n.is_element()) {
        let in_item_group = node
            .parent_element()
            .is_some_and(|p| p.tag_name().name() == "ItemGroup");
        let Some(include) = node.attribute("Include").filter(|_| in_item_group) else {
            continue;
        };
        let list = match node.tag_name().name() {
            "ClCompile" => &mut sources,
            "ResourceCompile" => &mut resources,
            _ => continue,
        };
        let include = include.trim().to_string();
        if !include.is_empty() && !list.contains(&include) {
            list.push(include);
        }
    }

    Ok((sources, resources))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Custom build steps
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve one `<CustomBuild>` element for `key`.  `None` when the step has
/// no output or no inputs once filtered.
fn custom_build_rule(
    element: &Element,
    text: &str,
    key: &ConfigKey,
    target: &str,
    defaults: &DefaultInputs,
) -> Result<Option<CustomBuildRule>> {
    let mut params: HashMap<String, String> = HashMap::new();
    for leaf in scanner::leaves(element.body(text)) {
        if !matches!(leaf.name.as_str(), "Message" | "Outputs" | "AdditionalInputs" | "Command") {
            continue;
        }
        let cond = leaf.condition.as_deref().map(condition::parse_condition).transpose()?;
        if applies(cond.as_ref(), key) {
            params.insert(leaf.name, leaf.value);
        }
    }
    let param = |name: &str| params.get(name).map(String::as_str).unwrap_or("");

    let mut outputs = split_list(param("Outputs"), ';')
        .into_iter()
        .filter(|o| !is_stamp(o))
        .map(|o| unique_per_configuration(o, &key.configuration));
    let Some(output) = outputs.next() else {
        return Ok(None);
    };
    let additional_outputs: Vec<String> = outputs.collect();

    let mut declared = element.attribute("Include").into_iter().collect::<Vec<_>>();
    declared.extend(split_list(param("AdditionalInputs"), ';'));
    let mut inputs = filter_inputs(declared);
    if inputs.is_empty() {
        inputs = defaults.lookup(target, &key.configuration).to_vec();
    }
    if inputs.is_empty() {
        return Ok(None);
    }

    Ok(Some(CustomBuildRule {
        message: param("Message").trim().to_string(),
        inputs,
        output,
        additional_outputs,
        command: filter_command(param("Command")),
    }))
}

fn is_stamp(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    STAMP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Outputs under the generator's own directory are suffixed with the
/// configuration so the same nominal path stays a distinct node per
/// configuration.
fn unique_per_configuration(output: String, configuration: &str) -> String {
    if output.contains(GENERATOR_DIR) {
        format!("{output}_{configuration}")
    } else {
        output
    }
}

/// Drop generator marker files; a step fed by the generator script itself is
/// a regeneration step and has no usable declared inputs.
fn filter_inputs(declared: Vec<String>) -> Vec<String> {
    if declared.iter().any(|i| i.contains(GENERATOR_SCRIPT)) {
        return Vec::new();
    }
    let mut inputs: Vec<String> = Vec::new();
    for input in declared {
        if input.to_ascii_lowercase().ends_with(RULE_EXTENSION) || inputs.contains(&input) {
            continue;
        }
        inputs.push(input);
    }
    inputs
}

/// Keep only the lines of a batch script that invoke something, joined with
/// `&&`.
pub fn filter_command(script: &str) -> String {
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_control_flow(line))
        .collect::<Vec<_>>()
        .join(" && ")
}

fn is_control_flow(line: &str) -> bool {
    let lower = line.trim_start_matches('@').to_ascii_lowercase();
    let word = lower.split_whitespace().next().unwrap_or("");
    let is_drive_change = lower.len() == 2 && lower.ends_with(':') && lower.as_bytes()[0].is_ascii_alphabetic();

    lower.starts_with(':')
        || is_drive_change
        || matches!(
            word,
            "if" | "cd" | "chdir" | "pushd" | "popd" | "exit" | "goto" | "setlocal" | "endlocal" | "rem"
        )
        || word.starts_with("cd/")
        || word.starts_with("cd\\")
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
