//! Project model shared by the extraction, transformation and emission
//! stages.
//!
//! A [`Project`] is created from a solution entry, filled in by
//! [`crate::extract`], then by [`crate::transform`], and finally read by the
//! emitter.  Nothing is removed once added.

use std::fmt;

use crate::vars::VariableTable;

// ─── ConfigKey ───────────────────────────────────────────────────────────────

/// A `(Configuration, Platform)` pair, e.g. `Debug|x64`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    pub configuration: String,
    pub platform: String,
}

impl ConfigKey {
    pub fn new(configuration: impl Into<String>, platform: impl Into<String>) -> Self {
        Self { configuration: configuration.into(), platform: platform.into() }
    }

    /// Parse the `Debug|Win32` form used by `<ProjectConfiguration Include>`.
    pub fn parse(value: &str) -> Option<Self> {
        let (configuration, platform) = value.split_once('|')?;
        if configuration.is_empty() {
            return None;
        }
        Some(Self::new(configuration.trim(), platform.trim()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.configuration, self.platform)
    }
}

// ─── TargetKind ──────────────────────────────────────────────────────────────

/// What a project builds, from `<ConfigurationType>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetKind {
    StaticLibrary,
    DynamicLibrary,
    Application,
    /// `Utility`: custom steps only, no compiled artifact.
    Utility,
    /// Absent or unrecognised configuration type; contributes nothing.
    #[default]
    Unknown,
}

impl TargetKind {
    pub fn from_configuration_type(value: &str) -> Self {
        match value {
            "StaticLibrary" => Self::StaticLibrary,
            "DynamicLibrary" => Self::DynamicLibrary,
            "Application" => Self::Application,
            "Utility" => Self::Utility,
            _ => Self::Unknown,
        }
    }

    /// Main artifact extension when `<TargetExt>` is not set.
    pub fn default_extension(self) -> &'static str {
        match self {
            Self::StaticLibrary => ".lib",
            Self::DynamicLibrary => ".dll",
            Self::Application => ".exe",
            Self::Utility | Self::Unknown => "",
        }
    }
}

// ─── CustomBuildRule ─────────────────────────────────────────────────────────

/// One `<CustomBuild>` step, resolved for a single configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomBuildRule {
    pub message: String,
    pub inputs: Vec<String>,
    pub output: String,
    pub additional_outputs: Vec<String>,
    /// Empty for a pure grouping step.
    pub command: String,
}

impl CustomBuildRule {
    /// Primary output followed by the additional ones.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.output.as_str()).chain(self.additional_outputs.iter().map(String::as_str))
    }
}

// ─── RawConfig ───────────────────────────────────────────────────────────────

/// Settings of one configuration/platform pair, as found in the markup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawConfig {
    pub key: ConfigKey,
    pub project_variables: VariableTable,
    pub cl_variables: VariableTable,
    pub lib_variables: VariableTable,
    pub link_variables: VariableTable,
    pub custom_build: Vec<CustomBuildRule>,
}

impl RawConfig {
    pub fn new(key: ConfigKey) -> Self {
        Self { key, ..Default::default() }
    }
}

// ─── ParsedConfig ────────────────────────────────────────────────────────────

/// Emission-ready configuration.  Directories always end with `/`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedConfig {
    pub name: String,
    pub platform: String,
    pub target_name: String,
    pub output_dir: String,
    pub intermediate_dir: String,
    pub target_ext: String,
    pub import_ext: String,
    pub includes: Vec<String>,
    pub defines: Vec<String>,
    pub flags: Vec<String>,
    pub link: Vec<String>,
    pub link_flags: Vec<String>,
    pub custom_build: Vec<CustomBuildRule>,
}

impl ParsedConfig {
    pub fn output_path(&self) -> String {
        format!("{}{}{}", self.output_dir, self.target_name, self.target_ext)
    }

    /// Only meaningful for dynamic libraries; empty otherwise.
    pub fn import_path(&self) -> String {
        if self.import_ext.is_empty() {
            return String::new();
        }
        format!("{}{}{}", self.intermediate_dir, self.target_name, self.import_ext)
    }

    pub fn pdb_path(&self) -> String {
        format!("{}{}.pdb", self.output_dir, self.target_name)
    }
}

// ─── Project ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Project {
    /// Normalised (upper-case, brace-less) GUID.
    pub id: String,
    pub name: String,
    /// Path of the `.vcxproj`, relative to the workspace root.
    pub file: String,
    pub kind: TargetKind,
    pub sources: Vec<String>,
    pub resources: Vec<String>,
    pub configs: Vec<RawConfig>,
    pub parsed_configs: Vec<ParsedConfig>,
    /// Declared dependency identifiers, unresolved, without duplicates.
    pub dependency_ids: Vec<String>,
}

impl Project {
    pub fn new(id: &str, name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            id: normalize_id(id),
            name: name.into(),
            file: file.into(),
            ..Default::default()
        }
    }

    /// Add a declared dependency identifier unless already present.
    pub fn declare_dependency(&mut self, id: &str) {
        let id = normalize_id(id);
        if !id.is_empty() && !self.dependency_ids.contains(&id) {
            self.dependency_ids.push(id);
        }
    }

    /// Whether the project compiles anything a dependent could link against.
    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn parsed_config(&self, name: &str) -> Option<&ParsedConfig> {
        self.parsed_configs.iter().find(|pc| pc.name == name)
    }
}

/// `{a1b2-...}` → `A1B2-...`
pub fn normalize_id(id: &str) -> String {
    id.trim().trim_start_matches('{').trim_end_matches('}').to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_key_parse() {
        assert_eq!(ConfigKey::parse("Debug|Win32"), Some(ConfigKey::new("Debug", "Win32")));
        assert_eq!(ConfigKey::parse("Debug"), None);
        assert_eq!(ConfigKey::parse("|x64"), None);
        assert_eq!(ConfigKey::new("Release", "x64").to_string(), "Release|x64");
    }

    #[test]
    fn raw_config_starts_empty() {
        let raw = RawConfig::new(ConfigKey::new("Debug", "x64"));
        assert_eq!(raw.key.to_string(), "Debug|x64");
        assert!(raw.project_variables.is_empty());
        assert!(raw.custom_build.is_empty());
        assert_eq!(ConfigKey::default(), ConfigKey::new("", ""));
    }

    #[test]
    fn configuration_types() {
        assert_eq!(TargetKind::from_configuration_type("StaticLibrary"), TargetKind::StaticLibrary);
        assert_eq!(TargetKind::from_configuration_type("DynamicLibrary"), TargetKind::DynamicLibrary);
        assert_eq!(TargetKind::from_configuration_type("Application"), TargetKind::Application);
        assert_eq!(TargetKind::from_configuration_type("Utility"), TargetKind::Utility);
        assert_eq!(TargetKind::from_configuration_type("Makefile"), TargetKind::Unknown);
        assert_eq!(TargetKind::from_configuration_type(""), TargetKind::Unknown);
    }

    #[test]
    fn derived_paths() {
        let pc = ParsedConfig {
            target_name: "core".into(),
            output_dir: "Release/".into(),
            intermediate_dir: "core.dir/Release/".into(),
            target_ext: ".dll".into(),
            import_ext: ".lib".into(),
            ..Default::default()
        };
        assert_eq!(pc.output_path(), "Release/core.dll");
        assert_eq!(pc.import_path(), "core.dir/Release/core.lib");
        assert_eq!(pc.pdb_path(), "Release/core.pdb");

        let exe = ParsedConfig { import_ext: String::new(), ..pc };
        assert_eq!(exe.import_path(), "");
    }

    #[test]
    fn dependency_ids_are_normalized_and_unique() {
        let mut p = Project::new("{abc-1}", "A", "A.vcxproj");
        assert_eq!(p.id, "ABC-1");
        p.declare_dependency("{def-2}");
        p.declare_dependency("DEF-2");
        p.declare_dependency("");
        assert_eq!(p.dependency_ids, vec!["DEF-2"]);
    }
}
