//! Raw configuration → emission-ready [`ParsedConfig`].
//!
//! Symbolic MSBuild settings become `cl.exe` / `link.exe` flags through the
//! lookup tables below.  A symbol missing from its table simply produces no
//! flag.  All paths come out with `/` separators and, when they live under
//! the workspace root, relative to it.

use std::collections::HashMap;

use crate::project::{CustomBuildRule, ParsedConfig, Project, RawConfig, TargetKind};
use crate::vars::{FlagTable, VariableTable, expand_properties};

// ═══════════════════════════════════════════════════════════════════════════════
//  Flag tables
// ═══════════════════════════════════════════════════════════════════════════════

const RUNTIME_LIBRARY: &FlagTable = &[
    ("MultiThreaded", "/MT"),
    ("MultiThreadedDebug", "/MTd"),
    ("MultiThreadedDLL", "/MD"),
    ("MultiThreadedDebugDLL", "/MDd"),
];
const EXCEPTION_HANDLING: &FlagTable = &[("Sync", "/EHsc"), ("Async", "/EHa"), ("SyncCThrow", "/EHs")];
const OPTIMIZATION: &FlagTable = &[
    ("Disabled", "/Od"),
    ("MinSpace", "/O1"),
    ("MaxSpeed", "/O2"),
    ("Full", "/Ox"),
];
const DEBUG_INFORMATION_FORMAT: &FlagTable = &[
    ("ProgramDatabase", "/Zi"),
    ("EditAndContinue", "/ZI"),
    ("OldStyle", "/Z7"),
];
const BASIC_RUNTIME_CHECKS: &FlagTable = &[
    ("EnableFastChecks", "/RTC1"),
    ("StackFrameRuntimeCheck", "/RTCs"),
    ("UninitializedLocalUsageCheck", "/RTCu"),
];
const RUNTIME_TYPE_INFO: &FlagTable = &[("true", "/GR"), ("false", "/GR-")];
const WARNING_LEVEL: &FlagTable = &[
    ("TurnOffAllWarnings", "/W0"),
    ("Level1", "/W1"),
    ("Level2", "/W2"),
    ("Level3", "/W3"),
    ("Level4", "/W4"),
    ("EnableAllWarnings", "/Wall"),
];
const INLINE_FUNCTION_EXPANSION: &FlagTable = &[
    ("Disabled", "/Ob0"),
    ("OnlyExplicitInline", "/Ob1"),
    ("AnySuitable", "/Ob2"),
];
const COMPILE_AS: &FlagTable = &[("CompileAsC", "/TC"), ("CompileAsCpp", "/TP")];
const LANGUAGE_STANDARD: &FlagTable = &[
    ("stdcpp14", "/std:c++14"),
    ("stdcpp17", "/std:c++17"),
    ("stdcpp20", "/std:c++20"),
    ("stdcpplatest", "/std:c++latest"),
];

const GENERATE_DEBUG_INFORMATION: &FlagTable = &[
    ("true", "/debug"),
    ("DebugFull", "/debug:full"),
    ("DebugFastLink", "/debug:fastlink"),
];
const SUB_SYSTEM: &FlagTable = &[("Console", "/subsystem:console"), ("Windows", "/subsystem:windows")];
const SAFE_EXCEPTION_HANDLERS: &FlagTable = &[("true", "/SAFESEH"), ("false", "/SAFESEH:NO")];
const LARGE_ADDRESS_AWARE: &FlagTable = &[("true", "/LARGEADDRESSAWARE")];

/// `(block key, table)` pairs applied in order to the compile block.
const COMPILE_FLAGS: [(&str, &FlagTable); 10] = [
    ("RuntimeLibrary", RUNTIME_LIBRARY),
    ("ExceptionHandling", EXCEPTION_HANDLING),
    ("Optimization", OPTIMIZATION),
    ("DebugInformationFormat", DEBUG_INFORMATION_FORMAT),
    ("BasicRuntimeChecks", BASIC_RUNTIME_CHECKS),
    ("RuntimeTypeInfo", RUNTIME_TYPE_INFO),
    ("WarningLevel", WARNING_LEVEL),
    ("InlineFunctionExpansion", INLINE_FUNCTION_EXPANSION),
    ("CompileAs", COMPILE_AS),
    ("LanguageStandard", LANGUAGE_STANDARD),
];

const LINK_FLAGS: [(&str, &FlagTable); 4] = [
    ("GenerateDebugInformation", GENERATE_DEBUG_INFORMATION),
    ("SubSystem", SUB_SYSTEM),
    ("ImageHasSafeExceptionHandlers", SAFE_EXCEPTION_HANDLERS),
    ("LargeAddressAware", LARGE_ADDRESS_AWARE),
];

/// Pseudo output directory of utility projects.
const UTILITY_DIR: &str = "utility";

// ═══════════════════════════════════════════════════════════════════════════════
//  Paths
// ═══════════════════════════════════════════════════════════════════════════════

/// `C:\ws\` → `C:/ws`
pub fn normalize_root(root: &str) -> String {
    root.replace('\\', "/").trim_end_matches('/').to_string()
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/') || (bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic())
}

/// Strip `root/` from the front of `path` (case-insensitively).
pub fn relative_to_root(path: &str, root: &str) -> String {
    if root.is_empty() {
        return path.to_string();
    }
    match (path.get(..root.len()), path.get(root.len()..)) {
        (Some(head), Some(tail)) if head.eq_ignore_ascii_case(root) && tail.starts_with('/') => {
            tail[1..].to_string()
        }
        _ => path.to_string(),
    }
}

/// Forward slashes; relative paths are taken relative to the project
/// directory; paths under the root become root-relative.
pub fn resolve_path(path: &str, project_dir: &str, root: &str) -> String {
    let path = path.trim().replace('\\', "/");
    if is_absolute(&path) {
        return relative_to_root(&path, root);
    }
    let path = path.strip_prefix("./").unwrap_or(&path);
    if project_dir.is_empty() {
        path.to_string()
    } else {
        format!("{project_dir}/{path}")
    }
}

/// [`resolve_path`] plus a trailing `/` (except for the root itself).
fn resolve_dir(path: &str, project_dir: &str, root: &str) -> String {
    let mut dir = resolve_path(path, project_dir, root);
    if dir.eq_ignore_ascii_case(root) {
        return String::new();
    }
    if !dir.is_empty() && !dir.ends_with('/') {
        dir.push('/');
    }
    dir
}

/// Directory of the project file, root-relative, without trailing `/`.
pub fn project_dir(project: &Project) -> String {
    let file = project.file.replace('\\', "/");
    file.rsplit_once('/').map(|(dir, _)| dir.to_string()).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Transformation
// ═══════════════════════════════════════════════════════════════════════════════

/// Produce `project.parsed_configs` in the order of `configurations`,
/// skipping names the project does not define.  Item paths are resolved in
/// place.  `root` must already be normalised with [`normalize_root`].
pub fn transform(project: &mut Project, configurations: &[String], root: &str) {
    let dir = project_dir(project);
    for list in [&mut project.sources, &mut project.resources] {
        for item in list.iter_mut() {
            *item = resolve_path(item, &dir, root);
        }
    }

    project.parsed_configs = configurations
        .iter()
        .filter_map(|name| project.configs.iter().find(|c| &c.key.configuration == name))
        .map(|raw| parse_config(project, raw, &dir, root))
        .collect();

    tracing::debug!(
        "{}: parsed configurations {:?}",
        project.name,
        project.parsed_configs.iter().map(|pc| pc.name.as_str()).collect::<Vec<_>>()
    );
}

fn property_map(project: &Project, raw: &RawConfig, dir: &str, root: &str) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = raw
        .project_variables
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let project_dir = if dir.is_empty() { format!("{root}/") } else { format!("{root}/{dir}/") };
    vars.insert("Configuration".into(), raw.key.configuration.clone());
    vars.insert("Platform".into(), raw.key.platform.clone());
    vars.insert("ProjectName".into(), project.name.clone());
    vars.insert("SolutionDir".into(), format!("{root}/"));
    vars.insert("ProjectDir".into(), project_dir);
    vars
}

fn parse_config(project: &Project, raw: &RawConfig, dir: &str, root: &str) -> ParsedConfig {
    let name = raw.key.configuration.clone();
    let mut vars = property_map(project, raw, dir, root);
    let expanded = |key: &str, vars: &HashMap<String, String>| {
        expand_properties(raw.project_variables.string(key), vars).trim().to_string()
    };

    let target_name = Some(expanded("TargetName", &vars))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| project.name.clone());
    vars.insert("TargetName".into(), target_name.clone());

    let output_dir = if project.kind == TargetKind::Utility {
        format!("{UTILITY_DIR}/{name}/")
    } else {
        Some(expanded("OutDir", &vars))
            .filter(|d| !d.is_empty())
            .map(|d| resolve_dir(&d, dir, root))
            .unwrap_or_else(|| format!("{name}/"))
    };
    let intermediate_dir = Some(expanded("IntDir", &vars))
        .filter(|d| !d.is_empty())
        .map(|d| resolve_dir(&d, dir, root))
        .unwrap_or_else(|| resolve_dir(&format!("{}.dir/{name}", project.name), dir, root));

    let target_ext = Some(raw.project_variables.string("TargetExt").trim())
        .filter(|e| !e.is_empty())
        .unwrap_or(project.kind.default_extension())
        .to_string();
    let import_ext = match project.kind {
        TargetKind::DynamicLibrary => ".lib".to_string(),
        _ => String::new(),
    };

    let includes = raw
        .cl_variables
        .list("AdditionalIncludeDirectories")
        .iter()
        .map(|inc| resolve_path(inc, dir, root))
        .collect();
    let link = raw
        .link_variables
        .list("AdditionalDependencies")
        .iter()
        .map(|lib| resolve_path(lib, dir, root))
        .filter(|lib| !is_self_reference(lib, &output_dir))
        .collect();

    ParsedConfig {
        platform: raw.key.platform.clone(),
        includes,
        defines: raw.cl_variables.list("PreprocessorDefinitions"),
        flags: compile_flags(&raw.cl_variables),
        link,
        link_flags: link_flags(raw),
        custom_build: raw
            .custom_build
            .iter()
            .map(|rule| resolve_rule(rule, dir, root))
            .collect(),
        target_name,
        output_dir,
        intermediate_dir,
        target_ext,
        import_ext,
        name,
    }
}

fn compile_flags(cl: &VariableTable) -> Vec<String> {
    let mut flags: Vec<String> = COMPILE_FLAGS
        .iter()
        .map(|(key, table)| cl.mapped(key, table))
        .filter(|flag| !flag.is_empty())
        .map(String::from)
        .collect();

    flags.extend(cl.list("DisableSpecificWarnings").iter().map(|w| format!("/wd{w}")));
    let additional = cl.filtered_string("AdditionalOptions");
    if !additional.is_empty() {
        flags.push(additional);
    }
    if cl.bool("TreatWarningAsError", false) {
        flags.push("/WX".to_string());
    }
    flags
}

fn link_flags(raw: &RawConfig) -> Vec<String> {
    let mut flags = Vec::new();
    for options in [
        raw.link_variables.filtered_string("AdditionalOptions"),
        raw.lib_variables.filtered_string("AdditionalOptions"),
    ] {
        if !options.is_empty() {
            flags.push(options);
        }
    }
    flags.extend(
        LINK_FLAGS
            .iter()
            .map(|(key, table)| raw.link_variables.mapped(key, table))
            .filter(|flag| !flag.is_empty())
            .map(String::from),
    );
    if raw.project_variables.bool("LinkIncremental", false) {
        flags.push("/INCREMENTAL".to_string());
    }
    flags
}

/// A library entry pointing into this configuration's own output directory.
/// Artifacts of other projects are filtered later by [`ProjectGraph::resolve`],
/// once every output path is known.
///
/// [`ProjectGraph::resolve`]: crate::solution::ProjectGraph::resolve
fn is_self_reference(lib: &str, output_dir: &str) -> bool {
    let Some((lib_dir, _)) = lib.rsplit_once('/') else {
        return false;
    };
    !output_dir.is_empty() && format!("{lib_dir}/").eq_ignore_ascii_case(output_dir)
}

fn resolve_rule(rule: &CustomBuildRule, dir: &str, root: &str) -> CustomBuildRule {
    CustomBuildRule {
        message: rule.message.clone(),
        inputs: rule.inputs.iter().map(|p| resolve_path(p, dir, root)).collect(),
        output: resolve_path(&rule.output, dir, root),
        additional_outputs: rule
            .additional_outputs
            .iter()
            .map(|p| resolve_path(p, dir, root))
            .collect(),
        command: rule.command.clone(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
