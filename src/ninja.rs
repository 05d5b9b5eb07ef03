//! `build.ninja` generation.
//!
//! [`NinjaWriter`] is the one piece of state shared across projects: the
//! table of synthetic `identN` variables and the set of custom-step outputs
//! already emitted.  Projects are written one after another with
//! [`NinjaWriter::write_project`]; [`NinjaWriter::finish`] assembles the rule
//! templates, the identifier declarations and the collected build edges.

use std::collections::{HashMap, HashSet};

use crate::project::{ParsedConfig, Project, TargetKind};
use crate::solution::ProjectGraph;
use crate::transform::relative_to_root;

/// Default response-file switch point, in characters.
pub const DEFAULT_RSP_THRESHOLD: usize = 8000;

// ═══════════════════════════════════════════════════════════════════════════════
//  Rule templates
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed preamble and rule set.  Only the cmake binary varies between runs.
pub fn rule_templates(cmake: &str) -> String {
    let mut header = String::new();
    header.push_str("ninja_required_version = 1.5\n");
    header.push_str("msvc_deps_prefix = Note: including file: \n\n");

    header.push_str(
        "rule CXX_COMPILER\n\
         \x20 deps = msvc\n\
         \x20 command = cl.exe /nologo $DEFINES $INCLUDES $FLAGS /showIncludes /Fo$out /Fd$TARGET_COMPILE_PDB /FS -c $in\n\
         \x20 description = Building CXX object $out\n\n",
    );

    header.push_str(
        "rule RC_COMPILER\n\
         \x20 command = rc.exe $DEFINES $INCLUDES $FLAGS /fo$out $in\n\
         \x20 description = Building RC object $out\n\n",
    );

    header.push_str(
        "rule CXX_STATIC_LIBRARY_LINKER\n\
         \x20 command = cmd.exe /C \"$PRE_LINK && link.exe /lib /nologo $LINK_FLAGS /out:$TARGET_FILE $in && $POST_BUILD\"\n\
         \x20 description = Linking CXX static library $TARGET_FILE\n\
         \x20 restat = $RESTAT\n\n",
    );

    header.push_str(
        "rule CXX_STATIC_LIBRARY_LINKER_RSP\n\
         \x20 command = cmd.exe /C \"$PRE_LINK && link.exe /lib /nologo $LINK_FLAGS /out:$TARGET_FILE @$RSP_FILE && $POST_BUILD\"\n\
         \x20 description = Linking CXX static library $TARGET_FILE\n\
         \x20 rspfile = $RSP_FILE\n\
         \x20 rspfile_content = $in_newline\n\
         \x20 restat = $RESTAT\n\n",
    );

    header.push_str(&format!(
        "rule CXX_SHARED_LIBRARY_LINKER\n\
         \x20 command = cmd.exe /C \"$PRE_LINK && \"{cmake}\" -E vs_link_dll --intdir=$OBJECT_DIR --manifests $MANIFESTS -- link.exe /nologo $in /out:$TARGET_FILE /implib:$TARGET_IMPLIB /pdb:$TARGET_PDB /dll /version:0.0 $LINK_FLAGS $LINK_PATH $LINK_LIBRARIES && $POST_BUILD\"\n\
         \x20 description = Linking CXX shared library $TARGET_FILE\n\
         \x20 restat = 1\n\n"
    ));

    header.push_str(&format!(
        "rule CXX_SHARED_LIBRARY_LINKER_RSP\n\
         \x20 command = cmd.exe /C \"$PRE_LINK && \"{cmake}\" -E vs_link_dll --intdir=$OBJECT_DIR --manifests $MANIFESTS -- link.exe /nologo @$RSP_FILE /out:$TARGET_FILE /implib:$TARGET_IMPLIB /pdb:$TARGET_PDB /dll /version:0.0 $LINK_FLAGS && $POST_BUILD\"\n\
         \x20 description = Linking CXX shared library $TARGET_FILE\n\
         \x20 rspfile = $RSP_FILE\n\
         \x20 rspfile_content = $in_newline $LINK_PATH $LINK_LIBRARIES\n\
         \x20 restat = 1\n\n"
    ));

    header.push_str(&format!(
        "rule CXX_EXECUTABLE_LINKER\n\
         \x20 command = cmd.exe /C \"$PRE_LINK && \"{cmake}\" -E vs_link_exe --intdir=$OBJECT_DIR --manifests $MANIFESTS -- link.exe /nologo $in /out:$TARGET_FILE /pdb:$TARGET_PDB /version:0.0 $LINK_FLAGS $LINK_PATH $LINK_LIBRARIES && $POST_BUILD\"\n\
         \x20 description = Linking CXX executable $TARGET_FILE\n\
         \x20 restat = $RESTAT\n\n"
    ));

    header.push_str(&format!(
        "rule CXX_EXECUTABLE_LINKER_RSP\n\
         \x20 command = cmd.exe /C \"$PRE_LINK && \"{cmake}\" -E vs_link_exe --intdir=$OBJECT_DIR --manifests $MANIFESTS -- link.exe /nologo @$RSP_FILE /out:$TARGET_FILE /pdb:$TARGET_PDB /version:0.0 $LINK_FLAGS && $POST_BUILD\"\n\
         \x20 description = Linking CXX executable $TARGET_FILE\n\
         \x20 rspfile = $RSP_FILE\n\
         \x20 rspfile_content = $in_newline $LINK_PATH $LINK_LIBRARIES\n\
         \x20 restat = $RESTAT\n\n"
    ));

    header.push_str(
        "rule CUSTOM_COMMAND\n\
         \x20 command = $COMMAND\n\
         \x20 description = $DESC\n\n",
    );

    header
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Escaping helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Escape text placed on the right-hand side of a `name = value` binding.
fn escape_value(value: &str) -> String {
    value.replace('$', "$$").replace(['\r', '\n'], " ")
}

/// Quote a command-line argument that contains spaces.
fn quote_arg(arg: &str) -> String {
    if arg.contains(' ') && !arg.starts_with('"') {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

fn join_args<'a>(prefix: &str, args: impl IntoIterator<Item = &'a String>) -> String {
    args.into_iter()
        .map(|a| escape_value(&quote_arg(&format!("{prefix}{a}"))))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `dir/sub/name.cpp` → `name` + `ext`
fn object_base(source: &str, ext: &str) -> String {
    let file = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    format!("{stem}{ext}")
}

/// Object file name for `source`, unique within `used` (compared
/// case-insensitively).  Later collisions get `1_`, `2_`, ... prefixes.
pub fn object_name(source: &str, ext: &str, used: &mut HashSet<String>) -> String {
    let base = object_base(source, ext);
    let mut candidate = base.clone();
    let mut n = 1;
    while !used.insert(candidate.to_ascii_lowercase()) {
        candidate = format!("{n}_{base}");
        n += 1;
    }
    candidate
}

// ═══════════════════════════════════════════════════════════════════════════════
//  NinjaWriter
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct NinjaWriter {
    root: String,
    cmake: String,
    rsp_threshold: usize,
    idents: HashMap<String, String>,
    ident_decls: String,
    emitted_outputs: HashSet<String>,
    body: String,
}

/// Outputs and inputs of one configuration's link edge before it is
/// written out.
struct LinkInputs {
    explicit: Vec<String>,
    order_only: Vec<String>,
}

impl NinjaWriter {
    /// `root` is the normalised workspace root (see
    /// [`crate::transform::normalize_root`]).
    pub fn new(root: impl Into<String>, cmake: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            cmake: cmake.into(),
            rsp_threshold: DEFAULT_RSP_THRESHOLD,
            idents: HashMap::new(),
            ident_decls: String::new(),
            emitted_outputs: HashSet::new(),
            body: String::new(),
        }
    }

    pub fn rsp_threshold(mut self, threshold: usize) -> Self {
        self.rsp_threshold = threshold;
        self
    }

    /// Escape a path for use in a build line.  Paths containing parentheses
    /// are bound once to an `identN` variable and referenced through it.
    pub fn escape(&mut self, path: &str) -> String {
        let path = relative_to_root(path, &self.root);
        if path.contains(['(', ')']) {
            if let Some(ident) = self.idents.get(&path) {
                return format!("${ident}");
            }
            let ident = format!("ident{}", self.idents.len());
            self.ident_decls.push_str(&format!("{ident} = {}\n", escape_value(&path)));
            self.idents.insert(path, ident.clone());
            return format!("${ident}");
        }
        let mut out = String::with_capacity(path.len());
        for c in path.chars() {
            if matches!(c, '$' | ' ' | ':') {
                out.push('$');
            }
            out.push(c);
        }
        out
    }

    fn escape_all(&mut self, paths: &[String]) -> String {
        paths.iter().map(|p| self.escape(p)).collect::<Vec<_>>().join(" ")
    }

    fn build(&mut self, outputs: &[String], rule: &str, inputs: &[String], order_only: &[String]) {
        let outputs = self.escape_all(outputs);
        let mut line = format!("build {outputs}: {rule}");
        if !inputs.is_empty() {
            line.push(' ');
            line.push_str(&self.escape_all(inputs));
        }
        if !order_only.is_empty() {
            line.push_str(" || ");
            line.push_str(&self.escape_all(order_only));
        }
        self.body.push_str(&line);
        self.body.push('\n');
    }

    fn param(&mut self, name: &str, value: &str) {
        self.body.push_str(&format!("  {name} = {value}\n"));
    }

    /// Emit every build edge of `graph.projects[index]`.
    pub fn write_project(&mut self, graph: &ProjectGraph, index: usize) {
        let project = &graph.projects[index];
        if project.kind == TargetKind::Unknown {
            return;
        }
        for config in &project.parsed_configs {
            self.body.push_str(&format!("\n# {} ({})\n", project.name, config.name));
            let custom_outputs = self.write_custom_rules(config);

            if project.kind == TargetKind::Utility {
                let mut order_only: Vec<String> = graph
                    .direct_projects(index)
                    .filter_map(|dep| dependency_config(project, dep, &config.name))
                    .map(ParsedConfig::output_path)
                    .collect();
                order_only.extend(custom_outputs);
                self.build(&[config.output_path()], "phony", &[], &order_only);
                continue;
            }

            let group = if custom_outputs.is_empty() {
                Vec::new()
            } else {
                let node = format!("custom/{}/{}", project.name, config.name);
                self.build(std::slice::from_ref(&node), "phony", &[], &custom_outputs);
                vec![node]
            };

            let objects = self.write_compile_edges(project, config, &group);
            let inputs = link_inputs(graph, index, config, objects, &group);
            self.write_link_edge(project, config, inputs);
        }
    }

    /// Custom steps of one configuration.  Returns every output, including
    /// the ones another step already emitted.  An output is produced by at
    /// most one edge: a step whose primary output exists is skipped, and
    /// additional outputs that exist are left off its edge.
    fn write_custom_rules(&mut self, config: &ParsedConfig) -> Vec<String> {
        let mut all_outputs: Vec<String> = Vec::new();
        for rule in &config.custom_build {
            for output in rule.outputs() {
                if !all_outputs.iter().any(|o| o == output) {
                    all_outputs.push(output.to_string());
                }
            }
            if self.emitted_outputs.contains(&rule.output) {
                tracing::debug!("custom output {} already emitted", rule.output);
                continue;
            }

            let mut outputs = vec![rule.output.clone()];
            for extra in &rule.additional_outputs {
                if self.emitted_outputs.contains(extra) || outputs.contains(extra) {
                    tracing::debug!("custom output {extra} already emitted");
                    continue;
                }
                outputs.push(extra.clone());
            }
            self.emitted_outputs.extend(outputs.iter().cloned());

            if rule.command.is_empty() {
                self.build(&outputs, "phony", &rule.inputs, &[]);
                continue;
            }
            self.build(&outputs, "CUSTOM_COMMAND", &rule.inputs, &[]);
            self.param("COMMAND", &format!("cmd.exe /C \"{}\"", escape_value(&rule.command)));
            self.param("DESC", &escape_value(&rule.message));
            self.param("restat", "1");
        }
        all_outputs
    }

    /// Compile and resource edges; returns the produced object paths.
    fn write_compile_edges(&mut self, project: &Project, config: &ParsedConfig, group: &[String]) -> Vec<String> {
        let mut used = HashSet::new();
        let mut objects = Vec::new();
        let defines = join_args("/D", &config.defines);
        let includes = join_args("/I", &config.includes);
        let compile_pdb = format!("{}{}.pdb", config.intermediate_dir, config.target_name);

        for source in &project.sources {
            let object = format!("{}{}", config.intermediate_dir, object_name(source, ".obj", &mut used));
            self.build(std::slice::from_ref(&object), "CXX_COMPILER", std::slice::from_ref(source), group);
            self.param("FLAGS", &escape_value(&config.flags.join(" ")));
            self.param("DEFINES", &defines);
            self.param("INCLUDES", &includes);
            self.param("TARGET_COMPILE_PDB", &escape_value(&compile_pdb));
            objects.push(object);
        }

        if !matches!(project.kind, TargetKind::Application | TargetKind::DynamicLibrary) {
            return objects;
        }
        for resource in &project.resources {
            let res = format!("{}{}", config.intermediate_dir, object_name(resource, ".res", &mut used));
            self.build(std::slice::from_ref(&res), "RC_COMPILER", std::slice::from_ref(resource), group);
            self.param("FLAGS", "");
            self.param("DEFINES", &defines);
            self.param("INCLUDES", &includes);
            objects.push(res);
        }
        objects
    }

    fn write_link_edge(&mut self, project: &Project, config: &ParsedConfig, inputs: LinkInputs) {
        let link_flags = config.link_flags.join(" ");
        let libraries = config.link.iter().map(|l| quote_arg(l)).collect::<Vec<_>>().join(" ");
        let combined = link_flags.len() + libraries.len() + inputs.explicit.iter().map(|i| i.len() + 1).sum::<usize>();
        let use_rsp = combined >= self.rsp_threshold;

        let (rule, outputs) = match project.kind {
            TargetKind::StaticLibrary => ("CXX_STATIC_LIBRARY_LINKER", vec![config.output_path()]),
            TargetKind::DynamicLibrary => {
                ("CXX_SHARED_LIBRARY_LINKER", vec![config.output_path(), config.import_path()])
            }
            _ => ("CXX_EXECUTABLE_LINKER", vec![config.output_path()]),
        };
        let rule = if use_rsp {
            tracing::debug!(
                "{} ({}): link command of {combined} characters, using a response file",
                project.name,
                config.name
            );
            format!("{rule}_RSP")
        } else {
            rule.to_string()
        };

        self.build(&outputs, &rule, &inputs.explicit, &inputs.order_only);
        let object_dir = config.intermediate_dir.trim_end_matches('/');
        self.param("FLAGS", "");
        self.param("LINK_FLAGS", &escape_value(&link_flags));
        self.param("LINK_LIBRARIES", &escape_value(&libraries));
        self.param("LINK_PATH", "");
        self.param("MANIFESTS", "");
        self.param("OBJECT_DIR", &escape_value(object_dir));
        self.param("POST_BUILD", "cd .");
        self.param("PRE_LINK", "cd .");
        self.param(
            "TARGET_COMPILE_PDB",
            &escape_value(&format!("{}{}.pdb", config.intermediate_dir, config.target_name)),
        );
        self.param("TARGET_FILE", &escape_value(&config.output_path()));
        self.param("TARGET_IMPLIB", &escape_value(&config.import_path()));
        self.param("TARGET_PDB", &escape_value(&config.pdb_path()));
        self.param("RESTAT", "");
        if use_rsp {
            let rsp = format!("{}{}.rsp", config.intermediate_dir, config.target_name);
            self.param("RSP_FILE", &escape_value(&rsp));
        }
    }

    /// Rule templates, identifier declarations, then the collected edges.
    pub fn finish(self) -> String {
        let mut out = rule_templates(&self.cmake);
        out.push_str(&self.ident_decls);
        out.push_str(&self.body);
        out
    }
}

/// `dep`'s configuration named `name`; a dependency lacking it contributes
/// nothing to this configuration.
fn dependency_config<'a>(project: &Project, dep: &'a Project, name: &str) -> Option<&'a ParsedConfig> {
    let found = dep.parsed_config(name);
    if found.is_none() {
        tracing::warn!("{}: dependency {} has no configuration {name}", project.name, dep.name);
    }
    found
}

/// Real and order-only inputs of a link edge.
///
/// Static libraries aggregate their own objects only.  Applications and
/// DLLs additionally link the import library of each direct DLL dependency
/// and the output of each direct static dependency.  Every transitive
/// dependency's output is order-only.
fn link_inputs(
    graph: &ProjectGraph,
    index: usize,
    config: &ParsedConfig,
    objects: Vec<String>,
    group: &[String],
) -> LinkInputs {
    let project = &graph.projects[index];
    let mut explicit = objects;

    if project.kind != TargetKind::StaticLibrary {
        for dep in graph.direct_projects(index) {
            let Some(dep_config) = dependency_config(project, dep, &config.name) else {
                continue;
            };
            match dep.kind {
                TargetKind::DynamicLibrary => explicit.push(dep_config.import_path()),
                TargetKind::StaticLibrary => explicit.push(dep_config.output_path()),
                _ => {}
            }
        }
    }

    let mut order_only: Vec<String> = graph
        .transitive(index)
        .into_iter()
        .filter_map(|j| graph.projects[j].parsed_config(&config.name))
        .map(ParsedConfig::output_path)
        .collect();
    order_only.extend(group.iter().cloned());

    LinkInputs { explicit, order_only }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
