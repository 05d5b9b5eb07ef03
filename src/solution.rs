//! `.sln` parsing and inter-project dependency resolution.
//!
//! Only C++ projects (`*.vcxproj` entries) are picked up; solution folders and
//! projects of other languages are skipped.  Dependency edges are resolved
//! once, after every project has been extracted, into index lists so nothing
//! holds a reference into the project vector.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::project::Project;

static PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"Project\("\{[0-9A-Fa-f-]+\}"\)\s*=\s*"([^"]+)",\s*"([^"]+\.vcxproj)",\s*"\{([0-9A-Fa-f-]+)\}""#,
    )
    .expect("invalid project regex")
});

static END_PROJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*EndProject\s*$").expect("invalid end-project regex"));

static DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([0-9A-Fa-f-]+)\}\s*=").expect("invalid dependency regex"));

static DEPENDENCY_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"postProject[\r\n\t {}=0-9A-Fa-f-]+EndProjectSection").expect("invalid section regex")
});

const DEPENDENCIES_START: &str = "ProjectSection(ProjectDependencies)";
const DEPENDENCIES_END: &str = "EndProjectSection";

// ═══════════════════════════════════════════════════════════════════════════════
//  Parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// Every `.vcxproj` entry of the solution, in file order, with the
/// identifiers listed in its `ProjectDependencies` section.
pub fn parse_solution(text: &str) -> Vec<Project> {
    let mut projects = Vec::new();
    for caps in PROJECT.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let mut project = Project::new(&caps[3], &caps[1], &caps[2]);

        let block_end = END_PROJECT
            .find(&text[whole.end()..])
            .map(|m| whole.end() + m.start())
            .unwrap_or(text.len());
        let block = &text[whole.end()..block_end];
        if let Some(start) = block.find(DEPENDENCIES_START) {
            let section = &block[start..];
            let section = section.find(DEPENDENCIES_END).map_or(section, |end| &section[..end]);
            for dep in DEPENDENCY.captures_iter(section) {
                project.declare_dependency(&dep[1]);
            }
        }

        tracing::debug!(
            "solution entry {} ({}) with {} declared dependencies",
            project.name,
            project.file,
            project.dependency_ids.len()
        );
        projects.push(project);
    }
    projects
}

/// Empty every `ProjectDependencies` section so the IDE stops ordering
/// builds itself.
pub fn strip_dependencies(text: &str) -> String {
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    DEPENDENCY_SECTION
        .replace_all(text, format!("postProject{newline}\tEndProjectSection").as_str())
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectGraph
// ═══════════════════════════════════════════════════════════════════════════════

/// All projects plus, per project, its resolved direct dependencies as
/// indices into `projects`.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    pub projects: Vec<Project>,
    deps: Vec<Vec<usize>>,
}

impl ProjectGraph {
    /// Resolve declared identifiers.  Unknown identifiers, self references
    /// and projects without compiled sources produce no edge.
    ///
    /// Link entries naming another project's artifact for the same
    /// configuration are dropped here; those arrive through the edges.
    pub fn resolve(mut projects: Vec<Project>) -> Self {
        drop_artifact_links(&mut projects);

        let index: HashMap<&str, usize> = projects
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();

        let deps = projects
            .iter()
            .enumerate()
            .map(|(i, project)| {
                let mut direct = Vec::new();
                for id in &project.dependency_ids {
                    match index.get(id.as_str()) {
                        Some(&j) if j != i && projects[j].has_sources() => {
                            if !direct.contains(&j) {
                                direct.push(j);
                            }
                        }
                        Some(&j) => {
                            tracing::debug!("{}: no edge to {} (nothing compiled)", project.name, projects[j].name)
                        }
                        None => tracing::debug!("{}: unknown dependency {id}", project.name),
                    }
                }
                direct
            })
            .collect();

        Self { projects, deps }
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn direct(&self, index: usize) -> &[usize] {
        &self.deps[index]
    }

    pub fn direct_projects(&self, index: usize) -> impl Iterator<Item = &Project> {
        self.deps[index].iter().map(|&j| &self.projects[j])
    }

    /// Every project reachable from `index`, depth-first in declaration
    /// order, each once, never `index` itself.
    pub fn transitive(&self, index: usize) -> Vec<usize> {
        let mut seen = HashSet::from([index]);
        let mut order = Vec::new();
        let mut stack: Vec<usize> = self.deps[index].iter().rev().copied().collect();
        while let Some(j) = stack.pop() {
            if !seen.insert(j) {
                continue;
            }
            order.push(j);
            stack.extend(self.deps[j].iter().rev().copied());
        }
        order
    }
}

/// Output and import paths of every project, lowercased, per configuration.
fn artifacts(projects: &[Project]) -> HashMap<String, HashSet<String>> {
    let mut by_config: HashMap<String, HashSet<String>> = HashMap::new();
    for config in projects.iter().flat_map(|p| &p.parsed_configs) {
        let paths = by_config.entry(config.name.clone()).or_default();
        paths.insert(config.output_path().to_ascii_lowercase());
        let import = config.import_path();
        if !import.is_empty() {
            paths.insert(import.to_ascii_lowercase());
        }
    }
    by_config
}

fn drop_artifact_links(projects: &mut [Project]) {
    let artifacts = artifacts(projects);
    for project in projects.iter_mut() {
        for config in &mut project.parsed_configs {
            let Some(paths) = artifacts.get(&config.name) else {
                continue;
            };
            config.link.retain(|lib| {
                let sibling = paths.contains(&lib.to_ascii_lowercase());
                if sibling {
                    tracing::debug!("{}|{}: dropping link entry {lib}", project.name, config.name);
                }
                !sibling
            });
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ParsedConfig;

    const SLN: &str = "Microsoft Visual Studio Solution File, Format Version 12.00\r
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91E6BC2}\") = \"app\", \"app\\app.vcxproj\", \"{AAAAAAAA-0000-0000-0000-000000000001}\"\r
\tProjectSection(ProjectDependencies) = postProject\r
\t\t{BBBBBBBB-0000-0000-0000-000000000002} = {BBBBBBBB-0000-0000-0000-000000000002}\r
\t\t{CCCCCCCC-0000-0000-0000-000000000003} = {CCCCCCCC-0000-0000-0000-000000000003}\r
\tEndProjectSection\r
EndProject\r
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91E6BC2}\") = \"core\", \"core.vcxproj\", \"{BBBBBBBB-0000-0000-0000-000000000002}\"\r
EndProject\r
Project(\"{2150E333-8FDC-42A3-9474-1A3956D46DE8}\") = \"Folder\", \"Folder\", \"{DDDDDDDD-0000-0000-0000-000000000004}\"\r
EndProject\r
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91E6BC2}\") = \"ZERO_CHECK\", \"ZERO_CHECK.vcxproj\", \"{CCCCCCCC-0000-0000-0000-000000000003}\"\r
EndProject\r
Global\r
EndGlobal\r
";

    fn project(id: &str, sources: usize, deps: &[&str]) -> Project {
        let mut p = Project::new(id, id, format!("{id}.vcxproj"));
        p.sources = (0..sources).map(|i| format!("{id}{i}.cpp")).collect();
        for d in deps {
            p.declare_dependency(d);
        }
        p
    }

    // ── Parsing ──────────────────────────────────────────────────────────

    #[test]
    fn parses_cpp_projects_only() {
        let projects = parse_solution(SLN);
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["app", "core", "ZERO_CHECK"]);
        assert_eq!(projects[0].file, "app\\app.vcxproj");
        assert_eq!(projects[0].id, "AAAAAAAA-0000-0000-0000-000000000001");
    }

    #[test]
    fn dependency_sections_stay_inside_their_project() {
        let projects = parse_solution(SLN);
        assert_eq!(
            projects[0].dependency_ids,
            vec!["BBBBBBBB-0000-0000-0000-000000000002", "CCCCCCCC-0000-0000-0000-000000000003"]
        );
        assert!(projects[1].dependency_ids.is_empty());
        assert!(projects[2].dependency_ids.is_empty());
    }

    #[test]
    fn strip_dependencies_empties_sections() {
        let stripped = strip_dependencies(SLN);
        assert!(!stripped.contains("{BBBBBBBB-0000-0000-0000-000000000002} ="));
        assert!(stripped.contains("postProject\r\n\tEndProjectSection"));
        assert!(parse_solution(&stripped)[0].dependency_ids.is_empty());
        assert_eq!(strip_dependencies(&stripped), stripped);
    }

    // ── Resolution ───────────────────────────────────────────────────────

    #[test]
    fn edges_require_compiled_sources() {
        let graph = ProjectGraph::resolve(vec![
            project("A", 1, &["B", "C", "MISSING"]),
            project("B", 1, &[]),
            project("C", 0, &[]),
        ]);
        assert_eq!(graph.direct(0), &[1]);
        assert!(graph.direct(1).is_empty());
    }

    #[test]
    fn resolution_ignores_declaration_order() {
        let a = ProjectGraph::resolve(vec![project("A", 1, &["C", "B"]), project("B", 1, &[]), project("C", 0, &[])]);
        let b = ProjectGraph::resolve(vec![project("A", 1, &["B", "C"]), project("B", 1, &[]), project("C", 0, &[])]);
        assert_eq!(a.direct(0), b.direct(0));
        assert_eq!(a.direct(0), &[1]);
    }

    fn config(name: &str, output_dir: &str, target: &str, ext: &str, link: &[&str]) -> ParsedConfig {
        ParsedConfig {
            name: name.to_string(),
            output_dir: output_dir.to_string(),
            target_name: target.to_string(),
            target_ext: ext.to_string(),
            link: link.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn sibling_artifacts_leave_the_link_line() {
        let mut lib = project("L", 1, &[]);
        lib.parsed_configs = vec![config("Release", "libs/Release/", "L", ".lib", &[])];
        let mut app = project("A", 1, &["L"]);
        app.parsed_configs = vec![config(
            "Release",
            "Release/",
            "A",
            ".exe",
            &["libs/release/L.lib", "C:/deps/openssl/lib/Release/libssl.lib", "user32.lib"],
        )];

        let graph = ProjectGraph::resolve(vec![app, lib]);
        assert_eq!(
            graph.projects[0].parsed_configs[0].link,
            vec!["C:/deps/openssl/lib/Release/libssl.lib", "user32.lib"]
        );
        assert_eq!(graph.direct(0), &[1]);
    }

    #[test]
    fn artifacts_of_other_configurations_are_kept() {
        let mut lib = project("L", 1, &[]);
        lib.parsed_configs = vec![config("Debug", "Debug/", "L", ".lib", &[])];
        let mut app = project("A", 1, &[]);
        app.parsed_configs = vec![config("Release", "Release/", "A", ".exe", &["Debug/L.lib"])];

        let graph = ProjectGraph::resolve(vec![app, lib]);
        assert_eq!(graph.projects[0].parsed_configs[0].link, vec!["Debug/L.lib"]);
    }

    #[test]
    fn self_reference_is_dropped() {
        let graph = ProjectGraph::resolve(vec![project("A", 1, &["A"])]);
        assert!(graph.direct(0).is_empty());
    }

    #[test]
    fn transitive_closure_is_ordered_and_cycle_safe() {
        let graph = ProjectGraph::resolve(vec![
            project("A", 1, &["B", "D"]),
            project("B", 1, &["C"]),
            project("C", 1, &["A"]),
            project("D", 1, &["C"]),
        ]);
        assert_eq!(graph.transitive(0), vec![1, 2, 3]);
        assert_eq!(graph.transitive(2), vec![0, 1, 3]);
    }
}
