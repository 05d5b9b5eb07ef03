//! Pipeline orchestration and the file-system boundary.
//!
//! [`WorkspaceBuilder`] collects the run options, [`WorkspaceBuilder::open`]
//! reads the solution and every project and runs extraction, transformation
//! and dependency resolution.  The resulting [`Workspace`] renders the build
//! file and, unless this is a dry run, installs the Makefile hook.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::extract::{self, DefaultInputs, Removals};
use crate::hook;
use crate::ninja::{DEFAULT_RSP_THRESHOLD, NinjaWriter};
use crate::project::TargetKind;
use crate::solution::{self, ProjectGraph};
use crate::transform::{self, normalize_root};

/// Name of the generated build file, written to the workspace root.
pub const BUILD_FILE: &str = "build.ninja";

const FILTERS_SUFFIX: &str = ".filters";

// ═══════════════════════════════════════════════════════════════════════════════
//  WorkspaceBuilder
// ═══════════════════════════════════════════════════════════════════════════════

/// Options of one conversion run.
///
/// # Example
/// ```no_run
/// use vcxninja::WorkspaceBuilder;
///
/// let workspace = WorkspaceBuilder::new()
///     .preferred_configuration("Debug")
///     .ninja(r"C:\tools\ninja.exe")
///     .dry_run(true)
///     .open(r"C:\src\project\build")
///     .unwrap();
/// workspace.write().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct WorkspaceBuilder {
    configurations: Vec<String>,
    defaults: DefaultInputs,
    ninja: Option<String>,
    cmake: String,
    dry_run: bool,
    rsp_threshold: usize,
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self {
            configurations: vec!["Release".to_string(), "Debug".to_string()],
            defaults: DefaultInputs::new(),
            ninja: None,
            cmake: "cmake".to_string(),
            dry_run: false,
            rsp_threshold: DEFAULT_RSP_THRESHOLD,
        }
    }
}

impl WorkspaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration priority list.
    pub fn configurations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configurations = names.into_iter().map(Into::into).collect();
        self
    }

    /// Move `name` to the front of the priority list, adding it if absent.
    pub fn preferred_configuration(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.configurations.retain(|c| *c != name);
        self.configurations.insert(0, name);
        self
    }

    /// Inputs for custom steps of `target` (or `target|Configuration`) that
    /// declare none.
    pub fn default_inputs(mut self, target: impl Into<String>, inputs: Vec<String>) -> Self {
        self.defaults.insert(target, inputs);
        self
    }

    /// Same as [`default_inputs`](Self::default_inputs), from a
    /// `target=input1,input2` assignment.
    pub fn dependency(mut self, assignment: &str) -> Result<Self> {
        self.defaults.insert_assignment(assignment)?;
        Ok(self)
    }

    /// Ninja binary the rewritten projects invoke.  Without it no project
    /// or solution file is rewritten.
    pub fn ninja(mut self, path: impl Into<String>) -> Self {
        self.ninja = Some(path.into());
        self
    }

    /// CMake binary used by the DLL and executable link rules.
    pub fn cmake(mut self, path: impl Into<String>) -> Self {
        self.cmake = path.into();
        self
    }

    /// Generate the build file but leave every source file untouched.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn rsp_threshold(mut self, threshold: usize) -> Self {
        self.rsp_threshold = threshold;
        self
    }

    pub fn configuration_names(&self) -> &[String] {
        &self.configurations
    }

    /// Load the workspace rooted at `root`, which must hold exactly one
    /// `.sln` file.
    pub fn open(self, root: impl AsRef<Path>) -> Result<Workspace> {
        let root = root.as_ref();
        let solution_path = find_solution(root)?;
        let solution_text = read_file(&solution_path)?;
        let root_prefix = root_prefix(root)?;

        let mut projects = solution::parse_solution(&solution_text);
        tracing::info!("{}: {} projects", solution_path.display(), projects.len());

        let mut files = Vec::with_capacity(projects.len());
        for project in &mut projects {
            let path = root.join(project.file.replace('\\', "/"));
            let text = read_file(&path)?;
            let filters = PathBuf::from(format!("{}{FILTERS_SUFFIX}", path.display()));
            let items = if filters.is_file() { read_file(&filters)? } else { text.clone() };

            let removals = extract::extract(project, &path, &text, &items, &self.defaults)?;
            transform::transform(project, &self.configurations, &root_prefix);
            files.push(ProjectFile { path, text, removals });
        }

        let graph = ProjectGraph::resolve(projects);
        if graph.is_empty() {
            tracing::warn!("{}: no C++ projects", solution_path.display());
        }
        Ok(Workspace {
            solution_path,
            solution_text,
            root: root.to_path_buf(),
            root_prefix,
            files,
            graph,
            options: self,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Workspace
// ═══════════════════════════════════════════════════════════════════════════════

/// One project file as read, with the element ranges the hook removes.
#[derive(Debug)]
struct ProjectFile {
    path: PathBuf,
    text: String,
    removals: Removals,
}

/// A loaded and fully resolved workspace.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    root_prefix: String,
    solution_path: PathBuf,
    solution_text: String,
    /// Index-aligned with `graph.projects`.
    files: Vec<ProjectFile>,
    graph: ProjectGraph,
    options: WorkspaceBuilder,
}

impl Workspace {
    pub fn graph(&self) -> &ProjectGraph {
        &self.graph
    }

    /// Contents of the build file.
    pub fn generate(&self) -> String {
        let mut writer =
            NinjaWriter::new(&self.root_prefix, &self.options.cmake).rsp_threshold(self.options.rsp_threshold);
        for index in 0..self.graph.len() {
            writer.write_project(&self.graph, index);
        }
        writer.finish()
    }

    /// Write the build file and, outside dry runs with a ninja binary set,
    /// rewrite the project and solution files.  Returns the build file
    /// contents.
    pub fn write(&self) -> Result<String> {
        let contents = self.generate();
        let build_file = self.root.join(BUILD_FILE);
        write_file(&build_file, &contents)?;
        tracing::info!("wrote {}", build_file.display());

        let ninja = match (&self.options.ninja, self.options.dry_run) {
            (Some(ninja), false) => ninja,
            (_, true) => {
                tracing::info!("dry run, project files left untouched");
                return Ok(contents);
            }
            (None, false) => return Ok(contents),
        };

        for (file, project) in self.files.iter().zip(&self.graph.projects) {
            if project.kind == TargetKind::Unknown {
                continue;
            }
            let rewritten =
                hook::rewrite_project(&file.text, &file.removals, &project.parsed_configs, ninja, &self.root_prefix);
            write_file(&file.path, &rewritten)?;
            tracing::debug!("rewrote {}", file.path.display());
        }
        write_file(&self.solution_path, &solution::strip_dependencies(&self.solution_text))?;
        tracing::info!("installed the Makefile hook into {} projects", self.files.len());

        Ok(contents)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  File system helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// The single `.sln` file directly inside `root`.
pub fn find_solution(root: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(root).map_err(|e| Error::io(root, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(root, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("sln")) {
            found.push(path);
        }
    }
    match found.len() {
        1 => Ok(found.remove(0)),
        n => Err(Error::Workspace(format!(
            "{} should contain exactly one .sln file, found {n}",
            root.display()
        ))),
    }
}

/// Absolute, `/`-separated form of `root` used to relativise paths.
fn root_prefix(root: &Path) -> Result<String> {
    let absolute = root.canonicalize().map_err(|e| Error::io(root, e))?;
    let absolute = absolute.to_string_lossy();
    let absolute = absolute.strip_prefix(r"\\?\").unwrap_or(&absolute);
    Ok(normalize_root(absolute))
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::io(path, e))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
