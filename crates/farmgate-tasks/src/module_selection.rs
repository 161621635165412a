//! Selective test module computation
//!
//! A test module is selected when its own file changed or when it reaches a
//! changed file through its Python imports. Overlay files are keyed relative
//! to the overlay; files of other package roots in the workspace (the
//! boardfarm library, shared helpers) are keyed by absolute path. Imports
//! that resolve nowhere (the standard library, installed packages) are
//! ignored. Relative imports inside the overlay that cannot be resolved are
//! errors: a broken graph must never degrade into a guess.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use farmgate_core::config::SelectionConfig;
use farmgate_core::error::DetectError;
use farmgate_core::{ModuleSelection, SelectedModule, SelectionReason};

use crate::overlay::is_hidden;

static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+(\.*)([A-Za-z_][\w.]*)?\s+import\s+(.+)$").expect("Invalid regex")
});

static PLAIN_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").expect("Invalid regex"));

/// One `import` / `from ... import` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    /// Number of leading dots (0 = absolute)
    pub level: usize,
    /// Dotted module path, possibly empty for `from . import x`
    pub module: String,
    /// Names imported by `from ... import`
    pub names: Vec<String>,
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or("")
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .filter_map(|item| {
            let name = item
                .trim()
                .trim_matches(|c| c == '(' || c == ')' || c == '\\')
                .split_whitespace()
                .next()?;
            (name != "*").then(|| name.to_string())
        })
        .collect()
}

const TRIPLE_QUOTES: [&str; 2] = ["\"\"\"", "'''"];

/// Source lines with triple-quoted string bodies blanked out
fn code_lines(source: &str) -> Vec<String> {
    let mut open: Option<&str> = None;
    source
        .lines()
        .map(|line| {
            let mut code = String::new();
            let mut rest = line;
            loop {
                if let Some(delim) = open {
                    let Some(end) = rest.find(delim) else { break };
                    rest = &rest[end + delim.len()..];
                    open = None;
                    continue;
                }
                let start = TRIPLE_QUOTES
                    .into_iter()
                    .filter_map(|delim| rest.find(delim).map(|at| (at, delim)))
                    .min();
                match start {
                    Some((at, delim)) if !rest[..at].contains('#') => {
                        code.push_str(&rest[..at]);
                        code.push(' ');
                        rest = &rest[at + delim.len()..];
                        open = Some(delim);
                    }
                    _ => {
                        code.push_str(rest);
                        break;
                    }
                }
            }
            code
        })
        .collect()
}

/// Extract import statements from Python source
pub fn parse_imports(source: &str) -> Vec<ImportStmt> {
    let mut imports = Vec::new();
    let code = code_lines(source);
    let mut lines = code.iter().map(String::as_str);

    while let Some(raw) = lines.next() {
        let line = strip_comment(raw);

        if let Some(caps) = FROM_IMPORT.captures(line) {
            let level = caps.get(1).map_or(0, |m| m.as_str().len());
            let module = caps.get(2).map_or("", |m| m.as_str()).to_string();
            let mut list = caps.get(3).map_or("", |m| m.as_str()).to_string();

            // Parenthesized or backslash-continued name lists
            let mut open = list.contains('(') && !list.contains(')');
            let mut continued = list.trim_end().ends_with('\\');
            while open || continued {
                let Some(next) = lines.next() else { break };
                let next = strip_comment(next);
                list.push(',');
                list.push_str(next);
                open = open && !next.contains(')');
                continued = next.trim_end().ends_with('\\');
            }

            imports.push(ImportStmt {
                level,
                module,
                names: split_names(&list),
            });
        } else if let Some(caps) = PLAIN_IMPORT.captures(line) {
            for module in split_names(caps.get(1).map_or("", |m| m.as_str())) {
                imports.push(ImportStmt {
                    level: 0,
                    module,
                    names: Vec::new(),
                });
            }
        }
    }

    imports
}

/// Dotted module identifier of a file relative to the overlay
pub fn module_id(path: &Path) -> String {
    path.with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

/// Python files of an overlay, plus the package roots it may import from,
/// and the import edges between them
#[derive(Debug, Default)]
pub struct ModuleMap {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
    roots: Vec<PathBuf>,
    imports: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

fn walk_python(dir: &Path, skip: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    let skip = skip.to_path_buf();
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0
                || !(is_hidden(e.file_name()) || e.file_name() == "__pycache__" || e.path() == skip)
        })
}

impl ModuleMap {
    /// Scan an overlay directory and build its import graph
    pub fn build(overlay_dir: &Path) -> Result<Self, DetectError> {
        Self::build_with_roots(overlay_dir, &[])
    }

    /// Scan an overlay and the package roots next to it (absolute paths,
    /// typically the other repositories of the workspace).
    ///
    /// Absolute imports that miss the overlay are looked up under each root
    /// in order. The overlay subtree is never scanned twice, even when it
    /// lies inside one of the roots.
    pub fn build_with_roots(overlay_dir: &Path, package_roots: &[PathBuf]) -> Result<Self, DetectError> {
        debug!(
            path = %overlay_dir.display(),
            roots = package_roots.len(),
            "building module map"
        );
        let mut map = Self::default();

        for entry in walk_python(overlay_dir, overlay_dir) {
            let entry = entry.map_err(|e| {
                DetectError::ModuleSelection(format!("cannot scan {}: {}", overlay_dir.display(), e))
            })?;
            let Ok(relative) = entry.path().strip_prefix(overlay_dir) else {
                continue;
            };
            map.insert(relative, entry.file_type().is_dir());
        }

        for root in package_roots {
            if !root.is_absolute() || root.starts_with(overlay_dir) {
                debug!(root = %root.display(), "package root skipped");
                continue;
            }
            for entry in walk_python(root, overlay_dir) {
                match entry {
                    Ok(entry) => map.insert(entry.path(), entry.file_type().is_dir()),
                    Err(e) => debug!(root = %root.display(), error = %e, "unreadable entry skipped"),
                }
            }
            map.roots.push(root.clone());
        }

        let mut imports = BTreeMap::new();
        for file in &map.files {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                overlay_dir.join(file)
            };
            let bytes = std::fs::read(&path).map_err(|e| {
                DetectError::ModuleSelection(format!("cannot read {}: {}", file.display(), e))
            })?;
            let source = String::from_utf8_lossy(&bytes);
            // Importing a module runs every enclosing package's __init__.py
            let mut targets: BTreeSet<PathBuf> = file
                .ancestors()
                .skip(1)
                .map(|dir| dir.join("__init__.py"))
                .filter(|init| map.files.contains(init))
                .collect();
            for stmt in parse_imports(&source) {
                match map.resolve(file, &stmt) {
                    Ok(resolved) => targets.extend(resolved),
                    // Only overlay imports must resolve
                    Err(e) if file.is_absolute() => {
                        debug!(error = %e, "unresolved import outside the overlay ignored")
                    }
                    Err(e) => return Err(e),
                }
            }
            targets.remove(file);
            imports.insert(file.clone(), targets);
        }
        map.imports = imports;

        debug!(
            files = map.files.len(),
            edges = map.imports.values().map(BTreeSet::len).sum::<usize>(),
            "module map built"
        );
        Ok(map)
    }

    fn insert(&mut self, path: &Path, is_dir: bool) {
        if is_dir {
            self.dirs.insert(path.to_path_buf());
        } else if path.extension().is_some_and(|ext| ext == "py") {
            self.files.insert(path.to_path_buf());
        }
    }

    /// Every Python file of the overlay, relative to it
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().filter(|file| file.is_relative())
    }

    /// Python files found under the package roots, absolute
    pub fn package_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().filter(|file| file.is_absolute())
    }

    /// Direct imports of a file that resolve in the graph
    pub fn imports_of(&self, file: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.imports.get(file)
    }

    /// Files reachable from `file` through imports, breadth-first
    pub fn reachable_from(&self, file: &Path) -> Vec<PathBuf> {
        let mut seen: BTreeSet<&Path> = BTreeSet::from([file]);
        let mut queue: VecDeque<&Path> = VecDeque::from([file]);
        let mut order = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in self.imports.get(current).into_iter().flatten() {
                if seen.insert(next.as_path()) {
                    order.push(next.clone());
                    queue.push_back(next.as_path());
                }
            }
        }
        order
    }

    /// Existing files a dotted module path maps to under `base`, including
    /// the `__init__.py` of every package on the way
    fn module_files(&self, base: &Path, dotted: &str) -> (Vec<PathBuf>, bool) {
        let mut found = Vec::new();
        let mut current = base.to_path_buf();
        let mut exists = true;

        for part in dotted.split('.').filter(|p| !p.is_empty()) {
            current.push(part);
            let init = current.join("__init__.py");
            let mut file = current.clone().into_os_string();
            file.push(".py");
            let file = PathBuf::from(file);

            if self.files.contains(&init) {
                found.push(init);
            }
            if self.files.contains(&file) {
                found.push(file);
                exists = true;
            } else {
                exists = self.dirs.contains(&current);
            }
        }
        (found, exists)
    }

    fn resolve(&self, importer: &Path, stmt: &ImportStmt) -> Result<BTreeSet<PathBuf>, DetectError> {
        let mut targets = BTreeSet::new();

        if stmt.level == 0 {
            let importer_dir = importer.parent().unwrap_or(Path::new(""));
            let mut bases: Vec<&Path> = Vec::with_capacity(self.roots.len() + 2);
            if importer.is_relative() {
                bases.push(Path::new(""));
            }
            bases.push(importer_dir);
            bases.extend(self.roots.iter().map(PathBuf::as_path));
            for base in bases {
                let (files, exists) = self.module_files(base, &stmt.module);
                if exists && !files.is_empty() {
                    targets.extend(files);
                    for name in &stmt.names {
                        let (sub, _) = self.module_files(base, &format!("{}.{}", stmt.module, name));
                        targets.extend(sub);
                    }
                    break;
                }
            }
            return Ok(targets);
        }

        let top = self.top_of(importer);
        let mut base = importer.parent().unwrap_or(Path::new(""));
        for _ in 1..stmt.level {
            base = match base.parent() {
                Some(parent) if base != top => parent,
                _ => {
                    let scope = if top.as_os_str().is_empty() {
                        "the overlay".to_string()
                    } else {
                        top.display().to_string()
                    };
                    return Err(DetectError::ModuleSelection(format!(
                        "relative import '{}{}' in {} escapes {}",
                        ".".repeat(stmt.level),
                        stmt.module,
                        importer.display(),
                        scope
                    )));
                }
            };
        }

        let init = base.join("__init__.py");
        if self.files.contains(&init) {
            targets.insert(init);
        }
        if !stmt.module.is_empty() {
            let (files, exists) = self.module_files(base, &stmt.module);
            if !exists {
                return Err(DetectError::ModuleSelection(format!(
                    "cannot resolve relative import '{}{}' in {}",
                    ".".repeat(stmt.level),
                    stmt.module,
                    importer.display()
                )));
            }
            targets.extend(files);
        }
        for name in &stmt.names {
            let dotted = if stmt.module.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", stmt.module, name)
            };
            let (sub, _) = self.module_files(base, &dotted);
            targets.extend(sub);
        }
        Ok(targets)
    }

    /// Directory a file's relative imports may not climb above
    fn top_of(&self, file: &Path) -> &Path {
        self.roots
            .iter()
            .filter(|root| file.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map_or(Path::new(""), PathBuf::as_path)
    }
}

/// Selects test modules impacted by a set of changed files
#[derive(Debug, Clone)]
pub struct ModuleSelector {
    modules: GlobSet,
    exclude: GlobSet,
}

fn build_globset(field: &str, patterns: &[String]) -> Result<GlobSet, DetectError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                DetectError::ModuleSelection(format!("invalid {} pattern '{}': {}", field, pattern, e))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| DetectError::ModuleSelection(format!("invalid {} patterns: {}", field, e)))
}

impl ModuleSelector {
    pub fn new(config: &SelectionConfig) -> Result<Self, DetectError> {
        Ok(Self {
            modules: build_globset("module", &config.module_patterns)?,
            exclude: build_globset("exclude", &config.exclude)?,
        })
    }

    /// Whether a path (relative to the overlay) is a test module
    pub fn is_module(&self, path: &Path) -> bool {
        self.modules.is_match(path) && !self.exclude.is_match(path)
    }

    /// Compute the selection; `changed` holds overlay files relative to the
    /// overlay and package-root files as absolute paths
    pub fn select(
        &self,
        map: &ModuleMap,
        overlay: &str,
        changed: &BTreeSet<PathBuf>,
    ) -> ModuleSelection {
        info!(
            overlay,
            changed_files = changed.len(),
            "selecting test modules"
        );
        let mut modules: Vec<SelectedModule> = map
            .files()
            .filter(|file| self.is_module(file))
            .filter_map(|file| {
                let reason = if changed.contains(file) {
                    SelectionReason::DirectChange(file.clone())
                } else {
                    let dependency = map
                        .reachable_from(file)
                        .into_iter()
                        .find(|dep| changed.contains(dep))?;
                    SelectionReason::DependencyChanged(dependency)
                };
                Some(SelectedModule {
                    id: module_id(file),
                    path: file.clone(),
                    reason,
                })
            })
            .collect();
        modules.sort_by(|a, b| a.id.cmp(&b.id));
        modules.dedup_by(|a, b| a.id == b.id);

        info!(selected_count = modules.len(), "test modules selected");
        ModuleSelection {
            overlay: overlay.to_string(),
            modules,
        }
    }
}
