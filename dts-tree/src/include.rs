//! Textual include expansion, run on raw source before lexing.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::IncludeError;

static INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(?:#include|/include/)\s*(?:"([^"]+)"|<([^>]+)>)"#).unwrap());
static GUARD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#\s*ifndef\s+(\w+)\s*$").unwrap());
static GUARD_DEFINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#\s*define\s+(\w+)\b").unwrap());
static GUARD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#\s*endif\b").unwrap());

/// Inlines `#include "..."`, `/include/ "..."` and `#include <...>` lines.
///
/// Quoted paths are looked up next to the including file, then in the search
/// paths. Angled paths are looked up in the search paths only, and are left
/// in place when not found so a later preprocessor can handle them.
/// A file already inlined once contributes nothing the second time, and the
/// `#ifndef`/`#endif` lines of a header's include guard are dropped.
#[derive(Debug, Clone, Default)]
pub struct IncludeResolver {
    search_paths: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Read `path` and return its text with every resolvable include inlined.
    pub fn resolve(&self, path: &Path) -> Result<String, IncludeError> {
        let mut visited = HashSet::new();
        self.inline(path, &mut visited)
    }

    fn inline(&self, path: &Path, visited: &mut HashSet<PathBuf>) -> Result<String, IncludeError> {
        let io_error = |source| IncludeError::Io {
            path: path.to_path_buf(),
            source,
        };

        let canonical = fs::canonicalize(path).map_err(io_error)?;
        if !visited.insert(canonical.clone()) {
            trace!(path = %path.display(), "already included");
            return Ok(String::new());
        }

        let text = fs::read_to_string(&canonical).map_err(io_error)?;
        let dir = canonical.parent().unwrap_or(Path::new("."));
        let mut out = String::with_capacity(text.len());
        let lines: Vec<&str> = text.lines().collect();
        let guard = include_guard(&lines);

        for (index, &line) in lines.iter().enumerate() {
            if guard.map_or(false, |(open, close)| index == open || index == close) {
                trace!(line = index + 1, "dropping include guard");
                continue;
            }

            let Some(captures) = INCLUDE.captures(line) else {
                out.push_str(line);
                out.push('\n');
                continue;
            };

            let quoted = captures.get(1).is_some();
            let Some(name) = captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str()) else {
                continue;
            };

            match self.locate(dir, name, quoted) {
                Some(found) => {
                    debug!(file = %found.display(), from = %path.display(), "inlining include");
                    out.push_str(&self.inline(&found, visited)?);
                }
                None if quoted => {
                    return Err(IncludeError::NotFound {
                        path: name.to_string(),
                        included_from: path.to_path_buf(),
                        line: index + 1,
                    })
                }
                None => {
                    trace!(name, "leaving system include in place");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }

        Ok(out)
    }

    fn locate(&self, dir: &Path, name: &str, quoted: bool) -> Option<PathBuf> {
        let local = quoted.then(|| dir.join(name));
        local
            .into_iter()
            .chain(self.search_paths.iter().map(|base| base.join(name)))
            .find(|candidate| candidate.is_file())
    }
}

/// Indices of the `#ifndef NAME` line opening a file and the final `#endif`,
/// when the line after the `#ifndef` is `#define NAME`. Comments and blank
/// lines are not counted.
fn include_guard(lines: &[&str]) -> Option<(usize, usize)> {
    let mut significant = significant_lines(lines);
    let open = significant.next()?;
    let define = significant.next()?;
    let close = significant.last()?;

    let name = GUARD_OPEN.captures(lines[open])?.get(1)?.as_str();
    let defined = GUARD_DEFINE.captures(lines[define])?.get(1)?.as_str();
    (name == defined && GUARD_CLOSE.is_match(lines[close])).then_some((open, close))
}

/// Indices of lines that are neither blank nor comments.
fn significant_lines<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = usize> + 'a {
    let mut in_comment = false;

    lines.iter().enumerate().filter_map(move |(index, line)| {
        let line = line.trim();
        if in_comment {
            in_comment = !line.contains("*/");
            return None;
        }
        if line.starts_with("/*") {
            in_comment = !line.contains("*/");
            return None;
        }
        (!line.is_empty() && !line.starts_with("//")).then_some(index)
    })
}
