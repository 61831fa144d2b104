//! Minimal glob matching over a directory tree.
//!
//! Supports `*` and `?` within a path segment and `**` across segments.
//! Patterns are compiled to an anchored regex and matched against paths
//! relative to the search root, with `/` separators.

use crate::CoreError;
use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

fn compile(pattern: &str) -> Result<Regex, CoreError> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CoreError::Glob {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

/// Relative paths under `root` matching `pattern`, sorted.
pub(crate) fn glob(root: &Path, pattern: &str) -> Result<Vec<String>, CoreError> {
    let re = compile(pattern)?;
    let mut out = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::File {
            path: e
                .path()
                .map_or_else(|| root.display().to_string(), |p| p.display().to_string()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
        })?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if re.is_match(&rel) {
            out.push(rel);
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("app.csproj"), "").unwrap();
        fs::write(dir.path().join("src/lib.fsproj"), "").unwrap();
        fs::write(dir.path().join("src/nested/deep.csproj"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        dir
    }

    #[test]
    fn star_matches_within_segment() {
        let dir = tree();
        assert_eq!(glob(dir.path(), "*.csproj").unwrap(), ["app.csproj"]);
    }

    #[test]
    fn double_star_crosses_segments() {
        let dir = tree();
        assert_eq!(
            glob(dir.path(), "**/*.csproj").unwrap(),
            ["app.csproj", "src/nested/deep.csproj"]
        );
        assert_eq!(glob(dir.path(), "src/**").unwrap(), [
            "src/lib.fsproj",
            "src/nested",
            "src/nested/deep.csproj"
        ]);
    }

    #[test]
    fn question_mark_and_literals() {
        let dir = tree();
        assert_eq!(glob(dir.path(), "README.m?").unwrap(), ["README.md"]);
        assert!(glob(dir.path(), "README.txt").unwrap().is_empty());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a+b.txt"), "").unwrap();
        fs::write(dir.path().join("aab.txt"), "").unwrap();
        assert_eq!(glob(dir.path(), "a+b.txt").unwrap(), ["a+b.txt"]);
    }
}
