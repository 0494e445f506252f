//! File reading and editing primitives backing the file tools.

use crate::errors::ToolError;
use std::path::Path;

/// Line-oriented reader with a line budget and optional `N|` numbering.
pub struct FileReader {
    pub path: String,
    pub line_budget: usize,
    pub with_line_num: bool,
}

impl FileReader {
    pub fn new(path: impl Into<String>, line_budget: usize, with_line_num: bool) -> Self {
        Self {
            path: path.into(),
            line_budget,
            with_line_num,
        }
    }

    fn format_line(&self, number: usize, line: &str) -> String {
        if self.with_line_num {
            format!("{number}|{line}\n")
        } else {
            format!("{line}\n")
        }
    }

    /// Read from the beginning, stopping at the line budget with a marker.
    pub fn read_lines(&self) -> std::io::Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        let mut result = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let number = idx + 1;
            if self.line_budget > 0 && number > self.line_budget {
                result.push(format!(
                    "...content after {} lines are truncated...\n",
                    self.line_budget
                ));
                break;
            }
            result.push(self.format_line(number, line));
        }
        Ok(result)
    }

    /// Read an inclusive 1-based line range; `end == 0` means to the end.
    pub fn read_range(&self, begin: usize, end: usize) -> std::io::Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        let end = if end == 0 { usize::MAX } else { end };
        let mut result = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let number = idx + 1;
            if number >= begin && number <= end {
                result.push(self.format_line(number, line));
            }
        }
        Ok(result)
    }

    pub fn read_whole(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}

/// Create an empty file (with parent directories) if nothing exists yet.
pub fn create_if_not_exists(path: &str) -> std::io::Result<()> {
    if Path::new(path).exists() {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, b"")
}

/// Whether `path` resolves outside the workspace root.
pub fn outside_root(root: &Path, path: &str) -> bool {
    let Ok(root) = root.canonicalize() else {
        return true;
    };
    let absolute = if Path::new(path).is_absolute() {
        Path::new(path).to_path_buf()
    } else {
        root.join(path)
    };
    // Canonicalize when possible; otherwise fold `.`/`..` lexically so a
    // not-yet-existing escape path is still caught.
    let resolved = absolute
        .canonicalize()
        .unwrap_or_else(|_| normalize_lexically(&absolute));
    !resolved.starts_with(&root)
}

fn normalize_lexically(path: &Path) -> std::path::PathBuf {
    use std::path::Component;
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Search/replace editor used by `edit_diff` and `edit_whole`.
pub struct Editor {
    pub path: String,
}

impl Editor {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn edit_whole(&self, content: &str) -> std::io::Result<()> {
        std::fs::write(&self.path, content)
    }

    /// Replace exactly one occurrence of `search` with `replace`.
    ///
    /// Matching is line-based: empty search lines are dropped and every line
    /// is compared with surrounding whitespace trimmed, so indentation
    /// differences do not break the match. Zero or multiple matches are
    /// errors surfaced to the model.
    pub fn edit_by_diff(&self, search: &str, replace: &str) -> Result<(), ToolError> {
        if search.trim().is_empty() {
            return Err(ToolError::Execution(
                "no match in file, please check your tool call".to_string(),
            ));
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|error| ToolError::Execution(error.to_string()))?;
        let all_lines: Vec<&str> = content.lines().collect();
        if all_lines.is_empty() {
            return Err(ToolError::Execution(
                "source file is empty, please check your tool call".to_string(),
            ));
        }

        let search_lines: Vec<&str> = search
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        let replace_lines: Vec<&str> = replace.lines().collect();

        let mut matches = 0usize;
        let mut start_idx = 0usize;
        let mut end_idx = 0usize;
        let mut cursor = 0usize;
        let mut candidate_start = 0usize;
        for (idx, line) in all_lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == search_lines[cursor].trim() {
                if cursor == 0 {
                    candidate_start = idx;
                }
                cursor += 1;
            } else {
                cursor = 0;
            }
            if cursor == search_lines.len() {
                matches += 1;
                start_idx = candidate_start;
                end_idx = idx;
                cursor = 0;
            }
        }

        if matches == 0 {
            return Err(ToolError::Execution(
                "no match in file, please check your tool call".to_string(),
            ));
        }
        if matches > 1 {
            return Err(ToolError::Execution(
                "multiple match in file, please expand code block in your search to match more precisely"
                    .to_string(),
            ));
        }

        let mut out = String::new();
        for line in &all_lines[..start_idx] {
            out.push_str(line);
            out.push('\n');
        }
        for line in &replace_lines {
            out.push_str(line);
            out.push('\n');
        }
        for line in &all_lines[end_idx + 1..] {
            out.push_str(line);
            out.push('\n');
        }
        self.edit_whole(&out)
            .map_err(|error| ToolError::Execution(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(content: &str) -> (tempfile::TempDir, String) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("file.txt");
        std::fs::write(&path, content).expect("seed file");
        (tmp, path.to_string_lossy().to_string())
    }

    #[test]
    fn read_lines_numbers_from_one() {
        let (_tmp, path) = temp_file("alpha\nbeta\n");
        let reader = FileReader::new(&path, 1000, true);
        let lines = reader.read_lines().expect("read");
        assert_eq!(lines, vec!["1|alpha\n".to_string(), "2|beta\n".to_string()]);
    }

    #[test]
    fn read_lines_respects_budget() {
        let (_tmp, path) = temp_file("a\nb\nc\nd\n");
        let reader = FileReader::new(&path, 2, true);
        let lines = reader.read_lines().expect("read");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("truncated"));
    }

    #[test]
    fn read_range_is_inclusive_and_open_ended() {
        let (_tmp, path) = temp_file("a\nb\nc\nd\n");
        let reader = FileReader::new(&path, 0, true);
        let lines = reader.read_range(2, 3).expect("range");
        assert_eq!(lines, vec!["2|b\n".to_string(), "3|c\n".to_string()]);
        let tail = reader.read_range(3, 0).expect("open range");
        assert_eq!(tail, vec!["3|c\n".to_string(), "4|d\n".to_string()]);
    }

    #[test]
    fn edit_by_diff_replaces_unique_match() {
        let (_tmp, path) = temp_file("fn main() {\n    old();\n}\n");
        let editor = Editor::new(&path);
        editor.edit_by_diff("    old();", "    new();").expect("edit");
        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(content, "fn main() {\n    new();\n}\n");
    }

    #[test]
    fn edit_by_diff_is_whitespace_insensitive() {
        let (_tmp, path) = temp_file("fn main() {\n        call();\n}\n");
        let editor = Editor::new(&path);
        editor.edit_by_diff("call();", "done();").expect("edit");
        assert!(std::fs::read_to_string(&path).expect("read").contains("done();"));
    }

    #[test]
    fn edit_by_diff_skips_empty_search_lines() {
        let (_tmp, path) = temp_file("one\ntwo\nthree\n");
        let editor = Editor::new(&path);
        editor.edit_by_diff("one\n\ntwo", "merged").expect("edit");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "merged\nthree\n");
    }

    #[test]
    fn edit_by_diff_rejects_zero_and_multiple_matches() {
        let (_tmp, path) = temp_file("alpha\nalpha\n");
        let editor = Editor::new(&path);
        let multiple = editor.edit_by_diff("alpha", "beta").unwrap_err();
        assert!(multiple.to_string().contains("multiple match"));
        let missing = editor.edit_by_diff("gamma", "beta").unwrap_err();
        assert!(missing.to_string().contains("no match"));
    }

    #[test]
    fn edit_whole_round_trip_is_identity() {
        let (_tmp, path) = temp_file("line one\nline two\n");
        let reader = FileReader::new(&path, 0, false);
        let original = reader.read_whole().expect("read");
        Editor::new(&path).edit_whole(&original).expect("write");
        assert_eq!(reader.read_whole().expect("reread"), original);
    }

    #[test]
    fn outside_root_detects_escapes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("inner")).expect("inner");
        assert!(!outside_root(tmp.path(), "inner"));
        assert!(outside_root(tmp.path(), "../elsewhere"));
        assert!(outside_root(tmp.path(), "/etc/passwd"));
    }

    #[test]
    fn create_if_not_exists_builds_parents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("a/b/c.txt");
        create_if_not_exists(&path.to_string_lossy()).expect("create");
        assert!(path.exists());
        std::fs::write(&path, "content").expect("fill");
        create_if_not_exists(&path.to_string_lossy()).expect("idempotent");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "content");
    }
}
