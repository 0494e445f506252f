use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Ignore filter compiled from `.gitignore` and `.bergoignore` at the
/// workspace root. Missing files are simply skipped.
#[derive(Debug)]
pub struct IgnoreRules {
    matchers: Vec<Gitignore>,
}

impl IgnoreRules {
    pub fn new(root: impl AsRef<Path>, ignore_files: &[&str]) -> Self {
        let root = root.as_ref();
        let mut matchers = Vec::new();
        for ignore_file in ignore_files {
            let path = root.join(ignore_file);
            if !path.is_file() {
                continue;
            }
            let mut builder = GitignoreBuilder::new(root);
            if builder.add(&path).is_some() {
                continue;
            }
            if let Ok(matcher) = builder.build() {
                matchers.push(matcher);
            }
        }
        Self { matchers }
    }

    /// Standard filter for a workspace root.
    pub fn standard(root: impl AsRef<Path>) -> Self {
        Self::new(root, &[".gitignore", ".bergoignore"])
    }

    pub fn matches_path(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let is_dir = path.is_dir();
        self.matchers
            .iter()
            .any(|matcher| matcher.matched_path_or_any_parents(path, is_dir).is_ignore())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honors_both_ignore_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join(".gitignore"), "target/\n").expect("gitignore");
        std::fs::write(tmp.path().join(".bergoignore"), "*.log\n").expect("bergoignore");
        std::fs::create_dir_all(tmp.path().join("target")).expect("target");
        std::fs::write(tmp.path().join("trace.log"), "x").expect("log");
        std::fs::write(tmp.path().join("main.rs"), "x").expect("src");

        let rules = IgnoreRules::standard(tmp.path());
        assert!(rules.matches_path(tmp.path().join("target")));
        assert!(rules.matches_path(tmp.path().join("trace.log")));
        assert!(!rules.matches_path(tmp.path().join("main.rs")));
    }

    #[test]
    fn missing_ignore_files_match_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let rules = IgnoreRules::standard(tmp.path());
        assert!(!rules.matches_path(tmp.path().join("anything.txt")));
    }
}
