use crate::ignore_rules::IgnoreRules;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    File,
    Directory,
    Image,
}

/// A `@file:`/`@img:` reference extracted from the user line. The `index`
/// matches the `[bergo-attch N]` placeholder left in the input text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub index: usize,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
}

const IMAGE_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

pub fn is_image_file(path: &str) -> bool {
    image_mime_type(path).is_some()
}

fn image_mime_type(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

impl Attachment {
    pub fn file(index: usize, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
            kind: AttachmentKind::File,
        }
    }

    pub fn directory(index: usize, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
            kind: AttachmentKind::Directory,
        }
    }

    pub fn image(index: usize, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
            kind: AttachmentKind::Image,
        }
    }

    /// Base64 data URL for an image attachment.
    pub fn image_data_url(&self) -> std::io::Result<String> {
        let data = std::fs::read(&self.path)?;
        let mime = image_mime_type(&self.path).unwrap_or("image/jpeg");
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        Ok(format!("data:{mime};base64,{encoded}"))
    }

    /// Textual rendering inside the `<attachments>` block.
    pub fn render(&self) -> String {
        match self.kind {
            AttachmentKind::File => {
                let Ok(content) = std::fs::read_to_string(&self.path) else {
                    return String::new();
                };
                format!(
                    "{}. file {} submitted as attachment:\n{}",
                    self.index, self.path, content
                )
            }
            AttachmentKind::Directory => {
                let rules = IgnoreRules::standard(&self.path);
                let listing = list_directory(Path::new(&self.path), Path::new(&self.path), &rules);
                format!(
                    "{}. directory {} submitted as attachment:\n{}",
                    self.index, self.path, listing
                )
            }
            AttachmentKind::Image => {
                format!("{}. image {} submitted as attachment\n", self.index, self.path)
            }
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Recursive listing with directories marked by a trailing slash, hidden
/// entries skipped, and ignore rules honored.
fn list_directory(root: &Path, dir: &Path, rules: &IgnoreRules) -> String {
    let mut out = String::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) || rules.matches_path(&path) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy();
        if path.is_dir() {
            let _ = writeln!(out, "{relative}/");
            out.push_str(&list_directory(root, &path, rules));
        } else {
            let _ = writeln!(out, "{relative}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_attachment_renders_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("note.txt");
        std::fs::write(&file, "hello\n").expect("write");
        let attachment = Attachment::file(1, file.to_string_lossy());
        let rendered = attachment.render();
        assert!(rendered.starts_with("1. file"));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn directory_attachment_lists_recursively_and_skips_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join(".gitignore"), "skipme/\n").expect("gitignore");
        std::fs::create_dir_all(tmp.path().join("src")).expect("src");
        std::fs::create_dir_all(tmp.path().join("skipme")).expect("skipme");
        std::fs::write(tmp.path().join("src/main.rs"), "fn main() {}\n").expect("main");
        std::fs::write(tmp.path().join("skipme/data.bin"), "x").expect("data");

        let attachment = Attachment::directory(2, tmp.path().to_string_lossy());
        let rendered = attachment.render();
        assert!(rendered.contains("src/"));
        assert!(rendered.contains("src/main.rs"));
        assert!(!rendered.contains("skipme"));
    }

    #[test]
    fn image_data_url_carries_mime_type() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("shot.png");
        std::fs::write(&file, [0x89, 0x50, 0x4e, 0x47]).expect("png bytes");
        let attachment = Attachment::image(1, file.to_string_lossy());
        let url = attachment.image_data_url().expect("data url");
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn image_extension_detection() {
        assert!(is_image_file("a/b/photo.JPG"));
        assert!(is_image_file("x.webp"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("no_extension"));
    }
}
