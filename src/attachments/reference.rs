//! Finding file references in message text and classifying them.

use regex::Regex;
use std::sync::OnceLock;

use crate::extraction::{DOCX_MIME, DOC_MIME, PDF_MIME};

fn link_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!?\[[^\]]*\]\(\s*([^)\s]+)\s*\)").expect("link pattern is valid")
    })
}

/// A markdown link or image link pointing into file storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// The full markdown, e.g. `![Foto](/uploads/a.png)`
    pub markdown: String,
    /// Storage path, e.g. `/uploads/a.png`
    pub target: String,
}

impl FileReference {
    /// Last path segment of the target, without query or fragment.
    pub fn display_name(&self) -> &str {
        let path = strip_query(&self.target);
        path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
    }
}

/// All storage links in `text`, in order of appearance.
pub fn find_references(text: &str, prefixes: &[String]) -> Vec<FileReference> {
    link_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let target = caps.get(1)?.as_str();
            if !prefixes.iter().any(|p| target.starts_with(p.as_str())) {
                return None;
            }
            Some(FileReference {
                markdown: caps.get(0)?.as_str().to_string(),
                target: target.to_string(),
            })
        })
        .collect()
}

/// Handling class of a file, carrying its mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image(&'static str),
    Document(&'static str),
}

impl FileKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            FileKind::Image(mime) | FileKind::Document(mime) => mime,
        }
    }
}

/// Lowercased extension of a file name or path, if any.
pub fn extension(name: &str) -> Option<String> {
    let path = strip_query(name);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Classify by extension. `None` for unsupported types.
pub fn classify(name: &str) -> Option<FileKind> {
    let kind = match extension(name)?.as_str() {
        "png" => FileKind::Image("image/png"),
        "jpg" | "jpeg" => FileKind::Image("image/jpeg"),
        "gif" => FileKind::Image("image/gif"),
        "webp" => FileKind::Image("image/webp"),
        "pdf" => FileKind::Document(PDF_MIME),
        "docx" => FileKind::Document(DOCX_MIME),
        "doc" => FileKind::Document(DOC_MIME),
        _ => return None,
    };
    Some(kind)
}

fn strip_query(target: &str) -> &str {
    target
        .split(['?', '#'])
        .next()
        .unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["/uploads/".into(), "/api/documents/".into()]
    }

    #[test]
    fn test_finds_links_and_images() {
        let text = "Sieh ![Foto](/uploads/cat.PNG) und [Vertrag](/api/documents/doc123) an, nicht [Web](https://example.com/a.pdf).";
        let refs = find_references(text, &prefixes());

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].markdown, "![Foto](/uploads/cat.PNG)");
        assert_eq!(refs[0].display_name(), "cat.PNG");
        assert_eq!(refs[1].markdown, "[Vertrag](/api/documents/doc123)");
        assert_eq!(refs[1].target, "/api/documents/doc123");
    }

    #[test]
    fn test_no_references() {
        assert!(find_references("Hallo [du](#anker)", &prefixes()).is_empty());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("/uploads/cat.PNG"), Some(FileKind::Image("image/png")));
        assert_eq!(classify("a.jpeg?v=2"), Some(FileKind::Image("image/jpeg")));
        assert_eq!(classify("bericht.pdf").map(FileKind::mime_type), Some(PDF_MIME));
        assert_eq!(classify("alt.doc"), Some(FileKind::Document(DOC_MIME)));
        assert_eq!(classify("daten.csv"), None);
        assert_eq!(classify("/api/documents/doc123"), None);
        assert_eq!(extension("/api/documents/doc123"), None);
        assert_eq!(extension(".hidden"), None);
    }
}
