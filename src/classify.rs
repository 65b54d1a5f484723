//! Extension-based file classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Classification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Images,
    Documents,
    Videos,
    Audio,
    Archives,
    Code,
}

/// Lookup table; the first category listing an extension wins.
const CATEGORY_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Images,
        &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "ico"],
    ),
    (
        Category::Documents,
        &["doc", "docx", "pdf", "txt", "xlsx", "ppt", "pptx", "odt"],
    ),
    (
        Category::Videos,
        &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"],
    ),
    (Category::Audio, &["mp3", "wav", "flac", "m4a", "ogg", "aac"]),
    (Category::Archives, &["zip", "rar", "7z", "tar", "gz", "bz2"]),
    (
        Category::Code,
        &["py", "java", "cpp", "h", "js", "html", "css", "php"],
    ),
];

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Images,
        Category::Documents,
        Category::Videos,
        Category::Audio,
        Category::Archives,
        Category::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Images => "images",
            Category::Documents => "documents",
            Category::Videos => "videos",
            Category::Audio => "audio",
            Category::Archives => "archives",
            Category::Code => "code",
        }
    }

    /// Extensions (without the dot) mapped to this category
    pub fn extensions(&self) -> &'static [&'static str] {
        CATEGORY_TABLE
            .iter()
            .find(|(category, _)| category == self)
            .map(|(_, extensions)| *extensions)
            .unwrap_or(&[])
    }

    /// Look up a category by extension, case-insensitively
    pub fn from_extension(extension: &str) -> Option<Category> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        CATEGORY_TABLE
            .iter()
            .find(|(_, extensions)| extensions.contains(&extension.as_str()))
            .map(|(category, _)| *category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a path by its extension
pub fn classify<P: AsRef<Path>>(path: P) -> Option<Category> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Category::from_extension)
}
