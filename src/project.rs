//! On-disk layout of one book's output directory.
//!
//! ```text
//! <root>/book.json      compiled fragments, reused by later runs
//! <root>/parts/         one clip per chunk
//! <root>/audio/         one file per section
//! <root>/images/        exported <binary> images
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::driver::{AUDIO_DIR, PARTS_DIR};
use crate::error::Result;
use crate::fragments::{SpeechFragment, compile_fragments};
use crate::script::{Script, compile_fb2_file};
use crate::settings::Settings;
use crate::util::detect_image_format;

const BOOK_JSON: &str = "book.json";
const IMAGES_DIR: &str = "images";

/// What [`BookProject::prepare`] does besides producing fragments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Ignore an existing `book.json`.
    pub recompile: bool,
    /// Write the book's images to `images/`.
    pub export_images: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookProject {
    root: PathBuf,
}

impl BookProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output directory next to the book: `books/novel.fb2` -> `books/novel`.
    pub fn for_book(book: &Path) -> Self {
        Self::new(book.with_extension(""))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn book_json(&self) -> PathBuf {
        self.root.join(BOOK_JSON)
    }

    pub fn parts_dir(&self) -> PathBuf {
        self.root.join(PARTS_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Fragments saved by an earlier compilation, if any.
    pub fn load_fragments(&self) -> Result<Option<Vec<SpeechFragment>>> {
        let path = self.book_json();
        if !path.is_file() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let fragments = serde_json::from_str(&json)?;
        debug!("Loaded {}", path.display());
        Ok(Some(fragments))
    }

    pub fn save_fragments(&self, fragments: &[SpeechFragment]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(fragments)?;
        fs::write(self.book_json(), json)?;
        info!("Saved {} fragments to {}", fragments.len(), self.book_json().display());
        Ok(())
    }

    /// Write every captured image as `images/<id>.<ext>`, the extension
    /// sniffed from its content. Returns the number written.
    pub fn export_images(&self, script: &Script) -> Result<usize> {
        let dir = self.images_dir();
        let mut written = 0;
        for (id, data) in script.images() {
            if written == 0 {
                fs::create_dir_all(&dir)?;
            }
            let stem = Path::new(id)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(id);
            let name = format!("{stem}.{}", detect_image_format(data).extension());
            fs::write(dir.join(&name), data)?;
            debug!("Exported image {name}");
            written += 1;
        }
        Ok(written)
    }

    /// Fragments for `book`: reused from `book.json` unless
    /// `options.recompile` is set, otherwise compiled and saved. The book is
    /// parsed at most once, also when its images are exported.
    pub fn prepare(
        &self,
        book: &Path,
        settings: &Settings,
        options: PrepareOptions,
    ) -> Result<Vec<SpeechFragment>> {
        let saved = if options.recompile {
            None
        } else {
            self.load_fragments()?
        };
        if let Some(fragments) = &saved {
            info!("Using compiled fragments from {}", self.book_json().display());
            if !options.export_images {
                return Ok(fragments.clone());
            }
        }

        let script = compile_fb2_file(book, settings)?;
        if options.export_images {
            let count = self.export_images(&script)?;
            info!("Exported {count} images to {}", self.images_dir().display());
        }

        match saved {
            Some(fragments) => Ok(fragments),
            None => {
                let fragments = compile_fragments(&script, settings);
                self.save_fragments(&fragments)?;
                Ok(fragments)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::compile_fb2_str;
    use crate::settings::Emotion;
    use tempfile::TempDir;

    #[test]
    fn test_for_book_strips_extension() {
        let project = BookProject::for_book(Path::new("books/novel.fb2"));
        assert_eq!(project.root(), Path::new("books/novel"));
        assert_eq!(project.parts_dir(), Path::new("books/novel/parts"));
        assert_eq!(project.book_json(), Path::new("books/novel/book.json"));
    }

    #[test]
    fn test_fragments_round_trip_through_book_json() {
        let dir = TempDir::new().unwrap();
        let project = BookProject::new(dir.path().join("out"));
        assert_eq!(project.load_fragments().unwrap(), None);

        let fragments = vec![SpeechFragment {
            language: "ru-RU".into(),
            voice: "zahar".into(),
            emotion: Emotion::Evil,
            speed: 1.1,
            section: 3,
            content: "<break time=\"3s\"/>Глава".into(),
        }];
        project.save_fragments(&fragments).unwrap();
        assert_eq!(project.load_fragments().unwrap(), Some(fragments));
    }

    #[test]
    fn test_prepare_exports_images_alongside_saved_fragments() {
        let dir = TempDir::new().unwrap();
        let book = dir.path().join("book.fb2");
        fs::write(
            &book,
            r#"<FictionBook><body><p>Text.</p></body><binary id="pic.png" content-type="image/png">iVBORw==</binary></FictionBook>"#,
        )
        .unwrap();
        let project = BookProject::for_book(&book);
        let settings = Settings::default();

        let compiled = project.prepare(&book, &settings, PrepareOptions::default()).unwrap();
        assert!(!project.images_dir().exists());

        let mut edited = compiled.clone();
        edited[0].content = "Edited.".into();
        project.save_fragments(&edited).unwrap();

        let options = PrepareOptions {
            export_images: true,
            ..PrepareOptions::default()
        };
        assert_eq!(project.prepare(&book, &settings, options).unwrap(), edited);
        assert!(project.images_dir().join("pic.png").is_file());
    }

    #[test]
    fn test_export_images_sniffs_extension() {
        let dir = TempDir::new().unwrap();
        let project = BookProject::new(dir.path());
        let script = compile_fb2_str(
            r#"<FictionBook><binary id="cover.jpg" content-type="image/jpeg">iVBORw==</binary></FictionBook>"#,
            &Settings::default(),
        )
        .unwrap();

        assert_eq!(project.export_images(&script).unwrap(), 1);
        let data = fs::read(project.images_dir().join("cover.png")).unwrap();
        assert_eq!(data, [0x89, 0x50, 0x4E, 0x47]);
    }
}
