//! # fb2speech
//!
//! Turn FB2 ebooks into per-chapter audiobooks through a speech-synthesis API.
//!
//! ## Pipeline
//!
//! - [`script`]: FB2 markup to a flat [`Script`] of reading instructions,
//!   with footnotes and images collected on the side
//! - [`fragments`]: the script to [`SpeechFragment`]s, runs of SSML sharing
//!   one voice, emotion, speed and section
//! - [`chunk`]: fragment content to request-sized pieces
//! - [`driver`]: chunks to audio clips, assembled per section, resumable
//!
//! ## Quick Start
//!
//! ```no_run
//! use fb2speech::{Settings, compile_fb2_file, compile_fragments};
//!
//! let settings = Settings::default();
//! let script = compile_fb2_file("book.fb2", &settings).unwrap();
//! for fragment in compile_fragments(&script, &settings) {
//!     println!("[{}] {}", fragment.voice, fragment.content);
//! }
//! ```
//!
//! ## Voicing a Book
//!
//! ```no_run
//! use std::path::Path;
//! use fb2speech::{BookProject, PrepareOptions, Settings, SpeechKit, SynthesisDriver, concatenator_for};
//!
//! let settings = Settings::load(Path::new("settings.json")).unwrap();
//! let book = Path::new("book.fb2");
//! let project = BookProject::for_book(book);
//! let fragments = project.prepare(book, &settings, PrepareOptions::default()).unwrap();
//!
//! let synthesizer = SpeechKit::from_settings(&settings).unwrap();
//! let concatenator = concatenator_for(settings.concat_tool);
//! let driver = SynthesisDriver::new(&synthesizer, concatenator.as_ref(), &settings);
//! driver.run(&fragments, project.root()).unwrap();
//! ```

pub mod chunk;
pub mod concat;
pub mod driver;
pub mod error;
pub mod fragments;
pub mod markup;
pub mod normalize;
pub mod project;
pub mod script;
pub mod settings;
pub mod speech;
pub mod ssml;
pub(crate) mod util;

pub use chunk::split_content;
pub use concat::{Concatenator, FfmpegConcat, SoxConcat, concatenator_for};
pub use driver::{RunSummary, SynthesisDriver, find_last_part, part_name};
pub use error::{Error, Result};
pub use fragments::{FragmentCompiler, SpeechFragment, compile_fragments};
pub use markup::{MarkupEvent, parse_markup, read_fb2_file};
pub use normalize::{RuleNormalizer, TextNormalizer};
pub use project::{BookProject, PrepareOptions};
pub use script::{Script, ScriptCompiler, ScriptItem, compile_fb2_bytes, compile_fb2_file, compile_fb2_str};
pub use settings::Settings;
pub use speech::{SpeechKit, SynthesisRequest, Synthesizer};
