//! FB2 markup events to [`Script`] operations.

use std::path::Path;

use tracing::debug;

use super::{PauseKind, Script};
use crate::error::Result;
use crate::markup::{Attributes, MarkupEvent, local_name, parse_markup, read_fb2_bytes};
use crate::normalize::{RuleNormalizer, TextNormalizer, text_size};
use crate::settings::Settings;

/// FB2 elements the compiler reacts to, matched by local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Body,
    Section,
    Title,
    Subtitle,
    /// `p`, `v` and `text-author`.
    Paragraph,
    EmptyLine,
    Emphasis,
    Strong,
    Sub,
    Sup,
    Link,
    Image,
    Binary,
    Epigraph,
    Poem,
    Stanza,
    Unknown,
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match local_name(name) {
            "body" => Tag::Body,
            "section" => Tag::Section,
            "title" => Tag::Title,
            "subtitle" => Tag::Subtitle,
            "p" | "v" | "text-author" => Tag::Paragraph,
            "empty-line" => Tag::EmptyLine,
            "emphasis" => Tag::Emphasis,
            "strong" => Tag::Strong,
            "sub" => Tag::Sub,
            "sup" => Tag::Sup,
            "a" => Tag::Link,
            "image" => Tag::Image,
            "binary" => Tag::Binary,
            "epigraph" => Tag::Epigraph,
            "poem" => Tag::Poem,
            "stanza" => Tag::Stanza,
            _ => Tag::Unknown,
        }
    }
}

/// Feeds markup events into a [`Script`].
///
/// Consecutive text events are joined into one run, flushed at the next
/// tag or the end of the stream, so a run split at entity references is
/// seen whole. Each run is normalized, probed for a leading dialogue dash,
/// accounted to the open block and appended, in that order.
pub struct ScriptCompiler<N: TextNormalizer> {
    script: Script,
    normalizer: N,
    /// One entry per open `<section>`: whether it opened a footnote.
    sections: Vec<bool>,
    /// Text received since the last tag.
    pending: String,
    done: bool,
}

impl<N: TextNormalizer> ScriptCompiler<N> {
    pub fn new(normalizer: N, section_size: usize) -> Self {
        Self {
            script: Script::new(section_size),
            normalizer,
            sections: Vec::new(),
            pending: String::new(),
            done: false,
        }
    }

    pub fn process(&mut self, event: MarkupEvent) {
        if let MarkupEvent::Text { value } = &event {
            self.pending.push_str(value);
            return;
        }
        self.flush_text();
        match event {
            MarkupEvent::Open { tag, attributes } => self.open(Tag::from_name(&tag), &attributes),
            MarkupEvent::Close { tag } => self.close(Tag::from_name(&tag)),
            MarkupEvent::Text { .. } => {}
            MarkupEvent::Done => self.done = true,
        }
    }

    /// Whether the event stream has ended.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn finish(mut self) -> Script {
        self.flush_text();
        self.script
    }

    fn flush_text(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let value = std::mem::take(&mut self.pending);
        self.text(&value);
    }

    fn open(&mut self, tag: Tag, attributes: &Attributes) {
        if self.script.is_ignoring_content() {
            return;
        }
        let script = &mut self.script;
        match tag {
            Tag::Body => script.open_body(attributes.get_local("name") == Some("notes")),
            Tag::Section => {
                script.break_section();
                let note = match attributes.get_local("id") {
                    Some(id) if script.is_in_notes() => {
                        script.open_note(id);
                        true
                    }
                    _ => false,
                };
                self.sections.push(note);
            }
            Tag::Title => {
                script.break_section();
                script.open_title();
            }
            Tag::Subtitle => {
                script.break_section();
                script.open_subtitle();
            }
            Tag::Paragraph => script.open_paragraph(),
            Tag::EmptyLine => script.add_pause(None),
            Tag::Emphasis => script.open_emphasis(),
            Tag::Strong => script.open_strong(),
            Tag::Sub => script.open_sub(),
            Tag::Sup => script.open_sup(),
            Tag::Link => {
                if attributes.get_local("type") == Some("note")
                    && let Some(name) = attributes
                        .get_local("href")
                        .and_then(|href| href.strip_prefix('#'))
                {
                    script.open_note_link(name);
                }
            }
            Tag::Image => {
                if let Some(id) = attributes.get_local("href") {
                    script.add_image(id.strip_prefix('#').unwrap_or(id));
                }
            }
            Tag::Binary => {
                let is_image = attributes
                    .get_local("content-type")
                    .is_none_or(|ct| ct.starts_with("image/"));
                if is_image && let Some(id) = attributes.get_local("id") {
                    if !script.open_binary(id) {
                        debug!("Nested binary {id} ignored");
                    }
                }
            }
            Tag::Epigraph => script.add_pause_as(PauseKind::Title),
            Tag::Stanza => script.add_pause_as(PauseKind::Sentence),
            Tag::Poem | Tag::Unknown => {}
        }
    }

    fn close(&mut self, tag: Tag) {
        if self.script.is_ignoring_content() {
            if tag == Tag::Link {
                self.script.close_note_link();
            }
            return;
        }
        let script = &mut self.script;
        match tag {
            Tag::Body => {
                script.close_body();
                self.sections.clear();
            }
            Tag::Section => {
                if self.sections.pop().unwrap_or(false) {
                    script.close_note();
                }
            }
            Tag::Title => script.close_title(),
            Tag::Subtitle => script.close_subtitle(),
            Tag::Paragraph => script.close_paragraph(),
            Tag::Emphasis => script.close_emphasis(),
            Tag::Strong => script.close_strong(),
            Tag::Sub => script.close_sub(),
            Tag::Sup => script.close_sup(),
            Tag::Binary => script.close_binary(),
            Tag::Epigraph | Tag::Poem => script.add_pause_as(PauseKind::Paragraph),
            _ => {}
        }
    }

    fn text(&mut self, value: &str) {
        let script = &mut self.script;
        if script.is_capturing_binary() {
            script.add_binary_text(value);
            return;
        }
        if !script.is_in_body() || script.is_ignoring_content() {
            return;
        }

        let text = self.normalizer.normalize(value);
        if starts_with_dialogue_dash(&text) {
            script.as_dialogue();
        } else {
            script.stop_dialogue();
        }
        script.add_block_size(text_size(&text));
        script.add_text(text);
    }
}

/// `^ *[-–—] `: optional spaces, a dash, then a space (breaking or not).
fn starts_with_dialogue_dash(text: &str) -> bool {
    let mut chars = text.trim_start_matches([' ', '\u{a0}']).chars();
    matches!(chars.next(), Some('-' | '–' | '—')) && matches!(chars.next(), Some(' ' | '\u{a0}'))
}

fn compiler_for(settings: &Settings) -> ScriptCompiler<RuleNormalizer> {
    ScriptCompiler::new(
        RuleNormalizer::from_transforms(&settings.transforms),
        settings.section_size,
    )
}

/// Compile an already decoded FB2 document.
pub fn compile_fb2_str(content: &str, settings: &Settings) -> Result<Script> {
    let mut compiler = compiler_for(settings);
    parse_markup(content, |event| compiler.process(event))?;
    Ok(compiler.finish())
}

/// Compile raw FB2 bytes, detecting their encoding.
pub fn compile_fb2_bytes(bytes: &[u8], settings: &Settings) -> Result<Script> {
    let mut compiler = compiler_for(settings);
    read_fb2_bytes(bytes, |event| compiler.process(event))?;
    Ok(compiler.finish())
}

pub fn compile_fb2_file(path: impl AsRef<Path>, settings: &Settings) -> Result<Script> {
    let path = path.as_ref();
    debug!("Compiling {}", path.display());
    let bytes = std::fs::read(path)?;
    compile_fb2_bytes(&bytes, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptItem;

    fn compile(body: &str) -> Script {
        let doc = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><FictionBook xmlns:l="http://www.w3.org/1999/xlink">{body}</FictionBook>"#
        );
        compile_fb2_str(&doc, &Settings::default()).unwrap()
    }

    fn texts(items: &[ScriptItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|i| match i {
                ScriptItem::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tag_from_name() {
        assert_eq!(Tag::from_name("fb:section"), Tag::Section);
        assert_eq!(Tag::from_name("text-author"), Tag::Paragraph);
        assert_eq!(Tag::from_name("table"), Tag::Unknown);
    }

    #[test]
    fn test_dialogue_dash_probe() {
        assert!(starts_with_dialogue_dash("— Hello"));
        assert!(starts_with_dialogue_dash("  - Hello"));
        assert!(!starts_with_dialogue_dash("—Hello"));
        assert!(!starts_with_dialogue_dash("Hello — there"));
        assert!(starts_with_dialogue_dash("—\u{a0}Hello"));
    }

    #[test]
    fn test_split_text_events_are_one_run() {
        let mut compiler = ScriptCompiler::new(|text: &str| text.to_string(), 10_000);
        compiler.process(MarkupEvent::Open {
            tag: "body".into(),
            attributes: Attributes::new(),
        });
        compiler.process(MarkupEvent::Open {
            tag: "p".into(),
            attributes: Attributes::new(),
        });
        for piece in ["—", " ", "Hi", "!"] {
            compiler.process(MarkupEvent::Text { value: piece.into() });
        }
        compiler.process(MarkupEvent::Close { tag: "p".into() });
        compiler.process(MarkupEvent::Done);

        let script = compiler.finish();
        assert!(script.items().contains(&ScriptItem::Dialogue { number: 0, closing: false }));
        assert_eq!(texts(script.items()), vec!["— Hi!"]);
    }

    #[test]
    fn test_pending_text_flushed_on_finish() {
        let mut compiler = ScriptCompiler::new(|text: &str| text.to_string(), 10_000);
        compiler.process(MarkupEvent::Open {
            tag: "body".into(),
            attributes: Attributes::new(),
        });
        compiler.process(MarkupEvent::Text { value: "tail".into() });
        assert_eq!(texts(compiler.script().items()), Vec::<&str>::new());
        assert_eq!(texts(compiler.finish().items()), vec!["tail"]);
    }

    #[test]
    fn test_single_paragraph() {
        let script = compile("<body><section><p>Hello world.</p></section></body>");
        assert_eq!(
            script.items(),
            &[
                ScriptItem::Section { number: 1 },
                ScriptItem::Paragraph { size: 10, closing: false, inherit_voice: false },
                ScriptItem::Text { text: "Hello world.".into() },
                ScriptItem::Paragraph { size: 0, closing: true, inherit_voice: false },
            ]
        );
    }

    #[test]
    fn test_description_text_is_skipped() {
        let script = compile(
            "<description><title-info><book-title>Book</book-title></title-info></description>\
             <body><p>Text</p></body>",
        );
        assert_eq!(texts(script.items()), vec!["Text"]);
    }

    #[test]
    fn test_dialogue_paragraphs() {
        let script = compile("<body><p>— Hi.</p><p>— Yes?</p><p>Silence.</p></body>");
        let dialogue: Vec<_> = script
            .items()
            .iter()
            .filter_map(|i| match i {
                ScriptItem::Dialogue { number, closing } => Some((*number, *closing)),
                _ => None,
            })
            .collect();
        assert_eq!(dialogue, vec![(0, false), (0, true), (1, false), (1, true)]);
    }

    #[test]
    fn test_note_link_and_notes_body() {
        let script = compile(
            r##"<body><p>Word<a l:href="#n1" type="note">[1]</a> more.</p></body>
                <body name="notes"><title><p>Notes</p></title>
                <section id="n1"><title><p>1</p></title><p>The note.</p></section></body>"##,
        );
        assert_eq!(texts(script.items()), vec!["Word", " more."]);
        assert!(script.items().contains(&ScriptItem::Note { name: "n1".into() }));
        assert_eq!(texts(script.footnotes("n1").unwrap()), vec!["1", "The note."]);
        assert_eq!(script.notes().len(), 1);
    }

    #[test]
    fn test_plain_link_text_is_read() {
        let script = compile(r##"<body><p><a l:href="http://x">site</a></p></body>"##);
        assert_eq!(texts(script.items()), vec!["site"]);
    }

    #[test]
    fn test_images_and_binary() {
        let script = compile(
            r##"<body><image l:href="#pic.png"/><p>After</p></body>
                <binary id="pic.png" content-type="image/png">iVBO
                Rw==</binary>"##,
        );
        assert!(script.items().contains(&ScriptItem::Image { id: "pic.png".into() }));
        assert_eq!(script.image("pic.png"), Some(&[0x89, 0x50, 0x4E, 0x47][..]));
    }

    #[test]
    fn test_empty_line_and_poem_pauses() {
        let script = compile("<body><empty-line/><poem><stanza><v>Line</v></stanza></poem></body>");
        let pauses: Vec<_> = script
            .items()
            .iter()
            .filter_map(|i| match i {
                ScriptItem::Pause { seconds, kind } => Some((*seconds, *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(
            pauses,
            vec![
                (None, None),
                (None, Some(PauseKind::Sentence)),
                (None, Some(PauseKind::Paragraph)),
            ]
        );
    }

    #[test]
    fn test_custom_normalizer_is_used() {
        let mut compiler = ScriptCompiler::new(|text: &str| text.to_uppercase(), 100);
        parse_markup("<body><p>quiet</p></body>", |e| compiler.process(e)).unwrap();
        assert!(compiler.is_done());
        assert_eq!(texts(compiler.script().items()), vec!["QUIET"]);
    }
}
