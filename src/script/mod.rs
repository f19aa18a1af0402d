//! The script: a flat, ordered list of reading instructions built from an
//! FB2 document.
//!
//! [`Script`] is the state machine behind the document compiler. It is fed
//! block and inline open/close operations plus normalized text, and records
//! them as [`ScriptItem`]s. Footnote bodies are routed to a side map keyed by
//! note id, and `<binary>` payloads are captured into an image map.
//!
//! Operations never fail. Anything arriving in the wrong state (a close
//! without an open, text outside a body, a second binary capture) is
//! silently ignored, so malformed books still produce a usable script.

mod compiler;

pub use compiler::{ScriptCompiler, Tag, compile_fb2_bytes, compile_fb2_file, compile_fb2_str};

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

/// Valuable characters a section must hold before another one may start.
pub const DEFAULT_SECTION_SIZE: usize = 10_000;

/// Which block shape a symbolic pause imitates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    Title,
    Paragraph,
    Sentence,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptItem {
    Section {
        number: u32,
    },
    Paragraph {
        size: usize,
        closing: bool,
        /// Opened inside a title: keeps the title voice.
        inherit_voice: bool,
    },
    /// Titles and subtitles.
    Title {
        size: usize,
        closing: bool,
    },
    Emphasis {
        closing: bool,
    },
    Strong {
        closing: bool,
    },
    Sub {
        closing: bool,
    },
    Sup {
        closing: bool,
    },
    Dialogue {
        number: u32,
        closing: bool,
    },
    Pause {
        seconds: Option<f32>,
        kind: Option<PauseKind>,
    },
    Text {
        text: String,
    },
    /// Reference to a footnote body, resolved by the fragment compiler.
    Note {
        name: String,
    },
    Image {
        id: String,
    },
}

impl ScriptItem {
    /// `Some(closing)` for items that open or close a span.
    pub fn closing(&self) -> Option<bool> {
        match self {
            ScriptItem::Paragraph { closing, .. }
            | ScriptItem::Title { closing, .. }
            | ScriptItem::Emphasis { closing }
            | ScriptItem::Strong { closing }
            | ScriptItem::Sub { closing }
            | ScriptItem::Sup { closing }
            | ScriptItem::Dialogue { closing, .. } => Some(*closing),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct State {
    in_body: bool,
    in_notes: bool,
    in_paragraph: bool,
    in_title: bool,
    in_subtitle: bool,
    in_emphasis: bool,
    in_strong: bool,
    in_sub: bool,
    in_sup: bool,
    ignore_content: bool,
}

/// Location of an appended item: the main list or a footnote list.
#[derive(Debug, Clone)]
struct ItemRef {
    note: Option<String>,
    index: usize,
}

#[derive(Debug)]
struct BinaryCapture {
    id: String,
    buffer: String,
}

#[derive(Debug)]
pub struct Script {
    items: Vec<ScriptItem>,
    notes: HashMap<String, Vec<ScriptItem>>,
    images: BTreeMap<String, Vec<u8>>,
    state: State,
    section_threshold: usize,
    last_section: u32,
    last_block: Option<ItemRef>,
    last_dialogue: Option<u32>,
    section_size: usize,
    current_note: Option<String>,
    binary: Option<BinaryCapture>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION_SIZE)
    }
}

impl Script {
    /// Create an empty script seeded with section 1.
    pub fn new(section_threshold: usize) -> Self {
        Self {
            items: vec![ScriptItem::Section { number: 1 }],
            notes: HashMap::new(),
            images: BTreeMap::new(),
            state: State::default(),
            section_threshold,
            last_section: 1,
            last_block: None,
            last_dialogue: None,
            section_size: 0,
            current_note: None,
            binary: None,
        }
    }

    // --- Terminal accessors ---

    pub fn items(&self) -> &[ScriptItem] {
        &self.items
    }

    /// Items of one footnote body.
    pub fn footnotes(&self, name: &str) -> Option<&[ScriptItem]> {
        self.notes.get(name).map(Vec::as_slice)
    }

    pub fn notes(&self) -> &HashMap<String, Vec<ScriptItem>> {
        &self.notes
    }

    /// Captured images in id order.
    pub fn images(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.images
            .iter()
            .map(|(id, data)| (id.as_str(), data.as_slice()))
    }

    pub fn image(&self, id: &str) -> Option<&[u8]> {
        self.images.get(id).map(Vec::as_slice)
    }

    // --- State probes ---

    pub fn is_in_body(&self) -> bool {
        self.state.in_body
    }

    pub fn is_in_notes(&self) -> bool {
        self.state.in_notes
    }

    pub fn is_ignoring_content(&self) -> bool {
        self.state.ignore_content
    }

    pub fn is_capturing_binary(&self) -> bool {
        self.binary.is_some()
    }

    // --- Bodies and footnotes ---

    pub fn open_body(&mut self, notes: bool) {
        if self.state.ignore_content {
            return;
        }
        self.state.in_body = true;
        if notes {
            self.state.in_notes = true;
        }
    }

    pub fn close_body(&mut self) {
        if self.state.ignore_content || !self.state.in_body {
            return;
        }
        self.close_all_content_tags();
        self.close_title();
        self.end_dialogue();
        self.state.in_body = false;
        self.state.in_notes = false;
        self.current_note = None;
    }

    /// Start collecting a footnote body. Only meaningful inside notes.
    pub fn open_note(&mut self, name: &str) {
        if self.state.ignore_content || !self.state.in_notes {
            return;
        }
        self.current_note = Some(name.to_string());
    }

    pub fn close_note(&mut self) {
        if self.state.ignore_content {
            return;
        }
        self.current_note = None;
    }

    /// Reference a footnote and suppress the link's own text until
    /// [`close_note_link`](Self::close_note_link).
    pub fn open_note_link(&mut self, name: &str) {
        if self.state.ignore_content || !self.state.in_body {
            return;
        }
        self.push_item(ScriptItem::Note {
            name: name.to_string(),
        });
        self.state.ignore_content = true;
    }

    pub fn close_note_link(&mut self) {
        self.state.ignore_content = false;
    }

    // --- Text ---

    pub fn add_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.state.in_body
            || self.state.ignore_content
            || (!self.state.in_paragraph && !self.state.in_subtitle && text == " ")
        {
            return;
        }
        self.push_item(ScriptItem::Text { text });
    }

    /// Account normalized text size to the open block and the section.
    pub fn add_block_size(&mut self, size: usize) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        if let Some(block) = self.last_block.clone()
            && let Some(
                ScriptItem::Paragraph { size: block_size, .. }
                | ScriptItem::Title { size: block_size, .. },
            ) = self.item_mut(&block)
        {
            *block_size += size;
        }
        self.section_size += size;
    }

    /// Start a new section if enough text has accumulated since the last one.
    pub fn break_section(&mut self) {
        if !self.state.in_body
            || self.state.in_notes
            || self.state.ignore_content
            || self.section_size < self.section_threshold
        {
            return;
        }
        self.last_section += 1;
        self.section_size = 0;
        self.push_item(ScriptItem::Section {
            number: self.last_section,
        });
    }

    // --- Blocks ---

    pub fn open_paragraph(&mut self) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        self.close_all_content_tags();
        self.last_block = self.push_item(ScriptItem::Paragraph {
            size: 0,
            closing: false,
            inherit_voice: self.state.in_title,
        });
        self.state.in_paragraph = true;
    }

    pub fn close_paragraph(&mut self) {
        if !self.state.in_paragraph || self.state.ignore_content {
            return;
        }
        self.state.in_paragraph = false;
        self.push_item(ScriptItem::Paragraph {
            size: 0,
            closing: true,
            inherit_voice: self.state.in_title,
        });
    }

    pub fn open_title(&mut self) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        self.close_all_content_tags();
        self.last_block = self.push_item(ScriptItem::Title {
            size: 0,
            closing: false,
        });
        self.state.in_title = true;
    }

    pub fn close_title(&mut self) {
        if !self.state.in_title || self.state.ignore_content {
            return;
        }
        self.close_all_content_tags();
        self.state.in_title = false;
        self.push_item(ScriptItem::Title {
            size: 0,
            closing: true,
        });
    }

    pub fn open_subtitle(&mut self) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        self.close_all_content_tags();
        self.last_block = self.push_item(ScriptItem::Title {
            size: 0,
            closing: false,
        });
        self.state.in_subtitle = true;
    }

    pub fn close_subtitle(&mut self) {
        if !self.state.in_subtitle || self.state.ignore_content {
            return;
        }
        self.state.in_subtitle = false;
        self.push_item(ScriptItem::Title {
            size: 0,
            closing: true,
        });
    }

    // --- Inline spans ---

    pub fn open_emphasis(&mut self) {
        if self.open_inline(|s| &mut s.in_emphasis) {
            self.push_item(ScriptItem::Emphasis { closing: false });
        }
    }

    pub fn close_emphasis(&mut self) {
        if self.close_inline(|s| &mut s.in_emphasis) {
            self.push_item(ScriptItem::Emphasis { closing: true });
        }
    }

    pub fn open_strong(&mut self) {
        if self.open_inline(|s| &mut s.in_strong) {
            self.push_item(ScriptItem::Strong { closing: false });
        }
    }

    pub fn close_strong(&mut self) {
        if self.close_inline(|s| &mut s.in_strong) {
            self.push_item(ScriptItem::Strong { closing: true });
        }
    }

    pub fn open_sub(&mut self) {
        if self.open_inline(|s| &mut s.in_sub) {
            self.push_item(ScriptItem::Sub { closing: false });
        }
    }

    pub fn close_sub(&mut self) {
        if self.close_inline(|s| &mut s.in_sub) {
            self.push_item(ScriptItem::Sub { closing: true });
        }
    }

    pub fn open_sup(&mut self) {
        if self.open_inline(|s| &mut s.in_sup) {
            self.push_item(ScriptItem::Sup { closing: false });
        }
    }

    pub fn close_sup(&mut self) {
        if self.close_inline(|s| &mut s.in_sup) {
            self.push_item(ScriptItem::Sup { closing: true });
        }
    }

    fn open_inline(&mut self, flag: fn(&mut State) -> &mut bool) -> bool {
        if !self.state.in_body || self.state.ignore_content || *flag(&mut self.state) {
            return false;
        }
        *flag(&mut self.state) = true;
        true
    }

    fn close_inline(&mut self, flag: fn(&mut State) -> &mut bool) -> bool {
        if self.state.ignore_content || !*flag(&mut self.state) {
            return false;
        }
        *flag(&mut self.state) = false;
        true
    }

    // --- Dialogue ---

    /// Mark the open paragraph as a dialogue line. Only effective before any
    /// text of the paragraph has been accounted.
    pub fn as_dialogue(&mut self) {
        if self.state.ignore_content || !self.at_beginning_of_paragraph() {
            return;
        }
        let number = match self.last_dialogue {
            Some(previous) => {
                self.push_item(ScriptItem::Dialogue {
                    number: previous,
                    closing: true,
                });
                previous + 1
            }
            None => 0,
        };
        self.last_dialogue = Some(number);
        self.push_item(ScriptItem::Dialogue {
            number,
            closing: false,
        });
    }

    /// End the running dialogue at the start of a non-dialogue paragraph.
    pub fn stop_dialogue(&mut self) {
        if self.state.ignore_content
            || self.last_dialogue.is_none()
            || !self.at_beginning_of_paragraph()
        {
            return;
        }
        self.end_dialogue();
    }

    fn end_dialogue(&mut self) {
        if let Some(number) = self.last_dialogue.take() {
            self.push_item(ScriptItem::Dialogue {
                number,
                closing: true,
            });
        }
    }

    // --- Pauses, images ---

    /// Timed pause; `None` uses the configured default.
    pub fn add_pause(&mut self, seconds: Option<f32>) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        self.push_item(ScriptItem::Pause {
            seconds,
            kind: None,
        });
    }

    /// Pause shaped like the separator of a title, paragraph or sentence.
    pub fn add_pause_as(&mut self, kind: PauseKind) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        self.push_item(ScriptItem::Pause {
            seconds: None,
            kind: Some(kind),
        });
    }

    pub fn add_image(&mut self, id: &str) {
        if !self.state.in_body || self.state.ignore_content {
            return;
        }
        self.push_item(ScriptItem::Image { id: id.to_string() });
    }

    // --- Binary capture ---

    /// Start capturing a base64 payload. Rejected while another capture is
    /// active.
    pub fn open_binary(&mut self, id: &str) -> bool {
        if self.binary.is_some() || self.state.ignore_content {
            return false;
        }
        self.binary = Some(BinaryCapture {
            id: id.to_string(),
            buffer: String::new(),
        });
        true
    }

    pub fn add_binary_text(&mut self, text: &str) {
        if let Some(capture) = &mut self.binary {
            capture.buffer.push_str(text);
        }
    }

    /// Decode the captured payload into the image map.
    pub fn close_binary(&mut self) {
        let Some(capture) = self.binary.take() else {
            return;
        };
        let encoded: String = capture
            .buffer
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if encoded.is_empty() {
            return;
        }
        match STANDARD.decode(encoded.as_bytes()) {
            Ok(data) => {
                self.images.insert(capture.id, data);
            }
            Err(e) => warn!("Dropping binary {}: {e}", capture.id),
        }
    }

    // --- Internals ---

    fn at_beginning_of_paragraph(&self) -> bool {
        if !self.state.in_paragraph {
            return false;
        }
        match self.last_block.as_ref().and_then(|block| self.item(block)) {
            Some(ScriptItem::Paragraph { size, .. } | ScriptItem::Title { size, .. }) => {
                *size == 0
            }
            _ => false,
        }
    }

    fn item(&self, at: &ItemRef) -> Option<&ScriptItem> {
        match &at.note {
            Some(name) => self.notes.get(name)?.get(at.index),
            None => self.items.get(at.index),
        }
    }

    fn item_mut(&mut self, at: &ItemRef) -> Option<&mut ScriptItem> {
        match &at.note {
            Some(name) => self.notes.get_mut(name)?.get_mut(at.index),
            None => self.items.get_mut(at.index),
        }
    }

    /// Append to the main list, or to the open footnote while inside notes.
    /// Inside notes with no footnote open the item is dropped.
    fn push_item(&mut self, item: ScriptItem) -> Option<ItemRef> {
        if self.state.ignore_content {
            return None;
        }
        if self.state.in_notes {
            let name = self.current_note.clone()?;
            let list = self.notes.entry(name.clone()).or_default();
            list.push(item);
            return Some(ItemRef {
                note: Some(name),
                index: list.len() - 1,
            });
        }
        self.items.push(item);
        Some(ItemRef {
            note: None,
            index: self.items.len() - 1,
        })
    }

    fn close_all_content_tags(&mut self) {
        self.close_paragraph();
        self.close_subtitle();
        self.close_emphasis();
        self.close_strong();
        self.close_sub();
        self.close_sup();
    }
}
