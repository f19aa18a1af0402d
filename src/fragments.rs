//! Script to speech fragments.
//!
//! A fragment is a maximal run of content sharing one voice, emotion, speed
//! and section. The compiler walks the script once, keeping a pending
//! fragment whose attributes change in place until it holds spoken text;
//! after that, any real attribute change flushes it and starts a new one.

use std::iter::Peekable;
use std::slice::Iter;

use serde::{Deserialize, Serialize};

use crate::script::{PauseKind, Script, ScriptItem};
use crate::settings::{Emotion, Settings};
use crate::ssml;

/// Synthesizer-ready content plus the attributes to voice it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechFragment {
    #[serde(rename = "lang")]
    pub language: String,
    pub voice: String,
    pub emotion: Emotion,
    pub speed: f32,
    pub section: u32,
    pub content: String,
}

/// The coalescible attributes of a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentAttributes {
    pub voice: String,
    pub emotion: Emotion,
    pub speed: f32,
    pub section: u32,
}

/// A partial update of [`FragmentAttributes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentChange {
    pub voice: Option<String>,
    pub emotion: Option<Emotion>,
    pub speed: Option<f32>,
    pub section: Option<u32>,
}

impl FragmentChange {
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn section(mut self, section: u32) -> Self {
        self.section = Some(section);
        self
    }

    /// Whether applying this change would alter `attributes`.
    pub fn differs_from(&self, attributes: &FragmentAttributes) -> bool {
        self.voice.as_ref().is_some_and(|v| *v != attributes.voice)
            || self.emotion.is_some_and(|e| e != attributes.emotion)
            || self.speed.is_some_and(|s| s != attributes.speed)
            || self.section.is_some_and(|s| s != attributes.section)
    }

    fn apply_to(self, attributes: &mut FragmentAttributes) {
        if let Some(voice) = self.voice {
            attributes.voice = voice;
        }
        if let Some(emotion) = self.emotion {
            attributes.emotion = emotion;
        }
        if let Some(speed) = self.speed {
            attributes.speed = speed;
        }
        if let Some(section) = self.section {
            attributes.section = section;
        }
    }
}

pub struct FragmentCompiler<'a> {
    script: &'a Script,
    settings: &'a Settings,
    fragments: Vec<SpeechFragment>,
    attributes: FragmentAttributes,
    content: String,
    with_text: bool,
    in_emphasis: bool,
    in_strong: bool,
}

impl<'a> FragmentCompiler<'a> {
    pub fn new(script: &'a Script, settings: &'a Settings) -> Self {
        Self {
            script,
            settings,
            fragments: Vec::new(),
            attributes: FragmentAttributes {
                voice: settings.voices.narrator.clone(),
                emotion: Emotion::Neutral,
                speed: settings.speed,
                section: 1,
            },
            content: String::new(),
            with_text: false,
            in_emphasis: false,
            in_strong: false,
        }
    }

    /// Attributes of the pending fragment.
    pub fn attributes(&self) -> &FragmentAttributes {
        &self.attributes
    }

    pub fn fragments(&self) -> &[SpeechFragment] {
        &self.fragments
    }

    /// Request an attribute change.
    ///
    /// Applied in place when nothing actually changes or the pending
    /// fragment has no spoken text yet; otherwise the pending fragment is
    /// flushed first.
    pub fn change(&mut self, change: FragmentChange) {
        if self.with_text && change.differs_from(&self.attributes) {
            self.flush();
        }
        change.apply_to(&mut self.attributes);
    }

    /// Append markup that carries no speech (pauses, separators).
    pub fn append_markup(&mut self, markup: &str) {
        self.content.push_str(markup);
    }

    pub fn append_text(&mut self, text: &str) {
        self.content.push_str(text);
        self.with_text = true;
    }

    /// Emit the pending fragment and start an empty one with the same
    /// attributes. Content without spoken text (only pauses or separators)
    /// is discarded.
    pub fn flush(&mut self) {
        let content = std::mem::take(&mut self.content);
        if !std::mem::take(&mut self.with_text) {
            return;
        }
        let attributes = &self.attributes;
        self.fragments.push(SpeechFragment {
            language: self.settings.language.clone(),
            voice: attributes.voice.clone(),
            emotion: attributes.emotion,
            speed: attributes.speed,
            section: attributes.section,
            content,
        });
    }

    /// Walk the whole script and return the fragments.
    pub fn compile(mut self) -> Vec<SpeechFragment> {
        let script = self.script;
        let mut items = script.items().iter().peekable();
        while let Some(item) = items.next() {
            self.item(item, &mut items);
        }
        self.flush();
        self.fragments
    }

    fn item(&mut self, item: &ScriptItem, rest: &mut Peekable<Iter<'_, ScriptItem>>) {
        let settings = self.settings;
        let voices = &settings.voices;
        match item {
            ScriptItem::Section { number } => {
                self.change(FragmentChange::default().section(*number));
            }
            ScriptItem::Title { closing: false, .. } => {
                self.change(FragmentChange::default().voice(&voices.titles));
                self.append_markup(&ssml::pause(settings.title_pause));
            }
            ScriptItem::Title { closing: true, .. } => {
                let keeps_voice = matches!(
                    rest.peek(),
                    Some(ScriptItem::Paragraph {
                        closing: false,
                        inherit_voice: true,
                        ..
                    })
                );
                if !keeps_voice {
                    self.change(FragmentChange::default().voice(&voices.narrator));
                }
            }
            ScriptItem::Paragraph {
                closing: false,
                inherit_voice,
                ..
            } => {
                if !inherit_voice {
                    self.change(FragmentChange::default().voice(&voices.narrator));
                }
                self.append_markup(ssml::paragraph());
            }
            ScriptItem::Paragraph { closing: true, .. } => {}
            ScriptItem::Emphasis { closing } => {
                self.in_emphasis = !closing;
                let emotion = match (*closing, self.in_strong) {
                    (false, _) => Emotion::Good,
                    (true, true) => Emotion::Evil,
                    (true, false) => Emotion::Neutral,
                };
                self.change(FragmentChange::default().emotion(emotion));
            }
            ScriptItem::Strong { closing } => {
                self.in_strong = !closing;
                let emotion = match (*closing, self.in_emphasis) {
                    (false, _) => Emotion::Evil,
                    (true, true) => Emotion::Good,
                    (true, false) => Emotion::Neutral,
                };
                self.change(FragmentChange::default().emotion(emotion));
            }
            ScriptItem::Dialogue {
                number,
                closing: false,
            } => {
                let voice = if number % 2 == 0 {
                    &voices.companion1
                } else {
                    &voices.companion2
                };
                self.change(FragmentChange::default().voice(voice));
            }
            ScriptItem::Dialogue { closing: true, .. } => {
                self.change(FragmentChange::default().voice(&voices.narrator));
            }
            ScriptItem::Pause { seconds, kind } => {
                let markup = match kind {
                    Some(PauseKind::Title) => ssml::pause(settings.title_pause),
                    Some(PauseKind::Paragraph) => ssml::paragraph().to_string(),
                    Some(PauseKind::Sentence) => ssml::pause(settings.sentence_pause),
                    None => ssml::pause(seconds.unwrap_or(settings.default_pause)),
                };
                self.append_markup(&markup);
            }
            ScriptItem::Text { text } => self.append_text(text),
            ScriptItem::Note { name } => self.note(name),
            ScriptItem::Image { .. } => self.substitute(settings.image.as_deref()),
            ScriptItem::Sub { closing: false } => self.substitute(settings.sub.as_deref()),
            ScriptItem::Sup { closing: false } => self.substitute(settings.sup.as_deref()),
            ScriptItem::Sub { closing: true } | ScriptItem::Sup { closing: true } => {}
        }
    }

    /// Substitution strings are literal SSML and are not normalized.
    fn substitute(&mut self, replacement: Option<&str>) {
        if let Some(replacement) = replacement {
            self.append_text(replacement);
        }
    }

    /// Read a footnote inline in the notes voice and speed.
    fn note(&mut self, name: &str) {
        if !self.settings.footnotes {
            return;
        }
        let mut visiting = vec![name.to_string()];
        let text = resolve_note(self.script, name, &mut visiting);
        if text.trim().is_empty() {
            return;
        }

        let settings = self.settings;
        let voice = self.attributes.voice.clone();
        let speed = self.attributes.speed;
        self.change(
            FragmentChange::default()
                .voice(&settings.voices.notes)
                .speed(settings.notes_speed),
        );
        self.append_markup(ssml::paragraph());
        self.append_text(&text);
        self.change(FragmentChange::default().voice(voice).speed(speed));
    }
}

/// Concatenated text of a footnote. Paragraph and title ends become
/// separators; notes referenced from notes are inlined once.
fn resolve_note(script: &Script, name: &str, visiting: &mut Vec<String>) -> String {
    let Some(items) = script.footnotes(name) else {
        return String::new();
    };

    let mut text = String::new();
    for item in items {
        match item {
            ScriptItem::Text { text: t } => text.push_str(t),
            ScriptItem::Paragraph { closing: true, .. } | ScriptItem::Title { closing: true, .. } => {
                text.push_str(ssml::paragraph());
            }
            ScriptItem::Note { name } if !visiting.contains(name) => {
                visiting.push(name.clone());
                text.push_str(&resolve_note(script, name, visiting));
            }
            _ => {}
        }
    }
    text
}

/// Compile a script into speech fragments.
pub fn compile_fragments(script: &Script, settings: &Settings) -> Vec<SpeechFragment> {
    FragmentCompiler::new(script, settings).compile()
}
