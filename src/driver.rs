//! Sequential, resumable synthesis of speech fragments.
//!
//! Every chunk becomes one clip `parts/SSS-PPPP.ext`, written before the next
//! chunk is requested. When a section ends its clips are joined into
//! `audio/SSS.ext`. A rerun over the same output directory finds the last
//! clip on disk and skips every chunk up to and including it, so clip names
//! must be a pure function of the fragments.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::chunk::split_content;
use crate::concat::Concatenator;
use crate::error::{Error, Result};
use crate::fragments::SpeechFragment;
use crate::settings::{AudioFormat, Settings};
use crate::speech::{SynthesisRequest, Synthesizer};
use crate::ssml;

pub const PARTS_DIR: &str = "parts";
pub const AUDIO_DIR: &str = "audio";

/// Clip name for a 1-based part index within a section.
pub fn part_name(section: u32, part: u32) -> String {
    format!("{section:03}-{part:04}")
}

/// Name of the last clip in `parts_dir`, ordered by section then part
/// number. Files not named like a clip are ignored.
pub fn find_last_part(parts_dir: &Path, extension: &str) -> Result<Option<String>> {
    if !parts_dir.is_dir() {
        return Ok(None);
    }

    let mut last: Option<((u32, u32), String)> = None;
    for entry in fs::read_dir(parts_dir)? {
        let file_name = entry?.file_name();
        let Some(stem) = file_name
            .to_str()
            .and_then(|name| name.strip_suffix(extension))
            .and_then(|name| name.strip_suffix('.'))
        else {
            continue;
        };
        let Some(key) = parse_part_name(stem) else {
            continue;
        };
        if last.as_ref().is_none_or(|(current, _)| key > *current) {
            last = Some((key, stem.to_string()));
        }
    }
    Ok(last.map(|(_, name)| name))
}

/// `(section, part)` of a clip name written by [`part_name`].
fn parse_part_name(name: &str) -> Option<(u32, u32)> {
    let (section, part) = name.split_once('-')?;
    Some((section.parse().ok()?, part.parse().ok()?))
}

/// Whether `content` has any non-blank text outside markup tags.
fn has_speech(content: &str) -> bool {
    let mut in_tag = false;
    content.chars().any(|c| match c {
        '<' => {
            in_tag = true;
            false
        }
        '>' => {
            in_tag = false;
            false
        }
        c => !in_tag && !c.is_whitespace(),
    })
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Clip the run resumed after, if any.
    pub resumed_from: Option<String>,
    pub synthesized: usize,
    pub skipped: usize,
    /// Sections assembled into `audio/`.
    pub sections: Vec<u32>,
}

struct Section {
    number: u32,
    parts: u32,
    files: Vec<String>,
}

impl Section {
    fn new(number: u32) -> Self {
        Self {
            number,
            parts: 0,
            files: Vec::new(),
        }
    }

    fn name(&self) -> String {
        format!("{:03}", self.number)
    }
}

pub struct SynthesisDriver<'a> {
    synthesizer: &'a dyn Synthesizer,
    concatenator: &'a dyn Concatenator,
    max_chunk_length: usize,
    format: AudioFormat,
    sample_rate_hertz: Option<u32>,
}

impl<'a> SynthesisDriver<'a> {
    pub fn new(
        synthesizer: &'a dyn Synthesizer,
        concatenator: &'a dyn Concatenator,
        settings: &Settings,
    ) -> Self {
        Self {
            synthesizer,
            concatenator,
            max_chunk_length: settings.max_chunk_length,
            format: settings.format,
            sample_rate_hertz: settings.sample_rate_hertz,
        }
    }

    pub fn run(&self, fragments: &[SpeechFragment], output_dir: &Path) -> Result<RunSummary> {
        let extension = self.format.extension();
        let resume_from = find_last_part(&output_dir.join(PARTS_DIR), extension)?;
        let mut summary = RunSummary {
            resumed_from: resume_from.clone(),
            ..RunSummary::default()
        };

        match &resume_from {
            Some(name) => info!("Resuming after {name}"),
            None => {
                fs::create_dir_all(output_dir.join(PARTS_DIR))?;
                fs::create_dir_all(output_dir.join(AUDIO_DIR))?;
            }
        }

        let mut skip = resume_from.is_some();
        let mut section = Section::new(1);

        for fragment in fragments {
            if !has_speech(&fragment.content) {
                continue;
            }

            if fragment.section != section.number {
                self.finish_section(&section, skip, output_dir, &mut summary)?;
                section = Section::new(fragment.section);
            }

            for chunk in split_content(&fragment.content, self.max_chunk_length) {
                section.parts += 1;
                let name = part_name(section.number, section.parts);
                let file = format!("{PARTS_DIR}/{name}.{extension}");
                section.files.push(file.clone());

                if skip {
                    if resume_from.as_deref() == Some(name.as_str()) {
                        skip = false;
                    }
                    summary.skipped += 1;
                    continue;
                }

                let content = ssml::speak(chunk);
                let request = SynthesisRequest {
                    ssml: &content,
                    language: &fragment.language,
                    voice: &fragment.voice,
                    emotion: fragment.emotion,
                    speed: fragment.speed,
                    format: self.format,
                    sample_rate_hertz: self.sample_rate_hertz,
                };
                let audio = self.synthesizer.synthesize(&request)?;
                fs::write(output_dir.join(&file), audio)?;
                summary.synthesized += 1;
                info!("Fragment {name}");
            }
        }

        self.finish_section(&section, skip, output_dir, &mut summary)?;

        match resume_from {
            Some(name) if skip => Err(Error::ResumePointNotFound(name)),
            _ => Ok(summary),
        }
    }

    fn finish_section(
        &self,
        section: &Section,
        skip: bool,
        output_dir: &Path,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if skip || section.files.is_empty() {
            return Ok(());
        }
        let name = section.name();
        let output = format!("{AUDIO_DIR}/{name}.{}", self.format.extension());
        self.concatenator
            .concat(output_dir, &section.files, &output)?;
        summary.sections.push(section.number);
        info!("Section done: {name}");
        Ok(())
    }
}
