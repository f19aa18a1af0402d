//! Joining a section's clips into one audio file with an external tool.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::ConcatTool;

/// Joins clips, given relative to `base_dir`, into `output` (also relative).
pub trait Concatenator {
    fn concat(&self, base_dir: &Path, files: &[String], output: &str) -> Result<()>;
}

/// Lossless stream concatenation through ffmpeg's concat demuxer.
#[derive(Debug, Clone)]
pub struct FfmpegConcat {
    program: String,
}

impl Default for FfmpegConcat {
    fn default() -> Self {
        Self::with_program("ffmpeg")
    }
}

impl FfmpegConcat {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Concatenator for FfmpegConcat {
    fn concat(&self, base_dir: &Path, files: &[String], output: &str) -> Result<()> {
        let mut list = tempfile::Builder::new()
            .prefix("concat-")
            .suffix(".txt")
            .tempfile_in(base_dir)?;
        list.write_all(list_file_contents(files).as_bytes())?;
        list.flush()?;

        let mut command = Command::new(&self.program);
        command
            .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(list.path())
            .args(["-c", "copy", output])
            .current_dir(base_dir);
        run(command, "ffmpeg")
    }
}

/// Generic audio concatenation through sox.
#[derive(Debug, Clone)]
pub struct SoxConcat {
    program: String,
}

impl Default for SoxConcat {
    fn default() -> Self {
        Self::with_program("sox")
    }
}

impl SoxConcat {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Concatenator for SoxConcat {
    fn concat(&self, base_dir: &Path, files: &[String], output: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(files).arg(output).current_dir(base_dir);
        run(command, "sox")
    }
}

/// The configured backend.
pub fn concatenator_for(tool: ConcatTool) -> Box<dyn Concatenator> {
    match tool {
        ConcatTool::Ffmpeg => Box::new(FfmpegConcat::default()),
        ConcatTool::Sox => Box::new(SoxConcat::default()),
    }
}

/// ffmpeg concat list: one `file '<path>'` line per clip.
fn list_file_contents(files: &[String]) -> String {
    files
        .iter()
        .map(|file| format!("file '{}'\n", file.replace('\'', r"'\''")))
        .collect()
}

fn run(mut command: Command, tool: &'static str) -> Result<()> {
    debug!("Running {command:?}");
    let status = command.status()?;
    if !status.success() {
        return Err(Error::Concat {
            tool,
            code: status.code(),
        });
    }
    Ok(())
}
