//! Text normalization for transcripts and filename tokens.
//!
//! An external normalization program can be configured (for example a
//! script-conversion tool). When it is missing or fails, a built-in
//! normalizer is used instead.

use crate::error::{IngestError, IngestResult};
use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Cleans document text and filename tokens.
pub trait TextNormalizer {
    fn name(&self) -> &str;

    fn normalize_text(&self, text: &str) -> IngestResult<String>;

    fn normalize_filename(&self, filename: &str) -> IngestResult<String>;
}

/// Characters kept by [`BasicNormalizer`]: letters, digits, whitespace and
/// punctuation, including CJK and fullwidth forms.
fn is_linguistic(c: char) -> bool {
    c.is_alphanumeric()
        || c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(c,
            '\u{2010}'..='\u{206F}'   // general punctuation
            | '\u{3000}'..='\u{303F}' // CJK symbols and punctuation
            | '\u{FF00}'..='\u{FFEF}' // halfwidth and fullwidth forms
            | '\u{FE30}'..='\u{FE4F}' // CJK compatibility forms
        )
}

/// Collapse runs of horizontal whitespace to one space and trim each line.
fn collapse_line(line: &str) -> String {
    line.split(|c: char| c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Minimal built-in normalizer.
///
/// Text keeps its line structure: each line is collapsed, blank-line runs
/// shrink to a single paragraph break, and non-linguistic characters such as
/// control codes and emoji are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicNormalizer;

impl TextNormalizer for BasicNormalizer {
    fn name(&self) -> &str {
        "basic"
    }

    fn normalize_text(&self, text: &str) -> IngestResult<String> {
        let filtered: String = text
            .chars()
            .map(|c| if c == '\r' { '\n' } else { c })
            .filter(|c| is_linguistic(*c))
            .collect();

        let mut out = String::with_capacity(filtered.len());
        let mut blank_run = 0;
        for line in filtered.split('\n') {
            let line = collapse_line(line);
            if line.is_empty() {
                blank_run += 1;
                continue;
            }
            if !out.is_empty() {
                out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
            }
            out.push_str(&line);
            blank_run = 0;
        }
        Ok(out)
    }

    fn normalize_filename(&self, filename: &str) -> IngestResult<String> {
        let cleaned: String = filename.chars().filter(|c| !c.is_control()).collect();
        Ok(collapse_line(&cleaned))
    }
}

/// Pipes text through an external program (stdin to stdout).
#[derive(Debug, Clone)]
pub struct CommandNormalizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandNormalizer {
    /// Resolve `command` (program plus whitespace-separated arguments) on `PATH`.
    pub fn locate(command: &str) -> IngestResult<Self> {
        let mut parts = command.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| IngestError::Normalizer("empty normalizer command".to_string()))?;
        let program = which::which(name)
            .map_err(|e| IngestError::Normalizer(format!("{} not found: {}", name, e)))?;
        Ok(Self {
            program,
            args: parts.map(str::to_string).collect(),
        })
    }

    fn run(&self, input: &str) -> IngestResult<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from another thread so a full stdout pipe cannot block us
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_string();
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| IngestError::Normalizer("stdin writer panicked".to_string()))??;
        }
        if !output.status.success() {
            return Err(IngestError::Normalizer(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| IngestError::Normalizer(format!("invalid UTF-8 output: {}", e)))
    }
}

impl TextNormalizer for CommandNormalizer {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("command")
    }

    fn normalize_text(&self, text: &str) -> IngestResult<String> {
        let converted = self.run(text)?;
        BasicNormalizer.normalize_text(&converted)
    }

    fn normalize_filename(&self, filename: &str) -> IngestResult<String> {
        let converted = self.run(filename)?;
        BasicNormalizer.normalize_filename(converted.trim_end_matches('\n'))
    }
}

/// Uses the external normalizer when available, the built-in one otherwise.
///
/// The first fallback is logged as a warning; later ones only at debug level.
pub struct FallbackNormalizer {
    primary: Option<CommandNormalizer>,
    warned: Cell<bool>,
}

impl FallbackNormalizer {
    /// Build from the optional configured command.
    pub fn new(command: Option<&str>) -> Self {
        let fallback = Self {
            primary: None,
            warned: Cell::new(false),
        };
        match command.filter(|c| !c.trim().is_empty()) {
            None => fallback,
            Some(command) => match CommandNormalizer::locate(command) {
                Ok(primary) => Self {
                    primary: Some(primary),
                    ..fallback
                },
                Err(e) => {
                    fallback.warn_once(&e);
                    fallback
                }
            },
        }
    }

    pub fn has_external(&self) -> bool {
        self.primary.is_some()
    }

    fn warn_once(&self, err: &IngestError) {
        if self.warned.replace(true) {
            debug!("Normalizer fallback: {}", err);
        } else {
            warn!("External normalizer unavailable ({}), using built-in normalizer", err);
        }
    }

    fn with_fallback<F, G>(&self, external: F, basic: G) -> IngestResult<String>
    where
        F: FnOnce(&CommandNormalizer) -> IngestResult<String>,
        G: FnOnce() -> IngestResult<String>,
    {
        if let Some(primary) = &self.primary {
            match external(primary) {
                Ok(out) => return Ok(out),
                Err(e) => self.warn_once(&e),
            }
        }
        basic()
    }
}

impl TextNormalizer for FallbackNormalizer {
    fn name(&self) -> &str {
        match &self.primary {
            Some(primary) => primary.name(),
            None => "basic",
        }
    }

    fn normalize_text(&self, text: &str) -> IngestResult<String> {
        self.with_fallback(
            |p| p.normalize_text(text),
            || BasicNormalizer.normalize_text(text),
        )
    }

    fn normalize_filename(&self, filename: &str) -> IngestResult<String> {
        self.with_fallback(
            |p| p.normalize_filename(filename),
            || BasicNormalizer.normalize_filename(filename),
        )
    }
}
