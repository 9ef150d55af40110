//! External-edit payload codec.
//!
//! The CMS serializes an object as up to three sections of one text blob:
//!
//! ```text
//! url:https://host/site/page          <- Header: `key:value`, LF
//! meta_type:Document
//!                                     <- blank line: switch section
//! title: Welcome\r\n                  <- Python: `key: value`, CRLF
//! description: first line\r\n
//!   \r\n                              <- separator (ordinary keys)
//!   second line\r\n                   <- continuation
//! \r\n                                <- blank line: switch section
//! <p>raw content bytes...             <- Content
//! ```
//!
//! File payloads have no Python section: the first blank line ends the
//! header and everything after it is content.
//!
//! A few list-valued keys use a dense continuation form with no separator
//! lines; they are listed in [`DENSE_KEYS`] because nothing in the payload
//! marks them.

use indexmap::IndexMap;
use strum::Display;
use thiserror::Error;

use crate::error::FsError;

/// Keys whose continuation lines carry no separator line.
pub const DENSE_KEYS: &[&str] = &["locallyAllowedTypes", "immediatelyAddableTypes"];

const INDENT: &[u8] = b"  ";

/// Raw field values keyed by field name.
pub type Settings = IndexMap<String, String>;

/// Payload section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Section {
    Header,
    Python,
    Content,
}

impl Section {
    fn line_end(&self) -> &'static str {
        match self {
            Section::Header => "\n",
            _ => "\r\n",
        }
    }

    fn key_separator(&self) -> &'static str {
        match self {
            Section::Header => ":",
            _ => ": ",
        }
    }
}

/// Payload did not match the section structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: missing `:` in {section} section")]
    MissingSeparator { line: usize, section: Section },

    #[error("line {line}: continuation line with no preceding key")]
    OrphanContinuation { line: usize },

    #[error("line {line}: invalid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("payload ended inside the {section} section")]
    UnexpectedEof { section: Section },
}

impl From<ParseError> for FsError {
    fn from(e: ParseError) -> Self {
        FsError::unavailable(format!("malformed external edit payload: {e}"))
    }
}

/// Decoded external-edit payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalEdit {
    pub header: Settings,
    pub fields: Settings,
    pub content: Vec<u8>,
}

/// Key whose value is still collecting continuation lines.
struct PendingValue {
    key: String,
    value: String,
    dense: bool,
    expect_separator: bool,
}

impl PendingValue {
    fn new(key: String, value: String) -> Self {
        let dense = DENSE_KEYS.contains(&key.as_str());
        Self {
            key,
            value,
            dense,
            expect_separator: !dense,
        }
    }

    fn continue_with(&mut self, rest: &str) {
        if self.dense {
            self.push_line(rest);
        } else if self.expect_separator && rest.is_empty() {
            self.expect_separator = false;
        } else {
            self.push_line(rest);
            self.expect_separator = true;
        }
    }

    fn push_line(&mut self, line: &str) {
        self.value.push('\n');
        self.value.push_str(line);
    }
}

impl ExternalEdit {
    /// Parse a document payload (Header, Python, Content).
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        Self::parse_sections(buffer, true)
    }

    /// Parse a file payload (Header, Content).
    pub fn parse_file(buffer: &[u8]) -> Result<Self, ParseError> {
        Self::parse_sections(buffer, false)
    }

    fn parse_sections(buffer: &[u8], has_python: bool) -> Result<Self, ParseError> {
        let mut edit = ExternalEdit::default();
        let mut section = Section::Header;
        let mut pending: Option<PendingValue> = None;
        let mut pos = 0;
        let mut line_no = 0;

        while section != Section::Content {
            let Some(offset) = buffer[pos..].iter().position(|&b| b == b'\n') else {
                return Err(ParseError::UnexpectedEof { section });
            };
            let mut line = &buffer[pos..pos + offset];
            pos += offset + 1;
            line_no += 1;
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }

            if let Some(rest) = line.strip_prefix(INDENT) {
                let rest = decode(rest, line_no)?;
                match pending.as_mut() {
                    Some(value) => value.continue_with(rest),
                    None => return Err(ParseError::OrphanContinuation { line: line_no }),
                }
                continue;
            }

            if let Some(done) = pending.take() {
                edit.section_mut(section).insert(done.key, done.value);
            }

            if line.is_empty() {
                section = match section {
                    Section::Header if has_python => Section::Python,
                    _ => Section::Content,
                };
                continue;
            }

            let line = decode(line, line_no)?;
            let Some((key, value)) = line.split_once(':') else {
                return Err(ParseError::MissingSeparator {
                    line: line_no,
                    section,
                });
            };
            let value = match section {
                Section::Python => value.strip_prefix(' ').unwrap_or(value),
                _ => value,
            };
            pending = Some(PendingValue::new(key.to_string(), value.to_string()));
        }

        edit.content = buffer[pos..].to_vec();
        Ok(edit)
    }

    fn section_mut(&mut self, section: Section) -> &mut Settings {
        match section {
            Section::Header => &mut self.header,
            _ => &mut self.fields,
        }
    }

    /// Encode as a document payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        encode_section(&mut out, &self.header, Section::Header);
        out.push_str(Section::Header.line_end());
        encode_section(&mut out, &self.fields, Section::Python);
        out.push_str(Section::Python.line_end());
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.content);
        bytes
    }

    /// Encode as a file payload (no Python section).
    pub fn encode_file(&self) -> Vec<u8> {
        let mut out = String::new();
        encode_section(&mut out, &self.header, Section::Header);
        out.push_str(Section::Header.line_end());
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.content);
        bytes
    }

    /// Field value, preferring the Python section over the header.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .or_else(|| self.header.get(key))
            .map(String::as_str)
    }

    /// Both sections merged, Python fields winning.
    pub fn settings(&self) -> Settings {
        let mut merged = self.header.clone();
        for (key, value) in &self.fields {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

fn decode(bytes: &[u8], line: usize) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 { line })
}

fn encode_section(out: &mut String, settings: &Settings, section: Section) {
    let eol = section.line_end();
    for (key, value) in settings {
        let dense = DENSE_KEYS.contains(&key.as_str());
        let mut lines = value.split('\n');
        out.push_str(key);
        out.push_str(section.key_separator());
        out.push_str(lines.next().unwrap_or_default());
        out.push_str(eol);
        for line in lines {
            if !dense {
                out.push_str("  ");
                out.push_str(eol);
            }
            out.push_str("  ");
            out.push_str(line);
            out.push_str(eol);
        }
    }
}
