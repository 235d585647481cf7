//! NOAA `.idx` inventories.
//!
//! Every GRIB2 file on the NOAA mirrors has a sidecar listing one message per
//! line: `number:byte_offset:d=YYYYMMDDHH:VAR:LEVEL:FORECAST:`. Reading the
//! inventory first lets us download single messages with HTTP range requests
//! instead of the whole ~500 MB file.

use crate::{Level, Parameter};
use regex::Regex;

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("malformed idx line {line}: {content}")]
    Malformed { line: usize, content: String },
    #[error("bad search pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdxEntry {
    pub number: String,
    pub offset: u64,
    /// Last byte of the message, `None` for the final message in the file
    pub end: Option<u64>,
    pub variable: String,
    pub level: String,
    pub forecast: String,
    line: String,
}

impl IdxEntry {
    /// Value for an HTTP `Range` header covering this message.
    pub fn range_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.offset, end),
            None => format!("bytes={}-", self.offset),
        }
    }
}

pub fn parse_idx(text: &str) -> Result<Vec<IdxEntry>, IndexError> {
    let mut entries = vec![];
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || IndexError::Malformed {
            line: idx + 1,
            content: line.to_string(),
        };

        let pieces: Vec<&str> = line.split(':').collect();
        if pieces.len() < 6 {
            return Err(malformed());
        }
        let offset = pieces[1].parse::<u64>().map_err(|_| malformed())?;

        entries.push(IdxEntry {
            number: pieces[0].to_string(),
            offset,
            end: None,
            variable: pieces[3].to_string(),
            level: pieces[4].to_string(),
            forecast: pieces[5].to_string(),
            line: line.to_string(),
        });
    }

    // sub-messages share an offset, so the end is the next larger offset
    let offsets: Vec<u64> = entries.iter().map(|e| e.offset).collect();
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.end = offsets[i + 1..]
            .iter()
            .find(|next| **next > entry.offset)
            .map(|next| next - 1);
    }

    Ok(entries)
}

/// Search pattern for one field, in the `:VAR:LEVEL:` form Herbie uses.
pub fn field_pattern(parameter: &Parameter, level: &Level) -> Result<Regex, IndexError> {
    let pattern = format!(
        ":{}:{}:",
        regex::escape(parameter.idx_name),
        regex::escape(&level.idx_text())
    );
    Ok(Regex::new(&pattern)?)
}

pub fn find_entry<'a>(entries: &'a [IdxEntry], pattern: &Regex) -> Option<&'a IdxEntry> {
    entries.iter().find(|entry| pattern.is_match(&entry.line))
}
