//! Content extraction for uploaded essays.
//!
//! Text-like files (txt, pdf) become cleaned text; jpg/png pass through as
//! opaque images for the model to read. Anything else is refused here, before
//! a model call or store write can happen.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::llm_client::ContentPart;

pub mod handlers;
pub mod uploads;

const PREVIEW_CHARS: usize = 280;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnsupportedInput {
    #[error("Unsupported file type '.{extension}'. Upload a .txt, .pdf, .jpg or .png file")]
    UnsupportedType { extension: String },

    #[error("Could not read {kind} file: {reason}")]
    Unreadable { kind: FileKind, reason: String },

    #[error("No text could be extracted from '{filename}'")]
    Empty { filename: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Txt,
    Pdf,
    Jpg,
    Png,
}

impl FileKind {
    /// Resolves a kind from the filename extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, UnsupportedInput> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "txt" => Ok(FileKind::Txt),
            "pdf" => Ok(FileKind::Pdf),
            "jpg" | "jpeg" => Ok(FileKind::Jpg),
            "png" => Ok(FileKind::Png),
            _ => Err(UnsupportedInput::UnsupportedType { extension }),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Txt => "txt",
            FileKind::Pdf => "pdf",
            FileKind::Jpg => "jpg",
            FileKind::Png => "png",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            FileKind::Txt => "text/plain",
            FileKind::Pdf => "application/pdf",
            FileKind::Jpg => "image/jpeg",
            FileKind::Png => "image/png",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedContent {
    Text { kind: FileKind, text: String },
    Image { kind: FileKind, data: Bytes },
}

impl ExtractedContent {
    pub fn kind(&self) -> FileKind {
        match self {
            ExtractedContent::Text { kind, .. } | ExtractedContent::Image { kind, .. } => *kind,
        }
    }

    /// Short excerpt for upload receipts. Images have none.
    pub fn preview(&self) -> Option<String> {
        match self {
            ExtractedContent::Text { text, .. } => Some(text.chars().take(PREVIEW_CHARS).collect()),
            ExtractedContent::Image { .. } => None,
        }
    }

    /// Model input for this content. Text is prefixed with `label`.
    pub fn into_part(self, label: &str) -> ContentPart {
        match self {
            ExtractedContent::Text { text, .. } => ContentPart::Text(format!("{label}:\n{text}")),
            ExtractedContent::Image { kind, data } => ContentPart::Image {
                media_type: kind.media_type().to_string(),
                data,
            },
        }
    }
}

/// Reads an uploaded file into text or an image, based on its extension.
pub fn read_file_content(filename: &str, bytes: Bytes) -> Result<ExtractedContent, UnsupportedInput> {
    let kind = FileKind::from_filename(filename)?;
    debug!("Extracting {} bytes from '{}' as {}", bytes.len(), filename, kind);

    let text = match kind {
        FileKind::Jpg | FileKind::Png => return Ok(ExtractedContent::Image { kind, data: bytes }),
        FileKind::Txt => clean_text(&decode_text(&bytes)),
        FileKind::Pdf => {
            let raw = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                UnsupportedInput::Unreadable {
                    kind,
                    reason: format!("the PDF may be encrypted or corrupted ({e})"),
                }
            })?;
            clean_text(&raw)
        }
    };

    if text.is_empty() {
        return Err(UnsupportedInput::Empty {
            filename: filename.to_string(),
        });
    }
    Ok(ExtractedContent::Text { kind, text })
}

/// UTF-8 first; Latin-1 maps every byte to a char so it cannot fail.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Normalizes line endings, drops NULs and trailing spaces, and collapses
/// runs of blank lines into one.
pub fn clean_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n").replace('\0', "");

    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = false;
    for line in unified.split('\n').map(str::trim_end) {
        let blank = line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        lines.push(line);
        prev_blank = blank;
    }
    lines.join("\n").trim().to_string()
}
