use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// Needs an internal dot so bare numbers such as years ("2008") stay body text.
static SUBHEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+").expect("subheading"));

/// Words that open a chapter or a major front/back-matter section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingKeyword {
    Chapter,
    Abstract,
    Dedication,
    Acknowledgement,
    References,
}

impl HeadingKeyword {
    pub const ALL: [HeadingKeyword; 5] = [
        Self::Chapter,
        Self::Abstract,
        Self::Dedication,
        Self::Acknowledgement,
        Self::References,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Chapter => "CHAPTER",
            Self::Abstract => "ABSTRACT",
            Self::Dedication => "DEDICATION",
            Self::Acknowledgement => "ACKNOWLEDGEMENT",
            Self::References => "REFERENCES",
        }
    }

    pub fn is_chapter(self) -> bool {
        self == Self::Chapter
    }
}

/// Trimmed, uppercased form used for every classification decision.
pub fn normalize(text: &str) -> String {
    text.trim().to_uppercase()
}

pub fn heading_keyword(text: &str) -> Option<HeadingKeyword> {
    let norm = normalize(text);
    HeadingKeyword::ALL
        .into_iter()
        .find(|k| norm.starts_with(k.prefix()))
}

pub fn is_heading(text: &str) -> bool {
    heading_keyword(text).is_some()
}

pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

pub fn is_numbered_subheading(text: &str) -> bool {
    SUBHEADING_RE.is_match(text.trim())
}

/// First `max_chars` characters of `text`, for logs and reports.
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(max_chars).collect();
    if trimmed.chars().count() > max_chars {
        out.push('…');
    }
    out
}
