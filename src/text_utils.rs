use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;

/// Human readable label of a calendar date, e.g. "January 5, 2024".
/// The date is never converted between zones, so the label is the stored day.
pub fn format_date_label(date: &NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub fn format_timestamp(millis: i64, zone: &Tz) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|instant| instant.with_timezone(zone).to_rfc3339())
}

pub fn today_in(zone: &Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(zone).date_naive()
}

/// Splits a post body on blank lines, dropping empty paragraphs.
pub fn split_paragraphs(content: &str) -> Vec<&str> {
    lazy_static! {
        static ref BLANK_LINE_REGEX: Regex = Regex::new(r"\r?\n[ \t]*\r?\n").unwrap();
    }

    BLANK_LINE_REGEX.split(content)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Turns free text (usually a generated title) into a path safe id.
pub fn slugify(text: &str) -> String {
    let text = unidecode::unidecode(text);
    let alpha_chars: String = text.chars()
        .filter(|&c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_')
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut slug = String::new();
    let mut prev_char = None;

    for c in alpha_chars.chars() {
        if c != '-' || prev_char != Some('-') {
            slug.push(c);
        }
        prev_char = Some(c);
    }

    slug.trim_matches('-').to_string()
}
