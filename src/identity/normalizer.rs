//! Name canonicalization and fuzzy similarity
//!
//! Person names lose honorifics, generational suffixes and punctuation, and are
//! title-cased; the result doubles as the exact matching key. The fuzzy ratio in
//! this module is only ever consulted by the deduplicator.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use super::{IdentityError, IdentityResult};

/// Everything except letters, digits, whitespace, intra-word hyphens and apostrophes
static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s'\-&]").expect("valid punctuation regex"));

/// Hyphens / apostrophes that do not sit between two word characters
static LOOSE_JOINER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)['\-]+|['\-]+(\s|$)").expect("valid joiner regex"));

const PREFIXES: &[&str] = &["dr", "mr", "mrs", "ms", "prof", "rev", "hon", "esq"];
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "esq"];

/// A canonicalized person name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedName {
    /// Canonical display form, e.g. "Jane A Smith"
    pub display: String,
    /// Exact matching key (the normalized form)
    pub key: String,
    pub prefix: Option<String>,
    pub first: String,
    pub middle: Option<String>,
    pub last: Option<String>,
    pub suffix: Option<String>,
}

impl NormalizedName {
    /// Lowercased first letter of the family name (or the only name), used to
    /// block fuzzy candidate searches.
    pub fn block(&self) -> char {
        self.last
            .as_deref()
            .unwrap_or(&self.first)
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('_')
    }
}

/// Canonicalize a person name.
///
/// Handles "Last, First Middle" filings, strips honorific prefixes and
/// generational suffixes, drops punctuation and title-cases each token.
pub fn normalize_person_name(raw: &str) -> IdentityResult<NormalizedName> {
    let reordered = reorder_comma_name(raw);
    let cleaned = strip_punctuation(&reordered);

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let mut prefix = None;
    let mut suffix = None;

    while let Some(first) = tokens.first() {
        let lower = first.to_lowercase();
        if PREFIXES.contains(&lower.as_str()) && tokens.len() > 1 {
            prefix.get_or_insert_with(|| title_case(first));
            tokens.remove(0);
        } else {
            break;
        }
    }
    while let Some(last) = tokens.last() {
        let lower = last.to_lowercase();
        if SUFFIXES.contains(&lower.as_str()) && tokens.len() > 1 {
            let canonical = if lower.starts_with('i') { lower.to_uppercase() } else { title_case(last) };
            suffix.get_or_insert(canonical);
            tokens.pop();
        } else {
            break;
        }
    }

    let parts: Vec<String> = tokens
        .iter()
        .map(|t| title_case(t))
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(IdentityError::InvalidRecord(format!(
            "name {:?} normalizes to an empty string",
            raw
        )));
    }

    let display = parts.join(" ");
    let (first, middle, last) = match parts.len() {
        1 => (parts[0].clone(), None, None),
        2 => (parts[0].clone(), None, Some(parts[1].clone())),
        n => (
            parts[0].clone(),
            Some(parts[1..n - 1].join(" ")),
            Some(parts[n - 1].clone()),
        ),
    };

    Ok(NormalizedName {
        key: display.clone(),
        display,
        prefix,
        first,
        middle,
        last,
        suffix,
    })
}

/// Canonicalize an organization name for display. Organizations are matched by
/// identifier, never by name.
pub fn normalize_org_name(raw: &str) -> IdentityResult<String> {
    let cleaned = strip_punctuation(raw);
    let words: Vec<String> = cleaned.split_whitespace().map(title_case).collect();
    if words.is_empty() {
        return Err(IdentityError::InvalidRecord(format!(
            "organization name {:?} normalizes to an empty string",
            raw
        )));
    }
    Ok(words.join(" "))
}

/// Insert/delete edit ratio in `[0, 1]`: `(|a| + |b| - d) / (|a| + |b|)` where `d`
/// is the indel distance, i.e. `2·LCS / (|a| + |b|)`. Case-insensitive.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let lcs = previous[b.len()];

    (2 * lcs) as f64 / total as f64
}

/// Deterministic dedup key: hex SHA-256 over the lowercased matching key and the
/// optional identifier.
pub fn dedup_key(key: &str, identifier: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(identifier.unwrap_or("").trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// "Smith, Jane A." -> "Jane A. Smith"; "Jane Smith, Jr." -> "Jane Smith Jr."
fn reorder_comma_name(raw: &str) -> String {
    let parts: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return raw.to_string();
    }

    let is_suffix = |part: &str| {
        let lower = part.trim_end_matches('.').to_lowercase();
        SUFFIXES.contains(&lower.as_str())
    };

    let (name_parts, suffix_parts): (Vec<&str>, Vec<&str>) =
        parts.iter().partition(|p| !is_suffix(p));

    let mut ordered = match name_parts.as_slice() {
        [last, given] => format!("{} {}", given, last),
        other => other.join(" "),
    };
    for s in suffix_parts {
        ordered.push(' ');
        ordered.push_str(s);
    }
    ordered
}

fn strip_punctuation(raw: &str) -> String {
    let without = PUNCTUATION_RE.replace_all(raw, " ");
    LOOSE_JOINER_RE.replace_all(&without, " ").into_owned()
}

/// Title-case a token, keeping the casing rule across hyphen and apostrophe
/// segments ("o'brien-smith" -> "O'Brien-Smith").
fn title_case(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut start_of_segment = true;
    for c in token.chars() {
        if start_of_segment {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        start_of_segment = c == '-' || c == '\'';
    }
    out
}
