//! Identifier normalization
//!
//! Converts identifiers between the two canonical forms used by the engine:
//!
//! - **display form** (camelCase), used for field and table identifiers in
//!   dataset schema documents: `numbers33InTheMiddle44`
//! - **storage form** (snake_case), used for relational table and column
//!   names: `numbers_33_in_the_middle_44`
//!
//! Word boundaries are underscores, whitespace, case transitions and
//! letter/digit transitions. The relation separator ([`RELATION_SEPARATOR`])
//! is kept verbatim and both sides of it are normalized independently.
//!
//! Both conversions are pure and idempotent, so their results are memoized
//! in a process-wide cache keyed on the input string.
//!
//! # Example
//!
//! ```rust
//! use schema_tools::naming::{to_display_form, to_storage_form};
//!
//! assert_eq!(to_display_form("test_name_magic").unwrap(), "testNameMagic");
//! assert_eq!(to_storage_form("perJaarPerM2").unwrap(), "per_jaar_per_m2");
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use deunicode::deunicode_with_tofu;
use once_cell::sync::Lazy;

use crate::error::{SchemaError, SchemaResult};

/// Token joining a field name to its relation target (`gebieden:buurten`)
pub const RELATION_SEPARATOR: char = ':';

/// Maximum number of memoized results per direction
const CACHE_CAPACITY: usize = 500;

static DISPLAY_CACHE: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static STORAGE_CACHE: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Convert an identifier to its display form (camelCase)
///
/// # Errors
///
/// Returns [`SchemaError::EmptyIdentifier`] for an empty input, or when one
/// side of a relation separator is empty or only separators.
///
/// # Example
///
/// ```rust
/// use schema_tools::naming::to_display_form;
///
/// assert_eq!(to_display_form("numbers_33_in_the_middle_44").unwrap(), "numbers33InTheMiddle44");
/// assert_eq!(to_display_form("TestNameMagic").unwrap(), "testNameMagic");
/// assert!(to_display_form("").is_err());
/// ```
pub fn to_display_form(ident: &str) -> SchemaResult<String> {
    memoized(&DISPLAY_CACHE, ident, |ident| {
        map_parts(ident, |part| Ok(camel_case_part(part)))
    })
}

/// Convert an identifier to its storage form (snake_case)
///
/// The input may be in any form (camelCase, snake_case, space separated or
/// mixed); it is brought to display form first so that already snake_cased
/// input round-trips unchanged.
///
/// # Errors
///
/// Returns [`SchemaError::EmptyIdentifier`] for an empty input, or when one
/// side of a relation separator is empty or has no letters or digits.
///
/// # Example
///
/// ```rust
/// use schema_tools::naming::to_storage_form;
///
/// assert_eq!(to_storage_form("verlengingSluitingstijd1").unwrap(), "verlenging_sluitingstijd_1");
/// assert_eq!(to_storage_form("test_name_magic").unwrap(), "test_name_magic");
/// ```
pub fn to_storage_form(ident: &str) -> SchemaResult<String> {
    memoized(&STORAGE_CACHE, ident, |ident| {
        map_parts(ident, |part| {
            let snake = snake_case_part(&camel_case_part(part));
            if snake.is_empty() {
                return Err(SchemaError::EmptyIdentifier);
            }
            Ok(snake)
        })
    })
}

fn memoized(
    cache: &RwLock<HashMap<String, String>>,
    ident: &str,
    compute: impl FnOnce(&str) -> SchemaResult<String>,
) -> SchemaResult<String> {
    if ident.is_empty() {
        return Err(SchemaError::EmptyIdentifier);
    }

    if let Ok(entries) = cache.read()
        && let Some(hit) = entries.get(ident)
    {
        return Ok(hit.clone());
    }

    let result = compute(ident)?;

    // Two callers may compute the same entry concurrently; the values are equal.
    if let Ok(mut entries) = cache.write() {
        if entries.len() >= CACHE_CAPACITY {
            entries.clear();
        }
        entries.insert(ident.to_string(), result.clone());
    }

    Ok(result)
}

/// Apply `convert` to every relation-separated part and join the results
fn map_parts(
    ident: &str,
    convert: impl Fn(&str) -> SchemaResult<String>,
) -> SchemaResult<String> {
    let mut converted = Vec::new();
    for part in ident.split(RELATION_SEPARATOR) {
        if part.chars().all(is_separator) {
            return Err(SchemaError::EmptyIdentifier);
        }
        converted.push(convert(part)?);
    }
    Ok(converted.join(&RELATION_SEPARATOR.to_string()))
}

fn is_separator(c: char) -> bool {
    c == '_' || c.is_whitespace()
}

/// camelCase a single (non-empty) part
///
/// Scan rules, in order of precedence at each position:
///
/// 1. a run of separators is dropped and the next character upper-cased;
///    a trailing run collapses to its last character
/// 2. a digit run is kept, separators after it are dropped and the next
///    character is upper-cased
/// 3. anything else is copied
///
/// The first character of the result is lower-cased.
fn camel_case_part(part: &str) -> String {
    let chars: Vec<char> = part.chars().collect();
    let mut out = String::with_capacity(part.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if is_separator(c) {
            let run_end = skip_while(&chars, i, is_separator);
            match chars.get(run_end) {
                Some(next) => {
                    out.extend(next.to_uppercase());
                    i = run_end + 1;
                }
                None => {
                    out.push(chars[run_end - 1]);
                    i = run_end;
                }
            }
        } else if c.is_ascii_digit() {
            let digits_end = skip_while(&chars, i, |c| c.is_ascii_digit());
            out.extend(&chars[i..digits_end]);
            let run_end = skip_while(&chars, digits_end, is_separator);
            match chars.get(run_end) {
                Some(next) => {
                    out.extend(next.to_uppercase());
                    i = run_end + 1;
                }
                None => {
                    if run_end > digits_end {
                        out.push(chars[run_end - 1]);
                    }
                    i = run_end;
                }
            }
        } else {
            out.push(c);
            i += 1;
        }
    }

    lower_first(&out)
}

fn skip_while(chars: &[char], start: usize, pred: impl Fn(char) -> bool) -> usize {
    let mut end = start;
    while end < chars.len() && pred(chars[end]) {
        end += 1;
    }
    end
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// snake_case a single part that is already in display form
fn snake_case_part(part: &str) -> String {
    let chars: Vec<char> = part.chars().collect();
    let mut spaced = String::with_capacity(part.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let breaks = match prev {
            None => false,
            Some(prev) => {
                c.is_ascii_uppercase()
                    || (c.is_ascii_digit() && prev.is_ascii_lowercase())
                    || (c.is_ascii_lowercase() && prev.is_ascii_digit())
            }
        };
        if breaks {
            spaced.push(' ');
        }
        spaced.push(c);
    }

    slugify(&spaced)
}

/// Transliterate to ASCII, lower-case and join alphanumeric words with
/// single underscores
fn slugify(s: &str) -> String {
    let ascii = deunicode_with_tofu(s, " ");
    let mut out = String::with_capacity(ascii.len());
    let mut pending_break = false;

    for c in ascii.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_alphanumeric() {
            if pending_break && !out.is_empty() {
                out.push('_');
            }
            pending_break = false;
            out.push(c);
        } else {
            pending_break = true;
        }
    }

    out
}
