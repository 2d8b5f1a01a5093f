//! Filesystem-safe names for controls and archive entries.
//!
//! Control names are free text, file names are not. Every character that is
//! not in the safe set (and whose code point is at most 255) becomes `%XX`.
//! Names whose escaped form is longer than [`MAX_NAME_LEN`] are cut and get a
//! short content hash appended so distinct long names keep distinct files.
//!
//! Notes
//! - Lengths are measured on the escaped form; escaping only grows a name.
//! - The hash suffix is `xxh64(name, seed 0) % 4096` as 3 lowercase hex digits.
//! - Legacy sources used a doubled `%%XXXX` form; `unescape` still reads it.

use std::path::PathBuf;

use xxhash_rust::xxh64::xxh64;

/// Longest escaped file-name stem written to a source tree.
pub const MAX_NAME_LEN: usize = 50;

const ESCAPE: char = '%';

/// Hash suffix is `_` plus three hex digits.
const HASH_SUFFIX_LEN: usize = 4;

/// Characters written verbatim; everything else up to U+00FF is escaped.
fn is_safe(c: char) -> bool
{
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '~' | '.' | ' ' | '[' | ']') || (c as u32) > 255
}

/// Escape a raw name into a path segment.
pub fn escape(raw: &str) -> String
{
    let mut out = String::with_capacity(raw.len());

    for c in raw.chars()
    {
        if is_safe(c)
        {
            out.push(c);
        }
        else
        {
            out.push(ESCAPE);
            out.push_str(&format!("{:02X}", c as u32));
        }
    }

    out
}

/// Exact inverse of [`escape`]. Malformed sequences are kept literally.
pub fn unescape(escaped: &str) -> String
{
    let chars: Vec<char> = escaped
        .chars()
        .collect();
    let mut out = String::with_capacity(escaped.len());
    let mut i = 0;

    while i < chars.len()
    {
        if chars[i] != ESCAPE
        {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        // Legacy `%%XXXX`
        if chars.get(i + 1) == Some(&ESCAPE)
            && let Some(c) = decode_hex(&chars, i + 2, 4)
        {
            out.push(c);
            i += 6;
            continue;
        }

        match decode_hex(&chars, i + 1, 2)
        {
            Some(c) =>
            {
                out.push(c);
                i += 3;
            }
            None =>
            {
                out.push(ESCAPE);
                i += 1;
            }
        }
    }

    out
}

fn decode_hex(
    chars: &[char],
    start: usize,
    width: usize,
) -> Option<char>
{
    let digits: String = chars
        .get(start..start + width)?
        .iter()
        .collect();

    if !digits
        .chars()
        .all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }

    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
}

/// Cut an escaped name to [`MAX_NAME_LEN`] characters with a hash suffix.
///
/// Names already within the limit are returned unchanged, which makes the
/// function idempotent. The cut never splits a `%XX` sequence.
pub fn truncate_if_too_long(name: &str) -> String
{
    let len = name
        .chars()
        .count();
    if len <= MAX_NAME_LEN
    {
        return name.to_string();
    }

    let mut kept: Vec<char> = name
        .chars()
        .take(MAX_NAME_LEN - HASH_SUFFIX_LEN)
        .collect();

    // Back off when the boundary lands inside an escape sequence.
    let n = kept.len();
    if kept[n - 1] == ESCAPE
    {
        kept.truncate(n - 1);
    }
    else if kept[n - 2] == ESCAPE
    {
        kept.truncate(n - 2);
    }

    let hash = xxh64(name.as_bytes(), 0) % 4096;
    let mut out: String = kept
        .into_iter()
        .collect();
    out.push_str(&format!("_{hash:03x}"));
    out
}

/// Escape then truncate: the file stem used for a control or entry.
pub fn file_stem_for(raw: &str) -> String
{
    truncate_if_too_long(&escape(raw))
}

/// Normalize an archive entry path: forward slashes, no leading slash.
pub fn normalize_archive_path(path: &str) -> String
{
    path.replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}

/// Case-insensitive lookup key for a normalized archive path.
pub fn archive_key(path: &str) -> String
{
    normalize_archive_path(path).to_lowercase()
}

/// Turn a forward-slash relative path into a platform path.
pub fn to_platform_path(rel: &str) -> PathBuf
{
    rel.split('/')
        .filter(|seg| !seg.is_empty())
        .collect()
}
