//! Identifier normalization.
//!
//! Handles arrive embedded in URLs, labels and free text, sometimes percent-encoded
//! and sometimes typed with look-alike Unicode punctuation. Everything here is
//! pure and total: malformed input yields `None`, never an error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Identifier;

static OPAQUE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{22}$").expect("opaque id pattern"));
static OPAQUE_ID_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z0-9_-])(UC[A-Za-z0-9_-]{22})(?:$|[^A-Za-z0-9_-])").expect("opaque id scan pattern"));

/// Characters that end a handle body.
const HANDLE_TERMINATORS: &[char] = &['/', '?', '#', '&', '@', '"', '\'', '<', '>', '(', ')', '[', ']', ',', '|', '\\'];
/// Sentence punctuation trimmed from the end of a handle body.
const TRAILING_PUNCT: &[char] = &['.', ':', ';', '!'];

/// Fold visually-equivalent punctuation to ASCII; `None` drops the character.
fn fold_char(c: char) -> Option<char> {
    Some(match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{FF07}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' | '\u{FF02}' => '"',
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' | '\u{FF0D}' => '-',
        '\u{FF0E}' | '\u{3002}' => '.',
        '\u{FF3F}' => '_',
        '\u{FF20}' => '@',
        '\u{FF0F}' => '/',
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{3000}' => ' ',
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => return None,
        other => other,
    })
}

pub(crate) fn fold_punctuation(s: &str) -> String { s.chars().filter_map(fold_char).collect() }

fn is_escape(b: &[u8], i: usize) -> bool {
    i + 2 < b.len() && b[i] == b'%' && b[i + 1].is_ascii_hexdigit() && b[i + 2].is_ascii_hexdigit()
}

/// One decoding pass. Consecutive escapes are decoded together so multi-byte
/// UTF-8 survives; bytes that are not valid UTF-8 keep their `%XX` spelling.
fn decode_pass(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < bytes.len() {
        if !is_escape(bytes, i) {
            let Some(ch) = raw[i..].chars().next() else { break };
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }
        let start = i;
        while is_escape(bytes, i) {
            i += 3;
        }
        let run = &raw[start..i];
        let decoded = urlencoding::decode_binary(run.as_bytes());
        let mut rest: &[u8] = &decoded;
        let mut src = run;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let good = e.valid_up_to();
                    let bad = e.error_len().unwrap_or(rest.len() - good);
                    out.push_str(std::str::from_utf8(&rest[..good]).unwrap_or_default());
                    out.push_str(&src[good * 3..(good + bad) * 3]);
                    rest = &rest[good + bad..];
                    src = &src[(good + bad) * 3..];
                }
            }
        }
    }
    out
}

/// Percent-decode to a fixed point. Every productive pass shortens the string.
fn percent_decode(raw: &str) -> String {
    let mut cur = raw.to_string();
    while cur.contains('%') {
        let next = decode_pass(&cur);
        if next == cur { break; }
        cur = next;
    }
    cur
}

/// True for a canonical opaque channel id (`UC` + 22 URL-safe characters).
pub fn is_opaque_id(s: &str) -> bool { OPAQUE_ID.is_match(s) }

/// Find an opaque channel id anywhere in `raw` (URLs, labels).
pub fn extract_opaque_id(raw: &str) -> Option<String> {
    let decoded = percent_decode(raw);
    OPAQUE_ID_IN_TEXT.captures(&decoded).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Canonicalize a raw handle string into an [`Identifier`] such as `@foo`.
///
/// Takes the token after the first `@` marker, drops repeated markers and any
/// trailing path or query, and lower-cases it. Opaque ids are a separate class
/// and yield `None` even when written with a marker.
pub fn normalize(raw: &str) -> Option<Identifier> {
    let folded = fold_punctuation(&percent_decode(raw));
    let at = folded.find('@')?;
    let body = folded[at..].trim_start_matches('@');
    let end = body
        .find(|c: char| c.is_whitespace() || c.is_control() || HANDLE_TERMINATORS.contains(&c))
        .unwrap_or(body.len());
    let body = body[..end].trim_end_matches(TRAILING_PUNCT);
    if body.is_empty() || is_opaque_id(body) {
        return None;
    }
    Some(Identifier::from_normalized(format!("@{}", body.to_lowercase())))
}

/// Comparison key for a display name: folded punctuation, collapsed whitespace, lower case.
pub fn name_key(raw: &str) -> Option<String> {
    let folded = fold_punctuation(raw);
    let joined = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() { None } else { Some(joined.to_lowercase()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> Option<String> { normalize(raw).map(|i| i.as_str().to_string()) }

    #[test]
    fn equivalent_spellings_share_a_key() {
        assert_eq!(key("@Foo/videos").as_deref(), Some("@foo"));
        assert_eq!(key("@foo").as_deref(), Some("@foo"));
        assert_eq!(key("@F%6Fo").as_deref(), Some("@foo"));
        assert_eq!(key("https://www.example.com/@Foo?si=abc").as_deref(), Some("@foo"));
        assert_eq!(key("%40foo").as_deref(), Some("@foo"));
        assert_eq!(key("\u{FF20}foo").as_deref(), Some("@foo"));
    }

    #[test]
    fn extracts_handle_from_surrounding_text() {
        assert_eq!(key("Video by @Some_Creator and friends").as_deref(), Some("@some_creator"));
        assert_eq!(key("thanks @@@bar.").as_deref(), Some("@bar"));
        assert_eq!(key("@a\u{200B}b").as_deref(), Some("@ab"));
        assert_eq!(key("@caf%C3%A9").as_deref(), Some("@café"));
    }

    #[test]
    fn folds_lookalike_punctuation() {
        assert_eq!(key("@foo\u{2014}bar").as_deref(), Some("@foo-bar"));
        assert_eq!(key("@foo\u{FF0E}bar\u{FF3F}x").as_deref(), Some("@foo.bar_x"));
        assert_eq!(key("\u{201C}@Quoted\u{201D}").as_deref(), Some("@quoted"));
    }

    #[test]
    fn opaque_ids_are_never_handles() {
        let id = "UC0123456789abcdefghijkl";
        assert_eq!(id.len(), 24);
        assert!(is_opaque_id(id));
        assert_eq!(key(id), None);
        assert_eq!(key(&format!("@{}", id)), None);
        assert_eq!(extract_opaque_id(&format!("https://example.com/channel/{}/videos", id)).as_deref(), Some(id));
    }

    #[test]
    fn malformed_input_is_absent_not_an_error() {
        for raw in ["", "@", "@@@", "no marker", "@/videos", "%E0%A4%A", "@%zz", "@..."] {
            let _ = normalize(raw);
        }
        assert_eq!(key(""), None);
        assert_eq!(key("@"), None);
        assert_eq!(key("@/videos"), None);
        assert_eq!(key("no marker"), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "@Foo/videos",
            "@F%6Fo",
            "https://example.com/@Bar.Baz?x=1",
            "by @Some_Creator.",
            "@a%2525b",
            "@caf%C3%A9",
            "\u{FF20}Wide\u{FF3F}Name",
            "@Ab\u{2013}Cd",
            "@İstanbul",
            "https://example.com/@F%6Fo?x=%FF",
            "%FF @F%6Fo",
            "@bad%FF%C3",
            "@a%25%34%31",
        ];
        for raw in samples {
            let once = normalize(raw).unwrap_or_else(|| panic!("{raw} should normalize"));
            let twice = normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn stray_bytes_do_not_block_decoding() {
        assert_eq!(key("https://example.com/@F%6Fo?x=%FF").as_deref(), Some("@foo"));
        assert_eq!(key("%FF @F%6Fo").as_deref(), Some("@foo"));
        assert_eq!(key("@caf%C3%A9%FF").as_deref(), Some("@café%ff"));
        assert_eq!(percent_decode("%E0%A4%A"), "%E0%A4%A");
    }

    #[test]
    fn deeply_nested_escapes_decode_fully() {
        let mut enc = "%41".to_string();
        for _ in 0..12 {
            enc = enc.replacen('%', "%25", 1);
        }
        let once = normalize(&format!("@a{}", enc)).unwrap();
        assert_eq!(once.as_str(), "@aa");
        assert_eq!(normalize(once.as_str()).unwrap(), once);
    }

    #[test]
    fn name_key_is_case_and_space_insensitive() {
        assert_eq!(name_key("  Sam\u{00A0} Jones ").as_deref(), Some("sam jones"));
        assert_eq!(name_key("SAM JONES"), name_key("sam jones"));
        assert_eq!(name_key("   "), None);
    }
}
