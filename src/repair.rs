//! Whole-file rescue scan for damaged cross-reference data.
//!
//! Invoked only when the recovery strategy answers `Fix` to a broken or
//! missing xref. The scan walks the entire buffer for `N G obj` headers,
//! records the offset of the first number of each header (later duplicates
//! win, matching incremental-update order), takes the last `trailer`
//! dictionary seen, and synthesizes the missing trailer pieces when the
//! file has none. Repair is never silent; the rebuild is logged as a
//! warning.

use crate::config::ParseOptions;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::parse_value;
use crate::recovery::RecoveryStrategy;
use crate::scanner::{Scanner, Token};
use crate::xref::{MergedTable, XrefEntry, XrefSection};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    /// `N G obj` header pattern.
    static ref RE_OBJ: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d+)[ \t\r\n\f\x00]+(\d+)[ \t\r\n\f\x00]+obj").unwrap();

    /// `trailer <<` pattern.
    static ref RE_TRAILER: regex::bytes::Regex =
        regex::bytes::Regex::new(r"trailer[ \t\r\n\f\x00]*<<").unwrap();
}

/// Offset of the first `N G obj` header in the buffer, if any.
pub(crate) fn find_first_object_header(buf: &[u8]) -> Option<u64> {
    RE_OBJ.find(buf).map(|m| m.start() as u64)
}

/// True when the byte after an `obj` keyword can begin a PDF value.
///
/// Filters out `N G obj` lookalikes inside binary stream payloads.
fn valid_object_follows(buf: &[u8], after: usize) -> bool {
    let mut i = after;
    while i < buf.len() && crate::scanner::is_whitespace(buf[i]) {
        i += 1;
    }
    match buf.get(i) {
        Some(&b) => {
            matches!(b, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'+' | b'-' | b'.')
                || b.is_ascii_digit()
        }
        None => false,
    }
}

/// Rebuild the cross-reference table by scanning the whole buffer.
pub fn rebuild(
    ctx: &Context,
    buf: &[u8],
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
) -> Result<MergedTable> {
    log::warn!("rebuilding cross-reference table by scanning {} bytes", buf.len());

    let mut entries: HashMap<u32, XrefEntry> = HashMap::new();
    for caps in RE_OBJ.captures_iter(buf) {
        ctx.check()?;
        let whole = caps.get(0).expect("capture 0 always present");

        let num: u32 = match String::from_utf8_lossy(&caps[1]).parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let gen: u16 = match String::from_utf8_lossy(&caps[2]).parse() {
            Ok(g) => g,
            Err(_) => continue,
        };
        if !valid_object_follows(buf, whole.end()) {
            log::debug!("skipping object header lookalike at offset {}", whole.start());
            continue;
        }

        // Later occurrences shadow earlier ones, like incremental updates.
        entries.insert(num, XrefEntry::InUse {
            offset: whole.start() as u64,
            gen,
        });
    }

    if entries.is_empty() {
        return Err(Error::XrefMissing);
    }

    entries.entry(0).or_insert(XrefEntry::Free {
        next_free: 0,
        gen: 65535,
    });

    let max_object = entries.keys().copied().max().unwrap_or(0);
    let mut trailer = find_last_trailer(ctx, buf, options, recovery).unwrap_or_default();

    let size_ok = trailer
        .get("Size")
        .and_then(Object::as_integer)
        .map(|s| s > max_object as i64)
        .unwrap_or(false);
    if !size_ok {
        trailer.insert("Size".to_string(), Object::Integer(max_object as i64 + 1));
    }

    if !trailer.contains_key("Root") {
        if let Some(root) = find_catalog(ctx, buf, options, recovery, &entries) {
            log::warn!("recovered document catalog at {}", root);
            trailer.insert("Root".to_string(), Object::Reference(root));
        }
    }

    log::warn!(
        "rebuilt cross-reference table: {} objects, max object number {}",
        entries.len(),
        max_object
    );

    Ok(MergedTable::from_sections(vec![XrefSection::new(entries, trailer)]))
}

/// Parse the dictionary after the last `trailer` keyword, if there is one.
fn find_last_trailer(
    ctx: &Context,
    buf: &[u8],
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
) -> Option<Dictionary> {
    let last = RE_TRAILER.find_iter(buf).last()?;

    let mut scanner = Scanner::new(buf, *options, recovery.clone());
    // Rewind to the `<<` that ends the match.
    scanner.seek_to(last.end() as u64 - 2);
    match parse_value(ctx, &mut scanner, 0) {
        Ok(Object::Dictionary(d)) => Some(d),
        _ => {
            log::warn!("trailer dictionary at offset {} is unparseable", last.start());
            None
        }
    }
}

/// Look for the object whose dictionary carries `/Type /Catalog`.
fn find_catalog(
    ctx: &Context,
    buf: &[u8],
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
    entries: &HashMap<u32, XrefEntry>,
) -> Option<ObjectRef> {
    let mut numbers: Vec<u32> = entries.keys().copied().collect();
    numbers.sort_unstable();

    let mut scanner = Scanner::new(buf, *options, recovery.clone());
    for num in numbers {
        let Some(XrefEntry::InUse { offset, gen }) = entries.get(&num) else {
            continue;
        };
        ctx.check().ok()?;
        scanner.seek_to(*offset);

        let dict = (|| -> Result<Option<Dictionary>> {
            for _ in 0..2 {
                match scanner.next_token()? {
                    Token::Integer(_) => {}
                    _ => return Ok(None),
                }
            }
            match scanner.next_token()? {
                Token::Keyword(ref word) if word == "obj" => {}
                _ => return Ok(None),
            }
            match parse_value(ctx, &mut scanner, 0)? {
                Object::Dictionary(d) => Ok(Some(d)),
                _ => Ok(None),
            }
        })()
        .ok()
        .flatten();

        if let Some(dict) = dict {
            if dict.get("Type").and_then(Object::as_name) == Some("Catalog") {
                return Some(ObjectRef::new(num, *gen));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::LenientRecovery;

    fn rebuild_buf(buf: &[u8]) -> Result<MergedTable> {
        rebuild(
            &Context::background(),
            buf,
            &ParseOptions::default(),
            &(Arc::new(LenientRecovery) as Arc<dyn RecoveryStrategy>),
        )
    }

    #[test]
    fn test_rebuild_with_trailer() {
        let buf = b"%PDF-1.4\n\
            1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
            2 0 obj\n<< /Type /Pages /Count 0 >>\nendobj\n\
            trailer\n<< /Size 3 /Root 1 0 R >>\n";

        let table = rebuild_buf(buf).unwrap();
        assert!(matches!(table.get(1), Some(XrefEntry::InUse { .. })));
        assert!(matches!(table.get(2), Some(XrefEntry::InUse { .. })));
        assert!(matches!(table.get(0), Some(XrefEntry::Free { .. })));
        assert!(table.trailer().contains_key("Root"));
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_rebuild_records_header_offset() {
        let prefix = b"%PDF-1.4\n";
        let mut buf = prefix.to_vec();
        buf.extend_from_slice(b"7 0 obj\n<< /Length 0 >>\nendobj\n");
        buf.extend_from_slice(b"trailer\n<< /Size 8 /Root 7 0 R >>\n");

        let table = rebuild_buf(&buf).unwrap();
        assert_eq!(
            table.get(7),
            Some(&XrefEntry::InUse {
                offset: prefix.len() as u64,
                gen: 0
            })
        );
    }

    #[test]
    fn test_rebuild_synthesizes_trailer() {
        let buf = b"3 0 obj\n<< /Type /Catalog >>\nendobj\n5 0 obj\n42\nendobj\n";
        let table = rebuild_buf(buf).unwrap();

        // Size is one past the highest object number.
        assert_eq!(table.trailer().get("Size").unwrap().as_integer(), Some(6));
        // The catalog was discovered by scanning.
        assert_eq!(
            table.trailer().get("Root").unwrap().as_reference(),
            Some(ObjectRef::new(3, 0))
        );
    }

    #[test]
    fn test_rebuild_later_duplicate_wins() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"4 0 obj\n(old)\nendobj\n");
        let newer = buf.len();
        buf.extend_from_slice(b"4 0 obj\n(new)\nendobj\n");
        buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");

        let table = rebuild_buf(&buf).unwrap();
        assert_eq!(
            table.get(4),
            Some(&XrefEntry::InUse {
                offset: newer as u64,
                gen: 0
            })
        );
    }

    #[test]
    fn test_rebuild_skips_lookalikes() {
        // "1 0 obj" followed by bytes that cannot start an object.
        let buf = b"1 0 obj\x01\x02 junk 2 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let table = rebuild_buf(buf).unwrap();
        assert!(table.get(1).is_none());
        assert!(matches!(table.get(2), Some(XrefEntry::InUse { .. })));
    }

    #[test]
    fn test_rebuild_empty_input_fails() {
        assert!(matches!(rebuild_buf(b"nothing here"), Err(Error::XrefMissing)));
    }

    #[test]
    fn test_find_first_object_header() {
        let buf = b"%PDF-1.5\nxx 12 0 obj << >> endobj";
        assert_eq!(find_first_object_header(buf), Some(12));
    }
}
