//! Cross-reference model and resolver.
//!
//! The resolver locates the `startxref` anchor, walks the `/Prev` chain
//! backwards through classical tables and xref streams (including hybrid
//! `/XRefStm` sections), and produces a [`MergedTable`]: the list of
//! sections ordered newest first. Lookups walk that list and return the
//! first hit, which gives incremental updates their newest-wins semantics —
//! a free entry in a newer section shadows an in-use entry in an older one.
//!
//! Multi-byte integers inside xref streams are big-endian.

use crate::config::ParseOptions;
use crate::context::Context;
use crate::error::{Error, Location, Result};
use crate::filters::FilterRegistry;
use crate::object::{Dictionary, Object, ObjectRef, Stream};
use crate::parser::parse_value;
use crate::recovery::{Action, RecoveryStrategy};
use crate::scanner::{Scanner, Token};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Largest entry count a single subsection or index range may declare.
const MAX_SUBSECTION_ENTRIES: i64 = 1_000_000;

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Object slot is free; `next_free` links the free list.
    Free {
        /// Object number of the next free object.
        next_free: u32,
        /// Generation to use if the slot is reused.
        gen: u16,
    },
    /// Object stored at a byte offset in the file.
    InUse {
        /// Byte offset of the `N G obj` header.
        offset: u64,
        /// Generation number.
        gen: u16,
    },
    /// Object stored inside an object stream.
    Compressed {
        /// Object number of the containing `/Type /ObjStm` stream.
        container: u32,
        /// Index of the object within the container.
        index: u16,
    },
}

/// One parsed cross-reference section plus the trailer that terminated it.
///
/// Immutable once parsed.
#[derive(Debug, Clone)]
pub struct XrefSection {
    entries: HashMap<u32, XrefEntry>,
    trailer: Dictionary,
}

impl XrefSection {
    /// Build a section from parsed parts.
    pub fn new(entries: HashMap<u32, XrefEntry>, trailer: Dictionary) -> Self {
        Self { entries, trailer }
    }

    /// Entry for an object number, if this section covers it.
    pub fn get(&self, num: u32) -> Option<&XrefEntry> {
        self.entries.get(&num)
    }

    /// The trailer dictionary that terminated this section.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// All entries of this section.
    pub fn entries(&self) -> &HashMap<u32, XrefEntry> {
        &self.entries
    }
}

/// Cross-reference sections ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    sections: Vec<XrefSection>,
}

impl MergedTable {
    /// Build a merged table from sections ordered newest first.
    pub fn from_sections(sections: Vec<XrefSection>) -> Self {
        Self { sections }
    }

    /// The sections, newest first.
    pub fn sections(&self) -> &[XrefSection] {
        &self.sections
    }

    /// Newest-wins lookup: the first section that mentions `num` decides,
    /// even when its entry is free.
    pub fn get(&self, num: u32) -> Option<&XrefEntry> {
        self.sections.iter().find_map(|s| s.get(num))
    }

    /// The newest trailer.
    pub fn trailer(&self) -> &Dictionary {
        match self.sections.first() {
            Some(s) => s.trailer(),
            None => empty_dict(),
        }
    }

    /// Largest object number mentioned by any section.
    pub fn max_object_number(&self) -> u32 {
        self.sections
            .iter()
            .flat_map(|s| s.entries.keys().copied())
            .max()
            .unwrap_or(0)
    }

    /// References to every live (non-free) object, ascending by number,
    /// with the generation taken from the winning entry.
    pub fn live_refs(&self) -> Vec<ObjectRef> {
        let mut numbers: Vec<u32> = self
            .sections
            .iter()
            .flat_map(|s| s.entries.keys().copied())
            .collect();
        numbers.sort_unstable();
        numbers.dedup();

        numbers
            .into_iter()
            .filter_map(|num| match self.get(num) {
                Some(XrefEntry::InUse { gen, .. }) => Some(ObjectRef::new(num, *gen)),
                Some(XrefEntry::Compressed { .. }) => Some(ObjectRef::new(num, 0)),
                _ => None,
            })
            .collect()
    }

    /// Enforce the trailer invariants: `/Root` present, `/Size` greater
    /// than the largest object number.
    pub fn validate(&self) -> Result<()> {
        let trailer = self.trailer();
        if !trailer.contains_key("Root") {
            return Err(Error::TrailerMissingRoot);
        }
        let size = trailer
            .get("Size")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::TrailerMalformed("missing /Size".to_string()))?;
        let max_object = self.max_object_number();
        if size <= max_object as i64 {
            return Err(Error::TrailerSizeMismatch { size, max_object });
        }
        Ok(())
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True when no section was parsed.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

fn empty_dict() -> &'static Dictionary {
    static EMPTY: std::sync::OnceLock<Dictionary> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Dictionary::new)
}

/// Find the integer following the last `startxref` in the buffer.
pub fn find_startxref(buf: &[u8]) -> Result<u64> {
    let needle = b"startxref";
    let pos = buf
        .windows(needle.len())
        .rposition(|window| window == needle)
        .ok_or(Error::XrefMissing)?;

    let tail = &buf[pos + needle.len()..];
    let mut i = 0;
    while i < tail.len() && !tail[i].is_ascii_digit() {
        // Only whitespace and comments may sit between the keyword and the
        // offset.
        if !crate::scanner::is_whitespace(tail[i]) && tail[i] != b'%' {
            return Err(Error::XrefMissing);
        }
        if tail[i] == b'%' {
            while i < tail.len() && !matches!(tail[i], b'\r' | b'\n') {
                i += 1;
            }
            continue;
        }
        i += 1;
    }
    let digits_start = i;
    while i < tail.len() && tail[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return Err(Error::XrefMissing);
    }
    String::from_utf8_lossy(&tail[digits_start..i])
        .parse::<u64>()
        .map_err(|_| Error::XrefMissing)
}

/// Resolve the complete cross-reference data of `buf`.
///
/// Walks the `/Prev` chain from the last `startxref`, parsing classical
/// tables, xref streams, and hybrid `/XRefStm` companions, and returns the
/// sections merged newest first. Validation of the resulting trailer is the
/// caller's decision (a repairing caller wants the table even when the
/// trailer is damaged).
pub fn resolve(
    ctx: &Context,
    buf: &[u8],
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
    registry: &FilterRegistry,
) -> Result<MergedTable> {
    let start = find_startxref(buf)?;

    let mut scanner = Scanner::new(buf, *options, recovery.clone());
    let mut sections = Vec::new();
    let mut visited: HashSet<u64> = HashSet::new();
    let mut next_offset = Some(start);

    while let Some(offset) = next_offset {
        ctx.check()?;

        if sections.len() >= options.max_xref_depth {
            return Err(Error::XrefDepthExceeded(options.max_xref_depth));
        }
        if !visited.insert(offset) {
            let err = Error::XrefLoop(offset);
            match recovery.on_error(&err, &Location::at("xref", offset)) {
                Action::Fail => return Err(err),
                _ => break,
            }
        }

        let section = parse_section_at(ctx, &mut scanner, offset, options, recovery, registry)
            .map_err(|e| e.at(Location::at("xref", offset)))?;

        // A hybrid classical section names an xref stream companion.
        let hybrid = section
            .trailer()
            .get("XRefStm")
            .and_then(Object::as_integer)
            .filter(|&o| o > 0)
            .map(|o| o as u64);
        let prev = section
            .trailer()
            .get("Prev")
            .and_then(Object::as_integer)
            .filter(|&o| o > 0)
            .map(|o| o as u64);
        sections.push(section);

        if let Some(stm_offset) = hybrid {
            if visited.insert(stm_offset) {
                let stm =
                    parse_section_at(ctx, &mut scanner, stm_offset, options, recovery, registry)
                        .map_err(|e| e.at(Location::at("xref", stm_offset)))?;
                sections.push(stm);
            } else {
                log::warn!("/XRefStm points at an already-visited offset {}", stm_offset);
            }
        }

        next_offset = match prev {
            Some(p) if visited.contains(&p) => {
                // Back-pointer into ground already covered; stop walking
                // rather than guessing.
                log::warn!("/Prev points at an already-visited offset {}", p);
                None
            }
            other => other,
        };
    }

    Ok(MergedTable::from_sections(sections))
}

/// Parse the cross-reference section starting at `offset`: either a
/// classical `xref` table or an xref stream.
fn parse_section_at(
    ctx: &Context,
    scanner: &mut Scanner<'_>,
    offset: u64,
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
    registry: &FilterRegistry,
) -> Result<XrefSection> {
    if offset as usize >= scanner.len() {
        return Err(Error::XrefTruncated);
    }
    scanner.seek_to(offset);

    match scanner.peek_token()? {
        Token::Keyword(ref word) if word == "xref" => {
            parse_classical_section(ctx, scanner, options, recovery)
        }
        Token::Integer(_) => parse_stream_section(ctx, scanner, options, recovery, registry),
        _ => Err(Error::XrefTruncated),
    }
}

/// Parse a classical table: subsections of fixed-width entry lines followed
/// by `trailer` and its dictionary.
fn parse_classical_section(
    ctx: &Context,
    scanner: &mut Scanner<'_>,
    _options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
) -> Result<XrefSection> {
    scanner.expect_keyword("xref")?;

    let mut entries: HashMap<u32, XrefEntry> = HashMap::new();
    let trailer;

    loop {
        ctx.check()?;
        match scanner.next_token()? {
            Token::Integer(start) => {
                let count = match scanner.next_token()? {
                    Token::Integer(c) => c,
                    _ => return Err(Error::XrefTruncated),
                };
                if start < 0 || count < 0 || start.saturating_add(count) > u32::MAX as i64 {
                    return Err(Error::XrefTruncated);
                }
                if count > MAX_SUBSECTION_ENTRIES {
                    return Err(Error::LimitExceeded {
                        limit: "xref subsection entry count",
                    });
                }
                for i in 0..count as u32 {
                    let num = start as u32 + i;
                    let entry = parse_classical_entry(scanner, recovery)?;
                    entries.entry(num).or_insert(entry);
                }
            }
            Token::Keyword(ref word) if word == "trailer" => {
                let dict_pos = scanner.position();
                match parse_value(ctx, scanner, 0)? {
                    Object::Dictionary(d) => trailer = d,
                    other => {
                        return Err(Error::TrailerMalformed(format!(
                            "expected dictionary at byte {}, found {}",
                            dict_pos,
                            other.type_name()
                        )));
                    }
                }
                break;
            }
            Token::Eof => return Err(Error::XrefTruncated),
            other => {
                let err = Error::Lexical {
                    offset: scanner.position(),
                    reason: format!("unexpected token {:?} in xref table", other),
                };
                match recovery.on_error(&err, &Location::at("xref", scanner.position())) {
                    Action::Fail => return Err(err),
                    _ => continue,
                }
            }
        }
    }

    Ok(XrefSection::new(entries, trailer))
}

/// One `offset gen f|n` line.
fn parse_classical_entry(
    scanner: &mut Scanner<'_>,
    recovery: &Arc<dyn RecoveryStrategy>,
) -> Result<XrefEntry> {
    let field1 = match scanner.next_token()? {
        Token::Integer(v) if v >= 0 => v as u64,
        _ => return Err(Error::XrefTruncated),
    };
    let field2 = match scanner.next_token()? {
        Token::Integer(v) if (0..=65535).contains(&v) => v as u16,
        _ => return Err(Error::XrefTruncated),
    };
    match scanner.next_token()? {
        Token::Keyword(ref word) if word == "n" => Ok(XrefEntry::InUse {
            offset: field1,
            gen: field2,
        }),
        Token::Keyword(ref word) if word == "f" => Ok(XrefEntry::Free {
            next_free: field1 as u32,
            gen: field2,
        }),
        other => {
            let err = Error::Lexical {
                offset: scanner.position(),
                reason: format!("invalid xref entry flag {:?}", other),
            };
            match recovery.on_error(&err, &Location::at("xref", scanner.position())) {
                Action::Fail => Err(err),
                // Treat the slot as free to keep numbering aligned.
                _ => Ok(XrefEntry::Free {
                    next_free: 0,
                    gen: 65535,
                }),
            }
        }
    }
}

/// Parse an xref stream section: indirect object header, stream dictionary,
/// decoded payload unpacked by `/W`, `/Index`, and `/Size`.
fn parse_stream_section(
    ctx: &Context,
    scanner: &mut Scanner<'_>,
    options: &ParseOptions,
    _recovery: &Arc<dyn RecoveryStrategy>,
    registry: &FilterRegistry,
) -> Result<XrefSection> {
    // Indirect object header.
    match scanner.next_token()? {
        Token::Integer(v) if v >= 0 => v,
        _ => return Err(Error::XrefTruncated),
    };
    match scanner.next_token()? {
        Token::Integer(v) if v >= 0 => v,
        _ => return Err(Error::XrefTruncated),
    };
    scanner.expect_keyword("obj")?;

    let dict = match parse_value(ctx, scanner, 0)? {
        Object::Dictionary(d) => d,
        other => {
            return Err(Error::TrailerMalformed(format!(
                "xref stream object is a {}",
                other.type_name()
            )));
        }
    };

    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        log::warn!("xref stream without /Type /XRef");
    }

    // `/Length` must be direct here; an indirect length would need the very
    // table being built. Fall back to scanning for endstream without one.
    match dict.get("Length").and_then(Object::as_integer) {
        Some(len) => scanner.set_next_stream_length(len),
        None => scanner.set_next_stream_length(-1),
    }
    let data = match scanner.next_token()? {
        Token::Stream(data) => data,
        _ => return Err(Error::XrefTruncated),
    };

    let stream = Stream::new(dict, data);
    let decoded = registry.decode(ctx, &stream.data, &stream.filter_chain(), options)?;
    let dict = stream.dict;

    // Field widths.
    let widths = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or(Error::XrefFieldWidthInvalid)?;
    if widths.len() != 3 {
        return Err(Error::XrefFieldWidthInvalid);
    }
    let mut w = [0usize; 3];
    for (i, obj) in widths.iter().enumerate() {
        let value = obj.as_integer().ok_or(Error::XrefFieldWidthInvalid)?;
        if !(0..=8).contains(&value) {
            return Err(Error::XrefFieldWidthInvalid);
        }
        w[i] = value as usize;
    }
    // The offset field cannot be absent.
    if w[1] == 0 {
        return Err(Error::XrefFieldWidthInvalid);
    }
    let entry_size = w[0] + w[1] + w[2];

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::TrailerMalformed("xref stream missing /Size".to_string()))?;

    // Subsection ranges; default is the whole numbering space.
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => {
            if index.len() % 2 != 0 {
                return Err(Error::TrailerMalformed("odd /Index length".to_string()));
            }
            index
                .chunks_exact(2)
                .map(|pair| {
                    let start = pair[0].as_integer();
                    let count = pair[1].as_integer();
                    match (start, count) {
                        (Some(s), Some(c))
                            if s >= 0
                                && (0..=MAX_SUBSECTION_ENTRIES).contains(&c)
                                && s.saturating_add(c) <= u32::MAX as i64 =>
                        {
                            Ok((s as u32, c as u32))
                        }
                        _ => Err(Error::TrailerMalformed("invalid /Index range".to_string())),
                    }
                })
                .collect::<Result<_>>()?
        }
        None => {
            if !(0..=MAX_SUBSECTION_ENTRIES).contains(&size) {
                return Err(Error::LimitExceeded {
                    limit: "xref stream /Size",
                });
            }
            vec![(0, size as u32)]
        }
    };

    let mut entries: HashMap<u32, XrefEntry> = HashMap::new();
    let mut cursor = 0usize;
    for (start, count) in ranges {
        ctx.check()?;
        for i in 0..count {
            let end = cursor + entry_size;
            if end > decoded.len() {
                return Err(Error::XrefTruncated);
            }
            let record = &decoded[cursor..end];
            cursor = end;

            let kind = if w[0] == 0 {
                1
            } else {
                read_be_int(&record[..w[0]])
            };
            let field2 = read_be_int(&record[w[0]..w[0] + w[1]]);
            let field3 = read_be_int(&record[w[0] + w[1]..]);

            let entry = match kind {
                0 => XrefEntry::Free {
                    next_free: field2 as u32,
                    gen: field3 as u16,
                },
                1 => XrefEntry::InUse {
                    offset: field2,
                    gen: field3 as u16,
                },
                2 => XrefEntry::Compressed {
                    container: field2 as u32,
                    index: field3 as u16,
                },
                other => {
                    // Reserved types read as null references per spec;
                    // treat as free.
                    log::warn!("xref stream entry type {} treated as free", other);
                    XrefEntry::Free {
                        next_free: 0,
                        gen: 65535,
                    }
                }
            };
            entries.entry(start + i).or_insert(entry);
        }
    }

    Ok(XrefSection::new(entries, dict))
}

/// Big-endian integer of 0..=8 bytes.
fn read_be_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Probe the first indirect object for the linearization dictionary.
///
/// Advisory only: `/Linearized > 0` with `/L /O /N /H` all present marks
/// the document linearized. Nothing about the xref walk changes.
pub fn detect_linearization(
    ctx: &Context,
    buf: &[u8],
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
) -> bool {
    let Some(header_offset) = crate::repair::find_first_object_header(buf) else {
        return false;
    };

    let mut scanner = Scanner::new(buf, *options, recovery.clone());
    scanner.seek_to(header_offset);

    let probe = (|| -> Result<Option<Dictionary>> {
        match scanner.next_token()? {
            Token::Integer(_) => {}
            _ => return Ok(None),
        }
        match scanner.next_token()? {
            Token::Integer(_) => {}
            _ => return Ok(None),
        }
        match scanner.next_token()? {
            Token::Keyword(ref word) if word == "obj" => {}
            _ => return Ok(None),
        }
        match parse_value(ctx, &mut scanner, 0)? {
            Object::Dictionary(d) => Ok(Some(d)),
            _ => Ok(None),
        }
    })();

    let Ok(Some(dict)) = probe else {
        return false;
    };
    let linearized = dict
        .get("Linearized")
        .and_then(Object::as_number)
        .map(|v| v > 0.0)
        .unwrap_or(false);
    linearized
        && dict.contains_key("L")
        && dict.contains_key("O")
        && dict.contains_key("N")
        && dict.contains_key("H")
}
