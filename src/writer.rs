//! Object serialization and a minimal classical-file writer.
//!
//! The serializer emits every [`Object`] variant in PDF syntax such that
//! scanning the output reproduces the value exactly (the round-trip
//! property the test suite leans on). The document writer produces a
//! complete single-section classical file, and `append_update` grows a
//! file by one incremental-update section whose trailer points back via
//! `/Prev`.

use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef, StringFormat};
use crate::xref;
use std::collections::BTreeMap;

/// Serialize one object into `out`.
pub fn serialize_object(obj: &Object, out: &mut Vec<u8>) {
    match obj {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => out.extend_from_slice(format_real(*value).as_bytes()),
        Object::String(bytes, StringFormat::Literal) => write_literal_string(bytes, out),
        Object::String(bytes, StringFormat::Hex) => {
            out.push(b'<');
            for byte in bytes {
                out.extend_from_slice(format!("{:02X}", byte).as_bytes());
            }
            out.push(b'>');
        }
        Object::Name(name) => write_name(name, out),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                serialize_object(item, out);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dict(dict, out),
        Object::Stream(stream) => {
            // The written /Length always matches the payload.
            let mut dict = stream.dict.clone();
            dict.insert("Length".to_string(), Object::Integer(stream.data.len() as i64));
            write_dict(&dict, out);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.data);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(r) => out.extend_from_slice(format!("{}", r).as_bytes()),
    }
}

/// Serialize an object to a standalone byte vector.
pub fn serialize_to_vec(obj: &Object) -> Vec<u8> {
    let mut out = Vec::new();
    serialize_object(obj, &mut out);
    out
}

fn write_dict(dict: &Dictionary, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<< ");
    for (key, value) in dict {
        write_name(key, out);
        out.push(b' ');
        serialize_object(value, out);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

fn write_name(name: &str, out: &mut Vec<u8>) {
    out.push(b'/');
    for &byte in name.as_bytes() {
        let needs_escape = byte == b'#'
            || byte < 0x21
            || byte > 0x7E
            || crate::scanner::is_delimiter(byte);
        if needs_escape {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        } else {
            out.push(byte);
        }
    }
}

fn write_literal_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            // A raw CR would read back as LF.
            b'\r' => out.extend_from_slice(b"\\r"),
            other => out.push(other),
        }
    }
    out.push(b')');
}

/// Format a real without an exponent (PDF numbers have none) and with a
/// decimal point so it scans back as a real.
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        // Non-finite reals have no PDF syntax; zero is the safe fallback.
        return "0.0".to_string();
    }
    let mut text = format!("{}", value);
    if text.contains('e') || text.contains('E') {
        text = format!("{:.10}", value);
        while text.ends_with('0') && !text.ends_with(".0") {
            text.pop();
        }
    }
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Write a complete classical single-section file.
///
/// `extra_trailer` supplies `/Root` (and anything else); `/Size` is
/// computed from the objects unless supplied.
pub fn write_document(
    version: &str,
    objects: &[(ObjectRef, Object)],
    extra_trailer: &Dictionary,
) -> Vec<u8> {
    let mut out = format!("%PDF-{}\n", version).into_bytes();
    // Binary-detection comment line.
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let offsets = write_bodies(&mut out, objects);
    let xref_offset = out.len();
    write_xref_table(&mut out, &offsets);
    write_trailer(&mut out, &offsets, extra_trailer, None, xref_offset);
    out
}

/// Append an incremental-update section to `base`.
///
/// The new trailer points at the previous section through `/Prev`, so the
/// update's entries shadow the base's.
pub fn append_update(
    base: &[u8],
    objects: &[(ObjectRef, Object)],
    extra_trailer: &Dictionary,
) -> Result<Vec<u8>> {
    let prev = xref::find_startxref(base)?;

    let mut out = base.to_vec();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    let offsets = write_bodies(&mut out, objects);
    let xref_offset = out.len();
    write_xref_table(&mut out, &offsets);
    write_trailer(&mut out, &offsets, extra_trailer, Some(prev), xref_offset);
    Ok(out)
}

fn write_bodies(
    out: &mut Vec<u8>,
    objects: &[(ObjectRef, Object)],
) -> BTreeMap<u32, (u64, u16)> {
    let mut sorted: Vec<&(ObjectRef, Object)> = objects.iter().collect();
    sorted.sort_by_key(|(r, _)| *r);

    let mut offsets = BTreeMap::new();
    for (r, obj) in sorted {
        offsets.insert(r.num, (out.len() as u64, r.gen));
        out.extend_from_slice(format!("{} {} obj\n", r.num, r.gen).as_bytes());
        serialize_object(obj, out);
        out.extend_from_slice(b"\nendobj\n");
    }
    offsets
}

/// Write the `xref` keyword and contiguous subsections covering the
/// object numbers in `offsets`, plus the mandatory free entry for object
/// zero when the run starts there.
fn write_xref_table(out: &mut Vec<u8>, offsets: &BTreeMap<u32, (u64, u16)>) {
    // Rows: object zero's free head plus one in-use row per object.
    let mut rows: BTreeMap<u32, String> = BTreeMap::new();
    if !offsets.contains_key(&0) {
        rows.insert(0, "0000000000 65535 f \n".to_string());
    }
    for (num, (offset, gen)) in offsets {
        rows.insert(*num, format!("{:010} {:05} n \n", offset, gen));
    }

    out.extend_from_slice(b"xref\n");
    let numbers: Vec<u32> = rows.keys().copied().collect();
    let mut start = 0usize;
    while start < numbers.len() {
        let mut end = start + 1;
        while end < numbers.len() && numbers[end] == numbers[end - 1] + 1 {
            end += 1;
        }
        let first = numbers[start];
        out.extend_from_slice(format!("{} {}\n", first, end - start).as_bytes());
        for num in &numbers[start..end] {
            out.extend_from_slice(rows[num].as_bytes());
        }
        start = end;
    }
}

fn write_trailer(
    out: &mut Vec<u8>,
    offsets: &BTreeMap<u32, (u64, u16)>,
    extra: &Dictionary,
    prev: Option<u64>,
    xref_offset: usize,
) {
    let max_object = offsets.keys().max().copied().unwrap_or(0);

    let mut trailer = Dictionary::new();
    trailer.insert("Size".to_string(), Object::Integer(max_object as i64 + 1));
    for (key, value) in extra {
        trailer.insert(key.clone(), value.clone());
    }
    if let Some(prev) = prev {
        trailer.insert("Prev".to_string(), Object::Integer(prev as i64));
    }

    out.extend_from_slice(b"trailer\n");
    write_dict(&trailer, out);
    out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
}
