//! Object stream (`/Type /ObjStm`) unpacking.
//!
//! An object stream carries `/N` compressed objects. Its decoded payload
//! starts with `/N` pairs of integers (object number, offset) occupying the
//! first `/First` bytes; each offset addresses the object's body relative
//! to `/First`. Every body is parsed in its own sub-scanner scoped to the
//! decoded payload, so a damaged object can be skipped without losing the
//! rest.

use crate::config::ParseOptions;
use crate::context::Context;
use crate::error::{Error, Location, Result};
use crate::filters::FilterRegistry;
use crate::object::{Object, Stream};
use crate::parser::parse_value;
use crate::recovery::{Action, RecoveryStrategy};
use crate::scanner::{Scanner, Token};
use std::sync::Arc;

/// Largest accepted `/N`.
const MAX_OBJECTS: i64 = 1_000_000;
/// Largest accepted `/First`.
const MAX_FIRST: i64 = 10_000_000;

/// Decode and unpack an object stream into `(object number, object)`
/// pairs, in stream order.
pub fn unpack(
    ctx: &Context,
    stream: &Stream,
    options: &ParseOptions,
    recovery: &Arc<dyn RecoveryStrategy>,
    registry: &FilterRegistry,
) -> Result<Vec<(u32, Object)>> {
    let malformed = |reason: &str| Error::ObjectStreamMalformed(reason.to_string());

    if stream.dict.get("Type").and_then(Object::as_name) != Some("ObjStm") {
        log::warn!("object stream container without /Type /ObjStm");
    }

    let count = stream
        .dict
        .get("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| malformed("missing /N"))?;
    let first = stream
        .dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| malformed("missing /First"))?;
    if !(0..=MAX_OBJECTS).contains(&count) {
        return Err(malformed("unreasonable /N"));
    }
    if !(0..=MAX_FIRST).contains(&first) {
        return Err(malformed("unreasonable /First"));
    }
    let count = count as usize;
    let first = first as usize;

    let decoded = registry.decode(ctx, &stream.data, &stream.filter_chain(), options)?;
    if decoded.len() < first {
        return Err(malformed("payload shorter than /First"));
    }

    // The pair table lives in the first `/First` bytes.
    let mut header = Scanner::new(&decoded[..first], *options, recovery.clone());
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let num = match header.next_token()? {
            Token::Integer(v) if v >= 0 => v as u32,
            _ => return Err(malformed("bad object number in pair table")),
        };
        let offset = match header.next_token()? {
            Token::Integer(v) if v >= 0 => v as usize,
            _ => return Err(malformed("bad offset in pair table")),
        };
        pairs.push((num, offset));
    }

    let body = &decoded[first..];
    let mut objects = Vec::with_capacity(count);
    for (num, offset) in pairs {
        ctx.check()?;
        if offset > body.len() {
            let err = malformed(&format!("object {} offset {} beyond payload", num, offset));
            match recovery.on_error(&err, &Location::at("objstm", offset as u64)) {
                Action::Fail => return Err(err),
                _ => continue,
            }
        }

        let mut scanner = Scanner::new(body, *options, recovery.clone());
        scanner.seek_to(offset as u64);
        match parse_value(ctx, &mut scanner, 0) {
            Ok(obj) => objects.push((num, obj)),
            Err(err) => {
                let err = Error::ObjectStreamMalformed(format!("object {}: {}", num, err));
                match recovery.on_error(&err, &Location::at("objstm", offset as u64)) {
                    Action::Fail => return Err(err),
                    _ => continue,
                }
            }
        }
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;
    use crate::recovery::{LenientRecovery, StrictRecovery};

    fn objstm(n: i64, first: i64, payload: &[u8]) -> Stream {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        dict.insert("Length".to_string(), Object::Integer(payload.len() as i64));
        Stream::new(dict, payload.to_vec())
    }

    fn unpack_strict(stream: &Stream) -> Result<Vec<(u32, Object)>> {
        unpack(
            &Context::background(),
            stream,
            &ParseOptions::default(),
            &(Arc::new(StrictRecovery) as Arc<dyn RecoveryStrategy>),
            &FilterRegistry::standard(),
        )
    }

    #[test]
    fn test_unpack_two_objects() {
        let pairs = b"10 0 11 3 ";
        let bodies = b"42 /Test";
        let mut payload = pairs.to_vec();
        payload.extend_from_slice(bodies);

        let objects = unpack_strict(&objstm(2, pairs.len() as i64, &payload)).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], (10, Object::Integer(42)));
        assert_eq!(objects[1], (11, Object::name("Test")));
    }

    #[test]
    fn test_unpack_composite_objects() {
        let pairs = b"20 0 21 8 ";
        let bodies = b"[1 2 3] << /Kind /Widget >>";
        let mut payload = pairs.to_vec();
        payload.extend_from_slice(bodies);

        let objects = unpack_strict(&objstm(2, pairs.len() as i64, &payload)).unwrap();
        assert_eq!(
            objects[0].1,
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::Integer(3)
            ])
        );
        let dict = objects[1].1.as_dict().unwrap();
        assert_eq!(dict.get("Kind").unwrap().as_name(), Some("Widget"));
    }

    #[test]
    fn test_unpack_flate_compressed() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let pairs = b"3 0 ";
        let bodies = b"(hello)";
        let mut payload = pairs.to_vec();
        payload.extend_from_slice(bodies);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut stream = objstm(1, pairs.len() as i64, &compressed);
        stream
            .dict
            .insert("Filter".to_string(), Object::name("FlateDecode"));

        let objects = unpack_strict(&stream).unwrap();
        assert_eq!(objects[0], (3, Object::string("hello")));
    }

    #[test]
    fn test_missing_n_fails() {
        let mut stream = objstm(1, 4, b"5 0 1");
        stream.dict.shift_remove("N");
        assert!(matches!(
            unpack_strict(&stream),
            Err(Error::ObjectStreamMalformed(_))
        ));
    }

    #[test]
    fn test_first_beyond_payload_fails() {
        let stream = objstm(1, 100, b"short");
        assert!(matches!(
            unpack_strict(&stream),
            Err(Error::ObjectStreamMalformed(_))
        ));
    }

    #[test]
    fn test_bad_offset_skipped_when_lenient() {
        let pairs = b"7 0 8 999 ";
        let bodies = b"1";
        let mut payload = pairs.to_vec();
        payload.extend_from_slice(bodies);

        let stream = objstm(2, pairs.len() as i64, &payload);
        let objects = unpack(
            &Context::background(),
            &stream,
            &ParseOptions::default(),
            &(Arc::new(LenientRecovery) as Arc<dyn RecoveryStrategy>),
            &FilterRegistry::standard(),
        )
        .unwrap();
        assert_eq!(objects, vec![(7, Object::Integer(1))]);
    }
}
