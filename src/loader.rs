//! On-demand materialization of indirect objects.
//!
//! The loader turns cross-reference entries into [`Object`]s: seeking the
//! scanner to byte offsets for in-use entries, unpacking (and memoizing)
//! object streams for compressed entries, resolving indirect stream
//! `/Length` values by recursion, and walking materialized values through
//! the security handler when the document is encrypted.
//!
//! A single mutex serializes all loader state (scanner cursor, cache,
//! object-stream memo), so `load` may be called from multiple owner
//! threads. The cache itself is pluggable and may be shared across
//! loaders.

use crate::config::ParseOptions;
use crate::context::Context;
use crate::crypto::{DataClass, StandardSecurityHandler};
use crate::error::{Error, Location, Result};
use crate::filters::FilterRegistry;
use crate::object::{Object, ObjectRef, Stream};
use crate::objstm;
use crate::parser::parse_value;
use crate::recovery::{Action, RecoveryStrategy};
use crate::scanner::{Scanner, Token};
use crate::xref::{MergedTable, XrefEntry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Pluggable object cache.
///
/// Implementations shared across loaders must synchronize internally.
/// Nothing evicts implicitly during a parse; eviction is an explicit
/// caller decision.
pub trait ObjectCache: Send + Sync {
    /// Cached object for `r`, if present.
    fn get(&self, r: ObjectRef) -> Option<Object>;
    /// Store `obj` under `r`.
    fn put(&self, r: ObjectRef, obj: Object);
}

/// Default in-memory cache.
#[derive(Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<ObjectRef, Object>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached object.
    pub fn clear(&self) {
        self.map.lock().expect("cache lock poisoned").clear();
    }
}

impl ObjectCache for MemoryCache {
    fn get(&self, r: ObjectRef) -> Option<Object> {
        self.map.lock().expect("cache lock poisoned").get(&r).cloned()
    }

    fn put(&self, r: ObjectRef, obj: Object) {
        self.map.lock().expect("cache lock poisoned").insert(r, obj);
    }
}

struct LoaderState<'a> {
    scanner: Scanner<'a>,
    table: Arc<MergedTable>,
    options: ParseOptions,
    recovery: Arc<dyn RecoveryStrategy>,
    registry: Arc<FilterRegistry>,
    cache: Arc<dyn ObjectCache>,
    objstm_memo: HashMap<u32, Arc<Vec<(u32, Object)>>>,
    security: Option<StandardSecurityHandler>,
    encrypt_ref: Option<ObjectRef>,
}

/// Materializes indirect objects against one byte buffer and merged
/// table.
pub struct ObjectLoader<'a> {
    state: Mutex<LoaderState<'a>>,
}

impl<'a> ObjectLoader<'a> {
    /// Create a loader over `buf` with the resolved `table`.
    pub fn new(
        buf: &'a [u8],
        table: Arc<MergedTable>,
        options: ParseOptions,
        recovery: Arc<dyn RecoveryStrategy>,
        registry: Arc<FilterRegistry>,
        cache: Arc<dyn ObjectCache>,
    ) -> Self {
        Self {
            state: Mutex::new(LoaderState {
                scanner: Scanner::new(buf, options, recovery.clone()),
                table,
                options,
                recovery,
                registry,
                cache,
                objstm_memo: HashMap::new(),
                security: None,
                encrypt_ref: None,
            }),
        }
    }

    /// Install an authenticated security handler. `encrypt_ref` names the
    /// `/Encrypt` dictionary's own object, which is never decrypted.
    pub fn set_security(
        &self,
        handler: StandardSecurityHandler,
        encrypt_ref: Option<ObjectRef>,
    ) {
        let mut state = self.state.lock().expect("loader lock poisoned");
        state.security = Some(handler);
        state.encrypt_ref = encrypt_ref;
    }

    /// Materialize the object behind `r`.
    pub fn load(&self, ctx: &Context, r: ObjectRef) -> Result<Object> {
        let mut state = self.state.lock().expect("loader lock poisoned");
        load_indirect(&mut state, ctx, r, 0)
            .map_err(|e| e.at(Location::object("loader", r)))
    }
}

fn load_indirect(
    state: &mut LoaderState<'_>,
    ctx: &Context,
    r: ObjectRef,
    depth: usize,
) -> Result<Object> {
    ctx.check()?;
    if depth > state.options.max_indirect_depth {
        return Err(Error::IndirectDepthExceeded(state.options.max_indirect_depth));
    }
    if let Some(hit) = state.cache.get(r) {
        return Ok(hit);
    }

    let entry = *state.table.get(r.num).ok_or(Error::ObjectNotFound(r))?;
    let obj = match entry {
        XrefEntry::Free { .. } => return Err(Error::ObjectNotFound(r)),
        XrefEntry::InUse { offset, gen } => {
            if gen != r.gen {
                return Err(Error::ObjectNotFound(r));
            }
            let (header, mut obj) = parse_object_at(state, ctx, offset, depth)?;
            if header != r {
                let err = Error::ObjectHeaderMismatch {
                    expected: r,
                    found: header,
                };
                let location = Location::object("loader", r).with_offset(offset);
                if state.recovery.on_error(&err, &location) == Action::Fail {
                    return Err(err);
                }
            }
            if let Some(handler) = &state.security {
                if Some(r) != state.encrypt_ref {
                    decrypt_object(handler, r, &mut obj)?;
                }
            }
            obj
        }
        XrefEntry::Compressed { container, index } => {
            // Objects in streams always have generation zero.
            if r.gen != 0 {
                return Err(Error::ObjectNotFound(r));
            }
            let objects = load_object_stream(state, ctx, container, depth)?;
            let found = match objects.get(index as usize) {
                Some((num, obj)) if *num == r.num => Some(obj),
                // Index disagrees with the pair table; fall back to a
                // number search.
                _ => objects.iter().find(|(num, _)| *num == r.num).map(|(_, o)| o),
            };
            found
                .cloned()
                .ok_or_else(|| {
                    Error::ObjectStreamMalformed(format!(
                        "container {} has no object {}",
                        container, r.num
                    ))
                })?
        }
    };

    state.cache.put(r, obj.clone());
    Ok(obj)
}

/// Parse `N G obj <value> [stream] endobj` at a byte offset, returning the
/// header reference and the value.
fn parse_object_at(
    state: &mut LoaderState<'_>,
    ctx: &Context,
    offset: u64,
    depth: usize,
) -> Result<(ObjectRef, Object)> {
    if offset as usize >= state.scanner.len() {
        return Err(Error::Truncated);
    }
    state.scanner.seek_to(offset);
    // Forget any hint a previous (failed) parse may have left behind.
    state.scanner.set_next_stream_length(-1);

    let num = match state.scanner.next_token()? {
        Token::Integer(v) if (0..=u32::MAX as i64).contains(&v) => v as u32,
        other => {
            return Err(Error::Lexical {
                offset,
                reason: format!("expected object number, found {:?}", other),
            });
        }
    };
    let gen = match state.scanner.next_token()? {
        Token::Integer(v) if (0..=65535).contains(&v) => v as u16,
        other => {
            return Err(Error::Lexical {
                offset,
                reason: format!("expected generation number, found {:?}", other),
            });
        }
    };
    state.scanner.expect_keyword("obj")?;
    let header = ObjectRef::new(num, gen);

    let value = parse_value(ctx, &mut state.scanner, 0)?;

    let obj = match value {
        Object::Dictionary(dict) => {
            // Resolve /Length before touching the stream keyword so the
            // scanner can read the payload exactly.
            let hint = match dict.get("Length") {
                Some(Object::Integer(len)) => Some(*len),
                Some(Object::Reference(len_ref)) => {
                    let saved = state.scanner.position();
                    let resolved = load_indirect(state, ctx, *len_ref, depth + 1)?;
                    state.scanner.seek_to(saved);
                    match resolved.as_integer() {
                        Some(len) => Some(len),
                        None => {
                            log::warn!(
                                "stream /Length {} resolves to {}, scanning for endstream",
                                len_ref,
                                resolved.type_name()
                            );
                            None
                        }
                    }
                }
                _ => None,
            };
            state.scanner.set_next_stream_length(hint.unwrap_or(-1));

            match state.scanner.next_token()? {
                Token::Stream(data) => {
                    expect_endobj(state, header);
                    Object::Stream(Stream::new(dict, data))
                }
                Token::Keyword(ref word) if word == "endobj" => Object::Dictionary(dict),
                other => {
                    let err = Error::Lexical {
                        offset: state.scanner.position(),
                        reason: format!("expected stream or endobj, found {:?}", other),
                    };
                    let location = Location::object("loader", header);
                    if state.recovery.on_error(&err, &location) == Action::Fail {
                        return Err(err);
                    }
                    Object::Dictionary(dict)
                }
            }
        }
        other => {
            expect_endobj(state, header);
            other
        }
    };
    // The hint never outlives one object parse.
    state.scanner.set_next_stream_length(-1);

    Ok((header, obj))
}

/// Consume the trailing `endobj`, tolerating its absence.
fn expect_endobj(state: &mut LoaderState<'_>, header: ObjectRef) {
    match state.scanner.peek_token() {
        Ok(Token::Keyword(ref word)) if word == "endobj" => {
            let _ = state.scanner.next_token();
        }
        _ => log::warn!("object {} is not terminated by endobj", header),
    }
}

/// Load, unpack, and memoize an object stream container.
fn load_object_stream(
    state: &mut LoaderState<'_>,
    ctx: &Context,
    container: u32,
    depth: usize,
) -> Result<Arc<Vec<(u32, Object)>>> {
    if let Some(memo) = state.objstm_memo.get(&container) {
        return Ok(memo.clone());
    }

    let container_ref = ObjectRef::new(container, 0);
    let container_obj = load_indirect(state, ctx, container_ref, depth + 1)?;
    let stream = container_obj.as_stream().ok_or_else(|| {
        Error::ObjectStreamMalformed(format!("container {} is not a stream", container_ref))
    })?;

    let objects = objstm::unpack(
        ctx,
        stream,
        &state.options,
        &state.recovery,
        &state.registry,
    )?;
    let objects = Arc::new(objects);
    state.objstm_memo.insert(container, objects.clone());
    Ok(objects)
}

/// Walk a materialized value and decrypt strings and stream payloads in
/// place.
///
/// Streams declaring `[/Crypt]` with `/Name /Identity` keep their bytes;
/// a named crypt filter overrides the document default for that stream;
/// `/Type /Metadata` streams use the metadata class (and are skipped
/// entirely when metadata is exempt). After decryption the dictionary's
/// `/Length` is updated to the plaintext length.
fn decrypt_object(
    handler: &StandardSecurityHandler,
    r: ObjectRef,
    obj: &mut Object,
) -> Result<()> {
    match obj {
        Object::String(bytes, _) => {
            *bytes = handler.decrypt(DataClass::String, r, bytes)?;
        }
        Object::Array(items) => {
            for item in items {
                decrypt_object(handler, r, item)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                decrypt_object(handler, r, value)?;
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                decrypt_object(handler, r, value)?;
            }

            let declared = crypt_filter_override(stream);
            let plain = match declared.as_deref() {
                Some("Identity") => None,
                Some(name) => Some(handler.decrypt_with_filter(name, r, &stream.data)?),
                None => {
                    let class = if stream.dict.get("Type").and_then(Object::as_name)
                        == Some("Metadata")
                    {
                        DataClass::MetadataStream
                    } else {
                        DataClass::Stream
                    };
                    Some(handler.decrypt(class, r, &stream.data)?)
                }
            };
            if let Some(plain) = plain {
                stream
                    .dict
                    .insert("Length".to_string(), Object::Integer(plain.len() as i64));
                stream.data = plain.into();
            }
        }
        _ => {}
    }
    Ok(())
}

/// The `/Name` of a `Crypt` stage in the stream's filter chain, if one is
/// declared. A `Crypt` stage without `/Name` means `/Identity`.
fn crypt_filter_override(stream: &Stream) -> Option<String> {
    stream
        .filter_chain()
        .into_iter()
        .find(|(name, _)| name == "Crypt")
        .map(|(_, params)| {
            params
                .get("Name")
                .and_then(Object::as_name)
                .unwrap_or("Identity")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;
    use crate::recovery::{LenientRecovery, StrictRecovery};
    use crate::xref::XrefSection;
    use std::collections::HashMap as StdHashMap;

    fn loader_for<'b>(
        buf: &'b [u8],
        entries: &[(u32, XrefEntry)],
        strict: bool,
    ) -> ObjectLoader<'b> {
        let mut map = StdHashMap::new();
        for (num, entry) in entries {
            map.insert(*num, *entry);
        }
        let table = MergedTable::from_sections(vec![XrefSection::new(map, Dictionary::new())]);
        let recovery: Arc<dyn RecoveryStrategy> = if strict {
            Arc::new(StrictRecovery)
        } else {
            Arc::new(LenientRecovery)
        };
        ObjectLoader::new(
            buf,
            Arc::new(table),
            ParseOptions::default(),
            recovery,
            Arc::new(FilterRegistry::standard()),
            Arc::new(MemoryCache::new()),
        )
    }

    #[test]
    fn test_load_simple_object() {
        let buf = b"1 0 obj\n<< /Answer 42 >>\nendobj\n";
        let loader = loader_for(buf, &[(1, XrefEntry::InUse { offset: 0, gen: 0 })], true);
        let obj = loader
            .load(&Context::background(), ObjectRef::new(1, 0))
            .unwrap();
        assert_eq!(obj.as_dict().unwrap().get("Answer").unwrap().as_integer(), Some(42));
    }

    #[test]
    fn test_load_unknown_object() {
        let loader = loader_for(b"", &[], true);
        let err = loader
            .load(&Context::background(), ObjectRef::new(9, 0))
            .unwrap_err();
        assert!(matches!(err.root(), Error::ObjectNotFound(_)));
    }

    #[test]
    fn test_generation_mismatch_is_not_found() {
        let buf = b"1 3 obj 7 endobj";
        let loader = loader_for(buf, &[(1, XrefEntry::InUse { offset: 0, gen: 3 })], true);
        let err = loader
            .load(&Context::background(), ObjectRef::new(1, 0))
            .unwrap_err();
        assert!(matches!(err.root(), Error::ObjectNotFound(_)));
    }

    #[test]
    fn test_header_mismatch_strict_vs_lenient() {
        let buf = b"2 0 obj 7 endobj";
        let entries = [(1u32, XrefEntry::InUse { offset: 0, gen: 0 })];

        let strict = loader_for(buf, &entries, true);
        let err = strict
            .load(&Context::background(), ObjectRef::new(1, 0))
            .unwrap_err();
        assert!(matches!(err.root(), Error::ObjectHeaderMismatch { .. }));

        let lenient = loader_for(buf, &entries, false);
        let obj = lenient
            .load(&Context::background(), ObjectRef::new(1, 0))
            .unwrap();
        assert_eq!(obj.as_integer(), Some(7));
    }

    #[test]
    fn test_stream_with_direct_length() {
        let buf = b"4 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj\n";
        let loader = loader_for(buf, &[(4, XrefEntry::InUse { offset: 0, gen: 0 })], true);
        let obj = loader
            .load(&Context::background(), ObjectRef::new(4, 0))
            .unwrap();
        assert_eq!(&obj.as_stream().unwrap().data[..], b"hello");
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let mut buf = Vec::new();
        let stream_off = buf.len();
        buf.extend_from_slice(b"4 0 obj\n<< /Length 5 0 R >>\nstream\nhello worldendstream\nendobj\n");
        let len_off = buf.len();
        buf.extend_from_slice(b"5 0 obj\n11\nendobj\n");

        let loader = loader_for(
            &buf,
            &[
                (4, XrefEntry::InUse { offset: stream_off as u64, gen: 0 }),
                (5, XrefEntry::InUse { offset: len_off as u64, gen: 0 }),
            ],
            true,
        );
        let obj = loader
            .load(&Context::background(), ObjectRef::new(4, 0))
            .unwrap();
        assert_eq!(&obj.as_stream().unwrap().data[..], b"hello world");
    }

    #[test]
    fn test_stream_without_length_scans() {
        let buf = b"4 0 obj\n<< /Kind /Raw >>\nstream\npayload\nendstream\nendobj\n";
        let loader = loader_for(buf, &[(4, XrefEntry::InUse { offset: 0, gen: 0 })], true);
        let obj = loader
            .load(&Context::background(), ObjectRef::new(4, 0))
            .unwrap();
        assert_eq!(&obj.as_stream().unwrap().data[..], b"payload");
    }

    #[test]
    fn test_compressed_object_via_container() {
        // Container 2 0 holds objects 10 and 11.
        let pairs = b"10 0 11 3 ";
        let bodies = b"42 (hi)";
        let mut payload = pairs.to_vec();
        payload.extend_from_slice(bodies);

        let mut buf = Vec::new();
        buf.extend_from_slice(
            format!(
                "2 0 obj\n<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n",
                pairs.len(),
                payload.len()
            )
            .as_bytes(),
        );
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(b"\nendstream\nendobj\n");

        let loader = loader_for(
            &buf,
            &[
                (2, XrefEntry::InUse { offset: 0, gen: 0 }),
                (10, XrefEntry::Compressed { container: 2, index: 0 }),
                (11, XrefEntry::Compressed { container: 2, index: 1 }),
            ],
            true,
        );

        let ctx = Context::background();
        assert_eq!(
            loader.load(&ctx, ObjectRef::new(10, 0)).unwrap(),
            Object::Integer(42)
        );
        assert_eq!(
            loader.load(&ctx, ObjectRef::new(11, 0)).unwrap(),
            Object::string("hi")
        );
        // Nonzero generation cannot live in an object stream.
        assert!(loader.load(&ctx, ObjectRef::new(10, 1)).is_err());
    }

    #[test]
    fn test_indirect_depth_guard() {
        // /Length points at the stream object itself.
        let buf = b"4 0 obj\n<< /Length 4 0 R >>\nstream\nxx\nendstream\nendobj\n";
        let loader = loader_for(buf, &[(4, XrefEntry::InUse { offset: 0, gen: 0 })], true);
        let err = loader
            .load(&Context::background(), ObjectRef::new(4, 0))
            .unwrap_err();
        assert!(matches!(err.root(), Error::IndirectDepthExceeded(_)));
    }

    #[test]
    fn test_cache_returns_same_object() {
        let buf = b"1 0 obj (cached) endobj";
        let loader = loader_for(buf, &[(1, XrefEntry::InUse { offset: 0, gen: 0 })], true);
        let ctx = Context::background();
        let first = loader.load(&ctx, ObjectRef::new(1, 0)).unwrap();
        let second = loader.load(&ctx, ObjectRef::new(1, 0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cancellation() {
        let buf = b"1 0 obj 1 endobj";
        let loader = loader_for(buf, &[(1, XrefEntry::InUse { offset: 0, gen: 0 })], true);
        let (ctx, handle) = Context::cancellable();
        handle.cancel();
        let err = loader.load(&ctx, ObjectRef::new(1, 0)).unwrap_err();
        assert!(err.is_cancelled());
    }
}
