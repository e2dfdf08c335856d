//! Object composition and the document-level parser.
//!
//! [`parse_value`] turns scanner tokens into [`Object`]s by recursive
//! descent, enforcing the nesting and size limits. [`Parser`] drives a
//! whole-document ingest: header version, cross-reference resolution (with
//! repair when the recovery strategy allows it), linearization probe,
//! encryption setup, then object materialization in ascending
//! object-number order.

use crate::config::ParseOptions;
use crate::context::Context;
use crate::crypto::StandardSecurityHandler;
use crate::document::Document;
use crate::error::{Error, Location, Result};
use crate::filters::FilterRegistry;
use crate::loader::{MemoryCache, ObjectCache, ObjectLoader};
use crate::object::{Dictionary, Object};
use crate::recovery::{Action, LenientRecovery, RecoveryStrategy, StrictRecovery};
use crate::scanner::{Scanner, Token};
use crate::{repair, xref};
use std::sync::Arc;

/// Random-access byte source.
///
/// The ingestion core reads the source once into memory (bounded by
/// `max_buffer_size`); predictors and crypt-filter routing need whole
/// buffers anyway, so correctness beats streaming here.
pub trait ReadAt {
    /// Total size in bytes.
    fn size(&self) -> Result<u64>;
    /// Read into `buf` starting at `offset`; returns bytes read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

impl ReadAt for [u8] {
    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (offset as usize).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn size(&self) -> Result<u64> {
        self.as_slice().size()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.as_slice().read_at(offset, buf)
    }
}

impl ReadAt for std::fs::File {
    fn size(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        Ok(FileExt::read_at(self, buf, offset)?)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        Ok(self.seek_read(buf, offset)?)
    }
}

/// Read an entire source, enforcing the buffer cap.
fn read_all<S: ReadAt + ?Sized>(source: &S, cap: usize) -> Result<Vec<u8>> {
    let size = source.size()?;
    if size > cap as u64 {
        return Err(Error::LimitExceeded {
            limit: "max_buffer_size",
        });
    }
    let mut buf = vec![0u8; size as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_at(filled as u64, &mut buf[filled..])?;
        if n == 0 {
            return Err(Error::Truncated);
        }
        filled += n;
    }
    Ok(buf)
}

/// Compose one object from the scanner's token stream.
///
/// `depth` is the current nesting level; arrays and dictionaries recurse
/// with `depth + 1` and fail with `LimitExceeded` past the configured
/// maximum. Stream payloads are NOT handled here: a dictionary followed by
/// `stream` is the loader's business because `/Length` may be indirect.
pub fn parse_value(ctx: &Context, scanner: &mut Scanner<'_>, depth: usize) -> Result<Object> {
    ctx.check()?;
    let options = *scanner.options();
    if depth > options.max_nesting_depth {
        return Err(Error::LimitExceeded {
            limit: "max_nesting_depth",
        });
    }

    let offset = scanner.position();
    match scanner.next_token()? {
        Token::Null => Ok(Object::Null),
        Token::Boolean(value) => Ok(Object::Boolean(value)),
        Token::Integer(value) => Ok(Object::Integer(value)),
        Token::Real(value) => Ok(Object::Real(value)),
        Token::String(bytes, format) => Ok(Object::String(bytes, format)),
        Token::Name(name) => Ok(Object::Name(name)),
        Token::Ref(r) => Ok(Object::Reference(r)),
        Token::ArrayStart => parse_array(ctx, scanner, depth),
        Token::DictStart => parse_dictionary(ctx, scanner, depth),
        other => Err(Error::Lexical {
            offset,
            reason: format!("expected an object, found {:?}", other),
        }),
    }
}

fn parse_array(ctx: &Context, scanner: &mut Scanner<'_>, depth: usize) -> Result<Object> {
    let options = *scanner.options();
    let recovery = scanner.recovery().clone();
    let mut items = Vec::new();

    loop {
        ctx.check()?;
        match scanner.peek_token()? {
            Token::ArrayEnd => {
                scanner.next_token()?;
                return Ok(Object::Array(items));
            }
            Token::Eof => {
                let err = Error::Truncated;
                return match recovery
                    .on_error(&err, &Location::at("parser", scanner.position()))
                {
                    Action::Fail => Err(err),
                    _ => Ok(Object::Array(items)),
                };
            }
            Token::Keyword(word) => {
                // A bareword inside an array is damage; `endobj` and
                // friends mean the terminator went missing.
                let err = Error::Lexical {
                    offset: scanner.position(),
                    reason: format!("keyword {:?} inside array", word),
                };
                match recovery.on_error(&err, &Location::at("parser", scanner.position())) {
                    Action::Fail => return Err(err),
                    Action::Skip => {
                        scanner.next_token()?;
                    }
                    _ => return Ok(Object::Array(items)),
                }
            }
            _ => {
                items.push(parse_value(ctx, scanner, depth + 1)?);
                if items.len() > options.max_array_len {
                    return Err(Error::LimitExceeded {
                        limit: "max_array_len",
                    });
                }
            }
        }
    }
}

fn parse_dictionary(ctx: &Context, scanner: &mut Scanner<'_>, depth: usize) -> Result<Object> {
    let options = *scanner.options();
    let recovery = scanner.recovery().clone();
    let mut dict = Dictionary::new();

    loop {
        ctx.check()?;
        match scanner.peek_token()? {
            Token::DictEnd => {
                scanner.next_token()?;
                return Ok(Object::Dictionary(dict));
            }
            Token::Name(_) => {
                let key = match scanner.next_token()? {
                    Token::Name(key) => key,
                    _ => unreachable!("peeked a name"),
                };
                let value = parse_value(ctx, scanner, depth + 1)?;
                dict.insert(key, value);
                if dict.len() > options.max_dict_len {
                    return Err(Error::LimitExceeded {
                        limit: "max_dict_len",
                    });
                }
            }
            Token::Eof => {
                let err = Error::Truncated;
                return match recovery
                    .on_error(&err, &Location::at("parser", scanner.position()))
                {
                    Action::Fail => Err(err),
                    _ => Ok(Object::Dictionary(dict)),
                };
            }
            other => {
                // Non-name key or a stray terminator.
                let err = Error::Lexical {
                    offset: scanner.position(),
                    reason: format!("expected name key or >>, found {:?}", other),
                };
                match recovery.on_error(&err, &Location::at("parser", scanner.position())) {
                    Action::Fail => return Err(err),
                    Action::Skip => {
                        scanner.next_token()?;
                    }
                    // Warn / Fix: close the dictionary here and let the
                    // caller resynchronize on the stray token.
                    _ => return Ok(Object::Dictionary(dict)),
                }
            }
        }
    }
}

/// Scan the first kilobyte for `%PDF-X.Y`.
fn detect_version(buf: &[u8]) -> Option<String> {
    let window = &buf[..buf.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|candidate| candidate == b"%PDF-")?;
    let tail = &window[pos + 5..];
    if tail.len() < 3 {
        return None;
    }
    let version = &tail[..3];
    if version[0].is_ascii_digit() && version[1] == b'.' && version[2].is_ascii_digit() {
        Some(String::from_utf8_lossy(version).into_owned())
    } else {
        None
    }
}

/// Document-level parser.
///
/// Holds the configuration shared by every pass: limits, recovery
/// strategy, filter registry, object cache, and an optional password.
pub struct Parser {
    options: ParseOptions,
    recovery: Arc<dyn RecoveryStrategy>,
    registry: Arc<FilterRegistry>,
    cache: Arc<dyn ObjectCache>,
    password: Option<Vec<u8>>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Lenient parser with default limits.
    pub fn new() -> Self {
        Self {
            options: ParseOptions::default(),
            recovery: Arc::new(LenientRecovery),
            registry: Arc::new(FilterRegistry::standard()),
            cache: Arc::new(MemoryCache::new()),
            password: None,
        }
    }

    /// Strict parser: every recoverable error fails.
    pub fn strict() -> Self {
        Self {
            recovery: Arc::new(StrictRecovery),
            ..Self::new()
        }
    }

    /// Replace the resource limits.
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the recovery strategy.
    pub fn with_recovery(mut self, recovery: Arc<dyn RecoveryStrategy>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Replace the filter registry.
    pub fn with_registry(mut self, registry: Arc<FilterRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the object cache.
    pub fn with_cache(mut self, cache: Arc<dyn ObjectCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Supply a password for encrypted documents.
    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Ingest a document from a random-access source.
    pub fn parse<S: ReadAt + ?Sized>(&self, ctx: &Context, source: &S) -> Result<Document> {
        let buf = read_all(source, self.options.max_buffer_size)?;
        self.parse_bytes(ctx, &buf)
    }

    /// Ingest a document from an in-memory buffer.
    pub fn parse_bytes(&self, ctx: &Context, buf: &[u8]) -> Result<Document> {
        let ctx = ctx.tightened(self.options.max_parse_time);

        let version = match detect_version(buf) {
            Some(version) => version,
            None => {
                let err = Error::Lexical {
                    offset: 0,
                    reason: "missing %PDF header".to_string(),
                };
                match self.recovery.on_error(&err, &Location::at("parser", 0)) {
                    Action::Fail => return Err(err),
                    _ => "1.4".to_string(),
                }
            }
        };

        let table = Arc::new(self.resolve_or_repair(&ctx, buf)?);
        let linearized = xref::detect_linearization(&ctx, buf, &self.options, &self.recovery);

        let loader = ObjectLoader::new(
            buf,
            table.clone(),
            self.options,
            self.recovery.clone(),
            self.registry.clone(),
            self.cache.clone(),
        );

        let trailer = table.trailer().clone();
        let mut permissions = None;
        let mut encrypt_metadata = true;

        if let Some(encrypt) = trailer.get("Encrypt") {
            let (encrypt_dict, encrypt_ref) = match encrypt {
                Object::Reference(r) => (self.load_encrypt_dict(&ctx, &loader, *r)?, Some(*r)),
                Object::Dictionary(dict) => (dict.clone(), None),
                other => {
                    return Err(Error::TrailerMalformed(format!(
                        "/Encrypt is a {}",
                        other.type_name()
                    )));
                }
            };

            let file_id = trailer
                .get("ID")
                .and_then(Object::as_array)
                .and_then(|ids| ids.first())
                .and_then(Object::as_string)
                .map(<[u8]>::to_vec)
                .unwrap_or_default();

            let mut handler = StandardSecurityHandler::new(&encrypt_dict, file_id)?;
            match &self.password {
                Some(password) => handler.authenticate(&ctx, password)?,
                // No password supplied: the empty password is tried
                // automatically; if it fails the caller must supply one.
                None => handler
                    .authenticate(&ctx, b"")
                    .map_err(|_| Error::AuthenticationRequired)?,
            }
            permissions = Some(handler.permissions());
            encrypt_metadata = handler.encrypt_metadata();
            loader.set_security(handler, encrypt_ref);
        }

        let mut document = Document {
            objects: Default::default(),
            trailer,
            version,
            linearized,
            permissions,
            encrypt_metadata,
        };

        for r in table.live_refs() {
            ctx.check()?;
            match loader.load(&ctx, r) {
                Ok(obj) => {
                    document.objects.insert(r, obj);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    let location = Location::object("parser", r);
                    match self.recovery.on_error(&err, &location) {
                        Action::Fail => return Err(err),
                        _ => continue,
                    }
                }
            }
        }

        Ok(document)
    }

    /// The `/Encrypt` dictionary must be loadable before decryption is
    /// set up, and is itself never encrypted.
    fn load_encrypt_dict(
        &self,
        ctx: &Context,
        loader: &ObjectLoader<'_>,
        r: crate::object::ObjectRef,
    ) -> Result<Dictionary> {
        match loader.load(ctx, r)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::TrailerMalformed(format!(
                "/Encrypt object is a {}",
                other.type_name()
            ))),
        }
    }

    fn resolve_or_repair(&self, ctx: &Context, buf: &[u8]) -> Result<crate::xref::MergedTable> {
        let resolved = xref::resolve(ctx, buf, &self.options, &self.recovery, &self.registry)
            .and_then(|table| {
                table.validate()?;
                Ok(table)
            });

        match resolved {
            Ok(table) => Ok(table),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                match self.recovery.on_error(&err, &Location::at("xref", 0)) {
                    Action::Fix => {
                        let table = repair::rebuild(ctx, buf, &self.options, &self.recovery)?;
                        // Repair must still produce a usable trailer;
                        // nothing below this is recoverable.
                        table.validate()?;
                        Ok(table)
                    }
                    _ => Err(err),
                }
            }
        }
    }
}
