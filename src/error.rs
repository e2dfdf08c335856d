//! Error types for the ingestion core.
//!
//! Every failure mode that can surface at the API boundary is a distinct
//! variant so callers can tell hostile input, damaged files, wrong
//! passwords, and configured-limit hits apart without string matching.

use crate::object::ObjectRef;

/// Result type alias for pdf_mill operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where an error occurred: component name, byte offset, and the indirect
/// object being processed, when known.
///
/// Carried by [`Error::At`] and handed to the recovery strategy at every
/// recoverable checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    /// Indirect object being processed, if any.
    pub object: Option<ObjectRef>,
    /// Component that raised the error ("scanner", "xref", "loader", ...).
    pub component: &'static str,
    /// Byte offset into the source, if known.
    pub offset: Option<u64>,
}

impl Location {
    /// Location inside a named component at a byte offset.
    pub fn at(component: &'static str, offset: u64) -> Self {
        Self {
            object: None,
            component,
            offset: Some(offset),
        }
    }

    /// Location inside a named component while processing an object.
    pub fn object(component: &'static str, obj: ObjectRef) -> Self {
        Self {
            object: Some(obj),
            component,
            offset: None,
        }
    }

    /// Attach a byte offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.component)?;
        if let Some(obj) = self.object {
            write!(f, " [{}]", obj)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " @ byte {}", offset)?;
        }
        Ok(())
    }
}

/// Error types that can occur while ingesting a PDF.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Byte sequence is not valid PDF syntax.
    #[error("invalid PDF syntax at byte {offset}: {reason}")]
    Lexical {
        /// Byte offset of the offending input.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A configured resource limit was exceeded.
    #[error("configured limit exceeded: {limit}")]
    LimitExceeded {
        /// Name of the limit that was hit.
        limit: &'static str,
    },

    /// Input ended before a construct was complete.
    #[error("unexpected end of input")]
    Truncated,

    /// No `startxref` anchor was found.
    #[error("cross-reference anchor (startxref) not found")]
    XrefMissing,

    /// The `/Prev` chain revisited a section offset.
    #[error("cross-reference chain loops back to offset {0}")]
    XrefLoop(u64),

    /// The `/Prev` chain is longer than the configured maximum.
    #[error("cross-reference chain exceeds {0} sections")]
    XrefDepthExceeded(usize),

    /// A cross-reference section ended prematurely.
    #[error("cross-reference section is truncated")]
    XrefTruncated,

    /// An xref stream declares unusable `/W` field widths.
    #[error("invalid /W field widths in cross-reference stream")]
    XrefFieldWidthInvalid,

    /// The trailer dictionary could not be parsed.
    #[error("trailer dictionary is malformed: {0}")]
    TrailerMalformed(String),

    /// The trailer has no `/Root` entry.
    #[error("trailer has no /Root entry")]
    TrailerMissingRoot,

    /// The trailer `/Size` does not cover the largest object number.
    #[error("trailer /Size {size} does not cover object number {max_object}")]
    TrailerSizeMismatch {
        /// Declared `/Size`.
        size: i64,
        /// Largest object number present in the merged table.
        max_object: u32,
    },

    /// A referenced object has no usable cross-reference entry.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectRef),

    /// The `N G obj` header did not match the entry that pointed at it.
    #[error("object header reads {found}, cross-reference expected {expected}")]
    ObjectHeaderMismatch {
        /// Reference the cross-reference table pointed at.
        expected: ObjectRef,
        /// Reference found in the object header.
        found: ObjectRef,
    },

    /// Indirect resolution recursed past the configured depth.
    #[error("indirect reference chain exceeds depth {0}")]
    IndirectDepthExceeded(usize),

    /// An object stream (`/Type /ObjStm`) is internally inconsistent.
    #[error("object stream is malformed: {0}")]
    ObjectStreamMalformed(String),

    /// A stream names a filter the registry does not know.
    #[error("unsupported filter: {0}")]
    FilterUnknown(String),

    /// A known filter failed to decode its input.
    #[error("filter {name} failed: {reason}")]
    FilterFailed {
        /// Filter name.
        name: String,
        /// Failure detail.
        reason: String,
    },

    /// A predictor configuration is unusable.
    #[error("invalid predictor configuration: {0}")]
    PredictorInvalid(String),

    /// Decoded output grew past the decompression budget.
    #[error("decoded stream exceeds {limit} bytes, decompression bomb suspected")]
    DecompressionBombSuspected {
        /// The configured output ceiling.
        limit: usize,
    },

    /// A filter needed the object resolver callback and none was supplied.
    #[error("filter {0} requires an object resolver")]
    ResolverRequired(String),

    /// The document is encrypted and no password authenticated.
    #[error("document is encrypted; authentication required")]
    AuthenticationRequired,

    /// The supplied password matched neither user nor owner password.
    #[error("invalid password")]
    InvalidPassword,

    /// The encryption dictionary declares an unsupported scheme.
    #[error("unsupported encryption: V={v} R={r}")]
    UnsupportedEncryption {
        /// `/V` value.
        v: i64,
        /// `/R` value.
        r: i64,
    },

    /// `/StmF`, `/StrF`, or a per-stream override names a filter absent
    /// from `/CF`.
    #[error("crypt filter /{0} is not defined under /CF")]
    CryptFilterUndefined(String),

    /// The context was cancelled or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error wrapped with the location it occurred at.
    #[error("{location}: {source}")]
    At {
        /// Where it happened.
        location: Location,
        /// What happened.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with a location, unless it already carries one.
    pub fn at(self, location: Location) -> Self {
        match self {
            Error::At { .. } => self,
            other => Error::At {
                location,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, unwrapping any location layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::At { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for cancellation, at any wrapping depth.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }
}
