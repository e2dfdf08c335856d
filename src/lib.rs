//! # pdf_mill
//!
//! The ingestion core of a PDF reader/writer library: everything needed to
//! turn an arbitrary, possibly corrupted byte sequence into an in-memory
//! graph of PDF objects that downstream code can safely traverse.
//!
//! ## Subsystems
//!
//! - **Scanner** ([`scanner`]): tokenizes PDF syntax over a random-access
//!   buffer, including stream payload extraction driven by a resolved
//!   `/Length` hint.
//! - **Cross-reference resolver** ([`xref`], [`repair`]): locates
//!   `startxref`, walks classical tables and xref streams through `/Prev`
//!   and hybrid `/XRefStm` chains, merges sections newest-first, and can
//!   rebuild the table by scanning when a recovery strategy allows it.
//! - **Object loader** ([`loader`], [`objstm`]): materializes indirect
//!   objects from byte offsets and object streams, resolves indirect
//!   stream lengths, caches, and decrypts.
//! - **Filter pipeline** ([`filters`]): named decoders (Flate, LZW,
//!   RunLength, ASCII85, ASCIIHex, Crypt, optional image codecs) chained
//!   under a size/time budget.
//! - **Security handler** ([`crypto`]): the standard security handler,
//!   RC4-40 through AES-256 (V1-V5, R2-R6), with crypt-filter routing.
//! - **Recovery** ([`recovery`]): a pluggable strict/lenient policy
//!   injected into every component; nothing reads a global.
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_mill::{Context, Parser};
//!
//! # fn main() -> pdf_mill::Result<()> {
//! let file = std::fs::File::open("document.pdf")?;
//! let document = Parser::new().parse(&Context::background(), &file)?;
//! println!("{} objects, version {}", document.len(), document.version);
//! # Ok(())
//! # }
//! ```
//!
//! Parsing is single-threaded and cooperative: a [`Context`] carrying a
//! deadline or cancellation flag is checked at every loop boundary, and
//! every resource bound in [`ParseOptions`] maps to a distinct error kind.

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod crypto;
pub mod document;
pub mod error;
pub mod filters;
pub mod loader;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod recovery;
pub mod repair;
pub mod scanner;
pub mod writer;
pub mod xref;

pub use config::ParseOptions;
pub use context::{CancelHandle, Context};
pub use crypto::{Permissions, StandardSecurityHandler};
pub use document::Document;
pub use error::{Error, Location, Result};
pub use filters::FilterRegistry;
pub use loader::{MemoryCache, ObjectCache, ObjectLoader};
pub use object::{Dictionary, Object, ObjectRef, Stream, StringFormat};
pub use parser::{Parser, ReadAt};
pub use recovery::{Action, LenientRecovery, RecoveryStrategy, StrictRecovery};
pub use xref::{MergedTable, XrefEntry, XrefSection};
