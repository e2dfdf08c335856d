//! The parsed document: object graph plus trailer and detection results.

use crate::crypto::Permissions;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::BTreeMap;

/// A fully ingested document.
///
/// Objects are keyed by reference and iterate in ascending object-number
/// order. The trailer is the newest one from the cross-reference chain.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Materialized objects.
    pub objects: BTreeMap<ObjectRef, Object>,
    /// Final (newest) trailer dictionary.
    pub trailer: Dictionary,
    /// Header version, e.g. `"1.7"`.
    pub version: String,
    /// Whether a linearization dictionary was detected.
    pub linearized: bool,
    /// Permissions captured from the encryption dictionary, if encrypted.
    pub permissions: Option<Permissions>,
    /// Whether metadata streams were subject to encryption.
    pub encrypt_metadata: bool,
}

impl Document {
    /// The object stored under `r`.
    pub fn get(&self, r: ObjectRef) -> Option<&Object> {
        self.objects.get(&r)
    }

    /// Follow `obj` through at most one level of indirection.
    pub fn dereference<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(r) => self.objects.get(r),
            other => Some(other),
        }
    }

    /// Resolve a value that may be a reference chain, bounded by a fixed
    /// hop count so reference cycles terminate.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        let mut current = obj;
        for _ in 0..32 {
            match current {
                Object::Reference(r) => current = self.objects.get(r)?,
                other => return Some(other),
            }
        }
        None
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<&Dictionary> {
        let root = self
            .trailer
            .get("Root")
            .ok_or(Error::TrailerMissingRoot)?;
        self.resolve(root)
            .and_then(Object::as_dict)
            .ok_or(Error::TrailerMissingRoot)
    }

    /// Number of materialized objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when no object was materialized.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Largest object number present.
    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().map(|r| r.num).max().unwrap_or(0)
    }
}
