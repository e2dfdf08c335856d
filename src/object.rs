//! PDF object types.
//!
//! The parser emits exactly the ten variants of [`Object`]; downstream
//! matching can and should be exhaustive. Integers and reals are distinct
//! variants so the source representation survives a round trip, and strings
//! remember whether they were written literal or hexadecimal for the same
//! reason. String bytes are opaque here; text decoding is a consumer
//! concern.

use bytes::Bytes;
use indexmap::IndexMap;

/// Dictionary type used throughout the crate.
///
/// Key order is semantically irrelevant in PDF; insertion order is kept so
/// serialization is deterministic.
pub type Dictionary = IndexMap<String, Object>;

/// How a string object was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    /// `(...)` with escape sequences.
    Literal,
    /// `<hex digits>`.
    Hex,
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number.
    pub num: u32,
    /// Generation number.
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(num: u32, gen: u16) -> Self {
        Self { num, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.num, self.gen)
    }
}

/// Stream object: dictionary plus raw payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary.
    pub dict: Dictionary,
    /// Payload as stored in the file (encoded, possibly encrypted).
    pub data: Bytes,
}

impl Stream {
    /// Create a stream from a dictionary and payload.
    pub fn new(dict: Dictionary, data: impl Into<Bytes>) -> Self {
        Self {
            dict,
            data: data.into(),
        }
    }

    /// The declared filter chain with aligned parameter dictionaries.
    ///
    /// `/Filter` may be a single name or an array; `/DecodeParms` aligns by
    /// index and missing entries are treated as empty.
    pub fn filter_chain(&self) -> Vec<(String, Dictionary)> {
        let names: Vec<String> = match self.dict.get("Filter") {
            Some(Object::Name(n)) => vec![n.clone()],
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|o| o.as_name().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        let params: Vec<Dictionary> = match self.dict.get("DecodeParms") {
            Some(Object::Dictionary(d)) => vec![d.clone()],
            Some(Object::Array(items)) => items
                .iter()
                .map(|o| o.as_dict().cloned().unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        };

        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, params.get(i).cloned().unwrap_or_default()))
            .collect()
    }
}

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Real (floating-point) value.
    Real(f64),
    /// String bytes plus the source representation.
    String(Vec<u8>, StringFormat),
    /// Name (written with a leading `/`).
    Name(String),
    /// Ordered sequence of objects.
    Array(Vec<Object>),
    /// Key-value mapping.
    Dictionary(Dictionary),
    /// Stream (dictionary + raw bytes).
    Stream(Stream),
    /// Indirect object reference.
    Reference(ObjectRef),
}

impl Object {
    /// A literal string object from raw bytes.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into(), StringFormat::Literal)
    }

    /// A name object.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Human-readable type name, without the payload.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(..) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to string bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s, _) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for streams too.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Mutable dictionary access. Works for streams too.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    /// Try to cast to stream.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }
}
