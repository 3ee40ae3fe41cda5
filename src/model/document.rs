//! Document identity and document values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Version;

/// Field payload of a document. Validated by the schema layer before it
/// reaches the store.
pub type Fields = Map<String, Value>;

/// Opaque, hashable document identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A document as returned by real-time get and by the committed index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub version: Version,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: DocumentId, version: Version, fields: Fields) -> Self {
        Self { id, version, fields }
    }

    /// Looks up a field. `"id"` resolves to the document id when the payload
    /// does not carry one.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self.fields.get(name) {
            Some(value) => Some(value.clone()),
            None if name == "id" => Some(Value::String(self.id.to_string())),
            None => None,
        }
    }

    /// A copy carrying only the named fields. Names the document does not
    /// have are left out; `"id"` follows [`Document::field`].
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Document {
        let mut fields = Fields::new();
        for name in names {
            let name = name.as_ref();
            if let Some(value) = self.field(name) {
                fields.insert(name.to_string(), value);
            }
        }
        Document::new(self.id.clone(), self.version, fields)
    }
}
