//! Cache key definitions.
//!
//! Defines `Fingerprint` for cache entries and `Tag` for invalidation.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Identifies one cacheable query: endpoint name plus normalized arguments.
///
/// Arguments are serialized with object keys sorted at every depth, so two
/// argument values that are deeply equal produce the same fingerprint no
/// matter how their fields were ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    endpoint: String,
    args: String,
}

#[derive(Debug, Clone, Error)]
#[error("arguments for `{endpoint}` cannot be fingerprinted: {reason}")]
pub struct FingerprintError {
    pub endpoint: String,
    pub reason: String,
}

impl Fingerprint {
    /// Fingerprint any serializable argument value.
    pub fn new<A>(endpoint: &str, args: &A) -> Result<Self, FingerprintError>
    where
        A: Serialize + ?Sized,
    {
        Ok(Self::from_value(endpoint, &args_value(endpoint, args)?))
    }

    /// Fingerprint an already-serialized argument value.
    pub fn from_value(endpoint: &str, args: &Value) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            args: canonical_json(args),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Canonical JSON text of the arguments.
    pub fn args(&self) -> &str {
        &self.args
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.args)
    }
}

/// Serialize query arguments for fingerprinting.
pub fn args_value<A>(endpoint: &str, args: &A) -> Result<Value, FingerprintError>
where
    A: Serialize + ?Sized,
{
    serde_json::to_value(args).map_err(|err| FingerprintError {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    })
}

/// Serialize a JSON value with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Invalidation label, either bare (`Event`) or per instance (`Event:42`).
///
/// The tag index files every `Type:id` tag under its bare `Type` as well, so
/// invalidating `Event` reaches all event entries while invalidating
/// `Event:42` reaches only entries that provide exactly that instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    kind: String,
    id: Option<String>,
}

impl Tag {
    /// A bare tag covering every instance of `kind`.
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
        }
    }

    /// A tag for one identified instance of `kind`.
    pub fn id(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id.to_string()),
        }
    }

    /// Parse the `Type` / `Type:id` text form.
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((kind, id)) => Self::id(kind, id),
            None => Self::kind(text),
        }
    }

    pub fn kind_name(&self) -> &str {
        &self.kind
    }

    pub fn instance(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.id.is_none()
    }

    /// The bare form of this tag.
    pub fn bare(&self) -> Tag {
        Tag::kind(self.kind.clone())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{id}", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}
