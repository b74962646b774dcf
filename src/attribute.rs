//! Session attribute values
//!
//! Attributes are a closed set of variants. Embedded objects that need their
//! own type on the way back (a security context, or a custom type registered
//! with the converter) are written with a `"@class"` discriminator and are
//! only decoded when that discriminator is allow-listed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};

/// Discriminator key for embedded typed objects
pub const TYPE_KEY: &str = "@class";

/// Discriminator value of an embedded [`SecurityContext`]
pub const SECURITY_CONTEXT_TYPE: &str = "SecurityContext";

/// Replacement for `.` in attribute names used as field paths
pub const DOT_COVER_CHAR: char = '\u{F607}';

/// Escape an attribute name so it can be used as a single field path segment
pub fn escape_key(key: &str) -> String {
    key.replace('.', &DOT_COVER_CHAR.to_string())
}

/// Inverse of [`escape_key`]
pub fn unescape_key(key: &str) -> String {
    key.replace(DOT_COVER_CHAR, ".")
}

/// An authenticated (or authenticating) principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    /// Principal identifier
    pub principal: String,

    /// Credentials are never written to the store
    #[serde(skip)]
    pub credentials: Option<String>,

    /// Granted authorities
    #[serde(default)]
    pub authorities: Vec<String>,

    /// Whether authentication completed
    #[serde(default)]
    pub authenticated: bool,
}

impl Authentication {
    /// An unauthenticated token for the given principal
    pub fn new<S: Into<String>>(principal: S, credentials: Option<String>) -> Self {
        Self {
            principal: principal.into(),
            credentials,
            authorities: Vec::new(),
            authenticated: false,
        }
    }

    /// A completed authentication with its granted authorities
    pub fn authenticated<S, I, A>(principal: S, authorities: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            principal: principal.into(),
            credentials: None,
            authorities: authorities.into_iter().map(Into::into).collect(),
            authenticated: true,
        }
    }

    /// Principal name
    pub fn name(&self) -> &str {
        &self.principal
    }
}

/// Security context stored in a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub authentication: Option<Authentication>,
}

impl SecurityContext {
    pub fn new(authentication: Authentication) -> Self {
        Self {
            authentication: Some(authentication),
        }
    }

    /// Name of the authenticated principal, if any
    pub fn principal_name(&self) -> Option<&str> {
        self.authentication.as_ref().map(Authentication::name)
    }
}

/// A type that may be embedded in a session as a typed attribute.
///
/// The type must be registered on the converter with
/// `allow_type(T::TYPE_TAG)` for stored values to decode.
pub trait EmbeddedType: Serialize + DeserializeOwned {
    const TYPE_TAG: &'static str;
}

/// An embedded object tagged with its type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    type_tag: String,
    fields: Map<String, Value>,
}

impl TypedValue {
    /// Wrap an embedded value; it must serialize to an object
    pub fn from_embedded<T: EmbeddedType>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Object(fields) => Ok(Self {
                type_tag: T::TYPE_TAG.to_string(),
                fields,
            }),
            _ => Err(serde::ser::Error::custom(format!(
                "{} does not serialize to an object",
                T::TYPE_TAG
            ))),
        }
    }

    /// Read the embedded value back as `T`, if the tag matches
    pub fn to_embedded<T: EmbeddedType>(&self) -> Option<T> {
        if self.type_tag != T::TYPE_TAG {
            return None;
        }
        serde_json::from_value(Value::Object(self.fields.clone())).ok()
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Set of embedded type tags accepted when decoding attributes
#[derive(Debug, Clone)]
pub struct TypeAllowList {
    tags: HashSet<String>,
}

impl Default for TypeAllowList {
    fn default() -> Self {
        let mut tags = HashSet::new();
        tags.insert(SECURITY_CONTEXT_TYPE.to_string());
        Self { tags }
    }
}

impl TypeAllowList {
    pub fn allow<S: Into<String>>(&mut self, tag: S) {
        self.tags.insert(tag.into());
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Failure to encode an attribute value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("non-finite number {0} cannot be stored")]
    NonFiniteFloat(f64),

    #[error("map key `@class` is reserved")]
    ReservedKey,

    #[error("cannot encode embedded {0}: {1}")]
    Embedded(&'static str, String),
}

/// Failure to decode a stored attribute value
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("embedded type `{0}` is not allow-listed")]
    TypeNotAllowed(String),

    #[error("type tag `{0}` is not a string")]
    InvalidTypeTag(Value),

    #[error("invalid embedded {0}: {1}")]
    InvalidEmbedded(&'static str, serde_json::Error),

    #[error("unsupported number {0}")]
    UnsupportedNumber(Number),

    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),

    #[error("malformed document: {0}")]
    Document(#[from] serde_json::Error),
}

/// A session attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
    SecurityContext(SecurityContext),
    Typed(TypedValue),
}

impl AttributeValue {
    /// Encode into the stored JSON form
    pub fn encode(&self) -> Result<Value, EncodeError> {
        Ok(match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(i) => Value::Number((*i).into()),
            AttributeValue::Float(f) => {
                Value::Number(Number::from_f64(*f).ok_or(EncodeError::NonFiniteFloat(*f))?)
            }
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(AttributeValue::encode)
                    .collect::<Result<_, _>>()?,
            ),
            AttributeValue::Map(entries) => {
                if entries.contains_key(TYPE_KEY) {
                    return Err(EncodeError::ReservedKey);
                }
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(key.clone(), value.encode()?);
                }
                Value::Object(object)
            }
            AttributeValue::SecurityContext(context) => {
                let mut object = Map::new();
                object.insert(TYPE_KEY.to_string(), Value::String(SECURITY_CONTEXT_TYPE.into()));
                let authentication = match &context.authentication {
                    Some(auth) => serde_json::to_value(auth).map_err(|e| {
                        EncodeError::Embedded(SECURITY_CONTEXT_TYPE, e.to_string())
                    })?,
                    None => Value::Null,
                };
                object.insert("authentication".to_string(), authentication);
                Value::Object(object)
            }
            AttributeValue::Typed(typed) => {
                if typed.fields.contains_key(TYPE_KEY) {
                    return Err(EncodeError::ReservedKey);
                }
                let mut object = Map::new();
                object.insert(TYPE_KEY.to_string(), Value::String(typed.type_tag.clone()));
                object.extend(typed.fields.clone());
                Value::Object(object)
            }
        })
    }

    /// Decode from the stored JSON form
    pub fn decode(value: &Value, allowed: &TypeAllowList) -> Result<Self, DecodeError> {
        Ok(match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => AttributeValue::Int(i),
                (None, Some(f)) => AttributeValue::Float(f),
                _ => return Err(DecodeError::UnsupportedNumber(n.clone())),
            },
            Value::String(s) => AttributeValue::String(s.clone()),
            Value::Array(items) => AttributeValue::List(
                items
                    .iter()
                    .map(|item| AttributeValue::decode(item, allowed))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(object) => match object.get(TYPE_KEY).map(|tag| (tag, tag.as_str())) {
                Some((tag, None)) => return Err(DecodeError::InvalidTypeTag(tag.clone())),
                Some((_, Some(tag))) if !allowed.contains(tag) => {
                    return Err(DecodeError::TypeNotAllowed(tag.to_string()))
                }
                Some((_, Some(SECURITY_CONTEXT_TYPE))) => {
                    let mut fields = object.clone();
                    fields.remove(TYPE_KEY);
                    let context = serde_json::from_value(Value::Object(fields))
                        .map_err(|e| DecodeError::InvalidEmbedded(SECURITY_CONTEXT_TYPE, e))?;
                    AttributeValue::SecurityContext(context)
                }
                Some((_, Some(tag))) => {
                    let mut fields = object.clone();
                    fields.remove(TYPE_KEY);
                    AttributeValue::Typed(TypedValue {
                        type_tag: tag.to_string(),
                        fields,
                    })
                }
                None => AttributeValue::Map(
                    object
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), AttributeValue::decode(v, allowed)?)))
                        .collect::<Result<_, DecodeError>>()?,
                ),
            },
        })
    }

    /// The string content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The security context, if this is one
    pub fn as_security_context(&self) -> Option<&SecurityContext> {
        match self {
            AttributeValue::SecurityContext(context) => Some(context),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<SecurityContext> for AttributeValue {
    fn from(value: SecurityContext) -> Self {
        AttributeValue::SecurityContext(value)
    }
}

impl From<TypedValue> for AttributeValue {
    fn from(value: TypedValue) -> Self {
        AttributeValue::Typed(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(value: Vec<T>) -> Self {
        AttributeValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeValue {
    fn from(value: BTreeMap<String, AttributeValue>) -> Self {
        AttributeValue::Map(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}
