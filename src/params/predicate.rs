use serde::Serialize;
use serde_json::{Map, Value};

/// Filter operator carried as a `__<suffix>` on a predicate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Value in list
    In,
    /// Value not in list
    Nin,
    /// Field array contains every listed value
    All,
    /// Field array has exactly this many elements
    Size,
    /// Field is present (non-zero) or absent (zero)
    Exists,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Exact,
    IExact,
}

impl Operator {
    /// Parse an operator from a key suffix (the text after the last `__`)
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "ne" => Some(Self::Ne),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "in" => Some(Self::In),
            "nin" => Some(Self::Nin),
            "all" => Some(Self::All),
            "size" => Some(Self::Size),
            "exists" => Some(Self::Exists),
            "contains" => Some(Self::Contains),
            "icontains" => Some(Self::IContains),
            "startswith" => Some(Self::StartsWith),
            "istartswith" => Some(Self::IStartsWith),
            "endswith" => Some(Self::EndsWith),
            "iendswith" => Some(Self::IEndsWith),
            "exact" => Some(Self::Exact),
            "iexact" => Some(Self::IExact),
            _ => None,
        }
    }

    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::All => "all",
            Self::Size => "size",
            Self::Exists => "exists",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Exact => "exact",
            Self::IExact => "iexact",
        }
    }

    /// Operators whose value is a comma-separated list
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin | Self::All)
    }

    /// Operators whose string value is coerced to an integer
    #[must_use]
    pub const fn takes_int(self) -> bool {
        matches!(
            self,
            Self::Exists | Self::Size | Self::Gt | Self::Gte | Self::Lt | Self::Lte
        )
    }

    /// Split `path__op` into the field path and its operator. Keys whose
    /// suffix is not an operator are returned whole.
    #[must_use]
    pub fn split(key: &str) -> (&str, Option<Self>) {
        key.rfind("__")
            .and_then(|pos| Self::from_suffix(&key[pos + 2..]).map(|op| (&key[..pos], Some(op))))
            .unwrap_or((key, None))
    }
}

/// Normalized filter predicates: field path (with optional operator suffix)
/// to typed value, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Predicates(Map<String, Value>);

impl Predicates {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Predicates {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut predicates = Self::new();
        for (key, value) in iter {
            predicates.insert(key, value);
        }
        predicates
    }
}
