use serde::Serialize;

use crate::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Numeric form used by document-store sort documents
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parse one sort token: `-field` sorts descending, `field` or `+field`
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the token names no field.
    pub fn parse(token: &str) -> Result<Self, ApiError> {
        let token = token.trim();
        let key = if let Some(field) = token.strip_prefix('-') {
            Self::descending(field.trim())
        } else {
            Self::ascending(token.strip_prefix('+').unwrap_or(token).trim())
        };
        if key.field.is_empty() {
            return Err(ApiError::bad_request(format!("Bad sort token '{token}'")));
        }
        Ok(key)
    }

    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Descending
    }
}

/// Parse `_sort` tokens in order.
///
/// # Errors
///
/// Returns `BadRequest` for a token without a field name.
pub fn parse_sort(tokens: &[String]) -> Result<Vec<SortKey>, ApiError> {
    tokens.iter().map(|token| SortKey::parse(token)).collect()
}
