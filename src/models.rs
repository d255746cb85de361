use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Reserved query parameters understood by every resource.
///
/// Any other key is a predicate: `field=value` for equality, or
/// `field__<op>=value` with one of `ne, lt, lte, gt, gte, in, nin, all,
/// size, exists, contains, icontains, startswith, istartswith, endswith,
/// iendswith, exact, iexact`. Comma-separated values are split for the list
/// operators.
///
/// # Pagination
/// `_start` or `_page`, never both, together with `_limit`:
/// ```text
/// ?_page=2&_limit=20
/// ```
///
/// # Aggregation
/// ```text
/// ?_group=status&_group$sum=amount
/// ?_distinct=status&_sort=status
/// ?_frequencies=status&_fq_normalize=1
/// ```
#[derive(Debug, Deserialize, IntoParams, ToSchema, Default)]
#[into_params(parameter_in = Query)]
pub struct ControlParams {
    /// Comma-separated sort keys; prefix with `-` for descending.
    ///
    /// Example: `-created,title`
    #[serde(rename = "_sort")]
    #[param(example = "-created,title")]
    pub sort: Option<String>,
    /// Comma-separated fields to return, `-field` to exclude, `field__as__alias` to rename.
    #[serde(rename = "_fields")]
    #[param(example = "title,status")]
    pub fields: Option<String>,
    /// Return the number of matching records instead of the records.
    #[serde(rename = "_count")]
    pub count: Option<String>,
    /// Return the first matching record.
    #[serde(rename = "_first")]
    pub first: Option<String>,
    #[serde(rename = "_start")]
    #[param(example = 0)]
    pub start: Option<i64>,
    #[serde(rename = "_page")]
    #[param(example = 0)]
    pub page: Option<i64>,
    /// Page size; `-1` for no limit.
    #[serde(rename = "_limit")]
    #[param(example = 20)]
    pub limit: Option<i64>,
    /// Field whose distinct values are returned.
    #[serde(rename = "_distinct")]
    pub distinct: Option<String>,
    /// Comma-separated grouping keys; accumulators go in `_group$<op>=<field>`.
    #[serde(rename = "_group")]
    pub group: Option<String>,
    /// Comma-separated fields whose values are returned without the envelope.
    #[serde(rename = "_scalar")]
    pub scalar: Option<String>,
    /// Field whose value frequencies are returned.
    #[serde(rename = "_frequencies")]
    pub frequencies: Option<String>,
    /// Return proportions instead of counts.
    #[serde(rename = "_fq_normalize")]
    pub fq_normalize: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RESERVED_KEYS;
    use utoipa::IntoParams;

    #[test]
    fn test_documents_every_reserved_key() {
        let params = ControlParams::into_params(|| None);
        let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        for key in RESERVED_KEYS {
            assert!(names.iter().any(|name| name == key), "{key} is undocumented");
        }
        assert_eq!(names.len(), RESERVED_KEYS.len());
    }

    #[test]
    fn test_deserializes_reserved_keys() {
        let params: ControlParams =
            serde_json::from_value(serde_json::json!({"_sort": "-a", "_limit": 5})).unwrap();
        assert_eq!(params.sort.as_deref(), Some("-a"));
        assert_eq!(params.limit, Some(5));
    }
}
