//! Filter expressions for data sources
//!
//! A filter expression is a URL query string whose values carry PowerStore
//! query operators, e.g. `name=ilike.fs*&size_total=gt.1073741824`.

use crate::domain::ports::ListQuery;
use crate::error::{Error, Result};

const SUMMARY: &str = "Invalid PowerStore filter expression";

/// Parse a filter expression into list query parameters
///
/// Keys may repeat. Every value must be non-empty.
pub fn parse_filter_expression(raw: &str) -> Result<ListQuery> {
    if raw.is_empty() {
        return Err(Error::validation(
            SUMMARY,
            "Expecting a string value that was expected to be in PowerStore filter expression format, got empty string value.",
        ));
    }

    let mut query = ListQuery::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        if pair.contains(';') {
            return Err(unexpected("invalid semicolon separator in query"));
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(key)?;
        let value = decode(value)?;
        if value.is_empty() {
            return Err(Error::validation(
                format!("Invalid PowerStore filter value for query parameter: {}", key),
                "empty query value provided, please provide queries in the key=value format where value is not empty string",
            ));
        }
        query = query.with(key, value);
    }
    Ok(query)
}

fn unexpected(reason: &str) -> Error {
    Error::validation(
        SUMMARY,
        format!(
            "An unexpected error occurred while converting a string value that was expected to be in PowerStore filter expression format: {}",
            reason
        ),
    )
}

/// Percent-decode one component; `+` stands for a space
fn decode(component: &str) -> Result<String> {
    let bytes = component.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                let end = (i + 3).min(component.len());
                return Err(unexpected(&format!(
                    "invalid URL escape \"{}\"",
                    component.get(i..end).unwrap_or("%")
                )));
            }
        }
    }
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| unexpected(&e.to_string()))
}

/// Reject filters on keys the data source controls itself
pub fn reject_keys(query: &ListQuery, forbidden: &[&str]) -> Result<()> {
    for (key, _) in &query.params {
        if forbidden.contains(&key.as_str()) {
            return Err(Error::validation(
                "Invalid filter expression",
                format!("filtering by {} is not allowed", key),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_expression() {
        let query = parse_filter_expression("name=ilike.fs%2A&size_total=gt.1024&name=neq.x").unwrap();
        assert_eq!(
            query.params,
            vec![
                ("name".to_string(), "ilike.fs*".to_string()),
                ("size_total".to_string(), "gt.1024".to_string()),
                ("name".to_string(), "neq.x".to_string()),
            ]
        );

        let spaced = parse_filter_expression("description=eq.my+share").unwrap();
        assert_eq!(spaced.params[0].1, "eq.my share");
    }

    #[test]
    fn test_empty_expression_and_values() {
        assert_matches!(
            parse_filter_expression(""),
            Err(Error::Validation { ref summary, .. }) if summary == "Invalid PowerStore filter expression"
        );
        assert_matches!(
            parse_filter_expression("name=eq.fs&description="),
            Err(Error::Validation { ref summary, .. })
                if summary == "Invalid PowerStore filter value for query parameter: description"
        );
        assert_matches!(
            parse_filter_expression("name"),
            Err(Error::Validation { ref summary, .. })
                if summary == "Invalid PowerStore filter value for query parameter: name"
        );
    }

    #[test]
    fn test_malformed_expression() {
        assert_matches!(
            parse_filter_expression("name=eq.%zz"),
            Err(Error::Validation { ref detail, .. }) if detail.contains("invalid URL escape \"%zz\"")
        );
        assert!(parse_filter_expression("a=eq.1;b=eq.2").is_err());
    }

    #[test]
    fn test_reject_keys() {
        let query = parse_filter_expression("filesystem_type=eq.Snapshot").unwrap();
        assert_matches!(
            reject_keys(&query, &["filesystem_type"]),
            Err(Error::Validation { ref detail, .. }) if detail == "filtering by filesystem_type is not allowed"
        );
        assert!(reject_keys(&query, &["type"]).is_ok());
    }
}
