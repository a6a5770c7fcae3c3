//! Turning raw query-option strings into a [`Query`].

use std::collections::HashMap;

use super::expression::parse_expression;
use super::{Expand, OrderBy, OrderType, Query, QueryOptionError};

/// Parse the standard query options out of a decoded key/value map.
pub fn parse_query(options: &HashMap<String, String>) -> Result<Query, QueryOptionError> {
    let mut query = Query::default();
    for (key, value) in options {
        apply_option(&mut query, key, value)?;
    }
    Ok(query)
}

fn apply_option(query: &mut Query, key: &str, value: &str) -> Result<(), QueryOptionError> {
    match key {
        "$select" => {
            let mut value = value.trim();
            if let Some(rest) = value.strip_prefix("distinct:") {
                query.select_distinct = true;
                value = rest.trim();
            }
            query.select = split_top_level(value, ',')
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "$expand" => {
            for item in split_top_level(value, ',') {
                query.expand.push(parse_expand_item(item.trim())?);
            }
        }
        "$filter" => {
            query.filter = Some(parse_expression(value)?);
        }
        "$orderby" => {
            for term in split_top_level(value, ',') {
                query.order_by.push(parse_order_term(term.trim())?);
            }
        }
        "$top" => {
            query.top = Some(parse_non_negative(key, value)?);
        }
        "$skip" => {
            query.skip = Some(parse_non_negative(key, value)?);
        }
        "$count" => {
            query.count = match value.trim() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(QueryOptionError::Invalid {
                        option: key.to_string(),
                        reason: format!("expected true or false, got `{other}`"),
                    })
                }
            };
        }
        other => {
            return Err(QueryOptionError::Invalid {
                option: other.to_string(),
                reason: "unknown query option".to_string(),
            })
        }
    }
    Ok(())
}

fn parse_non_negative(key: &str, value: &str) -> Result<i64, QueryOptionError> {
    match value.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(QueryOptionError::Invalid {
            option: key.to_string(),
            reason: format!("expected a non-negative integer, got `{value}`"),
        }),
    }
}

/// An expand item is a navigation path optionally followed by a
/// parenthesized, `;`-separated nested option list:
/// `Datastreams($top=2;$orderby=name desc)`.
fn parse_expand_item(item: &str) -> Result<Expand, QueryOptionError> {
    let (path_text, nested) = match item.find('(') {
        Some(open) => {
            if !item.ends_with(')') {
                return Err(QueryOptionError::Invalid {
                    option: "$expand".to_string(),
                    reason: format!("unbalanced parentheses in `{item}`"),
                });
            }
            (&item[..open], Some(&item[open + 1..item.len() - 1]))
        }
        None => (item, None),
    };

    let path: Vec<String> = path_text
        .split('/')
        .map(|s| s.trim().to_string())
        .collect();
    if path.iter().any(|s| s.is_empty()) {
        return Err(QueryOptionError::Invalid {
            option: "$expand".to_string(),
            reason: format!("empty navigation segment in `{item}`"),
        });
    }

    let mut expand = Expand::new(path);
    if let Some(nested) = nested {
        let mut sub = Query::default();
        for pair in split_top_level(nested, ';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                QueryOptionError::Invalid {
                    option: "$expand".to_string(),
                    reason: format!("malformed nested option `{pair}`"),
                }
            })?;
            apply_option(&mut sub, key.trim(), value)?;
        }
        expand.query = Some(Box::new(sub));
    }
    Ok(expand)
}

fn parse_order_term(term: &str) -> Result<OrderBy, QueryOptionError> {
    let (expr_text, order) = if let Some(stripped) = term.strip_suffix(" desc") {
        (stripped, OrderType::Descending)
    } else if let Some(stripped) = term.strip_suffix(" asc") {
        (stripped, OrderType::Ascending)
    } else {
        (term, OrderType::Ascending)
    };
    Ok(OrderBy {
        expr: parse_expression(expr_text.trim())?,
        order,
    })
}

/// Split on `separator`, ignoring separators nested inside parentheses or
/// single-quoted strings.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 && !in_string => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::{CompareOp, Expression, Literal};

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_select_and_distinct() {
        let q = parse_query(&options(&[("$select", "name, description")])).unwrap();
        assert_eq!(q.select, vec!["name", "description"]);
        assert!(!q.select_distinct);

        let q = parse_query(&options(&[("$select", "distinct:name")])).unwrap();
        assert!(q.select_distinct);
        assert_eq!(q.select, vec!["name"]);
    }

    #[test]
    fn test_top_skip_count() {
        let q = parse_query(&options(&[
            ("$top", "10"),
            ("$skip", "5"),
            ("$count", "true"),
        ]))
        .unwrap();
        assert_eq!(q.top, Some(10));
        assert_eq!(q.skip, Some(5));
        assert!(q.count);

        assert!(parse_query(&options(&[("$top", "-1")])).is_err());
        assert!(parse_query(&options(&[("$skip", "many")])).is_err());
    }

    #[test]
    fn test_filter_parses() {
        let q = parse_query(&options(&[("$filter", "name eq 'x'")])).unwrap();
        match q.filter.unwrap() {
            Expression::Compare { op, right, .. } => {
                assert_eq!(op, CompareOp::Eq);
                assert_eq!(*right, Expression::Literal(Literal::Text("x".to_string())));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_orderby_terms() {
        let q = parse_query(&options(&[("$orderby", "name desc, id")])).unwrap();
        assert_eq!(q.order_by.len(), 2);
        assert_eq!(q.order_by[0].order, OrderType::Descending);
        assert_eq!(q.order_by[1].order, OrderType::Ascending);
    }

    #[test]
    fn test_expand_with_nested_options() {
        let q = parse_query(&options(&[(
            "$expand",
            "Datastreams($top=2;$orderby=name desc),Locations",
        )]))
        .unwrap();
        assert_eq!(q.expand.len(), 2);
        assert_eq!(q.expand[0].path, vec!["Datastreams"]);
        let nested = q.expand[0].query.as_ref().unwrap();
        assert_eq!(nested.top, Some(2));
        assert_eq!(nested.order_by.len(), 1);
        assert_eq!(q.expand[1].path, vec!["Locations"]);
        assert!(q.expand[1].query.is_none());
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(parse_query(&options(&[("$explode", "1")])).is_err());
    }
}
