//! Per-table mapping from logical properties to physical columns, with the
//! converters that move values between rows and entities.
//!
//! Composite properties (time intervals, geometries) span multiple columns;
//! their constituent columns are always written together. JSON payload
//! sizes are tracked for size-limit accounting.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::model::types::{EntityType, FieldMapping};
use crate::utils::quote_ident;

use super::query_state::SelectColumn;
use super::value::{Row, SqlValue};

/// A typed property value failed validation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Property `{property}` does not accept this value: {reason}")]
    Invalid { property: String, reason: String },
    #[error("Geometry for `{property}` is not valid: {reason}")]
    InvalidGeometry { property: String, reason: String },
}

/// How one registry entry moves values between row cells and entity
/// properties.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldConverter {
    Id { column: String },
    Plain { column: String },
    Number { column: String },
    Time { column: String },
    TimeInterval { start: String, end: String },
    Json { column: String },
    Geometry { column: String, source_column: String },
    /// The foreign-key column backing a to-one navigation property.
    NavLink { column: String },
}

impl FieldConverter {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            FieldConverter::Id { column }
            | FieldConverter::Plain { column }
            | FieldConverter::Number { column }
            | FieldConverter::Time { column }
            | FieldConverter::Json { column }
            | FieldConverter::NavLink { column } => vec![column.as_str()],
            FieldConverter::TimeInterval { start, end } => vec![start.as_str(), end.as_str()],
            FieldConverter::Geometry {
                column,
                source_column,
            } => vec![column.as_str(), source_column.as_str()],
        }
    }
}

/// One registered property with its converter.
#[derive(Debug, Clone)]
pub struct PropertyFields {
    pub property: String,
    pub converter: FieldConverter,
}

/// The registry of property-to-column mappings for one table.
#[derive(Debug, Clone)]
pub struct PropertyFieldRegistry {
    entries: Vec<PropertyFields>,
}

impl PropertyFieldRegistry {
    /// Build the registry from a type declaration: all scalar properties
    /// plus the link columns of to-one navigations.
    pub fn build(entity_type: &EntityType) -> Self {
        let mut entries = Vec::new();
        for property in &entity_type.properties {
            let converter = match &property.mapping {
                FieldMapping::Id => FieldConverter::Id {
                    column: entity_type.id_column.clone(),
                },
                FieldMapping::Plain { column } => FieldConverter::Plain {
                    column: column.clone(),
                },
                FieldMapping::Number { column } => FieldConverter::Number {
                    column: column.clone(),
                },
                FieldMapping::Time { column } => FieldConverter::Time {
                    column: column.clone(),
                },
                FieldMapping::TimeInterval {
                    start_column,
                    end_column,
                } => FieldConverter::TimeInterval {
                    start: start_column.clone(),
                    end: end_column.clone(),
                },
                FieldMapping::Json { column } => FieldConverter::Json {
                    column: column.clone(),
                },
                FieldMapping::Geometry {
                    column,
                    source_column,
                } => FieldConverter::Geometry {
                    column: column.clone(),
                    source_column: source_column.clone(),
                },
            };
            entries.push(PropertyFields {
                property: property.name.clone(),
                converter,
            });
        }
        for nav in &entity_type.navigation {
            if let Some(link_column) = &nav.link_column {
                entries.push(PropertyFields {
                    property: nav.name.clone(),
                    converter: FieldConverter::NavLink {
                        column: link_column.clone(),
                    },
                });
            }
        }
        PropertyFieldRegistry { entries }
    }

    pub fn entry(&self, property: &str) -> Option<&PropertyFields> {
        self.entries.iter().find(|e| e.property == property)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PropertyFields> {
        self.entries.iter()
    }

    /// The output columns for the given select-set, qualified with the
    /// table alias. An empty select-set means every registered property.
    pub fn select_columns(&self, alias: &str, selected: &HashSet<String>) -> Vec<SelectColumn> {
        self.entries
            .iter()
            .filter(|e| selected.is_empty() || selected.contains(&e.property))
            .flat_map(|e| e.converter.columns())
            .map(|column| SelectColumn {
                qualified: format!("{alias}.{}", quote_ident(column)),
                alias: column.to_string(),
            })
            .collect()
    }
}

impl PropertyFields {
    /// Read this property out of a result row. `None` when every backing
    /// cell is absent or null.
    pub fn read(&self, row: &Row) -> Option<Value> {
        match &self.converter {
            FieldConverter::Id { column } | FieldConverter::NavLink { column } => {
                match row.get(column)? {
                    SqlValue::Null => None,
                    cell => Some(cell_to_json(cell)),
                }
            }
            FieldConverter::Plain { column } => match row.get(column)? {
                SqlValue::Null => None,
                SqlValue::Text(s) => Some(Value::String(s.clone())),
                cell => Some(cell_to_json(cell)),
            },
            FieldConverter::Number { column } => match row.get(column)? {
                SqlValue::Null => None,
                SqlValue::Long(v) => Some(Value::Number((*v).into())),
                SqlValue::Double(v) => Number::from_f64(*v).map(Value::Number),
                SqlValue::Text(s) => s
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number),
                cell => Some(cell_to_json(cell)),
            },
            FieldConverter::Time { column } => match row.get(column)? {
                SqlValue::Null => None,
                SqlValue::Timestamp(t) => Some(Value::String(format_time(t))),
                SqlValue::Text(s) => Some(Value::String(s.clone())),
                _ => None,
            },
            FieldConverter::TimeInterval { start, end } => {
                let start = read_time(row, start)?;
                let end = read_time(row, end)?;
                if start == end {
                    Some(Value::String(start))
                } else {
                    Some(Value::String(format!("{start}/{end}")))
                }
            }
            FieldConverter::Json { column } => match row.get(column)? {
                SqlValue::Null => None,
                SqlValue::Json(v) => Some(v.clone()),
                SqlValue::Text(s) => {
                    Some(serde_json::from_str(s).unwrap_or(Value::String(s.clone())))
                }
                _ => None,
            },
            FieldConverter::Geometry {
                column,
                source_column,
            } => {
                // Prefer the cached source encoding; fall back to the
                // geometry column for rows written before the cache existed.
                match row.get(source_column) {
                    Some(SqlValue::Text(s)) => {
                        Some(serde_json::from_str(s).unwrap_or(Value::String(s.clone())))
                    }
                    Some(SqlValue::Json(v)) => Some(v.clone()),
                    _ => match row.get(column)? {
                        SqlValue::Null => None,
                        SqlValue::Json(v) => Some(v.clone()),
                        SqlValue::Text(s) => {
                            Some(serde_json::from_str(s).unwrap_or(Value::String(s.clone())))
                        }
                        _ => None,
                    },
                }
            }
        }
    }

    /// Column/value pairs for inserting this property. All constituent
    /// columns of a composite property are produced together.
    pub fn insert_values(&self, value: &Value) -> Result<Vec<(String, SqlValue)>, ValidationError> {
        match &self.converter {
            // Identifiers are assigned by the store, never written from a
            // payload.
            FieldConverter::Id { .. } => Ok(vec![]),
            FieldConverter::Plain { column } => match value {
                Value::Null => Ok(vec![(column.clone(), SqlValue::Null)]),
                Value::String(s) => Ok(vec![(column.clone(), SqlValue::Text(s.clone()))]),
                other => Err(self.invalid(format!("expected a string, got {other}"))),
            },
            FieldConverter::Number { column } => match value {
                Value::Null => Ok(vec![(column.clone(), SqlValue::Null)]),
                Value::Number(n) => {
                    let cell = n
                        .as_i64()
                        .map(SqlValue::Long)
                        .or_else(|| n.as_f64().map(SqlValue::Double))
                        .ok_or_else(|| self.invalid("number out of range".to_string()))?;
                    Ok(vec![(column.clone(), cell)])
                }
                Value::String(s) => {
                    let parsed: f64 = s
                        .parse()
                        .map_err(|_| self.invalid(format!("`{s}` is not numeric")))?;
                    Ok(vec![(column.clone(), SqlValue::Double(parsed))])
                }
                other => Err(self.invalid(format!("expected a number, got {other}"))),
            },
            FieldConverter::Time { column } => match value {
                Value::Null => Ok(vec![(column.clone(), SqlValue::Null)]),
                Value::String(s) => {
                    let t = parse_time(s).map_err(|reason| self.invalid(reason))?;
                    Ok(vec![(column.clone(), SqlValue::Timestamp(t))])
                }
                other => Err(self.invalid(format!("expected a timestamp, got {other}"))),
            },
            FieldConverter::TimeInterval { start, end } => {
                let (s, e) = parse_interval(value).map_err(|reason| self.invalid(reason))?;
                Ok(vec![
                    (start.clone(), SqlValue::Timestamp(s)),
                    (end.clone(), SqlValue::Timestamp(e)),
                ])
            }
            FieldConverter::Json { column } => {
                Ok(vec![(column.clone(), SqlValue::Json(value.clone()))])
            }
            FieldConverter::Geometry {
                column,
                source_column,
            } => self.geometry_values(column, source_column, value),
            FieldConverter::NavLink { column } => match value {
                Value::Null => Ok(vec![(column.clone(), SqlValue::Null)]),
                Value::Number(n) => n
                    .as_i64()
                    .map(|v| vec![(column.clone(), SqlValue::Long(v))])
                    .ok_or_else(|| self.invalid("identifier out of range".to_string())),
                Value::String(s) => Ok(vec![(column.clone(), SqlValue::Text(s.clone()))]),
                other => Err(self.invalid(format!("expected an identifier, got {other}"))),
            },
        }
    }

    /// As [`insert_values`](Self::insert_values), additionally naming the
    /// changed logical field for change notification.
    pub fn update_values(
        &self,
        value: &Value,
    ) -> Result<(Vec<(String, SqlValue)>, String), ValidationError> {
        let values = self.insert_values(value)?;
        Ok((values, self.property.clone()))
    }

    /// Decoded payload size of a value for size-limit accounting.
    pub fn value_size(value: &Value) -> usize {
        serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
    }

    fn invalid(&self, reason: String) -> ValidationError {
        ValidationError::Invalid {
            property: self.property.clone(),
            reason,
        }
    }

    /// A recognized geo-encoding is decoded, re-validated and normalized;
    /// anything else is stored opaque in the source column only.
    fn geometry_values(
        &self,
        column: &str,
        source_column: &str,
        value: &Value,
    ) -> Result<Vec<(String, SqlValue)>, ValidationError> {
        if value.is_null() {
            return Ok(vec![
                (column.to_string(), SqlValue::Null),
                (source_column.to_string(), SqlValue::Null),
            ]);
        }

        let decoded = match value {
            Value::String(s) => serde_json::from_str::<Value>(s).ok(),
            Value::Object(_) => Some(value.clone()),
            _ => None,
        };

        let source_text = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        };

        match decoded {
            Some(candidate) if is_geo_tagged(&candidate) => {
                let normalized = validate_geometry(&candidate).map_err(|reason| {
                    ValidationError::InvalidGeometry {
                        property: self.property.clone(),
                        reason,
                    }
                })?;
                Ok(vec![
                    (column.to_string(), SqlValue::Json(normalized)),
                    (source_column.to_string(), SqlValue::Text(source_text)),
                ])
            }
            // Unrecognized encoding: kept as an opaque blob, not indexed.
            _ => Ok(vec![
                (column.to_string(), SqlValue::Null),
                (source_column.to_string(), SqlValue::Text(source_text)),
            ]),
        }
    }
}

fn cell_to_json(cell: &SqlValue) -> Value {
    match cell {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Long(v) => Value::Number((*v).into()),
        SqlValue::Double(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Uuid(u) => Value::String(u.to_string()),
        SqlValue::Timestamp(t) => Value::String(format_time(t)),
        SqlValue::Json(v) => v.clone(),
    }
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn read_time(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        SqlValue::Timestamp(t) => Some(format_time(t)),
        SqlValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("`{text}` is not a valid timestamp: {e}"))
}

/// An interval is `start/end`, a single instant, or an object with
/// `start`/`end` members.
fn parse_interval(value: &Value) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    match value {
        Value::String(text) => match text.split_once('/') {
            Some((start, end)) => Ok((parse_time(start)?, parse_time(end)?)),
            None => {
                let instant = parse_time(text)?;
                Ok((instant, instant))
            }
        },
        Value::Object(map) => {
            let get = |key: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("interval object lacks `{key}`"))
            };
            Ok((parse_time(get("start")?)?, parse_time(get("end")?)?))
        }
        other => Err(format!("expected a time interval, got {other}")),
    }
}

const GEO_TYPES: [&str; 6] = [
    "Point",
    "LineString",
    "Polygon",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
];

fn is_geo_tagged(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .map(|t| GEO_TYPES.contains(&t))
        .unwrap_or(false)
}

/// Validate a GeoJSON geometry and normalize it into the canonical CRS
/// (WGS84 lon/lat): any `crs` member is stripped, coordinates must be
/// finite, and polygon rings must be closed with at least four positions.
fn validate_geometry(value: &Value) -> Result<Value, String> {
    let obj = value.as_object().ok_or("geometry must be an object")?;
    let geo_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry lacks a type")?;
    let coordinates = obj.get("coordinates").ok_or("geometry lacks coordinates")?;

    match geo_type {
        "Point" => validate_position(coordinates)?,
        "MultiPoint" | "LineString" => validate_position_list(coordinates, 1)?,
        "MultiLineString" => {
            for line in as_array(coordinates)? {
                validate_position_list(line, 2)?;
            }
        }
        "Polygon" => validate_rings(coordinates)?,
        "MultiPolygon" => {
            for polygon in as_array(coordinates)? {
                validate_rings(polygon)?;
            }
        }
        other => return Err(format!("unsupported geometry type `{other}`")),
    }

    let mut normalized = obj.clone();
    normalized.remove("crs");
    Ok(Value::Object(normalized))
}

fn as_array(value: &Value) -> Result<&Vec<Value>, String> {
    value.as_array().ok_or_else(|| "expected an array".to_string())
}

fn validate_position(value: &Value) -> Result<(), String> {
    let coords = as_array(value)?;
    if coords.len() < 2 || coords.len() > 3 {
        return Err("a position needs 2 or 3 ordinates".to_string());
    }
    for ordinate in coords {
        let number = ordinate.as_f64().ok_or("ordinates must be numbers")?;
        if !number.is_finite() {
            return Err("ordinates must be finite".to_string());
        }
    }
    Ok(())
}

fn validate_position_list(value: &Value, min_len: usize) -> Result<(), String> {
    let positions = as_array(value)?;
    if positions.len() < min_len {
        return Err(format!("expected at least {min_len} positions"));
    }
    for position in positions {
        validate_position(position)?;
    }
    Ok(())
}

fn validate_rings(value: &Value) -> Result<(), String> {
    let rings = as_array(value)?;
    if rings.is_empty() {
        return Err("a polygon needs at least one ring".to_string());
    }
    for ring in rings {
        let positions = as_array(ring)?;
        if positions.len() < 4 {
            return Err("a ring needs at least 4 positions".to_string());
        }
        for position in positions {
            validate_position(position)?;
        }
        if positions.first() != positions.last() {
            return Err("a ring must be closed".to_string());
        }
    }
    Ok(())
}
