//! Request handlers: parse the path and query options, run the builder,
//! and either execute against the configured store or answer with the
//! translated statements.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query as AxumQuery, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::model::Entity;
use crate::persistence::{EntityFactory, PersistenceError};
use crate::query::options::parse_query;
use crate::resource_path::parse_path;
use crate::sql::{QueryBuilder, QueryError, SqlStatement};

use super::AppState;

/// Simple health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "sensorpath",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn query_error_response(error: QueryError) -> Response {
    let status = match &error {
        QueryError::InvalidPath(_) | QueryError::EmptyPath => StatusCode::NOT_FOUND,
        QueryError::IdTypeMismatch { .. } => StatusCode::BAD_REQUEST,
        // Missing metadata for an always-mappable operation is an internal
        // fault, not a client problem.
        QueryError::UnmappedDeleteType { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        QueryError::Model(_) | QueryError::MissingNavigation { .. } => StatusCode::BAD_REQUEST,
        QueryError::UnsupportedExpression { .. } | QueryError::WrongRelationSide { .. } => {
            StatusCode::BAD_REQUEST
        }
    };
    error_response(status, error.to_string())
}

fn persistence_error_response(error: PersistenceError) -> Response {
    let status = match &error {
        PersistenceError::NoSuchEntity { .. } => StatusCode::NOT_FOUND,
        PersistenceError::IncompleteEntity { .. } | PersistenceError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        PersistenceError::Integrity { .. } | PersistenceError::DuplicateRow { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PersistenceError::Query(inner) => return query_error_response(inner.clone()),
        PersistenceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, error.to_string())
}

/// The response for a translated (not executed) request.
#[derive(Debug, Serialize)]
struct TranslationResponse {
    select: SqlStatement,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<SqlStatement>,
}

#[derive(Debug, Serialize)]
struct CollectionResponse {
    value: Vec<Entity>,
    #[serde(rename = "@iot.count", skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(rename = "@iot.nextLink", skip_serializing_if = "Option::is_none")]
    next_link: Option<String>,
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    AxumQuery(options): AxumQuery<HashMap<String, String>>,
) -> Response {
    let resource_path = match parse_path(
        &state.registry,
        state.id_manager,
        "",
        "v1.1",
        &format!("/{path}"),
    ) {
        Ok(rp) => rp,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    };
    let query = match parse_query(&options) {
        Ok(q) => q,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let select = match QueryBuilder::for_path(
        &state.registry,
        &state.tables,
        &state.settings,
        &resource_path,
    )
    .using_query(&query)
    .build_select()
    {
        Ok(statement) => statement,
        Err(e) => return query_error_response(e),
    };

    let count = if query.count {
        match QueryBuilder::for_path(
            &state.registry,
            &state.tables,
            &state.settings,
            &resource_path,
        )
        .using_query(&query)
        .build_count()
        {
            Ok(statement) => Some(statement),
            Err(e) => return query_error_response(e),
        }
    } else {
        None
    };

    let Some(store) = &state.store else {
        // Translation-only mode.
        return Json(TranslationResponse { select, count }).into_response();
    };

    let rows = match store.query_rows(&select).await {
        Ok(rows) => rows,
        Err(e) => return persistence_error_response(e),
    };

    let entity_type = match resource_path.main_entity_type() {
        Some(t) => t.to_string(),
        None => return error_response(StatusCode::NOT_FOUND, "Path is not valid."),
    };
    let factory = EntityFactory::new(&state.registry, &state.tables, &state.settings);

    if resource_path.is_single_entity() {
        return match rows.len() {
            0 => error_response(StatusCode::NOT_FOUND, "Nothing found."),
            1 => match factory.entity_from_row(&entity_type, &rows[0]) {
                Ok(entity) => Json(single_entity_body(&resource_path, entity)).into_response(),
                Err(e) => persistence_error_response(e),
            },
            // The 2-row window exists exactly to expose this fault.
            _ => persistence_error_response(PersistenceError::DuplicateRow { entity_type }),
        };
    }

    let top = query.top_or_default(&state.settings) as usize;
    let has_more = rows.len() > top;
    let mut entities = Vec::with_capacity(rows.len().min(top));
    for row in rows.iter().take(top) {
        match factory.entity_from_row(&entity_type, row) {
            Ok(entity) => entities.push(entity),
            Err(e) => return persistence_error_response(e),
        }
    }

    let count_value = match count {
        Some(statement) => match store.query_rows(&statement).await {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.0.values().next())
                .and_then(|cell| match cell {
                    crate::sql::SqlValue::Long(v) => Some(*v),
                    _ => None,
                }),
            Err(e) => return persistence_error_response(e),
        },
        None => None,
    };

    let next_link = has_more.then(|| {
        let skip = query.skip_or_zero() + top as i64;
        format!("/v1.1/{path}?$top={top}&$skip={skip}")
    });

    Json(CollectionResponse {
        value: entities,
        count: count_value,
        next_link,
    })
    .into_response()
}

/// A `/property` or `/$value` path narrows the response to the addressed
/// property.
fn single_entity_body(resource_path: &crate::resource_path::ResourcePath, entity: Entity) -> Value {
    let mut addressed: Option<&str> = None;
    for element in &resource_path.elements {
        if let crate::resource_path::PathElement::Property { name } = element {
            addressed = Some(name.as_str());
        }
    }
    match addressed {
        Some(name) => {
            let value = entity.property(name).cloned().unwrap_or(Value::Null);
            if resource_path.is_value {
                value
            } else {
                serde_json::json!({ name: value })
            }
        }
        None => serde_json::to_value(&entity).unwrap_or(Value::Null),
    }
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    AxumQuery(options): AxumQuery<HashMap<String, String>>,
) -> Response {
    let resource_path = match parse_path(
        &state.registry,
        state.id_manager,
        "",
        "v1.1",
        &format!("/{path}"),
    ) {
        Ok(rp) => rp,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    };
    let query = match parse_query(&options) {
        Ok(q) => q,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let statement = match QueryBuilder::for_path(
        &state.registry,
        &state.tables,
        &state.settings,
        &resource_path,
    )
    .using_query(&query)
    .build_delete()
    {
        Ok(statement) => statement,
        Err(e) => return query_error_response(e),
    };

    match &state.store {
        Some(store) => match store.execute(&statement).await {
            Ok(affected) => {
                log::info!("Deleted {affected} rows for {}", resource_path.path);
                StatusCode::NO_CONTENT.into_response()
            }
            Err(e) => persistence_error_response(e),
        },
        None => Json(serde_json::json!({ "delete": statement })).into_response(),
    }
}
