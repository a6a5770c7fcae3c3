//! The path grammar: a nom lexer for the segment shapes, followed by a
//! classification pass that checks every segment against the registered
//! model and appends typed path elements.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alphanumeric1, char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

use super::errors::PathParseError;
use super::{PathElement, ResourcePath};
use crate::model::{IdManager, ModelRegistry};

/// The lexical shape of one `/`-separated segment, before the model is
/// consulted.
#[derive(Debug, Clone, PartialEq)]
enum RawSegment<'a> {
    RefMark,
    ValueMark,
    Name {
        name: &'a str,
        id: Option<&'a str>,
        indices: Vec<usize>,
    },
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(alphanumeric1, many0(pair(tag("_"), alphanumeric1)))).parse(input)
}

fn id_group(input: &str) -> IResult<&str, &str> {
    delimited(char('('), take_while1(|c| c != ')' && c != '/'), char(')')).parse(input)
}

fn array_index(input: &str) -> IResult<&str, usize> {
    map_res(delimited(char('['), digit1, char(']')), str::parse).parse(input)
}

fn segment(input: &str) -> IResult<&str, RawSegment<'_>> {
    alt((
        value(RawSegment::RefMark, tag("$ref")),
        value(RawSegment::ValueMark, tag("$value")),
        map(
            (identifier, opt(id_group), many0(array_index)),
            |(name, id, indices)| RawSegment::Name { name, id, indices },
        ),
    ))
    .parse(input)
}

fn segments(input: &str) -> IResult<&str, Vec<RawSegment<'_>>> {
    all_consuming(preceded(
        opt(char('/')),
        separated_list1(char('/'), segment),
    ))
    .parse(input)
}

/// Where the classification walk currently stands.
enum State {
    Start,
    /// After an entity set without identifier; only `$ref` may follow.
    AfterSet,
    /// After a single entity; navigations, properties and `$ref` may follow.
    AfterEntity(String),
    /// After a scalar or custom property; sub-properties, indices and
    /// `$value` may follow.
    AfterProperty,
    Done,
}

/// Parse a resource path against the registered model.
///
/// Pure function of its inputs; any lexical or grammatical error, unknown
/// name, or malformed identifier/array index yields [`PathParseError`].
pub fn parse_path(
    registry: &ModelRegistry,
    id_manager: &dyn IdManager,
    service_root_url: &str,
    version: &str,
    path: &str,
) -> Result<ResourcePath, PathParseError> {
    log::debug!("Parsing path: {}", crate::utils::clean_for_logging(path));

    let mut resource_path = ResourcePath {
        service_root_url: service_root_url.to_string(),
        version: version.to_string(),
        path: path.to_string(),
        elements: Vec::new(),
        is_ref: false,
        is_value: false,
        identified_element: None,
    };
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "/" {
        // The service root itself; no elements.
        return Ok(resource_path);
    }
    if trimmed.len() != path.len() {
        // A trailing slash would lex but names an empty segment.
        return Err(PathParseError::log(path, "trailing slash"));
    }

    let raw = match segments(path) {
        Ok((_, raw)) => raw,
        Err(e) => return Err(PathParseError::log(path, &e.to_string())),
    };

    let mut state = State::Start;
    for seg in raw {
        state = classify(registry, id_manager, &mut resource_path, state, seg)?;
    }
    Ok(resource_path)
}

fn classify(
    registry: &ModelRegistry,
    id_manager: &dyn IdManager,
    rp: &mut ResourcePath,
    state: State,
    seg: RawSegment<'_>,
) -> Result<State, PathParseError> {
    match state {
        State::Start => match seg {
            RawSegment::Name {
                name,
                id,
                ref indices,
            } if indices.is_empty() => {
                let entity_type = registry
                    .entity_type_by_plural(name)
                    .ok_or_else(|| {
                        PathParseError::log(&rp.path, &format!("unknown entity set `{name}`"))
                    })?
                    .name
                    .clone();
                push_entity_or_set(rp, id_manager, entity_type, id, None)
            }
            _ => Err(PathParseError::log(
                &rp.path,
                "path must start with an entity set",
            )),
        },
        State::AfterSet => match seg {
            RawSegment::RefMark => {
                rp.is_ref = true;
                Ok(State::Done)
            }
            _ => Err(PathParseError::log(
                &rp.path,
                "only $ref may follow an entity set without identifier",
            )),
        },
        State::AfterEntity(type_name) => match seg {
            RawSegment::RefMark => {
                rp.is_ref = true;
                Ok(State::Done)
            }
            RawSegment::ValueMark => Err(PathParseError::log(
                &rp.path,
                "$value may only follow a property",
            )),
            RawSegment::Name { name, id, indices } => {
                let entity_type = registry.entity_type(&type_name).map_err(|_| {
                    PathParseError::log(&rp.path, &format!("unknown type `{type_name}`"))
                })?;
                if let Some(nav) = entity_type.navigation(name) {
                    if !indices.is_empty() {
                        return Err(PathParseError::log(
                            &rp.path,
                            "array index after navigation",
                        ));
                    }
                    let nav_name = Some(nav.name.clone());
                    if nav.to_many {
                        push_entity_or_set(rp, id_manager, nav.target.clone(), id, nav_name)
                    } else {
                        if id.is_some() {
                            return Err(PathParseError::log(
                                &rp.path,
                                "identifier after to-one navigation",
                            ));
                        }
                        rp.elements.push(PathElement::Entity {
                            entity_type: nav.target.clone(),
                            id: None,
                            nav: nav_name,
                        });
                        Ok(State::AfterEntity(nav.target.clone()))
                    }
                } else if let Some(property) = entity_type.property(name) {
                    if id.is_some() {
                        return Err(PathParseError::log(
                            &rp.path,
                            "identifier after property",
                        ));
                    }
                    rp.elements.push(PathElement::Property {
                        name: property.name.clone(),
                    });
                    for index in indices {
                        rp.elements.push(PathElement::ArrayIndex { index });
                    }
                    Ok(State::AfterProperty)
                } else {
                    Err(PathParseError::log(
                        &rp.path,
                        &format!("`{name}` is not a property of `{type_name}`"),
                    ))
                }
            }
        },
        State::AfterProperty => match seg {
            RawSegment::ValueMark => {
                rp.is_value = true;
                Ok(State::Done)
            }
            RawSegment::RefMark => Err(PathParseError::log(
                &rp.path,
                "$ref may not follow a property",
            )),
            RawSegment::Name { name, id, indices } => {
                if id.is_some() {
                    return Err(PathParseError::log(
                        &rp.path,
                        "identifier after sub-property",
                    ));
                }
                rp.elements.push(PathElement::CustomProperty {
                    name: name.to_string(),
                });
                for index in indices {
                    rp.elements.push(PathElement::ArrayIndex { index });
                }
                Ok(State::AfterProperty)
            }
        },
        State::Done => Err(PathParseError::log(
            &rp.path,
            "no segment may follow $ref or $value",
        )),
    }
}

fn push_entity_or_set(
    rp: &mut ResourcePath,
    id_manager: &dyn IdManager,
    entity_type: String,
    id_token: Option<&str>,
    nav: Option<String>,
) -> Result<State, PathParseError> {
    match id_token {
        Some(token) => {
            let id = id_manager.parse_id(token).map_err(|e| {
                PathParseError::log(&rp.path, &format!("bad identifier: {e}"))
            })?;
            rp.elements.push(PathElement::Entity {
                entity_type: entity_type.clone(),
                id: Some(id),
                nav,
            });
            rp.identified_element = Some(rp.elements.len() - 1);
            Ok(State::AfterEntity(entity_type))
        }
        None => {
            rp.elements.push(PathElement::EntitySet {
                entity_type: entity_type.clone(),
                nav,
            });
            Ok(State::AfterSet)
        }
    }
}
