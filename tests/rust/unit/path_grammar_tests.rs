//! Unit tests for the path grammar: totality over the declared grammar and
//! rejection of everything outside it.

use sensorpath::model::{Id, IdManagerLong, IdManagerText, IdManagerUuid, ModelConfig, ModelRegistry};
use sensorpath::resource_path::{parse_path, PathElement, ResourcePath};
use test_case::test_case;

fn registry() -> ModelRegistry {
    ModelRegistry::build(&ModelConfig::sensorthings()).unwrap()
}

fn parse(path: &str) -> Result<ResourcePath, sensorpath::resource_path::PathParseError> {
    parse_path(&registry(), &IdManagerLong, "http://localhost/sta", "v1.1", path)
}

#[test_case("/Things"; "bare set")]
#[test_case("/Things(1)"; "entity by id")]
#[test_case("/Things(1)/Datastreams"; "set through navigation")]
#[test_case("/Things(1)/Datastreams(2)/Observations"; "two hops")]
#[test_case("/Things(1)/Datastreams(2)/Observations(3)/result"; "terminal property")]
#[test_case("/Things(1)/Locations/$ref"; "ref after navigation set")]
#[test_case("/Datastreams(2)/ObservedProperty/name/$value"; "value after property")]
#[test_case("/Observations(3)/parameters/foo[2]"; "array index in custom property")]
#[test_case("/Observations(3)/parameters/foo/bar[0][1]"; "nested custom with chained indices")]
#[test_case("/MultiDatastreams(3)/ObservedProperties"; "ordered many to many")]
#[test_case("/Things(1)/HistoricalLocations"; "historical locations")]
fn valid_paths_parse(path: &str) {
    let parsed = parse(path).unwrap_or_else(|_| panic!("`{path}` should parse"));
    assert!(!parsed.is_empty());
}

#[test_case(""; "empty is service root")]
#[test_case("/"; "slash is service root")]
fn service_root_is_empty_path(path: &str) {
    assert!(parse(path).unwrap().is_empty());
}

#[test_case("/Thing"; "singular at root")]
#[test_case("/things"; "wrong case")]
#[test_case("/Things()"; "empty id group")]
#[test_case("/Things(1)(2)"; "double id group")]
#[test_case("/Things(1)/Observations"; "navigation not on type")]
#[test_case("/Things/Datastreams"; "navigation from unidentified set")]
#[test_case("/Things(1)/name/$ref"; "ref after property")]
#[test_case("/Things/$value"; "value after set")]
#[test_case("/Things(1)/$value"; "value after entity")]
#[test_case("/$ref"; "marker at root")]
#[test_case("/Things(1)/Locations/$ref/more"; "segment after ref")]
#[test_case("/Observations(3)/result/$value/more"; "segment after value")]
#[test_case("/Observations(3)/parameters/foo[-1]"; "negative index")]
#[test_case("/Observations(3)/parameters/foo[1.5]"; "fractional index")]
#[test_case("/Observations(3)/parameters/foo[abc]"; "textual index")]
#[test_case("/Observations(3)/parameters/foo[]"; "empty index")]
#[test_case("/Things(1)//Datastreams"; "empty segment")]
#[test_case("/Things(1)/"; "trailing slash")]
#[test_case("/Things(1)/Datastreams(two)"; "non numeric id")]
#[test_case("/Things('1')"; "quoted id for long deployment")]
fn invalid_paths_rejected(path: &str) {
    assert!(parse(path).is_err(), "`{path}` should be rejected");
}

#[test]
fn error_message_leaks_no_detail() {
    let err = parse("/Things(\u{7}bell)").unwrap_err();
    assert_eq!(err.to_string(), "Path is not valid.");
}

#[test]
fn parent_chain_is_linear() {
    let rp = parse("/Things(1)/Datastreams(2)/Observations").unwrap();
    // Each element's navigation names the link from its predecessor.
    assert_eq!(rp.elements.len(), 3);
    match &rp.elements[0] {
        PathElement::Entity { nav, .. } => assert!(nav.is_none()),
        other => panic!("unexpected first element: {other:?}"),
    }
    match &rp.elements[1] {
        PathElement::Entity { nav, .. } => assert_eq!(nav.as_deref(), Some("Datastreams")),
        other => panic!("unexpected second element: {other:?}"),
    }
    match &rp.elements[2] {
        PathElement::EntitySet { nav, .. } => assert_eq!(nav.as_deref(), Some("Observations")),
        other => panic!("unexpected third element: {other:?}"),
    }
}

#[test]
fn identified_element_is_deepest_id() {
    let rp = parse("/Things(1)/Datastreams(2)/Observations").unwrap();
    assert_eq!(rp.identified_element, Some(1));
}

#[test]
fn text_id_strategy() {
    let rp = parse_path(
        &registry(),
        &IdManagerText,
        "http://localhost/sta",
        "v1.1",
        "/Things('station-7')/Datastreams",
    )
    .unwrap();
    match &rp.elements[0] {
        PathElement::Entity { id, .. } => {
            assert_eq!(id, &Some(Id::Text("station-7".to_string())))
        }
        other => panic!("unexpected element: {other:?}"),
    }
}

#[test]
fn uuid_id_strategy() {
    let uuid_text = "0d8ae54f-9b3d-4b33-93f4-8a4f0edb2c4d";
    let rp = parse_path(
        &registry(),
        &IdManagerUuid,
        "http://localhost/sta",
        "v1.1",
        &format!("/Things({uuid_text})"),
    )
    .unwrap();
    match &rp.elements[0] {
        PathElement::Entity { id: Some(Id::Uuid(u)), .. } => {
            assert_eq!(u.to_string(), uuid_text)
        }
        other => panic!("unexpected element: {other:?}"),
    }
}

#[test]
fn parsing_is_pure() {
    let a = parse("/Things(1)/Datastreams").unwrap();
    let b = parse("/Things(1)/Datastreams").unwrap();
    assert_eq!(a, b);
}
