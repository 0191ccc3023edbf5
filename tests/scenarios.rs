use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use confmap::{
    Catalog, Element, MapError, Mapped, Mapper, Native, NativeMap, NativeSeq, Number, Options, Part, Recipe,
};
use indexmap::IndexMap;
use serde_json::json;

// ————————————————————————————————————————————————————————————————————————————
// FIXTURES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Debug, Default, PartialEq)]
struct Server {
    host: String,
    port: u16,
    tls: bool,
}

impl Mapped for Server {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::structural::<Self>()
                .field("host", |s: &Self| s.host.clone(), |s, v| s.host = v)
                .field("port", |s: &Self| s.port, |s, v| s.port = v)
                .field_or("tls", |s: &Self| s.tls, |s, v| s.tls = v, || false)
                .build(),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Cluster {
    name: String,
    servers: Vec<Server>,
    labels: IndexMap<String, String>,
}

impl Mapped for Cluster {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::structural::<Self>()
                .field("name", |c: &Self| c.name.clone(), |c, v| c.name = v)
                .field("servers", |c: &Self| c.servers.clone(), |c, v| c.servers = v)
                .field_or("labels", |c: &Self| c.labels.clone(), |c, v| c.labels = v, IndexMap::new)
                .build(),
        ]
    }
}

#[derive(Clone, Default)]
struct Link {
    name: String,
    next: Option<Rc<RefCell<Link>>>,
}

impl Mapped for Link {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::structural::<Self>()
                .field("name", |l: &Self| l.name.clone(), |l, v| l.name = v)
                .field_or("next", |l: &Self| l.next.clone(), |l, v| l.next = v, || None)
                .build(),
        ]
    }
}

#[derive(Clone, Debug, Default)]
struct Chain {
    next: Option<Box<Chain>>,
}

impl Mapped for Chain {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::structural::<Self>()
                .field_or("next", |c: &Self| c.next.clone(), |c, v| c.next = v, || None)
                .build(),
        ]
    }
}

#[derive(Clone, Debug, Default)]
struct Ring {
    name: String,
    next: Option<Rc<RefCell<Ring>>>,
}

impl Mapped for Ring {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::initializer::<Self>("Ring::new")
                .param::<String>("name")
                .param_or::<Option<Rc<RefCell<Ring>>>>("next", || None)
                .build(|args| {
                    Ok(Ring {
                        name: args.named("name")?,
                        next: args.named("next")?,
                    })
                }),
        ]
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl Mapped for Point {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::initializer::<Self>("Point::from_pair")
                .positional::<i32>()
                .positional::<i32>()
                .build(|args| Ok(Point { x: args.get(0)?, y: args.get(1)? })),
            Recipe::initializer::<Self>("Point::new")
                .param::<i32>("x")
                .param::<i32>("y")
                .decompose(|p| vec![Part::named("x", p.x), Part::named("y", p.y)])
                .build(|args| Ok(Point { x: args.named("x")?, y: args.named("y")? })),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Release {
    name: String,
    date: NaiveDate,
}

impl Mapped for Release {
    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::structural::<Self>()
                .field("name", |r: &Self| r.name.clone(), |r, v| r.name = v)
                .field("date", |r: &Self| r.date, |r, v| r.date = v)
                .build(),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Timeout {
    millis: u64,
}

impl Mapped for Timeout {
    fn descriptor() -> confmap::TypeDescriptor {
        confmap::TypeDescriptor::of::<Self>(confmap::Kind::Any)
    }

    fn recipes() -> Vec<Recipe> {
        vec![
            Recipe::structural::<Self>()
                .field("millis", |t: &Self| t.millis, |t, v| t.millis = v)
                .build(),
        ]
    }
}

fn element(value: serde_json::Value) -> Element {
    Element::from(value)
}

fn self_loop(name: &str) -> Element {
    let node = confmap::Node::new();
    node.insert("name", name);
    node.insert("next", Element::Node(node.clone()));
    Element::Node(node)
}

// ————————————————————————————————————————————————————————————————————————————
// ROUND TRIPS
// ————————————————————————————————————————————————————————————————————————————

#[test]
fn typed_round_trip_preserves_values() {
    let input = element(json!({
        "name": "edge",
        "servers": [
            {"host": "a.internal", "port": 443, "tls": true},
            {"host": "b.internal", "port": 80}
        ],
        "labels": {"zone": "eu-1", "tier": "front"}
    }));
    let cluster: Cluster = confmap::construct(&input).unwrap();
    assert_eq!(cluster.servers[1], Server { host: "b.internal".into(), port: 80, tls: false });
    assert_eq!(cluster.labels.keys().collect::<Vec<_>>(), vec!["zone", "tier"]);

    let output = confmap::decompose(&cluster).unwrap();
    let again: Cluster = confmap::construct(&output).unwrap();
    assert_eq!(again, cluster);
    let port = output.as_node().unwrap().get("servers").unwrap().as_list().unwrap().get(0).unwrap();
    assert!(matches!(port.as_node().unwrap().get("port"), Some(Element::Number(Number::U16(443)))));
}

#[test]
fn native_graph_to_typed_value() {
    let root = NativeMap::new();
    root.insert("x", Native::I32(1));
    root.insert("y", Native::Seq(NativeSeq::from_vec(vec![1.into(), 2.into(), 3.into()])));
    let tree = confmap::to_element(&Native::Map(root)).unwrap();

    let node = tree.as_node().unwrap();
    assert_eq!(node.get("x"), Some(Element::from(1)));
    assert_eq!(node.get("y").unwrap().as_list().unwrap().len(), 3);
    assert_eq!(tree.to_string(), r#"{"x": 1, "y": [1, 2, 3]}"#);

    let typed: IndexMap<String, Element> = confmap::construct(&tree).unwrap();
    assert!(typed["y"].same(&node.get("y").unwrap()));

    let back = confmap::from_element(&tree).unwrap();
    assert_eq!(back.to_json().unwrap(), json!({"x": 1, "y": [1, 2, 3]}));
}

// ————————————————————————————————————————————————————————————————————————————
// IDENTITY
// ————————————————————————————————————————————————————————————————————————————

#[test]
fn self_referential_construction_and_decomposition() {
    let input = self_loop("a");
    let link: Rc<RefCell<Link>> = confmap::construct(&input).unwrap();
    let next = link.borrow().next.clone().unwrap();
    assert!(Rc::ptr_eq(&link, &next));
    assert_eq!(next.borrow().name, "a");

    let output = confmap::decompose(&link).unwrap();
    let node = output.as_node().unwrap();
    assert!(node.get("next").unwrap().same(&output));
    assert_eq!(output.to_string(), r#"{"name": "a", "next": @node#0}"#);
    assert_eq!(output, input);

    link.borrow_mut().next = None;
    drop(next);
    output.dismantle();
    input.dismantle();
}

#[test]
fn shared_elements_become_shared_objects() {
    let shared = element(json!({"name": "leaf"}));
    let input = Element::from(vec![shared.clone(), shared.clone(), element(json!({"name": "other"}))]);
    let links: Vec<Rc<RefCell<Link>>> = confmap::construct(&input).unwrap();
    assert!(Rc::ptr_eq(&links[0], &links[1]));
    assert!(!Rc::ptr_eq(&links[0], &links[2]));

    let output = confmap::decompose(&links).unwrap();
    let items = output.as_list().unwrap().items();
    assert!(items[0].same(&items[1]));
    assert!(!items[0].same(&items[2]));
}

#[test]
fn cycle_through_in_place_recipe_is_refused() {
    let node = confmap::Node::new();
    node.insert("next", Element::Node(node.clone()));
    let input = Element::Node(node);
    let err = confmap::construct::<Chain>(&input).unwrap_err();
    let MapError::CyclicConstructionUnsupported { path, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(path.to_string(), "$.next");
    input.dismantle();
}

#[test]
fn cycle_through_whole_build_recipe_is_refused() {
    let input = self_loop("r");
    let err = confmap::construct::<Rc<RefCell<Ring>>>(&input).unwrap_err();
    let MapError::CyclicConstructionUnsupported { path, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(path.to_string(), "$.next");
    input.dismantle();

    let chain: Rc<RefCell<Ring>> = confmap::construct(&element(json!({"name": "a", "next": {"name": "b"}}))).unwrap();
    let next = chain.borrow().next.clone().unwrap();
    assert_eq!(next.borrow().name, "b");
    assert!(next.borrow().next.is_none());
}

// ————————————————————————————————————————————————————————————————————————————
// MATCHING
// ————————————————————————————————————————————————————————————————————————————

#[test]
fn missing_name_without_default_is_unresolved() {
    let err = confmap::construct::<Server>(&element(json!({"host": "a", "tls": true}))).unwrap_err();
    assert!(matches!(err, MapError::Unresolved { .. }));
    assert!(err.to_string().contains("node{host, tls}"));

    let server: Server = confmap::construct(&element(json!({"host": "a", "port": 1}))).unwrap();
    assert!(!server.tls);
}

#[test]
fn point_prefers_name_binding() {
    let named: Point = confmap::construct(&element(json!({"y": 2, "x": 1}))).unwrap();
    assert_eq!(named, Point { x: 1, y: 2 });
    let positional: Point = confmap::construct(&element(json!([5, 6]))).unwrap();
    assert_eq!(positional, Point { x: 5, y: 6 });
    assert_eq!(confmap::decompose(&named).unwrap(), element(json!({"x": 1, "y": 2})));
}

#[test]
fn strict_names_disable_positional_fallback() {
    let catalog = Catalog::new();
    let strict = Mapper::with_options(
        &catalog,
        Options {
            strict_names: true,
            ..Options::default()
        },
    );
    let input = element(json!({"first": 1, "second": 2}));
    assert!(strict.construct::<(i32, i32)>(&input).is_err());
    assert_eq!(Mapper::new(&catalog).construct::<(i32, i32)>(&input).unwrap(), (1, 2));
}

// ————————————————————————————————————————————————————————————————————————————
// CATALOG
// ————————————————————————————————————————————————————————————————————————————

#[test]
fn recipe_resolution_is_cached() {
    let catalog = Catalog::new();
    let mapper = Mapper::new(&catalog);
    let input = element(json!({"name": "c", "servers": []}));
    mapper.construct::<Cluster>(&input).unwrap();
    let after_first = catalog.build_count();
    assert!(after_first > 0);
    mapper.construct::<Cluster>(&input).unwrap();
    assert_eq!(catalog.build_count(), after_first);
}

#[test]
fn custom_recipe_overrides_structural_shape() {
    let catalog = Catalog::new();
    catalog.register(Recipe::custom::<Timeout>("duration string").leaf(
        Element::is_string,
        |element| {
            let text = element.as_str().unwrap_or_default();
            let millis = text
                .strip_suffix("ms")
                .ok_or_else(|| anyhow::anyhow!("expected `<n>ms`, found {text:?}"))?
                .parse()?;
            Ok(Timeout { millis })
        },
        |t| Ok(Element::from(format!("{}ms", t.millis))),
    ));
    let mapper = Mapper::new(&catalog);

    assert_eq!(mapper.construct::<Timeout>(&element(json!("250ms"))).unwrap(), Timeout { millis: 250 });
    assert_eq!(mapper.construct::<Timeout>(&element(json!({"millis": 5}))).unwrap(), Timeout { millis: 5 });
    assert_eq!(mapper.decompose(&Timeout { millis: 7 }).unwrap(), element(json!("7ms")));

    let err = mapper.construct::<Timeout>(&element(json!("soon"))).unwrap_err();
    assert!(matches!(err, MapError::RecipeBuildFailure { ref recipe, .. } if recipe == "duration string"));
}

#[test]
fn temporal_fields_read_iso_dates() {
    let release: Release = confmap::construct(&element(json!({"name": "1.0", "date": "2024-03-01"}))).unwrap();
    assert_eq!(release.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(
        confmap::decompose(&release).unwrap(),
        element(json!({"name": "1.0", "date": "2024-03-01"}))
    );
    assert!(confmap::construct::<Release>(&element(json!({"name": "1.0", "date": "March"}))).is_err());
}
