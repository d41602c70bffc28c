use chrono::{TimeZone, Utc};
use yank::datatype::{CastType, Raw};
use yank::persist::{PersistenceMode, Record, Registry};
use yank::query::{FilterExpression, FilterTerm, Modifier, QueryBuilder};
use yank::schema::{FieldOptions, SchemaBuilder};

fn setup() -> Registry {
    let mut registry = Registry::new(PersistenceMode::InMemory).expect("registry");
    registry
        .register(
            SchemaBuilder::new("person")
                .field("name", CastType::String)
                .field("age", FieldOptions::new(CastType::Integer).nullable())
                .field("member", CastType::Boolean)
                .field("joined", CastType::DateTime)
                .field("tag", FieldOptions::new(CastType::String).nullable().display("Label"))
                .build()
                .expect("schema"),
        )
        .expect("register");
    let store = registry.store("person").expect("store");
    let people: [(&str, Option<i64>, bool, (i32, u32, u32), Option<&str>); 5] = [
        ("Bob", Some(30), true, (2020, 1, 1), Some("a*b")),
        ("Ann", Some(25), false, (2021, 6, 15), Some("50%_off")),
        ("bobby", None, true, (2022, 3, 3), None),
        ("Tom", Some(40), false, (2023, 9, 9), Some("x?y")),
        ("Zoe", Some(25), true, (2024, 12, 31), Some("[z]")),
    ];
    for (i, (name, age, member, (y, m, d), tag)) in people.into_iter().enumerate() {
        let mut record = store
            .create([
                ("name", Raw::from(name)),
                ("age", Raw::from(age)),
                ("member", Raw::from(member)),
                ("joined", Raw::from(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())),
                ("tag", Raw::from(tag)),
                ("url", Raw::from(format!("http://x/{}", i + 1))),
            ])
            .expect("create");
        store.insert(&mut record).expect("insert");
    }
    registry
}

fn names(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.display("name")).collect()
}

fn filtered(registry: &Registry, filter: &str) -> Vec<String> {
    let store = registry.store("person").expect("store");
    let records = QueryBuilder::new(&store)
        .filter(FilterExpression::parse(filter))
        .fetch()
        .expect("fetch");
    names(&records)
}

#[test]
fn tokens_parse_into_terms() {
    let term = FilterTerm::parse("~ name__icontains = bo ").expect("term");
    assert_eq!(
        term,
        FilterTerm { field: "name".to_string(), modifier: Modifier::IContains, value: "bo".to_string(), negate: true }
    );
    assert_eq!(FilterTerm::parse("age = 24").expect("term").modifier, Modifier::Exact);
    assert!(FilterTerm::parse("no equals sign").is_none());
    assert!(FilterTerm::parse("a = b = c").is_none());
    assert!(FilterTerm::parse(" = 5").is_none());
    assert_eq!(FilterExpression::parse("name = Bob && && garbage && age = 30").terms().len(), 2);
}

#[test]
fn icontains_and_negation() {
    let registry = setup();
    assert_eq!(filtered(&registry, "name__icontains = bo"), vec!["Bob", "bobby"]);
    assert_eq!(filtered(&registry, "~name = Bob"), vec!["Ann", "bobby", "Tom", "Zoe"]);
}

#[test]
fn case_sensitive_patterns() {
    let registry = setup();
    assert_eq!(filtered(&registry, "name__contains = ob"), vec!["Bob", "bobby"]);
    assert_eq!(filtered(&registry, "name__startswith = B"), vec!["Bob"]);
    assert_eq!(filtered(&registry, "name__istartswith = b"), vec!["Bob", "bobby"]);
    assert_eq!(filtered(&registry, "name__endswith = m"), vec!["Tom"]);
    assert_eq!(filtered(&registry, "name__iendswith = OE"), vec!["Zoe"]);
    assert_eq!(filtered(&registry, "name__iexact = BOB"), vec!["Bob"]);
}

#[test]
fn wildcards_in_values_are_literal() {
    let registry = setup();
    assert_eq!(filtered(&registry, "tag__contains = *"), vec!["Bob"]);
    assert_eq!(filtered(&registry, "tag__contains = ?"), vec!["Tom"]);
    assert_eq!(filtered(&registry, "tag__contains = [z"), vec!["Zoe"]);
    assert_eq!(filtered(&registry, "tag__icontains = %_"), vec!["Ann"]);
    assert!(filtered(&registry, "tag__icontains = _x").is_empty());
}

#[test]
fn regex_and_membership() {
    let registry = setup();
    assert_eq!(filtered(&registry, "name__regex = ^[A-Z][a-z]{2}$"), vec!["Bob", "Ann", "Tom", "Zoe"]);
    assert_eq!(filtered(&registry, "name__in = Bob, Tom"), vec!["Bob", "Tom"]);
    assert_eq!(filtered(&registry, "name__iin = BOB, zoe"), vec!["Bob", "Zoe"]);
    assert_eq!(filtered(&registry, "age__in = 25, 40"), vec!["Ann", "Tom", "Zoe"]);
    // unparseable pattern drops the token
    assert_eq!(filtered(&registry, "name__regex = (").len(), 5);
}

#[test]
fn typed_literals() {
    let registry = setup();
    assert_eq!(filtered(&registry, "age = 25 && member = yes"), vec!["Zoe"]);
    assert_eq!(filtered(&registry, "age = None"), vec!["bobby"]);
    assert_eq!(filtered(&registry, "~age = None && ~member = true"), vec!["Ann", "Tom"]);
    assert_eq!(filtered(&registry, "joined = 2021-06-15"), vec!["Ann"]);
    assert_eq!(filtered(&registry, "joined = 2023-09-09T00:00:00Z"), vec!["Tom"]);
    // a literal that does not cast drops the token
    assert_eq!(filtered(&registry, "age = old").len(), 5);
}

#[test]
fn negation_keeps_nulls() {
    let registry = setup();
    assert_eq!(filtered(&registry, "~tag__contains = *"), vec!["Ann", "bobby", "Tom", "Zoe"]);
}

#[test]
fn unknown_fields_and_string_modifiers_are_dropped() {
    let registry = setup();
    assert_eq!(filtered(&registry, "nonexistent = 5").len(), 5);
    assert_eq!(filtered(&registry, "age__contains = 2").len(), 5);
    assert_eq!(filtered(&registry, "name__bogus = Bob").len(), 5);
    assert_eq!(filtered(&registry, "age__iexact = 30"), vec!["Bob"]);
}

#[test]
fn labels_resolve_to_fields() {
    let registry = setup();
    assert_eq!(filtered(&registry, "label = x?y"), vec!["Tom"]);
    assert_eq!(filtered(&registry, "Name__startswith = Z"), vec!["Zoe"]);
}

#[test]
fn repeated_fields_from_pairs() {
    let registry = setup();
    let store = registry.store("person").expect("store");
    let filter = FilterExpression::from_pairs([("name__icontains", "b"), ("name__icontains", "y"), ("~member", "false")]);
    let query = QueryBuilder::new(&store).filter(filter);
    assert_eq!(names(&query.fetch().expect("fetch")), vec!["bobby"]);
    assert_eq!(query.count().expect("count"), 1);
}

#[test]
fn case_folding_covers_non_ascii_letters() {
    let mut registry = Registry::new(PersistenceMode::InMemory).expect("registry");
    registry
        .register(SchemaBuilder::new("word").field("name", CastType::String).build().expect("schema"))
        .expect("register");
    let store = registry.store("word").expect("store");
    for (i, name) in ["Ärger", "ärmel", "Öl", "Arm"].into_iter().enumerate() {
        let mut record = store
            .create([("name", Raw::from(name)), ("url", Raw::from(format!("http://w/{}", i)))])
            .expect("create");
        store.insert(&mut record).expect("insert");
    }
    let words = |filter: &str| {
        let records = QueryBuilder::new(&store)
            .filter(FilterExpression::parse(filter))
            .fetch()
            .expect("fetch");
        names(&records)
    };
    assert_eq!(words("name__iexact = ärger"), vec!["Ärger"]);
    assert_eq!(words("name__icontains = ä"), vec!["Ärger", "ärmel"]);
    assert_eq!(words("name__istartswith = ÖL"), vec!["Öl"]);
    assert_eq!(words("name__iin = ÄRGER, öl"), vec!["Ärger", "Öl"]);
    assert_eq!(words("name__contains = ä"), vec!["ärmel"]);
}
