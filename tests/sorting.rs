use yank::datatype::{CastType, Raw};
use yank::persist::{PersistenceMode, Registry};
use yank::query::{FilterExpression, QueryBuilder, SortExpression, SortKey};
use yank::schema::SchemaBuilder;

fn setup(rows: &[(i64, &str)]) -> Registry {
    let mut registry = Registry::new(PersistenceMode::InMemory).expect("registry");
    registry
        .register(
            SchemaBuilder::new("person")
                .field("age", CastType::Integer)
                .field("name", CastType::String)
                .build()
                .expect("schema"),
        )
        .expect("register");
    let store = registry.store("person").expect("store");
    for (i, (age, name)) in rows.iter().enumerate() {
        let mut record = store
            .create([
                ("age", Raw::from(*age)),
                ("name", Raw::from(*name)),
                ("url", Raw::from(format!("http://x/{}", i))),
            ])
            .expect("create");
        store.insert(&mut record).expect("insert");
    }
    registry
}

fn sorted(registry: &Registry, sort: &str) -> Vec<String> {
    let store = registry.store("person").expect("store");
    QueryBuilder::new(&store)
        .sort(SortExpression::parse(sort))
        .fetch()
        .expect("fetch")
        .iter()
        .map(|r| r.display("name"))
        .collect()
}

#[test]
fn sort_tokens() {
    let sort = SortExpression::parse("name && -age, id");
    assert_eq!(
        sort.keys(),
        &[
            SortKey { field: "name".to_string(), ascending: true },
            SortKey { field: "age".to_string(), ascending: false },
            SortKey { field: "id".to_string(), ascending: true },
        ]
    );
    assert!(SortExpression::parse("  -  ").is_empty());
    assert_eq!(sort.to_string(), "name && -age && id");
}

#[test]
fn equal_keys_keep_insertion_order() {
    let registry = setup(&[(30, "B"), (30, "A")]);
    assert_eq!(sorted(&registry, "age"), vec!["B", "A"]);
    assert_eq!(sorted(&registry, "-age"), vec!["B", "A"]);
}

#[test]
fn keys_apply_left_to_right() {
    let registry = setup(&[(30, "B"), (25, "C"), (30, "A"), (25, "D")]);
    assert_eq!(sorted(&registry, "age name"), vec!["C", "D", "A", "B"]);
    assert_eq!(sorted(&registry, "-age && -name"), vec!["B", "A", "D", "C"]);
    assert_eq!(sorted(&registry, "Name"), vec!["A", "B", "C", "D"]);
}

#[test]
fn unknown_sort_fields_are_dropped() {
    let registry = setup(&[(30, "B"), (25, "C")]);
    assert_eq!(sorted(&registry, "shoe_size"), vec!["B", "C"]);
    assert_eq!(sorted(&registry, "shoe_size -age"), vec!["B", "C"]);
}

#[test]
fn windows_and_counts() {
    let rows: Vec<(i64, String)> = (0..25).map(|i| (i, format!("n{i:02}"))).collect();
    let rows: Vec<(i64, &str)> = rows.iter().map(|(a, n)| (*a, n.as_str())).collect();
    let registry = setup(&rows);
    let store = registry.store("person").expect("store");
    let query = QueryBuilder::new(&store)
        .filter(FilterExpression::parse("name__startswith = n1"))
        .sort(SortExpression::parse("-age"))
        .offset(2)
        .limit(3);
    let names: Vec<String> = query.fetch().expect("fetch").iter().map(|r| r.display("name")).collect();
    assert_eq!(names, vec!["n17", "n16", "n15"]);
    assert_eq!(query.count().expect("count"), 10);
    assert_eq!(store.count().expect("count"), 25);
    assert_eq!(QueryBuilder::new(&store).fetch().expect("fetch").len(), 25);
}
