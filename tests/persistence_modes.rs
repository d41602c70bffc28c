use yank::datatype::{CastType, Value};
use yank::persist::{PersistenceMode, Registry};
use yank::schema::{FieldOptions, SchemaBuilder};

#[test]
fn in_memory_mode_allows_basic_operations() {
    let mut registry = Registry::new(PersistenceMode::InMemory).expect("registry");
    assert_eq!(registry.name(), ":memory:");
    registry
        .register(SchemaBuilder::new("note").field("text", CastType::String).build().expect("schema"))
        .expect("register");
    let store = registry.store("note").expect("store");
    let mut record = store.create([("text", "hello"), ("url", "http://x/1")]).expect("create");
    assert_eq!(store.insert(&mut record).expect("insert"), 1);
    assert_eq!(store.count().expect("count"), 1);
    // nothing survives the connection
    let reopened = Registry::new(PersistenceMode::InMemory).expect("registry");
    assert!(reopened.schemas().is_empty());
}

#[test]
fn file_mode_restores_schemas_and_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("yank.db");
    {
        let mut registry = Registry::new(PersistenceMode::File(path.clone())).expect("registry");
        registry
            .register(
                SchemaBuilder::new("product")
                    .field("title", FieldOptions::new(CastType::String).display("Name").unique())
                    .field("price", FieldOptions::new(CastType::Float).nullable().weight(4.0))
                    .field("rank", FieldOptions::new(CastType::Integer).weight(-4.0))
                    .display_list_by([("price", Some("Cost".to_string())), ("title", None)])
                    .build()
                    .expect("schema"),
            )
            .expect("register");
        let store = registry.store("product").expect("store");
        let mut record = store
            .create([("title", Value::String("Widget".to_string())), ("rank", Value::Integer(1)), ("url", Value::String("http://x/1".to_string()))])
            .expect("create");
        store.insert(&mut record).expect("insert");
    }
    let registry = Registry::new(PersistenceMode::File(path.clone())).expect("reopen");
    assert_eq!(registry.name(), "yank.db");
    let schema = registry.schema("product").expect("restored schema");
    let title = schema.field("title").expect("title");
    assert_eq!(title.display, "Name");
    assert!(title.unique);
    let price = schema.field("price").expect("price");
    assert!(price.nullable);
    assert_eq!(price.weight, Some(0.5));
    assert_eq!(schema.field("rank").expect("rank").weight, Some(-0.5));
    let list: Vec<(&str, &str)> = schema
        .list_display()
        .iter()
        .map(|d| (d.field.as_str(), d.label.as_str()))
        .collect();
    assert_eq!(list, vec![("price", "Cost"), ("title", "Name")]);

    let store = registry.store("product").expect("store");
    let record = store.get([("title", "Widget")]).expect("widget");
    assert_eq!(record.get("price"), Some(&Value::Null));
    assert_eq!(record.url(), "http://x/1");
}
