use std::collections::VecDeque;

use yank::config::DisplaySettings;
use yank::datatype::{CastType, Raw};
use yank::display::{display_tables, DisplayProjector, ListState, Renderer, TableView, View};
use yank::error::{Result, YankError};
use yank::fetch::{Exchange, NoFetcher, PageFetcher};
use yank::persist::{PersistenceMode, Registry};
use yank::schema::SchemaBuilder;

/// Replays canned input and keeps every rendered view.
struct Script {
    input: VecDeque<String>,
    views: Vec<View>,
}

impl Script {
    fn new(lines: &[&str]) -> Self {
        Self { input: lines.iter().map(|l| l.to_string()).collect(), views: Vec::new() }
    }
    fn tables(&self) -> Vec<&TableView> {
        self.views
            .iter()
            .filter_map(|v| match v {
                View::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }
    fn last_table(&self) -> &TableView {
        self.tables().pop().expect("a table was rendered")
    }
}

impl Renderer for Script {
    fn render(&mut self, view: &View) -> Result<()> {
        self.views.push(view.clone());
        Ok(())
    }
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.input.pop_front()
    }
}

#[derive(Default)]
struct Browser {
    opened: Vec<String>,
}

impl PageFetcher for Browser {
    fn fetch(&mut self, url: &str) -> Result<Vec<Exchange>> {
        self.opened.push(url.to_string());
        Ok(Vec::new())
    }
}

struct Offline;

impl PageFetcher for Offline {
    fn fetch(&mut self, url: &str) -> Result<Vec<Exchange>> {
        Err(YankError::Fetch(format!("offline: {url}")))
    }
}

fn setup(rows: usize) -> Registry {
    let mut registry = Registry::new(PersistenceMode::InMemory).expect("registry");
    registry
        .register(
            SchemaBuilder::new("person")
                .field("name", CastType::String)
                .field("age", CastType::Integer)
                .build()
                .expect("schema"),
        )
        .expect("register");
    let store = registry.store("person").expect("store");
    for i in 0..rows {
        let mut record = store
            .create([
                ("name", Raw::from(format!("p{i:02}"))),
                ("age", Raw::from(i as i64 % 3)),
                ("url", Raw::from(format!("http://x/{i}"))),
            ])
            .expect("create");
        store.insert(&mut record).expect("insert");
    }
    registry
}

fn settings(default_limit: usize) -> DisplaySettings {
    DisplaySettings { default_limit, ..Default::default() }
}

#[test]
fn paging_is_clamped_to_the_row_count() {
    let registry = setup(25);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(10));
    let mut script = Script::new(&["'", "'", "'", "; 9"]);
    let state = projector.interact_from(&mut script, &mut NoFetcher, projector.state()).expect("loop");
    let titles: Vec<String> = script.tables().iter().map(|t| t.title.clone()).collect();
    assert_eq!(
        titles,
        vec![
            "person\nPage 1 of 3 (25 rows)",
            "person\nPage 2 of 3 (25 rows)",
            "person\nPage 3 of 3 (25 rows)",
            "person\nPage 3 of 3 (25 rows)",
            "person\nPage 1 of 3 (25 rows)",
        ]
    );
    assert_eq!(state.offset, 0);
}

#[test]
fn sort_filter_and_reset() {
    let registry = setup(9);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(20));
    let mut script = Script::new(&["f age = 1 && name__startswith = p0", "s -name", "l x", "l 2", "r filter"]);
    let state = projector.interact_from(&mut script, &mut NoFetcher, projector.state()).expect("loop");
    let tables = script.tables();
    assert_eq!(tables[1].rows, vec![vec!["p01", "1"], vec!["p04", "1"], vec!["p07", "1"]]);
    assert_eq!(tables[2].rows, vec![vec!["p07", "1"], vec!["p04", "1"], vec!["p01", "1"]]);
    assert_eq!(
        tables[2].caption.as_deref(),
        Some("sort -name\nfilter age = 1 && name__startswith = p0\n\nc[ommands]: Show available commands")
    );
    assert_eq!(tables[3], tables[2]);
    assert_eq!(tables[4].rows.len(), 2);
    assert_eq!(tables[5].rows[0], vec!["p08", "2"]);
    assert_eq!(tables[5].title, "person\nPage 1 of 5 (9 rows)");
    assert!(state.filter.is_empty());
    assert!(!state.sort.is_empty());
}

#[test]
fn detail_view_returns_to_the_listing() {
    let registry = setup(3);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(2));
    let mut script = Script::new(&["'", "d 3", "anything", "q", "d 99", "c"]);
    let state = projector.interact_from(&mut script, &mut NoFetcher, projector.state()).expect("loop");
    assert_eq!(state.offset, 2);
    let details: Vec<&View> = script.views.iter().filter(|v| matches!(v, View::Detail(_))).collect();
    assert_eq!(details.len(), 2);
    if let View::Detail(detail) = details[0] {
        assert_eq!(detail.rows[0][0].title, "Name");
        assert_eq!(detail.rows[0][0].body, "p02");
        assert_eq!(detail.rows[1][0].body, "http://x/2");
    }
    assert!(script.views.iter().any(|v| matches!(v, View::Message(m) if m.contains("No person record"))));
    assert!(matches!(script.views.last(), Some(View::Table(_))));
    assert!(script.views.iter().any(|v| matches!(v, View::Help(tables) if tables.len() == 3)));
    assert_eq!(script.last_table().title, "person\nPage 2 of 2 (3 rows)");
}

#[test]
fn open_highlights_and_fetches_once() {
    let registry = setup(3);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(20));
    let mut browser = Browser::default();
    let mut script = Script::new(&["o 2", "o 2", "o x", "o 1", "q", "'"]);
    let state = projector.interact_from(&mut script, &mut browser, projector.state()).expect("loop");
    assert_eq!(browser.opened, vec!["http://x/1", "http://x/0"]);
    assert_eq!(state.highlight, Some(1));
    let tables = script.tables();
    assert_eq!(tables.len(), 5);
    assert_eq!(tables[1].highlighted, Some(1));
    assert_eq!(tables[4].highlighted, Some(0));
}

#[test]
fn failed_open_keeps_the_previous_highlight() {
    let registry = setup(3);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(20));
    let mut browser = Browser::default();
    let mut script = Script::new(&["o 99", "o 2", "o 42"]);
    let state = projector.interact_from(&mut script, &mut browser, projector.state()).expect("loop");
    assert_eq!(browser.opened, vec!["http://x/1"]);
    assert_eq!(state.highlight, Some(2));
    let tables = script.tables();
    assert_eq!(tables[1].highlighted, None);
    assert_eq!(tables[2].highlighted, Some(1));
    assert_eq!(tables[3].highlighted, Some(1));
    let messages = script.views.iter().filter(|v| matches!(v, View::Message(_))).count();
    assert_eq!(messages, 2);
}

#[test]
fn unreachable_page_is_not_highlighted() {
    let registry = setup(3);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(20));
    let mut script = Script::new(&["o 1"]);
    let state = projector.interact_from(&mut script, &mut Offline, projector.state()).expect("loop");
    assert_eq!(state.highlight, None);
    assert_eq!(script.last_table().highlighted, None);
    assert!(script.views.iter().any(|v| matches!(v, View::Message(m) if m.contains("offline"))));
}

#[test]
fn non_interactive_views() {
    let registry = setup(5);
    let store = registry.store("person").expect("store");
    let projector = DisplayProjector::new(&store, settings(20));
    let mut script = Script::new(&[]);
    let mut state = ListState::new(2);
    state.offset = 4;
    assert_eq!(projector.display_list(&mut script, &state).expect("list"), 5);
    projector.display_detail(&mut script, 1).expect("detail");
    let table = script.last_table();
    assert_eq!(table.title, "person\nPage 3 of 3 (5 rows)");
    assert_eq!(table.columns, vec!["Name", "Age"]);
    assert!(table.caption.is_none());
    assert!(projector.display_detail(&mut script, 42).is_err());
    // end of input behaves like quit
    assert!(projector.interact(&mut script, &mut NoFetcher).is_ok());
}

#[test]
fn table_browser() {
    let registry = setup(4);
    let mut script = Script::new(&["c 0", "c 7", "nonsense", "r 0", "'", "q", "q"]);
    display_tables(&registry, &mut script, &mut NoFetcher, &settings(20)).expect("browser");
    let tables = script.tables();
    assert_eq!(tables[0].title, "Tables: :memory: (1 table)");
    assert_eq!(tables[0].rows, vec![vec!["0", "person", "5", "4"]]);
    assert_eq!(tables[1].title, "Columns: person");
    assert_eq!(tables[1].rows[1], vec!["1", "name", "Name", "String", "TEXT"]);
    assert!(script.views.iter().any(|v| matches!(v, View::Message(m) if m.contains('7'))));
    assert_eq!(tables[2].title, "person\nPage 1 of 1 (4 rows)");
    assert_eq!(tables.last().expect("browser").title, "Tables: :memory: (1 table)");
}
