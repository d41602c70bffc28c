//! List and detail views over a record store, and the interactive loop.
//!
//! The projector never draws anything itself. It builds [`View`] values
//! (titled tables, detail panels, help tables, messages) and hands them to a
//! [`Renderer`], which also supplies the next line of user input. This keeps
//! the loop scriptable: tests drive it with a canned renderer, the binary
//! with [`crate::console::ConsoleRenderer`].

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::DisplaySettings;
use crate::error::Result;
use crate::fetch::PageFetcher;
use crate::persist::{Record, RecordStore, Registry};
use crate::query::{FilterExpression, QueryBuilder, SortExpression, OPERATOR_AND, OPERATOR_NOT};
use crate::schema::ID;

pub const INPUT_PROMPT: &str = "> ";
const COMMANDS_HINT: &str = "c[ommands]: Show available commands";

lazy_static! {
    static ref COMMAND: Regex = Regex::new(r"^\s*([A-Za-z';]+)\s*(.*?)\s*$").unwrap();
    static ref TABLE_COMMAND: Regex = Regex::new(r"^\s*([A-Za-z]+)\s*(\d+)\s*$").unwrap();
}

// ------------- Views -------------
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableView {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Index into `rows` of the row to draw highlighted.
    pub highlighted: Option<usize>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub title: String,
    /// Panels drawn side by side, one group per line.
    pub rows: Vec<Vec<Panel>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Table(TableView),
    Detail(DetailView),
    Help(Vec<TableView>),
    Message(String),
}

pub trait Renderer {
    fn render(&mut self, view: &View) -> Result<()>;
    /// The next line of input, `None` once input is exhausted.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

// ------------- Commands -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next(usize),
    Previous(usize),
    /// `None` when the argument was not a number.
    Limit(Option<usize>),
    Sort(String),
    Filter(String),
    Reset { sort: bool, filter: bool },
    Detail(Option<i64>),
    Open(Option<i64>),
    Commands,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let Some(captures) = COMMAND.captures(line) else {
            return Command::Unknown(line.trim().to_string());
        };
        let name = captures.get(1).map_or("", |m| m.as_str());
        let args = captures.get(2).map_or("", |m| m.as_str());
        let multiplier = || args.parse::<usize>().unwrap_or(1);
        match name.to_ascii_lowercase().as_str() {
            "'" => Command::Next(multiplier()),
            ";" => Command::Previous(multiplier()),
            "l" | "limit" => Command::Limit(args.parse().ok()),
            "s" | "sort" => Command::Sort(args.to_string()),
            "f" | "filter" => Command::Filter(args.to_string()),
            "r" | "reset" => {
                if args.is_empty() {
                    return Command::Reset { sort: true, filter: true };
                }
                let (mut sort, mut filter) = (false, false);
                for arg in args.split(OPERATOR_AND).map(str::trim) {
                    match arg {
                        "s" | "sort" => sort = true,
                        "f" | "filter" => filter = true,
                        _ => (),
                    }
                }
                Command::Reset { sort, filter }
            }
            "d" | "detail" => Command::Detail(args.parse().ok()),
            "o" | "open" => Command::Open(args.parse().ok()),
            "c" | "command" | "commands" => Command::Commands,
            "q" | "quit" => Command::Quit,
            _ => Command::Unknown(line.trim().to_string()),
        }
    }
}

// ------------- List State -------------
/// Where a listing currently is: window, ordering, filtering and highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct ListState {
    pub offset: usize,
    pub limit: usize,
    pub sort: SortExpression,
    pub filter: FilterExpression,
    pub highlight: Option<i64>,
}

impl ListState {
    pub fn new(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
            sort: SortExpression::new(),
            filter: FilterExpression::new(),
            highlight: None,
        }
    }
    /// Moves forward `n` pages unless that would run past the last row.
    pub fn next_page(&mut self, n: usize, row_count: usize) {
        let offset = self.offset.saturating_add(self.limit.saturating_mul(n));
        if offset < row_count {
            self.offset = offset;
        }
    }
    pub fn previous_page(&mut self, n: usize) {
        self.offset = self.offset.saturating_sub(self.limit.saturating_mul(n));
    }
    pub fn set_limit(&mut self, limit: usize, settings: &DisplaySettings) {
        self.limit = settings.clamp_limit(limit);
        self.offset = 0;
    }
    pub fn page(&self) -> usize {
        self.offset / self.limit + 1
    }
    pub fn page_count(&self, row_count: usize) -> usize {
        row_count.div_ceil(self.limit)
    }
    /// Applies a state-only command; returns false for commands that need a store.
    pub fn apply(&mut self, command: &Command, row_count: usize, settings: &DisplaySettings) -> bool {
        match command {
            Command::Next(n) => self.next_page(*n, row_count),
            Command::Previous(n) => self.previous_page(*n),
            Command::Limit(Some(limit)) => self.set_limit(*limit, settings),
            Command::Limit(None) => (),
            Command::Sort(text) => {
                self.sort = SortExpression::parse(text);
                self.offset = 0;
            }
            Command::Filter(text) => {
                self.filter = FilterExpression::parse(text);
                self.offset = 0;
            }
            Command::Reset { sort, filter } => {
                if *sort {
                    self.sort = SortExpression::new();
                }
                if *filter {
                    self.filter = FilterExpression::new();
                }
            }
            _ => return false,
        }
        true
    }
}

// ------------- Projector -------------
pub struct DisplayProjector<'s, 'db> {
    store: &'s RecordStore<'db>,
    settings: DisplaySettings,
}

impl<'s, 'db> DisplayProjector<'s, 'db> {
    pub fn new(store: &'s RecordStore<'db>, settings: DisplaySettings) -> Self {
        Self { store, settings }
    }
    pub fn state(&self) -> ListState {
        ListState::new(self.settings.clamp_limit(self.settings.default_limit))
    }

    /// The list table for a state, together with the filtered row count.
    pub fn list_view(&self, state: &ListState, interactive: bool) -> Result<(TableView, usize)> {
        let schema = self.store.schema();
        let query = QueryBuilder::new(self.store)
            .filter(state.filter.clone())
            .sort(state.sort.clone())
            .offset(state.offset)
            .limit(state.limit);
        let row_count = query.count()?;
        let records = query.fetch()?;
        let shown = schema.list_display();
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|record| shown.iter().map(|d| record.display(&d.field)).collect())
            .collect();
        let highlighted = state
            .highlight
            .and_then(|id| records.iter().position(|r| r.id == Some(id)));
        let title = format!(
            "{}\nPage {} of {} ({} {})",
            schema.table(),
            state.page(),
            state.page_count(row_count),
            row_count,
            if row_count == 1 { "row" } else { "rows" }
        );
        let caption = if interactive { Some(caption(state)) } else { None };
        Ok((
            TableView {
                title,
                columns: shown.iter().map(|d| d.label.clone()).collect(),
                rows,
                highlighted,
                caption,
            },
            row_count,
        ))
    }

    pub fn detail_view(&self, id: i64) -> Result<DetailView> {
        let record = self.store.get([(ID, id)])?;
        Ok(detail_panels(self.store, &record))
    }

    /// Renders one page without waiting for input.
    pub fn display_list(&self, renderer: &mut dyn Renderer, state: &ListState) -> Result<usize> {
        let (view, row_count) = self.list_view(state, false)?;
        renderer.render(&View::Table(view))?;
        Ok(row_count)
    }

    pub fn display_detail(&self, renderer: &mut dyn Renderer, id: i64) -> Result<()> {
        renderer.render(&View::Detail(self.detail_view(id)?))
    }

    /// Runs the list loop from the default state until `q` or end of input.
    pub fn interact(&self, renderer: &mut dyn Renderer, fetcher: &mut dyn PageFetcher) -> Result<()> {
        self.interact_from(renderer, fetcher, self.state()).map(|_| ())
    }

    /// Runs the list loop from `state`, returning the state it ended in.
    pub fn interact_from(
        &self,
        renderer: &mut dyn Renderer,
        fetcher: &mut dyn PageFetcher,
        mut state: ListState,
    ) -> Result<ListState> {
        let mut row_count = self.render_list(renderer, &state)?;
        let mut last_opened: Option<String> = None;
        while let Some(line) = renderer.read_line(INPUT_PROMPT) {
            let command = Command::parse(&line);
            debug!(?command, "list command");
            if command == Command::Quit {
                break;
            }
            let outcome = match &command {
                Command::Commands => renderer.render(&help()),
                Command::Detail(Some(id)) => self.detail_loop(renderer, *id),
                Command::Open(Some(id)) => self
                    .open(fetcher, *id, &mut last_opened)
                    .map(|()| state.highlight = Some(*id)),
                other => {
                    if !state.apply(other, row_count, &self.settings) {
                        debug!(command = %line.trim(), "ignoring command");
                    }
                    Ok(())
                }
            };
            row_count = self.render_list(renderer, &state).unwrap_or(row_count);
            if let Err(e) = outcome {
                warn!(error = %e, "command failed");
                renderer.render(&View::Message(e.to_string()))?;
            }
        }
        Ok(state)
    }

    /// Renders the listing, reporting a failed query as a message instead.
    fn render_list(&self, renderer: &mut dyn Renderer, state: &ListState) -> Result<usize> {
        match self.list_view(state, true) {
            Ok((view, row_count)) => {
                renderer.render(&View::Table(view))?;
                Ok(row_count)
            }
            Err(e) => {
                warn!(error = %e, table = self.store.table(), "could not list records");
                renderer.render(&View::Message(e.to_string()))?;
                Err(e)
            }
        }
    }

    fn detail_loop(&self, renderer: &mut dyn Renderer, id: i64) -> Result<()> {
        let view = View::Detail(self.detail_view(id)?);
        renderer.render(&view)?;
        while let Some(line) = renderer.read_line(INPUT_PROMPT) {
            if Command::parse(&line) == Command::Quit {
                break;
            }
            renderer.render(&view)?;
        }
        Ok(())
    }

    fn open(&self, fetcher: &mut dyn PageFetcher, id: i64, last_opened: &mut Option<String>) -> Result<()> {
        let record = self.store.get([(ID, id)])?;
        let url = record.url().to_string();
        if last_opened.as_deref() == Some(url.as_str()) {
            return Ok(());
        }
        fetcher.fetch(&url)?;
        *last_opened = Some(url);
        Ok(())
    }
}

fn caption(state: &ListState) -> String {
    let joiner = format!(" {} ", OPERATOR_AND);
    let mut lines = Vec::new();
    if !state.sort.is_empty() {
        lines.push(format!("sort {}", state.sort));
    }
    if !state.filter.is_empty() {
        let terms: Vec<String> = state.filter.terms().iter().map(|t| t.to_string()).collect();
        lines.push(format!("filter {}", terms.join(&joiner)));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(COMMANDS_HINT.to_string());
    lines.join("\n")
}

fn detail_panels(store: &RecordStore<'_>, record: &Record) -> DetailView {
    let rows = store
        .schema()
        .detail_display()
        .iter()
        .map(|row| {
            row.iter()
                .map(|d| Panel { title: d.label.clone(), body: record.display(&d.field) })
                .collect()
        })
        .collect();
    DetailView {
        title: format!("{} {}", store.table(), record.display(ID)),
        rows,
    }
}

// ------------- Help -------------
fn numbered(title: &str, columns: &[&str], rows: &[[&str; 4]]) -> TableView {
    TableView {
        title: title.to_string(),
        columns: std::iter::once("#").chain(columns.iter().copied()).map(String::from).collect(),
        rows: rows
            .iter()
            .enumerate()
            .map(|(i, row)| std::iter::once(i.to_string()).chain(row.iter().map(|c| c.to_string())).collect())
            .collect(),
        highlighted: None,
        caption: None,
    }
}

/// Command table followed by the filter modifier and operator tables.
pub fn help() -> View {
    let commands = numbered(
        "List View Commands",
        &["command", "arguments", "description", "example"],
        &[
            ["'", "<int> = 1", "Go to next nth page", "' 5"],
            [";", "<int> = 1", "Go to previous nth page", "; 3"],
            ["l[imit]", "<int>", "Set max number of rows per page", "l 10"],
            ["s[ort]", "<field>[ && <field>]", "Sort rows by field(s)", "s name && -age"],
            ["f[ilter]", "<field> = <value>[ && <field> = <value>]", "Filter rows by field(s)", "f name = Bob && age = 24"],
            ["r[eset]", "<command>[ && <command>] = sort && filter", "Reset sort and / or filter parameters", "r sort"],
            ["d[etail]", "<id>", "Display a row in detail view", "d 5"],
            ["o[pen]", "<id>", "Open a row's URL", "o 5"],
            ["q[uit]", "", "Quit the current view", "q"],
        ],
    );
    let modifiers = numbered(
        "Filter Modifiers",
        &["modifier", "usage", "filters rows based on the...", "example"],
        &[
            ["exact", "<field> = <value>", "exact value of a field", "f name = Bob"],
            ["iexact", "<field>__iexact = <value>", "exact case-insensitive value of a string-based field", "f name__iexact = bob"],
            ["contains", "<field>__contains = <substring>", "presence of a substring in a string-based field", "f name__contains = Bo"],
            ["icontains", "<field>__icontains = <substring>", "presence of a case-insensitive substring in a string-based field", "f name__icontains = bo"],
            ["startswith", "<field>__startswith = <substring>", "presence of a substring at the start of a string-based field", "f name__startswith = Bo"],
            ["istartswith", "<field>__istartswith = <substring>", "presence of a case-insensitive substring at the start of a string-based field", "f name__istartswith = bo"],
            ["endswith", "<field>__endswith = <substring>", "presence of a substring at the end of a string-based field", "f name__endswith = ob"],
            ["iendswith", "<field>__iendswith = <substring>", "presence of a case-insensitive substring at the end of a string-based field", "f name__iendswith = OB"],
            ["regex", "<field>__regex = <pattern>", "positive match of a regex pattern against a string-based field", "f name__regex = ^[A-Z][a-z]{2}$"],
            ["in", "<field>__in = <value>, <value>", "exact value of any one of the options in a comma-separated list", "f name__in = Bob, Tom"],
            ["iin", "<field>__iin = <value>, <value>", "exact case-insensitive value of a string-based field against any one of the options in a comma-separated list", "f name__iin = bob, tom"],
        ],
    );
    let not_usage = format!("{} <field>[__modifier] = <value>", OPERATOR_NOT);
    let not_example = format!("f {} name = Bob", OPERATOR_NOT);
    let and_usage = format!("<field>[__modifier] = <value> {} <field>[__modifier] = <value>", OPERATOR_AND);
    let and_example = format!("f name = Bob {} age = 24", OPERATOR_AND);
    let operators = numbered(
        "Filter Operators",
        &["operator", "usage", "description", "example"],
        &[
            [OPERATOR_NOT, not_usage.as_str(), "Negates the filter to exclude the selected rows", not_example.as_str()],
            [OPERATOR_AND, and_usage.as_str(), "Selects rows that satisfy all of the chained filters", and_example.as_str()],
        ],
    );
    View::Help(vec![commands, modifiers, operators])
}

// ------------- Table Browser -------------
pub fn tables_view(registry: &Registry) -> Result<TableView> {
    let mut rows = Vec::new();
    for (i, schema) in registry.schemas().iter().enumerate() {
        let store = registry.store(schema.table())?;
        rows.push(vec![
            i.to_string(),
            schema.table().to_string(),
            schema.all_fields().count().to_string(),
            store.count()?.to_string(),
        ]);
    }
    let count = rows.len();
    Ok(TableView {
        title: format!(
            "Tables: {} ({} {})",
            registry.name(),
            count,
            if count == 1 { "table" } else { "tables" }
        ),
        columns: ["#", "name", "cols", "rows"].iter().map(|c| c.to_string()).collect(),
        rows,
        highlighted: None,
        caption: Some("c[ols] <#>: Display column info\nr[ows] <#>: Display available rows".to_string()),
    })
}

pub fn columns_view(registry: &Registry, table: &str) -> Result<TableView> {
    let store = registry.store(table)?;
    let rows = store
        .schema()
        .all_fields()
        .enumerate()
        .map(|(i, f)| {
            vec![
                i.to_string(),
                f.name.clone(),
                f.display.clone(),
                f.cast.to_string(),
                f.cast.sql_type().to_string(),
            ]
        })
        .collect();
    Ok(TableView {
        title: format!("Columns: {}", table),
        columns: ["#", "field", "display", "cast", "type"].iter().map(|c| c.to_string()).collect(),
        rows,
        highlighted: None,
        caption: None,
    })
}

/// The table browser: `c <#>` shows columns, `r <#>` browses rows, `q` quits.
pub fn display_tables(
    registry: &Registry,
    renderer: &mut dyn Renderer,
    fetcher: &mut dyn PageFetcher,
    settings: &DisplaySettings,
) -> Result<()> {
    renderer.render(&View::Table(tables_view(registry)?))?;
    while let Some(line) = renderer.read_line(INPUT_PROMPT) {
        if Command::parse(&line) == Command::Quit {
            break;
        }
        let Some(captures) = TABLE_COMMAND.captures(&line) else {
            continue;
        };
        let name = captures[1].to_ascii_lowercase();
        let Some(schema) = captures[2].parse::<usize>().ok().and_then(|i| registry.schemas().get(i)) else {
            renderer.render(&View::Message(format!("No table numbered {}", &captures[2])))?;
            continue;
        };
        match name.as_str() {
            "c" | "cols" | "columns" => renderer.render(&View::Table(columns_view(registry, schema.table())?))?,
            "r" | "rows" => {
                let store = registry.store(schema.table())?;
                let projector = DisplayProjector::new(&store, settings.clone());
                projector.interact(renderer, fetcher)?;
                renderer.render(&View::Table(tables_view(registry)?))?;
            }
            _ => continue,
        }
    }
    Ok(())
}
