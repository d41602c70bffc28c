// used to lay out tables in the terminal
use tabled::builder::Builder;
use tabled::settings::Style;

use std::io::{self, BufRead, Write};

use crate::display::{DetailView, Renderer, TableView, View};
use crate::error::{Result, YankError};

const HIGHLIGHT_MARKER: &str = "> ";

/// Draws views as text tables on a writer and reads commands line by line.
pub struct ConsoleRenderer<R, W> {
    input: R,
    output: W,
}

impl ConsoleRenderer<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleRenderer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Renderer for ConsoleRenderer<R, W> {
    fn render(&mut self, view: &View) -> Result<()> {
        let text = match view {
            View::Table(table) => draw_table(table),
            View::Detail(detail) => draw_detail(detail),
            View::Help(tables) => tables.iter().map(draw_table).collect::<Vec<String>>().join("\n"),
            View::Message(message) => format!("{}\n", message),
        };
        write!(self.output, "\n{}", text)
            .and_then(|_| self.output.flush())
            .map_err(|e| YankError::Render(e.to_string()))
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        write!(self.output, "{}", prompt).and_then(|_| self.output.flush()).ok()?;
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

pub fn draw_table(view: &TableView) -> String {
    let mut builder = Builder::default();
    builder.push_record(view.columns.iter().cloned());
    for (i, row) in view.rows.iter().enumerate() {
        let mut row = row.clone();
        if view.highlighted == Some(i) {
            if let Some(first) = row.first_mut() {
                first.insert_str(0, HIGHLIGHT_MARKER);
            }
        }
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    let mut text = format!("{}\n{}\n", view.title, table);
    if let Some(caption) = &view.caption {
        text.push_str(caption);
        text.push('\n');
    }
    text
}

fn draw_detail(view: &DetailView) -> String {
    let mut text = format!("{}\n", view.title);
    for row in &view.rows {
        let mut builder = Builder::default();
        builder.push_record(row.iter().map(|p| p.title.clone()));
        builder.push_record(row.iter().map(|p| p.body.clone()));
        let mut table = builder.build();
        table.with(Style::rounded());
        text.push_str(&table.to_string());
        text.push('\n');
    }
    text
}
