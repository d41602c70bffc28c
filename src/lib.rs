//! Yank – collect structured records from web pages into typed SQLite tables.
//!
//! A collection target declares its fields once. Everything else is derived
//! from that declaration:
//! * [`schema`] – validates declarations into a [`schema::RecordSchema`]
//!   (labels, list/detail display groupings, normalized rank weights) plus the
//!   implicit `id`, `url` and `yanked_at` fields.
//! * [`cast`] – coerces loosely typed extracted values into the declared type.
//! * [`persist`] – one SQLite table per schema, the [`persist::RecordStore`]
//!   primitives (`create`, `insert`, `count`, `exists`, `get`, `all`) and the
//!   [`persist::Registry`] owning the connection of a run.
//! * [`query`] – the forgiving `field__modifier = value` filter and `-field`
//!   sort language, compiled by [`query::QueryBuilder`].
//! * [`display`] – paginated list and detail views and the interactive
//!   command loop, drawn by any [`display::Renderer`] such as
//!   [`console::ConsoleRenderer`].
//! * [`collect`] – targets, callbacks and the [`collect::Collector`] that
//!   fetches pages and stores what the callbacks extract.
//! * [`fetch`] – the transport and page fetcher seams, css selection over
//!   fetched pages and url joining.
//! * [`config`] – `yank.toml` and `YANK_*` settings.
//!
//! ## Quick Start
//! ```
//! use yank::collect::{item, Collector, Target};
//! use yank::config::CollectSettings;
//! use yank::datatype::CastType;
//! use yank::fetch::{Exchange, Transport};
//! use yank::persist::{PersistenceMode, Registry};
//! use std::collections::HashMap;
//!
//! struct Canned;
//! impl Transport for Canned {
//!     fn get(&self, url: &str, _: &HashMap<String, String>) -> yank::error::Result<Exchange> {
//!         Ok(Exchange::new(url, 200, r#"{"title": "Widget", "price": "19.99"}"#))
//!     }
//! }
//!
//! let target = Target::new("product", |page: &Exchange| {
//!     let json = page.as_json().unwrap_or_default();
//!     vec![item([("title", json["title"].clone()), ("price", json["price"].clone())])]
//! })
//! .field("title", CastType::String)
//! .field("price", CastType::Float);
//!
//! let registry = Registry::new(PersistenceMode::InMemory).unwrap();
//! let mut collector = Collector::new(registry, Canned, CollectSettings::default());
//! collector.yank(&target, "http://x/1").unwrap();
//! let store = collector.registry().store("product").unwrap();
//! assert_eq!(store.get([("url", "http://x/1")]).unwrap().display("price"), "19.99");
//! ```

pub mod cast;
pub mod collect;
pub mod config;
pub mod console;
pub mod datatype;
pub mod display;
pub mod error;
pub mod fetch;
pub mod persist;
pub mod query;
pub mod schema;
