//! Ingestion: fetch a page, run the extraction callback and store what it found.
//!
//! A [`Target`] pairs the field declarations of one table with the callbacks
//! that turn a fetched [`Exchange`] into items. A [`Collector`] owns the
//! [`Registry`] of a collection run and the transports, and applies the
//! per-target settings (session limit, skipping already stored urls) around
//! every fetch. Items are cast and inserted one at a time as soon as they are
//! extracted; a duplicate on a unique column is skipped, a cast failure ends
//! the run for that page.

use std::collections::HashMap;
use std::thread;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::CollectSettings;
use crate::datatype::Raw;
use crate::error::{Result, SchemaError, StorageError, YankError};
use crate::fetch::{self, Exchange, PageFetcher, Transport};
use crate::persist::Registry;
use crate::schema::{FieldSpec, RecordSchema, SchemaBuilder, URL, YANKED_AT};

/// One extracted item, as field name and loosely typed value pairs.
pub type Item = Vec<(String, Raw)>;

pub fn item<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Item
where
    K: Into<String>,
    V: Into<Raw>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

type YankFn = Box<dyn Fn(&Exchange) -> Vec<Item>>;
type FetchFn = Box<dyn Fn(&mut dyn PageFetcher, &str) -> Result<Exchange>>;
type CleanFn = Box<dyn Fn(Vec<Item>) -> Vec<Item>>;
type HasCaptchaFn = Box<dyn Fn(&Exchange) -> bool>;
type SolveCaptchaFn = Box<dyn Fn(&mut dyn PageFetcher, &Exchange) -> Result<()>>;

// ------------- Targets -------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSettings {
    /// Items stored per run before the target refuses to fetch more, `0`
    /// meaning no limit.
    pub session_limit: Option<usize>,
    /// Skip urls that already have a stored record.
    pub skip_by_url: bool,
    pub display_list_by: Option<Vec<(String, Option<String>)>>,
    pub display_detail_by: Option<Vec<(String, Option<String>)>>,
}

pub struct Target {
    table: String,
    fields: Vec<(String, FieldSpec)>,
    settings: TargetSettings,
    yank: YankFn,
    on_fetch: Option<FetchFn>,
    on_clean: Option<CleanFn>,
    has_captcha: Option<HasCaptchaFn>,
    solve_captcha: Option<SolveCaptchaFn>,
}

impl Target {
    pub fn new(table: impl Into<String>, yank: impl Fn(&Exchange) -> Vec<Item> + 'static) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            settings: TargetSettings::default(),
            yank: Box::new(yank),
            on_fetch: None,
            on_clean: None,
            has_captcha: None,
            solve_captcha: None,
        }
    }
    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.fields.push((name.into(), spec.into()));
        self
    }
    pub fn settings(mut self, settings: TargetSettings) -> Self {
        self.settings = settings;
        self
    }
    /// Loads pages through the page fetcher instead of the transport.
    pub fn on_fetch(mut self, f: impl Fn(&mut dyn PageFetcher, &str) -> Result<Exchange> + 'static) -> Self {
        self.on_fetch = Some(Box::new(f));
        self
    }
    pub fn on_clean(mut self, f: impl Fn(Vec<Item>) -> Vec<Item> + 'static) -> Self {
        self.on_clean = Some(Box::new(f));
        self
    }
    pub fn has_captcha(mut self, f: impl Fn(&Exchange) -> bool + 'static) -> Self {
        self.has_captcha = Some(Box::new(f));
        self
    }
    pub fn solve_captcha(mut self, f: impl Fn(&mut dyn PageFetcher, &Exchange) -> Result<()> + 'static) -> Self {
        self.solve_captcha = Some(Box::new(f));
        self
    }
    pub fn schema(&self) -> std::result::Result<RecordSchema, SchemaError> {
        let mut builder = SchemaBuilder::new(self.table.clone()).fields(self.fields.iter().cloned());
        if let Some(list) = &self.settings.display_list_by {
            builder = builder.display_list_by(list.iter().cloned());
        }
        if let Some(detail) = &self.settings.display_detail_by {
            builder = builder.display_detail_by(detail.iter().cloned());
        }
        builder.build()
    }
}

// ------------- Collector -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Ids of the inserted records and the number of duplicates skipped.
    Stored { ids: Vec<i64>, duplicates: usize },
    /// The url already had a record.
    Skipped,
}

pub struct Collector {
    registry: Registry,
    transport: Box<dyn Transport>,
    fetcher: Option<Box<dyn PageFetcher>>,
    settings: CollectSettings,
    headers: HashMap<String, String>,
    auto_headers_resolved: bool,
    session_counts: HashMap<String, usize>,
}

impl Collector {
    pub fn new(registry: Registry, transport: impl Transport + 'static, settings: CollectSettings) -> Self {
        Self {
            registry,
            transport: Box::new(transport),
            fetcher: None,
            headers: settings.default_headers.clone(),
            settings,
            auto_headers_resolved: false,
            session_counts: HashMap::new(),
        }
    }
    pub fn with_fetcher(mut self, fetcher: impl PageFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
    pub fn into_registry(self) -> Registry {
        self.registry
    }
    /// Headers sent with every transport request.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
    pub fn session_count(&self, table: &str) -> usize {
        self.session_counts.get(table).copied().unwrap_or(0)
    }

    pub fn register(&mut self, target: &Target) -> Result<()> {
        self.registry.register(target.schema()?)
    }

    /// Fetches `url` and stores every item the target extracts from it.
    pub fn yank(&mut self, target: &Target, url: &str) -> Result<Outcome> {
        let table = target.table();
        if self.registry.schema(table).is_none() {
            self.register(target)?;
        }
        if let Some(limit) = target.settings.session_limit.filter(|limit| *limit > 0) {
            if self.session_count(table) >= limit {
                return Err(YankError::SessionLimitReached { table: table.to_string(), limit });
            }
        }
        if target.settings.skip_by_url && self.registry.store(table)?.exists([(URL, url)])? {
            debug!(table, url, "skipping stored url");
            return Ok(Outcome::Skipped);
        }
        let delay = self.settings.throttle_ms.delay();
        if !delay.is_zero() {
            debug!(url, delay_ms = delay.as_millis() as u64, "throttling");
            thread::sleep(delay);
        }
        let mut exchange = self.fetch(target, url)?;
        if let Some(has_captcha) = &target.has_captcha {
            if has_captcha(&exchange) {
                match &target.solve_captcha {
                    Some(solve) => {
                        info!(table, url, "solving captcha");
                        solve(self.page_fetcher()?, &exchange)?;
                        exchange = self.fetch(target, url)?;
                    }
                    None => warn!(table, url, "captcha detected without a solver"),
                }
            }
        }
        let mut items = (target.yank)(&exchange);
        if let Some(clean) = &target.on_clean {
            items = clean(items);
        }

        let store = self.registry.store(table)?;
        let mut ids = Vec::new();
        let mut duplicates = 0;
        for mut item in items {
            item.retain(|(name, _)| name != URL && name != YANKED_AT);
            item.push((URL.to_string(), Raw::Text(url.to_string())));
            item.push((YANKED_AT.to_string(), Raw::DateTime(Utc::now())));
            let mut record = store.create(item)?;
            match store.insert(&mut record) {
                Ok(id) => {
                    ids.push(id);
                    *self.session_counts.entry(table.to_string()).or_insert(0) += 1;
                }
                Err(YankError::Storage(StorageError::UniqueConstraintViolation(e))) => {
                    info!(table, url, error = %e, "skipping duplicate item");
                    duplicates += 1;
                }
                Err(e) => return Err(e),
            }
        }
        info!(table, url, stored = ids.len(), duplicates, "yanked");
        Ok(Outcome::Stored { ids, duplicates })
    }

    /// Yanks every url in turn, stopping quietly once the session limit is hit.
    pub fn run<S: AsRef<str>>(&mut self, target: &Target, urls: impl IntoIterator<Item = S>) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        for url in urls {
            match self.yank(target, url.as_ref()) {
                Ok(outcome) => outcomes.push(outcome),
                Err(YankError::SessionLimitReached { table, limit }) => {
                    info!(table = %table, limit, "session limit reached");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    fn page_fetcher(&mut self) -> Result<&mut (dyn PageFetcher + 'static)> {
        match self.fetcher.as_mut() {
            Some(fetcher) => Ok(&mut **fetcher),
            None => Err(YankError::Fetch("a page fetcher is required".to_string())),
        }
    }

    fn fetch(&mut self, target: &Target, url: &str) -> Result<Exchange> {
        if let Some(on_fetch) = &target.on_fetch {
            return on_fetch(self.page_fetcher()?, url);
        }
        if self.settings.auto_headers && !self.auto_headers_resolved {
            self.resolve_auto_headers(url)?;
        }
        self.transport.get(url, &self.headers)
    }

    /// Adopts the request headers a browser sent to the host of `url`,
    /// with the configured defaults taking precedence.
    fn resolve_auto_headers(&mut self, url: &str) -> Result<()> {
        self.auto_headers_resolved = true;
        let host = fetch::host(url);
        let exchanges = self.page_fetcher()?.fetch(url)?;
        let adopted = exchanges
            .into_iter()
            .find(|exchange| host.is_some() && exchange.host() == host);
        match adopted {
            Some(exchange) => {
                let mut headers = exchange.headers;
                headers.extend(self.settings.default_headers.clone());
                debug!(url, headers = headers.len(), "adopted browser headers");
                self.headers = headers;
            }
            None => warn!(url, "no exchange to take headers from"),
        }
        Ok(())
    }
}
