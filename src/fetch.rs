//! Seams to the collaborators that actually talk to the web.
//!
//! Neither plain HTTP nor browser automation lives in this crate: a
//! [`Transport`] performs single requests, a [`PageFetcher`] drives a browser
//! and reports every exchange a page load produced. Both hand back
//! [`Exchange`] values, which extraction callbacks read as JSON or query
//! through [`Document`].

use std::collections::HashMap;

// css selection over html bodies
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{Result, YankError};

/// One request/response pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Exchange {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { url: url.into(), status, headers: HashMap::new(), body: body.into() }
    }
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
    /// The body as JSON, `None` when it is not JSON.
    pub fn as_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
    /// The body parsed as html, for running many selections over one page.
    pub fn html(&self) -> Html {
        Html::parse_document(&self.text())
    }
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
    pub fn host(&self) -> Option<String> {
        host(&self.url)
    }
}

/// Lowercased host of an absolute url, IPv6 addresses keep their brackets.
pub fn host(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// Joins `parts` the way a browser resolves links, each relative to the
/// previous one, drops trailing slashes and appends `params` form encoded.
pub fn join_url(parts: &[&str], params: &[(&str, &str)]) -> Result<String> {
    let (first, rest) = parts
        .split_first()
        .ok_or_else(|| YankError::Url("nothing to join".to_string()))?;
    let mut url = Url::parse(first)?;
    for part in rest {
        url = url.join(part)?;
    }
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    let bare = url.query().is_none() && url.fragment().is_none();
    let joined = String::from(url);
    Ok(if bare { joined.trim_end_matches('/').to_string() } else { joined })
}

/// Css selection over a fetched page. Selected elements are reduced to their
/// trimmed text.
pub trait Document {
    /// Text of every element matching `selector`, in document order.
    fn select_all(&self, selector: &str) -> Result<Vec<String>>;

    /// Text of the first match, `default` when nothing matches.
    fn select(&self, selector: &str, default: &str) -> Result<String> {
        Ok(self
            .select_all(selector)?
            .into_iter()
            .next()
            .unwrap_or_else(|| default.to_string()))
    }
}

impl Document for Html {
    fn select_all(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        Ok(Html::select(self, &selector).map(element_text).collect())
    }
}

impl Document for Exchange {
    fn select_all(&self, selector: &str) -> Result<Vec<String>> {
        self.html().select_all(selector)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| YankError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Plain HTTP.
pub trait Transport {
    fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<Exchange>;
}

/// Browser driven page loads.
pub trait PageFetcher {
    fn fetch(&mut self, url: &str) -> Result<Vec<Exchange>>;
}

/// A transport for runs that only ever use a page fetcher.
pub struct NoTransport;

impl Transport for NoTransport {
    fn get(&self, url: &str, _headers: &HashMap<String, String>) -> Result<Exchange> {
        Err(YankError::Fetch(format!("no transport configured for {}", url)))
    }
}

/// Stands in when no browser is available; opening a page does nothing.
pub struct NoFetcher;

impl PageFetcher for NoFetcher {
    fn fetch(&mut self, url: &str) -> Result<Vec<Exchange>> {
        tracing::debug!(url, "no page fetcher configured");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_extracted() {
        assert_eq!(host("https://user@shop.example.com:8080/a?b").as_deref(), Some("shop.example.com"));
        assert_eq!(host("http://x/1").as_deref(), Some("x"));
        assert_eq!(host("not a url"), None);
    }

    #[test]
    fn hosts_are_lowercased() {
        assert_eq!(host("https://Shop.EXAMPLE.com/cart").as_deref(), Some("shop.example.com"));
        let exchange = Exchange::new("HTTPS://API.Example.com/v1", 200, "");
        assert_eq!(exchange.host().as_deref(), Some("api.example.com"));
    }

    #[test]
    fn ipv6_hosts_keep_brackets() {
        assert_eq!(host("http://[::1]:8080/a").as_deref(), Some("[::1]"));
        assert_eq!(host("http://[2001:DB8::1]/").as_deref(), Some("[2001:db8::1]"));
        assert_ne!(host("http://[::1]/"), host("http://[::2]/"));
    }

    #[test]
    fn json_bodies() {
        let exchange = Exchange::new("http://x/1", 200, r#"{"title": "Widget"}"#);
        assert_eq!(exchange.as_json().expect("json")["title"], "Widget");
        assert!(Exchange::new("http://x/1", 200, "<html>").as_json().is_none());
    }

    #[test]
    fn urls_are_joined() {
        let joined = join_url(&["https://shop.example.com/api/", "items/"], &[])
            .expect("joined");
        assert_eq!(joined, "https://shop.example.com/api/items");
        let joined = join_url(&["https://x.com/a/b", "../c"], &[]).expect("joined");
        assert_eq!(joined, "https://x.com/c");
        assert_eq!(join_url(&["https://x.com/"], &[]).expect("joined"), "https://x.com");
    }

    #[test]
    fn params_are_form_encoded() {
        let joined = join_url(
            &["https://shop.example.com/api/", "search/"],
            &[("q", "red shoes"), ("tag", "a&b")],
        )
        .expect("joined");
        assert_eq!(joined, "https://shop.example.com/api/search?q=red+shoes&tag=a%26b");
    }

    #[test]
    fn joining_needs_an_absolute_start() {
        assert!(matches!(join_url(&[], &[]), Err(YankError::Url(_))));
        assert!(matches!(join_url(&["items/"], &[]), Err(YankError::Url(_))));
    }
}
