//! Wikipedia source fetcher.
//!
//! Resolves a company name to an article through the REST summary endpoint,
//! falling back to the MediaWiki search API when the name is ambiguous or
//! unknown, then downloads the article HTML and extracts company facts from
//! the infobox, the lead and the body text.

mod infobox;
mod text;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use corpscope_shared::{
    CorpscopeError, FetchError, RawDocument, Result, SourceFetcher, WikipediaConfig,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use infobox::{extract_facts, normalize_host};
pub use text::{acquisitions, colloquial_name, html_to_text};

// ---------------------------------------------------------------------------
// API payloads
// ---------------------------------------------------------------------------

/// Subset of `/api/rest_v1/page/summary/{title}`.
#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    kind: String,
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrls>,
}

#[derive(Debug, Deserialize)]
struct PageUrls {
    page: String,
}

/// Subset of `/w/api.php?action=query&list=search`.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

// ---------------------------------------------------------------------------
// WikipediaFetcher
// ---------------------------------------------------------------------------

/// [`SourceFetcher`] backed by the Wikipedia REST and search APIs.
pub struct WikipediaFetcher {
    client: Client,
    base_url: Url,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl WikipediaFetcher {
    /// Build a fetcher from the `[wikipedia]` config section.
    pub fn new(config: &WikipediaConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CorpscopeError::Network(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CorpscopeError::config(format!("invalid wikipedia base_url '{}': {e}", config.base_url))
        })?;

        Ok(Self {
            client,
            base_url,
            request_delay: Duration::from_millis(config.request_delay_ms),
            last_request: Mutex::new(None),
        })
    }

    /// Wait out the configured delay since the previous fetch.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling source fetch");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::malformed(format!("base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Resolve a company name to an article summary.
    async fn resolve(&self, company_name: &str) -> std::result::Result<PageSummary, FetchError> {
        match self.summary(&article_title(company_name)).await? {
            Some(summary) if summary.kind != "disambiguation" => return Ok(summary),
            Some(_) => info!(company_name, "title is a disambiguation page, searching"),
            None => info!(company_name, "no exact article, searching"),
        }

        let title = self.search(company_name).await?;
        match self.summary(&article_title(&title)).await? {
            Some(summary) if summary.kind != "disambiguation" => Ok(summary),
            _ => Err(FetchError::NotFound {
                name: company_name.to_string(),
            }),
        }
    }

    /// `Ok(None)` on 404.
    async fn summary(&self, title: &str) -> std::result::Result<Option<PageSummary>, FetchError> {
        let url = self.endpoint(&["api", "rest_v1", "page", "summary", title])?;
        debug!(%url, "fetching page summary");

        let resp = self.get(&url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp, &url)?;

        resp.json::<PageSummary>()
            .await
            .map(Some)
            .map_err(|e| FetchError::malformed(format!("summary for '{title}': {e}")))
    }

    async fn search(&self, company_name: &str) -> std::result::Result<String, FetchError> {
        let mut url = self.endpoint(&["w", "api.php"])?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("list", "search")
            .append_pair("srsearch", company_name)
            .append_pair("srlimit", "1")
            .append_pair("format", "json");

        let resp = ensure_success(self.get(&url).await?, &url)?;
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::malformed(format!("search response: {e}")))?;

        body.query
            .and_then(|q| q.search.into_iter().next())
            .map(|hit| hit.title)
            .ok_or_else(|| FetchError::NotFound {
                name: company_name.to_string(),
            })
    }

    async fn article_html(&self, title: &str) -> std::result::Result<String, FetchError> {
        let url = self.endpoint(&["api", "rest_v1", "page", "html", title])?;
        let resp = ensure_success(self.get(&url).await?, &url)?;
        resp.text()
            .await
            .map_err(|e| FetchError::unreachable(format!("reading {url}: {e}")))
    }

    async fn get(&self, url: &Url) -> std::result::Result<reqwest::Response, FetchError> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::unreachable(format!("GET {url}: {e}")))
    }
}

#[async_trait]
impl SourceFetcher for WikipediaFetcher {
    #[instrument(skip_all, fields(company = %company_name))]
    async fn fetch(&self, company_name: &str) -> std::result::Result<RawDocument, FetchError> {
        if company_name.trim().is_empty() {
            return Err(FetchError::NotFound {
                name: company_name.to_string(),
            });
        }

        self.throttle().await;

        let summary = self.resolve(company_name).await?;
        let title = article_title(&summary.title);
        let html = self.article_html(&title).await?;

        let mut facts = extract_facts(&html);
        let text = html_to_text(&html);

        if facts.colloquial_name.is_none() {
            facts.colloquial_name = colloquial_name(&summary.extract);
        }

        let mut own_names = vec![summary.title.clone()];
        own_names.extend(facts.legal_name.clone());
        own_names.extend(facts.colloquial_name.clone());
        facts.acquisitions = acquisitions(&text, &own_names)
            .into_iter()
            .filter(|name| !facts.subsidiaries.contains(name) && !facts.brands.contains(name))
            .collect();

        if facts.legal_name.is_none() {
            warn!(title = %summary.title, "article has no infobox title, using page title");
            facts.legal_name = Some(summary.title.clone());
        }

        let source_url = summary
            .content_urls
            .and_then(|c| c.desktop)
            .map(|d| d.page)
            .unwrap_or_else(|| format!("{}wiki/{title}", self.base_url));

        info!(
            title = %summary.title,
            domains = facts.domains.len(),
            subsidiaries = facts.subsidiaries.len(),
            acquisitions = facts.acquisitions.len(),
            "source document collected"
        );

        Ok(RawDocument {
            title: summary.title,
            source_url,
            summary: summary.extract,
            text,
            facts,
            fetched_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Wikipedia article titles use underscores for spaces.
fn article_title(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

fn ensure_success(
    resp: reqwest::Response,
    url: &Url,
) -> std::result::Result<reqwest::Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(FetchError::unreachable(format!("HTTP {status} from {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE_HTML: &str = r#"<html><body>
<table class="infobox"><caption class="infobox-title">Alphabet Inc.</caption>
<tr><th class="infobox-label">Subsidiaries</th><td class="infobox-data"><ul><li>Google</li><li>Waymo</li></ul></td></tr>
<tr><th class="infobox-label">Website</th><td class="infobox-data"><a href="https://abc.xyz">abc.xyz</a></td></tr>
</table>
<p>Alphabet acquired DeepMind Technologies in 2014.</p>
<p><a rel="mw:ExtLink" href="https://www.alphabet.com/">alphabet.com</a></p>
</body></html>"#;

    fn config_for(server: &MockServer) -> WikipediaConfig {
        WikipediaConfig {
            base_url: server.uri(),
            request_delay_ms: 0,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn summary_json(title: &str, kind: &str) -> serde_json::Value {
        serde_json::json!({
            "type": kind,
            "title": title,
            "extract": "Alphabet Inc., also known as Alphabet, is a holding company.",
        })
    }

    #[tokio::test]
    async fn fetches_article_by_exact_title() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Alphabet_Inc."))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(summary_json("Alphabet Inc.", "standard")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/html/Alphabet_Inc."))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_HTML))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::new(&config_for(&server)).expect("build fetcher");
        let doc = fetcher.fetch("Alphabet Inc.").await.expect("fetch");

        assert_eq!(doc.title, "Alphabet Inc.");
        assert_eq!(doc.facts.legal_name.as_deref(), Some("Alphabet Inc."));
        assert_eq!(doc.facts.colloquial_name.as_deref(), Some("Alphabet"));
        assert_eq!(doc.facts.subsidiaries, vec!["Google", "Waymo"]);
        assert_eq!(doc.facts.domains, vec!["abc.xyz", "alphabet.com"]);
        assert_eq!(doc.facts.acquisitions, vec!["DeepMind Technologies"]);
        assert!(doc.text.contains("DeepMind"));
    }

    #[tokio::test]
    async fn falls_back_to_search_on_404() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Alphabet"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("srsearch", "Alphabet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": { "search": [ { "title": "Alphabet Inc." } ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Alphabet_Inc."))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(summary_json("Alphabet Inc.", "standard")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/html/Alphabet_Inc."))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_HTML))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::new(&config_for(&server)).expect("build fetcher");
        let doc = fetcher.fetch("Alphabet").await.expect("fetch");
        assert_eq!(doc.title, "Alphabet Inc.");
    }

    #[tokio::test]
    async fn empty_search_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Nonexistent_Corp"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "query": { "search": [] } })),
            )
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::new(&config_for(&server)).expect("build fetcher");
        let err = fetcher.fetch("Nonexistent Corp").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::NotFound {
                name: "Nonexistent Corp".into()
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_unreachable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::new(&config_for(&server)).expect("build fetcher");
        let err = fetcher.fetch("Alphabet Inc.").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn garbage_summary_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Alphabet"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::new(&config_for(&server)).expect("build fetcher");
        let err = fetcher.fetch("Alphabet").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn titles_use_underscores() {
        assert_eq!(article_title("  Alphabet   Inc. "), "Alphabet_Inc.");
    }
}
