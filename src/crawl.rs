use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::extract;
use crate::table::RawRecord;

static CARD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.collection-card").unwrap());
static NEXT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.page-item.next").unwrap());

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport collaborator: page bytes, or `None` when the page is unreachable.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Option<Vec<u8>>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> Option<Vec<u8>>,
{
    fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        self(url)
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let start = Instant::now();
        let result = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes());
        match result {
            Ok(body) => {
                debug!("Fetched {} ({} bytes, {}ms)", url, body.len(), start.elapsed().as_millis());
                Some(body.to_vec())
            }
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub base_url: String,
    pub start_page: u32,
    pub delay: Duration,
    pub max_pages: Option<u32>,
}

/// Page 1 is the catalogue root, later pages live at `/page{n}`.
pub fn page_url(base_url: &str, page: u32) -> String {
    if page <= 1 {
        base_url.to_string()
    } else {
        format!("{}/page{}", base_url.trim_end_matches('/'), page)
    }
}

pub fn crawl(fetcher: &impl Fetch, options: &CrawlOptions) -> Vec<RawRecord> {
    crawl_with_progress(fetcher, options, &ProgressBar::hidden())
}

/// Walk the catalogue page by page until there is no next page, `max_pages`
/// pages were read, or a fetch fails. Whatever was collected is returned.
pub fn crawl_with_progress(
    fetcher: &impl Fetch,
    options: &CrawlOptions,
    pb: &ProgressBar,
) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut page = options.start_page;
    let mut pages_read = 0u32;

    loop {
        let url = page_url(&options.base_url, page);
        pb.set_message(format!("page {} ({} products)", page, records.len()));
        info!("Scraping page {}: {}", page, url);

        let Some(body) = fetcher.fetch(&url) else {
            warn!("Stopping at page {}: could not fetch {}", page, url);
            break;
        };

        let doc = Html::parse_document(&String::from_utf8_lossy(&body));
        let before = records.len();
        records.extend(doc.select(&CARD_SEL).map(|card| extract::extract(&card)));
        pages_read += 1;
        pb.inc(1);
        debug!("Page {}: {} products", page, records.len() - before);

        if doc.select(&NEXT_SEL).next().is_none() {
            info!("No next page after page {}", page);
            break;
        }
        if options.max_pages.is_some_and(|max| pages_read >= max) {
            info!("Reached max_pages ({})", pages_read);
            break;
        }

        if !options.delay.is_zero() {
            thread::sleep(options.delay);
        }
        page += 1;
    }

    pb.finish_and_clear();
    info!("Scraped {} products from {} pages", records.len(), pages_read);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Serves canned pages in order; `None` entries (or running dry) fail.
    struct ScriptedFetcher {
        pages: RefCell<VecDeque<Option<Vec<u8>>>>,
        requested: RefCell<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Option<&str>>) -> Self {
            ScriptedFetcher {
                pages: RefCell::new(
                    pages.into_iter().map(|p| p.map(|s| s.as_bytes().to_vec())).collect(),
                ),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl Fetch for ScriptedFetcher {
        fn fetch(&self, url: &str) -> Option<Vec<u8>> {
            self.requested.borrow_mut().push(url.to_string());
            self.pages.borrow_mut().pop_front().flatten()
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn card(title: &str, price: &str) -> String {
        format!(
            r#"<div class="collection-card">
                <h3 class="product-title">{title}</h3>
                <span class="price">{price}</span>
                <p>Rating: ⭐4.5/5</p><p>Colors: 3 Colors</p><p>Size: L</p><p>Gender: Male</p>
            </div>"#
        )
    }

    const NEXT: &str = r#"<ul class="pagination"><li class="page-item next"><a href="/page2">Next</a></li></ul>"#;

    fn options(max_pages: Option<u32>) -> CrawlOptions {
        CrawlOptions {
            base_url: "https://dummy.test".into(),
            start_page: 1,
            delay: Duration::ZERO,
            max_pages,
        }
    }

    #[test]
    fn page_urls() {
        assert_eq!(page_url("https://dummy.test", 1), "https://dummy.test");
        assert_eq!(page_url("https://dummy.test/", 2), "https://dummy.test/page2");
        assert_eq!(page_url("https://dummy.test", 12), "https://dummy.test/page12");
    }

    #[test]
    fn stops_when_next_is_absent() {
        let p1 = format!("{}{}", card("Item 1", "$100"), NEXT);
        let fetcher = ScriptedFetcher::new(vec![Some(p1.as_str()), Some("<p>No products</p>")]);
        let out = crawl(&fetcher, &options(None));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Item 1");
        assert_eq!(out[0].price, "$100");
        assert_eq!(out[0].colors, "3 Colors");
        assert_eq!(fetcher.requested.borrow().len(), 2);
    }

    #[test]
    fn three_pages_in_order() {
        let p1 = format!("{}{}", card("Item 1", "$100"), NEXT);
        let p2 = format!("{}{}", card("Item 2", "$200"), NEXT);
        let p3 = card("Item 3", "$300");
        let fetcher = ScriptedFetcher::new(vec![Some(p1.as_str()), Some(p2.as_str()), Some(p3.as_str())]);
        let out = crawl(&fetcher, &options(Some(3)));
        let titles: Vec<&str> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Item 1", "Item 2", "Item 3"]);
        assert_eq!(
            *fetcher.requested.borrow(),
            ["https://dummy.test", "https://dummy.test/page2", "https://dummy.test/page3"]
        );
    }

    #[test]
    fn max_pages_wins_over_next() {
        let p = format!("{}{}", card("Item", "$1"), NEXT);
        let fetcher = ScriptedFetcher::new(vec![Some(p.as_str()), Some(p.as_str()), Some(p.as_str())]);
        let out = crawl(&fetcher, &options(Some(2)));
        assert_eq!(out.len(), 2);
        assert_eq!(fetcher.requested.borrow().len(), 2);
    }

    #[test]
    fn empty_page_with_next_keeps_going() {
        let p2 = card("Item 2", "$2");
        let fetcher = ScriptedFetcher::new(vec![Some(NEXT), Some(p2.as_str())]);
        let out = crawl(&fetcher, &options(None));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Item 2");
    }

    #[test]
    fn first_fetch_failure_yields_nothing() {
        let fetcher = ScriptedFetcher::new(vec![None]);
        assert!(crawl(&fetcher, &options(None)).is_empty());
    }

    #[test]
    fn later_fetch_failure_keeps_partial_results() {
        let p1 = format!("{}{}", card("Item 1", "$100"), NEXT);
        let fetcher = ScriptedFetcher::new(vec![Some(p1.as_str()), None]);
        let out = crawl(&fetcher, &options(None));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn start_page_is_respected() {
        let fetcher = ScriptedFetcher::new(vec![Some("")]);
        let opts = CrawlOptions { start_page: 4, ..options(None) };
        crawl(&fetcher, &opts);
        assert_eq!(*fetcher.requested.borrow(), ["https://dummy.test/page4"]);
    }

    #[test]
    fn catalogue_fixture() {
        let page = fixture("catalogue_page");
        let fetcher = ScriptedFetcher::new(vec![Some(page.as_str())]);
        let out = crawl(&fetcher, &options(Some(1)));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].title, "T-shirt 2");
        assert_eq!(out[0].price, "$102.15");
        assert_eq!(out[0].rating, "⭐ 3.9 / 5");
        assert_eq!(out[0].size, "M");
        assert_eq!(out[0].gender, "Women");
        assert_eq!(out[1].title, "Unknown Product");
        assert_eq!(out[1].price, "Price Unavailable");
        assert_eq!(out[2].rating, "⭐ Invalid Rating / 5");
        assert_eq!(out[3].colors, "-");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_fetcher_reads_body_and_reports_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let base = server.uri();
        let (ok, failed) = tokio::task::spawn_blocking(move || {
            let fetcher = HttpFetcher::new().unwrap();
            (fetcher.fetch(&page_url(&base, 1)), fetcher.fetch(&page_url(&base, 2)))
        })
        .await
        .unwrap();

        assert_eq!(ok.as_deref(), Some(b"<html>ok</html>".as_slice()));
        assert_eq!(failed, None);
    }
}
