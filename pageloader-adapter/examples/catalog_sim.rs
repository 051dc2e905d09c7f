use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pageloader::{LoaderOptions, Page, PageIndex, RetryPolicy, ScrollMetrics, SentinelRect};
use pageloader_adapter::{Controller, PageSource};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const TOTAL: u64 = 120;
const PAGE_SIZE: u64 = 20;
const ROW_HEIGHT: u64 = 32;
const VIEWPORT: u32 = 480;

#[derive(Debug)]
struct Unavailable;

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("catalog unavailable")
    }
}

/// A catalog that drops every third request.
struct FlakyCatalog {
    requests: AtomicU32,
}

#[async_trait::async_trait]
impl PageSource<String, Unavailable> for FlakyCatalog {
    async fn fetch_page(
        &self,
        page: PageIndex,
        _cancel: CancellationToken,
    ) -> Result<Page<String>, Unavailable> {
        tokio::time::sleep(Duration::from_millis(80)).await;
        if self.requests.fetch_add(1, Ordering::Relaxed) % 3 == 2 {
            return Err(Unavailable);
        }
        let start = page * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(TOTAL);
        let items = (start..end).map(|i| format!("product #{i}")).collect();
        Ok(Page::new(items, end < TOTAL).with_total(TOTAL))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pageloader=debug,pageloader_adapter=debug")),
        )
        .init();

    let source = FlakyCatalog {
        requests: AtomicU32::new(0),
    };
    let options = LoaderOptions::new()
        .with_proximity_threshold(200)
        .with_retry(RetryPolicy::new(3, 100));
    let controller = Controller::spawn(source, options);
    let mut sentinel = controller.sentinel();
    let mut states = controller.subscribe();

    // Simulate a user who keeps scrolling to the bottom of whatever is rendered.
    loop {
        if states.changed().await.is_err() {
            break;
        }
        let state = states.borrow_and_update().clone();
        if state.is_loading {
            continue;
        }
        if let Some(err) = &state.error {
            println!("error: {err}; retrying");
            controller.retry();
            continue;
        }

        let content = state.len() as u64 * ROW_HEIGHT;
        println!(
            "rendered {} items (page {}, has_more={})",
            state.len(),
            state.current_page,
            state.has_more
        );
        if !state.has_more {
            break;
        }

        controller.on_scroll(ScrollMetrics {
            scroll_offset: content.saturating_sub(VIEWPORT as u64),
            viewport_size: VIEWPORT,
            content_size: content,
        });
        sentinel.attach(SentinelRect {
            start: content,
            size: 1,
        });
    }

    sentinel.detach();
    controller.shutdown().await;
}
