// Example: driving the loader by hand against an in-memory collection.
use pageloader::{Command, LoaderOptions, Page, PageLoader, ScrollMetrics, SentinelRect};

const PAGE_SIZE: u64 = 20;
const TOTAL: u64 = 50;

fn fetch(page: u64) -> Page<u64> {
    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(TOTAL);
    Page::new((start..end).collect(), end < TOTAL).with_total(TOTAL)
}

fn main() {
    let mut loader: PageLoader<u64, String> =
        PageLoader::new(LoaderOptions::new().with_proximity_threshold(100));

    // Each row is 10 units tall; the sentinel sits right after the last row.
    let mut scroll_offset = 0u64;
    for now_ms in (0..2_000u64).step_by(100) {
        let commands: Vec<Command> = loader.drain_commands().collect();
        for command in commands {
            if let Command::Fetch(req) = command {
                println!("t={now_ms}ms fetch page={} attempt={}", req.page, req.attempt);
                loader.complete(req.id, Ok(fetch(req.page)), now_ms);
            }
        }

        let content_size = loader.state().len() as u64 * 10;
        scroll_offset = (scroll_offset + 150).min(content_size);
        loader.apply_scroll_metrics(
            ScrollMetrics {
                scroll_offset,
                viewport_size: 200,
                content_size,
            },
            now_ms,
        );
        loader.set_sentinel(Some(SentinelRect {
            start: content_size,
            size: 1,
        }));
        loader.tick(now_ms);
    }

    let state = loader.state();
    println!(
        "done: items={} current_page={} has_more={} total={:?}",
        state.len(),
        state.current_page,
        state.has_more,
        state.total_count
    );
}
