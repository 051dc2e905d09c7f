// Example: a flaky source recovering through the backoff state machine.
use pageloader::{Command, LoaderOptions, Page, PageLoader, Phase, RetryPolicy};

fn main() {
    let mut loader: PageLoader<u32, &'static str> = PageLoader::new(
        LoaderOptions::new()
            .with_retry(RetryPolicy::new(3, 250).with_max_delay_ms(Some(400)))
            .with_on_error(Some(|err: &&'static str| println!("gave up: {err}"))),
    );

    let mut failures_left = 2;
    let mut now_ms = 0u64;
    loop {
        let commands: Vec<Command> = loader.drain_commands().collect();
        for command in commands {
            let Command::Fetch(req) = command else {
                continue;
            };
            let result = if failures_left > 0 {
                failures_left -= 1;
                Err("503")
            } else {
                Ok(Page::new(vec![1, 2, 3], false))
            };
            println!(
                "t={now_ms}ms page={} attempt={} ok={}",
                req.page,
                req.attempt,
                result.is_ok()
            );
            loader.complete(req.id, result, now_ms);
        }

        if let Phase::Backoff { retry_at_ms, .. } = loader.phase() {
            println!("  backing off until t={retry_at_ms}ms");
        }
        match loader.next_deadline_ms() {
            Some(deadline) => {
                now_ms = now_ms.max(deadline);
                loader.tick(now_ms);
            }
            None if !loader.has_pending_commands() => break,
            None => {}
        }
    }

    let state = loader.state();
    println!(
        "items={:?} is_retrying={} error={:?}",
        state.items, state.is_retrying, state.error
    );
}
