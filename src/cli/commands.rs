use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::warn;

use crate::app::{AppContext, Result};
use crate::classifier::filter::FilterReport;
use crate::collector::{discovery_lists, read_url_list, CollectedUrls};
use crate::domain::WorkCategory;
use crate::history::reconciled::ReconciledHistory;
use crate::monitor::{self, Monitor, MonitorConfig, QueueStatus};
use crate::pipeline::{Outcome, RunSummary};
use crate::store::LedgerStore;

/// Collect pending work and push it through the pipeline.
pub async fn run(ctx: &AppContext, limit: Option<usize>, retries_only: bool) -> Result<()> {
    let mut collected = ctx.collect()?;
    if retries_only {
        collected = collected.retries_only();
    }
    print_collection(&collected);

    if !collected.escalations.is_empty() {
        let marked = ctx
            .ledgers()
            .apply_escalations(&ctx.normalizer, &collected.escalations)
            .await?;
        println!("Marked {} exhausted URLs as permanently failed", marked);
    }

    let mut items = collected.items;
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    if items.is_empty() {
        println!("Nothing to process");
        return Ok(());
    }

    println!(
        "Processing {} URLs with {} workers...",
        items.len(),
        ctx.config.pipeline.workers
    );
    let fetcher = Arc::new(ctx.http_fetcher()?);
    let summary = ctx.pipeline(fetcher).run(items).await;
    print_summary(&summary);
    Ok(())
}

/// Show the pending queue, ledger totals and the monitor level.
pub fn status(ctx: &AppContext) -> Result<()> {
    let collected = ctx.collect()?;
    let ledgers = ctx.ledgers();
    let failures = ledgers.failures.load()?;
    let database = ledgers.database.load()?;
    let mut history = ReconciledHistory::build(&ctx.history, &failures, &database, &ctx.normalizer);
    for list in discovery_lists(&ctx.config.paths.url_list_dir) {
        match read_url_list(&list) {
            Ok(urls) => history.add_discovered(&ctx.normalizer, &urls),
            Err(e) => warn!(path = %list.display(), error = %e, "Skipping unreadable URL list"),
        }
    }

    println!("Content directory: {}", ctx.content_dir().display());
    println!("Processed articles on disk: {}", ctx.history.len());
    println!("Known URLs: {}", history.len());
    for (status, count) in history.count_by_status() {
        println!("  {:<20} {}", status, count);
    }

    println!();
    print_collection(&collected);

    if !collected.by_website.is_empty() {
        println!("\nBy website:");
        let mut sites: Vec<_> = collected.by_website.iter().collect();
        sites.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (site, count) in sites.into_iter().take(10) {
            println!("  {:<30} {}", site, count);
        }
    }

    if !collected.near_duplicates.is_empty() {
        println!("\nPossible duplicates:");
        for (a, b) in &collected.near_duplicates {
            println!("  {}\n    ~ {}", a, b);
        }
    }

    let status = QueueStatus::from_collected(&collected, &ctx.config.monitor);
    println!("\n{}", status.summary_line());
    Ok(())
}

/// Mark permanent failures in the failure ledger.
pub async fn filter(ctx: &AppContext, dry_run: bool) -> Result<()> {
    let report = ctx
        .failure_filter()
        .apply(&ctx.ledgers().failures, dry_run)
        .await?;
    print_filter_report(&report);
    Ok(())
}

pub fn check(ctx: &AppContext, urls: &[String]) -> Result<()> {
    let result = ctx.history.batch_check(urls);

    for url in &result.processed {
        match ctx.history.get_record(url).and_then(|r| r.file_path) {
            Some(path) => println!("processed  {}  ({})", url, path.display()),
            None => println!("processed  {}", url),
        }
    }
    for url in &result.unprocessed {
        println!("new        {}", url);
    }
    for (url, error) in &result.errors {
        eprintln!("error      {:?}: {}", url, error);
    }

    println!(
        "\n{} processed, {} new, {} errors",
        result.processed.len(),
        result.unprocessed.len(),
        result.errors.len()
    );
    Ok(())
}

pub async fn next_number(ctx: &AppContext) -> Result<()> {
    let number = ctx.allocator().next_number().await?;
    println!("{}", number);
    Ok(())
}

/// Start the queue monitor, detaching unless `foreground` is set.
pub async fn start_monitor(
    ctx: Arc<AppContext>,
    config: MonitorConfig,
    foreground: bool,
) -> Result<()> {
    if Monitor::is_running() {
        println!("{}", monitor::monitor_status());
        return Ok(());
    }

    if !foreground {
        let exe = std::env::current_exe()?;
        let child = Command::new(exe)
            .args(std::env::args_os().skip(1))
            .arg("--foreground")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        println!("Monitor started in background (PID: {})", child.id());
        return Ok(());
    }

    Monitor::new(ctx, config).run().await
}

fn print_collection(collected: &CollectedUrls) {
    println!("Pending URLs: {}", collected.total_count);
    for category in WorkCategory::ALL {
        let count = collected.count(category);
        if count > 0 {
            println!("  {:<20} {}", category.as_str(), count);
        }
    }

    if collected.already_processed > 0 || collected.duplicates > 0 || collected.skipped_known > 0
    {
        println!(
            "Skipped: {} already processed, {} duplicates, {} known in ledgers",
            collected.already_processed, collected.duplicates, collected.skipped_known
        );
    }

    if !collected.escalations.is_empty() {
        println!("Exceeded retry limit: {}", collected.escalations.len());
        for escalation in collected.escalations.iter().take(5) {
            println!(
                "  {} ({} attempts, {})",
                escalation.url, escalation.attempt_count, escalation.description
            );
        }
    }
}

fn print_summary(summary: &RunSummary) {
    for item in &summary.outcomes {
        match &item.outcome {
            Outcome::Success { number, path } => {
                println!("  + #{:02} {} -> {}", number, item.url, path.display())
            }
            Outcome::Failed {
                number,
                category,
                permanent,
                reason,
            } => {
                let kind = if *permanent { "permanent" } else { "retry" };
                let number = number.map(|n| format!("#{:02}", n)).unwrap_or_default();
                eprintln!(
                    "  ! {} {} [{} {}] {}",
                    number,
                    item.url,
                    category.as_str(),
                    kind,
                    reason
                );
            }
        }
    }

    println!(
        "\nRun complete: {} succeeded, {} failed ({} permanent)",
        summary.succeeded, summary.failed, summary.permanent
    );
}

fn print_filter_report(report: &FilterReport) {
    let verb = if report.dry_run { "would mark" } else { "marked" };
    println!("Failure ledger: {} entries", report.total);
    println!("  already permanent:  {}", report.already_permanent);
    println!("  {} permanent:  {}", verb, report.newly_permanent);
    println!("  still retryable:    {}", report.retryable);
    println!("Retry queue reduced by {:.1}%", report.efficiency_gain());

    let top = report.top_categories(5);
    if !top.is_empty() {
        println!("\nTop categories:");
        for (category, count) in top {
            println!("  {:<20} {}", category.as_str(), count);
        }
    }

    for suggestion in report.suggestions() {
        println!("- {}", suggestion);
    }
}
