use std::collections::BTreeSet;

use tilesync_seed::ChangeTracker;
use tilesync_state::{JobOutcome, RetilingLogEntry};

use super::Context;

pub fn show(ctx: &Context, catalog: &str, limit: usize) -> anyhow::Result<()> {
    let tracker = ChangeTracker::new(ctx.open_state(catalog)?);
    let watermark = tracker.watermark(catalog)?;
    let jobs = tracker.recent_jobs(catalog, limit)?;
    let unfinished = tracker.unfinished_jobs(catalog)?;

    if ctx.json() {
        let out = serde_json::json!({
            "catalog": catalog,
            "watermark": watermark,
            "jobs": jobs,
            "unfinished": unfinished,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match watermark {
        Some(at) => println!("{catalog}: last seed {at}"),
        None => println!("{catalog}: never seeded"),
    }
    if let Some(line) = unfinished_summary(&unfinished) {
        println!("{line}");
    }
    for job in &jobs {
        println!("  {}", format_job(job));
    }
    Ok(())
}

/// One line naming the processes that left jobs open, if any.
fn unfinished_summary(unfinished: &[RetilingLogEntry]) -> Option<String> {
    if unfinished.is_empty() {
        return None;
    }
    let pids: BTreeSet<u32> = unfinished.iter().map(|j| j.process_id).collect();
    let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
    Some(format!(
        "{} unfinished job(s) left by pid {}; the next delta run retries them",
        unfinished.len(),
        pids.join(", ")
    ))
}

fn format_job(job: &RetilingLogEntry) -> String {
    let state = match (&job.outcome, job.finished_at) {
        (Some(JobOutcome::Succeeded), Some(end)) => {
            format!("ok in {}s", (end - job.started_at).num_seconds())
        }
        (Some(JobOutcome::Failed { reason }), _) => format!("failed: {reason}"),
        _ => format!("unfinished (pid {})", job.process_id),
    };
    format!(
        "{} {:<6} {} {}",
        job.started_at.format("%Y-%m-%d %H:%M:%S"),
        job.mode.as_str(),
        job.tilecluster_id,
        state
    )
}
