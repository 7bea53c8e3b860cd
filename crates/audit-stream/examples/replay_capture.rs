//! Replays a captured audit stream through the consumer.
//!
//! ```text
//! cargo run -p audit-stream --example replay_capture -- capture.sse 17
//! ```
//!
//! Without a path a small built-in capture is used.

use audit_stream::prelude::*;
use audit_stream::source::ReplaySource;

const SAMPLE: &str = concat!(
    "event: progress\n",
    "data: {\"stage\":\"crawl\",\"status\":\"running\",\"progress\":20,\"message\":\"Fetching page\",\"timestamp\":\"2026-05-01T12:00:00Z\"}\n\n",
    "event: progress\n",
    "data: {\"stage\":\"lighthouse\",\"status\":\"running\",\"progress\":70,\"message\":\"Running Lighthouse\",\"timestamp\":\"2026-05-01T12:00:05Z\"}\n\n",
    "event: completed\n",
    "data: {\"result\":{\"url\":\"https://example.com\",\"audits\":[],\"summary\":{\"overallScore\":91}}}\n\n",
);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    audit_stream::init_observability();

    let mut args = std::env::args().skip(1);
    let capture = match args.next() {
        Some(path) => std::fs::read(path)?,
        None => SAMPLE.as_bytes().to_vec(),
    };
    let chunk_size = args.next().map(|s| s.parse::<usize>()).transpose()?.unwrap_or(13);

    let mut run = AuditRun::spawn(
        AuditStreamConsumer::new(StreamConfig::from_env()?),
        Session::generated(),
        StreamResponse::event_stream(ReplaySource::chunked(capture, chunk_size)),
    );

    while let Some(event) = run.next_event().await {
        match event {
            AuditRunEvent::Progress { notification, .. } => println!(
                "[{:>5.1}%] {:<20} {}",
                notification.progress, notification.stage, notification.message
            ),
            AuditRunEvent::Finished { outcome, .. } => match outcome {
                Outcome::Completed(result) => match result.report() {
                    Ok(report) => println!(
                        "completed: {} (overall score {})",
                        report.url, report.summary.overall_score
                    ),
                    Err(_) => println!("completed: {}", result.as_value()),
                },
                Outcome::Failed(failure) => eprintln!("failed: {failure}"),
                Outcome::Aborted => eprintln!("aborted"),
            },
            AuditRunEvent::Started { session_id } => println!("session {session_id}"),
        }
    }

    let _ = run.finish().await?;
    Ok(())
}
