//! Requests a deep audit and prints its progress.
//!
//! ```text
//! AUDIT_BASE_URL=http://localhost:3000 cargo run -p audit-stream --example stream_deep_audit -- https://example.com
//! ```
//!
//! Press Ctrl-C to abort the session.

use audit_stream::prelude::*;
use audit_stream::source::ReqwestSource;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    audit_stream::init_observability();

    let base_url =
        std::env::var("AUDIT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let target = std::env::args()
        .nth(1)
        .ok_or("usage: stream_deep_audit <url>")?;

    let response = reqwest::Client::new()
        .post(format!(
            "{}/api/audits/deep/progress",
            base_url.trim_end_matches('/')
        ))
        .json(&serde_json::json!({ "url": target }))
        .send()
        .await?;

    let mut run = AuditRun::spawn(
        AuditStreamConsumer::new(StreamConfig::from_env()?),
        Session::generated(),
        ReqwestSource::from_response(response),
    );
    let abort = run.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    while let Some(event) = run.next_event().await {
        if let AuditRunEvent::Progress { notification, .. } = event {
            println!(
                "[{:>5.1}%] {} {}",
                notification.progress, notification.stage, notification.message
            );
        }
    }

    let result = run.collect_result().await?;
    println!("{}", serde_json::to_string_pretty(result.as_value())?);
    Ok(())
}
