//! Webhook announcements
//!
//! Posts push start/finish/abort to a chat webhook. Delivery is best
//! effort: a failed notification is logged and never touches the push.

use std::time::Duration;

use tracing::warn;

use fleetpush_core::{EventBus, Phase, Stage};

/// Subscribe start/finish/abort announcements
pub fn register(events: &mut EventBus, webhook_url: String, push_id: String, summary: String) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default();

    {
        let client = client.clone();
        let url = webhook_url.clone();
        let push_id = push_id.clone();
        events.subscribe(Phase::Push, Stage::Began, move |_| {
            post(&client, &url, format!("push \"{push_id}\" started: {summary}"));
        });
    }

    {
        let client = client.clone();
        let url = webhook_url.clone();
        let push_id = push_id.clone();
        events.subscribe(Phase::Push, Stage::Ended, move |_| {
            post(&client, &url, format!("push \"{push_id}\" complete"));
        });
    }

    events.subscribe(Phase::Push, Stage::Aborted, move |payload| {
        let detail = payload
            .error
            .map_or_else(String::new, |error| format!(": {error}"));
        post(
            &client,
            &webhook_url,
            format!("push \"{push_id}\" aborted{detail}"),
        );
    });
}

/// Deliver one message before returning, so an announcement can't be lost
/// to process exit. Failures are the notifier's problem alone.
fn post(client: &reqwest::Client, url: &str, text: String) {
    let request = client.post(url).json(&serde_json::json!({ "text": text }));

    let outcome = tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(async { request.send().await })
    });

    match outcome {
        Ok(response) if !response.status().is_success() => {
            warn!(status = %response.status(), "webhook rejected notification");
        }
        Ok(_) => {}
        Err(error) => {
            warn!(error = %error, "webhook notification failed");
        }
    }
}
