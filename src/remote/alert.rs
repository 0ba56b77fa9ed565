use std::time::Duration;

use anyhow::{bail, Result};
use log::{error, info, warn};
use serde_json::json;

use crate::detection::RegionFlags;

use super::models::DeviceId;
use super::store::{alert_body, AlertSender};

const ALERT_TITLE: &str = "Pressure warning";

/// Writes alerts to the log. Used when no push endpoint is configured.
#[derive(Debug, Default)]
pub struct LogAlertSender;

impl AlertSender for LogAlertSender {
    fn notify(&self, device_id: DeviceId, exceeded: &RegionFlags) -> bool {
        warn!("[device {device_id}] {ALERT_TITLE}: {}", alert_body(exceeded));
        true
    }
}

/// Posts `{topic, title, body}` as JSON to a push relay.
pub struct WebhookAlertSender {
    url: String,
    agent: ureq::Agent,
}

impl WebhookAlertSender {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("webhook url must start with http:// or https://, got '{url}'");
        }
        Ok(Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }
}

impl AlertSender for WebhookAlertSender {
    fn notify(&self, device_id: DeviceId, exceeded: &RegionFlags) -> bool {
        let payload = json!({
            "topic": device_id.to_string(),
            "title": ALERT_TITLE,
            "body": alert_body(exceeded),
        });
        match self.agent.post(&self.url).send_json(payload) {
            Ok(_) => {
                info!("Alert sent for device {device_id}");
                true
            }
            Err(ureq::Error::Status(code, _)) => {
                error!("Alert for device {device_id} rejected with HTTP {code}");
                false
            }
            Err(err) => {
                error!("Alert for device {device_id} failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_server::serve;

    #[test]
    fn webhook_posts_topic_title_and_body() {
        let server = serve(vec![(200, "{}".to_string())]);
        let sender = WebhookAlertSender::new(&server.url, Duration::from_secs(5)).unwrap();
        let flags = RegionFlags {
            occiput: true,
            ..RegionFlags::default()
        };
        assert!(sender.notify(7, &flags));

        let requests = server.requests();
        assert!(requests[0].starts_with("POST / "));
        assert!(requests[0].contains("\"topic\":\"7\""));
        assert!(requests[0].contains("Pressure limit exceeded: occiput"));
    }

    #[test]
    fn webhook_failure_reports_false() {
        let server = serve(vec![(503, "{}".to_string())]);
        let sender = WebhookAlertSender::new(&server.url, Duration::from_secs(5)).unwrap();
        assert!(!sender.notify(7, &RegionFlags::default()));
        server.requests();
    }

    #[test]
    fn log_sender_always_succeeds() {
        assert!(LogAlertSender.notify(1, &RegionFlags::default()));
    }
}
