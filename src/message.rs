use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::config::Config;

const SUBJECT_PREFIX: &str = "Mail Delivered - ";
const TIMESTAMP_FORMAT: &str = "%b %-d, %Y at %-I:%M %p %Z";
const BODY: &str = "You've got mail in your mailbox!\n\n\
This notification was sent from your home mailbox system.\n\n\
Best regards,\nYour Mailbox";

/// A single notification, ready to hand to the delivery driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
    /// Bare address used for authentication and `MAIL FROM`.
    pub sender: String,
    pub recipients: Vec<String>,
}

impl OutboundMessage {
    /// Renders the header block, a blank line and the body, CRLF terminated.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out.push_str("\r\n");
        out.into_bytes()
    }
}

pub fn compose(config: &Config, now: DateTime<Utc>) -> OutboundMessage {
    let subject = format!("{SUBJECT_PREFIX}{}", format_timestamp(now, &config.timezone));

    let headers = vec![
        ("From", config.email_from.clone()),
        ("To", config.email_to.join(",")),
        ("Subject", subject.clone()),
        ("MIME-Version", "1.0".to_string()),
        ("Content-Type", "text/plain; charset=UTF-8".to_string()),
    ];

    OutboundMessage {
        subject,
        body: BODY.to_string(),
        headers,
        sender: sender_address(&config.email_from).to_string(),
        recipients: config.email_to.clone(),
    }
}

/// Formats `now` in the named zone, falling back to UTC when the zone
/// cannot be resolved.
pub fn format_timestamp(now: DateTime<Utc>, timezone: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => now.with_timezone(&tz).format(TIMESTAMP_FORMAT).to_string(),
        Err(err) => {
            warn!(timezone, error = %err, "failed to load timezone, falling back to UTC");
            now.format(TIMESTAMP_FORMAT).to_string()
        }
    }
}

/// Pulls `addr` out of `Display Name <addr>`; anything without a `<` is
/// returned unchanged.
pub fn sender_address(from: &str) -> &str {
    match from.split('<').nth(1) {
        Some(rest) => {
            let rest = rest.trim_end();
            rest.strip_suffix('>').unwrap_or(rest)
        }
        None => from,
    }
}
