//! Template-slug + variables -> outbound email. Delivery is fire-and-forget:
//! failures are logged, never retried and never surfaced to the caller.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EmailConfig;

pub type Variables = HashMap<&'static str, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Replaces `{{name}}` / `{{ name }}` placeholders. Unknown placeholders are
/// left in place so a broken template is visible in the delivered mail.
pub fn render_template(template: &str, vars: &Variables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                warn!(placeholder = name, "Unknown template placeholder");
                out.push_str(&rest[start..start + 2 + end + 2]);
            }
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    id: String,
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct EmailService {
    pool: MySqlPool,
    client: reqwest::Client,
    config: Option<EmailConfig>,
}

impl EmailService {
    pub fn new(pool: MySqlPool, config: Option<EmailConfig>) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Looks up the recipient's email by profile id and delivers in the
    /// background. Returns immediately.
    pub fn dispatch_to_profile(&self, slug: &'static str, profile_id: u64, vars: Variables) {
        if self.config.is_none() {
            debug!(slug, "Email delivery disabled, skipping");
            return;
        }

        let service = self.clone();
        actix_web::rt::spawn(async move {
            let email = sqlx::query_scalar::<_, String>("SELECT email FROM profiles WHERE id = ?")
                .bind(profile_id)
                .fetch_optional(&service.pool)
                .await;

            match email {
                Ok(Some(to)) => {
                    if let Err(e) = service.send(slug, &to, &vars).await {
                        error!(error = %e, slug, profile_id, "Email delivery failed");
                    }
                }
                Ok(None) => warn!(slug, profile_id, "No profile email, notification dropped"),
                Err(e) => error!(error = %e, slug, profile_id, "Failed to look up recipient"),
            }
        });
    }

    async fn send(&self, slug: &str, to: &str, vars: &Variables) -> anyhow::Result<()> {
        let Some(config) = &self.config else {
            return Ok(());
        };

        let (subject, body) = sqlx::query_as::<_, (String, String)>(
            "SELECT subject, body FROM email_templates WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("email template '{slug}' not found"))?;

        let rendered = RenderedEmail {
            subject: render_template(&subject, vars),
            body: render_template(&body, vars),
        };

        let message = OutboundMessage {
            id: Uuid::new_v4().to_string(),
            from: &config.from,
            to,
            subject: &rendered.subject,
            text: &rendered.body,
        };

        self.client
            .post(&config.api_url)
            .bearer_auth(&config.api_key)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;

        info!(slug, to, message_id = %message.id, "Email sent");
        Ok(())
    }
}
