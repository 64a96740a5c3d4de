use futures::future::try_join_all;
use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.sendgrid.com";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("send to {email} rejected with status {status}")]
    Rejected { email: String, status: StatusCode },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

/// Client for the transactional email provider.
///
/// One send call per recipient; the provider owns delivery. No retries.
pub struct EmailClient {
    http: Client,
    api_key: String,
    api_base: String,
    sender_email: String,
    sender_name: String,
}

impl EmailClient {
    pub fn new(
        http: Client,
        api_key: impl Into<String>,
        sender_email: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            sender_email: sender_email.into(),
            sender_name: sender_name.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub async fn send(
        &self,
        to: &Recipient,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/v3/mail/send", self.api_base);
        let payload = json!({
            "personalizations": [{
                "to": [{ "email": to.email, "name": to.name }],
            }],
            "from": { "email": self.sender_email, "name": self.sender_name },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": html },
            ],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmailError::Rejected {
                email: to.email.clone(),
                status: response.status(),
            });
        }

        debug!(to = %to.email, subject, "notification email sent");
        Ok(())
    }

    /// Send one email per recipient, all issued concurrently. The first
    /// failure fails the whole batch; sends that already completed are not
    /// tracked or undone. When no HTML template is supplied the HTML body is
    /// the text body with newlines replaced by line breaks.
    pub async fn send_bulk(
        &self,
        recipients: &[Recipient],
        subject: &str,
        text_body: impl Fn(&Recipient) -> String,
        html_body: Option<&(dyn Fn(&Recipient) -> String + Sync)>,
    ) -> Result<(), EmailError> {
        let sends = recipients.iter().map(|recipient| {
            let text = text_body(recipient);
            let html = match html_body {
                Some(render) => render(recipient),
                None => text.replace('\n', "<br />"),
            };
            async move { self.send(recipient, subject, &text, &html).await }
        });

        try_join_all(sends).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer) -> EmailClient {
        EmailClient::new(Client::new(), "sg-key", "noreply@example.com", "Approvals")
            .with_api_base(server.uri())
    }

    fn recipient(email: &str, name: &str) -> Recipient {
        Recipient {
            email: email.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn send_posts_provider_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer sg-key"))
            .and(body_partial_json(serde_json::json!({
                "personalizations": [{
                    "to": [{ "email": "jo@example.com", "name": "Jo" }],
                }],
                "from": { "email": "noreply@example.com", "name": "Approvals" },
                "subject": "hello",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        client
            .send(&recipient("jo@example.com", "Jo"), "hello", "body", "body")
            .await
            .expect("send succeeds");
    }

    #[tokio::test]
    async fn send_bulk_issues_one_call_per_recipient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(3)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let recipients = vec![
            recipient("a@example.com", "A"),
            recipient("b@example.com", "B"),
            recipient("c@example.com", "C"),
        ];

        client
            .send_bulk(
                &recipients,
                "subject",
                |r| format!("Hi {}", r.name),
                None,
            )
            .await
            .expect("all sends succeed");
    }

    #[tokio::test]
    async fn send_bulk_fails_when_any_send_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(body_partial_json(serde_json::json!({
                "personalizations": [{ "to": [{ "email": "bad@example.com" }] }],
            })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let recipients = vec![
            recipient("ok@example.com", "Ok"),
            recipient("bad@example.com", "Bad"),
        ];

        let err = client
            .send_bulk(&recipients, "subject", |_| "text".to_string(), None)
            .await
            .expect_err("batch should fail");

        match err {
            EmailError::Rejected { email, status } => {
                assert_eq!(email, "bad@example.com");
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn default_html_body_replaces_newlines() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(body_partial_json(serde_json::json!({
                "content": [
                    { "type": "text/plain", "value": "line one\nline two" },
                    { "type": "text/html", "value": "line one<br />line two" },
                ],
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        client
            .send_bulk(
                &[recipient("jo@example.com", "Jo")],
                "subject",
                |_| "line one\nline two".to_string(),
                None,
            )
            .await
            .expect("send succeeds");
    }

    #[tokio::test]
    async fn send_bulk_with_no_recipients_makes_no_calls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let client = make_client(&server);
        client
            .send_bulk(&[], "subject", |_| String::new(), None)
            .await
            .expect("empty batch succeeds");
    }
}
