//! Private message composition and sending
//!
//! Messages are composed through [`Client::new_message`] (which enforces
//! the session requirement) and delivered with [`PrivateMessage::send`].
//!
//! [`Client::new_message`]: crate::Client::new_message

use crate::amc::ModulePayload;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::user::RegisteredUser;

/// A private message to another registered account
#[derive(Clone, Debug)]
pub struct PrivateMessage {
    client: Client,
    recipient: RegisteredUser,
    subject: String,
    body: String,
    sent: bool,
}

impl PrivateMessage {
    pub(crate) fn new(
        client: Client,
        recipient: RegisteredUser,
        subject: String,
        body: String,
    ) -> Self {
        Self {
            client,
            recipient,
            subject,
            body,
            sent: false,
        }
    }

    /// The message recipient
    pub fn recipient(&self) -> &RegisteredUser {
        &self.recipient
    }

    /// The message subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The message body source
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether this message was delivered
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Deliver the message
    ///
    /// A `no_permission` answer means this recipient does not accept
    /// private messages from the logged-in account and surfaces as
    /// [`Error::Forbidden`].
    pub async fn send(&mut self) -> Result<()> {
        let recipient_id = self
            .recipient
            .id
            .ok_or_else(|| Error::Other("recipient has no account id".to_string()))?;

        let payload = ModulePayload::empty_module()
            .field("source", &self.body)
            .field("subject", &self.subject)
            .field("to_user_id", recipient_id)
            .field("action", "DashboardMessageAction")
            .field("event", "send");

        match self.client.module_call(&payload).await {
            Ok(_) => {
                self.sent = true;
                tracing::debug!(recipient = %self.recipient.name, "private message sent");
                Ok(())
            }
            Err(Error::Amc(e)) if e.status() == Some("no_permission") => Err(Error::Forbidden(
                "this recipient does not accept private messages from you".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EndpointConfig};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recipient(id: Option<u64>) -> RegisteredUser {
        RegisteredUser {
            id,
            name: "Bob".to_string(),
            unix_name: "bob".to_string(),
            registered: None,
            pro: false,
            karma: None,
        }
    }

    async fn logged_in_client(server: &MockServer) -> Client {
        Mock::given(method("POST"))
            .and(path("/default--flow/login__LoginPopupScreen"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "WIKIDOT_SESSION_ID=sess-pm; Path=/"),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("DSAccountModule"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status": "ok"}"#))
            .mount(server)
            .await;

        let mut config = Config::default();
        config.endpoints = EndpointConfig {
            host_override: Some(Url::parse(&server.uri()).unwrap()),
            ..EndpointConfig::default()
        };
        config.retry.attempt_limit = 2;
        config.retry.wait_time = Duration::from_millis(5);
        let client = Client::new(config).unwrap();
        client.login("alice", "hunter2").await.unwrap();
        client
    }

    #[tokio::test]
    async fn send_marks_the_message_and_posts_the_fields() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("event=send"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status": "ok"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let mut message = client
            .new_message(&recipient(Some(9)), "hello", "message body")
            .await
            .unwrap();
        assert!(!message.is_sent());
        message.send().await.unwrap();
        assert!(message.is_sent());

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests.last().unwrap().body.clone()).unwrap();
        assert!(body.contains("to_user_id=9"));
        assert!(body.contains("action=DashboardMessageAction"));
        assert!(body.contains("subject=hello"));
    }

    #[tokio::test]
    async fn refused_recipient_surfaces_as_forbidden() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("event=send"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status": "no_permission"}"#),
            )
            .mount(&server)
            .await;

        let mut message = client
            .new_message(&recipient(Some(9)), "hello", "message body")
            .await
            .unwrap();
        let result = message.send().await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
        assert!(!message.is_sent());
    }

    #[tokio::test]
    async fn recipient_without_id_cannot_be_addressed() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;
        let mut message = client
            .new_message(&recipient(None), "hello", "message body")
            .await
            .unwrap();
        assert!(matches!(message.send().await, Err(Error::Other(_))));
    }
}
