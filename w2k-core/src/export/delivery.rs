//! Delivery of packaged artifacts to the reader's device
//!
//! After a job is packaged the queue can hand the artifact to a
//! [`Deliverer`]: a Discord-style webhook or an SMTP relay mailing the
//! book to a Kindle address.

use crate::error::DeliveryError;
use crate::types::{ChapterRange, JobId};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::multipart::{Form, Part};
use serde::Serialize;

/// MIME type of delivered books
pub const EPUB_MIME: &str = "application/epub+zip";

/// File name delivered books are attached as
pub const ATTACHMENT_NAME: &str = "book.epub";

/// A packaged book ready to be sent
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: JobId,
    pub book_name: String,
    pub range: ChapterRange,
    pub data: Vec<u8>,
}

/// Collaborator sending a packaged artifact somewhere outside the library
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Short name of the transport, used in logs and events
    fn name(&self) -> &str;

    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct WebhookEmbed {
    title: String,
    #[serde(rename = "type")]
    kind: &'static str,
    description: String,
    color: u32,
}

/// Body of the `payload_json` part posted alongside the file
#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: &'static str,
    embeds: Vec<WebhookEmbed>,
}

impl WebhookMessage {
    fn for_delivery(delivery: &Delivery) -> Self {
        Self {
            content: "Your book is ready!",
            embeds: vec![WebhookEmbed {
                title: delivery.book_name.clone(),
                kind: "file",
                description: format!(
                    "From chapter {} to chapter {}",
                    delivery.range.from, delivery.range.to
                ),
                color: 0x91288a,
            }],
        }
    }
}

/// Posts the book as a multipart upload to a webhook (Discord compatible)
pub struct WebhookDeliverer {
    client: reqwest::Client,
    url: String,
}

impl WebhookDeliverer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    fn form(delivery: &Delivery) -> Result<Form, DeliveryError> {
        let file = Part::bytes(delivery.data.clone())
            .file_name(ATTACHMENT_NAME)
            .mime_str(EPUB_MIME)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let payload = serde_json::to_string(&WebhookMessage::for_delivery(delivery))
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(Form::new()
            .part(ATTACHMENT_NAME, file)
            .part("payload_json", Part::text(payload)))
    }
}

#[async_trait]
impl Deliverer for WebhookDeliverer {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .multipart(Self::form(delivery)?)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected(format!("webhook answered {}", status)))
        }
    }
}

/// SMTP relay settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    /// Relay host, reached with STARTTLS
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address
    pub from: String,
    /// Kindle address receiving the books
    pub send_to: String,
}

/// Mails the book as an attachment through an SMTP relay
pub struct SmtpDeliverer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpDeliverer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, DeliveryError> {
        let from = format!("Wuxia2Kindle <{}>", settings.from)
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::Config(format!("sender address: {}", e)))?;
        let to = format!("Kindle <{}>", settings.send_to)
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::Config(format!("recipient address: {}", e)))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
            .map_err(|e| DeliveryError::Config(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self { mailer, from, to })
    }

    /// Build the mail carrying the book
    pub fn message(&self, delivery: &Delivery) -> Result<Message, DeliveryError> {
        let content_type =
            ContentType::parse(EPUB_MIME).map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let attachment =
            Attachment::new(ATTACHMENT_NAME.to_string()).body(delivery.data.clone(), content_type);

        Message::builder()
            .from(self.from.clone())
            .reply_to(self.from.clone())
            .to(self.to.clone())
            .subject(format!(
                "{} ({}-{})",
                delivery.book_name, delivery.range.from, delivery.range.to
            ))
            .singlepart(attachment)
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Deliverer for SmtpDeliverer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let message = self.message(delivery)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }
}
