//! Outbound mail transports.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use lettre::{
    Message, SmtpTransport,
    message::{Attachment, Mailbox, MultiPart, header::ContentType},
    transport::smtp::authentication::Credentials as SmtpCredentials,
};

use crate::domain::{Config, Credentials};

/// A message ready to be handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Image embedded inline under the content id `logo`.
    pub logo: Option<PathBuf>,
    /// Files to attach, as (filename shown to the recipient, path on disk).
    pub attachments: Vec<(String, PathBuf)>,
}

/// Something that can deliver an [`Email`].
pub trait Transport: Send + Sync {
    /// Deliver the email, blocking until the transport accepts or rejects it.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or delivered.
    fn send(&self, email: &Email) -> Result<(), TransportError>;
}

/// Errors raised while building or delivering a message.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A sender or recipient address is malformed.
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    /// The SMTP session failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    /// An attachment or the logo could not be read.
    #[error("failed to read {path}: {source}")]
    Attachment {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The message has no recipient.
    #[error("no recipient")]
    NoRecipient,
    /// No transport is configured.
    #[error("mail transport is not configured: {0}")]
    Unconfigured(String),
}

/// Sends mail through an SMTP relay over implicit TLS.
pub struct SmtpMailer {
    sender: Mailbox,
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Build a mailer for the relay and sender in `config`.
    ///
    /// No connection is made until the first message is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address is malformed or the relay
    /// cannot be set up.
    pub fn new(config: &Config, credentials: Credentials) -> Result<Self, TransportError> {
        let sender = if config.sender.is_empty() {
            &credentials.username
        } else {
            &config.sender
        };
        let sender: Mailbox = sender.parse()?;

        let transport = SmtpTransport::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(SmtpCredentials::new(
                credentials.username,
                credentials.password,
            ))
            .build();

        Ok(Self { sender, transport })
    }

    fn build(&self, email: &Email) -> Result<Message, TransportError> {
        if email.to.is_empty() {
            return Err(TransportError::NoRecipient);
        }

        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(email.subject.clone());
        for to in &email.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }

        let alternative = MultiPart::alternative_plain_html(email.text.clone(), email.html.clone());
        let body = match &email.logo {
            Some(path) => MultiPart::related().multipart(alternative).singlepart(
                Attachment::new_inline("logo".to_string())
                    .body(read_file(path)?, content_type(path)),
            ),
            None => alternative,
        };

        let mut mixed = MultiPart::mixed().multipart(body);
        for (name, path) in &email.attachments {
            mixed = mixed.singlepart(
                Attachment::new(name.clone()).body(read_file(path)?, content_type(path)),
            );
        }

        Ok(builder.multipart(mixed)?)
    }
}

impl Transport for SmtpMailer {
    fn send(&self, email: &Email) -> Result<(), TransportError> {
        use lettre::Transport as _;

        let message = self.build(email)?;
        let response = self.transport.send(&message)?;
        tracing::debug!("SMTP relay answered {}", response.code());
        Ok(())
    }
}

/// A transport that always fails, used when no SMTP credentials are set.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    /// A transport failing with `reason`.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Transport for Unconfigured {
    fn send(&self, _email: &Email) -> Result<(), TransportError> {
        Err(TransportError::Unconfigured(self.reason.clone()))
    }
}

/// Keeps sent messages in memory instead of delivering them.
///
/// Clones share the same outbox. The transport can be switched to failing
/// mode to exercise error handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<Email>>>,
    failing: Arc<Mutex<Option<String>>>,
}

impl MemoryTransport {
    /// An empty, working transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with `reason`, or succeed again with
    /// `None`.
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.failing.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            reason.map(str::to_string);
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, email: &Email) -> Result<(), TransportError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(reason) = failing {
            return Err(TransportError::Unconfigured(reason));
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, TransportError> {
    fs::read(path).map_err(|source| TransportError::Attachment {
        path: path.to_path_buf(),
        source,
    })
}

fn content_type(path: &Path) -> ContentType {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let mime = match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}
