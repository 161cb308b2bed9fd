//! Email notifications.
//!
//! The [`Notifier`] renders the branded templates for a request and hands
//! them to a [`Transport`]. Delivery failures are logged and reported back as
//! a [`Delivery`] value; they never abort the operation that triggered them.

mod template;
pub mod transport;

use std::path::PathBuf;

use tracing::instrument;

pub(crate) use template::escape;
use template::{Branding, Rendered};
pub use transport::{Email, MemoryTransport, SmtpMailer, Transport, TransportError, Unconfigured};

use crate::{
    domain::{Config, Credentials, Request, SentEmail},
    storage::Uploads,
};

/// Picks the production transport for `config`.
///
/// SMTP credentials are read from the environment. If they are missing or
/// the relay cannot be set up, a warning is logged and every send fails, so
/// the failure is recorded on the request instead of stopping the desk.
#[must_use]
pub fn transport_from_env(config: &Config) -> Box<dyn Transport> {
    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::warn!("Email disabled: {e}");
            return Box::new(Unconfigured::new(e.to_string()));
        }
    };
    match SmtpMailer::new(config, credentials) {
        Ok(mailer) => Box::new(mailer),
        Err(e) => {
            tracing::warn!("Email disabled: {e}");
            Box::new(Unconfigured::new(e.to_string()))
        }
    }
}

/// Outcome of sending one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The transport accepted the message.
    Sent(SentEmail),
    /// The message could not be sent.
    Failed(String),
}

/// Renders and sends the desk's emails.
pub struct Notifier {
    transport: Box<dyn Transport>,
    staff: Vec<String>,
    organisation: String,
    logo: Option<PathBuf>,
    uploads: Uploads,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("staff", &self.staff)
            .field("organisation", &self.organisation)
            .field("logo", &self.logo)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Creates a notifier sending through `transport`, with recipients and
    /// branding taken from `config`.
    #[must_use]
    pub fn new(config: &Config, transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            staff: config.staff_recipients.clone(),
            organisation: config.organisation.clone(),
            logo: config.logo.clone(),
            uploads: Uploads::new(config.upload_dir.clone()),
        }
    }

    /// Alert staff that `request` was submitted. The submission file is
    /// attached if it still exists.
    #[must_use]
    #[instrument(level = "debug", skip(self, request), fields(id = %request.id))]
    pub fn notify_new(&self, request: &Request) -> Delivery {
        if self.staff.is_empty() {
            tracing::debug!("No staff recipients configured, skipping alert");
            return Delivery::Failed("no staff recipients configured".to_string());
        }
        let rendered = template::new_request(request, self.branding());
        self.deliver(self.staff.clone(), rendered, request.attachment.iter())
    }

    /// Acknowledge receipt to the requester.
    #[must_use]
    #[instrument(level = "debug", skip(self, request), fields(id = %request.id))]
    pub fn notify_acknowledged(&self, request: &Request) -> Delivery {
        let rendered = template::acknowledgment(request, self.branding());
        self.deliver(
            vec![request.identity.mail.clone()],
            rendered,
            std::iter::empty(),
        )
    }

    /// Tell the requester their request was processed. Files added by
    /// administrators are attached if they still exist.
    #[must_use]
    #[instrument(level = "debug", skip(self, request), fields(id = %request.id))]
    pub fn notify_completed(&self, request: &Request) -> Delivery {
        let rendered = template::completed(request, self.branding());
        self.deliver(
            vec![request.identity.mail.clone()],
            rendered,
            request.attachments.iter(),
        )
    }

    fn branding(&self) -> Branding<'_> {
        Branding {
            organisation: &self.organisation,
            logo: self.logo_path().is_some(),
        }
    }

    fn logo_path(&self) -> Option<PathBuf> {
        self.logo.clone().filter(|path| path.is_file())
    }

    fn deliver<'a>(
        &self,
        to: Vec<String>,
        rendered: Rendered,
        keys: impl Iterator<Item = &'a String>,
    ) -> Delivery {
        let attachments = keys
            .filter_map(|key| {
                let path = self.uploads.path(key);
                if path.is_none() {
                    tracing::warn!("Attachment {key} is missing on disk, not attaching it");
                }
                path.map(|path| (attachment_name(key), path))
            })
            .collect();

        let Rendered {
            subject,
            text,
            html,
        } = rendered;
        let email = Email {
            to,
            subject,
            text,
            html,
            logo: self.logo_path(),
            attachments,
        };

        match self.transport.send(&email) {
            Ok(()) => {
                tracing::info!("Sent '{}' to {}", email.subject, email.to.join(", "));
                Delivery::Sent(SentEmail {
                    subject: email.subject,
                    text: email.text,
                    html: email.html,
                })
            }
            Err(e) => {
                tracing::error!("Failed to send '{}': {e}", email.subject);
                Delivery::Failed(e.to_string())
            }
        }
    }
}

/// The filename shown to recipients: the key without its id prefix.
fn attachment_name(key: &str) -> String {
    key.split_once('_')
        .map_or(key, |(_, name)| name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Identity, Submission};

    fn setup() -> (TempDir, Config, MemoryTransport, Notifier) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload_dir = tmp.path().join("uploads");
        config.staff_recipients = vec!["rh@example.com".to_string()];
        let transport = MemoryTransport::new();
        let notifier = Notifier::new(&config, Box::new(transport.clone()));
        (tmp, config, transport, notifier)
    }

    fn request() -> Request {
        Request::new(
            Uuid::new_v4(),
            Submission {
                identity: Identity {
                    nom: "Dupont".to_string(),
                    prenom: "Jean".to_string(),
                    telephone: "0102030405".to_string(),
                    mail: "jean.dupont@example.com".to_string(),
                },
                motif: "Stage".to_string(),
                details: String::new(),
            },
            Utc::now().fixed_offset(),
        )
    }

    #[test]
    fn new_request_goes_to_staff_with_submission_file() {
        let (_tmp, config, transport, notifier) = setup();
        let mut request = request();
        let key = Uploads::new(config.upload_dir)
            .store(request.id, "cv.pdf", b"pdf")
            .unwrap();
        request.attachment = Some(key);

        assert!(matches!(notifier.notify_new(&request), Delivery::Sent(_)));

        let sent = transport.sent();
        assert_eq!(sent[0].to, vec!["rh@example.com".to_string()]);
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].0, "cv.pdf");
    }

    #[test]
    fn acknowledgment_goes_to_requester() {
        let (_tmp, _config, transport, notifier) = setup();
        let delivery = notifier.notify_acknowledged(&request());

        assert!(matches!(delivery, Delivery::Sent(_)));

        let sent = transport.sent();
        assert_eq!(sent[0].to, vec!["jean.dupont@example.com".to_string()]);
        assert!(sent[0].attachments.is_empty());
    }

    #[test]
    fn completion_skips_missing_files() {
        let (_tmp, config, transport, notifier) = setup();
        let mut request = request();
        let uploads = Uploads::new(config.upload_dir);
        let kept = uploads.store(request.id, "convention.pdf", b"x").unwrap();
        let gone = uploads.store(request.id, "planning.pdf", b"y").unwrap();
        fs::remove_file(uploads.path(&gone).unwrap()).unwrap();
        request.attachments = vec![kept, gone];

        let Delivery::Sent(sent) = notifier.notify_completed(&request) else {
            panic!("expected the completion email to be sent");
        };
        assert!(sent.subject.contains("traitée"));

        let attachments = &transport.sent()[0].attachments;
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].0, "convention.pdf");
    }

    #[test]
    fn transport_failure_is_reported_not_raised() {
        let (_tmp, _config, transport, notifier) = setup();
        transport.fail_with(Some("connection refused"));

        let Delivery::Failed(message) = notifier.notify_completed(&request()) else {
            panic!("expected a failed delivery");
        };
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn no_staff_means_no_alert() {
        let (_tmp, mut config, transport, _notifier) = setup();
        config.staff_recipients.clear();
        let notifier = Notifier::new(&config, Box::new(transport.clone()));

        assert!(matches!(notifier.notify_new(&request()), Delivery::Failed(_)));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn attachment_name_drops_id_prefix() {
        let id = Uuid::new_v4();
        assert_eq!(attachment_name(&format!("{id}_cv_final.pdf")), "cv_final.pdf");
        assert_eq!(attachment_name("cv.pdf"), "cv.pdf");
    }
}
