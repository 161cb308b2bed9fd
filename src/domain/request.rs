use std::{fmt, str::FromStr};

use borsh::BorshSerialize;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// An internship request submitted through the intake form.
///
/// A request is created with [`Status::NotProcessed`] and is later annotated
/// by an administrator, who eventually marks it [`Status::Processed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    /// Stable identifier, assigned at creation.
    pub id: Uuid,
    /// Who submitted the request.
    pub identity: Identity,
    /// Short reason for the request.
    pub motif: String,
    /// Free-text details.
    pub details: String,
    /// Upload key of the file sent with the original submission.
    pub attachment: Option<String>,
    /// Upload keys of files added by an administrator.
    pub attachments: Vec<String>,
    /// Lifecycle state.
    pub status: Status,
    /// Staff member the request is assigned to.
    pub assignee: String,
    /// Administrator comment, included in the completion email.
    pub comment: String,
    /// When the request was submitted, in the desk's time zone.
    pub created: DateTime<FixedOffset>,
    /// When the completion email was successfully sent.
    pub confirmation_sent: Option<DateTime<FixedOffset>>,
    /// Error reported by the last failed completion email.
    pub email_error: Option<String>,
    /// Content of the last completion email that was sent.
    pub sent_email: Option<SentEmail>,
    /// Whether the submission matched a previous one when it was created.
    pub duplicate: bool,
}

impl Request {
    /// Build a fresh, unprocessed request.
    #[must_use]
    pub fn new(id: Uuid, submission: Submission, created: DateTime<FixedOffset>) -> Self {
        let Submission {
            identity,
            motif,
            details,
        } = submission;

        Self {
            id,
            identity,
            motif,
            details,
            attachment: None,
            attachments: Vec::new(),
            status: Status::NotProcessed,
            assignee: String::new(),
            comment: String::new(),
            created,
            confirmation_sent: None,
            email_error: None,
            sent_email: None,
            duplicate: false,
        }
    }

    /// Returns the content fingerprint of this request.
    ///
    /// See [`Submission::fingerprint`].
    #[must_use]
    pub fn fingerprint(&self) -> String {
        ContentRef {
            identity: &self.identity,
            motif: &self.motif,
            details: &self.details,
        }
        .fingerprint()
    }

    /// Every upload key owned by this request, submission file first.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.attachment
            .iter()
            .chain(self.attachments.iter())
            .map(String::as_str)
    }

    /// Whether any of the searchable fields contains `needle`.
    ///
    /// `needle` must already be lower-cased.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        [
            &self.identity.nom,
            &self.identity.prenom,
            &self.identity.mail,
            &self.motif,
            &self.details,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Identity and contact details of the requester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Family name.
    pub nom: String,
    /// Given name.
    pub prenom: String,
    /// Phone number.
    pub telephone: String,
    /// Email address, used for acknowledgment and completion mail.
    pub mail: String,
}

/// The fields of a new submission, as entered in the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Who is submitting.
    pub identity: Identity,
    /// Short reason for the request.
    pub motif: String,
    /// Free-text details.
    pub details: String,
}

impl Submission {
    /// Calculate the fingerprint of this submission.
    ///
    /// The fingerprint is a SHA256 hash of the Borsh-serialized, lower-cased
    /// name, surname, email, motif and details. Two submissions that differ
    /// only in letter case share a fingerprint. The phone number does not
    /// contribute.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        ContentRef {
            identity: &self.identity,
            motif: &self.motif,
            details: &self.details,
        }
        .fingerprint()
    }
}

#[derive(Debug, Clone, Copy)]
struct ContentRef<'a> {
    identity: &'a Identity,
    motif: &'a str,
    details: &'a str,
}

impl ContentRef<'_> {
    /// # Panics
    ///
    /// Panics if borsh serialization fails (which should never happen for this
    /// data structure).
    fn fingerprint(&self) -> String {
        #[derive(BorshSerialize)]
        struct FingerprintData {
            nom: String,
            prenom: String,
            mail: String,
            motif: String,
            details: String,
        }

        let data = FingerprintData {
            nom: self.identity.nom.to_lowercase(),
            prenom: self.identity.prenom.to_lowercase(),
            mail: self.identity.mail.to_lowercase(),
            motif: self.motif.to_lowercase(),
            details: self.details.to_lowercase(),
        };

        // encode using [borsh](https://borsh.io/)
        let encoded = borsh::to_vec(&data).expect("this should never fail");

        let hash = Sha256::digest(encoded);

        format!("{hash:x}")
    }
}

/// Lifecycle state of a request.
///
/// The only transition is from [`Status::NotProcessed`] to
/// [`Status::Processed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    /// Waiting for an administrator (`Non traité`).
    #[default]
    #[serde(rename = "Non traité")]
    NotProcessed,
    /// Handled; the requester has been (or should have been) notified
    /// (`Traité`).
    #[serde(rename = "Traité")]
    Processed,
}

impl Status {
    /// The label shown to users and stored on disk.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotProcessed => "Non traité",
            Self::Processed => "Traité",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = InvalidStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Non traité" | "Non traite" | "not-processed" | "not_processed" => {
                Ok(Self::NotProcessed)
            }
            "Traité" | "Traite" | "processed" => Ok(Self::Processed),
            other => Err(InvalidStatusError(other.to_string())),
        }
    }
}

/// Error returned when a status label is not recognised.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown status '{0}': expected 'Non traité' or 'Traité'")]
pub struct InvalidStatusError(String);

/// Content of an email that was handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentEmail {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// HTML body.
    pub html: String,
}

/// Changes an administrator applies to a request.
///
/// `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestUpdate {
    /// New assignee.
    pub assignee: Option<String>,
    /// Requested status.
    pub status: Option<Status>,
    /// New comment.
    pub comment: Option<String>,
    /// Corrected requester email address.
    pub mail: Option<String>,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn submission(nom: &str, motif: &str) -> Submission {
        Submission {
            identity: Identity {
                nom: nom.to_string(),
                prenom: "Jean".to_string(),
                telephone: "0102030405".to_string(),
                mail: "jean.dupont@example.com".to_string(),
            },
            motif: motif.to_string(),
            details: "Stage de trois mois".to_string(),
        }
    }

    #[test]
    fn fingerprint_ignores_case() {
        let lower = submission("dupont", "stage");
        let upper = submission("DUPONT", "STAGE");
        assert_eq!(lower.fingerprint(), upper.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_phone_number() {
        let first = submission("Dupont", "Stage");
        let mut second = first.clone();
        second.identity.telephone = "0999999999".to_string();
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn motif_affects_fingerprint() {
        assert_ne!(
            submission("Dupont", "Stage").fingerprint(),
            submission("Dupont", "Alternance").fingerprint()
        );
    }

    #[test]
    fn field_boundaries_affect_fingerprint() {
        let mut first = submission("Dupont", "Stage");
        first.identity.nom = "ab".to_string();
        first.identity.prenom = "c".to_string();
        let mut second = first.clone();
        second.identity.nom = "a".to_string();
        second.identity.prenom = "bc".to_string();
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn request_fingerprint_matches_submission() {
        let submission = submission("Dupont", "Stage");
        let request = Request::new(
            Uuid::new_v4(),
            submission.clone(),
            chrono::Utc::now().fixed_offset(),
        );
        assert_eq!(request.fingerprint(), submission.fingerprint());
    }

    #[test]
    fn new_request_is_not_processed() {
        let request = Request::new(
            Uuid::new_v4(),
            submission("Dupont", "Stage"),
            chrono::Utc::now().fixed_offset(),
        );
        assert_eq!(request.status, Status::NotProcessed);
        assert!(request.comment.is_empty());
        assert!(request.files().next().is_none());
    }

    #[test]
    fn matches_is_case_insensitive_substring() {
        let request = Request::new(
            Uuid::new_v4(),
            submission("Dupont", "Stage"),
            chrono::Utc::now().fixed_offset(),
        );
        assert!(request.matches("dupo"));
        assert!(request.matches("example.com"));
        assert!(!request.matches("martin"));
    }

    #[test_case("Non traité", Status::NotProcessed; "french not processed")]
    #[test_case("Traité", Status::Processed; "french processed")]
    #[test_case("processed", Status::Processed; "english processed")]
    #[test_case(" Traité ", Status::Processed; "surrounding whitespace")]
    fn status_parses(input: &str, expected: Status) {
        assert_eq!(input.parse::<Status>().unwrap(), expected);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("En cours".parse::<Status>().is_err());
    }

    #[test]
    fn status_label_round_trips() {
        for status in [Status::NotProcessed, Status::Processed] {
            assert_eq!(status.to_string().parse::<Status>().unwrap(), status);
        }
    }
}
