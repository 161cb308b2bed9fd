//! On-disk JSON shape of the request collection.
//!
//! The document has had two shapes. The legacy shape is a bare list of
//! requests. The current shape is an object tagged with `_version`. Both are
//! readable; only the current shape is written.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, de::IgnoredAny};
use uuid::Uuid;

use crate::domain::{ArchiveEntry, Collection, Identity, Request, SentEmail, Status};

/// Date format used by the legacy document, in the desk's local time.
const LEGACY_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// A decoded document.
#[derive(Debug)]
pub struct Decoded {
    /// The collection the document holds.
    pub collection: Collection,
    /// Whether the document was in the legacy shape.
    pub legacy: bool,
}

/// Errors that can occur when decoding the document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The document is not valid JSON in any known shape.
    #[error("malformed request document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a document in either shape.
///
/// Legacy dates are interpreted in `tz`.
///
/// # Errors
///
/// Returns an error if the bytes are not a document in a known shape.
pub fn decode(bytes: &[u8], tz: Tz) -> Result<Decoded, DocumentError> {
    match serde_json::from_slice::<Shape>(bytes)? {
        Shape::Legacy(stored) => {
            let requests = stored
                .into_iter()
                .map(|request| request.into_request(tz))
                .collect::<Vec<_>>();
            let processed = requests
                .iter()
                .filter(|request| request.status == Status::Processed)
                .count() as u64;
            Ok(Decoded {
                collection: Collection::from_parts(requests, processed, Vec::new(), 0),
                legacy: true,
            })
        }
        Shape::Current(DocumentVersion::V1 {
            revision,
            demandes,
            traitees,
            archives,
        }) => {
            let requests = demandes
                .into_iter()
                .map(|request| request.into_request(tz))
                .collect();
            let archive = archives
                .into_iter()
                .map(|entry| entry.into_entry(tz))
                .collect();
            Ok(Decoded {
                collection: Collection::from_parts(requests, traitees, archive, revision),
                legacy: false,
            })
        }
    }
}

/// The revision recorded in a document, without decoding the requests.
///
/// Legacy documents are at revision 0.
///
/// # Errors
///
/// Returns an error if the bytes are not a document in a known shape.
pub fn revision(bytes: &[u8]) -> Result<u64, DocumentError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Header {
        Legacy(#[allow(dead_code)] Vec<IgnoredAny>),
        Current {
            #[serde(default)]
            revision: u64,
        },
    }

    Ok(match serde_json::from_slice::<Header>(bytes)? {
        Header::Legacy(_) => 0,
        Header::Current { revision } => revision,
    })
}

/// Encode a collection in the current shape, indented by four spaces.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(collection: &Collection) -> Result<Vec<u8>, serde_json::Error> {
    let document = DocumentVersion::V1 {
        revision: collection.revision(),
        demandes: collection
            .requests()
            .iter()
            .cloned()
            .map(StoredRequest::from)
            .collect(),
        traitees: collection.processed_count(),
        archives: collection
            .archive()
            .iter()
            .cloned()
            .map(StoredArchiveEntry::from)
            .collect(),
    };

    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    document.serialize(&mut serializer)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Shape {
    Legacy(Vec<StoredRequest>),
    Current(DocumentVersion),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum DocumentVersion {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        revision: u64,
        #[serde(default)]
        demandes: Vec<StoredRequest>,
        #[serde(default)]
        traitees: u64,
        #[serde(default)]
        archives: Vec<StoredArchiveEntry>,
    },
}

/// A request as stored on disk.
///
/// Field names are kept from the legacy format so that old documents load
/// unchanged. Fields added later default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRequest {
    id: Uuid,
    #[serde(default)]
    nom: String,
    #[serde(default)]
    prenom: String,
    #[serde(default)]
    telephone: String,
    #[serde(default)]
    mail: String,
    #[serde(default)]
    motif: String,
    #[serde(default)]
    details: String,
    #[serde(default)]
    date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fichier: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fichiers: Vec<String>,
    #[serde(default)]
    attribution: String,
    #[serde(default)]
    statut: String,
    #[serde(default)]
    commentaire: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confirmation_envoyee: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    erreur_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email_envoye: Option<StoredEmail>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    doublon: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEmail {
    sujet: String,
    texte: String,
    html: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredArchiveEntry {
    empreinte: String,
    date_archivage: DateTime<FixedOffset>,
    demande: StoredRequest,
}

impl StoredRequest {
    fn into_request(self, tz: Tz) -> Request {
        let Self {
            id,
            nom,
            prenom,
            telephone,
            mail,
            motif,
            details,
            date,
            fichier,
            fichiers,
            attribution,
            statut,
            commentaire,
            confirmation_envoyee,
            erreur_email,
            email_envoye,
            doublon,
        } = self;

        let created = parse_date(&date, tz).unwrap_or_else(|| {
            tracing::warn!("Request {id}: unreadable date '{date}', using the epoch");
            DateTime::<Utc>::UNIX_EPOCH.with_timezone(&tz).fixed_offset()
        });

        let status = statut.parse().unwrap_or_else(|e| {
            tracing::warn!("Request {id}: {e}, treating as not processed");
            Status::NotProcessed
        });

        Request {
            id,
            identity: Identity {
                nom,
                prenom,
                telephone,
                mail,
            },
            motif,
            details,
            attachment: fichier,
            attachments: fichiers,
            status,
            assignee: attribution,
            comment: commentaire,
            created,
            confirmation_sent: confirmation_envoyee,
            email_error: erreur_email,
            sent_email: email_envoye.map(|StoredEmail { sujet, texte, html }| SentEmail {
                subject: sujet,
                text: texte,
                html,
            }),
            duplicate: doublon,
        }
    }
}

impl From<Request> for StoredRequest {
    fn from(request: Request) -> Self {
        let Request {
            id,
            identity:
                Identity {
                    nom,
                    prenom,
                    telephone,
                    mail,
                },
            motif,
            details,
            attachment,
            attachments,
            status,
            assignee,
            comment,
            created,
            confirmation_sent,
            email_error,
            sent_email,
            duplicate,
        } = request;

        Self {
            id,
            nom,
            prenom,
            telephone,
            mail,
            motif,
            details,
            date: created.to_rfc3339(),
            fichier: attachment,
            fichiers: attachments,
            attribution: assignee,
            statut: status.label().to_string(),
            commentaire: comment,
            confirmation_envoyee: confirmation_sent,
            erreur_email: email_error,
            email_envoye: sent_email.map(|SentEmail { subject, text, html }| StoredEmail {
                sujet: subject,
                texte: text,
                html,
            }),
            doublon: duplicate,
        }
    }
}

impl StoredArchiveEntry {
    fn into_entry(self, tz: Tz) -> ArchiveEntry {
        ArchiveEntry {
            fingerprint: self.empreinte,
            archived: self.date_archivage,
            request: self.demande.into_request(tz),
        }
    }
}

impl From<ArchiveEntry> for StoredArchiveEntry {
    fn from(entry: ArchiveEntry) -> Self {
        Self {
            empreinte: entry.fingerprint,
            date_archivage: entry.archived,
            demande: entry.request.into(),
        }
    }
}

/// Parse an RFC 3339 timestamp, or a legacy `dd/mm/YYYY HH:MM` local time in
/// `tz`.
fn parse_date(date: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(date) {
        return Some(datetime);
    }
    let naive = NaiveDateTime::parse_from_str(date.trim(), LEGACY_DATE_FORMAT).ok()?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|datetime| datetime.fixed_offset())
}
