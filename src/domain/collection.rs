//! In-memory collection of requests.
//!
//! The [`Collection`] knows nothing about the filesystem or about email. It
//! holds the active requests in submission order, the archive of deleted
//! requests and a queue of [`Event`]s describing what happened, which the
//! caller drains to send notifications.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::request::{Request, RequestUpdate, Status};

/// A deleted request, kept for history and duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// Content fingerprint of the request at deletion time.
    pub fingerprint: String,
    /// When the request was deleted.
    pub archived: DateTime<FixedOffset>,
    /// Snapshot of the request. Its files no longer exist on disk.
    pub request: Request,
}

/// Something that happened to a request and may warrant a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A new request was submitted.
    Submitted(Uuid),
    /// A request was marked processed for the first time.
    Completed(Uuid),
}

/// The set of requests, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    requests: Vec<Request>,
    processed: u64,
    archive: Vec<ArchiveEntry>,
    revision: u64,
    events: Vec<Event>,
}

impl Collection {
    /// Reassemble a collection from its stored parts.
    ///
    /// No events are pending on a freshly loaded collection.
    #[must_use]
    pub const fn from_parts(
        requests: Vec<Request>,
        processed: u64,
        archive: Vec<ArchiveEntry>,
        revision: u64,
    ) -> Self {
        Self {
            requests,
            processed,
            archive,
            revision,
            events: Vec::new(),
        }
    }

    /// Active requests, oldest first.
    #[must_use]
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Deleted requests, oldest deletion first.
    #[must_use]
    pub fn archive(&self) -> &[ArchiveEntry] {
        &self.archive
    }

    /// How many requests have ever been marked processed.
    #[must_use]
    pub const fn processed_count(&self) -> u64 {
        self.processed
    }

    /// The revision this collection was loaded at.
    ///
    /// The store bumps it on every save and refuses to save over a newer
    /// revision.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) const fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Look up a request by id.
    #[must_use]
    pub fn find(&self, id: Uuid) -> Option<&Request> {
        self.requests.iter().find(|request| request.id == id)
    }

    /// Look up a request by id, mutably.
    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut Request> {
        self.requests.iter_mut().find(|request| request.id == id)
    }

    /// Whether an active request already uses `id`.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.find(id).is_some()
    }

    /// Generate an id that no active request uses.
    #[must_use]
    pub fn fresh_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.contains(id) {
                return id;
            }
        }
    }

    /// Whether a submission with this fingerprint was seen before, either
    /// among the active requests or in the archive.
    #[must_use]
    pub fn is_duplicate(&self, fingerprint: &str) -> bool {
        self.requests
            .iter()
            .any(|request| request.fingerprint() == fingerprint)
            || self
                .archive
                .iter()
                .any(|entry| entry.fingerprint == fingerprint)
    }

    /// Append a new request and queue a [`Event::Submitted`].
    ///
    /// # Panics
    ///
    /// Panics if a request with the same id already exists.
    pub fn insert(&mut self, request: Request) {
        assert!(
            !self.contains(request.id),
            "Duplicate request id: {}",
            request.id
        );
        self.events.push(Event::Submitted(request.id));
        self.requests.push(request);
    }

    /// Apply an administrator update to a request.
    ///
    /// `attachments` are upload keys to add to the request; keys already
    /// attached are not listed twice.
    ///
    /// When the status moves from [`Status::NotProcessed`] to
    /// [`Status::Processed`], the processed counter is incremented and a
    /// [`Event::Completed`] is queued. Moving back to
    /// [`Status::NotProcessed`] is ignored.
    ///
    /// Returns `None` if no request has this id.
    #[instrument(level = "debug", skip(self, update, attachments))]
    pub fn apply_update(
        &mut self,
        id: Uuid,
        update: RequestUpdate,
        attachments: Vec<String>,
    ) -> Option<&Request> {
        let request = self.requests.iter_mut().find(|request| request.id == id)?;

        let RequestUpdate {
            assignee,
            status,
            comment,
            mail,
        } = update;

        if let Some(assignee) = assignee {
            request.assignee = assignee;
        }
        if let Some(comment) = comment {
            request.comment = comment;
        }
        if let Some(mail) = mail {
            request.identity.mail = mail;
        }
        for key in attachments {
            if !request.attachments.contains(&key) {
                request.attachments.push(key);
            }
        }

        let mut completed = false;
        match (request.status, status) {
            (Status::NotProcessed, Some(Status::Processed)) => {
                request.status = Status::Processed;
                completed = true;
            }
            (Status::Processed, Some(Status::NotProcessed)) => {
                tracing::warn!("Ignoring attempt to reopen processed request {id}");
            }
            _ => {}
        }

        if completed {
            self.processed += 1;
            self.events.push(Event::Completed(id));
        }

        self.find(id)
    }

    /// Detach an upload key from a request.
    ///
    /// Returns `None` if no request has this id, `Some(false)` if the key was
    /// not attached, and `Some(true)` if it was removed.
    pub fn detach(&mut self, id: Uuid, key: &str) -> Option<bool> {
        let request = self.find_mut(id)?;

        if let Some(position) = request.attachments.iter().position(|k| k == key) {
            request.attachments.remove(position);
            return Some(true);
        }
        if request.attachment.as_deref() == Some(key) {
            request.attachment = None;
            return Some(true);
        }
        Some(false)
    }

    /// Remove a request from the active list and move it to the archive.
    ///
    /// Returns the archive entry, or `None` if no request has this id.
    pub fn archive_request(
        &mut self,
        id: Uuid,
        archived: DateTime<FixedOffset>,
    ) -> Option<&ArchiveEntry> {
        let position = self.requests.iter().position(|request| request.id == id)?;
        let request = self.requests.remove(position);
        self.archive.push(ArchiveEntry {
            fingerprint: request.fingerprint(),
            archived,
            request,
        });
        self.archive.last()
    }

    /// Archived requests whose name, surname, email, motif or details contain
    /// `query`, ignoring case. An empty query matches everything.
    pub fn search_archive<'a>(
        &'a self,
        query: &str,
    ) -> impl Iterator<Item = &'a ArchiveEntry> + use<'a> {
        let needle = query.trim().to_lowercase();
        self.archive
            .iter()
            .filter(move |entry| needle.is_empty() || entry.request.matches(&needle))
    }

    /// Take the events queued since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::request::{Identity, Submission};

    fn request(nom: &str) -> Request {
        Request::new(
            Uuid::new_v4(),
            Submission {
                identity: Identity {
                    nom: nom.to_string(),
                    prenom: "Jean".to_string(),
                    telephone: "0102030405".to_string(),
                    mail: format!("{}@example.com", nom.to_lowercase()),
                },
                motif: "Stage".to_string(),
                details: "Trois mois".to_string(),
            },
            Utc::now().fixed_offset(),
        )
    }

    fn processed() -> RequestUpdate {
        RequestUpdate {
            status: Some(Status::Processed),
            comment: Some("Accepté".to_string()),
            ..RequestUpdate::default()
        }
    }

    #[test]
    fn insert_preserves_submission_order() {
        let mut collection = Collection::default();
        let first = request("Dupont");
        let second = request("Martin");
        collection.insert(first.clone());
        collection.insert(second.clone());

        let ids: Vec<_> = collection.requests().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(
            collection.take_events(),
            vec![Event::Submitted(first.id), Event::Submitted(second.id)]
        );
        assert!(collection.take_events().is_empty());
    }

    #[test]
    #[should_panic(expected = "Duplicate request id")]
    fn insert_rejects_duplicate_id() {
        let mut collection = Collection::default();
        let request = request("Dupont");
        collection.insert(request.clone());
        collection.insert(request);
    }

    #[test]
    fn fresh_id_is_unused() {
        let mut collection = Collection::default();
        for _ in 0..10 {
            let mut request = request("Dupont");
            request.id = collection.fresh_id();
            collection.insert(request);
        }
        let id = collection.fresh_id();
        assert!(!collection.contains(id));
    }

    #[test]
    fn first_completion_queues_one_event() {
        let mut collection = Collection::default();
        let request = request("Dupont");
        let id = request.id;
        collection.insert(request);
        collection.take_events();

        let updated = collection.apply_update(id, processed(), Vec::new()).unwrap();
        assert_eq!(updated.status, Status::Processed);
        assert_eq!(updated.comment, "Accepté");

        collection.apply_update(id, processed(), Vec::new()).unwrap();

        assert_eq!(collection.take_events(), vec![Event::Completed(id)]);
        assert_eq!(collection.processed_count(), 1);
    }

    #[test]
    fn processed_request_cannot_be_reopened() {
        let mut collection = Collection::default();
        let request = request("Dupont");
        let id = request.id;
        collection.insert(request);
        collection.apply_update(id, processed(), Vec::new());

        let reopen = RequestUpdate {
            status: Some(Status::NotProcessed),
            ..RequestUpdate::default()
        };
        let updated = collection.apply_update(id, reopen, Vec::new()).unwrap();
        assert_eq!(updated.status, Status::Processed);
    }

    #[test]
    fn update_of_missing_request_is_none() {
        let mut collection = Collection::default();
        assert!(
            collection
                .apply_update(Uuid::new_v4(), processed(), Vec::new())
                .is_none()
        );
        assert!(collection.take_events().is_empty());
    }

    #[test]
    fn update_adds_attachments_once() {
        let mut collection = Collection::default();
        let request = request("Dupont");
        let id = request.id;
        collection.insert(request);

        let keys = vec!["a.pdf".to_string(), "b.pdf".to_string()];
        collection.apply_update(id, RequestUpdate::default(), keys.clone());
        let updated = collection
            .apply_update(id, RequestUpdate::default(), keys.clone())
            .unwrap();
        assert_eq!(updated.attachments, keys);
    }

    #[test]
    fn detach_is_idempotent() {
        let mut collection = Collection::default();
        let request = request("Dupont");
        let id = request.id;
        collection.insert(request);
        collection.apply_update(id, RequestUpdate::default(), vec!["a.pdf".to_string()]);

        assert_eq!(collection.detach(id, "a.pdf"), Some(true));
        assert_eq!(collection.detach(id, "a.pdf"), Some(false));
        assert!(collection.find(id).unwrap().attachments.is_empty());
        assert_eq!(collection.detach(Uuid::new_v4(), "a.pdf"), None);
    }

    #[test]
    fn archived_request_is_still_a_duplicate() {
        let mut collection = Collection::default();
        let request = request("Dupont");
        let id = request.id;
        let fingerprint = request.fingerprint();
        collection.insert(request);

        assert!(collection.is_duplicate(&fingerprint));
        collection
            .archive_request(id, Utc::now().fixed_offset())
            .unwrap();
        assert!(!collection.contains(id));
        assert!(collection.is_duplicate(&fingerprint));
    }

    #[test]
    fn search_archive_filters_by_text() {
        let mut collection = Collection::default();
        for nom in ["Dupont", "Martin"] {
            let request = request(nom);
            let id = request.id;
            collection.insert(request);
            collection.archive_request(id, Utc::now().fixed_offset());
        }

        let found: Vec<_> = collection
            .search_archive("MARTIN")
            .map(|entry| entry.request.identity.nom.as_str())
            .collect();
        assert_eq!(found, vec!["Martin"]);
        assert_eq!(collection.search_archive("  ").count(), 2);
    }
}
