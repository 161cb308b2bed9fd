//! The intake desk: every operation on requests, end to end.
//!
//! Each operation loads the whole collection, applies one change, sends the
//! notifications the change calls for and saves the collection back.

use chrono::{DateTime, FixedOffset, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    domain::{
        ArchiveEntry, Collection, Config, DuplicatePolicy, Event, Request, RequestUpdate,
        Submission,
    },
    notify::{Delivery, Notifier, Transport},
    storage::{Store, StoreError, UploadError, Uploads},
};

/// A file received from a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Name the file had on the sender's machine.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The request was recorded.
    Created(Request),
    /// The submission matched an earlier one and the desk refuses duplicates.
    /// Nothing was recorded.
    Duplicate,
}

/// Errors that can occur while running a desk operation.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// The request document could not be loaded or saved.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// An uploaded file could not be stored or removed.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Request lifecycle over a [`Store`], an [`Uploads`] directory and a
/// [`Notifier`].
#[derive(Debug)]
pub struct Desk {
    config: Config,
    store: Store,
    uploads: Uploads,
    notifier: Notifier,
}

impl Desk {
    /// Opens the desk described by `config`, sending mail through `transport`.
    #[must_use]
    pub fn new(config: Config, transport: Box<dyn Transport>) -> Self {
        let store = Store::new(config.data_file.clone(), config.timezone());
        let uploads = Uploads::new(config.upload_dir.clone());
        let notifier = Notifier::new(&config, transport);
        Self {
            config,
            store,
            uploads,
            notifier,
        }
    }

    /// The configuration the desk was opened with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The upload directory.
    #[must_use]
    pub const fn uploads(&self) -> &Uploads {
        &self.uploads
    }

    /// The request document.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The current time in the configured time zone.
    #[must_use]
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now()
            .with_timezone(&self.config.timezone())
            .fixed_offset()
    }

    /// Record a new submission.
    ///
    /// The submission is compared with every active and archived request.
    /// Under [`DuplicatePolicy::Block`] a match is refused; under
    /// [`DuplicatePolicy::Flag`] it is recorded with its `duplicate` flag set.
    /// Staff are alerted and the requester receives an acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded or saved, or the
    /// upload cannot be stored.
    #[instrument(skip_all, fields(nom = %submission.identity.nom))]
    pub fn create(
        &self,
        submission: Submission,
        upload: Option<Upload>,
    ) -> Result<CreateOutcome, DeskError> {
        let mut collection = self.store.load()?;

        let duplicate = collection.is_duplicate(&submission.fingerprint());
        if duplicate && self.config.duplicate_policy == DuplicatePolicy::Block {
            tracing::info!("Refusing duplicate submission");
            return Ok(CreateOutcome::Duplicate);
        }

        let id = collection.fresh_id();
        let mut request = Request::new(id, submission, self.now());
        request.duplicate = duplicate;
        if let Some(upload) = upload.filter(|upload| !upload.filename.is_empty()) {
            request.attachment = Some(self.uploads.store(id, &upload.filename, &upload.bytes)?);
        }
        let written: Vec<String> = request.files().map(str::to_string).collect();
        collection.insert(request.clone());
        self.commit(&mut collection, &written, &[])?;

        tracing::info!("Recorded request {id}");
        Ok(CreateOutcome::Created(request))
    }

    /// Apply an administrator update and store any new files.
    ///
    /// On the first move to processed the requester is emailed and the
    /// outcome is recorded on the request. Returns `None` if there is no
    /// request with this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded or saved, or a file
    /// cannot be stored.
    #[instrument(skip(self, update, uploads))]
    pub fn update(
        &self,
        id: Uuid,
        update: RequestUpdate,
        uploads: Vec<Upload>,
    ) -> Result<Option<Request>, DeskError> {
        let mut collection = self.store.load()?;
        let Some(existing) = collection.find(id) else {
            return Ok(None);
        };
        let attached: Vec<String> = existing.files().map(str::to_string).collect();

        let mut keys = Vec::new();
        for upload in uploads.into_iter().filter(|upload| !upload.filename.is_empty()) {
            match self.uploads.store(id, &upload.filename, &upload.bytes) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    self.discard(&keys, &attached);
                    return Err(e.into());
                }
            }
        }

        collection.apply_update(id, update, keys.clone());
        self.commit(&mut collection, &keys, &attached)?;

        Ok(collection.find(id).cloned())
    }

    /// Detach a file from a request and delete it.
    ///
    /// Returns `None` if there is no request with this id and `Some(false)`
    /// if the file was not attached to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded or saved, or the
    /// file cannot be removed.
    #[instrument(skip(self))]
    pub fn remove_attachment(&self, id: Uuid, key: &str) -> Result<Option<bool>, DeskError> {
        let mut collection = self.store.load()?;
        let detached = collection.detach(id, key);
        if detached != Some(true) {
            return Ok(detached);
        }

        if !self.uploads.remove(key)? {
            tracing::warn!("Attachment {key} was already gone from disk");
        }
        self.store.save(&mut collection)?;
        Ok(Some(true))
    }

    /// Delete a request and its files, keeping a snapshot in the archive.
    ///
    /// Returns `None` if there is no request with this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded or saved, or a file
    /// cannot be removed.
    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> Result<Option<ArchiveEntry>, DeskError> {
        let mut collection = self.store.load()?;
        let Some(request) = collection.find(id) else {
            return Ok(None);
        };

        for key in request.files() {
            if !self.uploads.remove(key)? {
                tracing::warn!("Attachment {key} was already gone from disk");
            }
        }

        let entry = collection.archive_request(id, self.now()).cloned();
        self.store.save(&mut collection)?;

        tracing::info!("Archived request {id}");
        Ok(entry)
    }

    /// Whether `submission` matches an active or archived request.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn detect_duplicate(&self, submission: &Submission) -> Result<bool, DeskError> {
        Ok(self.store.load()?.is_duplicate(&submission.fingerprint()))
    }

    /// The whole collection as currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn collection(&self) -> Result<Collection, DeskError> {
        Ok(self.store.load()?)
    }

    /// Active requests, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn requests(&self) -> Result<Vec<Request>, DeskError> {
        Ok(self.store.load()?.requests().to_vec())
    }

    /// The active request with this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn find(&self, id: Uuid) -> Result<Option<Request>, DeskError> {
        Ok(self.store.load()?.find(id).cloned())
    }

    /// Archived requests matching `query`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn search_archive(&self, query: &str) -> Result<Vec<ArchiveEntry>, DeskError> {
        Ok(self
            .store
            .load()?
            .search_archive(query)
            .cloned()
            .collect())
    }

    /// How many requests have ever been processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn processed_count(&self) -> Result<u64, DeskError> {
        Ok(self.store.load()?.processed_count())
    }

    /// Rewrite a legacy request document in the current format.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written.
    pub fn migrate(&self) -> Result<bool, DeskError> {
        Ok(self.store.migrate()?)
    }

    /// Remove files written by an operation that was not stored, sparing
    /// those the request already referenced.
    fn discard(&self, keys: &[String], attached: &[String]) {
        for key in keys.iter().filter(|&key| !attached.contains(key)) {
            if let Err(e) = self.uploads.remove(key) {
                tracing::warn!("Could not remove orphaned upload {key}: {e}");
            }
        }
    }

    /// Save the collection, then send the notifications its queued events
    /// call for. Completion outcomes are recorded by a second save.
    ///
    /// If the first save fails nothing is sent and the files in `written`
    /// are removed again, except those in `attached`.
    fn commit(
        &self,
        collection: &mut Collection,
        written: &[String],
        attached: &[String],
    ) -> Result<(), DeskError> {
        let events = collection.take_events();
        if let Err(e) = self.store.save(collection) {
            self.discard(written, attached);
            return Err(e.into());
        }
        if self.dispatch(collection, events) {
            self.store.save(collection)?;
        }
        Ok(())
    }

    /// Send the notifications for `events`. Returns whether an outcome was
    /// recorded on a request.
    fn dispatch(&self, collection: &mut Collection, events: Vec<Event>) -> bool {
        let mut recorded = false;
        for event in events {
            match event {
                Event::Submitted(id) => {
                    let Some(request) = collection.find(id) else {
                        continue;
                    };
                    let alert = self.notifier.notify_new(request);
                    let acknowledgment = self.notifier.notify_acknowledged(request);
                    for delivery in [alert, acknowledgment] {
                        if let Delivery::Failed(message) = delivery {
                            tracing::debug!("Submission notice for {id} not delivered: {message}");
                        }
                    }
                }
                Event::Completed(id) => {
                    let Some(request) = collection.find(id) else {
                        continue;
                    };
                    let delivery = self.notifier.notify_completed(request);
                    let now = self.now();
                    let Some(request) = collection.find_mut(id) else {
                        continue;
                    };
                    match delivery {
                        Delivery::Sent(email) => {
                            request.confirmation_sent = Some(now);
                            request.email_error = None;
                            request.sent_email = Some(email);
                        }
                        Delivery::Failed(message) => request.email_error = Some(message),
                    }
                    recorded = true;
                }
            }
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        sync::{Arc, Mutex},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::{
        domain::{Identity, Status},
        notify::{Email, MemoryTransport, TransportError},
    };

    /// Copies the data file each time a message is sent.
    #[derive(Clone)]
    struct SnapshotTransport {
        data_file: PathBuf,
        snapshots: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for SnapshotTransport {
        fn send(&self, _email: &Email) -> Result<(), TransportError> {
            let snapshot = fs::read_to_string(&self.data_file).unwrap_or_default();
            self.snapshots.lock().unwrap().push(snapshot);
            Ok(())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        desk: Desk,
        transport: MemoryTransport,
    }

    fn setup(policy: DuplicatePolicy) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_file = tmp.path().join("data").join("data.json");
        config.upload_dir = tmp.path().join("data").join("uploads");
        config.staff_recipients = vec!["rh@example.com".to_string()];
        config.duplicate_policy = policy;
        let transport = MemoryTransport::new();
        let desk = Desk::new(config, Box::new(transport.clone()));
        Fixture {
            _tmp: tmp,
            desk,
            transport,
        }
    }

    fn dupont() -> Submission {
        Submission {
            identity: Identity {
                nom: "Dupont".to_string(),
                prenom: "Jean".to_string(),
                telephone: "0102030405".to_string(),
                mail: "jean.dupont@example.com".to_string(),
            },
            motif: "Stage".to_string(),
            details: "Trois mois".to_string(),
        }
    }

    fn created(outcome: CreateOutcome) -> Request {
        match outcome {
            CreateOutcome::Created(request) => request,
            CreateOutcome::Duplicate => panic!("expected the request to be created"),
        }
    }

    fn accepted() -> RequestUpdate {
        RequestUpdate {
            status: Some(Status::Processed),
            comment: Some("Accepté".to_string()),
            ..RequestUpdate::default()
        }
    }

    #[test]
    fn submission_is_stored_and_acknowledged() {
        let f = setup(DuplicatePolicy::Flag);

        let request = created(f.desk.create(dupont(), None).unwrap());

        assert_eq!(request.status, Status::NotProcessed);
        assert!(!request.duplicate);
        assert_eq!(f.desk.requests().unwrap(), vec![request]);

        let sent = f.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, vec!["rh@example.com".to_string()]);
        assert_eq!(sent[1].to, vec!["jean.dupont@example.com".to_string()]);
    }

    #[test]
    fn submission_file_is_stored_under_id_prefix() {
        let f = setup(DuplicatePolicy::Flag);
        let upload = Upload {
            filename: "Mon CV.pdf".to_string(),
            bytes: b"pdf".to_vec(),
        };

        let request = created(f.desk.create(dupont(), Some(upload)).unwrap());

        let key = request.attachment.unwrap();
        assert_eq!(key, format!("{}_Mon_CV.pdf", request.id));
        assert_eq!(f.desk.uploads().read(&key).unwrap(), b"pdf");
    }

    #[test]
    fn unusable_filename_does_not_lose_the_request() {
        let f = setup(DuplicatePolicy::Flag);
        let upload = Upload {
            filename: "履歴書".to_string(),
            bytes: b"cv".to_vec(),
        };

        let request = created(f.desk.create(dupont(), Some(upload)).unwrap());

        let key = request.attachment.clone().unwrap();
        assert_eq!(key, format!("{}_fichier", request.id));
        assert_eq!(f.desk.uploads().read(&key).unwrap(), b"cv");
        assert_eq!(f.desk.requests().unwrap(), vec![request.clone()]);

        let files = vec![Upload {
            filename: "резюме.pdf".to_string(),
            bytes: b"x".to_vec(),
        }];
        let updated = f
            .desk
            .update(request.id, RequestUpdate::default(), files)
            .unwrap()
            .unwrap();
        assert_eq!(updated.attachments, vec![format!("{}_fichier.pdf", request.id)]);
    }

    #[test]
    fn requests_are_stored_before_mail_goes_out() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_file = tmp.path().join("data.json");
        config.upload_dir = tmp.path().join("uploads");
        config.staff_recipients = vec!["rh@example.com".to_string()];
        let transport = SnapshotTransport {
            data_file: config.data_file.clone(),
            snapshots: Arc::default(),
        };
        let desk = Desk::new(config, Box::new(transport.clone()));

        let id = created(desk.create(dupont(), None).unwrap()).id;
        desk.update(id, accepted(), Vec::new()).unwrap();

        let snapshots = transport.snapshots.lock().unwrap().clone();
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots.iter().all(|s| s.contains(&id.to_string())));
        assert!(snapshots[2].contains("Accepté"));
        assert!(!snapshots[2].contains("confirmation_envoyee"));

        let stored = desk.find(id).unwrap().unwrap();
        assert!(stored.confirmation_sent.is_some());
        assert!(stored.sent_email.is_some());
    }

    #[test]
    fn empty_file_field_is_ignored() {
        let f = setup(DuplicatePolicy::Flag);
        let upload = Upload {
            filename: String::new(),
            bytes: Vec::new(),
        };
        let request = created(f.desk.create(dupont(), Some(upload)).unwrap());
        assert!(request.attachment.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let f = setup(DuplicatePolicy::Flag);
        for _ in 0..5 {
            f.desk.create(dupont(), None).unwrap();
        }
        let mut ids: Vec<_> = f.desk.requests().unwrap().iter().map(|r| r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn completion_email_is_recorded() {
        let f = setup(DuplicatePolicy::Flag);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;

        let request = f.desk.update(id, accepted(), Vec::new()).unwrap().unwrap();

        assert_eq!(request.status, Status::Processed);
        assert_eq!(request.comment, "Accepté");
        assert!(request.confirmation_sent.is_some());
        assert!(request.email_error.is_none());
        let sent = request.sent_email.unwrap();
        assert!(sent.text.contains("Accepté"));
        assert_eq!(f.desk.processed_count().unwrap(), 1);
    }

    #[test]
    fn failed_completion_email_keeps_status() {
        let f = setup(DuplicatePolicy::Flag);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;
        f.transport.fail_with(Some("connection refused"));

        let request = f.desk.update(id, accepted(), Vec::new()).unwrap().unwrap();

        assert_eq!(request.status, Status::Processed);
        assert!(request.confirmation_sent.is_none());
        assert!(request.sent_email.is_none());
        assert!(
            request
                .email_error
                .as_deref()
                .unwrap()
                .contains("connection refused")
        );
        assert_eq!(f.desk.find(id).unwrap().unwrap(), request);
    }

    #[test]
    fn completion_email_is_sent_once() {
        let f = setup(DuplicatePolicy::Flag);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;
        let before = f.transport.sent().len();

        f.desk.update(id, accepted(), Vec::new()).unwrap();
        f.desk.update(id, accepted(), Vec::new()).unwrap();

        assert_eq!(f.transport.sent().len(), before + 1);
        assert_eq!(f.desk.processed_count().unwrap(), 1);
    }

    #[test]
    fn completion_goes_to_corrected_address_with_files() {
        let f = setup(DuplicatePolicy::Flag);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;
        let update = RequestUpdate {
            mail: Some("jean@example.org".to_string()),
            ..accepted()
        };
        let files = vec![Upload {
            filename: "convention.pdf".to_string(),
            bytes: b"x".to_vec(),
        }];

        let request = f.desk.update(id, update, files).unwrap().unwrap();

        assert_eq!(request.attachments.len(), 1);
        let last = f.transport.sent().pop().unwrap();
        assert_eq!(last.to, vec!["jean@example.org".to_string()]);
        assert_eq!(last.attachments[0].0, "convention.pdf");
    }

    #[test]
    fn update_of_unknown_request_is_none() {
        let f = setup(DuplicatePolicy::Flag);
        assert!(
            f.desk
                .update(Uuid::new_v4(), accepted(), Vec::new())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn duplicate_is_flagged() {
        let f = setup(DuplicatePolicy::Flag);
        created(f.desk.create(dupont(), None).unwrap());

        let mut again = dupont();
        again.identity.nom = "DUPONT".to_string();
        assert!(f.desk.detect_duplicate(&again).unwrap());

        let second = created(f.desk.create(again, None).unwrap());
        assert!(second.duplicate);
        assert_eq!(f.desk.requests().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_is_blocked() {
        let f = setup(DuplicatePolicy::Block);
        created(f.desk.create(dupont(), None).unwrap());
        let sent = f.transport.sent().len();

        let outcome = f.desk.create(dupont(), None).unwrap();

        assert_eq!(outcome, CreateOutcome::Duplicate);
        assert_eq!(f.desk.requests().unwrap().len(), 1);
        assert_eq!(f.transport.sent().len(), sent);
    }

    #[test]
    fn deleted_request_still_counts_as_duplicate() {
        let f = setup(DuplicatePolicy::Block);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;
        f.desk.delete(id).unwrap().unwrap();

        assert_eq!(
            f.desk.create(dupont(), None).unwrap(),
            CreateOutcome::Duplicate
        );
    }

    #[test]
    fn delete_removes_files_and_archives() {
        let f = setup(DuplicatePolicy::Flag);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;
        let files = ["convention.pdf", "planning.pdf"]
            .into_iter()
            .map(|name| Upload {
                filename: name.to_string(),
                bytes: b"x".to_vec(),
            })
            .collect();
        let request = f
            .desk
            .update(id, RequestUpdate::default(), files)
            .unwrap()
            .unwrap();
        let paths: Vec<_> = request
            .attachments
            .iter()
            .map(|key| f.desk.uploads().path(key).unwrap())
            .collect();
        assert_eq!(paths.len(), 2);

        let entry = f.desk.delete(id).unwrap().unwrap();

        assert!(paths.iter().all(|path| !path.exists()));
        assert!(f.desk.find(id).unwrap().is_none());
        assert_eq!(entry.request.id, id);
        assert_eq!(f.desk.search_archive("dupont").unwrap(), vec![entry]);
        assert!(f.desk.delete(id).unwrap().is_none());
    }

    #[test]
    fn remove_attachment_is_idempotent() {
        let f = setup(DuplicatePolicy::Flag);
        let id = created(f.desk.create(dupont(), None).unwrap()).id;
        let files = vec![Upload {
            filename: "convention.pdf".to_string(),
            bytes: b"x".to_vec(),
        }];
        let key = f
            .desk
            .update(id, RequestUpdate::default(), files)
            .unwrap()
            .unwrap()
            .attachments[0]
            .clone();
        let path = f.desk.uploads().path(&key).unwrap();

        assert_eq!(f.desk.remove_attachment(id, &key).unwrap(), Some(true));
        assert!(!path.exists());
        assert_eq!(f.desk.remove_attachment(id, &key).unwrap(), Some(false));
        assert_eq!(
            f.desk.remove_attachment(Uuid::new_v4(), &key).unwrap(),
            None
        );
        assert!(f.desk.find(id).unwrap().unwrap().attachments.is_empty());
    }

    #[test]
    fn missing_file_does_not_block_delete() {
        let f = setup(DuplicatePolicy::Flag);
        let upload = Upload {
            filename: "cv.pdf".to_string(),
            bytes: b"x".to_vec(),
        };
        let request = created(f.desk.create(dupont(), Some(upload)).unwrap());
        let path = f
            .desk
            .uploads()
            .path(request.attachment.as_deref().unwrap())
            .unwrap();
        fs::remove_file(path).unwrap();

        assert!(f.desk.delete(request.id).unwrap().is_some());
    }
}
