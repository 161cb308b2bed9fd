use std::collections::HashMap;

use axum::extract::Multipart;
use uuid::Uuid;

use super::AppError;
use crate::{
    desk::Upload,
    domain::{Identity, RequestUpdate, Status, Submission},
};

/// Text fields and files of a multipart form.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<Upload>>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field.bytes().await?;
                    if filename.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.entry(name).or_default().push(Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    fn required(&self, name: &str) -> Result<String, AppError> {
        self.fields
            .get(name)
            .map(|value| value.trim().to_string())
            .ok_or_else(|| AppError::BadRequest(format!("champ manquant : {name}")))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| value.trim().to_string())
    }

    fn take_files(&mut self, name: &str) -> Vec<Upload> {
        self.files.remove(name).unwrap_or_default()
    }

    /// The public submission form: every identity field, the motif and the
    /// details, plus an optional `fichier`.
    pub fn into_submission(mut self) -> Result<(Submission, Option<Upload>), AppError> {
        let submission = Submission {
            identity: Identity {
                nom: self.required("nom")?,
                prenom: self.required("prenom")?,
                telephone: self.required("telephone")?,
                mail: self.required("mail")?,
            },
            motif: self.required("motif")?,
            details: self.required("details")?,
        };
        let upload = self.take_files("fichier").into_iter().next();
        Ok((submission, upload))
    }

    /// The admin form.
    pub fn into_admin_action(mut self) -> Result<AdminAction, AppError> {
        let id = parse_id(&self.required("id")?)?;
        match self.required("action")?.as_str() {
            "delete" => Ok(AdminAction::Delete(id)),
            "update" => {
                let status = self
                    .optional("statut")
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<Status>())
                    .transpose()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let update = RequestUpdate {
                    assignee: self.optional("attribution"),
                    status,
                    comment: self.optional("commentaire"),
                    mail: self.optional("mail").filter(|mail| !mail.is_empty()),
                };
                let files = self.take_files("fichiers");
                Ok(AdminAction::Update { id, update, files })
            }
            other => Err(AppError::BadRequest(format!("action inconnue : {other}"))),
        }
    }
}

/// What the admin form asked for.
#[derive(Debug)]
pub enum AdminAction {
    Update {
        id: Uuid,
        update: RequestUpdate,
        files: Vec<Upload>,
    },
    Delete(Uuid),
}

/// Parse a request id from a path or form. A malformed id matches no request.
pub fn parse_id(value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim()).map_err(|_| AppError::NotFound)
}
