use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use intake::{
    Desk,
    desk::Upload,
    domain::{RequestUpdate, Status},
};
use tracing::instrument;
use uuid::Uuid;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "Mark a request processed and send the completion email")]
pub struct Process {
    /// Id of the request
    id: Uuid,

    /// Comment included in the completion email
    #[arg(long)]
    comment: Option<String>,

    /// Staff member handling the request
    #[arg(long, short)]
    assignee: Option<String>,

    /// Corrected requester email address
    #[arg(long)]
    mail: Option<String>,

    /// Files to attach to the request and the email
    #[arg(long = "attach", value_name = "FILE")]
    attachments: Vec<PathBuf>,
}

impl Process {
    #[instrument(level = "debug", skip(self, desk), fields(id = %self.id))]
    pub fn run(self, desk: &Desk) -> anyhow::Result<()> {
        let uploads = self
            .attachments
            .iter()
            .map(|path| {
                let bytes =
                    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(Upload { filename, bytes })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let update = RequestUpdate {
            assignee: self.assignee,
            status: Some(Status::Processed),
            comment: self.comment,
            mail: self.mail,
        };

        let Some(request) = desk.update(self.id, update, uploads)? else {
            anyhow::bail!("Request {} not found", self.id);
        };

        if let Some(error) = &request.email_error {
            eprintln!("{}", format!("⚠️  Completion email failed: {error}").warning());
        } else if request.confirmation_sent.is_some() {
            println!(
                "{}",
                format!("✅ Processed; email sent to {}", request.identity.mail).success()
            );
        } else {
            println!("{}", "Request was already processed".dim());
        }
        Ok(())
    }
}
