use clap::Parser;
use intake::Desk;
use tracing::instrument;
use uuid::Uuid;

use super::terminal::{Colorize, status_label};

#[derive(Debug, Parser)]
#[command(about = "Display every field of a request")]
pub struct Show {
    /// Id of the request
    id: Uuid,

    /// Also print the last completion email
    #[arg(long)]
    email: bool,
}

impl Show {
    #[instrument(level = "debug", skip(self, desk))]
    pub fn run(self, desk: &Desk) -> anyhow::Result<()> {
        let Some(request) = desk.find(self.id)? else {
            anyhow::bail!("Request {} not found", self.id);
        };
        let identity = &request.identity;
        let date_format = "%d/%m/%Y %H:%M";

        println!("# {} {}", identity.prenom, identity.nom);
        println!("{}\n", request.id.to_string().dim());

        println!("  Date:        {}", request.created.format(date_format));
        println!("  Phone:       {}", identity.telephone);
        println!("  Email:       {}", identity.mail);
        println!("  Motif:       {}", request.motif);
        println!("  Status:      {}", status_label(request.status));
        if !request.assignee.is_empty() {
            println!("  Assignee:    {}", request.assignee);
        }
        if request.duplicate {
            println!("  {}", "Likely duplicate of an earlier request".warning());
        }

        if !request.details.is_empty() {
            println!("\n{}\n{}", "Details".dim(), request.details);
        }
        if !request.comment.is_empty() {
            println!("\n{}\n{}", "Comment".dim(), request.comment);
        }

        let files: Vec<_> = request.files().collect();
        if !files.is_empty() {
            println!("\n{}", "Files".dim());
            for key in files {
                let marker = if desk.uploads().path(key).is_some() {
                    String::new()
                } else {
                    format!(" {}", "(missing)".error())
                };
                println!("  • {key}{marker}");
            }
        }

        if let Some(sent) = request.confirmation_sent {
            println!(
                "\n{}",
                format!("Completion email sent {}", sent.format(date_format)).success()
            );
        }
        if let Some(error) = &request.email_error {
            println!("\n{}", format!("Completion email failed: {error}").error());
        }

        if self.email {
            match &request.sent_email {
                Some(email) => println!("\nSubject: {}\n\n{}", email.subject, email.text),
                None => println!("\n{}", "No completion email sent.".dim()),
            }
        }
        Ok(())
    }
}
