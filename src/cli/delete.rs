use clap::Parser;
use dialoguer::Confirm;
use intake::Desk;
use tracing::instrument;
use uuid::Uuid;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "Delete a request and its files")]
pub struct Delete {
    /// Id of the request
    id: Uuid,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl Delete {
    #[instrument(level = "debug", skip(self, desk), fields(id = %self.id))]
    pub fn run(self, desk: &Desk) -> anyhow::Result<()> {
        let Some(request) = desk.find(self.id)? else {
            anyhow::bail!("Request {} not found", self.id);
        };

        if !self.yes {
            let files = request.files().count();
            println!(
                "Will delete the request from {} {} and {files} file(s).",
                request.identity.prenom, request.identity.nom
            );
            let proceed = Confirm::new()
                .with_prompt("Proceed?")
                .default(false)
                .interact()?;
            if !proceed {
                println!("Cancelled");
                std::process::exit(130);
            }
        }

        if desk.delete(self.id)?.is_none() {
            anyhow::bail!("Request {} was deleted by someone else", self.id);
        }
        println!("{}", "✅ Deleted; the request is kept in the archive".success());
        Ok(())
    }
}
