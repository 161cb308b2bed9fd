use clap::Parser;
use intake::Desk;
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "Search deleted requests")]
pub struct Archive {
    /// Text to look for in name, surname, email, motif or details
    #[arg(default_value = "")]
    query: String,

    /// Print the matching entries as JSON
    #[arg(long)]
    json: bool,
}

impl Archive {
    #[instrument(level = "debug", skip(self, desk))]
    pub fn run(self, desk: &Desk) -> anyhow::Result<()> {
        let entries = desk.search_archive(&self.query)?;

        if self.json {
            serde_json::to_writer_pretty(std::io::stdout(), &entries)?;
            println!();
            return Ok(());
        }

        if entries.is_empty() {
            println!("{}", "No archived requests match.".dim());
            return Ok(());
        }

        for entry in &entries {
            let request = &entry.request;
            println!(
                "{}  {} {} <{}>  {}  {}",
                entry.archived.format("%d/%m/%Y %H:%M"),
                request.identity.prenom,
                request.identity.nom,
                request.identity.mail,
                request.motif,
                request.id.to_string().dim(),
            );
        }
        Ok(())
    }
}
