use clap::Parser;
use intake::{Desk, domain::Status};
use tracing::instrument;

use super::terminal::{Colorize, status_label};

#[derive(Debug, Parser)]
#[command(about = "List active requests, oldest first")]
pub struct List {
    /// Only show requests with this status ("Non traité" or "Traité")
    #[arg(long)]
    status: Option<Status>,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl List {
    #[instrument(level = "debug", skip(self, desk))]
    pub fn run(self, desk: &Desk) -> anyhow::Result<()> {
        let requests: Vec<_> = desk
            .requests()?
            .into_iter()
            .filter(|request| self.status.is_none_or(|status| request.status == status))
            .collect();

        if let OutputFormat::Json = self.output {
            serde_json::to_writer_pretty(std::io::stdout(), &requests)?;
            println!();
            return Ok(());
        }

        if requests.is_empty() {
            println!("{}", "No requests.".dim());
            return Ok(());
        }

        println!(
            "{:<36}  {:<16}  {:<24}  {:<20}  Status",
            "Id", "Date", "Name", "Motif"
        );
        for request in &requests {
            let name = format!("{} {}", request.identity.prenom, request.identity.nom);
            let mut line = format!(
                "{:<36}  {:<16}  {:<24}  {:<20}  {}",
                request.id,
                request.created.format("%d/%m/%Y %H:%M"),
                truncate(&name, 24),
                truncate(&request.motif, 20),
                status_label(request.status),
            );
            if request.duplicate {
                line.push_str(&format!("  {}", "duplicate".warning()));
            }
            if request.email_error.is_some() {
                line.push_str(&format!("  {}", "email failed".error()));
            }
            println!("{line}");
        }
        Ok(())
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width - 1).collect();
    short.push('…');
    short
}
