use clap::Parser;
use intake::{Desk, domain::Status as RequestStatus};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser, Default)]
#[command(about = "Show request counts")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Counts shown by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
struct Counts {
    pending: usize,
    processed: usize,
    processed_ever: u64,
    email_errors: usize,
    archived: usize,
    revision: u64,
}

impl Status {
    #[instrument(level = "debug", skip(self, desk))]
    pub fn run(self, desk: &Desk) -> anyhow::Result<()> {
        let collection = desk.collection()?;
        let requests = collection.requests();
        let counts = Counts {
            pending: requests
                .iter()
                .filter(|r| r.status == RequestStatus::NotProcessed)
                .count(),
            processed: requests
                .iter()
                .filter(|r| r.status == RequestStatus::Processed)
                .count(),
            processed_ever: collection.processed_count(),
            email_errors: requests.iter().filter(|r| r.email_error.is_some()).count(),
            archived: collection.archive().len(),
            revision: collection.revision(),
        };

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&counts)?),
            OutputFormat::Table if self.quiet => Self::output_quiet(counts),
            OutputFormat::Table => Self::output_table(counts),
        }
        Ok(())
    }

    fn output_quiet(counts: Counts) {
        println!(
            "pending={} processed={} archived={} email_errors={}",
            counts.pending, counts.processed, counts.archived, counts.email_errors
        );
    }

    fn output_table(counts: Counts) {
        println!("Requests");
        println!("{}", "────────".dim());
        println!("Pending:    {}", counts.pending.to_string().warning());
        println!("Processed:  {}", counts.processed.to_string().success());
        println!("Archived:   {}", counts.archived);
        println!(
            "{}",
            format!(
                "{} processed in total, document revision {}",
                counts.processed_ever, counts.revision
            )
            .dim()
        );

        println!();
        if counts.email_errors == 0 {
            println!("Email errors: {} ✅", "0".success());
        } else {
            println!("Email errors: {} ⚠️", counts.email_errors.to_string().error());
            println!("{}", "Run 'intake list' to find them.".dim());
        }
    }
}
