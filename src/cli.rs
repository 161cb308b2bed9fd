use std::path::PathBuf;

mod archive;
mod delete;
mod list;
mod process;
mod serve;
mod show;
mod status;
mod terminal;

use archive::Archive;
use clap::ArgAction;
use delete::Delete;
use intake::{
    Config, Desk,
    notify::{self, Unconfigured},
};
use list::List;
use process::Process;
use serve::Serve;
use show::Show;
use status::Status;
use tracing::instrument;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the configuration file. Defaults apply if it does not exist.
    #[arg(
        short,
        long,
        env = "INTAKE_CONFIG",
        default_value = "intake.toml",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let config = Config::load_or_default(&self.config)?;
        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show request counts (default)
    Status(Status),

    /// Run the web server
    Serve(Serve),

    /// List active requests
    List(List),

    /// Show one request in full
    Show(Show),

    /// Mark a request processed and email the requester
    Process(Process),

    /// Delete a request and its files, keeping it in the archive
    Delete(Delete),

    /// Search deleted requests
    Archive(Archive),

    /// Rewrite a legacy data file in the current format
    Migrate,
}

impl Command {
    fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(&open_desk(config, false))?,
            Self::Serve(command) => command.run(config)?,
            Self::List(command) => command.run(&open_desk(config, false))?,
            Self::Show(command) => command.run(&open_desk(config, false))?,
            Self::Process(command) => command.run(&open_desk(config, true))?,
            Self::Delete(command) => command.run(&open_desk(config, false))?,
            Self::Archive(command) => command.run(&open_desk(config, false))?,
            Self::Migrate => migrate(&open_desk(config, false))?,
        }
        Ok(())
    }
}

/// Open the desk. Commands that never send mail get a transport that
/// refuses to.
fn open_desk(config: Config, mail: bool) -> Desk {
    let transport = if mail {
        notify::transport_from_env(&config)
    } else {
        Box::new(Unconfigured::new("this command does not send email"))
    };
    Desk::new(config, transport)
}

#[instrument(level = "debug", skip(desk))]
fn migrate(desk: &Desk) -> anyhow::Result<()> {
    use terminal::Colorize;

    let path = desk.store().path().display().to_string();
    if desk.migrate()? {
        println!("{}", format!("✅ Migrated {path}").success());
    } else {
        println!("{}", format!("{path} is already up to date").dim());
    }
    Ok(())
}
