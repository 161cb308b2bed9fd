use clap::Parser;
use intake::{Config, Desk, notify, server};
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "Serve the submission form and the admin pages")]
pub struct Serve {
    /// Address to listen on, overriding the configuration
    #[arg(long, short)]
    listen: Option<String>,
}

impl Serve {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let listen = self.listen.unwrap_or_else(|| config.listen.clone());
        let transport = notify::transport_from_env(&config);
        let desk = Desk::new(config, transport);

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(server::serve(desk, &listen))?;
        Ok(())
    }
}
