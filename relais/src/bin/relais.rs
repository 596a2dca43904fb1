use std::path::PathBuf;

use clap::Parser;
use relais::{
    Relais,
    config::{self, Overrides},
};
use relais_common::logging;

/// Accept mail over SMTP and forward it to an HTTP email API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file; otherwise `RELAIS_CONFIG`, `./relais.config.ron`
    /// and `/etc/relais/relais.config.ron` are tried in order
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();

    let path = config::find_config_file(args.config)?;
    let relais = Relais::load(path.as_deref())?.apply(Overrides::from_env()?);

    relais.run().await
}
