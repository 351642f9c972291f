use crate::prelude::*;
use clap::Parser;

mod error;
mod extract;
mod figures;
mod flow;
mod prelude;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Pull redlined regions out of rule-book PDFs into a composited PDF and a flowing DOCX"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "REDLINE_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Extract flagged content from one or more PDFs
    Extract(crate::extract::App),

    /// List the figures a PDF carries
    Figures(crate::figures::App),

    /// Rebuild the flowing DOCX from a composited PDF
    Flow(crate::flow::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Extract(sub_app) => crate::extract::run(sub_app, app.global).await,
        SubCommands::Figures(sub_app) => crate::figures::run(sub_app, app.global).await,
        SubCommands::Flow(sub_app) => crate::flow::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
