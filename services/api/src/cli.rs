use crate::demo::{run_demo, DemoArgs};
use crate::infra::{run_maintenance, run_report, MaintainArgs, ReportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use vendor_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Vendor Intake",
    about = "Run and operate the vendor application intake and review service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print application stats and the admin listing, optionally exporting it as CSV
    Report(ReportArgs),
    /// Retry orphaned blob deletions and undelivered notifications once
    Maintain(MaintainArgs),
    /// Walk through apply, upload, approve, and reject against an in-memory backend
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Report(args) => run_report(args).await,
        Command::Maintain(args) => run_maintenance(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
