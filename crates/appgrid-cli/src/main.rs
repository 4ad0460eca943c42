//! appgrid — command-line client for appgridd.
//!
//! Forwards its arguments to the daemon unchanged and prints the reply:
//!
//! ```text
//! appgrid app-manager install tech.appgrid.web 1.0
//! appgrid jobs wait 1
//! ```

use std::io::Write;
use std::path::PathBuf;

use appgrid_api::ReplyCode;
use clap::Parser;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "appgrid",
    about = "AppGrid — app and instance manager client",
    version,
    trailing_var_arg = true
)]
struct Cli {
    /// Control socket of the daemon.
    #[arg(long, default_value = "/run/appgrid/appgrid.sock")]
    socket: PathBuf,

    /// Service name followed by its arguments, e.g. `jobs list`.
    #[arg(allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("appgrid=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    debug!(socket = %cli.socket.display(), args = ?cli.args, "sending request");

    let reply = appgrid_api::call(&cli.socket, &cli.args).await?;
    if reply.code == ReplyCode::Ok {
        let mut stdout = std::io::stdout();
        stdout.write_all(&reply.output)?;
        stdout.flush()?;
    } else {
        std::io::stderr().write_all(&reply.output)?;
    }
    std::process::exit(reply.code.code());
}
