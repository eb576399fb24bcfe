// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to run the daemon gateway

use camino::Utf8PathBuf;
use clap::Parser;
use daemon_common::cmd::fatal;
use daemon_common::cmd::CmdError;
use daemon_gateway::run_server;
use daemon_gateway::Config;

#[derive(Debug, Parser)]
#[clap(
    name = "daemon-gateway",
    about = "Liveness gateway for out-of-process daemons"
)]
struct Args {
    #[clap(name = "CONFIG_FILE_PATH", action)]
    config_file_path: Utf8PathBuf,

    #[clap(
        long = "check-config",
        help = "Validate the configuration file and exit",
        action
    )]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    if let Err(cmd_error) = do_run().await {
        fatal(cmd_error);
    }
}

async fn do_run() -> Result<(), CmdError> {
    let args = Args::parse();

    let config = Config::from_file(&args.config_file_path)
        .map_err(|e| CmdError::Failure(e.to_string()))?;
    config.validate().map_err(|e| CmdError::Failure(e.to_string()))?;
    if args.check_config {
        return Ok(());
    }

    run_server(config).await.map_err(CmdError::Failure)
}
