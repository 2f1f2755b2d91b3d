/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use gs_streamer::{Config, HandlerRegistry, PluginRegistry, Server, TopologyError};

#[derive(Parser)]
#[command()]
struct StreamerArgs {
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), TopologyError> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started gs-streamer-configurable");

    let args = StreamerArgs::parse();
    let contents = fs::read_to_string(&args.config).map_err(|e| {
        TopologyError::ConfigMissing(format!(
            "unable to read config file {}: {e}",
            args.config.display()
        ))
    })?;
    let config = Config::from_json5(&contents)?;

    let mut server = Server::new(config, HandlerRegistry::new(), PluginRegistry::new())?
        .with_config_path(args.config);
    server.load_streams();
    server.load_plugins();
    server.wait().await
}
