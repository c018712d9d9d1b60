// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements command-line argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The dirdns REST interface to directory-backed DNS data
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),

    /// Check a configuration file and print a summary of it
    Check(CheckArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the bind IP address and port of the configuration
    #[arg(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Set the configuration file to check
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
}
