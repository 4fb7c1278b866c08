// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # opkit
//!
//! Command-line interface for the operator toolkit.
//!
//! ## Usage
//! ```bash
//! # Print the detected CPU capabilities as JSON
//! opkit caps
//!
//! # Show the auxiliary memory an operator declares
//! opkit workspace --op add-mul-add --dtype qasymm8
//!
//! # Run an operator end to end
//! opkit run --op sub
//!
//! # Fuse a chain of GPU operators and print the generated kernels
//! opkit fuse --ops add,clamp,softmax --execute
//! ```

mod commands;

use clap::{Parser, Subcommand};
use commands::{CpuOp, OpDType};

#[derive(Parser)]
#[command(
    name = "opkit",
    about = "Operator workspace, lifecycle and GPU fusion toolkit",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected hardware capabilities as JSON.
    Caps,

    /// Configure an operator and print its declared memory requirements.
    Workspace {
        /// Operator to configure.
        #[arg(long, value_enum)]
        op: CpuOp,

        /// Data type of the operator's inputs.
        #[arg(long, value_enum, default_value = "f32")]
        dtype: OpDType,
    },

    /// Configure, prepare and run an operator on constant inputs.
    Run {
        /// Operator to run.
        #[arg(long, value_enum, default_value = "sub")]
        op: CpuOp,

        /// Data type of the operator's inputs.
        #[arg(long, value_enum, default_value = "f32")]
        dtype: OpDType,

        /// Number of runs.
        #[arg(long, default_value_t = 1)]
        iterations: usize,
    },

    /// Build GPU workload sketches from a chain of operators and print the
    /// generated kernels.
    Fuse {
        /// Comma-separated chain: add, sub, mul, clamp, matmul, softmax.
        #[arg(long, value_delimiter = ',', default_value = "add,clamp,softmax")]
        ops: Vec<String>,

        /// Rows of the input tensor.
        #[arg(long, default_value_t = 4)]
        rows: usize,

        /// Columns of the input tensor.
        #[arg(long, default_value_t = 8)]
        cols: usize,

        /// GPU architecture: midgard, bifrost, valhall.
        #[arg(long, default_value = "bifrost")]
        target: String,

        /// Also run the workloads on the host queue and print the result.
        #[arg(long)]
        execute: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Caps => commands::caps::execute(),
        Commands::Workspace { op, dtype } => commands::workspace::execute(op, dtype, &config),
        Commands::Run { op, dtype, iterations } => commands::run::execute(op, dtype, iterations, &config),
        Commands::Fuse {
            ops,
            rows,
            cols,
            target,
            execute,
        } => commands::fuse::execute(&ops, rows, cols, &target, execute, &config),
    }
}
