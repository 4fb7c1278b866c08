// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `opkit caps` command: print the detected CPU capabilities.

use operators::HardwareCapabilities;

pub fn execute() -> anyhow::Result<()> {
    let caps = HardwareCapabilities::detect();
    tracing::info!("detected {} cores", caps.num_cores);
    println!("{}", serde_json::to_string_pretty(&caps)?);
    Ok(())
}
