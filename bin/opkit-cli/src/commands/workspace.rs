// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `opkit workspace` command: configure an operator and list the auxiliary
//! memory it declares.

use operators::MemoryLifetime;
use runtime::RuntimeConfig;

use super::{CpuOp, OpDType};

pub fn execute(op: CpuOp, dtype: OpDType, config: &RuntimeConfig) -> anyhow::Result<()> {
    let configured = super::configure(op, dtype, config)?;
    let requirements = configured.op.workspace();

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              opkit · Workspace Requirements          ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Operator: {} ({:?})", configured.op.name(), dtype);
    println!("  Requires prepare: {}", configured.op.requires_prepare());
    println!();

    if requirements.is_empty() {
        println!("  No auxiliary memory.");
        return Ok(());
    }

    println!("  {:<12} {:<12} {:>10} {:>6}", "Slot", "Lifetime", "Bytes", "Align");
    println!("  {}", "-".repeat(44));
    for req in &requirements {
        println!(
            "  {:<12} {:<12} {:>10} {:>6}",
            req.slot.to_string(),
            req.lifetime.to_string(),
            req.size,
            req.alignment
        );
    }
    println!();

    let bytes_of = |lifetime: MemoryLifetime| -> usize {
        requirements
            .iter()
            .filter(|r| r.lifetime == lifetime)
            .map(|r| r.size)
            .sum()
    };
    println!(
        "  Totals: {} temporary, {} persistent, {} prepare bytes",
        bytes_of(MemoryLifetime::Temporary),
        bytes_of(MemoryLifetime::Persistent),
        bytes_of(MemoryLifetime::Prepare)
    );
    Ok(())
}
