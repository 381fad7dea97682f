use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use yomidex_sheet::load_records;

fn main() -> Result<()> {
    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cargo run -p yomidex-sheet --example stats -- <file.csv>")?;

    let records =
        load_records(&path).with_context(|| format!("loading sheet {}", path.display()))?;

    let mut by_frequency = [0usize; 6];
    let mut keys = HashSet::new();
    let mut occurrences = 0usize;
    let mut annotated = 0usize;
    for record in &records {
        let slot = record.frequency.map(|f| f.get() as usize).unwrap_or(0);
        by_frequency[slot] += 1;
        for tag in &record.tags {
            occurrences += 1;
            if tag.has_reading() {
                annotated += 1;
            }
            keys.insert(tag.key().to_string());
        }
    }

    println!("Sheet: {}", path.display());
    println!("records: {}", records.len());
    println!("  unknown frequency: {}", by_frequency[0]);
    for (freq, count) in by_frequency.iter().enumerate().skip(1) {
        println!("  frequency {freq}: {count}");
    }
    println!("tag occurrences: {occurrences} ({annotated} annotated)");
    println!("distinct tag keys: {}", keys.len());

    Ok(())
}
