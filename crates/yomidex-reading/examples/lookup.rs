use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use yomidex_reading::{ReadingResolver, ReadingTable};
use yomidex_types::Tag;

const USAGE: &str =
    "usage: cargo run -p yomidex-reading --example lookup -- [--table <file>] <word>...";

fn main() -> Result<()> {
    let mut table_path: Option<PathBuf> = None;
    let mut words = Vec::new();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--table" {
            table_path = Some(args.next().map(PathBuf::from).context(USAGE)?);
        } else {
            words.push(arg);
        }
    }
    if words.is_empty() {
        bail!(USAGE);
    }

    let table = match &table_path {
        Some(path) => ReadingTable::load(path)
            .with_context(|| format!("loading readings from {}", path.display()))?,
        None => ReadingTable::builtin(),
    };
    let resolver = ReadingResolver::without_analyzer(table);
    println!("Table entries: {}", resolver.table().len());

    for word in words {
        let Some(mut tag) = Tag::parse(&word) else {
            continue;
        };
        match resolver.resolve_tag(&mut tag) {
            Some(source) => println!("{:<24} [{source}]", tag.to_string()),
            None => println!("{:<24} [unresolved]", tag.to_string()),
        }
    }

    Ok(())
}
