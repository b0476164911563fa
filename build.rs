//! Build script generating the queen's manual page from its CLI definition.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let man = Man::new(cli::Cli::command());
    let mut page: Vec<u8> = Vec::new();
    man.render(&mut page)?;
    fs::write(out_dir.join("hivewire.1"), page)?;

    Ok(())
}
