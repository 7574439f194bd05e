//! Renders `cloud-shepard.1` and one `cloud-shepard-<command>.1` page per
//! subcommand into `OUT_DIR`, from the same clap definitions the binary
//! parses with.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let root = Cli::command();
    let binary = root.get_name().to_owned();
    render(root.clone(), &out_dir.join(format!("{binary}.1")))?;
    for sub in root.get_subcommands() {
        let page = format!("{binary}-{}", sub.get_name());
        let target = out_dir.join(format!("{page}.1"));
        render(sub.clone().display_name(page), &target)?;
    }
    Ok(())
}

fn render(command: Command, target: &Path) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    fs::write(target, buffer)
}
