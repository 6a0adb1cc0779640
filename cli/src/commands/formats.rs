use anyhow::Result;
use clap::Args;
use itertools::Itertools;
use tileindex_core::formats::{DriverRegistry, Mode};

/// List the available tile output drivers
#[derive(Args, Debug)]
pub struct FormatsArgs {
    /// Only list drivers that can read
    #[arg(short, long, conflicts_with = "output")]
    pub input: bool,

    /// Only list drivers that can write
    #[arg(short, long)]
    pub output: bool,
}

/// Run the `formats` command
pub fn run_formats(args: FormatsArgs) -> Result<()> {
    let registry = DriverRegistry::default();

    if args.input {
        println!("{}", registry.available_input_formats().iter().join("\n"));
    } else if args.output {
        println!("{}", registry.available_output_formats().iter().join("\n"));
    } else {
        for driver in registry.drivers().iter().sorted_by(|a, b| a.name.cmp(&b.name)) {
            let mode = match driver.mode {
                Mode::Read => "r",
                Mode::Write => "w",
                Mode::ReadWrite => "rw",
            };
            println!(
                "{:<16}{:<4}{}",
                driver.name,
                mode,
                driver.file_extensions.iter().join(", ")
            );
        }
    }

    Ok(())
}
