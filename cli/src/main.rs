use clap::{Parser, Subcommand};
use commands::{
    formats::{run_formats, FormatsArgs},
    index::{run_index, IndexArgs},
};

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    /// Print progress information
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print debug log messages
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Index(IndexArgs),
    Formats(FormatsArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.debug);
    match cli.command {
        Commands::Index(args) => run_index(args),
        Commands::Formats(args) => run_formats(args),
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_index() {
        let cli = Cli::try_parse_from([
            "tileindex",
            "index",
            "out",
            "--zoom",
            "3,5",
            "--gpkg",
            "--bounds",
            "-10",
            "-5.5",
            "10",
            "5.5",
            "--for-gdal",
            "false",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Index(args) = cli.command else {
            panic!("expected index command");
        };
        assert_eq!(args.tile_dir, "out");
        assert!(args.gpkg && !args.geojson);
        assert!(!args.for_gdal);
        assert_eq!(args.bounds, Some(vec![-10.0, -5.5, 10.0, 5.5]));
        assert_eq!(args.fieldname, "location");
    }
}
