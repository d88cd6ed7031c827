use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(
        about = "Bulk-load catalog items from a JSON file",
        long_about = "Read a JSON array of coins and banknotes and store them without an author. Every item is validated first; nothing is written unless all of them pass."
    )]
    Import {
        #[arg(
            long,
            value_name = "PATH",
            help = "JSON file holding an array of items"
        )]
        file: PathBuf,
    },
}
