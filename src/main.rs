pub mod classify;
pub mod cli;
pub mod driver;
pub mod emit;
pub mod error;
pub mod mapping;
pub mod model;
pub mod names;
pub mod path_de;
pub mod remap;
pub mod resolver;
pub mod versions;

use colored::Colorize;

fn main() {
    let command_line_interface = cli::CommandLineInterface::load();
    if let Err(error) = command_line_interface.run() {
        eprintln!("{} {error}", "error:".red());
        std::process::exit(1);
    }
}
