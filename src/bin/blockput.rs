use blockput::cli::{actions::object_put, start};
use bytesize::ByteSize;
use colored::Colorize;
use std::process;

#[tokio::main]
async fn main() {
    let (store, action, globals) = match start() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("{e:#}").red());
            process::exit(1);
        }
    };

    let key = action.key.clone();
    let quiet = globals.quiet;

    match object_put::handle(store, action, globals).await {
        Ok(total) => {
            if !quiet {
                println!("{key} {}", ByteSize(total));
            }
        }
        Err(e) => {
            eprintln!("{}", format!("Error: {e:#}").red());
            process::exit(1);
        }
    }
}
