use bytesize::ByteSize;
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::ValueParser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Sizes like `8388608`, `8MiB` or `8 MB`
pub fn validator_size() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<u64, String> {
        s.trim()
            .parse::<ByteSize>()
            .map(|size| size.as_u64())
            .map_err(|e| format!("Not a valid size '{s}': {e}"))
    })
}

pub fn validator_is_num() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<usize, String> {
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(String::from("Not a valid number")),
        }
    })
}

pub fn validator_is_file() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<PathBuf, String> {
        if let Ok(metadata) = fs::metadata(s) {
            if metadata.is_file() {
                return Ok(PathBuf::from(s));
            }
        }

        Err(format!("Invalid file path or file does not exist: '{s}'"))
    })
}

pub fn validator_is_dir() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<PathBuf, String> {
        if let Ok(metadata) = fs::metadata(s) {
            if metadata.is_dir() {
                return Ok(PathBuf::from(s));
            }
        }

        Err(format!("Invalid path or directory does not exist: '{s}'"))
    })
}

pub fn new(config_path: &Path) -> Command {
    // get config file path (default: ~/.config/blockput/config.yml)
    let config_file_path = config_path.join("config.yml");

    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("blockput")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stream a file or STDIN into an object store in blocks")
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("config")
            .default_value(config_file_path.into_os_string())
            .long("config")
            .num_args(1)
            .short('c')
            .value_parser(clap::value_parser!(PathBuf))
            .value_name("config.yml")
        )
        .arg(
            Arg::new("block-size")
            .help("Size of every block/part, example: 8MiB")
            .long("block-size")
            .short('b')
            .env("BLOCKPUT_BLOCK_SIZE")
            .num_args(1)
            .value_parser(validator_size())
        )
        .arg(
            Arg::new("buffer-pool")
            .help("Memory reserved for blocks waiting to be uploaded, example: 32MiB")
            .long("buffer-pool")
            .env("BLOCKPUT_BUFFER_POOL")
            .num_args(1)
            .value_parser(validator_size())
        )
        .arg(
            Arg::new("workers")
            .help("Number of concurrent part uploads")
            .long("workers")
            .short('w')
            .env("BLOCKPUT_WORKERS")
            .num_args(1)
            .value_parser(validator_is_num())
        )
        .arg(
            Arg::new("digest")
            .help("Digest sent with every block")
            .long("digest")
            .env("BLOCKPUT_DIGEST")
            .value_parser([
                "md5",
                "sha1",
                "sha256",
                "crc32",
                "crc32c",
                "none",
            ])
            .value_name("algorithm")
            .num_args(1)
        )
        .arg(
            Arg::new("quiet")
            .long("quiet")
            .short('q')
            .help("Don't show progress")
            .num_args(0)
        )
        .arg(
            Arg::new("verbose")
            .help("Verbosity level")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
        )
        .arg(
            Arg::new("root")
            .help("Directory where objects are stored")
            .required(true)
            .value_parser(validator_is_dir())
        )
        .arg(
            Arg::new("key")
            .help("Object key, example: backups/db.tar")
            .required(true)
        )
        .arg(
            Arg::new("file")
            .help("File to upload, reads from STDIN if missing")
            .value_parser(validator_is_file())
        )
}
