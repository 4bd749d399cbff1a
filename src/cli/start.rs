use crate::{
    cli::{Config, actions::PutObject, commands, globals::GlobalArgs},
    s3::LocalStore,
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// # Errors
/// Will return an error if the config directory can not be created
pub fn get_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().map_or_else(|| PathBuf::from("/tmp"), |h| h);

    let config_path = Path::new(&home_dir).join(".config").join("blockput");
    fs::create_dir_all(&config_path)
        .context(format!("unable to create: {}", &config_path.display()))?;

    Ok(config_path)
}

/// # Errors
/// Will return an error if the config file can not be parsed or the
/// arguments are not valid
pub fn start() -> Result<(LocalStore, PutObject, GlobalArgs)> {
    let config_path = get_config_path()?;

    // start the command line interface
    let cmd = commands::new(&config_path);

    // get the matches
    let matches = cmd.get_matches();

    let verbosity_level = match matches.get_one::<u8>("verbose").copied().unwrap_or(0) {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };

    env_logger::Builder::new()
        .filter_level(verbosity_level)
        .init();

    log::info!("config path: {}", config_path.display());

    let config_file = matches
        .get_one::<PathBuf>("config")
        .ok_or_else(|| anyhow!("no config file found"))?;

    // the config file is optional, flags and defaults are enough
    let config = Config::load(config_file)?;

    log::debug!("config: {config:#?}");

    parse(&matches, config)
}

// flags override the config file
fn parse(matches: &ArgMatches, mut config: Config) -> Result<(LocalStore, PutObject, GlobalArgs)> {
    if let Some(block_size) = matches.get_one::<u64>("block-size") {
        config.block_size = Some(*block_size);
    }

    if let Some(buffer_pool) = matches.get_one::<u64>("buffer-pool") {
        config.buffer_pool_size = Some(*buffer_pool);
    }

    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.upload_workers = Some(*workers);
    }

    if let Some(digest) = matches.get_one::<String>("digest") {
        config.digest = Some(digest.clone());
    }

    let options = config.stream_options()?;

    let mut globals = GlobalArgs::new();
    globals.quiet = matches.get_one::<bool>("quiet").copied().unwrap_or(false);
    globals.set_workers(config.upload_workers());
    globals.set_buffer_pool(config.buffer_pool_size());

    let root = matches
        .get_one::<PathBuf>("root")
        .ok_or_else(|| anyhow!("no root directory"))?;

    let key = matches
        .get_one::<String>("key")
        .ok_or_else(|| anyhow!("no object key"))?;

    // fail before reading any input
    let store = LocalStore::new(root);
    store.object_path(key)?;

    let action = PutObject {
        key: key.clone(),
        file: matches.get_one::<PathBuf>("file").cloned(),
        options,
    };

    log::debug!("globals: {globals:#?}, action: {action:#?}");

    Ok((store, action, globals))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        cli::commands::new,
        s3::{checksum::DigestAlgorithm, limits::PartLimits},
        stream::DEFAULT_BLOCK_SIZE,
    };
    use tempfile::TempDir;

    #[test]
    fn test_get_config_path() {
        let config_path = get_config_path();
        assert!(config_path.is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let root = tmp_dir.path().to_str().unwrap();
        let matches = new(tmp_dir.path())
            .try_get_matches_from(vec!["blockput", "-q", root, "a/b"])
            .unwrap();

        let (store, action, globals) = parse(&matches, Config::default()).unwrap();
        assert_eq!(store.root(), tmp_dir.path());
        assert_eq!(action.key, "a/b");
        assert!(action.file.is_none());
        assert_eq!(action.options.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(action.options.digest, Some(DigestAlgorithm::Md5));
        assert!(globals.quiet);
    }

    #[test]
    fn test_flags_override_config() {
        let tmp_dir = TempDir::new().unwrap();
        let root = tmp_dir.path().to_str().unwrap();
        let matches = new(tmp_dir.path())
            .try_get_matches_from(vec![
                "blockput", "-b", "6MiB", "-w", "3", "--digest", "none", root, "key",
            ])
            .unwrap();

        let config = Config {
            block_size: Some(1024),
            upload_workers: Some(12),
            buffer_pool_size: Some(4096),
            digest: Some(String::from("sha1")),
            ..Default::default()
        };

        let (_, action, globals) = parse(&matches, config).unwrap();
        assert_eq!(action.options.block_size, 6 * 1024 * 1024);
        assert_eq!(action.options.digest, None);
        assert_eq!(action.options.limits, PartLimits::default());
        assert_eq!(globals.workers, 3);
        assert_eq!(globals.buffer_pool, 4096);
        assert!(!globals.quiet);
    }

    #[test]
    fn test_parse_invalid_key() {
        let tmp_dir = TempDir::new().unwrap();
        let root = tmp_dir.path().to_str().unwrap();
        let matches = new(tmp_dir.path())
            .try_get_matches_from(vec!["blockput", root, "../escape"])
            .unwrap();

        assert!(parse(&matches, Config::default()).is_err());
    }
}
