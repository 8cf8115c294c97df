mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use sb_core::config::{Config, SubstrateKind};
use sb_core::MediaObject;
use sb_media::{generate_master_playlist, level_playlist_path, MasterPlaylist, QualityLadder};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streambridge=trace,sb_server=trace,sb_fetch=trace,sb_media=debug,sb_player=debug,tower_http=debug"
                .to_string()
        } else {
            "streambridge=info,sb_server=info,sb_fetch=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            media_root,
        } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = media_root {
                config.substrate.kind = SubstrateKind::Dir;
                config.substrate.root = root;
            }

            tracing::info!(
                "Bridge will listen on {}:{}",
                config.server.host,
                config.server.port
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sb_server::start(config))?;
            Ok(())
        }
        Commands::Manifest { media, levels } => {
            let config = Config::load_or_default(cli.config.as_deref());
            print_manifest(&media, &config, levels)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("streambridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn print_manifest(media_path: &Path, config: &Config, levels: bool) -> Result<()> {
    let json = std::fs::read_to_string(media_path)
        .with_context(|| format!("Failed to read {}", media_path.display()))?;
    let media: MediaObject = serde_json::from_str(&json)
        .with_context(|| format!("Invalid media object in {}", media_path.display()))?;

    let ladder = QualityLadder::build(&media)?;
    let master = MasterPlaylist::from_ladder(&ladder, media.duration_secs, config.bridge.default_bandwidth);
    print!("{}", generate_master_playlist(&master));

    if levels {
        println!();
        for height in ladder.heights() {
            println!("{height}p -> {}", level_playlist_path(height));
        }
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    match config.substrate.kind {
        SubstrateKind::Http => println!("  Substrate: http ({})", config.substrate.base_url),
        SubstrateKind::Dir => println!("  Substrate: dir ({})", config.substrate.root.display()),
    }
    println!("  Temp dir: {}", config.bridge.temp_dir().display());
    println!("  Session expiry: {}s", config.bridge.session_expiry_secs);

    let warnings = config.validate();
    for warning in &warnings {
        println!("  ! {warning}");
    }
    Ok(())
}
