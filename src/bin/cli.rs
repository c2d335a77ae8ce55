//! ChestKV CLI
//!
//! Command-line interface for inspecting and editing a store.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use chestkv::{Chest, ChestError, Config, IndexFormat, Key, OpenMode, WriteMode};
use tracing_subscriber::{fmt, EnvFilter};

/// ChestKV CLI
#[derive(Parser, Debug)]
#[command(name = "chestkv-cli")]
#[command(about = "CLI for ChestKV embedded key-value stores")]
#[command(version)]
struct Args {
    /// Index file of the store (data file is the same path with .bin)
    #[arg(short, long, default_value = "./chest.db")]
    path: PathBuf,

    /// Index uses fixed (u32 key, u32 offset) rows instead of a map image
    #[arg(long)]
    fixed_rows: bool,

    /// How to interpret keys given on the command line
    #[arg(short, long, value_enum, default_value_t = KeyKind::Auto)]
    key_kind: KeyKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    List,

    /// Show allocation statistics
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyKind {
    /// Integer if it parses as one, string otherwise
    Auto,
    Int,
    Str,
    /// Hex-encoded bytes
    Hex,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,chestkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> chestkv::Result<()> {
    let mode = match args.command {
        Commands::Set { .. } | Commands::Del { .. } | Commands::Stats => OpenMode::ReadWrite,
        Commands::Get { .. } | Commands::List => OpenMode::ReadOnly,
    };
    let index_format = if args.fixed_rows {
        IndexFormat::FixedRows
    } else {
        IndexFormat::MapImage
    };

    let config = Config::builder()
        .path(&args.path)
        .mode(mode)
        .index_format(index_format)
        .write_mode(WriteMode::Inline)
        .build();
    let mut chest = Chest::open_with(config)?;

    match args.command {
        Commands::Get { key } => {
            let key = parse_key(&key, args.key_kind)?;
            let value = chest.get(key)?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Set { key, value } => {
            let key = parse_key(&key, args.key_kind)?;
            chest.set(key, value.as_bytes())?;
        }
        Commands::Del { key } => {
            let key = parse_key(&key, args.key_kind)?;
            chest.delete(key)?;
        }
        Commands::List => {
            for key in chest.keys() {
                println!("{}", key);
            }
        }
        Commands::Stats => {
            if let Chest::ReadWrite(engine) = &chest {
                let stats = engine.stats();
                println!("keys:          {}", stats.keys);
                println!("data bytes:    {}", stats.data_len);
                println!("free blocks:   {}", stats.free_blocks);
                println!("free bytes:    {}", stats.free_bytes);
                println!("fragments:     {}", stats.fragments);
                println!("index records: {}", stats.index_records);
            }
        }
    }

    chest.close()
}

fn parse_key(raw: &str, kind: KeyKind) -> chestkv::Result<Key> {
    let invalid = |what: &str| ChestError::InvalidArgument(format!("{}: {:?}", what, raw));
    match kind {
        KeyKind::Auto => Ok(raw
            .parse::<i64>()
            .map(Key::Int)
            .unwrap_or_else(|_| Key::from(raw))),
        KeyKind::Int => raw
            .parse::<i64>()
            .map(Key::Int)
            .map_err(|_| invalid("not an integer key")),
        KeyKind::Str => Ok(Key::from(raw)),
        KeyKind::Hex => {
            if raw.len() % 2 != 0 || !raw.is_ascii() {
                return Err(invalid("hex key must be an even number of hex digits"));
            }
            (0..raw.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&raw[i..i + 2], 16))
                .collect::<std::result::Result<Vec<u8>, _>>()
                .map(Key::Bytes)
                .map_err(|_| invalid("not a hex key"))
        }
    }
}
