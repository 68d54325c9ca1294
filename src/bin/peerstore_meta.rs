//! CLI entry point for peerstore-meta: replica export/import tool.
//!
//! Operates on a stopped node's data directory.

use clap::{Parser, Subcommand};
use peerstore::serialization::{
    export_snapshot, import_snapshot, ExportOptions, ImportOptions,
};
use peerstore::store::{Namespace, ReplicaStore};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "peerstore-meta", about = "peerstore replica export/import tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export both namespaces to JSON
    Export {
        #[arg(long, default_value = "peerstore.yaml")]
        config: PathBuf,
        #[arg(long)]
        data_dir: Option<String>,
        #[arg(long, default_value = "-")]
        output: String,
        #[arg(long, default_value_t = false)]
        include_passwords: bool,
    },
    /// Import a JSON export or a `/data` dump
    Import {
        #[arg(long, default_value = "peerstore.yaml")]
        config: PathBuf,
        #[arg(long)]
        data_dir: Option<String>,
        #[arg(long, default_value = "-")]
        input: String,
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
}

fn open_store(config: &PathBuf, data_dir: Option<String>) -> anyhow::Result<ReplicaStore> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => peerstore::config::load_config(config)?.storage.data_dir,
    };
    ReplicaStore::open(dir)
}

fn main() {
    let cli = Cli::parse();
    let rc = match cli.command {
        Commands::Export {
            config,
            data_dir,
            output,
            include_passwords,
        } => run_export(config, data_dir, output, include_passwords),
        Commands::Import {
            config,
            data_dir,
            input,
            replace,
        } => run_import(config, data_dir, input, replace),
    };
    std::process::exit(rc);
}

fn run_export(config: PathBuf, data_dir: Option<String>, output: String, include_passwords: bool) -> i32 {
    let store = match open_store(&config, data_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening data directory: {}", e);
            return 1;
        }
    };

    let opts = ExportOptions { include_passwords };

    match export_snapshot(&store, &opts) {
        Ok(result) => {
            if output == "-" {
                println!("{}", result);
            } else {
                if let Err(e) = std::fs::write(&output, format!("{}\n", result)) {
                    eprintln!("Error writing output: {}", e);
                    return 1;
                }
                eprintln!("Exported to {}", output);
            }
            0
        }
        Err(e) => {
            eprintln!("Error exporting: {}", e);
            1
        }
    }
}

fn run_import(config: PathBuf, data_dir: Option<String>, input: String, replace: bool) -> i32 {
    let store = match open_store(&config, data_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening data directory: {}", e);
            return 1;
        }
    };

    let json_str = if input == "-" {
        let mut buf = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
            eprintln!("Error reading stdin: {}", e);
            return 1;
        }
        buf
    } else {
        match std::fs::read_to_string(&input) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                return 1;
            }
        }
    };

    let opts = ImportOptions { replace };

    match import_snapshot(&store, &json_str, &opts) {
        Ok(result) => {
            for ns in Namespace::ALL {
                if let Some(count) = result.counts.get(ns.as_str()) {
                    let skip = result.skipped.get(ns.as_str()).unwrap_or(&0);
                    let mut msg = format!("  {}: {} imported", ns, count);
                    if *skip > 0 {
                        msg.push_str(&format!(", {} skipped", skip));
                    }
                    eprintln!("{}", msg);
                }
            }
            for w in &result.warnings {
                eprintln!("  WARNING: {}", w);
            }
            0
        }
        Err(e) => {
            eprintln!("Error importing: {}", e);
            1
        }
    }
}
