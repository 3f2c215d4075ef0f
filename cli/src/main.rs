use anyhow::Context;
use blkcrypt_core::{BlkcryptError, CommandRunner, Config, DeviceIdentifier, SystemCommandRunner};
use blkcrypt_platform::{ensure_root, DeviceClassifier, DiskDump, Listing, Lsblk, Tune2fs};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "blkcrypt")]
#[command(about = "Find block devices eligible for encryption", long_about = None)]
struct Cli {
    /// JSON config file (defaults to $BLKCRYPT_CONFIG, then ~/.config/blkcrypt/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show lsblk attributes of a device, or list every device
    Lsblk {
        /// Device path; omit to list all devices
        device: Option<String>,
        /// Identifier to list devices by (NAME, LABEL, UUID, KNAME)
        #[arg(long, default_value = "NAME")]
        by: String,
    },
    /// Show ext filesystem metadata of a device
    Tune2fs {
        /// Device path
        device: String,
    },
    /// Classify devices for encryption (requires root)
    Classify {
        /// Device to describe before the valid-device table
        device: Option<String>,
        /// Print the valid-device report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy one device or file to another with dd (requires root)
    Dd {
        /// Input device or file
        #[arg(long = "if")]
        input: String,
        /// Output device or file; its contents are overwritten
        #[arg(long = "of")]
        output: String,
        /// Block size passed to dd
        #[arg(long)]
        bs: Option<String>,
        /// Number of blocks to copy
        #[arg(long)]
        count: Option<u64>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    for tool in config.missing_tools() {
        tracing::warn!("{} not found on PATH", tool);
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());

    match cli.command {
        Commands::Lsblk { device, by } => {
            let lsblk = Lsblk::new(runner, &config);
            match lsblk.list(device.as_deref(), &by)? {
                Listing::Attributes(data) => {
                    for (key, value) in &data {
                        println!("{} {}", key, value);
                    }
                }
                Listing::Devices(mut devices) => {
                    devices.sort();
                    for device in devices {
                        println!("{}", device);
                    }
                }
            }
        }
        Commands::Tune2fs { device } => {
            let tune2fs = Tune2fs::new(runner, &config);
            for (key, value) in &tune2fs.info(&device)? {
                println!("{:<25} = {}", key, value);
            }
        }
        Commands::Classify { device, json } => {
            require_root();
            let classifier = DeviceClassifier::new(runner, &config);
            match device {
                Some(device) => describe_device(&classifier, &device, json)?,
                None => list_devices(&classifier, json)?,
            }
        }
        Commands::Dd {
            input,
            output,
            bs,
            count,
            yes,
        } => {
            require_root();
            let dump = DiskDump::new(runner, &config);

            if !yes {
                println!(
                    "WARNING: This will OVERWRITE {} with {}!",
                    output, input
                );
                println!("Type 'yes' to continue: ");

                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
                if line.trim() != "yes" {
                    println!("Copy cancelled.");
                    return Ok(());
                }
            }

            let code = dump.dd_passthrough(&input, &output, bs.as_deref(), count);
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn require_root() {
    if let Err(e) = ensure_root() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn list_devices(classifier: &DeviceClassifier, json: bool) -> anyhow::Result<()> {
    if json {
        let report = classifier.valid_device_report()?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for device in classifier.lsblk().devices(DeviceIdentifier::Uuid)? {
        println!("{}", device);
    }

    println!("{}", "=".repeat(40));
    println!("{:#?}", classifier.valid_devices()?);
    Ok(())
}

fn describe_device(classifier: &DeviceClassifier, device: &str, json: bool) -> anyhow::Result<()> {
    let data = classifier.lsblk().info(device)?;
    println!("{}", data.len());
    println!("{:#?}", data);

    println!("   SIZE     : {}", or_unknown(ext_metadata(classifier.size(device))?));
    println!("   FREE SIZE: {}", or_unknown(ext_metadata(classifier.free_size(device))?));
    println!("   UUID     : {}", or_unknown(ext_metadata(classifier.uuid(device))?));
    println!("   UUID     : {}", or_unknown(data.get("UUID")));

    let report = classifier.valid_device_report()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for valid in &report {
            println!(
                "{:<30} {:<10} {:<10} {:<10}",
                valid.path,
                valid.disk_type,
                valid.fstype,
                or_unknown(valid.last_mountpoint.as_ref())
            );
        }
    }

    println!("IS THIS PREBOOT? {}", classifier.is_preboot());
    Ok(())
}

/// A device without an ext superblock simply has no tune2fs-derived values.
fn ext_metadata<T>(result: blkcrypt_core::Result<Option<T>>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(value),
        Err(BlkcryptError::Tune2fs(msg)) => {
            tracing::warn!("{}", msg);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn or_unknown<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_dd_operands() {
        let cli = Cli::parse_from([
            "blkcrypt", "dd", "--if", "/dev/zero", "--of", "/dev/sdb", "--bs", "1M", "--count",
            "4", "--yes",
        ]);
        match cli.command {
            Commands::Dd {
                input,
                output,
                bs,
                count,
                yes,
            } => {
                assert_eq!(input, "/dev/zero");
                assert_eq!(output, "/dev/sdb");
                assert_eq!(bs.as_deref(), Some("1M"));
                assert_eq!(count, Some(4));
                assert!(yes);
            }
            _ => panic!("expected dd"),
        }
    }

    #[test]
    fn lsblk_defaults_to_name() {
        let cli = Cli::parse_from(["blkcrypt", "-vv", "lsblk"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Lsblk { device, by } => {
                assert!(device.is_none());
                assert_eq!(by, "NAME");
            }
            _ => panic!("expected lsblk"),
        }
    }

    #[test]
    fn unknown_values_render_as_unknown() {
        assert_eq!(or_unknown(None::<u64>), "unknown");
        assert_eq!(or_unknown(Some(4096u64)), "4096");
    }

    #[test]
    fn tune2fs_failures_become_missing_values() {
        let missing = ext_metadata::<u64>(Err(BlkcryptError::Tune2fs("bad magic".into())));
        assert!(matches!(missing, Ok(None)));

        let fatal = ext_metadata::<u64>(Err(BlkcryptError::ToolNotFound("tune2fs".into())));
        assert!(fatal.is_err());
    }
}
