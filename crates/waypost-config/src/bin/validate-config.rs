//! Config validation CLI tool
//!
//! Validates a waypost configuration file and prints the effective settings.

use std::path::PathBuf;
use std::process::ExitCode;
use waypost_config::ConfigError;
use waypost_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a waypost configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match waypost_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", waypost_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.service.socket_path.display());
            if let Some(addr) = settings.service.tcp_listen {
                println!("  TCP listen: {}", addr);
            }
            println!("  Data dir: {}", settings.service.data_dir.display());
            println!();
            println!("Detector:");
            println!("  Stop radius: {} m", settings.detector.stop_radius_meters);
            println!(
                "  Minimum stop: {} min",
                settings.detector.min_stop_duration.num_minutes()
            );
            println!("  Moving speed: {} km/h", settings.detector.min_moving_speed_kmh);
            println!(
                "  Dedup window: ±{} min, ±{}°",
                settings.dedup.time_tolerance.num_minutes(),
                settings.dedup.coord_tolerance_degrees
            );
            println!();
            println!("Scanner:");
            println!("  Workers: {}", settings.scanner.workers);
            match settings.scanner.interval {
                Some(interval) => println!("  Interval: {} min", interval.as_secs() / 60),
                None => println!("  Interval: disabled"),
            }
            println!("  Lookback: {} h", settings.scanner.lookback.num_hours());
            println!();
            println!("Hub:");
            println!("  Queue capacity: {}", settings.hub.queue_capacity);
            println!("  Ping every: {:?}", settings.hub.ping_interval);
            println!("  Read timeout: {:?}", settings.hub.read_timeout);

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        waypost_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
