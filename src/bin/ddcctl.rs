//! `ddcctl`: DDC/CI monitor control from the command line.
//!
//! Exit codes: 0 success; 1 display not found, ambiguous or busy; 2
//! transport or no-response failure; 3 protocol or validation failure.

use {
    clap::{Parser, Subcommand},
    ddc_client::DisplayIdentifier,
    std::process::ExitCode,
};

#[derive(Debug, Parser)]
#[command(name = "ddcctl", about = "DDC/CI monitor control", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List DDC/CI-capable displays.
    ListDisplays {
        /// Stop after this many displays.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Read a VCP feature value.
    Get {
        /// Display selector: ordinal number, bus:N, edid:HEX or
        /// id:MANUFACTURER/MODEL/SERIAL.
        display: DisplayIdentifier,
        /// Feature code in hex, e.g. 10 or 0x10.
        #[arg(value_parser = parse_feature_code)]
        feature: u8,
    },
    /// Write a VCP feature value.
    Set {
        /// Display selector.
        display: DisplayIdentifier,
        /// Feature code in hex.
        #[arg(value_parser = parse_feature_code)]
        feature: u8,
        /// New value, decimal.
        value: u16,
        /// Confirm the write with a follow-up read.
        #[arg(long)]
        verify: bool,
    },
    /// Print the display's capabilities.
    Capabilities {
        /// Display selector.
        display: DisplayIdentifier,
        /// Print the raw string instead of the parsed profile.
        #[arg(long)]
        raw: bool,
    },
}

fn parse_feature_code(s: &str) -> Result<u8, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|_| format!("`{s}` is not a hex feature code"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ddcctl: {e}");
            ExitCode::from(e.exit_code() as u8)
        },
    }
}

#[cfg(target_os = "linux")]
fn run(cli: Cli) -> Result<(), ddc_client::Error> {
    use ddc_client::{DisplayHandle, I2cDev, SessionConfig, VcpValue};

    fn open(id: &DisplayIdentifier) -> Result<DisplayHandle<I2cDev>, ddc_client::Error> {
        let dref = ddc_client::resolve(id)?;
        DisplayHandle::open(dref, SessionConfig::default())
    }

    fn feature_name(code: u8) -> &'static str {
        ddc_client::describe(code).map(|d| d.name).unwrap_or("Unknown feature")
    }

    match cli.command {
        Command::ListDisplays { limit } => {
            let mut count = 0;
            for display in ddc_client::enumerate().take(limit.unwrap_or(usize::MAX)) {
                println!("{display}");
                count += 1;
            }
            if count == 0 {
                eprintln!("ddcctl: no DDC/CI-capable displays found");
            }
            Ok(())
        },
        Command::Get { display, feature } => {
            let mut handle = open(&display)?;
            match handle.get_vcp(feature)? {
                VcpValue::Continuous { current, maximum } | VcpValue::NonContinuous { current, maximum } => {
                    println!(
                        "VCP {feature:#04x} ({}): current {current}, maximum {maximum}",
                        feature_name(feature)
                    );
                },
                VcpValue::Table(bytes) => {
                    print!("VCP {feature:#04x} ({}):", feature_name(feature));
                    for b in bytes {
                        print!(" {b:02x}");
                    }
                    println!();
                },
            }
            Ok(())
        },
        Command::Set {
            display,
            feature,
            value,
            verify,
        } => {
            let mut handle = open(&display)?;
            handle.set_vcp_with(feature, value, verify)
        },
        Command::Capabilities { display, raw } => {
            let mut handle = open(&display)?;
            if raw {
                println!("{}", handle.get_capabilities_string()?);
                return Ok(());
            }
            let profile = handle.read_capabilities()?;
            if let Some(model) = &profile.model {
                println!("Model: {model}");
            }
            if let Some((major, minor)) = profile.mccs_version {
                println!("MCCS version: {major}.{minor}");
            }
            for (code, permitted) in &profile.features {
                if permitted.is_empty() {
                    println!("  {code:#04x} {}", feature_name(*code));
                } else {
                    let values: Vec<String> = permitted.iter().map(|v| format!("{v:02x}")).collect();
                    println!("  {code:#04x} {}: {}", feature_name(*code), values.join(" "));
                }
            }
            Ok(())
        },
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_cli: Cli) -> Result<(), ddc_client::Error> {
    eprintln!("ddcctl: no display transport available on this platform");
    std::process::exit(2);
}
