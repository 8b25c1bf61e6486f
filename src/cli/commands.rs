use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;

use crate::core::{
    apdu::CommandApdu,
    config::ConnectOptions,
    context::Context,
    native::ShareMode,
    reader::ReaderState,
    utils::{format_ascii, format_hex, format_hex_spaced, parse_hex},
};

#[derive(Parser)]
#[command(name = "smartcard")]
#[command(about = "Talk to smart cards through the PC/SC resource manager")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available PC/SC readers
    List {
        /// Show detailed information about readers
        #[arg(short = 'l', long)]
        detailed: bool,

        /// Print the reader list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Wait for a card to be inserted (or removed)
    Wait {
        /// Wait for removal instead of insertion
        #[arg(short, long)]
        absent: bool,

        /// Give up after this many milliseconds (waits forever when omitted)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Send an APDU command
    Transmit {
        /// Reader name or index (use 'list' to see available readers)
        reader: String,

        /// APDU command in hex format (e.g., "00A40400")
        apdu: String,

        /// Connection share mode
        #[arg(short, long, default_value = "shared")]
        mode: ShareModeArg,

        /// Show response in different formats
        #[arg(short, long)]
        format: Option<ResponseFormat>,
    },

    /// Select an application by AID
    Select {
        /// Reader name or index (use 'list' to see available readers)
        reader: String,

        /// Application identifier in hex format
        aid: String,

        /// Connection share mode
        #[arg(short, long, default_value = "shared")]
        mode: ShareModeArg,

        /// Show response in different formats
        #[arg(short, long)]
        format: Option<ResponseFormat>,
    },
}

#[derive(Clone, Debug)]
pub enum ShareModeArg {
    Shared,
    Exclusive,
    Direct,
}

impl std::str::FromStr for ShareModeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(ShareModeArg::Shared),
            "exclusive" => Ok(ShareModeArg::Exclusive),
            "direct" => Ok(ShareModeArg::Direct),
            _ => Err(format!("Invalid share mode: {s}")),
        }
    }
}

impl From<ShareModeArg> for ShareMode {
    fn from(mode: ShareModeArg) -> Self {
        match mode {
            ShareModeArg::Shared => ShareMode::Shared,
            ShareModeArg::Exclusive => ShareMode::Exclusive,
            ShareModeArg::Direct => ShareMode::Direct,
        }
    }
}

impl From<ShareModeArg> for ConnectOptions {
    fn from(mode: ShareModeArg) -> Self {
        ConnectOptions::default().with_share_mode(mode.into())
    }
}

#[derive(Clone, Debug)]
pub enum ResponseFormat {
    Hex,
    HexSpaced,
    Ascii,
    All,
}

impl std::str::FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hex" => Ok(ResponseFormat::Hex),
            "spaced" => Ok(ResponseFormat::HexSpaced),
            "ascii" => Ok(ResponseFormat::Ascii),
            "all" => Ok(ResponseFormat::All),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

/// One reader in the `list --json` report.
#[derive(Debug, Serialize)]
struct ReaderReport {
    name: String,
    state: ReaderState,
    has_card: bool,
    atr: Option<String>,
    event_count: Option<u32>,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::List { detailed, json } => cmd_list(detailed, json),
        Commands::Wait { absent, timeout_ms } => {
            cmd_wait(absent, timeout_ms.map(Duration::from_millis))
        }
        Commands::Transmit {
            reader,
            apdu,
            mode,
            format,
        } => {
            let apdu = CommandApdu::from_bytes(parse_hex(&apdu).context("Failed to parse APDU")?);
            cmd_transmit(&reader, &apdu, mode.into(), format)
        }
        Commands::Select {
            reader,
            aid,
            mode,
            format,
        } => {
            let aid = parse_hex(&aid).context("Failed to parse AID")?;
            let apdu = CommandApdu::select(&aid).context("Failed to build SELECT command")?;
            cmd_transmit(&reader, &apdu, mode.into(), format)
        }
    }
}

fn cmd_list(detailed: bool, json: bool) -> Result<()> {
    let context = Context::establish().context("Failed to initialize PC/SC")?;

    let readers = context.list_readers().context("Failed to list readers")?;

    if json {
        let report: Vec<ReaderReport> = readers
            .iter()
            .map(|reader| ReaderReport {
                name: reader.name().to_string(),
                state: reader.current_state(),
                has_card: reader.has_card(),
                atr: reader.atr().map(|atr| atr.to_string()),
                event_count: reader.event_count(),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize reader list")?
        );
        return Ok(());
    }

    if readers.is_empty() {
        println!("No PC/SC readers found.");
        return Ok(());
    }

    println!("Available PC/SC readers:");
    for (i, reader) in readers.iter().enumerate() {
        if detailed {
            println!("  [{}] {}", i, reader.name());
            println!(
                "      Status: {}",
                if reader.has_card() {
                    "Card present"
                } else {
                    "No card"
                }
            );
            println!("      State: {}", reader.current_state().labels().join(", "));
            if let Some(atr) = reader.atr() {
                println!("      ATR: {}", format_hex_spaced(atr.as_bytes()));
            }
        } else if reader.has_card() {
            match reader.atr() {
                Some(atr) => println!(
                    "  [{}] {} [CARD - ATR: {}]",
                    i,
                    reader.name(),
                    format_hex_spaced(atr.as_bytes())
                ),
                None => println!("  [{}] {} [CARD]", i, reader.name()),
            }
        } else {
            println!("  [{}] {}", i, reader.name());
        }
    }

    Ok(())
}

fn cmd_wait(absent: bool, timeout: Option<Duration>) -> Result<()> {
    let context = Context::establish().context("Failed to initialize PC/SC")?;

    let reader = if absent {
        println!("Waiting for card removal...");
        context
            .wait_for_card_absent(timeout)
            .context("Failed waiting for card removal")?
    } else {
        println!("Waiting for card insertion...");
        context
            .wait_for_card_present(timeout)
            .context("Failed waiting for card insertion")?
    };

    if absent {
        println!("Card removed from: {}", reader.name());
    } else {
        println!("Card present in: {}", reader.name());
        if let Some(atr) = reader.atr() {
            println!("ATR: {}", format_hex_spaced(atr.as_bytes()));
        }
    }

    Ok(())
}

fn cmd_transmit(
    reader_name: &str,
    apdu: &CommandApdu,
    options: ConnectOptions,
    format: Option<ResponseFormat>,
) -> Result<()> {
    let context = Context::establish().context("Failed to initialize PC/SC")?;

    let reader_name = resolve_reader_name(&context, reader_name)?;
    let card = context
        .reader(reader_name.as_str())
        .connect_with(&options)
        .with_context(|| format!("Failed to connect to reader: {reader_name}"))?;

    println!("ATR: {}", format_hex_spaced(card.atr().as_bytes()));
    println!("Protocol: {}", card.protocol());
    println!("APDU: {apdu}");

    let response = card
        .transmit_apdu(apdu)
        .context("Failed to execute transmit command")?;

    let format = format.unwrap_or(ResponseFormat::HexSpaced);
    print_response(response.data(), &format);

    // Show status word interpretation
    println!(
        "Status: {:02X} {:02X} ({})",
        response.sw1(),
        response.sw2(),
        response.description()
    );

    Ok(())
}

fn resolve_reader_name(context: &Context, name_or_index: &str) -> Result<String> {
    // Try to parse as index first
    if let Ok(index) = name_or_index.parse::<usize>() {
        let readers = context.list_readers().context("Failed to list readers")?;
        if readers.is_empty() {
            bail!("No PC/SC readers found");
        }
        return match readers.get(index) {
            Some(reader) => Ok(reader.name().to_string()),
            None => bail!(
                "Reader index {} out of range (0-{})",
                index,
                readers.len() - 1
            ),
        };
    }

    // Use as reader name directly
    Ok(name_or_index.to_string())
}

fn print_response(data: &[u8], format: &ResponseFormat) {
    if data.is_empty() {
        println!("Response: (empty)");
        return;
    }

    match format {
        ResponseFormat::Hex => {
            println!("Response: {}", format_hex(data));
        }
        ResponseFormat::HexSpaced => {
            println!("Response: {}", format_hex_spaced(data));
        }
        ResponseFormat::Ascii => {
            println!("Response (ASCII): {}", format_ascii(data));
        }
        ResponseFormat::All => {
            println!("Response (Hex): {}", format_hex_spaced(data));
            println!("Response (ASCII): {}", format_ascii(data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_share_mode_arg() {
        assert!(matches!("Exclusive".parse::<ShareModeArg>(), Ok(ShareModeArg::Exclusive)));
        assert!("bogus".parse::<ShareModeArg>().is_err());
        let options: ConnectOptions = ShareModeArg::Direct.into();
        assert_eq!(options.share_mode, ShareMode::Direct);
        assert_eq!(options, ConnectOptions::default().with_share_mode(ShareMode::Direct));
    }

    #[test]
    fn test_wait_arguments() {
        let cli = Cli::try_parse_from(["smartcard", "wait", "--absent", "--timeout-ms", "250"]).unwrap();
        match cli.command {
            Commands::Wait { absent, timeout_ms } => {
                assert!(absent);
                assert_eq!(timeout_ms, Some(250));
            }
            _ => panic!("expected wait command"),
        }
    }

    #[test]
    fn test_response_format() {
        assert!(matches!("spaced".parse::<ResponseFormat>(), Ok(ResponseFormat::HexSpaced)));
        assert!("dump".parse::<ResponseFormat>().is_err());
    }
}
