use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use fslp_core::validator::hex;
use fslp_core::{
    Dispatcher, FrameCodec, PortConfig, PortGuard, PortResolver, ProtocolValidator,
    TracingObserver, TransportKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "FSLP camera link tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the byte-exact protocol conformance suite (no hardware needed)
    Validate {
        /// Only report failures
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show which transports are usable on this host
    Probe,
    /// Send one command and print the response data
    Send {
        /// Port configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Transport type string when no config file is given (smbus, aardvark, i2cdriver, v4l2)
        #[arg(long = "type")]
        type_string: Option<String>,

        /// Bus number, port index or device path
        #[arg(long)]
        address: Option<String>,

        /// Function id, e.g. 0x00060026
        #[arg(long, value_parser = parse_u32)]
        function: u32,

        /// Command data as hex
        #[arg(long, default_value = "")]
        data: String,

        /// Expected response data length in bytes
        #[arg(long, default_value_t = 0)]
        expect: usize,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if let Some(c) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        bail!("invalid hex digit '{}'", c);
    }
    if digits.len() % 2 != 0 {
        bail!("hex data has an odd number of digits");
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| -> Result<u8> {
            let pair = std::str::from_utf8(pair)?;
            u8::from_str_radix(pair, 16).map_err(|e| anyhow!("invalid hex '{}': {}", pair, e))
        })
        .collect()
}

fn validate(quiet: bool) -> Result<()> {
    let mut validator = ProtocolValidator::new();
    let report = validator.run_suite();

    for check in &report.checks {
        match (&check.detail, check.passed) {
            (_, true) if quiet => {}
            (_, true) => println!("PASS  {}", check.name),
            (Some(detail), false) => println!("FAIL  {}: {}", check.name, detail),
            (None, false) => println!("FAIL  {}", check.name),
        }
    }
    if !quiet {
        println!(
            "{}/{} passed ({:.1}%)",
            report.passed(),
            report.total(),
            report.success_rate()
        );
    }
    if !report.all_passed() {
        bail!("{} conformance checks failed", report.failed());
    }
    Ok(())
}

fn probe() {
    let resolver = PortResolver::new();
    for kind in TransportKind::ALL {
        match resolver.capability(kind) {
            fslp_core::Capability::Available => println!("{:<10} available", kind),
            fslp_core::Capability::Unavailable(reason) => {
                println!("{:<10} unavailable: {}", kind, reason)
            }
        }
    }
}

fn send(
    config: Option<PathBuf>,
    type_string: Option<String>,
    address: Option<String>,
    function: u32,
    data: &str,
    expect: usize,
) -> Result<()> {
    let mut config = match config {
        Some(path) => PortConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PortConfig::new(TransportKind::from_type_string(type_string.as_deref())),
    };
    if address.is_some() {
        config.address = address;
    }
    let data = parse_hex(data)?;

    let resolver = PortResolver::new().with_observer(Arc::new(TracingObserver));
    let transport = resolver.resolve(&config)?;
    let port = PortGuard::open(transport).context("opening transport")?;

    let codec = FrameCodec::new(port).with_strategy(config.header);
    let mut dispatcher = Dispatcher::new(codec);
    let response = dispatcher.dispatch(function, &data, expect)?;

    info!(
        function_id = %format!("0x{:08X}", function),
        len = response.len(),
        "Response received"
    );
    println!("{}", hex(&response));
    Ok(())
}

fn main() {
    let args = Args::parse();

    let quiet = matches!(args.command, Command::Validate { quiet: true });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else if quiet {
                    tracing::Level::WARN.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", e);
    }

    let result = match args.command {
        Command::Validate { quiet } => validate(quiet),
        Command::Probe => {
            probe();
            Ok(())
        }
        Command::Send {
            config,
            type_string,
            address,
            function,
            data,
            expect,
        } => send(config, type_string, address, function, &data, expect),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
