//! # FastCoding CLI - Coding-System Converter
//!
//! Command-line interface for streaming conversions, encoding detection and
//! inspection of the coding-system registry.

#[cfg(feature = "cli")]
use std::fs::File;
#[cfg(feature = "cli")]
use std::io::{self, BufWriter, Read, Write};
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use serde::Serialize;
#[cfg(feature = "cli")]
use tracing::{debug, info};
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
use fast_coding::multibyte::{char_is_byte8, char_to_byte8};
#[cfg(feature = "cli")]
use fast_coding::{
    CharsetRegistry, CodingSystem, ConvertOptions, DetectOptions, EncodingDetector, Registry,
    Report,
};

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features disabled. Enable with --features cli");
    std::process::exit(1);
}

/// FastCoding: streaming coding-system converter
#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "fast-coding")]
#[command(version, about, long_about = None)]
#[command(author = "FastCoding Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// JSON file with extra charsets, coding systems and aliases
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Convert data between coding systems
    Convert(ConvertArgs),

    /// Detect the coding system of input data
    Detect(DetectArgs),

    /// List registered coding systems
    List(ListArgs),

    /// Check that data decodes without invalid sequences
    Validate(ValidateArgs),

    /// Display the definition of a coding system or charset
    Info(InfoArgs),
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ConvertArgs {
    /// Source coding system
    #[arg(short = 'f', long = "from", default_value = "undecided")]
    from: String,

    /// Target coding system
    #[arg(short = 't', long = "to", default_value = "utf-8")]
    to: String,

    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write `?` for characters the target cannot encode
    #[arg(long)]
    safe: bool,

    /// Bytes read per chunk (KB)
    #[arg(long, default_value = "64")]
    chunk_size: usize,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct DetectArgs {
    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Show every plausible coding system
    #[arg(long)]
    all: bool,

    /// Maximum bytes to read for detection
    #[arg(long, default_value = "8192")]
    sample_size: usize,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ListArgs {
    /// Filter by codec type (utf-8, utf-16, iso-2022, sjis, big5, ...)
    #[arg(short, long)]
    kind: Option<String>,

    /// Show aliases and end-of-line convention
    #[arg(long)]
    details: bool,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ValidateArgs {
    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Expected coding system
    #[arg(short, long)]
    coding: String,

    /// Show positions of invalid bytes
    #[arg(long)]
    show_errors: bool,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct InfoArgs {
    /// Coding system (or charset with --charset) to describe
    name: String,

    /// Describe a charset instead of a coding system
    #[arg(long)]
    charset: bool,
}

#[cfg(feature = "cli")]
#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct ConversionResult {
    decode: Report,
    encode: Report,
    processing_time_ms: u64,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct DetectionSummary {
    coding: String,
    category: String,
    eol: String,
    bom_detected: bool,
    null_byte: bool,
    sample_size: usize,
    candidates: Vec<String>,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct ValidationResult {
    coding: String,
    valid: bool,
    invalid: usize,
    /// Character offset and byte value of each invalid byte.
    errors: Vec<(usize, u8)>,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut registry = Registry::new();
    if let Some(ref path) = cli.config {
        registry
            .load_config_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
    }

    match cli.command {
        Commands::Convert(ref args) => convert_command(&registry, args, &cli)?,
        Commands::Detect(ref args) => detect_command(&registry, args, &cli)?,
        Commands::List(ref args) => list_command(&registry, args, &cli)?,
        Commands::Validate(ref args) => validate_command(&registry, args, &cli)?,
        Commands::Info(ref args) => info_command(&registry, args, &cli)?,
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

#[cfg(feature = "cli")]
fn read_all(path: Option<&Path>) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    open_input(path)?
        .read_to_end(&mut buffer)
        .context("Failed to read input")?;
    Ok(buffer)
}

#[cfg(feature = "cli")]
fn convert_command(registry: &Registry, args: &ConvertArgs, cli: &Cli) -> Result<()> {
    let start_time = std::time::Instant::now();
    let options = ConvertOptions {
        safe: args.safe,
        ..ConvertOptions::default()
    };

    let mut decoder = registry
        .decoder_with(&args.from, options)
        .with_context(|| format!("Unknown source coding system: {}", args.from))?;
    let mut encoder = registry
        .encoder_with(&args.to, options)
        .with_context(|| format!("Unknown target coding system: {}", args.to))?;
    debug!(from = %args.from, to = %args.to, "converting");

    let mut input = open_input(args.input.as_deref())?;
    let mut output: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut chunk = vec![0u8; args.chunk_size.max(1) * 1024];
    loop {
        let read = input.read(&mut chunk).context("Failed to read input")?;
        let last = read == 0;
        let text = decoder.feed(&chunk[..read], last);
        let bytes = encoder.feed_text(&text, last);
        output.write_all(&bytes).context("Failed to write output")?;
        if last {
            break;
        }
    }
    output.flush().context("Failed to flush output")?;

    let result = ConversionResult {
        decode: decoder.report(),
        encode: encoder.report(),
        processing_time_ms: start_time.elapsed().as_millis() as u64,
    };

    match cli.format {
        OutputFormat::Json => {
            eprintln!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            if cli.verbose || result.decode.invalid > 0 || result.encode.invalid > 0 {
                eprintln!(
                    "{} -> {}: {} bytes -> {} bytes, {} invalid, {} substituted in {} ms",
                    result.decode.coding,
                    result.encode.coding,
                    result.decode.consumed,
                    result.encode.produced,
                    result.decode.invalid,
                    result.encode.invalid,
                    result.processing_time_ms
                );
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn detect_command(registry: &Registry, args: &DetectArgs, cli: &Cli) -> Result<()> {
    let mut sample = Vec::with_capacity(args.sample_size);
    open_input(args.input.as_deref())?
        .take(args.sample_size as u64)
        .read_to_end(&mut sample)
        .context("Failed to read input")?;

    let options = DetectOptions {
        highest: !args.all,
        sample_limit: args.sample_size,
        ..DetectOptions::default()
    };
    let detection = EncodingDetector::with_options(registry, options)
        .detect(&sample)
        .context("Detection failed")?;

    let summary = DetectionSummary {
        coding: detection.coding.name.clone(),
        category: detection.category.to_string(),
        eol: detection.eol.to_string(),
        bom_detected: detection.bom_detected,
        null_byte: detection.null_byte,
        sample_size: sample.len(),
        candidates: detection
            .candidates
            .iter()
            .map(|coding| coding.name.clone())
            .collect(),
    };

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("Detected coding system: {}", summary.coding);
            println!("Category: {}", summary.category);
            println!("End of line: {}", summary.eol);
            if summary.bom_detected {
                println!("BOM detected: Yes");
            }
            if summary.null_byte {
                println!("NUL bytes: Yes");
            }
            println!("Sample size: {} bytes", summary.sample_size);

            if args.all && summary.candidates.len() > 1 {
                println!("\nAll candidates:");
                for name in &summary.candidates {
                    println!("  {name}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn list_command(registry: &Registry, args: &ListArgs, cli: &Cli) -> Result<()> {
    let codings: Vec<_> = registry
        .coding_systems()
        .into_iter()
        .filter(|coding| {
            args.kind
                .as_deref()
                .is_none_or(|kind| coding.type_name() == kind)
        })
        .collect();

    match cli.format {
        OutputFormat::Json => {
            let infos: Vec<_> = codings
                .iter()
                .map(|coding| {
                    serde_json::json!({
                        "name": coding.name,
                        "type": coding.type_name(),
                        "category": coding.category.name(),
                        "mnemonic": coding.mnemonic.to_string(),
                        "eol": coding.eol.to_string(),
                        "aliases": registry.aliases_of(&coding.name),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        OutputFormat::Text => {
            println!("Coding systems ({} total):", codings.len());
            println!();

            for coding in &codings {
                println!(
                    "{} {:28} {:12} {}",
                    coding.mnemonic,
                    coding.name,
                    format!("[{}]", coding.type_name()),
                    coding.category
                );

                if args.details {
                    let aliases = registry.aliases_of(&coding.name);
                    if !aliases.is_empty() {
                        println!("    Aliases: {}", aliases.join(", "));
                    }
                    println!("    End of line: {}", coding.eol);
                    println!();
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn validate_command(registry: &Registry, args: &ValidateArgs, cli: &Cli) -> Result<()> {
    let input_data = read_all(args.input.as_deref())?;

    let decoded = fast_coding::api::decode(registry, &args.coding, &input_data)
        .with_context(|| format!("Unknown coding system: {}", args.coding))?;

    let errors: Vec<(usize, u8)> = decoded
        .text
        .chars
        .iter()
        .enumerate()
        .filter(|&(_, &c)| char_is_byte8(c))
        .map(|(i, &c)| (i, char_to_byte8(c)))
        .collect();
    let result = ValidationResult {
        coding: decoded.report.coding.clone(),
        valid: decoded.report.invalid == 0,
        invalid: decoded.report.invalid,
        errors,
    };

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            if result.valid {
                println!("✓ Input is valid {}", result.coding);
            } else {
                println!(
                    "✗ Input is not valid {} ({} invalid sequences)",
                    result.coding, result.invalid
                );
                if args.show_errors {
                    for (position, byte) in &result.errors {
                        println!("  Invalid byte 0x{byte:02X} at character {position}");
                    }
                }
            }
        }
    }

    if !result.valid {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn info_command(registry: &Registry, args: &InfoArgs, cli: &Cli) -> Result<()> {
    if args.charset {
        return charset_info(registry, &args.name, cli);
    }

    let coding = registry
        .get(&args.name)
        .with_context(|| format!("Unknown coding system: {}", args.name))?;

    match cli.format {
        OutputFormat::Json => {
            let info = serde_json::json!({
                "name": coding.name,
                "base": coding.base,
                "type": coding.type_name(),
                "category": coding.category.name(),
                "eol": coding.eol.to_string(),
                "ascii_compatible": coding.ascii_compatible,
                "charsets": charset_names(registry, &coding),
                "aliases": registry.aliases_of(&coding.name),
                "definition": coding.spec,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Text => {
            println!("Coding system: {}", coding.name);
            if let Some(ref base) = coding.base {
                println!("Base: {base}");
            }
            println!("Type: {}", coding.type_name());
            println!("Mnemonic: {}", coding.mnemonic);
            println!("Category: {}", coding.category);
            println!("End of line: {}", coding.eol);
            println!(
                "ASCII Compatible: {}",
                if coding.ascii_compatible { "Yes" } else { "No" }
            );
            println!("Default char: U+{:04X}", coding.default_char);
            let charsets = charset_names(registry, &coding);
            if !charsets.is_empty() {
                println!("Charsets: {}", charsets.join(", "));
            }
            let aliases = registry.aliases_of(&coding.name);
            if !aliases.is_empty() {
                println!("Aliases: {}", aliases.join(", "));
            }
            if let Some(ref table) = coding.spec.decode_translation {
                println!("Decode translation: {table}");
            }
            if let Some(ref table) = coding.spec.encode_translation {
                println!("Encode translation: {table}");
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn charset_info(registry: &Registry, name: &str, cli: &Cli) -> Result<()> {
    let charsets = registry.charsets();
    let id = charsets.id(name)?;
    let spec = charsets
        .spec(id)
        .with_context(|| format!("Charset without definition: {name}"))?;

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(spec)?);
        }
        OutputFormat::Text => {
            println!("Charset: {}", spec.name);
            println!("Dimension: {}", spec.dimension);
            let space: Vec<String> = spec
                .code_space
                .iter()
                .map(|(lo, hi)| format!("{lo:02X}-{hi:02X}"))
                .collect();
            println!("Code space: {}", space.join(" "));
            if let Some(ref iso) = spec.iso {
                println!("ISO-2022: {} chars, final '{}'", iso.chars, char::from(iso.final_char));
            }
            if let Some(mule) = spec.emacs_mule_id {
                println!("emacs-mule id: 0x{mule:02X}");
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn charset_names(registry: &Registry, coding: &CodingSystem) -> Vec<String> {
    let charsets = registry.charsets();
    coding
        .charsets
        .iter()
        .map(|&id| charsets.name(id).to_string())
        .collect()
}
