//! streambox: chunked authenticated encryption for pipes and files
//!
//! Commands:
//!   keygen        - generate a new pre-shared key (base64)
//!   encrypt       - plaintext → length-prefixed XChaCha20-Poly1305 records
//!   decrypt       - records → plaintext, failing on any tampering or truncation
//!   inspect       - walk the records of a ciphertext stream without a key
//!   config show   - display the effective configuration
//!
//! Input and output default to stdin and stdout; logs go to stderr.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use zeroize::Zeroizing;

use streambox_core::config::{expand_tilde, StreamboxConfig};
use streambox_core::{LogFormat as ConfigLogFormat, StreamboxError};
use streambox_crypto::{
    generate_key, DecryptingReader, EncryptingReader, RecordScanner, StreamConfig, StreamKey,
    StreamStats,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "streambox",
    version,
    about = "Chunked authenticated stream encryption",
    long_about = "streambox: encrypt and decrypt byte streams of any length with a pre-shared key"
)]
struct Cli {
    /// Path to streambox.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "STREAMBOX_CONFIG",
        default_value = "~/.config/streambox/streambox.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "STREAMBOX_LOG", global = true)]
    log: Option<String>,

    /// Log format (json, text); overrides the config file
    #[arg(long, env = "STREAMBOX_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new 256-bit key
    ///
    /// Prints the base64 key to stdout unless --out is given.
    Keygen {
        /// Write the key to this file (created with mode 0600)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a plaintext stream
    Encrypt {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        key: KeyArgs,
        /// Plaintext bytes per record (overrides config)
        #[arg(long)]
        message_size: Option<usize>,
        /// Show a progress spinner on stderr
        #[arg(long)]
        progress: bool,
    },

    /// Decrypt a stream produced by `encrypt`
    ///
    /// On failure nothing after the last authenticated record is written, and
    /// a partially written output file is removed.
    Decrypt {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        key: KeyArgs,
        /// Show a progress spinner on stderr
        #[arg(long)]
        progress: bool,
    },

    /// Check the framing of a ciphertext stream and summarize its records
    Inspect {
        /// Ciphertext file (default: stdin)
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
        /// List every record
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug, Default)]
struct IoArgs {
    /// Input file (default: stdin)
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,
    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct KeyArgs {
    /// Key file: 32 raw bytes or base64 text (overrides env and config)
    #[arg(long, short = 'k')]
    key_file: Option<PathBuf>,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl From<ConfigLogFormat> for LogFormat {
    fn from(format: ConfigLogFormat) -> Self {
        match format {
            ConfigLogFormat::Json => LogFormat::Json,
            ConfigLogFormat::Text => LogFormat::Text,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.log.format.into());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => log_filter(&level)?,
    };
    init_logging(filter, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "streambox starting"
    );
    if !config_path.exists() {
        warn!(config = %config_path.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Keygen { out, force } => cmd_keygen(out.as_deref(), force),
        Commands::Encrypt { io, key, message_size, progress } => {
            let stats = cmd_encrypt(&config, &io, key.key_file.as_deref(), message_size, progress)?;
            info!(
                records = stats.records,
                plaintext = stats.bytes_in,
                ciphertext = stats.bytes_out,
                "encrypted stream"
            );
            Ok(())
        }
        Commands::Decrypt { io, key, progress } => {
            let stats = cmd_decrypt(&config, &io, key.key_file.as_deref(), progress)?;
            info!(
                records = stats.records,
                ciphertext = stats.bytes_in,
                plaintext = stats.bytes_out,
                "decrypted stream"
            );
            Ok(())
        }
        Commands::Inspect { input, verbose } => cmd_inspect(&config, input.as_deref(), verbose),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

/// Build the filter for a configured level.
///
/// Accepts a bare level (`info`) or full `EnvFilter` directives
/// (`warn,streambox=debug`).
fn log_filter(level: &str) -> Result<EnvFilter> {
    // A bare word would otherwise parse as a target name.
    if !level.contains('=') {
        level.trim().parse::<LevelFilter>().map_err(|_| {
            anyhow!("unknown log level {level:?} (expected trace, debug, info, warn, error or off)")
        })?;
    }
    EnvFilter::try_new(level).with_context(|| format!("invalid log filter {level:?}"))
}

fn init_logging(filter: EnvFilter, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    // stdout carries stream data; logs always go to stderr.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<StreamboxConfig> {
    if !path.exists() {
        return Ok(StreamboxConfig::default());
    }
    let config = StreamboxConfig::from_file(path)
        .with_context(|| format!("loading config: {}", path.display()))?;
    if let Err(e) = log_filter(&config.log.level) {
        let msg = format!("{}: [log].level: {e:#}", path.display());
        return Err(StreamboxError::Config(msg).into());
    }
    Ok(config)
}

fn stream_config(config: &StreamboxConfig, message_size: Option<usize>) -> Result<StreamConfig> {
    let message_size = message_size.unwrap_or(config.stream.message_size);
    StreamConfig::new(message_size, config.stream.max_record_size)
        .context("invalid [stream] settings")
}

// ── Key loading ───────────────────────────────────────────────────────────────

fn load_key(config: &StreamboxConfig, key_file: Option<&Path>) -> Result<StreamKey> {
    let env_key = std::env::var(&config.keys.key_env)
        .ok()
        .map(SecretString::from);
    resolve_key(config, key_file, env_key)
}

/// Resolve the stream key: --key-file flag > key env var > config key_file
fn resolve_key(
    config: &StreamboxConfig,
    key_file: Option<&Path>,
    env_key: Option<SecretString>,
) -> Result<StreamKey> {
    if let Some(path) = key_file {
        return read_key_file(path, config.keys.key_file_mode_check);
    }

    if let Some(secret) = env_key {
        return StreamKey::from_base64(secret.expose_secret())
            .with_context(|| format!("parsing key from ${}", config.keys.key_env));
    }

    if let Some(path) = config.key_file() {
        return read_key_file(&path, config.keys.key_file_mode_check);
    }

    Err(StreamboxError::Key(format!(
        "no key configured: pass --key-file, set ${}, or set keys.key_file in the config",
        config.keys.key_env
    ))
    .into())
}

fn read_key_file(path: &Path, mode_check: bool) -> Result<StreamKey> {
    if mode_check {
        warn_if_key_file_exposed(path);
    }
    let contents = Zeroizing::new(
        std::fs::read(path).with_context(|| format!("reading key file: {}", path.display()))?,
    );
    let key = StreamKey::from_file_contents(&contents)
        .with_context(|| format!("parsing key file: {}", path.display()))?;
    debug!(key = %key.fingerprint(), path = %path.display(), "loaded key");
    Ok(key)
}

#[cfg(unix)]
fn warn_if_key_file_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "key file is accessible by group or others; consider chmod 600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_key_file_exposed(_path: &Path) {}

// ── Stream plumbing ───────────────────────────────────────────────────────────

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(p) if p != Path::new("-") => {
            let file = File::open(p).with_context(|| format!("opening input: {}", p.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(io::stdin().lock())),
    }
}

/// Copy `reader` to the output, removing a partially written output file if
/// the copy fails.
fn pipe<R: Read>(reader: R, output: Option<&Path>, progress: bool, label: &str) -> Result<u64> {
    let pb = if progress {
        make_spinner(label)
    } else {
        ProgressBar::hidden()
    };
    let mut reader = pb.wrap_read(reader);

    let result = match output {
        Some(path) if path != Path::new("-") => {
            let file = File::create(path)
                .with_context(|| format!("creating output: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            let copied = io::copy(&mut reader, &mut writer).and_then(|n| writer.flush().map(|_| n));
            if copied.is_err() {
                drop(writer);
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "could not remove partial output");
                }
            }
            copied
        }
        _ => {
            let mut writer = io::stdout().lock();
            io::copy(&mut reader, &mut writer).and_then(|n| writer.flush().map(|_| n))
        }
    };

    match &result {
        Ok(n) => pb.finish_with_message(format!("done ({})", fmt_bytes(*n))),
        Err(_) => pb.abandon_with_message("failed"),
    }
    Ok(result?)
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {bytes} ({binary_bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `streambox keygen` ────────────────────────────────────────────────────────

fn cmd_keygen(out: Option<&Path>, force: bool) -> Result<()> {
    let key = generate_key();
    let encoded = Zeroizing::new(format!("{}\n", key.to_base64()));

    match out {
        Some(path) => {
            write_key_file(path, encoded.as_bytes(), force)?;
            println!("Wrote key to {}", path.display());
            eprintln!("fingerprint: {}", key.fingerprint());
        }
        None => {
            print!("{}", encoded.as_str());
            eprintln!("fingerprint: {}", key.fingerprint());
        }
    }
    Ok(())
}

fn write_key_file(path: &Path, contents: &[u8], force: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).with_context(|| {
        if path.exists() && !force {
            format!("{} already exists (use --force to overwrite)", path.display())
        } else {
            format!("creating key file: {}", path.display())
        }
    })?;
    file.write_all(contents)
        .with_context(|| format!("writing key file: {}", path.display()))?;
    Ok(())
}

// ── `streambox encrypt` / `streambox decrypt` ─────────────────────────────────

fn cmd_encrypt(
    config: &StreamboxConfig,
    io_args: &IoArgs,
    key_file: Option<&Path>,
    message_size: Option<usize>,
    progress: bool,
) -> Result<StreamStats> {
    let stream_config = stream_config(config, message_size)?;
    let key = load_key(config, key_file)?;
    let input = open_input(io_args.input.as_deref())?;

    let mut reader = EncryptingReader::with_config(&key, input, stream_config);
    pipe(&mut reader, io_args.output.as_deref(), progress, "encrypt")
        .context("encrypting stream")?;
    Ok(reader.stats())
}

fn cmd_decrypt(
    config: &StreamboxConfig,
    io_args: &IoArgs,
    key_file: Option<&Path>,
    progress: bool,
) -> Result<StreamStats> {
    let stream_config = stream_config(config, None)?;
    let key = load_key(config, key_file)?;
    let input = open_input(io_args.input.as_deref())?;

    let mut reader = DecryptingReader::with_config(&key, input, stream_config);
    pipe(&mut reader, io_args.output.as_deref(), progress, "decrypt")
        .context("decrypting stream")?;
    Ok(reader.stats())
}

// ── `streambox inspect` ───────────────────────────────────────────────────────

fn cmd_inspect(config: &StreamboxConfig, input: Option<&Path>, verbose: bool) -> Result<()> {
    let summary = inspect(config, open_input(input)?, verbose)?;

    println!("records:    {}", summary.records);
    println!("ciphertext: {}", fmt_bytes(summary.wire_bytes));
    println!("plaintext:  {}", fmt_bytes(summary.plaintext_bytes));
    if summary.records > 0 {
        println!("largest:    {} plaintext bytes", summary.largest);
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct InspectSummary {
    records: u64,
    wire_bytes: u64,
    plaintext_bytes: u64,
    largest: usize,
}

fn inspect<R: Read>(config: &StreamboxConfig, reader: R, verbose: bool) -> Result<InspectSummary> {
    let mut summary = InspectSummary::default();
    for header in RecordScanner::with_config(reader, stream_config(config, None)?) {
        let header = header.with_context(|| format!("scanning record {}", summary.records))?;
        if verbose {
            println!(
                "record {:>6}  offset {:>12}  len {:>8}  plaintext {:>8}",
                header.index,
                header.offset,
                header.len,
                header.plaintext_len()
            );
        }
        summary.records += 1;
        summary.wire_bytes += header.wire_len() as u64;
        summary.plaintext_bytes += header.plaintext_len() as u64;
        summary.largest = summary.largest.max(header.plaintext_len());
    }
    Ok(summary)
}

// ── `streambox config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &StreamboxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = config.to_toml().context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
