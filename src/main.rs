//! Purpose: `lmpx` CLI entry point: inspect and edit an LMDB environment from the shell.
//! Role: Binary crate root; parses args, opens the environment, emits JSON on stdout.
//! Invariants: Every command emits JSON on stdout (`scan` emits one object per line).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use lmdb_proxy::api::{
    Database, DbFlags, EnvFlags, EnvOptions, Environment, Error, ErrorKind, PutMode, RoTxn,
    Transaction, to_exit_code,
};

#[derive(Parser)]
#[command(
    name = "lmpx",
    version,
    about = "Zero-copy get/put/scan over an LMDB environment",
    long_about = None,
    after_help = r#"EXAMPLES
  $ lmpx --env ./data put greeting hello
  $ lmpx --env ./data get greeting
  $ lmpx --env ./data --db users scan --from a --limit 10
  $ lmpx --env ./data copy ./backup --compact"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "JSON file with environment options (map_size, max_readers, max_dbs, flags, file_mode)",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,
    #[arg(long, help = "Environment directory (or file with --no-sub-dir)", value_hint = ValueHint::AnyPath)]
    env: PathBuf,
    #[arg(long, help = "Named database (default: the unnamed database)")]
    db: Option<String>,
    #[arg(long = "dup-sort", help = "Create the database with sorted duplicate values")]
    dup_sort: bool,
    #[arg(long = "no-sub-dir", help = "Treat --env as the data file instead of a directory")]
    no_sub_dir: bool,
    #[arg(long = "map-size", help = "Map size in bytes (rounded up to the page size)")]
    map_size: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print the value stored under KEY")]
    Get {
        #[arg(help = "Key (UTF-8)")]
        key: String,
    },
    #[command(about = "Store VALUE under KEY")]
    Put {
        #[arg(help = "Key (UTF-8)")]
        key: String,
        #[arg(help = "Value (UTF-8)")]
        value: String,
        #[arg(long = "no-overwrite", help = "Fail if KEY already exists")]
        no_overwrite: bool,
        #[arg(
            long,
            conflicts_with = "no_overwrite",
            help = "KEY sorts after every existing key"
        )]
        append: bool,
    },
    #[command(about = "Delete KEY, or only the pair KEY/VALUE in a --dup-sort database")]
    Del {
        #[arg(help = "Key (UTF-8)")]
        key: String,
        #[arg(help = "Value to delete among duplicates")]
        value: Option<String>,
    },
    #[command(about = "Emit pairs in key order, one JSON object per line")]
    Scan {
        #[arg(long, help = "Start at the first key greater than or equal to KEY")]
        from: Option<String>,
        #[arg(long, help = "Stop after N pairs")]
        limit: Option<usize>,
    },
    #[command(about = "Show database and environment statistics")]
    Stat,
    #[command(about = "Write a consistent copy of the environment to DEST")]
    Copy {
        #[arg(help = "Destination directory (or file with --no-sub-dir)", value_hint = ValueHint::AnyPath)]
        dest: PathBuf,
        #[arg(long, help = "Omit free pages and renumber pages while copying")]
        compact: bool,
    },
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(exit_code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage).with_message(clap_error_summary(&err)));
            }
        },
    };

    let options = env_options(&cli)?;
    let env = Environment::open(&cli.env, &options)?;
    let target = DbTarget {
        name: cli.db,
        flags: if cli.dup_sort {
            DbFlags::DUP_SORT
        } else {
            DbFlags::empty()
        },
    };
    command_dispatch::dispatch_command(cli.command, &env, &target)?;
    Ok(0)
}

/// Config file first, then command-line overrides.
fn env_options(cli: &Cli) -> Result<EnvOptions, Error> {
    let mut options = match &cli.config {
        Some(path) => EnvOptions::from_json_file(path)?,
        None => EnvOptions::new(),
    };
    if cli.no_sub_dir {
        options.flags |= EnvFlags::NO_SUB_DIR;
    }
    if let Some(map_size) = cli.map_size {
        options.map_size = map_size;
    }
    Ok(options)
}

struct DbTarget {
    name: Option<String>,
    flags: DbFlags,
}

impl DbTarget {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Read paths never create the database; stored flags win.
    fn open(&self, txn: &RoTxn<'_>) -> Result<Database, Error> {
        txn.open_db(self.name.as_deref(), DbFlags::empty())
            .map_err(|err| self.missing_db(err))
    }

    fn missing_db(&self, err: Error) -> Error {
        if err.kind() == ErrorKind::NotFound {
            err.with_message(format!("database not found: {}", self.label()))
        } else {
            err
        }
    }
}

fn put_mode(no_overwrite: bool, append: bool) -> PutMode {
    if no_overwrite {
        PutMode::NoOverwrite
    } else if append {
        PutMode::Append
    } else {
        PutMode::Upsert
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

/// One compact object per line regardless of terminal.
fn emit_json_line(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        if let Some(path) = err.path() {
            eprintln!("  path: {}", path.display());
        }
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::InvalidArgument => "invalid argument".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::KeyExists => "key already exists".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Engine => "storage engine error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(code) = err.code() {
        inner.insert("code".to_string(), json!(code));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_json_carries_kind_code_and_path() {
        let err = Error::new(ErrorKind::KeyExists)
            .with_message("exists")
            .with_code(-30799)
            .with_path("/tmp/env");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "KeyExists");
        assert_eq!(value["error"]["message"], "exists");
        assert_eq!(value["error"]["code"], -30799);
        assert_eq!(value["error"]["path"], "/tmp/env");
    }

    #[test]
    fn error_json_omits_absent_fields() {
        let value = error_json(&Error::new(ErrorKind::NotFound));
        let inner = value["error"].as_object().expect("object");
        assert_eq!(inner["message"], "not found");
        assert!(!inner.contains_key("code"));
        assert!(!inner.contains_key("path"));
    }

    #[test]
    fn put_flags_pick_one_mode() {
        assert_eq!(put_mode(false, false), PutMode::Upsert);
        assert_eq!(put_mode(true, false), PutMode::NoOverwrite);
        assert_eq!(put_mode(false, true), PutMode::Append);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cli = Cli::try_parse_from([
            "lmpx",
            "--env",
            "/tmp/env",
            "--no-sub-dir",
            "--map-size",
            "65536",
            "stat",
        ])
        .expect("parse");
        let options = env_options(&cli).expect("options");
        assert!(options.flags.contains(EnvFlags::NO_SUB_DIR));
        assert_eq!(options.map_size, 65536);
    }
}
