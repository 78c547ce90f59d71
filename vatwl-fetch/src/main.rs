use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vatwl_fetch::{DEFAULT_URL_TEMPLATE, Error, ExtractorKind, FetchConfig, SnapshotBuilder};
use vatwl_verifier::{
    AccountNumber, CACHE_DIR_ENV, DEFAULT_CACHE_DIR, TaxId, WhitelistChecker, normalize_digits,
};

#[derive(Parser, Debug)]
#[command(name = "vatwl-fetch")]
#[command(about = "Build today's VAT whitelist snapshot and optionally check a taxpayer against it")]
struct Args {
    /// Snapshot cache directory
    #[arg(long, env = CACHE_DIR_ENV, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Archive URL; {date} is replaced with yyyymmdd
    #[arg(long, default_value = DEFAULT_URL_TEMPLATE)]
    url_template: String,

    /// Decompressor for the downloaded archive
    #[arg(long, value_enum, default_value_t = ExtractorKind::Subprocess)]
    extractor: ExtractorKind,

    /// Path to the 7z executable (subprocess extractor)
    #[arg(long, default_value = "7z")]
    seven_zip: PathBuf,

    /// Download timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Retries for transport errors and 5xx responses
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Snapshot date as YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Rebuild even if a ready snapshot exists
    #[arg(long)]
    force: bool,

    /// Tax identifier (NIP) to check; non-digits are ignored
    #[arg(long)]
    nip: Option<String>,

    /// Bank account (NRB) to check with --nip; non-digits are ignored
    #[arg(long, requires = "nip")]
    account: Option<String>,

    /// Disable progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let tax_id = match args.nip.as_deref() {
        Some(raw) => {
            let parsed = normalize_digits(raw).and_then(|digits| TaxId::parse(&digits));
            Some(parsed.ok_or_else(|| Error::InvalidTaxId { value: raw.to_string() })?)
        }
        None => None,
    };

    let config = FetchConfig {
        cache_dir: args.cache_dir,
        url_template: args.url_template,
        timeout: Duration::from_secs(args.timeout_secs),
        max_retries: args.retries,
        extractor: args.extractor,
        seven_zip_path: args.seven_zip,
        show_progress: !args.no_progress,
    };
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());

    let builder = SnapshotBuilder::new(config)?;
    let snapshot = if args.force { builder.rebuild(date)? } else { builder.ensure(date)? };

    println!(
        "Whitelist snapshot for {} ready: {} hashes, {} iterations, {} masks",
        date,
        snapshot.hashes().len(),
        snapshot.iterations(),
        snapshot.masks().len()
    );

    let Some(tax_id) = tax_id else {
        return Ok(());
    };

    let account = args.account.as_deref().and_then(|raw| {
        let account = normalize_digits(raw).as_deref().and_then(AccountNumber::parse);
        if account.is_none() {
            warn!(account = raw, "account is not 26 digits, checking tax identifier only");
        }
        account
    });

    let result = WhitelistChecker::new(&snapshot).check(date, &tax_id, account.as_ref());
    println!(
        "{} NIP={} input={} hash={}",
        if result.hit { "HIT" } else { "MISS" },
        tax_id,
        result.used_input,
        result.audit_hash
    );

    Ok(())
}
