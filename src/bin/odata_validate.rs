//! odata-validate - OData 负载分类与一致性校验的命令行工具
//!
//! Usage:
//!   odata-validate classify <payload> [--headers <file>] [--metadata <file>]
//!   odata-validate rules                       List the built-in rules
//!   odata-validate check <url> [--config <file>] [-H "Name: value"]...
//!   odata-validate version

use anyhow::{bail, Context};
use odata_conformance::{
    classify_payload, CancellationToken, MetadataDocument, Rule, RuleRegistry, Validator,
    ValidatorConfig,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "classify" => cmd_classify(&args[2..]),
        "rules" => cmd_rules(),
        "check" => cmd_check(&args[2..]),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(2);
    }
}

fn print_usage() {
    println!(
        r#"odata-validate - OData conformance validator

USAGE:
    odata-validate <COMMAND> [OPTIONS]

COMMANDS:
    classify <payload-file> [--headers <file>] [--metadata <file>]
                                Classify a captured response (format, type, version)
    rules                       List the built-in rules and their constraints
    check <url> [--config <file>] [-H "Name: value"]...
                                Fetch a URL, validate it and print a JSON report
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    RUST_LOG                    Log filter (default: info)
    ODATA_MAX_PAYLOAD_SIZE      Payload ceiling in bytes (default: 1048576)
    ODATA_HTTP_TIMEOUT_SECS     Request timeout (default: 30)
    ODATA_HTTP_MAX_RETRIES      Fetch retries (default: 2)
    ODATA_RULE_TIMEOUT_SECS     Per-rule timeout (default: 10)
    ODATA_MAX_CONCURRENCY       Concurrent rules, 1 = sequential (default: 8)"#
    );
}

fn cmd_version() {
    println!("odata-validate {}", env!("CARGO_PKG_VERSION"));
}

/// Value following `flag`, if any.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn read(path: &str) -> anyhow::Result<String> {
    std::fs::read_to_string(Path::new(path)).with_context(|| format!("cannot read {path}"))
}

fn cmd_classify(args: &[String]) -> anyhow::Result<()> {
    let Some(payload_path) = args.first().filter(|a| !a.starts_with("--")) else {
        bail!("classify needs a payload file");
    };
    let payload = read(payload_path)?;
    let header_block = match flag_value(args, "--headers") {
        Some(path) => read(path)?,
        None => String::new(),
    };
    let metadata = match flag_value(args, "--metadata") {
        Some(path) => Some(MetadataDocument::parse(&read(path)?)?),
        None => None,
    };

    let c = classify_payload(&payload, &header_block, metadata.as_ref());
    println!("format:       {}", c.format);
    println!("payload type: {}", c.payload_type);
    println!("version:      {}", c.version);
    Ok(())
}

fn cmd_rules() -> anyhow::Result<()> {
    let registry = RuleRegistry::builtin()?;
    println!("{} built-in rules\n", registry.len());
    for rule in registry.iter() {
        let d = rule.descriptor();
        let mut constraints = Vec::new();
        if let Some(t) = d.payload_type {
            constraints.push(format!("type={t}"));
        }
        if let Some(f) = d.payload_format {
            constraints.push(format!("format={f}"));
        }
        if let Some(v) = d.version {
            constraints.push(format!("version={v}"));
        }
        if d.require_metadata == Some(true) {
            constraints.push("metadata".to_string());
        }
        if let Some(mle) = d.is_media_link_entry {
            constraints.push(format!("mle={mle}"));
        }
        println!(
            "  {:<32} {:<12} {}",
            d.name,
            d.requirement_level.to_string(),
            if constraints.is_empty() {
                "*".to_string()
            } else {
                constraints.join(" ")
            }
        );
    }
    Ok(())
}

fn cmd_check(args: &[String]) -> anyhow::Result<()> {
    let Some(url) = args.first().filter(|a| !a.starts_with('-')) else {
        bail!("check needs a URL");
    };
    let config = match flag_value(args, "--config") {
        Some(path) => ValidatorConfig::from_yaml_file(path)?,
        None => ValidatorConfig::from_env()?,
    };

    let mut request_headers = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if arg == "-H" {
            let Some(raw) = args.get(i + 1) else {
                bail!("-H needs a \"Name: value\" argument");
            };
            match raw.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    request_headers.push((name.trim().to_string(), value.trim().to_string()));
                }
                _ => bail!("malformed header: {raw}"),
            }
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("cannot start runtime")?;
    let report = runtime.block_on(async {
        let validator = Validator::builtin(config)?;
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        validator.validate_url(url, request_headers, cancel).await
    })?;

    println!("{}", report.to_json()?);
    eprintln!("{}", report.summary());
    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
