//! gateway-cli — 网关配置校验、服务列表、健康探测与单次调用的命令行工具
//!
//! Usage:
//!   gateway-cli validate [--config <path>]                    Validate a gateway config
//!   gateway-cli services [--config <path>]                    List services and breaker settings
//!   gateway-cli probe [--config <path>]                       Run one health-check cycle
//!   gateway-cli invoke <service> <tool> [params-json] [--config <path>]

use anyhow::{bail, Context};
use mediahub_gateway::{Gateway, GatewayConfig, Invoker, ToolParams};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
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
        "validate" => cmd_validate(&args[2..]),
        "services" => cmd_services(&args[2..]),
        "probe" => cmd_probe(&args[2..]).await,
        "invoke" => cmd_invoke(&args[2..]).await,
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
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"gateway-cli — mediahub-gateway 命令行工具

USAGE:
    gateway-cli <COMMAND> [OPTIONS]

COMMANDS:
    validate [--config <path>]                  Validate the gateway configuration
    services [--config <path>]                  List services, timeouts and breaker settings
    probe [--config <path>]                     Run one health-check cycle and print snapshots
    invoke <service> <tool> [params-json]       Invoke one tool and print the result
    version                                     Show version information
    help                                        Show this help message

ENVIRONMENT:
    GATEWAY_CONFIG                              Config file path (default: gateway.yaml)
    GATEWAY_*                                   Default overrides, see GatewayConfig
    <SERVICE>_API_KEY                           Credential for a service without api_key
    RUST_LOG                                    Log filter (default: info)"#
    );
}

fn cmd_version() {
    println!("gateway-cli {}", env!("CARGO_PKG_VERSION"));
}

/// Split `--config <path>` out of the argument list.
fn split_config_arg(args: &[String]) -> (PathBuf, Vec<String>) {
    let mut path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            path = iter.next().map(PathBuf::from);
        } else {
            rest.push(arg.clone());
        }
    }
    let path = path
        .or_else(|| std::env::var("GATEWAY_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("gateway.yaml"));
    (path, rest)
}

fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let mut cfg = GatewayConfig::from_path(path)
        .with_context(|| format!("cannot load {}", path.display()))?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

fn build_gateway(cfg: &GatewayConfig) -> anyhow::Result<Gateway> {
    Ok(Gateway::builder().with_http_services(cfg)?.build()?)
}

fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let (path, _) = split_config_arg(args);
    let cfg = load_config(&path)?;
    println!("{}: OK ({} services)", path.display(), cfg.services.len());
    Ok(())
}

fn cmd_services(args: &[String]) -> anyhow::Result<()> {
    let (path, _) = split_config_arg(args);
    let cfg = load_config(&path)?;

    println!(
        "{:<20} {:<32} {:>10} {:>9} {:>10} {:>7}  PROBE",
        "NAME", "BASE URL", "TIMEOUT", "THRESHOLD", "OPEN", "TRIALS"
    );
    for svc in &cfg.services {
        let breaker = cfg.breaker_for(svc);
        println!(
            "{:<20} {:<32} {:>8}ms {:>9} {:>8}ms {:>7}  {}",
            svc.name,
            svc.base_url,
            cfg.timeout_for(svc).as_millis(),
            breaker.failure_threshold,
            breaker.open_duration.as_millis(),
            breaker.half_open_trials,
            cfg.probe_tool_for(svc),
        );
    }
    Ok(())
}

async fn cmd_probe(args: &[String]) -> anyhow::Result<()> {
    let (path, _) = split_config_arg(args);
    let cfg = load_config(&path)?;
    let gateway = build_gateway(&cfg)?;

    gateway.run_health_check().await;
    let report = serde_json::json!({
        "health": gateway.all_health(),
        "stats": gateway.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    let unhealthy = gateway.all_health().values().filter(|s| !s.healthy).count();
    if unhealthy > 0 {
        bail!("{unhealthy} service(s) unhealthy");
    }
    Ok(())
}

async fn cmd_invoke(args: &[String]) -> anyhow::Result<()> {
    let (path, rest) = split_config_arg(args);
    let (service, tool) = match (rest.first(), rest.get(1)) {
        (Some(s), Some(t)) => (s.as_str(), t.as_str()),
        _ => bail!("usage: gateway-cli invoke <service> <tool> [params-json]"),
    };
    let params: ToolParams = match rest.get(2) {
        Some(raw) => serde_json::from_str(raw).context("params must be a JSON object")?,
        None => ToolParams::new(),
    };

    let cfg = load_config(&path)?;
    let gateway = build_gateway(&cfg)?;
    let result = gateway.invoke_one(service, tool, params, None).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(2);
    }
    Ok(())
}
