//! vlanoptsctl - replay VLAN option requests against an in-memory bridge
//!
//! Reads a JSON scenario (bridge, optional port, member VLANs, requests),
//! runs every request through the options engine and prints one JSON line
//! per request outcome and per notification, followed by the final range
//! dumps.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use sonic_vlan_opts::{
    dump_global_ranges, dump_ranges, BridgeCtx, ChangeRange, EntryFlags, GlobalOptsAttrs,
    PortCtx, PortInfo, PortTunnelMap, RecordingNotifier, StpState, VlanEntry, VlanEntryAttrs,
    VlanGroup, VlanId, VlanOptsConfig, VlanOptsEngine, VlanRange, VlanTable,
};

/// Bridge VLAN options replay tool
#[derive(Parser, Debug)]
#[command(name = "vlanoptsctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON)
    #[arg(short = 's', long)]
    scenario: PathBuf,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Scenario {
    #[serde(default)]
    config: VlanOptsConfig,
    bridge: BridgeCtx,
    #[serde(default)]
    port: Option<PortInfo>,
    vlans: Vec<VlanSeed>,
    #[serde(default)]
    pvid: Option<VlanId>,
    #[serde(default)]
    requests: Vec<Request>,
}

/// Member VLANs created before the requests run.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VlanSeed {
    range: VlanRange,
    #[serde(default)]
    state: StpState,
    #[serde(default)]
    untagged: bool,
    /// Tunnel id of the first port VLAN; the rest follow consecutively.
    #[serde(default)]
    tunnel_base: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
enum Request {
    Options {
        range: VlanRange,
        #[serde(default)]
        on_port: bool,
        attrs: VlanEntryAttrs,
    },
    Global {
        range: VlanRange,
        attrs: GlobalOptsAttrs,
    },
}

#[derive(Debug, Serialize)]
struct Outcome<'a> {
    request: usize,
    kind: &'a str,
    range: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_logging(log_level: &str, json_logs: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(layer.json())
            .try_init()
            .context("Failed to set tracing subscriber")?;
    } else {
        registry
            .with(layer)
            .try_init()
            .context("Failed to set tracing subscriber")?;
    }
    Ok(())
}

fn load_scenario(path: &PathBuf) -> Result<Scenario> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse scenario {}", path.display()))?;
    scenario
        .config
        .validate()
        .context("Invalid engine configuration")?;
    Ok(scenario)
}

/// Builds the bridge and port VLAN groups from the seeds.
fn seed_tables(scenario: &Scenario) -> Result<(VlanTable, VlanTable, PortTunnelMap)> {
    let mut bridge = VlanTable::new();
    let mut port = VlanTable::new();
    let mut tunnels = PortTunnelMap::new();

    for seed in &scenario.vlans {
        let flags = if seed.untagged {
            EntryFlags::UNTAGGED
        } else {
            EntryFlags::empty()
        };
        bridge.insert_range(seed.range, |vid| {
            VlanEntry::bridge(vid).with_state(seed.state).with_flags(flags)
        });
        if scenario.port.is_none() {
            continue;
        }
        for vid in seed.range {
            let mut entry = VlanEntry::port(vid).with_state(seed.state).with_flags(flags);
            if let Some(base) = seed.tunnel_base {
                let offset = vid.offset_from(seed.range.start()).unwrap_or_default();
                let tunnel_id = base.saturating_add(u32::from(offset));
                tunnels.insert(tunnel_id, vid);
                entry = entry.with_tunnel(tunnel_id);
            }
            port.insert(entry);
        }
    }

    if let Some(pvid) = scenario.pvid {
        bridge.set_pvid(Some(pvid)).context("Invalid bridge pvid")?;
        if scenario.port.is_some() {
            port.set_pvid(Some(pvid)).context("Invalid port pvid")?;
        }
    }
    Ok((bridge, port, tunnels))
}

fn print_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn raw_ranges(ranges: &[ChangeRange]) -> Vec<(u16, u16)> {
    ranges.iter().map(ChangeRange::as_raw).collect()
}

fn run(args: &Args) -> Result<bool> {
    let scenario = load_scenario(&args.scenario)?;
    let (mut bridge_vlans, mut port_vlans, mut tunnels) = seed_tables(&scenario)?;

    let notifier = Arc::new(RecordingNotifier::new());
    let mut engine = VlanOptsEngine::new(scenario.config.clone(), notifier.clone());
    info!(
        bridge = %scenario.bridge.name,
        vlans = bridge_vlans.len(),
        requests = scenario.requests.len(),
        "replaying scenario"
    );

    let mut all_ok = true;
    for (idx, request) in scenario.requests.iter().enumerate() {
        let (kind, range, result) = match request {
            Request::Options {
                range,
                on_port,
                attrs,
            } => {
                let result = match (on_port, &scenario.port) {
                    (true, Some(info)) => engine.process_options(
                        &scenario.bridge,
                        Some(PortCtx::new(info, &mut tunnels)),
                        &mut port_vlans,
                        *range,
                        attrs,
                    ),
                    (true, None) => {
                        anyhow::bail!("Request {} targets a port but the scenario has none", idx)
                    }
                    (false, _) => engine.process_options(
                        &scenario.bridge,
                        None,
                        &mut bridge_vlans,
                        *range,
                        attrs,
                    ),
                };
                ("options", range, result)
            }
            Request::Global { range, attrs } => {
                let result = engine.process_global_options(
                    &scenario.bridge,
                    &mut bridge_vlans,
                    *range,
                    attrs,
                );
                ("global", range, result)
            }
        };

        all_ok &= result.is_ok();
        print_line(&Outcome {
            request: idx,
            kind,
            range: range.to_string(),
            ok: result.is_ok(),
            errno: result.as_ref().err().map(|e| e.errno()),
            error: result.as_ref().err().map(|e| e.to_string()),
        })?;
        for event in notifier.take() {
            print_line(&event)?;
        }
    }

    let caps = engine.config().capabilities;
    let mut dump = json!({
        "bridge": raw_ranges(&dump_ranges(&bridge_vlans, engine.mcast(), caps)),
        "global": raw_ranges(&dump_global_ranges(&bridge_vlans, engine.mcast())),
        "stats": engine.stats(),
    });
    if scenario.port.is_some() {
        dump["port"] = json!(raw_ranges(&dump_ranges(&port_vlans, engine.mcast(), caps)));
        dump["pvid"] = json!(port_vlans.pvid());
    }
    print_line(&dump)?;
    Ok(all_ok)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("vlanoptsctl failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
