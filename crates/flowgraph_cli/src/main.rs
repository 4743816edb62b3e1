// SPDX-License-Identifier: MIT OR Apache-2.0
//! `flowgraph` - load or build a processor network, evaluate it and print
//! every published output.
//!
//! ```text
//! flowgraph [--config settings.ron] [--save out.json] [network.json]
//! ```
//!
//! Without a network file a small demo network is evaluated instead.

use anyhow::{bail, Context, Result};
use flowgraph_core::{
    EvaluationReport, Network, NetworkConfig, NetworkContext, Node, NodeId, Outport, Probe,
    ProcessorRegistry, PropertyRef, Selector, Source, Sum,
};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or unusable
const DEFAULT_LOG_FILTER: &str = "flowgraph_core=info,flowgraph=info";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    save: Option<PathBuf>,
    network: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    parsed.config = Some(args.next().context("--config needs a path")?.into());
                }
                "--save" => {
                    parsed.save = Some(args.next().context("--save needs a path")?.into());
                }
                flag if flag.starts_with("--") => bail!("Unknown option {flag}"),
                path => {
                    if parsed.network.is_some() {
                        bail!("Only one network file can be given");
                    }
                    parsed.network = Some(path.into());
                }
            }
        }
        Ok(parsed)
    }
}

fn main() -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::registry()
        .with(log_filter(rust_log.as_deref()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => NetworkConfig::load(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => NetworkConfig::default(),
    };
    tracing::info!(?config, "Starting flowgraph v{}", env!("CARGO_PKG_VERSION"));

    let mut network = Network::with_context(NetworkContext::new(config));
    let registry = ProcessorRegistry::with_builtins();
    match &args.network {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Reading {}", path.display()))?;
            let report = network
                .load_json(&text, &registry)
                .with_context(|| format!("Loading {}", path.display()))?;
            for warning in &report.warnings {
                tracing::warn!("{warning}");
            }
        }
        None => network.batch(build_demo)?,
    }

    let report = match network.evaluate_pending() {
        Some(report) => report,
        None => network.last_report().cloned().unwrap_or_default(),
    };
    print_report(&network, &report);

    if let Some(path) = &args.save {
        let json = network.to_json().context("Serializing network")?;
        std::fs::write(path, json).with_context(|| format!("Writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "Saved network");
    }

    if report.has_failures() {
        bail!("{} processor(s) failed", report.failures.len());
    }
    Ok(())
}

/// `RUST_LOG` when it parses, the default directives otherwise
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Two constants summed, a selector choosing between the sum and a third
/// constant, and a probe at the end
fn build_demo(network: &mut Network) -> Result<()> {
    let a = network.add_processor(Source::node("a", 2.0_f64)?);
    let b = network.add_processor(Source::node("b", 3.0_f64)?);
    let fallback = network.add_processor(Source::node("fallback", -1.0_f64)?);
    let sum = network.add_processor(Sum::node("sum")?);
    let select = network.add_processor(Selector::<f64>::node("select", 0)?);
    let probe = network.add_processor(Probe::<f64>::node("probe")?);

    let wires = [
        (a, "out", sum, "terms"),
        (b, "out", sum, "terms"),
        (sum, "sum", select, "inputs"),
        (fallback, "out", select, "inputs"),
        (select, "out", probe, "in"),
    ];
    for (from, outport, to, inport) in wires {
        let outport = port_of(network, from, |n| n.outport_ref(outport))?;
        let inport = port_of(network, to, |n| n.inport_ref(inport))?;
        network.add_connection(outport, inport)?;
    }

    // Keeps `b` in step with `a`
    network.add_link(PropertyRef::new(a, "value"), PropertyRef::new(b, "value"))?;
    Ok(())
}

fn port_of<P>(
    network: &Network,
    id: NodeId,
    find: impl FnOnce(&Node) -> Option<P>,
) -> Result<P> {
    let node = network.node(id).context("demo node missing")?;
    find(node).with_context(|| format!("{} is missing a demo port", node.identifier()))
}

fn print_report(network: &Network, report: &EvaluationReport) {
    println!(
        "Evaluated {} processor(s) in {} pass(es)",
        report.processed.len(),
        report.passes
    );
    for failure in &report.failures {
        println!("  failed: {failure}");
    }
    if !report.cyclic.is_empty() {
        println!(
            "  skipped {} processor(s) in cycles and {} downstream of them",
            report.cyclic.len(),
            report.excluded.len()
        );
    }
    for node in network.nodes() {
        print_outputs(node);
    }
}

fn print_outputs(node: &Node) {
    for outport in node.outports() {
        let value = describe(outport).unwrap_or_else(|| "-".to_string());
        println!("{}/{} = {value}", node.identifier(), outport.name());
    }
}

fn describe(outport: &Outport) -> Option<String> {
    if let Some(v) = outport.data_as::<f64>() {
        return Some(v.to_string());
    }
    if let Some(v) = outport.data_as::<i64>() {
        return Some(v.to_string());
    }
    if let Some(v) = outport.data_as::<bool>() {
        return Some(v.to_string());
    }
    outport.data_as::<String>().map(|v| format!("{v:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--config", "c.ron", "net.json", "--save", "o.json"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("c.ron")));
        assert_eq!(parsed.network, Some(PathBuf::from("net.json")));
        assert_eq!(parsed.save, Some(PathBuf::from("o.json")));
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_rust_log_replaces_default_filter() {
        let filter = log_filter(Some("flowgraph_core=trace")).to_string();
        assert!(filter.contains("flowgraph_core=trace"));
        assert!(!filter.contains("info"));

        for unset in [None, Some(""), Some("  ")] {
            let filter = log_filter(unset).to_string();
            assert!(filter.contains("flowgraph_core=info"), "{filter}");
        }
    }

    #[test]
    fn test_demo_evaluates() {
        let mut network = Network::with_context(NetworkContext::new(NetworkConfig {
            auto_evaluate: false,
            ..NetworkConfig::default()
        }));
        network.batch(build_demo).unwrap();
        let report = network.evaluate();
        assert!(!report.has_failures());

        let probe = network.node_by_identifier("probe").unwrap();
        let value = describe(&probe.outports()[0]);
        assert_eq!(value.as_deref(), Some("5"));
    }
}
