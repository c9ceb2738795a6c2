//! FlowFrame runner: execute a flow document from the command line.
//!
//! Usage: `flowframe <flow.yaml|flow.json>`. Runs the flow once and prints
//! each node's outcome plus a preview of every node without downstream
//! consumers.

use anyhow::{bail, Context};
use flowframe::flow::{FlowDocument, FlowRunner, NodeId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flowframe=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(path) => path,
        None => bail!("usage: flowframe <flow.yaml|flow.json>"),
    };

    let document = FlowDocument::load(&path).with_context(|| format!("loading {path}"))?;
    tracing::info!(name = %document.name, nodes = document.nodes.len(), "loaded flow");

    let (graph, settings) = document
        .to_graph()
        .with_context(|| format!("building graph from {path}"))?;
    let mut runner = FlowRunner::new(graph, settings);
    let report = runner.run().context("executing flow")?;

    let mut ids: Vec<NodeId> = runner.graph().node_ids();
    ids.sort();
    let adjacency = runner.graph().adjacency();
    for id in ids {
        let kind = runner.graph().node(id)?.kind();
        match runner.node_result(id).cloned() {
            Some(result) if result.success => {
                println!("node {id} [{kind}]: ok");
                // Terminal nodes get their rows printed.
                if !adjacency.contains_key(&id) {
                    let preview = runner.fetch_preview(id, 20, false)?;
                    println!(
                        "  {} rows, columns: {}",
                        preview.total_rows,
                        preview.schema.names().join(", ")
                    );
                    for row in &preview.rows {
                        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                        println!("  {}", cells.join(" | "));
                    }
                }
            }
            Some(result) => {
                println!(
                    "node {id} [{kind}]: FAILED: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            None => println!("node {id} [{kind}]: not executed"),
        }
    }

    if report.failed > 0 {
        bail!("{} of {} nodes failed", report.failed, report.executed);
    }
    println!("{} nodes executed successfully", report.succeeded);
    Ok(())
}
