//! Display formatting for CLI output
//!
//! Pure functions that format data for display — no I/O, so they're
//! testable without a terminal.

use crate::discovery::ClusterSummary;
use crate::domain::Registry;
use crate::orchestrator::RunOutcome;

/// Format a simple table with headers and rows.
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!("{:width$}", header.to_uppercase(), width = widths[i]));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }
    output
}

/// Format `list` output: one row per cluster.
pub fn format_cluster_list(clusters: &[ClusterSummary]) -> String {
    let headers = &["NAME", "SERVERS", "AGENTS", "LOADBALANCER"];
    let rows = clusters
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.server_count().to_string(),
                c.agent_count().to_string(),
                if c.has_load_balancer() { "true" } else { "false" }.to_string(),
            ]
        })
        .collect();
    format_table(headers, rows)
}

/// Format `get` output: one row per node in the cluster.
pub fn format_cluster_detail(cluster: &ClusterSummary) -> String {
    let headers = &["NAME", "ROLE", "STATUS", "RUNNING"];
    let rows = cluster
        .nodes
        .iter()
        .map(|n| {
            vec![
                n.name.clone(),
                n.role.to_string(),
                n.state.clone(),
                n.running.to_string(),
            ]
        })
        .collect();
    format_table(headers, rows)
}

pub fn format_registry_list(registries: &[Registry]) -> String {
    let headers = &["NAME", "ENDPOINT", "NETWORKS"];
    let rows = registries
        .iter()
        .map(|r| vec![r.name.clone(), r.endpoint(), r.networks.join(",")])
        .collect();
    format_table(headers, rows)
}

pub fn format_create_success(outcome: &RunOutcome) -> String {
    format!(
        "cluster {:?} created: {} server(s), {} agent(s), API at {}\n",
        outcome.cluster.name,
        outcome.cluster.servers().count(),
        outcome.cluster.agents().count(),
        outcome.kube_api_url,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rows_print_a_placeholder() {
        assert_eq!(format_table(&["NAME"], vec![]), "No resources found.\n");
    }

    #[test]
    fn table_pads_columns_to_the_widest_cell() {
        let out = format_table(&["A", "B"], vec![vec!["x".into(), "yyyy".into()]]);
        assert!(out.contains("A      B"));
    }
}
