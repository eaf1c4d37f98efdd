//! Nessus v2 exports (.nessus). Walks `<ReportHost>/<ReportItem>`, skipping
//! port 0 and generic service names, and normalizes the handful of Nessus
//! names that differ from nmap (`www` to `http`, `cifs` to `microsoft-ds`).

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::{is_generic_service, map_service, Target};

#[derive(Deserialize)]
struct NessusClientData {
    #[serde(rename = "Report", default)]
    reports: Vec<Report>,
}

#[derive(Deserialize)]
struct Report {
    #[serde(rename = "ReportHost", default)]
    hosts: Vec<ReportHost>,
}

#[derive(Deserialize)]
struct ReportHost {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "ReportItem", default)]
    items: Vec<ReportItem>,
}

#[derive(Deserialize)]
struct ReportItem {
    #[serde(rename = "@port")]
    port: u32,
    #[serde(rename = "@svc_name", default)]
    svc_name: String,
}

pub fn parse(path: &str) -> Result<Vec<Target>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("nessus: {}", path))?;
    let data: NessusClientData =
        quick_xml::de::from_str(&content).with_context(|| format!("nessus parse: {}", path))?;

    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for report in &data.reports {
        for host in &report.hosts {
            if host.name.is_empty() {
                continue;
            }
            for item in &host.items {
                if !(1..=65535).contains(&item.port) {
                    continue;
                }
                let service = item.svc_name.to_lowercase();
                if is_generic_service(&service) {
                    continue;
                }

                let Some(module) = map_service(normalize(&service)) else {
                    continue;
                };

                let key = format!("{}:{}:{}", host.name, item.port, module);
                if !seen.insert(key) {
                    continue;
                }
                targets.push(Target::new(&host.name, item.port as u16, module));
            }
        }
    }

    Ok(targets)
}

/// Nessus-specific service names mapped to nmap equivalents.
fn normalize(service: &str) -> &str {
    match service {
        "www" => "http",
        "cifs" => "microsoft-ds",
        other => other,
    }
}
