//! Nexpose XML exports. Walks `<node>/<endpoints>/<endpoint>`, keeping
//! `status="open"` endpoints only.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::{is_generic_service, map_service, Target};

#[derive(Deserialize)]
struct NexposeReport {
    #[serde(rename = "nodes", default)]
    nodes: Option<Nodes>,
}

#[derive(Deserialize, Default)]
struct Nodes {
    #[serde(rename = "node", default)]
    nodes: Vec<Node>,
}

#[derive(Deserialize)]
struct Node {
    #[serde(rename = "@address", default)]
    address: String,
    #[serde(default)]
    endpoints: Option<Endpoints>,
}

#[derive(Deserialize, Default)]
struct Endpoints {
    #[serde(rename = "endpoint", default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Endpoint {
    #[serde(rename = "@port")]
    port: u32,
    #[serde(rename = "@status", default)]
    status: String,
    #[serde(default)]
    services: Option<Services>,
}

#[derive(Deserialize, Default)]
struct Services {
    #[serde(rename = "service", default)]
    services: Vec<Service>,
}

#[derive(Deserialize)]
struct Service {
    #[serde(rename = "@name", default)]
    name: String,
}

pub fn parse(path: &str) -> Result<Vec<Target>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("nexpose: {}", path))?;
    let report: NexposeReport =
        quick_xml::de::from_str(&content).with_context(|| format!("nexpose parse: {}", path))?;

    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    let nodes = report.nodes.unwrap_or_default().nodes;
    for node in &nodes {
        if node.address.is_empty() {
            continue;
        }
        let endpoints = match &node.endpoints {
            Some(e) => &e.endpoints,
            None => continue,
        };
        for endpoint in endpoints {
            if endpoint.status != "open" {
                continue;
            }
            if !(1..=65535).contains(&endpoint.port) {
                continue;
            }
            let services = match &endpoint.services {
                Some(s) => &s.services,
                None => continue,
            };
            for service in services {
                let name = service.name.to_lowercase();
                if is_generic_service(&name) {
                    continue;
                }
                let Some(module) = map_service(&name) else {
                    continue;
                };
                let key = format!("{}:{}:{}", node.address, endpoint.port, module);
                if !seen.insert(key) {
                    continue;
                }
                targets.push(Target::new(&node.address, endpoint.port as u16, module));
            }
        }
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::scan_file;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<NexposeReport version="2.0">
  <nodes>
    <node address="172.16.0.9" status="alive">
      <endpoints>
        <endpoint protocol="tcp" port="22" status="open">
          <services><service name="SSH"/></services>
        </endpoint>
        <endpoint protocol="tcp" port="3389" status="closed">
          <services><service name="ms-wbt-server"/></services>
        </endpoint>
        <endpoint protocol="tcp" port="5900" status="open">
          <services><service name="vnc"/></services>
        </endpoint>
      </endpoints>
    </node>
  </nodes>
</NexposeReport>
"#;

    #[test]
    fn only_open_endpoints_map() {
        let p = scan_file("nexpose", SAMPLE);
        let targets = parse(p.to_str().unwrap()).unwrap();
        assert_eq!(
            targets,
            vec![
                Target::new("172.16.0.9", 22, "ssh"),
                Target::new("172.16.0.9", 5900, "vnc"),
            ]
        );
    }
}
