//! Scan-file and stdin dispatch: parse discovered services, group them by
//! module, and run each group through the same host-worker machinery as a
//! normal run.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::common::{dns, logger};
use crate::modules::{Module, Target, MODULES};
use crate::parser;
use crate::scanner::{progress, results, Scanner};

impl Scanner {
    /// Parses an nmap/Nessus/Nexpose output file and bruteforces every
    /// recognized service, grouped by module.
    pub async fn run_nmap(&self, token: &CancellationToken, path: &str) -> Result<()> {
        let targets = parser::parse_file(path)?;
        if targets.is_empty() {
            info!("no supported services found in {}", path);
            return Ok(());
        }
        info!("found {} targets in {}", targets.len(), path);
        self.run_groups(token, group_by_module(targets, false)).await
    }

    /// Same as [`run_nmap`](Self::run_nmap) for a stream of JSON or
    /// `host:port` lines on stdin. `http-basic` targets are skipped by
    /// design; basic-auth paths cannot be guessed from a port number.
    pub async fn run_stdin(
        &self,
        token: &CancellationToken,
        reader: impl std::io::BufRead,
    ) -> Result<()> {
        let targets = parser::parse_stdin(reader)?;
        if targets.is_empty() {
            info!("no supported targets found on stdin");
            return Ok(());
        }
        info!("found {} targets on stdin", targets.len());
        self.run_groups(token, group_by_module(targets, true)).await
    }

    async fn run_groups(
        &self,
        token: &CancellationToken,
        grouped: HashMap<String, Vec<parser::Target>>,
    ) -> Result<()> {
        for (service, group) in &grouped {
            info!("  {}: {} target(s)", service, group.len());
        }

        let (results_tx, results_rx) = tokio::sync::mpsc::channel(self.opts.parallel * 4);
        let sink = tokio::spawn(results::run_sink(
            results_rx,
            self.output.clone(),
            self.successes.clone(),
            self.opts.json,
        ));

        let progress = if !logger::is_quiet() {
            let total_targets: usize = grouped.values().map(Vec::len).sum();
            let total = total_targets as u64 * (self.credentials.len() as u64 + 1);
            Some(progress::Progress::start(
                self.attempts.clone(),
                self.successes.clone(),
                total,
            ))
        } else {
            None
        };

        for (command, group) in grouped {
            if token.is_cancelled() {
                break;
            }
            if self.opts.global_stop
                && self.global_done.load(std::sync::atomic::Ordering::Relaxed)
            {
                break;
            }

            let Some(module) = MODULES.get(command.as_str()) else {
                debug!("skipping unknown module {}", command);
                continue;
            };
            let module: &'static Module = module;

            info!("executing {} module ({} targets)", command, group.len());

            let resolved = resolve_group(group).await;
            if resolved.is_empty() {
                continue;
            }

            let parallel = self.opts.parallel.min(resolved.len()).max(1);
            let (targets_tx, targets_rx) = tokio::sync::mpsc::channel(resolved.len());
            for target in resolved {
                // channel is sized to the group; sends cannot block
                let _ = targets_tx.try_send(target);
            }
            drop(targets_tx);

            self.dispatch(
                token,
                &command,
                module,
                targets_rx,
                parallel,
                results_tx.clone(),
            )
            .await;
        }

        drop(results_tx);
        let _ = sink.await;
        if let Some(p) = progress {
            p.stop().await;
        }

        info!(
            "Done: {} attempts, {} successes",
            self.attempts(),
            self.successes()
        );
        if token.is_cancelled() {
            info!("Interrupted");
        }
        Ok(())
    }
}

fn group_by_module(
    targets: Vec<parser::Target>,
    skip_http_basic: bool,
) -> HashMap<String, Vec<parser::Target>> {
    let mut grouped: HashMap<String, Vec<parser::Target>> = HashMap::new();
    for target in targets {
        if skip_http_basic && target.service == "http-basic" {
            continue;
        }
        grouped.entry(target.service.clone()).or_default().push(target);
    }
    grouped
}

/// Resolves parser targets to engine targets, dropping hosts that fail DNS.
async fn resolve_group(group: Vec<parser::Target>) -> Vec<Arc<Target>> {
    let mut resolved = Vec::with_capacity(group.len());
    for t in group {
        match dns::lookup_addr(&t.host).await {
            Ok(ip) => {
                let original = if t.host.contains(':') {
                    format!("[{}]:{}", t.host, t.port)
                } else {
                    format!("{}:{}", t.host, t.port)
                };
                resolved.push(Arc::new(Target::new(ip, t.port, original)));
            }
            Err(e) => {
                debug!("can't resolve {}: {}", t.host, e);
            }
        }
    }
    resolved
}
