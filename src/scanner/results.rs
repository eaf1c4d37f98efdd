//! The result sink: a single consumer draining the findings channel,
//! serializing each success to the log and the optional output file.

use std::io::Write;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::error;
use serde::Serialize;
use tokio::sync::mpsc::Receiver;

use crate::common::logger;

/// One successful authentication. Emitted exactly once per success.
#[derive(Debug, Clone)]
pub struct Finding {
    pub module: String,
    pub ip: IpAddr,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub original_target: String,
    pub timestamp: i64,
}

#[derive(Serialize)]
struct JsonFinding<'a> {
    target: &'a str,
    port: u16,
    protocol: &'a str,
    username: &'a str,
    password: &'a str,
    timestamp: i64,
}

impl Finding {
    pub fn plain_line(&self) -> String {
        format!(
            "[{}] {}:{} [{}] [{}]",
            self.module, self.ip, self.port, self.username, self.password
        )
    }

    pub fn json_line(&self) -> String {
        serde_json::to_string(&JsonFinding {
            target: &self.original_target,
            port: self.port,
            protocol: &self.module,
            username: &self.username,
            password: &self.password,
            timestamp: self.timestamp,
        })
        .expect("finding serialization cannot fail")
    }
}

/// Drains the channel until every producer has hung up. File writes are
/// serialized by the single-consumer discipline; the engine closes the file
/// only after this returns.
pub async fn run_sink(
    mut rx: Receiver<Finding>,
    output: Arc<Mutex<Option<std::fs::File>>>,
    successes: Arc<AtomicU64>,
    json: bool,
) {
    while let Some(finding) = rx.recv().await {
        successes.fetch_add(1, Ordering::Relaxed);

        if json {
            let line = finding.json_line();
            let mut guard = output.lock().unwrap();
            match guard.as_mut() {
                Some(file) => {
                    if let Err(e) = writeln!(file, "{}", line) {
                        error!("failed to write result to output file: {}", e);
                        logger::success(&line);
                    }
                }
                None => logger::success(&line),
            }
        } else {
            let line = finding.plain_line();
            logger::success(&line);
            let mut guard = output.lock().unwrap();
            if let Some(file) = guard.as_mut() {
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("failed to write result to output file: {}", e);
                }
            }
        }
    }
}
