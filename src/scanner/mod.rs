//! The bruteforce engine: a host-level worker pool draining the target
//! channel, a per-target probe that picks TLS or plaintext while testing
//! the module's default credentials, and per-target credential worker pools
//! feeding results to a single sink.

pub mod creds;
pub mod nmap;
pub mod progress;
pub mod results;
pub mod targets;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use log::{debug, info};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::common::{logger, utils};
use crate::modules::{Credential, Module, Target, MODULES};
use crate::wordlists;
use creds::CredentialSet;
use results::Finding;

/// Run configuration. Shared read-only once the scanner is built.
pub struct Options {
    /// Username literal or file path; empty means `--defaults` or combo mode.
    pub usernames: String,
    /// Password literal or file path; empty means `--defaults` or combo mode.
    pub passwords: String,
    /// Combo file of `user:pass` lines; empty disables combo mode.
    pub combo: String,
    /// Use the embedded default wordlists when no explicit lists are given.
    pub defaults: bool,
    pub parallel: usize,
    pub threads: usize,
    pub timeout: Duration,
    pub delay: Duration,
    pub stop_on_success: bool,
    pub global_stop: bool,
    /// Connection-error budget per target; 0 disables.
    pub retries: u32,
    pub proxy: String,
    pub proxy_auth: String,
    pub iface: String,
    pub user_agent: String,
    pub output: String,
    pub json: bool,
    pub verbose: bool,
}

pub struct Scanner {
    opts: Options,
    dialer: Arc<Dialer>,
    credentials: Arc<CredentialSet>,
    attempts: Arc<AtomicU64>,
    successes: Arc<AtomicU64>,
    global_done: Arc<AtomicBool>,
    output: Arc<Mutex<Option<std::fs::File>>>,
}

/// Everything one run shares with its workers.
struct RunCtx {
    command: String,
    module: &'static Module,
    threads: usize,
    timeout: Duration,
    delay: Duration,
    stop_on_success: bool,
    global_stop: bool,
    retries: u32,
    dialer: Arc<Dialer>,
    credentials: Arc<CredentialSet>,
    attempts: Arc<AtomicU64>,
    global_done: Arc<AtomicBool>,
    results_tx: Sender<Finding>,
}

impl Scanner {
    pub fn new(mut opts: Options) -> Result<Self> {
        if opts.parallel == 0 {
            bail!("concurrent-hosts must be greater than zero");
        }
        if opts.threads == 0 {
            bail!("concurrent-threads must be greater than zero");
        }
        // a delay only makes sense with sequential attempts
        if opts.delay > Duration::ZERO && opts.threads != 1 {
            debug!("delay is set, forcing a single thread per target");
            opts.threads = 1;
        }

        let dialer = Arc::new(Dialer::new(
            &opts.proxy,
            &opts.proxy_auth,
            &opts.iface,
            opts.timeout,
            &opts.user_agent,
        )?);

        let output = if opts.output.is_empty() {
            None
        } else {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&opts.output)
                .with_context(|| {
                    format!(
                        "refusing to open output file {} (it may already exist)",
                        opts.output
                    )
                })?;
            Some(file)
        };

        let credentials = if !opts.combo.is_empty() {
            CredentialSet::Combo(creds::load_combos(&opts.combo))
        } else {
            let usernames = if !opts.usernames.is_empty() {
                utils::load_lines(&opts.usernames)
            } else if opts.defaults {
                wordlists::default_usernames()
            } else {
                Vec::new()
            };
            let passwords = if !opts.passwords.is_empty() {
                utils::load_lines(&opts.passwords)
            } else if opts.defaults {
                wordlists::default_passwords()
            } else {
                Vec::new()
            };
            CredentialSet::Cartesian {
                usernames,
                passwords,
            }
        };

        Ok(Scanner {
            opts,
            dialer,
            credentials: Arc::new(credentials),
            attempts: Arc::new(AtomicU64::new(0)),
            successes: Arc::new(AtomicU64::new(0)),
            global_done: Arc::new(AtomicBool::new(false)),
            output: Arc::new(Mutex::new(output)),
        })
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Drives one module against the given target spec (a literal or a file
    /// of literals). Returns after all work is done or the run is cancelled.
    pub async fn run(&self, token: &CancellationToken, command: &str, target_spec: &str) -> Result<()> {
        let module: &'static Module = MODULES
            .get(command)
            .ok_or_else(|| anyhow!("invalid module {:?}", command))?;

        let estimated = targets::estimate_count(target_spec);
        let parallel = self.opts.parallel.min(estimated).max(1);

        let (targets_tx, targets_rx) = tokio::sync::mpsc::channel(self.opts.parallel * 4);
        tokio::spawn(targets::send_targets(
            token.clone(),
            target_spec.to_string(),
            module.default_port,
            targets_tx,
        ));

        let (results_tx, results_rx) = tokio::sync::mpsc::channel(self.opts.parallel * 4);
        let sink = tokio::spawn(results::run_sink(
            results_rx,
            self.output.clone(),
            self.successes.clone(),
            self.opts.json,
        ));

        let progress = if !logger::is_quiet() {
            let total = estimated as u64 * (self.credentials.len() as u64 + 1);
            Some(progress::Progress::start(
                self.attempts.clone(),
                self.successes.clone(),
                total,
            ))
        } else {
            None
        };

        self.dispatch(token, command, module, targets_rx, parallel, results_tx)
            .await;

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

    /// Spawns the host-level pool over an already-fed target channel and
    /// waits for it to drain. Consumes the results sender, so the sink sees
    /// the channel close once the last worker exits.
    pub(crate) async fn dispatch(
        &self,
        token: &CancellationToken,
        command: &str,
        module: &'static Module,
        targets_rx: Receiver<Arc<Target>>,
        parallel: usize,
        results_tx: Sender<Finding>,
    ) {
        let ctx = Arc::new(RunCtx {
            command: command.to_string(),
            module,
            threads: self.opts.threads,
            timeout: self.opts.timeout,
            delay: self.opts.delay,
            stop_on_success: self.opts.stop_on_success,
            global_stop: self.opts.global_stop,
            retries: self.opts.retries,
            dialer: self.dialer.clone(),
            credentials: self.credentials.clone(),
            attempts: self.attempts.clone(),
            global_done: self.global_done.clone(),
            results_tx,
        });

        let targets_rx = Arc::new(tokio::sync::Mutex::new(targets_rx));

        let mut workers = Vec::with_capacity(parallel);
        for _ in 0..parallel {
            workers.push(tokio::spawn(host_worker(
                ctx.clone(),
                token.clone(),
                targets_rx.clone(),
            )));
        }
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Closes the output file. Safe to call more than once.
    pub fn stop(&self) {
        self.output.lock().unwrap().take();
    }
}

/// One host worker: pulls targets until the channel closes, probes each,
/// then runs the credential pool when the probe says the host is worth it.
async fn host_worker(
    ctx: Arc<RunCtx>,
    token: CancellationToken,
    targets_rx: Arc<tokio::sync::Mutex<Receiver<Arc<Target>>>>,
) {
    loop {
        if token.is_cancelled() {
            return;
        }
        if ctx.global_stop && ctx.global_done.load(Ordering::Relaxed) {
            return;
        }

        let target = {
            let mut rx = targets_rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => return,
                t = rx.recv() => t,
            }
        };
        let Some(target) = target else { return };

        if !probe(&ctx, &token, &target).await {
            continue;
        }
        brute_target(&ctx, &token, target).await;
    }
}

/// The reach-and-defaults probe. Tries the module's default credentials with
/// TLS first; on a connection error flips the target to plaintext and tries
/// once more. Returns false when the wordlist loop should be skipped
/// (unreachable target, or a default-credential hit under a stop policy).
async fn probe(ctx: &Arc<RunCtx>, token: &CancellationToken, target: &Arc<Target>) -> bool {
    let default_cred = Credential::new(ctx.module.default_username, ctx.module.default_password);

    match attempt(ctx, token, target, &default_cred).await {
        Ok(authenticated) => {
            // reachable with TLS; encryption stays on
            if authenticated {
                register_success(ctx, token, target, &default_cred).await;
                if ctx.stop_on_success || ctx.global_stop {
                    return false;
                }
            }
            true
        }
        Err(first_err) => {
            target.encryption.store(false, Ordering::Relaxed);
            debug!(
                "failed to connect to {} with encryption ({}), trying plaintext",
                target.addr(),
                first_err
            );
            match attempt(ctx, token, target, &default_cred).await {
                Ok(authenticated) => {
                    if authenticated {
                        register_success(ctx, token, target, &default_cred).await;
                        if ctx.stop_on_success || ctx.global_stop {
                            return false;
                        }
                    }
                    true
                }
                Err(second_err) => {
                    debug!(
                        "target {} is unreachable: {}",
                        target.addr(),
                        second_err
                    );
                    false
                }
            }
        }
    }
}

/// Runs the per-target credential pool: a feeder task plus `threads`
/// workers draining a bounded channel scoped to this target.
async fn brute_target(ctx: &Arc<RunCtx>, token: &CancellationToken, target: Arc<Target>) {
    if ctx.credentials.is_empty() {
        return;
    }

    let (tx, rx) = tokio::sync::mpsc::channel(ctx.threads * 4);
    let done = CancellationToken::new();
    let feeder = tokio::spawn(creds::send_credentials(
        token.clone(),
        done.clone(),
        ctx.credentials.clone(),
        tx,
    ));

    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let mut workers = Vec::with_capacity(ctx.threads);
    for _ in 0..ctx.threads {
        workers.push(tokio::spawn(thread_worker(
            ctx.clone(),
            token.clone(),
            target.clone(),
            rx.clone(),
        )));
    }
    for worker in workers {
        let _ = worker.await;
    }

    // unblock the feeder if the workers quit early
    done.cancel();
    let _ = feeder.await;
}

/// One credential worker. Exits on cancellation, global stop, per-host stop
/// after success, an exhausted retry budget, or channel close.
async fn thread_worker(
    ctx: Arc<RunCtx>,
    token: CancellationToken,
    target: Arc<Target>,
    rx: Arc<tokio::sync::Mutex<Receiver<Credential>>>,
) {
    loop {
        if token.is_cancelled() {
            return;
        }
        if ctx.global_stop && ctx.global_done.load(Ordering::Relaxed) {
            return;
        }
        if ctx.stop_on_success && target.success.load(Ordering::Relaxed) {
            return;
        }
        if ctx.retries > 0 && target.retries.load(Ordering::Relaxed) >= ctx.retries {
            return;
        }

        let credential = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => return,
                c = rx.recv() => c,
            }
        };
        let Some(credential) = credential else { return };

        match attempt(&ctx, &token, &target, &credential).await {
            Ok(true) => register_success(&ctx, &token, &target, &credential).await,
            Ok(false) => {}
            Err(_) => {
                if ctx.retries > 0 {
                    let reached = target.retries.fetch_add(1, Ordering::Relaxed) + 1;
                    if reached == ctx.retries {
                        info!(
                            "exceeded number of max retries on {}, probably banned by the target",
                            target.addr()
                        );
                    }
                }
            }
        }

        if ctx.delay > Duration::ZERO {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(ctx.delay) => {}
            }
        }
    }
}

/// One handler invocation: bumps the attempt counter, enforces the time
/// budget, records the outcome in verbose mode.
async fn attempt(
    ctx: &Arc<RunCtx>,
    token: &CancellationToken,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    ctx.attempts.fetch_add(1, Ordering::Relaxed);
    debug!(
        "trying {}:{} on {}",
        credential.username,
        credential.password,
        target.addr()
    );

    let result = match timeout(
        ctx.timeout,
        (ctx.module.handler)(token, ctx.dialer.as_ref(), ctx.timeout, target, credential),
    )
    .await
    {
        Ok(r) => r,
        Err(_) => Err(anyhow!("attempt timed out after {:?}", ctx.timeout)),
    };

    let tag = match &result {
        Ok(true) => "SUCCESS",
        Ok(false) => "FAIL",
        Err(_) => "ERROR",
    };
    logger::verbose(&format!(
        "{} {} [{}] [{}]",
        tag,
        target.addr(),
        credential.username,
        credential.password
    ));

    result
}

/// Latches the target, raises the global flag when configured, and pushes
/// the finding to the sink.
async fn register_success(
    ctx: &Arc<RunCtx>,
    token: &CancellationToken,
    target: &Arc<Target>,
    credential: &Credential,
) {
    target.success.store(true, Ordering::Relaxed);
    if ctx.global_stop {
        ctx.global_done.store(true, Ordering::Relaxed);
    }

    let finding = Finding {
        module: ctx.command.clone(),
        ip: target.ip,
        port: target.port,
        username: credential.username.clone(),
        password: credential.password.clone(),
        original_target: target.original_target.clone(),
        timestamp: Utc::now().timestamp(),
    };

    tokio::select! {
        _ = token.cancelled() => {}
        _ = ctx.results_tx.send(finding) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn options() -> Options {
        Options {
            usernames: "admin".into(),
            passwords: "secret".into(),
            combo: String::new(),
            defaults: false,
            parallel: 4,
            threads: 2,
            timeout: Duration::from_secs(2),
            delay: Duration::ZERO,
            stop_on_success: true,
            global_stop: false,
            retries: 30,
            proxy: String::new(),
            proxy_auth: String::new(),
            iface: String::new(),
            user_agent: "netbrute-test".into(),
            output: String::new(),
            json: false,
            verbose: false,
        }
    }

    #[test]
    fn zero_pools_are_rejected() {
        let mut opts = options();
        opts.parallel = 0;
        assert!(Scanner::new(opts).is_err());

        let mut opts = options();
        opts.threads = 0;
        assert!(Scanner::new(opts).is_err());
    }

    #[test]
    fn delay_forces_single_thread() {
        let mut opts = options();
        opts.delay = Duration::from_millis(10);
        opts.threads = 8;
        let scanner = Scanner::new(opts).unwrap();
        assert_eq!(scanner.opts.threads, 1);
    }

    #[test]
    fn existing_output_file_is_refused() {
        let path = std::env::temp_dir().join(format!("netbrute-out-{}", std::process::id()));
        std::fs::write(&path, "already here").unwrap();
        let mut opts = options();
        opts.output = path.to_str().unwrap().to_string();
        assert!(Scanner::new(opts).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn bad_proxy_auth_is_refused() {
        let mut opts = options();
        opts.proxy = "127.0.0.1:1080".into();
        opts.proxy_auth = "nocolon".into();
        assert!(Scanner::new(opts).is_err());
    }

    /// A scripted POP3 server that accepts exactly one user/pass pair and
    /// serves any number of connections.
    async fn pop3_server(listener: TcpListener, user: &'static str, pass: &'static str) {
        loop {
            let Ok((conn, _)) = listener.accept().await else { return };
            tokio::spawn(serve_pop3(conn, user, pass));
        }
    }

    async fn serve_pop3(mut conn: TcpStream, user: &'static str, pass: &'static str) {
        let _ = conn.write_all(b"+OK POP3 ready\r\n").await;
        let mut buf = [0u8; 256];
        let Ok(n) = conn.read(&mut buf).await else { return };
        let user_line = String::from_utf8_lossy(&buf[..n]).trim_end().to_string();
        let _ = conn.write_all(b"+OK\r\n").await;
        let Ok(n) = conn.read(&mut buf).await else { return };
        let pass_line = String::from_utf8_lossy(&buf[..n]).trim_end().to_string();
        if user_line == format!("USER {}", user) && pass_line == format!("PASS {}", pass) {
            let _ = conn.write_all(b"+OK logged in\r\n").await;
        } else {
            let _ = conn.write_all(b"-ERR authentication failed\r\n").await;
        }
    }

    #[tokio::test]
    async fn engine_finds_planted_credentials_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(pop3_server(listener, "admin", "secret"));

        let mut opts = options();
        // several wrong passwords before the right one
        let pw_file = std::env::temp_dir().join(format!("netbrute-pw-{}", std::process::id()));
        std::fs::write(&pw_file, "wrong1\nwrong2\nsecret\nwrong3\n").unwrap();
        opts.passwords = pw_file.to_str().unwrap().to_string();

        let scanner = Scanner::new(opts).unwrap();
        let token = CancellationToken::new();
        scanner
            .run(&token, "pop3", &addr.to_string())
            .await
            .unwrap();

        assert_eq!(scanner.successes(), 1, "exactly one finding expected");
        assert!(scanner.attempts() >= 2);
        let _ = std::fs::remove_file(&pw_file);
    }

    #[tokio::test]
    async fn unreachable_target_produces_no_findings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let scanner = Scanner::new(options()).unwrap();
        let token = CancellationToken::new();
        scanner
            .run(&token, "pop3", &addr.to_string())
            .await
            .unwrap();

        assert_eq!(scanner.successes(), 0);
        // probe tried TLS then plaintext, nothing more
        assert_eq!(scanner.attempts(), 2);
    }

    #[tokio::test]
    async fn cancelled_token_stops_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(pop3_server(listener, "admin", "nothere"));

        let mut opts = options();
        opts.stop_on_success = false;
        let scanner = Scanner::new(opts).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            scanner.run(&token, "pop3", &addr.to_string()),
        )
        .await;
        assert!(result.is_ok(), "run did not observe cancellation");
    }

    #[tokio::test]
    async fn unknown_module_is_an_error() {
        let scanner = Scanner::new(options()).unwrap();
        let token = CancellationToken::new();
        assert!(scanner
            .run(&token, "no-such-module", "127.0.0.1")
            .await
            .is_err());
    }
}
