use std::process;

use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use netbrute::cli::{Cli, Command};
use netbrute::common::{banner, logger, utils};
use netbrute::scanner::{Options, Scanner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init(cli.quiet, cli.debug) {
        eprintln!("{}", e);
        process::exit(1);
    }
    logger::set_verbose(cli.verbose);

    if !cli.quiet {
        banner::show();
    }

    // credential sources: explicit lists, a combo file, or --defaults
    let has_creds = (cli.username.is_some() && cli.password.is_some())
        || cli.combo.is_some()
        || cli.defaults;
    if !has_creds {
        error!("no credentials given: use --username/--password, --combo or --defaults");
        process::exit(1);
    }

    let options = Options {
        usernames: cli.username.clone().unwrap_or_default(),
        passwords: cli.password.clone().unwrap_or_default(),
        combo: cli.combo.clone().unwrap_or_default(),
        defaults: cli.defaults,
        parallel: cli.concurrent_hosts,
        threads: cli.concurrent_threads,
        timeout: cli.timeout,
        delay: cli.delay,
        stop_on_success: cli.stop_on_success,
        global_stop: cli.global_stop,
        retries: cli.max_retries,
        proxy: cli.proxy.clone(),
        proxy_auth: cli.proxy_auth.clone(),
        iface: cli.iface.clone(),
        user_agent: cli.user_agent.clone(),
        output: cli.output.clone(),
        json: cli.json,
        verbose: cli.verbose,
    };

    let scanner = match Scanner::new(options) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    // SIGINT / SIGTERM cancel the run token; workers drain and exit
    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let command_name = cli.command.module_name();
    info!("executing {} module", command_name);

    let result = match &cli.command {
        Command::All { nmap } => match nmap {
            Some(path) => scanner.run_nmap(&token, path).await,
            None if utils::has_stdin() => {
                scanner.run_stdin(&token, std::io::stdin().lock()).await
            }
            None => {
                error!("the all command needs --nmap FILE or targets piped to stdin");
                process::exit(1);
            }
        },
        _ => match &cli.target {
            Some(target) => scanner.run(&token, command_name, target).await,
            None => {
                error!("--target is required for the {} module", command_name);
                process::exit(1);
            }
        },
    };

    scanner.stop();

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }

    info!("finished execution of {} module", command_name);
}

fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("SIGTERM handler installation cannot fail");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        token.cancel();
    });
}
