//! Command line surface: one subcommand per protocol module plus `all` for
//! scan-file / stdin routing.

use std::time::Duration;

use clap::{Parser, Subcommand};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

#[derive(Parser, Debug)]
#[command(
    name = "netbrute",
    version,
    about = "netbrute is a network services bruteforce tool.",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Target host or file with targets, format host or host:port, one per line
    #[arg(short = 't', long, global = true)]
    pub target: Option<String>,

    /// Username or file with usernames
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Password or file with passwords
    #[arg(short = 'p', long, global = true)]
    pub password: Option<String>,

    /// File with combo user:pass lines (split on the first colon)
    #[arg(long, global = true)]
    pub combo: Option<String>,

    /// Use the embedded default wordlists
    #[arg(long, global = true)]
    pub defaults: bool,

    /// Number of targets in parallel
    #[arg(short = 'C', long = "concurrent-hosts", default_value_t = 32, global = true)]
    pub concurrent_hosts: usize,

    /// Number of parallel threads per target
    #[arg(short = 'c', long = "concurrent-threads", default_value_t = 10, global = true)]
    pub concurrent_threads: usize,

    /// Delay between each attempt; always uses a single thread if set
    #[arg(short = 'd', long, default_value = "0s", value_parser = parse_duration, global = true)]
    pub delay: Duration,

    /// Connection timeout per attempt
    #[arg(long, default_value = "5s", value_parser = parse_duration, global = true)]
    pub timeout: Duration,

    /// Stop bruteforcing a host when its first valid credentials are found
    #[arg(short = 'f', long = "stop-on-success", global = true)]
    pub stop_on_success: bool,

    /// Stop the entire run on the first successful login across all hosts
    #[arg(short = 'F', long = "stop-on-success-global", global = true)]
    pub global_stop: bool,

    /// Number of connection errors to stop bruteforcing a host; 0 disables
    #[arg(long = "max-retries", default_value_t = 30, global = true)]
    pub max_retries: u32,

    /// SOCKS5 proxy address in format IP:PORT
    #[arg(long, default_value = "", global = true)]
    pub proxy: String,

    /// Proxy username and password in format username:password
    #[arg(long = "proxy-auth", default_value = "", global = true)]
    pub proxy_auth: String,

    /// Network interface to bind outgoing connections to (e.g. eth0)
    #[arg(short = 'I', long, default_value = "", global = true)]
    pub iface: String,

    /// User-Agent for HTTP connections
    #[arg(long = "user-agent", default_value = DEFAULT_USER_AGENT, global = true)]
    pub user_agent: String,

    /// Quiet mode, print results only
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Debug mode, print all logs
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    /// Log every attempt with its outcome
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Output results as JSONL (one JSON object per line)
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Filename to write results to; refuses to overwrite an existing file
    #[arg(short = 'o', long, default_value = "", global = true)]
    pub output: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// AMQP module (port 5672)
    Amqp,
    /// Asterisk Manager Interface module (port 5038)
    Asterisk,
    /// Cisco IOS Telnet module (port 23)
    Cisco,
    /// Cisco IOS enable-mode password module (port 23)
    CiscoEnable,
    /// ClickHouse native protocol module (port 9000)
    Clickhouse,
    /// Cobalt Strike team server module (port 50050)
    Cobaltstrike,
    /// etcd module (port 2379)
    Etcd,
    /// FTP module (port 21, explicit TLS when available)
    Ftp,
    /// HTTP Basic Auth module (port 80 / 443 TLS)
    HttpBasic,
    /// IMAP module (port 143 / 993 TLS)
    Imap,
    /// IRC server password module (port 6667)
    Irc,
    /// LDAP simple bind module (port 389)
    Ldap,
    /// LDAPS simple bind module (port 636 TLS)
    Ldaps,
    /// MongoDB module (port 27017)
    Mongo,
    /// Microsoft SQL Server module (port 1433)
    Mssql,
    /// MySQL module (port 3306)
    Mysql,
    /// POP3 module (port 110 / 995 TLS)
    Pop3,
    /// PostgreSQL module (port 5432)
    Postgres,
    /// RDP NLA module (port 3389)
    Rdp,
    /// Redis module (port 6379)
    Redis,
    /// BSD rexec module (port 512)
    Rexec,
    /// BSD rlogin module (port 513)
    Rlogin,
    /// BSD rsh module (port 514)
    Rsh,
    /// RTSP module (port 554)
    Rtsp,
    /// SMB module (port 445)
    Smb,
    /// SMPP module (port 2775)
    Smpp,
    /// SMTP AUTH module (port 25 / 465 TLS / 587 STARTTLS)
    Smtp,
    /// SNMP v2c community string module (port 161 UDP)
    Snmp,
    /// SOCKS5 proxy auth module (port 1080)
    Socks5,
    /// SSH module (port 22)
    Ssh,
    /// TeamSpeak ServerQuery module (port 10011)
    Teamspeak,
    /// Telnet module (port 23)
    Telnet,
    /// HashiCorp Vault userpass module (port 8200)
    Vault,
    /// VNC module (port 5900)
    Vnc,
    /// WinRM module (port 5985 / 5986 TLS)
    Winrm,
    /// XMPP SASL PLAIN module (port 5222)
    Xmpp,
    /// Auto-route targets from a scan file or stdin to matching modules
    All {
        /// nmap GNMAP/XML, Nessus or Nexpose output file
        #[arg(short = 'n', long)]
        nmap: Option<String>,
    },
}

impl Command {
    /// The module registry key for this subcommand.
    pub fn module_name(&self) -> &'static str {
        match self {
            Command::Amqp => "amqp",
            Command::Asterisk => "asterisk",
            Command::Cisco => "cisco",
            Command::CiscoEnable => "cisco-enable",
            Command::Clickhouse => "clickhouse",
            Command::Cobaltstrike => "cobaltstrike",
            Command::Etcd => "etcd",
            Command::Ftp => "ftp",
            Command::HttpBasic => "http-basic",
            Command::Imap => "imap",
            Command::Irc => "irc",
            Command::Ldap => "ldap",
            Command::Ldaps => "ldaps",
            Command::Mongo => "mongo",
            Command::Mssql => "mssql",
            Command::Mysql => "mysql",
            Command::Pop3 => "pop3",
            Command::Postgres => "postgres",
            Command::Rdp => "rdp",
            Command::Redis => "redis",
            Command::Rexec => "rexec",
            Command::Rlogin => "rlogin",
            Command::Rsh => "rsh",
            Command::Rtsp => "rtsp",
            Command::Smb => "smb",
            Command::Smpp => "smpp",
            Command::Smtp => "smtp",
            Command::Snmp => "snmp",
            Command::Socks5 => "socks5",
            Command::Ssh => "ssh",
            Command::Teamspeak => "teamspeak",
            Command::Telnet => "telnet",
            Command::Vault => "vault",
            Command::Vnc => "vnc",
            Command::Winrm => "winrm",
            Command::Xmpp => "xmpp",
            Command::All { .. } => "all",
        }
    }
}

/// Parses durations like "5s", "250ms", "2m" or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return parse_number(ms).map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return parse_number(secs).map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return parse_number(mins).map(|m| Duration::from_secs(m * 60));
    }
    parse_number(s).map(Duration::from_secs)
}

fn parse_number(s: &str) -> Result<u64, String> {
    s.parse::<u64>()
        .map_err(|_| format!("invalid duration value {:?}", s))
}
