use colored::Colorize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn show() {
    let banner = r#"
                __  __                __
   ____  ___  _/ /_/ /_  _______  __ / /____
  / __ \/ _ \/ __/ __ \/ ___/ / / // __/ _ \
 / / / /  __/ /_/ /_/ / /  / /_/ // /_/  __/
/_/ /_/\___/\__/_.___/_/   \__,_/ \__/\___/
"#;

    println!("{}", banner.bright_red());
    println!("    {}", "A network services credential bruteforce tool".bright_yellow());
    println!("    {}", format!("Version: {}", VERSION).bright_yellow());
    println!();
}
