//! Embedded default wordlists for the `--defaults` flag. The lists are
//! compiled in from the .txt files next to this module; edit those to
//! update them.

const USERNAMES_RAW: &str = include_str!("usernames.txt");
const PASSWORDS_RAW: &str = include_str!("passwords.txt");

fn parse_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Common service usernames.
pub fn default_usernames() -> Vec<String> {
    parse_lines(USERNAMES_RAW)
}

/// Frequently used passwords.
pub fn default_passwords() -> Vec<String> {
    parse_lines(PASSWORDS_RAW)
}
