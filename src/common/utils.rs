//! Small file and stdin helpers shared across the crate.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::debug;

pub fn is_file(path: &str) -> bool {
    Path::new(path).is_file()
}

/// Reads all non-empty lines from a file. If `spec` is not an existing file
/// it is treated as a single literal value.
pub fn load_lines(spec: &str) -> Vec<String> {
    if !is_file(spec) {
        return vec![spec.to_string()];
    }
    let file = match File::open(spec) {
        Ok(f) => f,
        Err(e) => {
            debug!("error while opening file {}: {}", spec, e);
            return Vec::new();
        }
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Counts lines in a file without holding them in memory. Used to scale the
/// host pool down when the target set is small.
pub fn count_lines(path: &str) -> std::io::Result<usize> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 32 * 1024];
    let mut count = 0;
    let mut last_byte_was_newline = true;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count();
        last_byte_was_newline = buf[n - 1] == b'\n';
    }
    if !last_byte_was_newline {
        count += 1;
    }
    Ok(count)
}

/// Returns true if data is being piped to stdin.
pub fn has_stdin() -> bool {
    !atty::is(atty::Stream::Stdin)
}
