use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::types::Host;

/// Parse a host list into an ordered, deduplicated list of hosts.
///
/// Supported formats per line:
/// - a single hostname: `github.com`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_hosts_str(s: &str) -> Result<Vec<Host>> {
    let mut out: Vec<Host> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        if line.split_whitespace().count() > 1 {
            bail!("line {line_no}: expected one hostname, got: {line}");
        }

        if seen.insert(line.to_string()) {
            out.push(Host::new(line));
        } else {
            tracing::debug!(host = line, line = line_no, "skipping duplicate host");
        }
    }

    Ok(out)
}

/// Load the host list from a file path. Errors if the file cannot be read,
/// cannot be parsed, or names no hosts at all.
pub fn load_hosts_from_path(path: impl AsRef<Path>) -> Result<Vec<Host>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read hosts file: {}", path.display()))?;
    let hosts = parse_hosts_str(&content)
        .with_context(|| format!("invalid hosts file: {}", path.display()))?;
    if hosts.is_empty() {
        bail!("no hosts found in {}", path.display());
    }
    Ok(hosts)
}
