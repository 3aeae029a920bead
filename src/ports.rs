use crate::error::ConfigError;

/// Parse a port expression into a deduplicated list of TCP ports (1..=65535).
///
/// Supported syntax:
/// - single port number: `443`
/// - inclusive range: `8000-8010`
/// - several items separated by commas, whitespace or newlines: `22,443 8000-8010`
/// - comments: everything after `#` on a line is ignored
///
/// Ports keep the order of their first appearance.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>, ConfigError> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let items = s
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|item| !item.is_empty());

    for item in items {
        let (start, end) = match item.split_once('-') {
            Some((a, b)) => {
                let start = parse_port_str(a, s)?;
                let end = parse_port_str(b, s)?;
                if start > end {
                    return Err(ConfigError::InvertedRange { start, end });
                }
                (start, end)
            }
            None => {
                let p = parse_port_str(item, s)?;
                (p, p)
            }
        };
        for p in start..=end {
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    if out.is_empty() {
        return Err(ConfigError::PortExpression {
            input: s.to_string(),
            reason: "no ports given".to_string(),
        });
    }
    Ok(out)
}

fn parse_port_str(item: &str, input: &str) -> Result<u16, ConfigError> {
    let val: u32 = item.trim().parse().map_err(|e| ConfigError::PortExpression {
        input: input.to_string(),
        reason: format!("{item:?}: {e}"),
    })?;
    if val == 0 || val > u32::from(u16::MAX) {
        return Err(ConfigError::PortOutOfRange(val));
    }
    Ok(val as u16)
}
