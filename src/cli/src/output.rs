//! Console output for the operator.

use std::io::Write;

use a3s_sign_runtime::OperatorNotifier;

/// Warnings go to stderr, results to stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl OperatorNotifier for ConsoleNotifier {
    fn warn(&self, text: &str) {
        let _ = writeln!(std::io::stderr(), "Warning: {}", text);
    }

    fn report(&self, text: &str) {
        let _ = writeln!(std::io::stdout(), "{}", text);
    }
}

/// Parse a duration such as `24h`, `30m`, `90s` or `1h30m`.
///
/// Units: `d`, `h`, `m`, `s`. A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<std::time::Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(std::time::Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut number = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let unit = match c {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("invalid duration {:?}: unknown unit '{}'", input, other)),
        };
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration {:?}: missing number before '{}'", input, c))?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("invalid duration {:?}: too large", input))?;
        number.clear();
    }
    if !number.is_empty() {
        return Err(format!("invalid duration {:?}: missing unit after {}", input, number));
    }
    Ok(std::time::Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1_800));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
    }

    #[test]
    fn test_parse_duration_bare_seconds() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("1.5h").is_err());
    }
}
