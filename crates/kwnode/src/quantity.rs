//! Kubernetes resource quantity parsing.
//!
//! Quantities are a decimal number followed by an optional suffix: a
//! binary SI suffix (`Ki`, `Mi`, ... `Ei`), a decimal SI suffix (`n`, `u`,
//! `m`, `k`, `M`, ... `E`) or a decimal exponent (`e3`, `E-2`).

/// Parses a quantity into its plain numeric value.
#[must_use]
pub fn parse_quantity(input: &str) -> Option<f64> {
    let input = input.trim();
    let split = input
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '+' || c == '-'))))
        .map_or(input.len(), |(i, _)| i);
    let (number, suffix) = input.split_at(split);

    if number.is_empty() || number == "+" || number == "-" {
        return None;
    }
    let value: f64 = number.parse().ok()?;

    Some(value * suffix_multiplier(suffix)?)
}

fn suffix_multiplier(suffix: &str) -> Option<f64> {
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024_f64,
        "Mi" => 1024_f64.powi(2),
        "Gi" => 1024_f64.powi(3),
        "Ti" => 1024_f64.powi(4),
        "Pi" => 1024_f64.powi(5),
        "Ei" => 1024_f64.powi(6),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            10_f64.powi(exponent.parse::<i32>().ok()?)
        }
    };
    Some(multiplier)
}

/// Parses a CPU quantity into millicores.
#[must_use]
pub fn parse_cpu_millis(input: &str) -> Option<f64> {
    parse_quantity(input).map(|cores| cores * 1000.0)
}

/// Parses a memory quantity into bytes.
#[must_use]
pub fn parse_memory_bytes(input: &str) -> Option<f64> {
    parse_quantity(input)
}
