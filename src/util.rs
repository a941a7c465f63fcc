//! Number formatting shared by the CSV writer and the reduced log.

/// Render a float the way the convergence CSV has always stored it: the
/// shortest text that parses back to the same value, with a `.0` on
/// integral values and a signed two digit exponent below `1e-4` or from
/// `1e16` upward (`0.00012`, `3e-05`, `1.0`, `1e+16`).
pub fn format_csv_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // `{:?}` already switches to exponent form at the same thresholds.
    let shortest = format!("{:?}", value);
    match shortest.split_once('e') {
        Some((mantissa, exponent)) => format!("{}e{}", mantissa, pad_exponent(exponent)),
        None => shortest,
    }
}

/// Scientific notation with `precision` digits after the decimal point and
/// a signed two digit exponent, e.g. `1.2000e-04`.
pub fn format_scientific(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => format!("{}e{}", mantissa, pad_exponent(exponent)),
        None => formatted,
    }
}

fn pad_exponent(exponent: &str) -> String {
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent.trim_start_matches('+')),
    };
    format!("{}{:0>2}", sign, digits)
}
