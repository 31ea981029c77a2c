//! Keystroke normalisation for the phone and energy-cost inputs.
//!
//! Everything here is pure: the form only ever stores the display string, and
//! feeding a display string back through the same formatter yields it again.

/// Keep only the ASCII digits of `raw`.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a Brazilian phone number as `(AA) BBBB-CCCC` (landline, up to ten
/// digits) or `(AA) BBBBB-CCCC` (mobile, eleven or more digits).
///
/// Input too short to fill the area code and first group is returned as bare
/// digits. Digits past the last group are kept as-is.
pub fn format_phone(raw: &str) -> String {
    let numbers = digits(raw);
    let first_group = if numbers.len() <= 10 { 4 } else { 5 };

    if numbers.len() < 2 + first_group {
        return numbers;
    }

    let (area, rest) = numbers.split_at(2);
    let (first, rest) = rest.split_at(first_group);
    let last_len = rest.len().min(4);
    let (last, overflow) = rest.split_at(last_len);

    let mut out = format!("({area}) {first}");
    if !last.is_empty() {
        out.push('-');
        out.push_str(last);
    }
    out.push_str(overflow);
    out
}

/// Format an amount typed as minor units (centavos) using pt-BR separators:
/// `"150000"` becomes `"1.500,00"`.
///
/// Returns `None` when `raw` holds no digit at all.
pub fn format_currency(raw: &str) -> Option<String> {
    let numbers = digits(raw);
    if numbers.is_empty() {
        return None;
    }

    let significant = numbers.trim_start_matches('0');
    let padded = format!("{significant:0>3}");
    let (units, cents) = padded.split_at(padded.len() - 2);

    Some(format!("{},{cents}", group_thousands(units, '.')))
}

/// Numeric value of a formatted amount, e.g. `"1.500,00"` → `1500.0`.
pub fn currency_value(display: &str) -> Option<f64> {
    let numbers = digits(display);
    if numbers.is_empty() {
        return None;
    }
    numbers.parse::<f64>().ok().map(|minor| minor / 100.0)
}

fn group_thousands(units: &str, separator: char) -> String {
    let len = units.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in units.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}
