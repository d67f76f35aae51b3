//! Price text parsing and BRL formatting.

/// Pull the first price-looking number out of `text`.
///
/// Understands Brazilian notation (`R$ 1.234,56`, `1.234`, `999,9`) as well as
/// plain decimals (`1234.56`) found in structured data. Returns `None` when
/// nothing usable is present or the value is not positive.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let token = first_numeric_token(text)?;
    let value = normalize_token(&token)?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Like [`parse_price_text`] but only accepts values prefixed with `R$`.
pub fn parse_brl(text: &str) -> Option<f64> {
    let (_, rest) = text.split_once("R$")?;
    parse_price_text(rest)
}

/// `1234.5` → `R$ 1.234,50`.
pub fn format_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let int_part = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}R$ {grouped},{frac:02}")
}

fn first_numeric_token(text: &str) -> Option<String> {
    let mut token = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            token.push(ch);
            continue;
        }
        if (ch == '.' || ch == ',') && !token.is_empty() {
            token.push(ch);
            continue;
        }
        if ch == ' ' && !token.is_empty() && token.ends_with('.') {
            continue;
        }
        if !token.is_empty() {
            break;
        }
    }
    let token = token.trim_end_matches(['.', ',']).to_string();
    (!token.is_empty()).then_some(token)
}

fn normalize_token(token: &str) -> Option<f64> {
    let digits = if token.contains(',') {
        // Comma is the decimal separator; dots group thousands.
        token.replace('.', "").replace(',', ".")
    } else if is_plain_decimal(token) {
        token.to_string()
    } else {
        token.replace('.', "")
    };
    digits.parse::<f64>().ok()
}

/// A single dot followed by one or two digits reads as a decimal point.
fn is_plain_decimal(token: &str) -> bool {
    match token.split_once('.') {
        Some((_, frac)) => !frac.contains('.') && (1..=2).contains(&frac.len()),
        None => false,
    }
}
