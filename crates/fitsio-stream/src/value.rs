//! Header value literals.
//!
//! A card keeps its value as the literal text found on disk; the helpers here
//! convert between that text and typed values. Formatting never depends on
//! the process locale.

/// A typed interpretation of a header value literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string (content between single quotes, unescaped).
    String(String),
    /// FITS complex value `(real, imaginary)`.
    Complex(f64, f64),
}

impl Value {
    /// Interpret a raw literal. Returns `None` for empty or unrecognized text.
    pub fn parse(raw: &str) -> Option<Value> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        if text.starts_with('\'') {
            return parse_string(text).map(Value::String);
        }
        if let Some(b) = parse_bool(text) {
            return Some(Value::Logical(b));
        }
        if text.starts_with('(') {
            return parse_complex(text).map(|(re, im)| Value::Complex(re, im));
        }
        if !text.contains(['.', 'E', 'e', 'D', 'd']) {
            if let Some(n) = parse_int(text) {
                return Some(Value::Integer(n));
            }
        }
        parse_float(text).map(Value::Float)
    }

    /// Format this value as an on-disk literal.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Logical(b) => format_bool(*b).to_string(),
            Value::Integer(n) => format_int(*n),
            Value::Float(f) => format_float(*f),
            Value::String(s) => format_string(s),
            Value::Complex(re, im) => format_complex(*re, *im),
        }
    }
}

// ── Strings ──

/// Quote `s` for a card: embedded quotes are doubled and the content is
/// padded with spaces to at least 8 characters.
pub fn format_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len().max(8) + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    let content = out.len() - 1;
    for _ in content..8 {
        out.push(' ');
    }
    out.push('\'');
    out
}

/// Unquote a string literal. Trailing spaces inside the quotes are dropped,
/// leading spaces are significant.
pub fn parse_string(raw: &str) -> Option<String> {
    let (content, rest) = split_quoted(raw.trim_start())?;
    if !rest.trim().is_empty() {
        return None;
    }
    Some(content.replace("''", "'").trim_end().to_string())
}

/// Split a leading quoted literal off `text`.
///
/// Returns the escaped content between the quotes and everything after the
/// closing quote, or `None` when the literal is not terminated.
fn split_quoted(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'\'') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some((&text[1..i], &text[i + 1..]));
        }
        i += 1;
    }
    None
}

// ── Scalars ──

pub fn format_bool(b: bool) -> &'static str {
    if b {
        "T"
    } else {
        "F"
    }
}

/// Strict logical parse: only `T` and `F`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "T" => Some(true),
        "F" => Some(false),
        _ => None,
    }
}

pub fn format_int(n: i64) -> String {
    n.to_string()
}

pub fn parse_int(raw: &str) -> Option<i64> {
    let text = raw.trim();
    text.strip_prefix('+').unwrap_or(text).parse().ok()
}

/// Shortest round-trip scientific form with a mandatory decimal point,
/// e.g. `1.0E0`, `9.80665E0`, `-4.56E-20`.
pub fn format_float(f: f64) -> String {
    let s = format!("{f:E}");
    match s.find('E') {
        Some(pos) if !s[..pos].contains('.') => format!("{}.0{}", &s[..pos], &s[pos..]),
        _ => s,
    }
}

/// Parse a float literal, accepting FITS `D` exponents.
pub fn parse_float(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(['D', 'd'], "E");
    normalized.parse().ok()
}

pub fn format_complex(re: f64, im: f64) -> String {
    format!("({}, {})", format_float(re), format_float(im))
}

pub fn parse_complex(raw: &str) -> Option<(f64, f64)> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (left, right) = inner.split_once(',')?;
    Some((parse_float(left)?, parse_float(right)?))
}

// ── Value field splitting ──

/// Split the 70-byte value field of a card into the raw value literal and
/// the comment.
///
/// A leading quoted literal is matched first; otherwise the value runs up to
/// the first `/`. Returns `None` for an unterminated string literal.
pub(crate) fn split_value_field(field: &str) -> Option<(Option<&str>, Option<&str>)> {
    let trimmed = field.trim_start();
    let (value, rest) = if trimmed.starts_with('\'') {
        let (content, rest) = split_quoted(trimmed)?;
        (&trimmed[..content.len() + 2], rest)
    } else {
        match trimmed.find('/') {
            Some(pos) => (trimmed[..pos].trim_end(), &trimmed[pos..]),
            None => (trimmed.trim_end(), ""),
        }
    };
    let comment = rest
        .trim_start()
        .strip_prefix('/')
        .map(|c| c.strip_prefix(' ').unwrap_or(c).trim_end())
        .filter(|c| !c.is_empty());
    let value = Some(value).filter(|v| !v.is_empty());
    Some((value, comment))
}
