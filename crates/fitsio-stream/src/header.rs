//! FITS header cards: parsing, serialization, typed access and ordering.

use core::cmp::Ordering;

use crate::block::CARD_SIZE;
use crate::error::{Error, Result};
use crate::value::{self, Value};

// ── Keywords ──

/// Maximum keyword length in bytes.
pub const KEYWORD_LEN: usize = 8;

/// Width of the fixed-format value field (columns 11-30).
const FIXED_VALUE_WIDTH: usize = 20;

/// Keywords whose cards carry free text instead of a value. They are never
/// indexed and may repeat.
const COMMENT_KEYWORDS: [&str; 5] = ["COMMENT", "HISTORY", "CONTINUE", "HIERARCH", ""];

/// Returns `true` if `keyword` carries free text rather than a value.
pub fn is_comment_keyword(keyword: &str) -> bool {
    COMMENT_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(keyword.trim()))
}

/// Trim and upper-case a keyword, rejecting anything longer than 8
/// characters or containing non-printable ASCII.
pub fn normalize_keyword(keyword: &str) -> Result<String> {
    let trimmed = keyword.trim();
    if trimmed.len() > KEYWORD_LEN || !trimmed.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        return Err(Error::InvalidKeyword(keyword.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Priority of the alphabetic keyword prefix in standard header order.
fn keyword_rank(prefix: &str) -> u32 {
    match prefix {
        "SIMPLE" | "XTENSION" => 0,
        "BITPIX" => 1,
        "NAXIS" => 2,
        "EXTEND" => 3,
        "PCOUNT" => 4,
        "GCOUNT" => 5,
        "TFIELDS" => 6,
        "EXTNAME" => 7,
        "THEAP" => 8,
        "TTYPE" => 9,
        "TFORM" => 10,
        "TUNIT" => 11,
        "TNULL" => 12,
        "TSCAL" => 13,
        "TZERO" => 14,
        "TDISP" => 15,
        "LONGSTRN" => 16,
        "END" => u32::MAX,
        _ => 1000,
    }
}

/// Split `NAXIS12` into `("NAXIS", 12)`. No numeric suffix gives `-1`.
fn split_suffix(keyword: &str) -> (&str, i64) {
    let digits = keyword
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 || digits == keyword.len() {
        return (keyword, -1);
    }
    let (prefix, suffix) = keyword.split_at(keyword.len() - digits);
    (prefix, suffix.parse().unwrap_or(i64::MAX))
}

// ── Card ──

/// One 80-byte header record.
///
/// The value is kept as the literal text found on disk and interpreted on
/// demand by the typed getters.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    keyword: String,
    raw_value: Option<String>,
    comment: Option<String>,
}

impl Card {
    /// A card with no value and no comment.
    pub fn new(keyword: &str) -> Result<Self> {
        Ok(Card {
            keyword: normalize_keyword(keyword)?,
            raw_value: None,
            comment: None,
        })
    }

    /// A card from an already formatted value literal.
    pub fn with_raw(keyword: &str, raw_value: Option<&str>, comment: Option<&str>) -> Result<Self> {
        let mut card = Card::new(keyword)?;
        card.raw_value = raw_value.map(str::to_string);
        card.comment = comment.map(str::to_string);
        Ok(card)
    }

    pub fn string(keyword: &str, value: &str) -> Result<Self> {
        let mut card = Card::new(keyword)?;
        card.set_string(value);
        Ok(card)
    }

    pub fn logical(keyword: &str, value: bool) -> Result<Self> {
        let mut card = Card::new(keyword)?;
        card.set_bool(value);
        Ok(card)
    }

    pub fn integer(keyword: &str, value: i64) -> Result<Self> {
        let mut card = Card::new(keyword)?;
        card.set_i64(value);
        Ok(card)
    }

    pub fn float(keyword: &str, value: f64) -> Result<Self> {
        let mut card = Card::new(keyword)?;
        card.set_f64(value);
        Ok(card)
    }

    pub fn complex(keyword: &str, value: (f64, f64)) -> Result<Self> {
        let mut card = Card::new(keyword)?;
        card.set_complex(value);
        Ok(card)
    }

    /// A commentary card (`COMMENT`, `HISTORY`, ...) holding free text.
    pub fn text(keyword: &str, text: &str) -> Result<Self> {
        let card = Card::with_raw(keyword, None, Some(text))?;
        if !card.is_comment_like() {
            return Err(Error::InvalidKeyword(card.keyword));
        }
        Ok(card)
    }

    /// The `END` card.
    pub fn end() -> Self {
        Card {
            keyword: "END".to_string(),
            raw_value: None,
            comment: None,
        }
    }

    /// Builder-style comment setter.
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// The literal value text, quotes and escapes included.
    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    /// The comment, or the free text of a commentary card.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<&str>) {
        self.comment = comment.map(str::to_string);
    }

    pub fn set_raw_value(&mut self, raw: Option<&str>) {
        self.raw_value = raw.map(str::to_string);
    }

    pub fn is_end(&self) -> bool {
        self.keyword == "END"
    }

    pub fn is_comment_like(&self) -> bool {
        is_comment_keyword(&self.keyword)
    }

    /// Interpret the raw literal, if any.
    pub fn value(&self) -> Option<Value> {
        self.raw_value.as_deref().and_then(Value::parse)
    }

    // ── Typed getters ──

    fn raw_or_err(&self) -> Result<&str> {
        self.raw_value
            .as_deref()
            .ok_or_else(|| Error::invalid_value(&self.keyword, ""))
    }

    fn parse_with<T>(&self, parse: impl FnOnce(&str) -> Option<T>) -> Result<T> {
        let raw = self.raw_or_err()?;
        parse(raw).ok_or_else(|| Error::invalid_value(&self.keyword, raw))
    }

    pub fn get_string(&self) -> Result<String> {
        self.parse_with(value::parse_string)
    }

    pub fn get_bool(&self) -> Result<bool> {
        self.parse_with(value::parse_bool)
    }

    pub fn get_i64(&self) -> Result<i64> {
        self.parse_with(value::parse_int)
    }

    pub fn get_i32(&self) -> Result<i32> {
        self.parse_with(|raw| value::parse_int(raw).and_then(|n| i32::try_from(n).ok()))
    }

    /// Floats accept any numeric literal, including `D` exponents.
    pub fn get_f64(&self) -> Result<f64> {
        self.parse_with(value::parse_float)
    }

    pub fn get_complex(&self) -> Result<(f64, f64)> {
        self.parse_with(value::parse_complex)
    }

    // ── Typed setters ──

    pub fn set_string(&mut self, value: &str) {
        self.raw_value = Some(value::format_string(value));
    }

    pub fn set_bool(&mut self, value: bool) {
        self.raw_value = Some(value::format_bool(value).to_string());
    }

    pub fn set_i32(&mut self, value: i32) {
        self.set_i64(value.into());
    }

    pub fn set_i64(&mut self, value: i64) {
        self.raw_value = Some(value::format_int(value));
    }

    pub fn set_f64(&mut self, value: f64) {
        self.raw_value = Some(value::format_float(value));
    }

    pub fn set_complex(&mut self, value: (f64, f64)) {
        self.raw_value = Some(value::format_complex(value.0, value.1));
    }

    // ── Wire format ──

    /// Parse one 80-byte card image.
    pub fn parse(bytes: &[u8]) -> Result<Card> {
        if bytes.len() != CARD_SIZE {
            return Err(Error::InvalidCard(format!(
                "expected {CARD_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let invalid = || Error::InvalidCard(latin1(bytes).trim_end().to_string());
        let keyword = normalize_keyword(&latin1(&bytes[..KEYWORD_LEN])).map_err(|_| invalid())?;

        let has_indicator = &bytes[8..10] == b"= ";
        if has_indicator && !is_comment_keyword(&keyword) {
            let field = latin1(&bytes[10..]);
            let (raw, comment) = value::split_value_field(&field).ok_or_else(invalid)?;
            return Ok(Card {
                keyword,
                raw_value: raw.map(str::to_string),
                comment: comment.map(str::to_string),
            });
        }

        let start = if &bytes[8..10] == b"  " { 10 } else { 8 };
        let text = latin1(&bytes[start..]);
        let free = text.trim_end();
        Ok(Card {
            keyword,
            raw_value: None,
            comment: Some(free.to_string()).filter(|t| !t.is_empty()),
        })
    }

    /// Serialize to an 80-byte card image, space padded.
    ///
    /// A value that does not fit is an error; comments are truncated.
    pub fn to_bytes(&self) -> Result<[u8; CARD_SIZE]> {
        let mut line = format!("{:<8}", self.keyword);
        if self.is_comment_like() || self.is_end() {
            // Text read from byte 8 keeps its single leading blank and goes
            // back there; everything else starts at byte 10.
            if let Some(text) = &self.comment {
                let from_byte_8 = text.starts_with(' ') && !text.starts_with("  ");
                if !from_byte_8 {
                    line.push_str("  ");
                }
                line.push_str(text);
            }
            truncate_ascii(&mut line);
        } else {
            line.push_str("= ");
            match self.raw_value.as_deref() {
                Some(raw) if raw.starts_with('\'') => line.push_str(raw),
                Some(raw) => line.push_str(&format!("{raw:>FIXED_VALUE_WIDTH$}")),
                None => line.push_str(&" ".repeat(FIXED_VALUE_WIDTH)),
            }
            if line.len() > CARD_SIZE {
                return Err(Error::CardOverflow(self.keyword.clone()));
            }
            if let Some(comment) = &self.comment {
                if line.len() + 4 <= CARD_SIZE {
                    line.push_str(" / ");
                    line.push_str(comment);
                    truncate_ascii(&mut line);
                }
            }
        }

        let mut out = [b' '; CARD_SIZE];
        for (dest, ch) in out.iter_mut().zip(line.chars()) {
            *dest = if ch.is_ascii() { ch as u8 } else { b'?' };
        }
        Ok(out)
    }

    // ── Ordering ──

    /// Standard-order sort key: keyword rank, then numeric suffix.
    pub fn sort_key(&self) -> (u32, i64) {
        let rank = keyword_rank(&self.keyword);
        if rank != 1000 {
            return (rank, -1);
        }
        let (prefix, index) = split_suffix(&self.keyword);
        (keyword_rank(prefix), index)
    }

    /// Compare two cards by their position in standard header order.
    pub fn compare_order(&self, other: &Card) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn truncate_ascii(line: &mut String) {
    if line.len() > CARD_SIZE {
        let mut end = CARD_SIZE;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        line.truncate(end);
    }
}
