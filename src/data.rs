use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::schema::ColumnType;

/// Tokens the publishers use in place of an empty cell.
const PLACEHOLDER_TOKENS: &[&str] = &["na", "n/a", "null", "none", "nan", "-", "--"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    PLACEHOLDER_TOKENS.contains(&lowered.as_str())
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d", "%m-%d-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    // Socrata exports sometimes carry a midnight timestamp after the date.
    if let Some((date_part, _)) = value.split_once([' ', 'T']) {
        return parse_naive_date(date_part);
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Parses with an explicit chrono format when one is declared, otherwise
/// falls back to the common formats.
pub fn parse_date_with_format(value: &str, format: Option<&str>) -> Result<NaiveDate> {
    match format {
        Some(fmt) => NaiveDate::parse_from_str(value, fmt)
            .or_else(|_| parse_naive_date(value))
            .with_context(|| format!("Failed to parse '{value}' as date with format '{fmt}'")),
        None => parse_naive_date(value),
    }
}

fn strip_thousands(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(',')
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-' | '.'))
    {
        std::borrow::Cow::Owned(value.replace(',', ""))
    } else {
        std::borrow::Cow::Borrowed(value)
    }
}

// Whole floats outside [-2^63, 2^63) would saturate when cast.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Parses a trimmed cell into a typed value. Empty cells and placeholder
/// tokens become `None`.
pub fn parse_typed_value(value: &str, ty: ColumnType, format: Option<&str>) -> Result<Option<Value>> {
    let value = value.trim();
    if value.is_empty() || is_placeholder(value) {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::String => Value::String(value.to_string()),
        ColumnType::Integer => {
            let cleaned = strip_thousands(value);
            let parsed: i64 = match cleaned.parse() {
                Ok(parsed) => parsed,
                // Spreadsheet round-trips turn 301 into 301.0.
                Err(_) => match cleaned.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(&f) => f as i64,
                    _ => bail!("Failed to parse '{value}' as integer"),
                },
            };
            Value::Integer(parsed)
        }
        ColumnType::Float => {
            let parsed: f64 = strip_thousands(value)
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            if !parsed.is_finite() {
                bail!("Failed to parse '{value}' as finite float");
            }
            Value::Float(parsed)
        }
        ColumnType::Boolean => {
            let lowered = value.to_ascii_lowercase();
            let parsed = match lowered.as_str() {
                "true" | "t" | "yes" | "y" | "1" => true,
                "false" | "f" | "no" | "n" | "0" => false,
                _ => bail!("Failed to parse '{value}' as boolean"),
            };
            Value::Boolean(parsed)
        }
        ColumnType::Date => Value::Date(parse_date_with_format(value, format)?),
    };
    Ok(Some(parsed))
}
