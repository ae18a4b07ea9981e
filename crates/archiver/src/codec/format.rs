//! Text rendering and parsing of sample values through their CtrlInfo.

use super::sample::truncate_str;
use super::{CtrlInfo, Sample, ValueData, MAX_STRING_SIZE};
use crate::error::{ArchiveError, Result};

const SEPARATOR: &str = ", ";

/// Renders the value of `sample`.
///
/// Numeric elements use the precision of a numeric `info`, enumerated
/// elements their state labels. Elements are joined by `", "`.
pub fn format_value(sample: &Sample, info: &CtrlInfo) -> Result<String> {
    match &sample.data {
        ValueData::String(v) => match v.as_slice() {
            [single] => Ok(single.clone()),
            [] => Ok(String::new()),
            _ => Err(ArchiveError::Unsupported(format!(
                "Cannot format string array of {} elements",
                v.len()
            ))),
        },
        ValueData::Enum(v) => {
            if !matches!(info, CtrlInfo::Enumerated(_)) {
                return Err(ArchiveError::invalid("Enum value without enumerated CtrlInfo"));
            }
            Ok(v.iter()
                .map(|s| info.state(*s as usize))
                .collect::<Vec<_>>()
                .join(SEPARATOR))
        }
        _ => {
            let mut parts = Vec::with_capacity(sample.data.len());
            for i in 0..sample.data.len() {
                parts.push(info.format_double(sample.to_double(i)?)?);
            }
            Ok(parts.join(SEPARATOR))
        }
    }
}

/// Like [`format_value`], with `" <units>"` appended for numeric infos.
pub fn format_value_with_units(sample: &Sample, info: &CtrlInfo) -> Result<String> {
    let mut text = format_value(sample, info)?;
    if !matches!(sample.data, ValueData::Enum(_) | ValueData::String(_)) && !info.units().is_empty() {
        text.push(' ');
        text.push_str(info.units());
    }
    Ok(text)
}

/// Parses `text` into the value of `sample`, keeping its type and count.
///
/// `"-"` zeroes the first element. Returns `Ok(false)` for text that does
/// not fit the element type; `sample` may then be partially updated.
pub fn parse_value(sample: &mut Sample, text: &str, info: &CtrlInfo) -> Result<bool> {
    if text == "-" {
        clear_first(&mut sample.data);
        return Ok(true);
    }
    match &mut sample.data {
        ValueData::String(v) => {
            if let Some(first) = v.first_mut() {
                *first = truncate_str(text, MAX_STRING_SIZE - 1).to_string();
            }
            Ok(true)
        }
        ValueData::Enum(v) => {
            if !matches!(info, CtrlInfo::Enumerated(_)) {
                return Err(ArchiveError::invalid("Enum value without enumerated CtrlInfo"));
            }
            let mut rest = text;
            for slot in v.iter_mut() {
                rest = rest.trim_start_matches([' ', ',']);
                let Some((state, tail)) = info.parse_state(rest) else {
                    return Ok(false);
                };
                *slot = state as u16;
                rest = tail;
            }
            Ok(true)
        }
        ValueData::Short(v) => Ok(fill(v, text, |t| parse_int(t).and_then(|x| i16::try_from(x).ok()))),
        ValueData::Long(v) => Ok(fill(v, text, |t| parse_int(t).and_then(|x| i32::try_from(x).ok()))),
        ValueData::Char(v) => Ok(fill(v, text, |t| t.parse::<u8>().ok())),
        ValueData::Float(v) => Ok(fill(v, text, |t| t.parse::<f32>().ok())),
        ValueData::Double(v) => Ok(fill(v, text, |t| t.parse::<f64>().ok())),
    }
}

fn clear_first(data: &mut ValueData) {
    match data {
        ValueData::String(v) => v.iter_mut().take(1).for_each(|s| s.clear()),
        ValueData::Short(v) => v.iter_mut().take(1).for_each(|x| *x = 0),
        ValueData::Float(v) => v.iter_mut().take(1).for_each(|x| *x = 0.0),
        ValueData::Enum(v) => v.iter_mut().take(1).for_each(|x| *x = 0),
        ValueData::Char(v) => v.iter_mut().take(1).for_each(|x| *x = 0),
        ValueData::Long(v) => v.iter_mut().take(1).for_each(|x| *x = 0),
        ValueData::Double(v) => v.iter_mut().take(1).for_each(|x| *x = 0.0),
    }
}

/// Fills `slots` from space or comma separated tokens.
fn fill<T>(slots: &mut [T], text: &str, parse: impl Fn(&str) -> Option<T>) -> bool {
    let mut tokens = text.split([' ', ',', '\t']).filter(|t| !t.is_empty());
    for slot in slots.iter_mut() {
        match tokens.next().and_then(&parse) {
            Some(value) => *slot = value,
            None => return false,
        }
    }
    true
}

/// Decimal, `0x` hex or leading-zero octal integer with optional sign.
fn parse_int(token: &str) -> Option<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}
