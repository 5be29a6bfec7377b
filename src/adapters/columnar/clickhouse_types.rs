//! JSON <-> ClickHouse native values
//!
//! Insert columns are typed from `system.columns`. Enum columns cannot be
//! described to the driver, so they travel as their labels and the server
//! converts them (see [`ColumnType::is_enum`]).

use std::net::{Ipv4Addr, Ipv6Addr};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use klickhouse::{DynDateTime64, Ipv4, Ipv6, Type, Value as ChValue};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Widest decimal ClickHouse declares (Decimal256)
const MAX_DECIMAL_DIGITS: i64 = 76;

/// Type of one insert column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    /// Type the block is encoded with
    pub wire: Type,
    /// Labels of an enum column sent as `String`
    labels: Option<Vec<(String, i64)>>,
}

impl ColumnType {
    pub fn new(wire: Type) -> Self {
        Self { wire, labels: None }
    }

    /// Parse a type name as reported by `system.columns`
    pub fn parse(raw: &str) -> Result<Self, String> {
        if let Ok(wire) = raw.parse::<Type>() {
            return Ok(Self::new(wire));
        }
        let (replaced, labels) = replace_enums(raw)?;
        if labels.is_empty() {
            return Err(format!("unsupported column type {}", raw));
        }
        let wire = replaced
            .parse::<Type>()
            .map_err(|e| format!("unsupported column type {}: {}", raw, e))?;
        Ok(Self {
            wire,
            labels: Some(labels),
        })
    }

    /// Enum columns are inserted through `input()` so the server casts labels
    pub fn is_enum(&self) -> bool {
        self.labels.is_some()
    }

    pub fn convert(&self, value: &Value) -> Result<ChValue, String> {
        match &self.labels {
            None => from_json(value, &self.wire),
            Some(labels) => {
                let label = enum_label(value, labels, matches!(self.wire, Type::Nullable(_)))?;
                from_json(&label, &self.wire)
            }
        }
    }
}

/// Replace every `Enum8(...)`/`Enum16(...)` with `String`, collecting labels
fn replace_enums(raw: &str) -> Result<(String, Vec<(String, i64)>), String> {
    let mut out = String::with_capacity(raw.len());
    let mut labels = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.find("Enum") {
        let after = &rest[start + 4..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if !after[digits..].starts_with('(') {
            out.push_str(&rest[..start + 4]);
            rest = after;
            continue;
        }
        let body_start = start + 4 + digits + 1;
        let body_len = closing_paren(&rest[body_start..])
            .ok_or_else(|| format!("unbalanced enum type {}", raw))?;
        labels.extend(parse_enum_entries(&rest[body_start..body_start + body_len])?);

        out.push_str(&rest[..start]);
        out.push_str("String");
        rest = &rest[body_start + body_len + 1..];
    }
    out.push_str(rest);
    Ok((out, labels))
}

/// Byte offset of the `)` closing an already-open paren, skipping quoted labels
fn closing_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' => quoted = true,
            '(' => depth += 1,
            ')' if depth == 0 => return Some(idx),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// `'a' = 1, 'b' = 2`
fn parse_enum_entries(body: &str) -> Result<Vec<(String, i64)>, String> {
    let invalid = || format!("invalid enum entries ({})", body);
    let mut entries = Vec::new();
    let mut chars = body.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some('\'') => {}
            Some(_) => return Err(invalid()),
        }

        let mut label = String::new();
        loop {
            match chars.next().ok_or_else(invalid)? {
                '\\' => label.push(chars.next().ok_or_else(invalid)?),
                '\'' => break,
                c => label.push(c),
            }
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(invalid());
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut number = String::new();
        while let Some(c) = chars.next_if(|c| *c == '-' || c.is_ascii_digit()) {
            number.push(c);
        }
        entries.push((label, number.parse().map_err(|_| invalid())?));

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => {}
            Some(_) => return Err(invalid()),
        }
    }
    Ok(entries)
}

/// Enum input as its label; accepts the label or the numeric value.
/// Null into a non-nullable enum takes the first declared label.
fn enum_label(value: &Value, labels: &[(String, i64)], nullable: bool) -> Result<Value, String> {
    match value {
        Value::Null if nullable => Ok(Value::Null),
        Value::Null => labels
            .first()
            .map(|(label, _)| Value::String(label.clone()))
            .ok_or_else(|| "enum has no labels".to_string()),
        Value::String(s) if labels.iter().any(|(label, _)| label == s) => Ok(value.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|n| labels.iter().find(|(_, v)| *v == n))
            .map(|(label, _)| Value::String(label.clone()))
            .ok_or_else(|| format!("{} is not a value of the enum", n)),
        Value::Array(items) => items
            .iter()
            .map(|item| enum_label(item, labels, false))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(format!("{} is not a label of the enum", other)),
    }
}

/// Typed value -> JSON; wide integers and decimals render as exact strings
pub fn to_json(value: ChValue) -> Value {
    match value {
        ChValue::Null => Value::Null,
        ChValue::Int8(n) => n.into(),
        ChValue::Int16(n) => n.into(),
        ChValue::Int32(n) => n.into(),
        ChValue::Int64(n) => n.into(),
        ChValue::Int128(n) => Value::String(n.to_string()),
        ChValue::UInt8(n) => n.into(),
        ChValue::UInt16(n) => n.into(),
        ChValue::UInt32(n) => n.into(),
        ChValue::UInt64(n) => n.into(),
        ChValue::UInt128(n) => Value::String(n.to_string()),
        ChValue::Float32(f) => f.into(),
        ChValue::Float64(f) => f.into(),
        ChValue::Decimal32(scale, n) => Value::String(format_scaled(i128::from(n), scale)),
        ChValue::Decimal64(scale, n) => Value::String(format_scaled(i128::from(n), scale)),
        ChValue::Decimal128(scale, n) => Value::String(format_scaled(n, scale)),
        ChValue::String(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::String(STANDARD.encode(e.into_bytes())),
        },
        ChValue::Uuid(u) => Value::String(u.to_string()),
        ChValue::Date(d) => days_to_date(i64::from(d.0)),
        ChValue::DateTime(dt) => seconds_to_timestamp(i64::from(dt.1)),
        ChValue::DateTime64(dt) => ticks_to_timestamp(dt.1, dt.2),
        ChValue::Enum8(n) => n.into(),
        ChValue::Enum16(n) => n.into(),
        ChValue::Ipv4(ip) => Value::String(ip.to_string()),
        ChValue::Ipv6(ip) => Value::String(ip.to_string()),
        ChValue::Array(items) | ChValue::Tuple(items) => {
            Value::Array(items.into_iter().map(to_json).collect())
        }
        ChValue::Map(keys, values) => {
            let mut map = Map::with_capacity(keys.len());
            for (k, v) in keys.into_iter().zip(values) {
                let key = match to_json(k) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, to_json(v));
            }
            Value::Object(map)
        }
        other => Value::String(format!("{:?}", other)),
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn days_to_date(days: i64) -> Value {
    epoch()
        .checked_add_signed(chrono::Duration::days(days))
        .map_or(Value::Null, |d| Value::String(d.to_string()))
}

fn seconds_to_timestamp(secs: i64) -> Value {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map_or(Value::Null, |ts| Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()))
}

fn ticks_to_timestamp(ticks: u64, precision: usize) -> Value {
    let Some(unit) = tick_unit(precision) else {
        return Value::Null;
    };
    let (secs, frac) = (ticks / unit, ticks % unit);
    let Some(ts) = i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    else {
        return Value::Null;
    };

    let base = ts.format("%Y-%m-%d %H:%M:%S");
    if precision == 0 {
        Value::String(base.to_string())
    } else {
        Value::String(format!("{}.{:0width$}", base, frac, width = precision))
    }
}

/// Ticks per second for a DateTime64 precision (0..=9)
fn tick_unit(precision: usize) -> Option<u64> {
    u32::try_from(precision)
        .ok()
        .filter(|p| *p <= 9)
        .map(|p| 10u64.pow(p))
}

/// Decimal count of `10^-scale` units as exact text
fn format_scaled(n: i128, scale: usize) -> String {
    let sign = if n < 0 { "-" } else { "" };
    let digits = n.unsigned_abs().to_string();
    if scale == 0 {
        return format!("{}{}", sign, digits);
    }
    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (int, frac) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, int, frac)
}

/// JSON -> typed value; null into a non-nullable column takes the type's
/// zero value.
pub fn from_json(value: &Value, ty: &Type) -> Result<ChValue, String> {
    match ty {
        Type::Nullable(inner) => {
            if value.is_null() {
                Ok(ChValue::Null)
            } else {
                from_json(value, inner)
            }
        }
        Type::LowCardinality(inner) => from_json(value, inner),
        Type::Int8 => int(value).and_then(|n| narrow(n).map(ChValue::Int8)),
        Type::Int16 => int(value).and_then(|n| narrow(n).map(ChValue::Int16)),
        Type::Int32 => int(value).and_then(|n| narrow(n).map(ChValue::Int32)),
        Type::Int64 => int(value).map(ChValue::Int64),
        Type::Int128 => wide_int(value).map(ChValue::Int128),
        // Bool columns are UInt8 on the wire
        Type::UInt8 => uint(value).and_then(|n| narrow(n).map(ChValue::UInt8)),
        Type::UInt16 => uint(value).and_then(|n| narrow(n).map(ChValue::UInt16)),
        Type::UInt32 => uint(value).and_then(|n| narrow(n).map(ChValue::UInt32)),
        Type::UInt64 => uint(value).map(ChValue::UInt64),
        Type::UInt128 => wide_int(value).and_then(|n| narrow(n).map(ChValue::UInt128)),
        Type::Float32 => float(value).map(|f| ChValue::Float32(f as f32)),
        Type::Float64 => float(value).map(ChValue::Float64),
        Type::Decimal32(scale) => {
            decimal(value, *scale).and_then(|n| narrow(n).map(|n| ChValue::Decimal32(*scale, n)))
        }
        Type::Decimal64(scale) => {
            decimal(value, *scale).and_then(|n| narrow(n).map(|n| ChValue::Decimal64(*scale, n)))
        }
        Type::Decimal128(scale) => decimal(value, *scale).map(|n| ChValue::Decimal128(*scale, n)),
        Type::String | Type::FixedString(_) => Ok(ChValue::String(text(value).into_bytes())),
        Type::Uuid => match value {
            Value::Null => Ok(ChValue::Uuid(Uuid::nil())),
            Value::String(s) => Uuid::parse_str(s)
                .map(ChValue::Uuid)
                .map_err(|e| e.to_string()),
            other => Err(format!("cannot convert {} to UUID", other)),
        },
        Type::Date => {
            let days = date_days(value)?;
            u16::try_from(days)
                .map(|d| ChValue::Date(klickhouse::Date(d)))
                .map_err(|_| format!("date {} out of range", value))
        }
        Type::DateTime(tz) => {
            let secs = timestamp_secs(value)?;
            u32::try_from(secs)
                .map(|s| ChValue::DateTime(klickhouse::DateTime(*tz, s)))
                .map_err(|_| format!("timestamp {} out of range", value))
        }
        Type::DateTime64(precision, tz) => {
            let ticks = datetime64_ticks(value, *precision)?;
            Ok(ChValue::DateTime64(DynDateTime64(*tz, ticks, *precision)))
        }
        Type::Ipv4 => match value {
            Value::Null => Ok(ChValue::Ipv4(Ipv4(Ipv4Addr::UNSPECIFIED))),
            Value::String(s) => s
                .parse()
                .map(|ip| ChValue::Ipv4(Ipv4(ip)))
                .map_err(|_| format!("invalid IPv4 address {:?}", s)),
            other => Err(format!("cannot convert {} to IPv4", kind(other))),
        },
        Type::Ipv6 => match value {
            Value::Null => Ok(ChValue::Ipv6(Ipv6(Ipv6Addr::UNSPECIFIED))),
            Value::String(s) => s
                .parse()
                .map(|ip| ChValue::Ipv6(Ipv6(ip)))
                .map_err(|_| format!("invalid IPv6 address {:?}", s)),
            other => Err(format!("cannot convert {} to IPv6", kind(other))),
        },
        Type::Array(inner) => match value {
            Value::Null => Ok(ChValue::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| from_json(item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(ChValue::Array),
            other => Err(format!("cannot convert {} to Array", kind(other))),
        },
        Type::Tuple(types) => match value {
            Value::Null => types
                .iter()
                .map(|t| from_json(&Value::Null, t))
                .collect::<Result<Vec<_>, _>>()
                .map(ChValue::Tuple),
            Value::Array(items) if items.len() == types.len() => items
                .iter()
                .zip(types)
                .map(|(item, t)| from_json(item, t))
                .collect::<Result<Vec<_>, _>>()
                .map(ChValue::Tuple),
            other => Err(format!("expected an array of {} for Tuple, got {}", types.len(), other)),
        },
        Type::Map(key_ty, value_ty) => match value {
            Value::Null => Ok(ChValue::Map(Vec::new(), Vec::new())),
            Value::Object(map) => {
                let mut keys = Vec::with_capacity(map.len());
                let mut values = Vec::with_capacity(map.len());
                for (k, v) in map {
                    keys.push(from_json(&Value::String(k.clone()), key_ty)?);
                    values.push(from_json(v, value_ty)?);
                }
                Ok(ChValue::Map(keys, values))
            }
            other => Err(format!("cannot convert {} to Map", kind(other))),
        },
        other => Err(format!("unsupported column type {}", other)),
    }
}

fn narrow<T: TryFrom<i128>>(n: impl Into<i128>) -> Result<T, String> {
    let n = n.into();
    T::try_from(n).map_err(|_| format!("{} out of range", n))
}

fn int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(n) => n.as_i64().ok_or_else(|| format!("{} is not an integer", n)),
        Value::String(s) => s.trim().parse().map_err(|_| format!("cannot convert {:?} to integer", s)),
        other => Err(format!("cannot convert {} to integer", kind(other))),
    }
}

fn uint(value: &Value) -> Result<u64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(u64::from(*b)),
        Value::Number(n) => n.as_u64().ok_or_else(|| format!("{} is not an unsigned integer", n)),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("cannot convert {:?} to unsigned integer", s)),
        other => Err(format!("cannot convert {} to unsigned integer", kind(other))),
    }
}

/// 128-bit integers arrive as numbers or, beyond 64 bits, as strings
fn wide_int(value: &Value) -> Result<i128, String> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(i128::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| format!("{} is not an integer", n)),
        Value::String(s) => s.trim().parse().map_err(|_| format!("cannot convert {:?} to integer", s)),
        other => Err(format!("cannot convert {} to integer", kind(other))),
    }
}

fn float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a number", n)),
        Value::String(s) => s.trim().parse().map_err(|_| format!("cannot convert {:?} to float", s)),
        other => Err(format!("cannot convert {} to float", kind(other))),
    }
}

/// Decimal as a count of `10^-scale` units from a number or numeric string
fn decimal(value: &Value, scale: usize) -> Result<i128, String> {
    let text = match value {
        Value::Null => return Ok(0),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("cannot convert {} to Decimal", kind(other))),
    };
    scaled_decimal(&text, scale).ok_or_else(|| format!("cannot convert {:?} to Decimal(S={})", text, scale))
}

/// Parse decimal text (optionally with an exponent) into `10^-scale` units.
/// Digits beyond the scale are truncated toward zero.
fn scaled_decimal(text: &str, scale: usize) -> Option<i128> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(idx) => (&unsigned[..idx], unsigned[idx + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let digits: Vec<u8> = int_part.bytes().chain(frac_part.bytes()).collect();
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    // leading digits that make up the scaled integer
    let keep = (int_part.len() as i64)
        .checked_add(exponent)?
        .checked_add(i64::try_from(scale).ok()?)?;
    if keep > digits.len() as i64 + MAX_DECIMAL_DIGITS {
        return None;
    }

    let mut n: i128 = 0;
    for idx in 0..keep.max(0) {
        let d = usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i))
            .map_or(0, |b| i128::from(b - b'0'));
        n = n.checked_mul(10)?.checked_add(d)?;
    }
    Some(if negative { -n } else { n })
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Days since epoch from `YYYY-MM-DD` or a number of days
fn date_days(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n.as_i64().ok_or_else(|| format!("invalid date {}", n)),
        Value::String(s) => {
            let date = NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
                .map_err(|e| format!("invalid date {:?}: {}", s, e))?;
            Ok(date.signed_duration_since(epoch()).num_days())
        }
        other => Err(format!("cannot convert {} to Date", kind(other))),
    }
}

/// RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` (UTC)
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|ts| ts.and_utc())
        .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
}

/// Unix seconds from a timestamp string or a number
fn timestamp_secs(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("invalid timestamp {}", n)),
        Value::String(s) => parse_timestamp(s).map(|ts| ts.timestamp()),
        other => Err(format!("cannot convert {} to DateTime", kind(other))),
    }
}

/// DateTime64 ticks; numbers are (possibly fractional) unix seconds
fn datetime64_ticks(value: &Value, precision: usize) -> Result<u64, String> {
    let unit = tick_unit(precision).ok_or_else(|| format!("invalid DateTime64 precision {}", precision))?;
    let ticks: i128 = match value {
        Value::Null => 0,
        Value::Number(n) => match n.as_i64() {
            Some(secs) => i128::from(secs) * i128::from(unit),
            None => {
                let secs = n.as_f64().ok_or_else(|| format!("invalid timestamp {}", n))?;
                (secs * unit as f64).round() as i128
            }
        },
        Value::String(s) => {
            let ts = parse_timestamp(s)?;
            let nanos_per_tick = 1_000_000_000 / unit;
            i128::from(ts.timestamp()) * i128::from(unit)
                + i128::from(u64::from(ts.timestamp_subsec_nanos()) / nanos_per_tick)
        }
        other => return Err(format!("cannot convert {} to DateTime64", kind(other))),
    };
    u64::try_from(ticks).map_err(|_| format!("timestamp {} out of range", value))
}
