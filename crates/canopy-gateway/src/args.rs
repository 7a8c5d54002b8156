//! Positional argument decoding for named function calls
//!
//! Arguments arrive as a JSON array. Numbers may be sent as JSON numbers
//! or numeric strings; lists as JSON arrays or a string holding one.

use std::str::FromStr;

use canopy_common::{time::parse_timestamp, CanopyError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

pub struct Args<'a> {
    function: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(function: &'a str, values: &'a [Value]) -> Self {
        Self { function, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fail unless `min..=max` arguments were given
    pub fn expect(&self, min: usize, max: usize) -> Result<()> {
        let n = self.values.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{}..={}", min, max)
            };
            return Err(CanopyError::invalid(format!(
                "{} expects {} arguments, got {}",
                self.function, expected, n
            )));
        }
        Ok(())
    }

    fn bad(&self, name: &str, detail: impl std::fmt::Display) -> CanopyError {
        CanopyError::invalid(format!("{}: invalid {}: {}", self.function, name, detail))
    }

    fn raw(&self, i: usize, name: &str) -> Result<&'a Value> {
        self.values
            .get(i)
            .ok_or_else(|| self.bad(name, "missing"))
    }

    pub fn string(&self, i: usize, name: &str) -> Result<String> {
        match self.raw(i, name)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(self.bad(name, format!("expected a string, got {}", other))),
        }
    }

    /// Absent or empty string is `None`
    pub fn opt_string(&self, i: usize) -> Option<String> {
        match self.values.get(i) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn f64(&self, i: usize, name: &str) -> Result<f64> {
        match self.raw(i, name)? {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.bad(name, n)),
            Value::String(s) => s.trim().parse().map_err(|_| self.bad(name, s)),
            other => Err(self.bad(name, other)),
        }
    }

    pub fn u32(&self, i: usize, name: &str) -> Result<u32> {
        let bad = |v: &dyn std::fmt::Display| {
            self.bad(name, format!("{} (expected a whole number)", v))
        };
        match self.raw(i, name)? {
            Value::Number(n) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| bad(n)),
            Value::String(s) => s.trim().parse().map_err(|_| bad(s)),
            other => Err(bad(other)),
        }
    }

    pub fn bool(&self, i: usize, name: &str) -> Result<bool> {
        match self.raw(i, name)? {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => s.trim().parse().map_err(|_| self.bad(name, s)),
            other => Err(self.bad(name, other)),
        }
    }

    pub fn decimal(&self, i: usize, name: &str) -> Result<Decimal> {
        let text = match self.raw(i, name)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            other => return Err(self.bad(name, other)),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| self.bad(name, text))
    }

    /// RFC 3339 string or Unix seconds
    pub fn timestamp(&self, i: usize, name: &str) -> Result<DateTime<Utc>> {
        match self.raw(i, name)? {
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(secs) => self.unix(secs, name),
                Err(_) => parse_timestamp(s),
            },
            Value::Number(n) => match n.as_i64() {
                Some(secs) => self.unix(secs, name),
                None => Err(self.bad(name, n)),
            },
            other => Err(self.bad(name, other)),
        }
    }

    /// Absent or empty string is `None`
    pub fn opt_timestamp(&self, i: usize, name: &str) -> Result<Option<DateTime<Utc>>> {
        match self.values.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(_) => self.timestamp(i, name).map(Some),
        }
    }

    fn unix(&self, secs: i64, name: &str) -> Result<DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| self.bad(name, secs))
    }

    pub fn strings(&self, i: usize, name: &str) -> Result<Vec<String>> {
        let raw = self.raw(i, name)?;
        let parsed;
        let items = match raw {
            Value::Array(items) => items,
            Value::String(s) => {
                parsed = serde_json::from_str::<Value>(s).map_err(|_| self.bad(name, s))?;
                match &parsed {
                    Value::Array(items) => items,
                    _ => return Err(self.bad(name, s)),
                }
            }
            other => return Err(self.bad(name, other)),
        };
        items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(self.bad(name, other)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_common::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_numbers_from_numbers_or_strings() {
        let values = vec![json!(12.5), json!("7"), json!("1000.50"), json!(3)];
        let args = Args::new("F", &values);
        assert_eq!(args.f64(0, "a").unwrap(), 12.5);
        assert_eq!(args.u32(1, "b").unwrap(), 7);
        assert_eq!(args.decimal(2, "c").unwrap().to_string(), "1000.50");
        assert_eq!(args.decimal(3, "d").unwrap(), Decimal::from(3));
    }

    #[test]
    fn test_lists_from_arrays_or_json_strings() {
        let values = vec![json!(["a", "b"]), json!("[\"c\"]"), json!([1])];
        let args = Args::new("F", &values);
        assert_eq!(args.strings(0, "ids").unwrap(), vec!["a", "b"]);
        assert_eq!(args.strings(1, "ids").unwrap(), vec!["c"]);
        assert!(args.strings(2, "ids").is_err());
    }

    #[test]
    fn test_timestamps() {
        let values = vec![json!("2024-03-01T06:00:00Z"), json!(1709272800), json!("")];
        let args = Args::new("F", &values);
        assert_eq!(args.timestamp(0, "t").unwrap(), args.timestamp(1, "t").unwrap());
        assert_eq!(args.opt_timestamp(2, "t").unwrap(), None);
        assert_eq!(args.opt_timestamp(5, "t").unwrap(), None);
    }

    #[test]
    fn test_arity_and_missing() {
        let values = vec![json!("x")];
        let args = Args::new("GetOracle", &values);
        assert!(args.expect(1, 1).is_ok());
        assert_eq!(args.expect(2, 3).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(args.f64(4, "rainfall").unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
