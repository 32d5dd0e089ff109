// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use anyhow::{bail, Result};
use serde::ser::Serializer;
use serde::Serialize;

/// Numeric payload of a [`crate::Value`].
///
/// Integers keep their signedness so that a field declared as unsigned can be
/// told apart from a signed one. Comparison is numeric across variants.
#[derive(Clone, Copy)]
pub enum Number {
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::UInt(u) => i64::try_from(*u).ok(),
            Number::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            Number::Float(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Number::UInt(u) => Some(*u),
            Number::Int(i) => u64::try_from(*i).ok(),
            Number::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64 => {
                Some(*f as u64)
            }
            Number::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::UInt(u) => *u as f64,
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::UInt(u) => *u == 0,
            Number::Int(i) => *i == 0,
            Number::Float(f) => *f == 0.0,
        }
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::UInt(a), Number::UInt(b)) => a.cmp(b),
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            (Number::Int(a), Number::UInt(b)) => match u64::try_from(*a) {
                Ok(a) => a.cmp(b),
                Err(_) => Ordering::Less,
            },
            (Number::UInt(a), Number::Int(b)) => match u64::try_from(*b) {
                Ok(b) => a.cmp(&b),
                Err(_) => Ordering::Greater,
            },
            (Number::UInt(a), Number::Float(b)) => cmp_int_float(i128::from(*a), *b),
            (Number::Int(a), Number::Float(b)) => cmp_int_float(i128::from(*a), *b),
            (Number::Float(a), Number::UInt(b)) => cmp_int_float(i128::from(*b), *a).reverse(),
            (Number::Float(a), Number::Int(b)) => cmp_int_float(i128::from(*b), *a).reverse(),
            (Number::Float(a), Number::Float(b)) => cmp_floats(*a, *b),
        }
    }
}

// Zeros of either sign are equal. NaNs sort below or above every number
// according to their sign.
fn cmp_floats(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

// Compares without rounding the integer to the nearest float.
fn cmp_int_float(i: i128, f: f64) -> Ordering {
    if f.is_nan() {
        return match f.is_sign_negative() {
            true => Ordering::Greater,
            false => Ordering::Less,
        };
    }
    // Both bounds are exact in f64 and enclose every i64 and u64.
    if f >= 18_446_744_073_709_551_616.0 {
        return Ordering::Less;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i128)) {
        Ordering::Equal => 0f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        other => other,
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::UInt(u) => write!(f, "{u}"),
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::UInt(u) => serializer.serialize_u64(*u),
            Number::Int(i) => serializer.serialize_i64(*i),
            // Integral floats are written without a fractional part.
            Number::Float(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*f as i64)
            }
            Number::Float(f) => serializer.serialize_f64(*f),
        }
    }
}

impl FromStr for Number {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(u) = s.parse::<u64>() {
            return Ok(Number::UInt(u));
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        match s.parse::<f64>() {
            Ok(f) => Ok(Number::Float(f)),
            Err(_) => bail!("`{s}` is not a number"),
        }
    }
}

impl From<u64> for Number {
    fn from(n: u64) -> Self {
        Number::UInt(n)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Int(n)
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number::Float(n)
    }
}
