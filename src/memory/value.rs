//! Runtime value representation
//!
//! A [`Value`] is an immutable reading of an atomic object: a type, the raw
//! number stored for it, whether that number is meaningful, and (for pointers)
//! the object the pointer was derived from.
//!
//! # Raw Storage
//!
//! - `bool`, `char`, `int` and pointers are carried as [`RawValue::Int`]
//! - `double` is carried as [`RawValue::Float`]
//!
//! Values are encoded to little-endian bytes when written into memory and
//! decoded again on read, so type punning through pointers shows real bytes.

use super::object::ObjectId;
use crate::program::types::ObjectType;
use serde::Serialize;
use std::fmt;

/// Memory address type (64-bit)
pub type Address = u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RawValue {
    Int(i64),
    Float(f64),
}

/// Where a pointer value came from
///
/// Dereferencing a pointer with provenance resolves through the recorded
/// object instead of inspecting whatever currently lives at the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    /// Points at (or one past) an element of this array
    Array(ObjectId),
    /// Points at this complete object or subobject
    Object(ObjectId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    pub ty: ObjectType,
    pub raw: RawValue,
    pub valid: bool,
    pub provenance: Option<Provenance>,
}

impl Value {
    pub fn int(n: i64) -> Self {
        Value::of(ObjectType::Int, RawValue::Int(n))
    }

    pub fn double(d: f64) -> Self {
        Value::of(ObjectType::Double, RawValue::Float(d))
    }

    pub fn boolean(b: bool) -> Self {
        Value::of(ObjectType::Bool, RawValue::Int(b as i64))
    }

    pub fn character(c: u8) -> Self {
        Value::of(ObjectType::Char, RawValue::Int(c as i8 as i64))
    }

    pub fn pointer(pointee: ObjectType, address: Address, provenance: Option<Provenance>) -> Self {
        Value {
            ty: ObjectType::pointer_to(pointee),
            raw: RawValue::Int(address as i64),
            valid: true,
            provenance,
        }
    }

    pub fn null(pointee: ObjectType) -> Self {
        Value::pointer(pointee, 0, None)
    }

    /// A value of `ty` built from a raw integer, wrapped to the width of the type
    pub fn from_i64(ty: ObjectType, n: i64) -> Self {
        let raw = match ty {
            ObjectType::Bool => RawValue::Int((n != 0) as i64),
            ObjectType::Char => RawValue::Int(n as i8 as i64),
            ObjectType::Int => RawValue::Int(n as i32 as i64),
            ObjectType::Double => RawValue::Float(n as f64),
            _ => RawValue::Int(n),
        };
        Value::of(ty, raw)
    }

    fn of(ty: ObjectType, raw: RawValue) -> Self {
        Value {
            ty,
            raw,
            valid: true,
            provenance: None,
        }
    }

    /// Same value, with the validity flag replaced
    pub fn with_validity(mut self, valid: bool) -> Self {
        self.valid = self.valid && valid;
        self
    }

    pub fn as_i64(&self) -> i64 {
        match self.raw {
            RawValue::Int(n) => n,
            RawValue::Float(f) => f as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self.raw {
            RawValue::Int(n) => n as f64,
            RawValue::Float(f) => f,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self.raw {
            RawValue::Int(n) => n != 0,
            RawValue::Float(f) => f != 0.0,
        }
    }

    pub fn address(&self) -> Address {
        self.as_i64() as Address
    }

    pub fn is_null_pointer(&self) -> bool {
        self.ty.is_pointer() && self.address() == 0
    }

    /// Encode into the little-endian byte representation of `self.ty`
    pub fn encode(&self) -> Vec<u8> {
        match self.ty {
            ObjectType::Bool => vec![self.as_bool() as u8],
            ObjectType::Char => vec![self.as_i64() as u8],
            ObjectType::Int => (self.as_i64() as i32).to_le_bytes().to_vec(),
            ObjectType::Double => self.as_f64().to_le_bytes().to_vec(),
            ObjectType::Pointer(_) => self.address().to_le_bytes().to_vec(),
            ObjectType::Array { .. } | ObjectType::Class(_) => {
                panic!("cannot encode a value of aggregate type {}", self.ty)
            }
        }
    }

    /// Decode bytes previously produced by [`Value::encode`] (or garbage)
    pub fn decode(ty: &ObjectType, bytes: &[u8], valid: bool) -> Self {
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        let raw = match ty {
            ObjectType::Bool => RawValue::Int((buf[0] != 0) as i64),
            ObjectType::Char => RawValue::Int(buf[0] as i8 as i64),
            ObjectType::Int => RawValue::Int(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as i64),
            ObjectType::Double => RawValue::Float(f64::from_le_bytes(buf)),
            ObjectType::Pointer(_) => RawValue::Int(u64::from_le_bytes(buf) as i64),
            ObjectType::Array { .. } | ObjectType::Class(_) => {
                panic!("cannot decode a value of aggregate type {}", ty)
            }
        };
        Value {
            ty: ty.clone(),
            raw,
            valid,
            provenance: None,
        }
    }

    /// Text written by `cout << value`
    pub fn output_text(&self) -> String {
        match self.ty {
            ObjectType::Bool => (self.as_bool() as i32).to_string(),
            ObjectType::Char => ((self.as_i64() as u8) as char).to_string(),
            ObjectType::Double => format_double(self.as_f64()),
            ObjectType::Pointer(_) => format!("0x{:x}", self.address()),
            _ => self.as_i64().to_string(),
        }
    }
}

fn format_double(d: f64) -> String {
    if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        let s = format!("{:.6}", d);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self.ty {
            ObjectType::Char => format!("'{}'", (self.as_i64() as u8) as char),
            ObjectType::Bool => self.as_bool().to_string(),
            _ => self.output_text(),
        };
        if self.valid {
            write!(f, "{}", text)
        } else {
            write!(f, "{}?", text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_encoding_is_little_endian() {
        let v = Value::int(0x0102_0304);
        assert_eq!(v.encode(), vec![4, 3, 2, 1]);
        let back = Value::decode(&ObjectType::Int, &[4, 3, 2, 1], true);
        assert_eq!(back.as_i64(), 0x0102_0304);
    }

    #[test]
    fn test_negative_char_and_int_wrap() {
        assert_eq!(Value::from_i64(ObjectType::Char, 200).as_i64(), -56);
        assert_eq!(Value::from_i64(ObjectType::Int, 1 << 32).as_i64(), 0);
        assert_eq!(Value::from_i64(ObjectType::Bool, 7).as_i64(), 1);
    }

    #[test]
    fn test_double_output_text() {
        assert_eq!(Value::double(2.5).output_text(), "2.5");
        assert_eq!(Value::double(3.0).output_text(), "3");
    }

    #[test]
    fn test_invalid_value_display_is_marked() {
        let v = Value::int(17).with_validity(false);
        assert_eq!(v.to_string(), "17?");
    }
}
