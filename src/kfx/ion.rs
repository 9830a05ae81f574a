//! Amazon Ion binary reader and writer.
//!
//! Ion is Amazon's data serialization format used in KFX containers.
//! This implements the subset of the binary encoding KFX needs: every
//! fragment payload, the document symbol table and the container header
//! structures are written through [`IonWriter`] and can be read back with
//! [`IonParser`].
//!
//! Reference: <https://amazon-ion.github.io/ion-docs/docs/binary.html>

use std::fmt;
use std::io;

/// Ion binary version marker (BVM)
pub const ION_MAGIC: [u8; 4] = [0xe0, 0x01, 0x00, 0xea];

/// Ion type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum IonType {
    Null = 0,
    Bool = 1,
    PosInt = 2,
    NegInt = 3,
    Float = 4,
    Decimal = 5,
    Timestamp = 6,
    Symbol = 7,
    String = 8,
    Clob = 9,
    Blob = 10,
    List = 11,
    Sexp = 12,
    Struct = 13,
    Annotation = 14,
}

impl IonType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(IonType::Null),
            1 => Some(IonType::Bool),
            2 => Some(IonType::PosInt),
            3 => Some(IonType::NegInt),
            4 => Some(IonType::Float),
            5 => Some(IonType::Decimal),
            6 => Some(IonType::Timestamp),
            7 => Some(IonType::Symbol),
            8 => Some(IonType::String),
            9 => Some(IonType::Clob),
            10 => Some(IonType::Blob),
            11 => Some(IonType::List),
            12 => Some(IonType::Sexp),
            13 => Some(IonType::Struct),
            14 => Some(IonType::Annotation),
            _ => None, // Reserved (15)
        }
    }
}

// =============================================================================
// Decimal
// =============================================================================

/// Exact Ion decimal: `coefficient × 10^exponent`.
///
/// Always normalised (no trailing zeros in the coefficient, zero has exponent
/// 0), so two decimals with the same numeric value compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    coefficient: i64,
    exponent: i32,
}

impl Decimal {
    pub fn new(coefficient: i64, exponent: i32) -> Self {
        let (mut coefficient, mut exponent) = (coefficient, exponent);
        if coefficient == 0 {
            return Self::default();
        }
        while coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        Self {
            coefficient,
            exponent,
        }
    }

    /// Shortest decimal that round-trips to `value`.
    ///
    /// Callers round to the wanted precision first; this only picks the
    /// textual digits. Non-finite input becomes zero.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value == 0.0 {
            return Self::default();
        }
        // f64 Display never uses exponent notation and is round-trip exact.
        let text = value.to_string();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.as_str()),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        let mut exponent = -(frac_part.len() as i32);
        let mut all: String = format!("{int_part}{frac_part}");
        // Keep the coefficient within i64 by moving integer zeros into the exponent.
        while all.len() > 1 && all.ends_with('0') {
            all.pop();
            exponent += 1;
        }
        let trimmed = all.trim_start_matches('0');
        if trimmed.is_empty() {
            return Self::default();
        }
        let mut coefficient: i64 = 0;
        for (i, b) in trimmed.bytes().enumerate() {
            if i >= 18 {
                // Beyond i64 precision; remaining digits only scale.
                exponent += 1;
                continue;
            }
            coefficient = coefficient * 10 + i64::from(b - b'0');
        }
        if negative {
            coefficient = -coefficient;
        }
        Self::new(coefficient, exponent)
    }

    pub fn to_f64(self) -> f64 {
        format!("{}e{}", self.coefficient, self.exponent)
            .parse()
            .unwrap_or(0.0)
    }

    pub fn coefficient(self) -> i64 {
        self.coefficient
    }

    pub fn exponent(self) -> i32 {
        self.exponent
    }

    pub fn is_zero(self) -> bool {
        self.coefficient == 0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent >= 0 {
            return write!(f, "{}d{}", self.coefficient, self.exponent);
        }
        let sign = if self.coefficient < 0 { "-" } else { "" };
        let digits = self.coefficient.unsigned_abs().to_string();
        let scale = self.exponent.unsigned_abs() as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int_part}.{frac_part}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

// =============================================================================
// IonValue
// =============================================================================

/// Parsed or to-be-written Ion value.
///
/// Symbols are stored as raw u32 IDs - use the KFX symbol table to resolve them.
/// Structs use a Vec for fields (O(n) lookup) which is optimal for small structs
/// typical in KFX data, and keeps field order stable for serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum IonValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    /// Symbol ID (shared YJ symbol or document-local symbol)
    Symbol(u32),
    String(String),
    Blob(Vec<u8>),
    List(Vec<IonValue>),
    /// Struct fields as (symbol_id, value) pairs in insertion order
    Struct(Vec<(u32, IonValue)>),
    /// Annotated value: (annotation symbol IDs, inner value)
    Annotated(Vec<u32>, Box<IonValue>),
}

impl IonValue {
    /// Get as string if this is a String value.
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            IonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IonValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of Int, Float and Decimal values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            IonValue::Int(n) => Some(*n as f64),
            IonValue::Float(f) => Some(*f),
            IonValue::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    /// Get as symbol ID if this is a Symbol value.
    #[inline]
    pub fn as_symbol(&self) -> Option<u32> {
        match self {
            IonValue::Symbol(id) => Some(*id),
            _ => None,
        }
    }

    /// Get as list if this is a List value.
    #[inline]
    pub fn as_list(&self) -> Option<&[IonValue]> {
        match self {
            IonValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get struct fields if this is a Struct value.
    #[inline]
    pub fn as_struct(&self) -> Option<&[(u32, IonValue)]> {
        match self {
            IonValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Get field from struct by symbol ID. O(n) scan - optimal for small structs.
    #[inline]
    pub fn get(&self, symbol_id: u32) -> Option<&IonValue> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| *k == symbol_id)
            .map(|(_, v)| v)
    }

    /// Unwrap annotated value to get inner value.
    pub fn unwrap_annotated(&self) -> &IonValue {
        match self {
            IonValue::Annotated(_, inner) => inner.unwrap_annotated(),
            other => other,
        }
    }

    /// Render as Ion text, resolving symbol IDs through `name`.
    pub fn to_text(&self, name: &dyn Fn(u32) -> String) -> String {
        let mut out = String::new();
        self.write_text(&mut out, name);
        out
    }

    fn write_text(&self, out: &mut String, name: &dyn Fn(u32) -> String) {
        match self {
            IonValue::Null => out.push_str("null"),
            IonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            IonValue::Int(n) => out.push_str(&n.to_string()),
            IonValue::Float(f) => out.push_str(&format!("{f:e}")),
            IonValue::Decimal(d) => out.push_str(&d.to_string()),
            IonValue::Symbol(id) => out.push_str(&name(*id)),
            IonValue::String(s) => out.push_str(&format!("{s:?}")),
            IonValue::Blob(bytes) => out.push_str(&format!("{{{{ {} bytes }}}}", bytes.len())),
            IonValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_text(out, name);
                }
                out.push(']');
            }
            IonValue::Struct(fields) => {
                out.push('{');
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&name(*field));
                    out.push_str(": ");
                    value.write_text(out, name);
                }
                out.push('}');
            }
            IonValue::Annotated(annotations, inner) => {
                for ann in annotations {
                    out.push_str(&name(*ann));
                    out.push_str("::");
                }
                inner.write_text(out, name);
            }
        }
    }
}

/// Ordered struct builder.
///
/// Fields keep insertion order, which is the order the reference output uses.
#[derive(Debug, Default, Clone)]
pub struct StructBuilder {
    fields: Vec<(u32, IonValue)>,
}

impl StructBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, id: u32, value: IonValue) -> Self {
        self.fields.push((id, value));
        self
    }

    pub fn symbol(self, id: u32, symbol: u32) -> Self {
        self.field(id, IonValue::Symbol(symbol))
    }

    pub fn string(self, id: u32, s: impl Into<String>) -> Self {
        self.field(id, IonValue::String(s.into()))
    }

    pub fn int(self, id: u32, n: i64) -> Self {
        self.field(id, IonValue::Int(n))
    }

    pub fn list(self, id: u32, items: Vec<IonValue>) -> Self {
        self.field(id, IonValue::List(items))
    }

    /// Add the field only when `value` is present.
    pub fn maybe(self, id: u32, value: Option<IonValue>) -> Self {
        match value {
            Some(v) => self.field(id, v),
            None => self,
        }
    }

    pub fn build(self) -> IonValue {
        IonValue::Struct(self.fields)
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Ion binary parser.
pub struct IonParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> IonParser<'a> {
    /// Create a new parser for the given data.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Parse Ion data starting with the BVM marker.
    pub fn parse(&mut self) -> io::Result<IonValue> {
        self.expect_bvm()?;
        self.parse_value()
    }

    /// Parse every top-level value following the BVM.
    pub fn parse_all(&mut self) -> io::Result<Vec<IonValue>> {
        self.expect_bvm()?;
        let mut values = Vec::new();
        while self.pos < self.data.len() {
            if self.data[self.pos..].starts_with(&ION_MAGIC) {
                self.pos += 4;
                continue;
            }
            values.push(self.parse_value()?);
        }
        Ok(values)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn expect_bvm(&mut self) -> io::Result<()> {
        if self.data.len() < 4 || self.data[..4] != ION_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not Ion data (missing BVM)",
            ));
        }
        self.pos = 4;
        Ok(())
    }

    /// Parse a single Ion value at current position.
    fn parse_value(&mut self) -> io::Result<IonValue> {
        if self.pos >= self.data.len() {
            return Ok(IonValue::Null);
        }

        let type_byte = self.data[self.pos];
        self.pos += 1;

        let type_code = type_byte >> 4;
        let length_code = type_byte & 0x0f;

        // Null is encoded as length_code 15 for any type
        if length_code == 15 {
            return Ok(IonValue::Null);
        }

        let ion_type = match IonType::from_nibble(type_code) {
            Some(t) => t,
            None => return Ok(IonValue::Null), // Reserved type
        };

        // Bool stores its value in the length nibble.
        let length = if ion_type == IonType::Bool {
            0
        } else if length_code == 14 {
            self.read_varuint()? as usize
        } else {
            length_code as usize
        };

        match ion_type {
            IonType::Null => {
                // Type 0 with length > 0 is a NOP pad, skip the bytes
                self.read_bytes(length)?;
                Ok(IonValue::Null)
            }

            IonType::Bool => Ok(IonValue::Bool(length_code != 0)),

            IonType::PosInt => {
                let value = self.read_uint(length)?;
                if value > i64::MAX as u64 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "positive integer too large for i64",
                    ));
                }
                Ok(IonValue::Int(value as i64))
            }

            IonType::NegInt => {
                let value = self.read_uint(length)?;
                // i64::MIN has magnitude 2^63, which fits in u64 but not as positive i64.
                if value > (i64::MAX as u64) + 1 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "negative integer too large for i64",
                    ));
                }
                if value == (i64::MAX as u64) + 1 {
                    Ok(IonValue::Int(i64::MIN))
                } else {
                    Ok(IonValue::Int(-(value as i64)))
                }
            }

            IonType::Float => {
                let value = match length {
                    0 => 0.0, // Positive zero
                    4 => {
                        let mut bytes = [0u8; 4];
                        bytes.copy_from_slice(self.read_bytes(4)?);
                        f32::from_be_bytes(bytes) as f64
                    }
                    8 => {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(self.read_bytes(8)?);
                        f64::from_be_bytes(bytes)
                    }
                    _ => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "invalid float length",
                        ));
                    }
                };
                Ok(IonValue::Float(value))
            }

            IonType::Decimal => {
                if length == 0 {
                    return Ok(IonValue::Decimal(Decimal::default()));
                }
                let end = self.pos + length;
                let exponent = self.read_varint()?;
                let coefficient = if self.pos < end {
                    self.read_int(end - self.pos)?
                } else {
                    0
                };
                Ok(IonValue::Decimal(Decimal::new(coefficient, exponent)))
            }

            IonType::Timestamp => {
                // Not produced by KFX generation
                self.read_bytes(length)?;
                Ok(IonValue::Null)
            }

            IonType::Symbol => {
                let symbol_id = self.read_uint(length)?;
                if symbol_id > u32::MAX as u64 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "symbol ID too large",
                    ));
                }
                Ok(IonValue::Symbol(symbol_id as u32))
            }

            IonType::String => {
                let bytes = self.read_bytes(length)?;
                let s = String::from_utf8_lossy(bytes).into_owned();
                Ok(IonValue::String(s))
            }

            IonType::Blob | IonType::Clob => {
                let bytes = self.read_bytes(length)?.to_vec();
                Ok(IonValue::Blob(bytes))
            }

            IonType::List | IonType::Sexp => {
                let end = self.pos + length;
                let mut items = Vec::new();
                while self.pos < end {
                    items.push(self.parse_value()?);
                }
                Ok(IonValue::List(items))
            }

            IonType::Struct => {
                let end = self.pos + length;
                let mut fields = Vec::new();
                while self.pos < end {
                    let field_name = self.read_varuint()?;
                    let value = self.parse_value()?;
                    fields.push((field_name, value));
                }
                Ok(IonValue::Struct(fields))
            }

            IonType::Annotation => {
                let end = self.pos + length;

                let ann_len = self.read_varuint()? as usize;
                let ann_end = self.pos + ann_len;

                let mut annotations = Vec::new();
                while self.pos < ann_end {
                    annotations.push(self.read_varuint()?);
                }

                let inner = if self.pos < end {
                    self.parse_value()?
                } else {
                    IonValue::Null
                };

                Ok(IonValue::Annotated(annotations, Box::new(inner)))
            }
        }
    }

    /// Read bytes from current position.
    #[inline]
    fn read_bytes(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected end of data",
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn next_byte(&mut self) -> io::Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a VarUInt (7 bits per byte, MSB set on last byte).
    #[inline]
    fn read_varuint(&mut self) -> io::Result<u32> {
        let mut result: u32 = 0;
        loop {
            let byte = self.next_byte()?;
            result = (result << 7) | (byte & 0x7f) as u32;
            if byte & 0x80 != 0 {
                return Ok(result);
            }
        }
    }

    /// Read a VarInt (sign in bit 6 of the first byte).
    fn read_varint(&mut self) -> io::Result<i32> {
        let first = self.next_byte()?;
        let negative = first & 0x40 != 0;
        let mut magnitude = i64::from(first & 0x3f);
        let mut byte = first;
        while byte & 0x80 == 0 {
            byte = self.next_byte()?;
            magnitude = (magnitude << 7) | i64::from(byte & 0x7f);
        }
        let value = if negative { -magnitude } else { magnitude };
        i32::try_from(value)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "VarInt out of range"))
    }

    /// Read a signed-magnitude Int of `len` bytes.
    fn read_int(&mut self, len: usize) -> io::Result<i64> {
        let bytes = self.read_bytes(len)?;
        if bytes.len() > 8 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "integer too large (> 8 bytes)",
            ));
        }
        let negative = bytes[0] & 0x80 != 0;
        let mut magnitude: u64 = u64::from(bytes[0] & 0x7f);
        for &b in &bytes[1..] {
            magnitude = (magnitude << 8) | u64::from(b);
        }
        let magnitude = i64::try_from(magnitude)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Int out of range"))?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Read unsigned integer (big-endian, up to 8 bytes).
    #[inline]
    fn read_uint(&mut self, len: usize) -> io::Result<u64> {
        if len == 0 {
            return Ok(0);
        }
        if len > 8 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "integer too large (> 8 bytes)",
            ));
        }
        let bytes = self.read_bytes(len)?;
        let mut result: u64 = 0;
        for &b in bytes {
            result = (result << 8) | b as u64;
        }
        Ok(result)
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Ion binary writer.
#[derive(Debug, Default)]
pub struct IonWriter {
    buf: Vec<u8>,
}

impl IonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bvm(&mut self) {
        self.buf.extend_from_slice(&ION_MAGIC);
    }

    pub fn write_value(&mut self, value: &IonValue) {
        encode_value(value, &mut self.buf);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode a complete Ion stream (BVM + value).
pub fn encode(value: &IonValue) -> Vec<u8> {
    let mut writer = IonWriter::new();
    writer.write_bvm();
    writer.write_value(value);
    writer.into_bytes()
}

fn encode_value(value: &IonValue, out: &mut Vec<u8>) {
    match value {
        IonValue::Null => out.push(0x0f),
        IonValue::Bool(b) => out.push(if *b { 0x11 } else { 0x10 }),
        IonValue::Int(n) => {
            let magnitude = uint_bytes(n.unsigned_abs());
            let code = if *n < 0 { 0x30 } else { 0x20 };
            write_header(code, magnitude.len(), out);
            out.extend_from_slice(&magnitude);
        }
        IonValue::Float(f) => {
            if *f == 0.0 && f.is_sign_positive() {
                out.push(0x40);
            } else {
                out.push(0x48);
                out.extend_from_slice(&f.to_be_bytes());
            }
        }
        IonValue::Decimal(d) => {
            if d.is_zero() {
                out.push(0x50);
                return;
            }
            let mut body = varint_bytes(i64::from(d.exponent()));
            body.extend_from_slice(&int_bytes(d.coefficient()));
            write_header(0x50, body.len(), out);
            out.extend_from_slice(&body);
        }
        IonValue::Symbol(id) => {
            let bytes = uint_bytes(u64::from(*id));
            write_header(0x70, bytes.len(), out);
            out.extend_from_slice(&bytes);
        }
        IonValue::String(s) => {
            write_header(0x80, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        IonValue::Blob(bytes) => {
            write_header(0xa0, bytes.len(), out);
            out.extend_from_slice(bytes);
        }
        IonValue::List(items) => {
            let mut body = Vec::new();
            for item in items {
                encode_value(item, &mut body);
            }
            write_header(0xb0, body.len(), out);
            out.extend_from_slice(&body);
        }
        IonValue::Struct(fields) => {
            let mut body = Vec::new();
            for (field, value) in fields {
                body.extend_from_slice(&varuint_bytes(u64::from(*field)));
                encode_value(value, &mut body);
            }
            write_header(0xd0, body.len(), out);
            out.extend_from_slice(&body);
        }
        IonValue::Annotated(annotations, inner) => {
            let mut ann = Vec::new();
            for id in annotations {
                ann.extend_from_slice(&varuint_bytes(u64::from(*id)));
            }
            let mut body = varuint_bytes(ann.len() as u64);
            body.extend_from_slice(&ann);
            encode_value(inner, &mut body);
            write_header(0xe0, body.len(), out);
            out.extend_from_slice(&body);
        }
    }
}

fn write_header(type_code: u8, len: usize, out: &mut Vec<u8>) {
    if len < 14 {
        out.push(type_code | len as u8);
    } else {
        out.push(type_code | 14);
        out.extend_from_slice(&varuint_bytes(len as u64));
    }
}

/// Minimal big-endian magnitude bytes (empty for zero).
fn uint_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

fn varuint_bytes(mut value: u64) -> Vec<u8> {
    let mut groups = vec![(value & 0x7f) as u8 | 0x80];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7f) as u8);
        value >>= 7;
    }
    groups.reverse();
    groups
}

fn varint_bytes(value: i64) -> Vec<u8> {
    let sign = if value < 0 { 0x40 } else { 0 };
    let mut magnitude = value.unsigned_abs();
    if magnitude < 0x40 {
        return vec![0x80 | sign | magnitude as u8];
    }
    let mut groups = Vec::new();
    while magnitude >= 0x40 {
        groups.push((magnitude & 0x7f) as u8);
        magnitude >>= 7;
    }
    groups.push(sign | magnitude as u8);
    groups.reverse();
    if let Some(last) = groups.last_mut() {
        *last |= 0x80;
    }
    groups
}

/// Signed-magnitude Int bytes.
fn int_bytes(value: i64) -> Vec<u8> {
    let mut bytes = uint_bytes(value.unsigned_abs());
    if bytes.first().is_some_and(|b| b & 0x80 != 0) || bytes.is_empty() {
        bytes.insert(0, 0);
    }
    if value < 0 {
        bytes[0] |= 0x80;
    }
    bytes
}
