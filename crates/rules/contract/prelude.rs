//! Rule contract compiled into every rule unit.
//!
//! Everything a rule needs is re-exported from here and imported into the
//! `rules` module the rule source lives in: the context types, the
//! [`NotificationRule`] trait and the dynamic [`Value`].
//!
//! The host hands the context over as JSON; [`decode_context`] turns it back
//! into typed groups without pulling any dependency into the unit.

use std::collections::BTreeMap;
use std::fmt;

/// Version of the host/unit calling convention. Bumped on any change to the
/// exported symbols or the context encoding.
pub const RULE_ABI_VERSION: u32 = 1;

/// A dynamically typed context value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Whole numbers print without a fraction (`80`, `-5`); others as-is
/// (`3100.5`).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Named values of one context group (weather, market, news, custom).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataGroup(BTreeMap<String, Value>);

impl DataGroup {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Snapshot of external data a rule is evaluated against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationContext {
    pub weather: DataGroup,
    pub market: DataGroup,
    pub news: DataGroup,
    pub custom: DataGroup,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// The contract every rule type implements. The type must also derive
/// `Default`; that is the constructor the engine calls.
pub trait NotificationRule: Send + Sync {
    /// Whether the condition holds for this context.
    fn evaluate(&self, context: &NotificationContext) -> bool;

    /// Human-readable message, only requested after `evaluate` returned true.
    fn describe(&self, context: &NotificationContext) -> String;
}

/// Decode the host's JSON context encoding.
pub fn decode_context(bytes: &[u8]) -> Result<NotificationContext, String> {
    let mut parser = JsonParser { bytes, pos: 0 };
    let mut root = match parser.parse_document()? {
        Value::Map(map) => map,
        _ => return Err("context must be a JSON object".to_string()),
    };

    let mut group = |key: &str| match root.remove(key) {
        Some(Value::Map(map)) => DataGroup(map),
        _ => DataGroup::default(),
    };
    let weather = group("weather");
    let market = group("market");
    let news = group("news");
    let custom = group("custom");
    let timestamp_ms = root
        .get("timestamp")
        .and_then(Value::as_f64)
        .map(|t| t as i64)
        .unwrap_or(0);

    Ok(NotificationContext {
        weather,
        market,
        news,
        custom,
        timestamp_ms,
    })
}

struct JsonParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JsonParser<'a> {
    fn parse_document(&mut self) -> Result<Value, String> {
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos != self.bytes.len() {
            return Err(format!("trailing data at byte {}", self.pos));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\n' | b'\r' | b'\t') = self.peek() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{}' at byte {}", byte as char, self.pos))
        }
    }

    fn parse_value(&mut self) -> Result<Value, String> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => self.parse_string().map(Value::Text),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            Some(other) => Err(format!(
                "unexpected '{}' at byte {}",
                other as char, self.pos
            )),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Result<Value, String> {
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(format!("invalid literal at byte {}", self.pos))
        }
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while let Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') = self.peek() {
            self.pos += 1;
        }
        let lexeme = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|e| e.to_string())?;
        lexeme
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| format!("invalid number '{}'", lexeme))
    }

    fn parse_hex4(&mut self) -> Result<u32, String> {
        let end = self.pos + 4;
        let digits = self
            .bytes
            .get(self.pos..end)
            .ok_or("truncated unicode escape")?;
        let text = std::str::from_utf8(digits).map_err(|e| e.to_string())?;
        let code = u32::from_str_radix(text, 16).map_err(|_| format!("invalid unicode escape '{}'", text))?;
        self.pos = end;
        Ok(code)
    }

    fn parse_string(&mut self) -> Result<String, String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' {
                    break;
                }
                self.pos += 1;
            }
            out.push_str(std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|e| e.to_string())?);

            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(_) => {
                    self.pos += 1;
                    let escape = self.peek().ok_or("unterminated escape")?;
                    self.pos += 1;
                    match escape {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let code = self.parse_hex4()?;
                            out.push(self.finish_code_point(code)?);
                        }
                        other => return Err(format!("invalid escape '\\{}'", other as char)),
                    }
                }
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn finish_code_point(&mut self, code: u32) -> Result<char, String> {
        if !(0xD800..0xDC00).contains(&code) {
            return Ok(char::from_u32(code).unwrap_or('\u{fffd}'));
        }
        // High surrogate: the low half must follow as another \u escape.
        if !self.bytes[self.pos..].starts_with(b"\\u") {
            return Ok('\u{fffd}');
        }
        self.pos += 2;
        let low = self.parse_hex4()?;
        if !(0xDC00..0xE000).contains(&low) {
            return Ok('\u{fffd}');
        }
        let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
        Ok(char::from_u32(combined).unwrap_or('\u{fffd}'))
    }

    fn parse_array(&mut self) -> Result<Value, String> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::List(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                _ => return Err(format!("expected ',' or ']' at byte {}", self.pos)),
            }
        }
    }

    fn parse_object(&mut self) -> Result<Value, String> {
        self.expect(b'{')?;
        let mut map = BTreeMap::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Map(map));
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Map(map));
                }
                _ => return Err(format!("expected ',' or '}}' at byte {}", self.pos)),
            }
        }
    }
}

/// Calling-convention helpers used by the generated export glue.
#[doc(hidden)]
pub mod abi {
    use std::ffi::c_void;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::{decode_context, NotificationContext, NotificationRule};

    pub const OK: i32 = 0;
    pub const ERR_DECODE: i32 = -1;
    pub const ERR_PANIC: i32 = -2;
    pub const ERR_NULL: i32 = -3;

    struct Handle {
        rule: Box<dyn NotificationRule>,
    }

    /// Construct the entry-point type; null if its constructor panics.
    pub fn instantiate<R: NotificationRule + Default + 'static>() -> *mut c_void {
        match catch_unwind(|| Box::new(R::default()) as Box<dyn NotificationRule>) {
            Ok(rule) => Box::into_raw(Box::new(Handle { rule })) as *mut c_void,
            Err(_) => std::ptr::null_mut(),
        }
    }

    unsafe fn context_from(ctx: *const u8, ctx_len: usize) -> Result<NotificationContext, i32> {
        let bytes: &[u8] = if ctx_len == 0 {
            &[]
        } else if ctx.is_null() {
            return Err(ERR_NULL);
        } else {
            std::slice::from_raw_parts(ctx, ctx_len)
        };
        decode_context(bytes).map_err(|_| ERR_DECODE)
    }

    pub unsafe fn evaluate(handle: *mut c_void, ctx: *const u8, ctx_len: usize, out: *mut u8) -> i32 {
        if handle.is_null() || out.is_null() {
            return ERR_NULL;
        }
        let handle = &*(handle as *const Handle);
        let context = match context_from(ctx, ctx_len) {
            Ok(context) => context,
            Err(code) => return code,
        };
        match catch_unwind(AssertUnwindSafe(|| handle.rule.evaluate(&context))) {
            Ok(holds) => {
                *out = holds as u8;
                OK
            }
            Err(_) => ERR_PANIC,
        }
    }

    pub unsafe fn describe(
        handle: *mut c_void,
        ctx: *const u8,
        ctx_len: usize,
        out_ptr: *mut *mut u8,
        out_len: *mut usize,
    ) -> i32 {
        if handle.is_null() || out_ptr.is_null() || out_len.is_null() {
            return ERR_NULL;
        }
        let handle = &*(handle as *const Handle);
        let context = match context_from(ctx, ctx_len) {
            Ok(context) => context,
            Err(code) => return code,
        };
        match catch_unwind(AssertUnwindSafe(|| handle.rule.describe(&context))) {
            Ok(text) => {
                let bytes = text.into_bytes().into_boxed_slice();
                *out_len = bytes.len();
                *out_ptr = Box::into_raw(bytes) as *mut u8;
                OK
            }
            Err(_) => ERR_PANIC,
        }
    }

    /// Release a message returned by [`describe`].
    pub unsafe fn free_text(ptr: *mut u8, len: usize) {
        if !ptr.is_null() {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
        }
    }

    pub unsafe fn destroy(handle: *mut c_void) {
        if !handle.is_null() {
            let _ = catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(handle as *mut Handle))));
        }
    }
}
