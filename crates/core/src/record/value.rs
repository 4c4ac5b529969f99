use std::borrow::Cow;
use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

/// Semantic type of a record field. Decides coercion on assignment and the
/// SQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    /// Stored as 0/1.
    Bool,
    /// Raw filesystem bytes, stored as BLOB.
    Path,
}

impl FieldType {
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer | FieldType::Bool => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Path => "BLOB",
        }
    }

    /// Literal used in `DEFAULT` clauses.
    pub fn sql_default(self) -> &'static str {
        match self {
            FieldType::Text => "''",
            FieldType::Integer | FieldType::Bool => "0",
            FieldType::Real => "0.0",
            FieldType::Path => "X''",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            FieldType::Text => Value::Text(String::new()),
            FieldType::Integer => Value::Integer(0),
            FieldType::Real => Value::Real(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Path => Value::Bytes(Vec::new()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Bool => "boolean",
            FieldType::Path => "path",
        };
        f.write_str(name)
    }
}

/// One entry of a field registry: `(name, type, default)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: Cow<'static, str>,
    pub ty: FieldType,
    /// Nullable fields default to `Null` instead of the type default.
    pub nullable: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, ty: FieldType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
            nullable: true,
        }
    }

    /// A field whose name is only known at runtime.
    pub fn custom(name: impl Into<Cow<'static, str>>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.ty.default_value()
        }
    }

    /// Column definition used by `CREATE TABLE` and `ALTER TABLE ... ADD COLUMN`.
    pub fn column_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.ty.sql_type());
        if !self.nullable {
            sql.push_str(" DEFAULT ");
            sql.push_str(self.ty.sql_default());
        }
        sql
    }

    /// Apply this field's coercion rule. `None` means the value is not
    /// representable as the field's type.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if value.is_null() {
            return Some(self.default_value());
        }
        match self.ty {
            FieldType::Text => Some(Value::Text(match value {
                Value::Text(s) => s,
                Value::Integer(i) => i.to_string(),
                Value::Real(r) => r.to_string(),
                Value::Bool(b) => (if b { "1" } else { "0" }).to_string(),
                Value::Bytes(b) => match String::from_utf8(b) {
                    Ok(s) => s,
                    Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
                },
                Value::Null => String::new(),
            })),
            FieldType::Integer => match value {
                Value::Integer(i) => Some(Value::Integer(i)),
                Value::Real(r) => Some(Value::Integer(r.trunc() as i64)),
                Value::Bool(b) => Some(Value::Integer(b as i64)),
                Value::Text(s) => parse_integer(&s).map(Value::Integer),
                Value::Bytes(_) | Value::Null => None,
            },
            FieldType::Real => match value {
                Value::Real(r) => Some(Value::Real(r)),
                Value::Integer(i) => Some(Value::Real(i as f64)),
                Value::Bool(b) => Some(Value::Real(if b { 1.0 } else { 0.0 })),
                Value::Text(s) => s.trim().parse().ok().map(Value::Real),
                Value::Bytes(_) | Value::Null => None,
            },
            FieldType::Bool => match value {
                Value::Bool(b) => Some(Value::Bool(b)),
                Value::Integer(i) => Some(Value::Bool(i != 0)),
                Value::Real(r) => Some(Value::Bool(r != 0.0)),
                Value::Text(s) => parse_bool(&s).map(Value::Bool),
                Value::Bytes(_) | Value::Null => None,
            },
            FieldType::Path => match value {
                Value::Bytes(b) => Some(Value::Bytes(b)),
                Value::Text(s) => Some(Value::Bytes(s.into_bytes())),
                _ => None,
            },
        }
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|r| r.is_finite()).map(|r| r.trunc() as i64))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Double-quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A field value as held by a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
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
            Value::Real(r) => Some(*r),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Bytes used when the value is substituted into a path template.
    pub fn to_path_bytes(&self) -> Vec<u8> {
        match self {
            Value::Null => Vec::new(),
            Value::Text(s) => s.as_bytes().to_vec(),
            Value::Integer(i) => i.to_string().into_bytes(),
            Value::Real(r) => r.to_string().into_bytes(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
        }
    }

    /// Short description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Text(s) => format!("text {s:?}"),
            Value::Integer(i) => format!("integer {i}"),
            Value::Real(r) => format!("real {r}"),
            Value::Bool(b) => format!("boolean {b}"),
            Value::Bytes(b) => format!("{} bytes", b.len()),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            // TEXT columns may hold bytes that are not UTF-8; keep them intact.
            ValueRef::Text(t) => match std::str::from_utf8(t) {
                Ok(s) => Value::Text(s.to_string()),
                Err(_) => Value::Bytes(t.to_vec()),
            },
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coercion() {
        let field = FieldDef::new("track", FieldType::Integer);
        assert_eq!(field.coerce(Value::Real(4.9)), Some(Value::Integer(4)));
        assert_eq!(field.coerce(Value::from("12")), Some(Value::Integer(12)));
        assert_eq!(field.coerce(Value::from(" 7.0 ")), Some(Value::Integer(7)));
        assert_eq!(field.coerce(Value::Bool(true)), Some(Value::Integer(1)));
        assert_eq!(field.coerce(Value::from("twelve")), None);
    }

    #[test]
    fn test_bool_coercion() {
        let field = FieldDef::new("comp", FieldType::Bool);
        assert_eq!(field.coerce(Value::Integer(2)), Some(Value::Bool(true)));
        assert_eq!(field.coerce(Value::Integer(0)), Some(Value::Bool(false)));
        assert_eq!(field.coerce(Value::from("yes")), Some(Value::Bool(true)));
        assert_eq!(field.coerce(Value::from("False")), Some(Value::Bool(false)));
        assert_eq!(field.coerce(Value::from("maybe")), None);
    }

    #[test]
    fn test_path_coercion_keeps_bytes() {
        let field = FieldDef::new("path", FieldType::Path);
        assert_eq!(
            field.coerce(Value::from("somepath")),
            Some(Value::Bytes(b"somepath".to_vec()))
        );
        assert_eq!(
            field.coerce(Value::from(&b"b\xe1r"[..])),
            Some(Value::Bytes(b"b\xe1r".to_vec()))
        );
        assert_eq!(field.coerce(Value::Integer(1)), None);
    }

    #[test]
    fn test_null_becomes_default() {
        assert_eq!(
            FieldDef::new("title", FieldType::Text).coerce(Value::Null),
            Some(Value::Text(String::new()))
        );
        assert_eq!(
            FieldDef::nullable("album_id", FieldType::Integer).coerce(Value::Null),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_text_from_non_utf8_sql_becomes_bytes() {
        let value = Value::from(ValueRef::Text(b"b\xe1r"));
        assert_eq!(value, Value::Bytes(b"b\xe1r".to_vec()));
    }

    #[test]
    fn test_column_sql() {
        assert_eq!(
            FieldDef::new("year", FieldType::Integer).column_sql(),
            "\"year\" INTEGER DEFAULT 0"
        );
        assert_eq!(
            FieldDef::nullable("album_id", FieldType::Integer).column_sql(),
            "\"album_id\" INTEGER"
        );
        assert_eq!(
            FieldDef::new("path", FieldType::Path).column_sql(),
            "\"path\" BLOB DEFAULT X''"
        );
    }
}
