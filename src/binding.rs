// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declarative XML object binding.
//!
//! Every message type describes its XML shape once, as a `'static`
//! [`Schema`] of [`Field`] descriptors, and converts itself to and from an
//! untyped [`Record`]. The generic [`serialize`] and [`deserialize`]
//! routines interpret the schema; no message type carries its own parser.
//!
//! # Example
//!
//! ```
//! use usg_cep_client::binding::{self, Field, Record, Scalar, Schema, XmlBinding};
//! use usg_cep_client::Result;
//!
//! #[derive(Debug, PartialEq)]
//! struct Greeting {
//!     lang: Option<String>,
//!     text: String,
//! }
//!
//! impl XmlBinding for Greeting {
//!     fn schema() -> &'static Schema {
//!         static SCHEMA: Schema = Schema::new("urn:example", "greeting", &[
//!             Field::attribute("lang", "", "lang", Scalar::String).optional(),
//!             Field::leaf("text", "urn:example", "text", Scalar::String),
//!         ]);
//!         &SCHEMA
//!     }
//!
//!     fn to_record(&self) -> Record {
//!         Record::new()
//!             .with_opt("lang", self.lang.clone())
//!             .with("text", self.text.clone())
//!     }
//!
//!     fn from_record(mut record: Record) -> Result<Self> {
//!         Ok(Self {
//!             lang: record.take_opt_text("lang")?,
//!             text: record.take_text("text")?,
//!         })
//!     }
//! }
//!
//! let hello = Greeting { lang: Some("en".into()), text: "hello".into() };
//! let element = binding::serialize(&hello)?;
//! assert_eq!(binding::deserialize::<Greeting>(&element)?, hello);
//! # Ok::<(), usg_cep_client::CepError>(())
//! ```

use base64::prelude::*;

use crate::error::{CepError, Result};
use crate::xml::{QName, XmlElement, XSI_NIL};

// ============================================================================
// Descriptors
// ============================================================================

/// Scalar leaf types and their text conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    /// Text taken verbatim.
    String,
    /// Signed decimal integer.
    Integer,
    /// Unsigned decimal integer.
    Unsigned,
    /// `true`, `false`, `1` or `0`.
    Boolean,
    /// Boolean written as `1` or `0`, as SOAP header flags are.
    Flag,
    /// Base64 DER certificate on the wire, PEM in memory.
    Certificate,
}

impl Scalar {
    fn describe(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned integer",
            Self::Boolean | Self::Flag => "boolean",
            Self::Certificate => "base64 certificate",
        }
    }
}

/// What a field maps to in the document.
#[derive(Debug, Clone, Copy)]
pub enum Kind {
    /// An attribute of the element.
    Attribute(Scalar),
    /// The element's own character data.
    Text(Scalar),
    /// A child element holding a scalar.
    Leaf(Scalar),
    /// A child element bound to another schema.
    Node(fn() -> &'static Schema),
    /// The first child element, kept as a raw tree.
    Any,
}

/// How many occurrences a field has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one; missing is an error.
    One,
    /// Zero or one.
    Optional,
    /// Zero or more.
    Many,
    /// One or more.
    ManyNonEmpty,
}

/// Metadata for one field of a bound type.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Key used in the [`Record`].
    pub key: &'static str,
    /// Namespace of the element or attribute (empty for none).
    pub namespace: &'static str,
    /// Local name of the element or attribute.
    pub name: &'static str,
    /// Field kind.
    pub kind: Kind,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Local name of a container element around list items (same namespace).
    pub wrapper: Option<&'static str>,
    /// Emit `xsi:nil="true"` instead of omitting when unset.
    pub nillable: bool,
}

impl Field {
    const fn new(key: &'static str, namespace: &'static str, name: &'static str, kind: Kind) -> Self {
        Self {
            key,
            namespace,
            name,
            kind,
            cardinality: Cardinality::One,
            wrapper: None,
            nillable: false,
        }
    }

    /// A required attribute.
    pub const fn attribute(
        key: &'static str,
        namespace: &'static str,
        name: &'static str,
        scalar: Scalar,
    ) -> Self {
        Self::new(key, namespace, name, Kind::Attribute(scalar))
    }

    /// The element's text content.
    pub const fn text(key: &'static str, scalar: Scalar) -> Self {
        Self::new(key, "", "", Kind::Text(scalar))
    }

    /// A required scalar child element.
    pub const fn leaf(
        key: &'static str,
        namespace: &'static str,
        name: &'static str,
        scalar: Scalar,
    ) -> Self {
        Self::new(key, namespace, name, Kind::Leaf(scalar))
    }

    /// A required nested child element.
    pub const fn node(
        key: &'static str,
        namespace: &'static str,
        name: &'static str,
        schema: fn() -> &'static Schema,
    ) -> Self {
        Self::new(key, namespace, name, Kind::Node(schema))
    }

    /// The first child element, whatever its name.
    pub const fn any(key: &'static str) -> Self {
        Self::new(key, "", "", Kind::Any)
    }

    /// Mark as optional.
    pub const fn optional(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    /// Mark as a list.
    pub const fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Mark as a list that must not be empty.
    pub const fn many_non_empty(mut self) -> Self {
        self.cardinality = Cardinality::ManyNonEmpty;
        self
    }

    /// Place list items inside a container element.
    pub const fn wrapped(mut self, wrapper: &'static str) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    /// Emit `xsi:nil` when unset.
    pub const fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    fn qname(&self) -> QName {
        QName::new(self.namespace, self.name)
    }

    fn wrapper_qname(&self) -> Option<QName> {
        self.wrapper.map(|w| QName::new(self.namespace, w))
    }

    fn is_list(&self) -> bool {
        matches!(self.cardinality, Cardinality::Many | Cardinality::ManyNonEmpty)
    }
}

/// The ordered field table of a bound type.
#[derive(Debug)]
pub struct Schema {
    /// Namespace of the root element.
    pub namespace: &'static str,
    /// Local name of the root element.
    pub name: &'static str,
    /// Fields in document order.
    pub fields: &'static [Field],
}

impl Schema {
    /// Create a schema.
    pub const fn new(namespace: &'static str, name: &'static str, fields: &'static [Field]) -> Self {
        Self {
            namespace,
            name,
            fields,
        }
    }

    /// Qualified name of the root element.
    pub fn qname(&self) -> QName {
        QName::new(self.namespace, self.name)
    }
}

/// A type with a declarative XML shape.
pub trait XmlBinding: Sized {
    /// The type's field table.
    fn schema() -> &'static Schema;

    /// Convert to an untyped record keyed by [`Field::key`].
    fn to_record(&self) -> Record;

    /// Rebuild from a record produced by [`deserialize`].
    fn from_record(record: Record) -> Result<Self>;
}

// ============================================================================
// Records
// ============================================================================

/// An untyped field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String or certificate text.
    Text(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Boolean.
    Bool(bool),
    /// Nested record.
    Node(Record),
    /// Raw element.
    Element(XmlElement),
    /// List items.
    List(Vec<Value>),
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<XmlElement> for Value {
    fn from(v: XmlElement) -> Self {
        Self::Element(v)
    }
}

/// Field values of one element, keyed by [`Field::key`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(&'static str, Value)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Set a value if present.
    pub fn with_opt<V: Into<Value>>(self, key: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Set a nested record.
    pub fn with_node<T: XmlBinding>(self, key: &'static str, value: &T) -> Self {
        self.with(key, Value::Node(value.to_record()))
    }

    /// Set a nested record if present.
    pub fn with_opt_node<T: XmlBinding>(self, key: &'static str, value: Option<&T>) -> Self {
        match value {
            Some(v) => self.with_node(key, v),
            None => self,
        }
    }

    /// Set a list of scalars.
    pub fn with_list<V: Into<Value>>(
        self,
        key: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let items = values.into_iter().map(Into::into).collect();
        self.with(key, Value::List(items))
    }

    /// Set a list of nested records.
    pub fn with_nodes<'a, T: XmlBinding + 'a>(
        self,
        key: &'static str,
        values: impl IntoIterator<Item = &'a T>,
    ) -> Self {
        let items = values
            .into_iter()
            .map(|v| Value::Node(v.to_record()))
            .collect();
        self.with(key, Value::List(items))
    }

    fn insert(&mut self, key: &'static str, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Remove and return a value.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    fn take_required(&mut self, key: &str) -> Result<Value> {
        self.take(key)
            .ok_or_else(|| CepError::binding(format!("missing required field '{}'", key)))
    }

    /// Take a required string.
    pub fn take_text(&mut self, key: &str) -> Result<String> {
        expect_text(key, self.take_required(key)?)
    }

    /// Take an optional string.
    pub fn take_opt_text(&mut self, key: &str) -> Result<Option<String>> {
        self.take(key).map(|v| expect_text(key, v)).transpose()
    }

    /// Take a required signed integer.
    pub fn take_int(&mut self, key: &str) -> Result<i64> {
        expect_int(key, self.take_required(key)?)
    }

    /// Take an optional signed integer.
    pub fn take_opt_int(&mut self, key: &str) -> Result<Option<i64>> {
        self.take(key).map(|v| expect_int(key, v)).transpose()
    }

    /// Take a required unsigned integer.
    pub fn take_uint(&mut self, key: &str) -> Result<u64> {
        expect_uint(key, self.take_required(key)?)
    }

    /// Take an optional unsigned integer.
    pub fn take_opt_uint(&mut self, key: &str) -> Result<Option<u64>> {
        self.take(key).map(|v| expect_uint(key, v)).transpose()
    }

    /// Take a required boolean.
    pub fn take_bool(&mut self, key: &str) -> Result<bool> {
        expect_bool(key, self.take_required(key)?)
    }

    /// Take an optional boolean.
    pub fn take_opt_bool(&mut self, key: &str) -> Result<Option<bool>> {
        self.take(key).map(|v| expect_bool(key, v)).transpose()
    }

    /// Take a required nested value.
    pub fn take_node<T: XmlBinding>(&mut self, key: &str) -> Result<T> {
        expect_node(key, self.take_required(key)?)
    }

    /// Take an optional nested value.
    pub fn take_opt_node<T: XmlBinding>(&mut self, key: &str) -> Result<Option<T>> {
        self.take(key).map(|v| expect_node(key, v)).transpose()
    }

    /// Take a list of nested values; missing means empty.
    pub fn take_nodes<T: XmlBinding>(&mut self, key: &str) -> Result<Vec<T>> {
        self.take_list(key)?
            .into_iter()
            .map(|v| expect_node(key, v))
            .collect()
    }

    /// Take a list of strings; missing means empty.
    pub fn take_texts(&mut self, key: &str) -> Result<Vec<String>> {
        self.take_list(key)?
            .into_iter()
            .map(|v| expect_text(key, v))
            .collect()
    }

    /// Take a list of signed integers; missing means empty.
    pub fn take_ints(&mut self, key: &str) -> Result<Vec<i64>> {
        self.take_list(key)?
            .into_iter()
            .map(|v| expect_int(key, v))
            .collect()
    }

    /// Take a raw element.
    pub fn take_element(&mut self, key: &str) -> Result<Option<XmlElement>> {
        match self.take(key) {
            None => Ok(None),
            Some(Value::Element(e)) => Ok(Some(e)),
            Some(other) => Err(mismatch(key, "element", &other)),
        }
    }

    fn take_list(&mut self, key: &str) -> Result<Vec<Value>> {
        match self.take(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items),
            Some(other) => Err(mismatch(key, "list", &other)),
        }
    }
}

fn mismatch(key: &str, expected: &str, got: &Value) -> CepError {
    CepError::binding(format!(
        "field '{}' holds {:?}, expected {}",
        key, got, expected
    ))
}

fn expect_text(key: &str, value: Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(mismatch(key, "text", &other)),
    }
}

fn expect_int(key: &str, value: Value) -> Result<i64> {
    match value {
        Value::Int(v) => Ok(v),
        Value::UInt(v) => i64::try_from(v).map_err(|_| mismatch(key, "integer", &Value::UInt(v))),
        other => Err(mismatch(key, "integer", &other)),
    }
}

fn expect_uint(key: &str, value: Value) -> Result<u64> {
    match value {
        Value::UInt(v) => Ok(v),
        Value::Int(v) => u64::try_from(v).map_err(|_| mismatch(key, "unsigned integer", &Value::Int(v))),
        other => Err(mismatch(key, "unsigned integer", &other)),
    }
}

fn expect_bool(key: &str, value: Value) -> Result<bool> {
    match value {
        Value::Bool(v) => Ok(v),
        other => Err(mismatch(key, "boolean", &other)),
    }
}

fn expect_node<T: XmlBinding>(key: &str, value: Value) -> Result<T> {
    match value {
        Value::Node(record) => T::from_record(record),
        other => Err(mismatch(key, "nested element", &other)),
    }
}

// ============================================================================
// Scalar conversion
// ============================================================================

fn read_scalar(field: &Field, scalar: Scalar, text: &str) -> Result<Value> {
    let text = text.trim();
    let bad = || CepError::binding_type(field.key, text, scalar.describe());

    match scalar {
        Scalar::String => Ok(Value::Text(text.to_string())),
        Scalar::Integer => text.parse::<i64>().map(Value::Int).map_err(|_| bad()),
        Scalar::Unsigned => text.parse::<u64>().map(Value::UInt).map_err(|_| bad()),
        Scalar::Boolean | Scalar::Flag => match text {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(bad()),
        },
        Scalar::Certificate => certificate_to_pem(text).map(Value::Text).ok_or_else(bad),
    }
}

fn write_scalar(field: &Field, scalar: Scalar, value: &Value) -> Result<String> {
    let bad = || {
        CepError::binding(format!(
            "field '{}' holds {:?}, expected {}",
            field.key,
            value,
            scalar.describe()
        ))
    };

    match (scalar, value) {
        (Scalar::String, Value::Text(s)) => Ok(s.clone()),
        (Scalar::Integer, Value::Int(v)) => Ok(v.to_string()),
        (Scalar::Integer, Value::UInt(v)) => Ok(v.to_string()),
        (Scalar::Unsigned, Value::UInt(v)) => Ok(v.to_string()),
        (Scalar::Unsigned, Value::Int(v)) if *v >= 0 => Ok(v.to_string()),
        (Scalar::Boolean, Value::Bool(v)) => Ok(v.to_string()),
        (Scalar::Flag, Value::Bool(v)) => Ok(if *v { "1" } else { "0" }.to_string()),
        (Scalar::Certificate, Value::Text(pem)) => Ok(pem_to_base64(pem)),
        _ => Err(bad()),
    }
}

/// Normalise base64 certificate text into a PEM block with 64-column lines.
///
/// Servers sometimes leave escaped carriage returns (`&#xD;`) or line breaks
/// inside the base64; both are removed. Returns `None` if the result is not
/// valid base64.
pub fn certificate_to_pem(text: &str) -> Option<String> {
    let body: String = text
        .replace("&#xD;", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() || BASE64_STANDARD.decode(&body).is_err() {
        return None;
    }

    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----");
    Some(pem)
}

fn pem_to_base64(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect()
}

// ============================================================================
// Generic serialize / deserialize
// ============================================================================

/// Serialize a bound value into an element named by its schema.
pub fn serialize<T: XmlBinding>(value: &T) -> Result<XmlElement> {
    let schema = T::schema();
    write_record(schema, schema.qname(), &value.to_record())
}

/// Deserialize an element into a bound value.
///
/// The element must carry the schema's qualified name.
pub fn deserialize<T: XmlBinding>(element: &XmlElement) -> Result<T> {
    let schema = T::schema();
    let expected = schema.qname();
    if element.name != expected {
        return Err(CepError::binding(format!(
            "expected element {}, found {}",
            expected, element.name
        )));
    }
    T::from_record(read_record(schema, element)?)
}

fn nil_element(name: QName) -> XmlElement {
    XmlElement::new(name).with_attribute(XSI_NIL, "true")
}

fn write_record(schema: &Schema, name: QName, record: &Record) -> Result<XmlElement> {
    let mut element = XmlElement::new(name);

    for field in schema.fields {
        let value = record.get(field.key);

        if field.is_list() {
            write_list(&mut element, field, value)?;
            continue;
        }

        let value = match value {
            Some(v) => v,
            None if field.nillable && !matches!(field.kind, Kind::Attribute(_) | Kind::Text(_)) => {
                element.children.push(nil_element(field.qname()));
                continue;
            }
            None if field.cardinality == Cardinality::One => {
                return Err(CepError::binding(format!(
                    "required field '{}' of {} is not set",
                    field.key,
                    schema.qname()
                )));
            }
            None => continue,
        };

        match field.kind {
            Kind::Attribute(scalar) => {
                element.set_attribute(field.qname(), write_scalar(field, scalar, value)?);
            }
            Kind::Text(scalar) => {
                element.text = Some(write_scalar(field, scalar, value)?);
            }
            Kind::Leaf(scalar) => {
                let text = write_scalar(field, scalar, value)?;
                element
                    .children
                    .push(XmlElement::new(field.qname()).with_text(text));
            }
            Kind::Node(_) | Kind::Any => {
                element.children.push(write_item(field, value)?);
            }
        }
    }

    Ok(element)
}

fn write_item(field: &Field, value: &Value) -> Result<XmlElement> {
    match (field.kind, value) {
        (Kind::Leaf(scalar), v) => {
            Ok(XmlElement::new(field.qname()).with_text(write_scalar(field, scalar, v)?))
        }
        (Kind::Node(schema), Value::Node(record)) => write_record(schema(), field.qname(), record),
        (Kind::Any, Value::Element(e)) => Ok(e.clone()),
        (_, other) => Err(mismatch(field.key, "element value", other)),
    }
}

fn write_list(element: &mut XmlElement, field: &Field, value: Option<&Value>) -> Result<()> {
    let items: &[Value] = match value {
        None => &[],
        Some(Value::List(items)) => items,
        Some(other) => return Err(mismatch(field.key, "list", other)),
    };

    if items.is_empty() && field.cardinality == Cardinality::ManyNonEmpty {
        return Err(CepError::binding(format!(
            "list field '{}' must not be empty",
            field.key
        )));
    }

    let mut children = Vec::with_capacity(items.len());
    for item in items {
        children.push(write_item(field, item)?);
    }

    match field.wrapper_qname() {
        Some(wrapper) if children.is_empty() => {
            if field.nillable {
                element.children.push(nil_element(wrapper));
            }
        }
        Some(wrapper) => {
            let mut container = XmlElement::new(wrapper);
            container.children = children;
            element.children.push(container);
        }
        None => element.children.extend(children),
    }

    Ok(())
}

fn read_record(schema: &Schema, element: &XmlElement) -> Result<Record> {
    let mut record = Record::new();

    for field in schema.fields {
        if field.is_list() {
            let items = read_list(field, element)?;
            record.insert(field.key, Value::List(items));
            continue;
        }

        let value = match field.kind {
            Kind::Attribute(scalar) => match element.attribute(&field.qname()) {
                Some(text) => Some(read_scalar(field, scalar, text)?),
                None => None,
            },
            Kind::Text(scalar) => match element.text.as_deref() {
                Some(text) if !text.trim().is_empty() || scalar == Scalar::String => {
                    Some(read_scalar(field, scalar, text)?)
                }
                _ => None,
            },
            Kind::Any => element.children.first().cloned().map(Value::Element),
            Kind::Leaf(_) | Kind::Node(_) => match element.child(&field.qname()) {
                Some(child) if child.is_nil() => {
                    record_nil(field)?;
                    None
                }
                Some(child) => Some(read_item(field, child)?),
                None => {
                    if field.cardinality == Cardinality::One {
                        return Err(missing(field, element));
                    }
                    None
                }
            },
        };

        match value {
            Some(v) => record.insert(field.key, v),
            None if field.cardinality == Cardinality::One
                && matches!(field.kind, Kind::Attribute(_) | Kind::Any) =>
            {
                return Err(missing(field, element));
            }
            None => {}
        }
    }

    Ok(record)
}

fn record_nil(field: &Field) -> Result<()> {
    if field.nillable || field.cardinality != Cardinality::One {
        Ok(())
    } else {
        Err(CepError::binding(format!(
            "field '{}' is nil but not nillable",
            field.key
        )))
    }
}

fn read_item(field: &Field, child: &XmlElement) -> Result<Value> {
    match field.kind {
        Kind::Leaf(scalar) => read_scalar(field, scalar, child.text()),
        Kind::Node(schema) => Ok(Value::Node(read_record(schema(), child)?)),
        Kind::Any => Ok(Value::Element(child.clone())),
        Kind::Attribute(_) | Kind::Text(_) => Err(CepError::binding(format!(
            "field '{}' cannot be a list item",
            field.key
        ))),
    }
}

fn read_list(field: &Field, element: &XmlElement) -> Result<Vec<Value>> {
    let item_name = field.qname();

    let container = match field.wrapper_qname() {
        Some(wrapper) => match element.child(&wrapper) {
            Some(c) if !c.is_nil() => Some(c),
            _ => None,
        },
        None => Some(element),
    };

    let mut items = Vec::new();
    if let Some(container) = container {
        for child in container.children_named(&item_name) {
            if child.is_nil() {
                continue;
            }
            items.push(read_item(field, child)?);
        }
    }

    if items.is_empty() && field.cardinality == Cardinality::ManyNonEmpty {
        return Err(missing(field, element));
    }
    Ok(items)
}

fn missing(field: &Field, element: &XmlElement) -> CepError {
    if matches!(field.kind, Kind::Any) {
        return CepError::binding(format!("{} has no child element", element.name));
    }
    let expected = field.qname();

    let misplaced = element
        .children
        .iter()
        .find(|c| c.name.local_name() == field.name && c.name.namespace() != field.namespace);

    match misplaced {
        Some(other) => CepError::binding(format!(
            "element {} not found in {}: '{}' is in namespace '{}'",
            expected,
            element.name,
            field.name,
            other.name.namespace()
        )),
        None => CepError::binding(format!(
            "required {} {} not found in {}",
            if matches!(field.kind, Kind::Attribute(_)) {
                "attribute"
            } else {
                "element"
            },
            expected,
            element.name
        )),
    }
}
