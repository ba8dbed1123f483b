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

//! Namespace-aware XML element tree.
//!
//! A deliberately small document model: elements carry a qualified name,
//! qualified attributes, child elements and concatenated text. Mixed content,
//! comments and processing instructions are dropped on read. This is all the
//! SOAP, XCEP and WSTEP messages need.
//!
//! Parsing resolves every prefix to its namespace URI so lookups never depend
//! on the prefixes a server happens to choose. Serialization assigns stable
//! prefixes to the well-known namespaces in [`ns`] and declares every used
//! namespace on the root element.

use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;

use crate::error::{CepError, Result};

/// Namespace URIs used by the enrollment protocols.
pub mod ns {
    /// SOAP 1.2 envelope.
    pub const SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
    /// WS-Addressing 1.0.
    pub const ADDRESSING: &str = "http://www.w3.org/2005/08/addressing";
    /// The reserved `xml:` prefix.
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    /// XML Schema instance (`xsi:nil`).
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    /// MS-XCEP enrollment policy.
    pub const XCEP: &str = "http://schemas.microsoft.com/windows/pki/2009/01/enrollmentpolicy";
    /// WS-Trust 1.3.
    pub const WST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
    /// WS-Security extensions.
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    /// WS-Security utility.
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    /// MS-WSTEP enrollment extensions.
    pub const ENROLLMENT: &str = "http://schemas.microsoft.com/windows/pki/2009/01/enrollment";

    /// Preferred serialization prefixes.
    pub(crate) const PREFIXES: &[(&str, &str)] = &[
        (XML, "xml"),
        (SOAP, "s"),
        (ADDRESSING, "a"),
        (XSI, "xsi"),
        (XCEP, "xcep"),
        (WST, "wst"),
        (WSSE, "wsse"),
        (WSU, "wsu"),
        (ENROLLMENT, "enr"),
    ];
}

/// A namespace-qualified name. An empty namespace means "no namespace".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QName {
    namespace: Cow<'static, str>,
    local: Cow<'static, str>,
}

impl QName {
    /// Create a name from static strings, usable in constants.
    pub const fn new(namespace: &'static str, local: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed(namespace),
            local: Cow::Borrowed(local),
        }
    }

    /// Create a name without a namespace.
    pub const fn local(local: &'static str) -> Self {
        Self::new("", local)
    }

    /// Create a name from owned strings.
    pub fn owned(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Cow::Owned(namespace.into()),
            local: Cow::Owned(local.into()),
        }
    }

    /// The namespace URI (empty if unqualified).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The local part.
    pub fn local_name(&self) -> &str {
        &self.local
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// The `xsi:nil` attribute.
pub const XSI_NIL: QName = QName::new(ns::XSI, "nil");

/// An XML element with resolved names.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// Qualified element name.
    pub name: QName,
    /// Qualified attributes in document order. Namespace declarations are not kept.
    pub attributes: Vec<(QName, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated character data, if any.
    pub text: Option<String>,
}

impl XmlElement {
    /// Create an empty element.
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Look up an attribute by qualified name.
    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given name.
    pub fn child(&self, name: &QName) -> Option<&XmlElement> {
        self.children.iter().find(|c| &c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a QName) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| &c.name == name)
    }

    /// Text content, or an empty string.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Whether the element carries `xsi:nil="true"`.
    pub fn is_nil(&self) -> bool {
        matches!(self.attribute(&XSI_NIL), Some("true") | Some("1"))
    }

    /// Parse a document and return its root element.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| CepError::xml(format!("Invalid UTF-8: {}", e)))?;
        reject_dtd(text)?;

        let mut reader = NsReader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_resolved_event() {
                Ok((resolved, Event::Start(e))) => {
                    let namespace = resolved_namespace(resolved)?;
                    let element = start_element(&reader, namespace, &e)?;
                    stack.push(element);
                }
                Ok((resolved, Event::Empty(e))) => {
                    let namespace = resolved_namespace(resolved)?;
                    let element = start_element(&reader, namespace, &e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok((_, Event::Text(t))) => {
                    let text = t.unescape().map_err(|e| CepError::xml(e.to_string()))?;
                    append_text(&mut stack, &text);
                }
                Ok((_, Event::CData(c))) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    append_text(&mut stack, &text);
                }
                Ok((_, Event::End(_))) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| CepError::xml("Unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok((_, Event::DocType(_))) => {
                    return Err(CepError::xml("DOCTYPE declarations are not allowed"));
                }
                Ok((_, Event::Eof)) => break,
                Ok(_) => {}
                Err(e) => return Err(CepError::xml(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(CepError::xml("Unexpected end of document"));
        }
        root.ok_or_else(|| CepError::xml("Document has no root element"))
    }

    /// Serialize the element as a standalone document fragment.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut prefixes = PrefixMap::default();
        prefixes.collect(self);

        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_element(&mut writer, self, &prefixes, true)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Serialize for logging. Never fails.
    pub fn to_string_lossy(&self) -> String {
        match self.to_bytes() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("<unserializable: {}>", e),
        }
    }
}

fn reject_dtd(xml: &str) -> Result<()> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(CepError::xml("DOCTYPE declarations are not allowed"));
    }
    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(CepError::xml("Entity declarations are not allowed"));
    }
    Ok(())
}

fn resolved_namespace(resolved: ResolveResult<'_>) -> Result<String> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Ok(ns::XML.to_string()),
        ResolveResult::Unknown(prefix) => Err(CepError::xml(format!(
            "Undeclared namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn start_element(
    reader: &NsReader<&[u8]>,
    namespace: String,
    e: &BytesStart<'_>,
) -> Result<XmlElement> {
    let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut element = XmlElement::new(QName::owned(namespace, local));

    for attr in e.attributes() {
        let attr = attr.map_err(|e| CepError::xml(e.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let namespace = resolved_namespace(resolved)?;
        let value = attr
            .unescape_value()
            .map_err(|e| CepError::xml(e.to_string()))?
            .into_owned();
        element.attributes.push((
            QName::owned(namespace, String::from_utf8_lossy(local.as_ref()).into_owned()),
            value,
        ));
    }

    Ok(element)
}

fn append_text(stack: &mut [XmlElement], text: &str) {
    if let Some(current) = stack.last_mut() {
        match current.text {
            Some(ref mut existing) => existing.push_str(text),
            None => current.text = Some(text.to_string()),
        }
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(CepError::xml("Multiple root elements")),
    }
    Ok(())
}

/// Namespace URI to prefix assignments for one serialized document.
#[derive(Default)]
struct PrefixMap {
    entries: Vec<(String, String)>,
}

impl PrefixMap {
    fn collect(&mut self, element: &XmlElement) {
        self.register(element.name.namespace());
        for (name, _) in &element.attributes {
            self.register(name.namespace());
        }
        for child in &element.children {
            self.collect(child);
        }
    }

    fn register(&mut self, namespace: &str) {
        if namespace.is_empty() || self.entries.iter().any(|(uri, _)| uri == namespace) {
            return;
        }
        let prefix = ns::PREFIXES
            .iter()
            .find(|(uri, _)| *uri == namespace)
            .map(|(_, prefix)| prefix.to_string())
            .unwrap_or_else(|| format!("ns{}", self.entries.len()));
        self.entries.push((namespace.to_string(), prefix));
    }

    fn qualify(&self, name: &QName) -> String {
        match self.entries.iter().find(|(uri, _)| uri == name.namespace()) {
            Some((_, prefix)) => format!("{}:{}", prefix, name.local_name()),
            None => name.local_name().to_string(),
        }
    }
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &XmlElement,
    prefixes: &PrefixMap,
    is_root: bool,
) -> Result<()> {
    let name = prefixes.qualify(&element.name);
    let mut start = BytesStart::new(name.as_str());

    if is_root {
        for (uri, prefix) in prefixes.entries.iter().filter(|(uri, _)| uri != ns::XML) {
            start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
        }
    }
    for (attr_name, value) in &element.attributes {
        start.push_attribute((prefixes.qualify(attr_name).as_str(), value.as_str()));
    }

    let has_text = element.text.as_deref().is_some_and(|t| !t.is_empty());
    if element.children.is_empty() && !has_text {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| CepError::xml(e.to_string()))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| CepError::xml(e.to_string()))?;
    if let Some(ref text) = element.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| CepError::xml(e.to_string()))?;
    }
    for child in &element.children {
        write_element(writer, child, prefixes, false)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name.as_str())))
        .map_err(|e| CepError::xml(e.to_string()))?;

    Ok(())
}
