//! XML-RPC wire codec.
//!
//! Hand-rolled against the subset RON actually speaks: scalar values,
//! order-preserving structs and arrays. Decoding is lenient about scalar
//! spellings (`<i4>` vs `<int>`, bare text inside `<value>`) because the
//! backend is not consistent about them.

use quick_xml::escape::escape;

use vron_core::xml::{Element, XmlDocument};

#[derive(Debug, thiserror::Error)]
pub enum RonError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("fault {code}: {message}")]
    Fault { code: i32, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RonError {
    /// The text surfaced to the partner inside `TransactionStatus` /
    /// audit records: the raw fault string when the backend produced one,
    /// otherwise the transport/protocol description.
    pub fn fault_text(&self) -> String {
        match self {
            RonError::Fault { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Str(String),
    Double(f64),
    /// Order-preserving member list.
    Struct(Vec<(String, Value)>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Scalar rendered as text, for backends that return ids as either
    /// ints or strings.
    pub fn text_value(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Double(d) => Some(d.to_string()),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn items(&self) -> &[Value] {
        match self {
            Value::Array(items) => items,
            _ => &[],
        }
    }
}

/// Encodes one `<methodCall>` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param><value>");
        encode_value(param, &mut out);
        out.push_str("</value></param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name><value>");
                encode_value(member, out);
                out.push_str("</value></member>");
            }
            out.push_str("</struct>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                out.push_str("<value>");
                encode_value(item, out);
                out.push_str("</value>");
            }
            out.push_str("</data></array>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
}

/// Decodes one `<methodResponse>` document. A `<fault>` becomes
/// `RonError::Fault`, anything structurally off becomes
/// `RonError::Protocol`.
pub fn decode_response(body: &str) -> Result<Value, RonError> {
    let doc = XmlDocument::parse(body.as_bytes());
    if !doc.validated {
        return Err(RonError::Protocol(
            doc.error_message
                .unwrap_or_else(|| "unparseable response".to_string()),
        ));
    }
    if doc.root_tag() != Some("methodResponse") {
        return Err(RonError::Protocol(format!(
            "unexpected root element {:?}",
            doc.root_tag()
        )));
    }

    if let Some(fault) = doc.element("fault") {
        let value = fault
            .find("value")
            .map(decode_value)
            .transpose()?
            .unwrap_or(Value::Nil);
        let code = value
            .field("faultCode")
            .and_then(Value::as_i32)
            .unwrap_or_default();
        let message = value
            .field("faultString")
            .and_then(Value::text_value)
            .unwrap_or_else(|| "unknown fault".to_string());
        return Err(RonError::Fault { code, message });
    }

    let value = doc
        .element("params")
        .and_then(|params| params.find("value"))
        .ok_or_else(|| RonError::Protocol("response carried no value".to_string()))?;
    decode_value(value)
}

fn decode_value(value: &Element) -> Result<Value, RonError> {
    let typed = match value.children.first() {
        // Bare text inside <value> is an implicit string.
        None => return Ok(Value::Str(value.text().unwrap_or("").to_string())),
        Some(child) => child,
    };

    let text = typed.text().unwrap_or("");
    match typed.tag.as_str() {
        "int" | "i4" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| RonError::Protocol(format!("bad int value {text:?}"))),
        "boolean" => Ok(Value::Bool(matches!(text.trim(), "1" | "true"))),
        "string" | "dateTime.iso8601" | "base64" => Ok(Value::Str(text.to_string())),
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| RonError::Protocol(format!("bad double value {text:?}"))),
        "nil" => Ok(Value::Nil),
        "struct" => {
            let mut members = Vec::with_capacity(typed.children.len());
            for member in &typed.children {
                if member.tag != "member" {
                    continue;
                }
                let name = member
                    .find("name")
                    .and_then(Element::text)
                    .ok_or_else(|| RonError::Protocol("struct member without name".to_string()))?;
                let inner = member
                    .find("value")
                    .ok_or_else(|| RonError::Protocol("struct member without value".to_string()))?;
                members.push((name.to_string(), decode_value(inner)?));
            }
            Ok(Value::Struct(members))
        }
        "array" => {
            let data = typed
                .find("data")
                .ok_or_else(|| RonError::Protocol("array without data".to_string()))?;
            let mut items = Vec::with_capacity(data.children.len());
            for item in &data.children {
                if item.tag == "value" {
                    items.push(decode_value(item)?);
                }
            }
            Ok(Value::Array(items))
        }
        other => Err(RonError::Protocol(format!("unsupported value type {other}"))),
    }
}
