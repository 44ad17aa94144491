//! XML wire format.
//!
//! Every message is a single `<xml>` root with one child element per field, the
//! value carried as character data:
//!
//! ```xml
//! <xml>
//!   <appid>wx123</appid>
//!   <mch_id>1900000</mch_id>
//!   <sign>6A9AE1657590FD6257D693A078E1C3E4</sign>
//! </xml>
//! ```
//!
//! Outbound bodies escape character data. Inbound bodies may use either escaped text
//! or CDATA sections, which is what the gateway sends.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

use crate::params::ParamSet;

/// Root element of every request and reply body.
pub const ROOT_ELEMENT: &str = "xml";

/// Field that must be present in every response and notification.
pub const RETURN_CODE_FIELD: &str = "return_code";

/// Errors raised while decoding a body.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Body has no root element")]
    MissingRoot,
    #[error("Body ends before the root element is closed")]
    Unterminated,
    #[error("Element `{0}` is nested deeper than a field")]
    UnexpectedNesting(String),
    #[error("Field `{0}` appears more than once")]
    DuplicateField(String),
    #[error("Mandatory field `{0}` is missing")]
    MissingField(&'static str),
    #[error("Failed to map fields onto response type: {0}")]
    Typed(#[from] quick_xml::DeError),
}

/// Serializes a field set into an XML body.
///
/// Keys are written as element names as-is; they are expected to be the protocol's
/// ASCII identifiers.
pub fn to_wire(params: &ParamSet) -> Vec<u8> {
    to_xml_string(params).into_bytes()
}

fn to_xml_string(params: &ParamSet) -> String {
    let mut out = String::with_capacity(32 + params.len() * 32);
    out.push('<');
    out.push_str(ROOT_ELEMENT);
    out.push('>');
    for (key, value) in params.iter() {
        out.push('<');
        out.push_str(key);
        out.push('>');
        out.push_str(&escape(value));
        out.push_str("</");
        out.push_str(key);
        out.push('>');
    }
    out.push_str("</");
    out.push_str(ROOT_ELEMENT);
    out.push('>');
    out
}

/// Parses an XML body into the raw field set, preserving every field present.
///
/// Field text is kept byte for byte, surrounding whitespace included: it is what the
/// sender signed. Whitespace between elements is ignored.
pub fn parse_params(bytes: &[u8]) -> Result<ParamSet, CodecError> {
    let mut reader = Reader::from_reader(bytes);

    let mut params = ParamSet::new();
    let mut seen = BTreeSet::new();
    let mut saw_root = false;
    let mut depth = 0usize;
    let mut field: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    1 => saw_root = true,
                    2 => {
                        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                        if !seen.insert(name.clone()) {
                            return Err(CodecError::DuplicateField(name));
                        }
                        field = Some(name);
                        text.clear();
                    }
                    _ => {
                        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                        return Err(CodecError::UnexpectedNesting(name));
                    }
                }
            }
            Event::Empty(e) => match depth {
                0 => saw_root = true,
                1 => {
                    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    if !seen.insert(name.clone()) {
                        return Err(CodecError::DuplicateField(name));
                    }
                }
                _ => {
                    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    return Err(CodecError::UnexpectedNesting(name));
                }
            },
            Event::Text(t) if depth == 2 => text.push_str(&t.unescape()?),
            Event::CData(c) if depth == 2 => text.push_str(std::str::from_utf8(&c)?),
            Event::End(_) => {
                if depth == 2 {
                    if let Some(name) = field.take() {
                        params.insert_raw(name, std::mem::take(&mut text));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(CodecError::MissingRoot);
    }
    if depth != 0 {
        return Err(CodecError::Unterminated);
    }
    Ok(params)
}

/// Parses a response or notification body into its raw field set.
///
/// Fails when the body is not well-formed or lacks `return_code`.
pub fn parse_message(bytes: &[u8]) -> Result<ParamSet, CodecError> {
    let params = parse_params(bytes)?;
    if !params.contains(RETURN_CODE_FIELD) {
        return Err(CodecError::MissingField(RETURN_CODE_FIELD));
    }
    Ok(params)
}

/// Maps a raw field set onto a typed view.
///
/// The view is built from `params` rather than from the original body, so an empty
/// element is absent in both. Fields unknown to `T` are ignored.
pub fn decode_fields<T: DeserializeOwned>(params: &ParamSet) -> Result<T, CodecError> {
    let typed = quick_xml::de::from_str::<T>(&to_xml_string(params))?;
    Ok(typed)
}

/// Parses a response or notification body into its typed view and its raw field set.
///
/// Fields unknown to `T` are kept in the raw set, which is what signatures are
/// recomputed over.
pub fn from_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, ParamSet), CodecError> {
    let params = parse_message(bytes)?;
    let typed = decode_fields(&params)?;
    Ok((typed, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Reply {
        return_code: String,
        prepay_id: Option<String>,
        total_fee: Option<u64>,
    }

    #[test]
    fn test_to_wire_is_sorted_and_escaped() {
        let params = ParamSet::new()
            .with("body", "Fish & <Chips>")
            .with("appid", "wx123");
        let wire = String::from_utf8(to_wire(&params)).unwrap();
        assert_eq!(
            wire,
            "<xml><appid>wx123</appid><body>Fish &amp; &lt;Chips&gt;</body></xml>"
        );
    }

    #[test]
    fn test_to_wire_then_parse_restores_fields() {
        let params = ParamSet::new()
            .with("appid", "wx123")
            .with("body", "Fish & <Chips> \"quoted\"")
            .with("total_fee", 100u64)
            .with("detail", "多字节");
        assert_eq!(parse_params(&to_wire(&params)).unwrap(), params);
    }

    #[test]
    fn test_padded_values_survive_round_trip() {
        let params = ParamSet::new()
            .with("body", " padded ")
            .with("attach", "  ")
            .with("detail", "line one\nline two");
        assert_eq!(parse_params(&to_wire(&params)).unwrap(), params);
    }

    #[test]
    fn test_cdata_whitespace_is_kept() {
        let body = b"<xml>\n  <attach><![CDATA[ note ]]></attach>\n</xml>";
        let params = parse_params(body).unwrap();
        assert_eq!(params.get("attach"), Some(" note "));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_parse_accepts_cdata_and_preserves_unknown_fields() {
        let body = br#"<xml>
            <return_code><![CDATA[SUCCESS]]></return_code>
            <prepay_id><![CDATA[wx201411101639507cbf6ffd8b0779950874]]></prepay_id>
            <x_extension>kept</x_extension>
            <coupon_fee>0</coupon_fee>
            <attach></attach>
            <empty_tag/>
        </xml>"#;
        let params = parse_params(body).unwrap();
        assert_eq!(params.get("return_code"), Some("SUCCESS"));
        assert_eq!(params.get("x_extension"), Some("kept"));
        assert_eq!(params.get("coupon_fee"), Some("0"));
        assert!(!params.contains("attach"));
        assert!(!params.contains("empty_tag"));
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(parse_params(b"not xml at all").is_err());
        assert!(matches!(
            parse_params(b"<xml><a>1</b></xml>"),
            Err(CodecError::Xml(_))
        ));
        assert!(matches!(
            parse_params(b"<xml><a>1</a>"),
            Err(CodecError::Unterminated) | Err(CodecError::Xml(_))
        ));
        assert!(matches!(
            parse_params(b"<xml><a><b>1</b></a></xml>"),
            Err(CodecError::UnexpectedNesting(name)) if name == "b"
        ));
        assert!(matches!(
            parse_params(b"<xml><a>1</a><a>2</a></xml>"),
            Err(CodecError::DuplicateField(name)) if name == "a"
        ));
        assert!(matches!(parse_params(b""), Err(CodecError::MissingRoot)));
    }

    #[test]
    fn test_from_wire_requires_return_code() {
        let err = from_wire::<Reply>(b"<xml><prepay_id>p</prepay_id></xml>").unwrap_err();
        assert!(matches!(err, CodecError::MissingField("return_code")));
    }

    #[test]
    fn test_from_wire_fills_typed_and_raw_views() {
        let body = b"<xml><return_code>SUCCESS</return_code><prepay_id>p1</prepay_id>\
            <total_fee>100</total_fee><sign>ABC</sign><new_field>n</new_field></xml>";
        let (typed, raw): (Reply, ParamSet) = from_wire(body).unwrap();
        assert_eq!(typed.return_code, "SUCCESS");
        assert_eq!(typed.prepay_id.as_deref(), Some("p1"));
        assert_eq!(typed.total_fee, Some(100));
        assert_eq!(raw.len(), 5);
        assert_eq!(raw.get("new_field"), Some("n"));
    }

    #[test]
    fn test_empty_element_is_absent_in_both_views() {
        let body = b"<xml><return_code>SUCCESS</return_code><total_fee></total_fee></xml>";
        let (typed, raw): (Reply, ParamSet) = from_wire(body).unwrap();
        assert_eq!(typed.total_fee, None);
        assert!(!raw.contains("total_fee"));
    }
}
