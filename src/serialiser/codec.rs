//! Encoding of [`PropertyValue`]s as typed XML value elements.
//!
//! ```text
//! <Property name="FileName">
//!   <stringlist><string>a.txt</string><string>b.txt</string></stringlist>
//! </Property>
//! ```

use crate::model::{AdvanceParameter, ComponentType, PropertyValue};
use crate::serialiser::xml::XmlElement;
use std::str::FromStr;

fn string_element(s: &str) -> XmlElement {
    XmlElement::new("string").with_text(s)
}

fn string_list_element(list: &[String]) -> XmlElement {
    list.iter()
        .fold(XmlElement::new("stringlist"), |el, s| el.with_child(string_element(s)))
}

fn list_string_list_element(lists: &[Vec<String>]) -> XmlElement {
    lists.iter().fold(XmlElement::new("list_stringlist"), |el, l| {
        el.with_child(string_list_element(l))
    })
}

/// Encode a value as its typed element.
pub fn encode_value(value: &PropertyValue) -> XmlElement {
    match value {
        PropertyValue::String(s) => string_element(s),
        PropertyValue::StringList(l) => string_list_element(l),
        PropertyValue::ListStringList(l) => list_string_list_element(l),
        PropertyValue::ListListStringList(l) => l
            .iter()
            .fold(XmlElement::new("list_list_stringlist"), |el, inner| {
                el.with_child(list_string_list_element(inner))
            }),
        PropertyValue::ComponentType(t) => XmlElement::new("component_type").with_text(t.as_str()),
        PropertyValue::AdvanceParameter(p) => {
            XmlElement::new("advance_parameter").with_text(p.symbol())
        }
        PropertyValue::Bool(b) => {
            XmlElement::new("bool").with_text(if *b { "true" } else { "false" })
        }
        other => XmlElement::new(other.type_tag()).with_text(scalar_text(other)),
    }
}

fn scalar_text(value: &PropertyValue) -> String {
    match value {
        PropertyValue::UChar(v) => v.to_string(),
        PropertyValue::Char(v) => v.to_string(),
        PropertyValue::UShort(v) => v.to_string(),
        PropertyValue::Short(v) => v.to_string(),
        PropertyValue::UInt(v) => v.to_string(),
        PropertyValue::Int(v) => v.to_string(),
        PropertyValue::ULong(v) => v.to_string(),
        PropertyValue::Long(v) => v.to_string(),
        PropertyValue::Float(v) => v.to_string(),
        PropertyValue::Double(v) => v.to_string(),
        _ => String::new(),
    }
}

/// Strip carriage returns that directly precede a line feed; keep all others.
pub fn remove_surplus_cr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_cr = 0usize;
    for c in input.chars() {
        match c {
            '\r' => pending_cr += 1,
            '\n' => {
                pending_cr = 0;
                out.push('\n');
            }
            other => {
                out.extend(std::iter::repeat('\r').take(pending_cr));
                pending_cr = 0;
                out.push(other);
            }
        }
    }
    out.extend(std::iter::repeat('\r').take(pending_cr));
    out
}

fn decode_strings(element: &XmlElement) -> Vec<String> {
    element
        .elements()
        .map(|s| remove_surplus_cr(&s.text()))
        .collect()
}

fn decode_list_strings(element: &XmlElement) -> Vec<Vec<String>> {
    element.elements().map(decode_strings).collect()
}

fn parse<T: FromStr>(element: &XmlElement) -> Option<T> {
    element.text().trim().parse().ok()
}

/// Decode the first value element inside a `Property` element.
///
/// `None` when there is no value element, the tag is unknown or a number
/// does not parse; the caller leaves the property at its default.
pub fn decode_property(property: &XmlElement) -> Option<PropertyValue> {
    property.elements().next().and_then(decode_value)
}

/// Decode a typed value element.
pub fn decode_value(element: &XmlElement) -> Option<PropertyValue> {
    let value = match element.name.as_str() {
        "string" => PropertyValue::String(remove_surplus_cr(&element.text())),
        "stringlist" => PropertyValue::StringList(decode_strings(element)),
        "list_stringlist" => PropertyValue::ListStringList(decode_list_strings(element)),
        "list_list_stringlist" => PropertyValue::ListListStringList(
            element.elements().map(decode_list_strings).collect(),
        ),
        "component_type" => {
            PropertyValue::ComponentType(ComponentType::from_name(&element.text()))
        }
        "advance_parameter" => {
            PropertyValue::AdvanceParameter(AdvanceParameter::from_symbol(element.text().trim())?)
        }
        "uchar" => PropertyValue::UChar(parse(element)?),
        "char" => PropertyValue::Char(parse(element)?),
        "ushort" => PropertyValue::UShort(parse(element)?),
        "short" => PropertyValue::Short(parse(element)?),
        "uint" => PropertyValue::UInt(parse(element)?),
        "int" => PropertyValue::Int(parse(element)?),
        "ulong" => PropertyValue::ULong(parse(element)?),
        "long" => PropertyValue::Long(parse(element)?),
        "float" => PropertyValue::Float(parse(element)?),
        "double" => PropertyValue::Double(parse(element)?),
        "bool" => PropertyValue::Bool(element.text().trim() == "true"),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialiser::xml::{parse_document, write_document};
    use proptest::prelude::*;

    #[test]
    fn test_remove_surplus_cr() {
        assert_eq!(remove_surplus_cr("a\r\nb"), "a\nb");
        assert_eq!(remove_surplus_cr("a\r\r\nb"), "a\nb");
        assert_eq!(remove_surplus_cr("a\rb"), "a\rb");
        assert_eq!(remove_surplus_cr("trailing\r"), "trailing\r");
    }

    #[test]
    fn test_nested_lists() {
        let value = PropertyValue::ListListStringList(vec![
            vec![vec!["a".into()], vec![]],
            vec![vec!["b".into(), "c".into()]],
        ]);
        let element = encode_value(&value);
        assert_eq!(element.name, "list_list_stringlist");
        assert_eq!(decode_value(&element), Some(value));
    }

    #[test]
    fn test_malformed_numbers_are_skipped() {
        let element = XmlElement::new("int").with_text("twelve");
        assert_eq!(decode_value(&element), None);
        let element = XmlElement::new("uchar").with_text("300");
        assert_eq!(decode_value(&element), None);
        let element = XmlElement::new("double").with_text(" 2.5 ");
        assert_eq!(decode_value(&element), Some(PropertyValue::Double(2.5)));
    }

    #[test]
    fn test_enumerations() {
        let element = XmlElement::new("advance_parameter").with_text("NM_CYCLE");
        assert_eq!(
            decode_value(&element),
            Some(PropertyValue::AdvanceParameter(AdvanceParameter::Cycle))
        );
        let element = XmlElement::new("advance_parameter").with_text("NM_SOMETIMES");
        assert_eq!(decode_value(&element), None);
        let element = XmlElement::new("bool").with_text("yes");
        assert_eq!(decode_value(&element), Some(PropertyValue::Bool(false)));
    }

    proptest! {
        #[test]
        fn prop_strings_keep_lone_carriage_returns(s in "[a-z\r\n ]{0,24}") {
            let value = PropertyValue::String(s.clone());
            let doc = XmlElement::new("Property").with_child(encode_value(&value));
            let text = write_document(&doc, 2).unwrap();
            let parsed = parse_document(&text).unwrap();
            let decoded = decode_property(&parsed);
            prop_assert_eq!(decoded, Some(PropertyValue::String(remove_surplus_cr(&s))));
        }
    }
}
