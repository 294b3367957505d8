//! Distinguished names as ordered (OID, value) pairs.

use std::fmt;

use der::asn1::{Any, ObjectIdentifier};
use der::{Encode, Tag, Tagged};
use x509_cert::name::Name;

pub(crate) const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Short names used when printing a distinguished name.
const SHORT_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.5", "serialNumber"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "street"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.12", "title"),
    ("0.9.2342.19200300.100.1.1", "UID"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("1.2.840.113549.1.9.1", "emailAddress"),
];

/// One attribute of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAttribute {
    /// Attribute type.
    pub oid: ObjectIdentifier,
    /// Attribute value as text.
    ///
    /// String types are decoded. Any other ASN.1 type is rendered as `#`
    /// followed by the hex of its DER encoding.
    pub value: String,
}

impl NameAttribute {
    /// Short name of the attribute type (`CN`, `O`, ...) if it has one.
    pub fn short_name(&self) -> Option<&'static str> {
        let oid = self.oid.to_string();
        SHORT_NAMES
            .iter()
            .find(|(dotted, _)| *dotted == oid)
            .map(|(_, short)| *short)
    }
}

/// Subject or issuer name, in certificate order.
///
/// Multi-valued RDNs are flattened in the order they are encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    attributes: Vec<NameAttribute>,
}

impl DistinguishedName {
    pub(crate) fn from_name(name: &Name) -> Self {
        let attributes = name
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(|atv| NameAttribute {
                oid: atv.oid,
                value: attribute_value_to_string(&atv.value),
            })
            .collect();
        DistinguishedName { attributes }
    }

    /// All attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = &NameAttribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Values of every attribute with the given type.
    pub fn values<'a>(&'a self, oid: &'a ObjectIdentifier) -> impl Iterator<Item = &'a str> {
        self.attributes
            .iter()
            .filter(move |a| a.oid == *oid)
            .map(|a| a.value.as_str())
    }

    /// Values of the commonName attributes.
    pub fn common_names(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|a| a.oid == OID_COMMON_NAME)
            .map(|a| a.value.as_str())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match attr.short_name() {
                Some(short) => write!(f, "{}={}", short, attr.value)?,
                None => write!(f, "{}={}", attr.oid, attr.value)?,
            }
        }
        Ok(())
    }
}

/// Decode a directory string, falling back to `#hex` of the DER encoding.
pub(crate) fn attribute_value_to_string(value: &Any) -> String {
    let bytes = value.value();
    let decoded = match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::VisibleString
        | Tag::NumericString => std::str::from_utf8(bytes).ok().map(str::to_string),
        // T.61 in practice carries Latin-1.
        Tag::TeletexString => Some(bytes.iter().map(|b| *b as char).collect()),
        Tag::BmpString => decode_bmp(bytes),
        _ => None,
    };

    decoded.unwrap_or_else(|| {
        let der = value.to_der().unwrap_or_default();
        let mut out = String::with_capacity(1 + der.len() * 2);
        out.push('#');
        for b in der {
            out.push_str(&format!("{:02x}", b));
        }
        out
    })
}

fn decode_bmp(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
