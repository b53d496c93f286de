use tokensign_pkcs11_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_TYPE, CK_KEY_TYPE, CK_OBJECT_CLASS, CK_ULONG, CKA_CLASS,
    CKA_KEY_TYPE,
};

/// One entry of a search template: an attribute type tagged with the
/// bytes the module should match.
///
/// The owned `value` buffer backs the raw `CK_ATTRIBUTE` built by
/// [`Attribute::as_raw`]; it must stay alive and unmoved until the
/// native call consuming the template has returned.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Attribute {
    attribute_type: CK_ATTRIBUTE_TYPE,
    value: Vec<u8>,
}

impl Attribute {
    pub fn new(attribute_type: CK_ATTRIBUTE_TYPE, value: Vec<u8>) -> Self {
        Attribute {
            attribute_type,
            value,
        }
    }

    /// A `CKA_CLASS` entry; the class value is encoded as fixed-width
    /// little-endian bytes, like every numeric attribute.
    pub fn object_class(class: CK_OBJECT_CLASS) -> Self {
        Self::new(CKA_CLASS, class.to_le_bytes().to_vec())
    }

    /// A `CKA_KEY_TYPE` entry.
    pub fn key_type(key_type: CK_KEY_TYPE) -> Self {
        Self::new(CKA_KEY_TYPE, key_type.to_le_bytes().to_vec())
    }

    pub fn attribute_type(&self) -> CK_ATTRIBUTE_TYPE {
        self.attribute_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The raw attribute pointing into this entry's value buffer.
    pub(crate) fn as_raw(&self) -> CK_ATTRIBUTE {
        CK_ATTRIBUTE {
            type_: self.attribute_type,
            pValue: self.value.as_ptr().cast::<std::ffi::c_void>().cast_mut(),
            ulValueLen: self.value.len() as CK_ULONG,
        }
    }
}
