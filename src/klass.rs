//! Transform klass registry (spec.md §4.2, §6).
//!
//! `keepass-rs`'s `config.rs` dispatches over a closed `OuterCipherConfig`
//! enum because KDBX only ships a handful of ciphers. XML Encryption
//! algorithm identifiers are open (any URI can name a transform), so the
//! registry here is a map keyed by href rather than an enum match.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TransformError;
use crate::transform::base64::Base64Stage;
use crate::transform::cipher::CipherStage;
use crate::transform::TransformStage;

/// Where a klass is allowed to be instantiated from (spec.md §4.5
/// `nodeRead`'s `usage` bitmask).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage(u8);

impl Usage {
    pub const ENCRYPTION_METHOD: Usage = Usage(0b01);
    pub const DSIG_TRANSFORM: Usage = Usage(0b10);
    pub const BOTH: Usage = Usage(0b11);

    pub fn intersects(self, other: Usage) -> bool {
        self.0 & other.0 != 0
    }
}

/// The broad category a transform belongs to, used for input-type
/// compatibility checks in `TransformContext::prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Binary,
    NodeSet,
}

/// An immutable descriptor for one transform variant: its name, the usage
/// contexts it may appear in, its expected data type, and a factory for new
/// instances. Mirrors the klass/vtable split of spec.md §3 and §4.2, with
/// the factory closure standing in for the function table.
pub struct TransformDescriptor {
    pub href: &'static str,
    pub name: &'static str,
    pub usage: Usage,
    pub data_type: DataType,
    factory: Arc<dyn Fn() -> Box<dyn TransformStage> + Send + Sync>,
}

impl TransformDescriptor {
    pub fn new(
        href: &'static str,
        name: &'static str,
        usage: Usage,
        data_type: DataType,
        factory: impl Fn() -> Box<dyn TransformStage> + Send + Sync + 'static,
    ) -> Self {
        Self {
            href,
            name,
            usage,
            data_type,
            factory: Arc::new(factory),
        }
    }

    pub fn instantiate(&self) -> Box<dyn TransformStage> {
        (self.factory)()
    }
}

impl std::fmt::Debug for TransformDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformDescriptor")
            .field("href", &self.href)
            .field("name", &self.name)
            .field("usage", &self.usage)
            .finish()
    }
}

/// href → descriptor registry (spec.md §6 "Transform registry").
pub struct TransformRegistry {
    by_href: HashMap<&'static str, TransformDescriptor>,
}

pub const NS_XMLENC: &str = "http://www.w3.org/2001/04/xmlenc#";

pub const HREF_AES128_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes128-cbc";
pub const HREF_AES192_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes192-cbc";
pub const HREF_AES256_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";
pub const HREF_TRIPLEDES_CBC: &str = "http://www.w3.org/2001/04/xmlenc#tripledes-cbc";
pub const HREF_RSA_1_5: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";
pub const HREF_RSA_OAEP: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
pub const HREF_KW_AES128: &str = "http://www.w3.org/2001/04/xmlenc#kw-aes128";
pub const HREF_KW_AES192: &str = "http://www.w3.org/2001/04/xmlenc#kw-aes192";
pub const HREF_KW_AES256: &str = "http://www.w3.org/2001/04/xmlenc#kw-aes256";
pub const HREF_BASE64: &str = "http://www.w3.org/2000/09/xmldsig#base64";
pub const HREF_C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const HREF_ENVELOPED_SIGNATURE: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const HREF_XPATH: &str = "http://www.w3.org/TR/1999/REC-xpath-19991116";
pub const HREF_XSLT: &str = "http://www.w3.org/1999/XSL/Transform";

impl TransformRegistry {
    /// Builds the registry with the built-in registrations listed in
    /// spec.md §6: the concrete ones implemented here, and stub
    /// registrations for everything named but out of scope, which fail
    /// fast with `TransformError::Unsupported` if ever instantiated and
    /// invoked.
    pub fn with_defaults() -> Self {
        let mut reg = HashMap::new();

        reg.insert(
            HREF_AES128_CBC,
            TransformDescriptor::new(
                HREF_AES128_CBC,
                "aes128-cbc",
                Usage::ENCRYPTION_METHOD,
                DataType::Binary,
                || Box::new(CipherStage::aes(16)),
            ),
        );
        reg.insert(
            HREF_AES192_CBC,
            TransformDescriptor::new(
                HREF_AES192_CBC,
                "aes192-cbc",
                Usage::ENCRYPTION_METHOD,
                DataType::Binary,
                || Box::new(CipherStage::aes(24)),
            ),
        );
        reg.insert(
            HREF_AES256_CBC,
            TransformDescriptor::new(
                HREF_AES256_CBC,
                "aes256-cbc",
                Usage::ENCRYPTION_METHOD,
                DataType::Binary,
                || Box::new(CipherStage::aes(32)),
            ),
        );
        reg.insert(
            HREF_BASE64,
            TransformDescriptor::new(
                HREF_BASE64,
                "base64",
                Usage::BOTH,
                DataType::Binary,
                || Box::new(Base64Stage::default()),
            ),
        );

        for (href, name) in [
            (HREF_TRIPLEDES_CBC, "tripledes-cbc"),
            (HREF_RSA_1_5, "rsa-1_5"),
            (HREF_RSA_OAEP, "rsa-oaep-mgf1p"),
            (HREF_KW_AES128, "kw-aes128"),
            (HREF_KW_AES192, "kw-aes192"),
            (HREF_KW_AES256, "kw-aes256"),
            (HREF_C14N, "c14n"),
            (HREF_ENVELOPED_SIGNATURE, "enveloped-signature"),
            (HREF_XPATH, "xpath"),
        ] {
            reg.insert(
                href,
                TransformDescriptor::new(href, name, Usage::BOTH, DataType::Binary, move || {
                    Box::new(crate::transform::UnsupportedStage::new(name))
                }),
            );
        }

        #[cfg(feature = "xslt")]
        reg.insert(
            HREF_XSLT,
            TransformDescriptor::new(HREF_XSLT, "xslt", Usage::DSIG_TRANSFORM, DataType::Binary, || {
                Box::new(crate::transform::xslt::XsltStage::default())
            }),
        );
        #[cfg(not(feature = "xslt"))]
        reg.insert(
            HREF_XSLT,
            TransformDescriptor::new(HREF_XSLT, "xslt", Usage::DSIG_TRANSFORM, DataType::Binary, || {
                Box::new(crate::transform::UnsupportedStage::new("xslt"))
            }),
        );

        Self { by_href: reg }
    }

    pub fn lookup(&self, href: &str, usage: Usage) -> Result<&TransformDescriptor, TransformError> {
        let descriptor = self
            .by_href
            .get(href)
            .ok_or_else(|| TransformError::UnknownAlgorithm { href: href.to_string() })?;
        if !descriptor.usage.intersects(usage) {
            return Err(TransformError::UsageNotPermitted { href: href.to_string() });
        }
        Ok(descriptor)
    }

    pub fn register(&mut self, descriptor: TransformDescriptor) {
        self.by_href.insert(descriptor.href, descriptor);
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_concrete_cipher_by_href() {
        let reg = TransformRegistry::with_defaults();
        let d = reg.lookup(HREF_AES128_CBC, Usage::ENCRYPTION_METHOD).unwrap();
        assert_eq!(d.name, "aes128-cbc");
    }

    #[test]
    fn unknown_href_is_an_error() {
        let reg = TransformRegistry::with_defaults();
        assert!(matches!(
            reg.lookup("urn:does-not-exist", Usage::BOTH),
            Err(TransformError::UnknownAlgorithm { .. })
        ));
    }

    #[test]
    fn usage_mismatch_is_rejected() {
        let reg = TransformRegistry::with_defaults();
        // XSLT is only a DSig transform, never an EncryptionMethod.
        let err = reg.lookup(HREF_XSLT, Usage::ENCRYPTION_METHOD).unwrap_err();
        assert!(matches!(err, TransformError::UsageNotPermitted { .. }));
    }
}
