//! Error types that this crate can return

use thiserror::Error;

/// Errors while performing cryptographic operations (cipher construction,
/// key sizing, padding). Mirrors the shape of a primitive-implementation
/// error without baking in a particular algorithm choice.
#[derive(Debug, Error)]
pub enum CryptographyError {
    #[error(transparent)]
    InvalidLength(#[from] cipher::InvalidLength),

    #[error(transparent)]
    Unpadding(#[from] cipher::block_padding::UnpadError),

    #[error(transparent)]
    Padding(#[from] cipher::inout::PadError),

    #[error(transparent)]
    Random(#[from] getrandom::Error),
}

/// Errors touching the internal XML DOM arena (see `crate::dom`).
#[derive(Debug, Error)]
pub enum DomError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed document: {0}")]
    Malformed(&'static str),

    #[error("node {0:?} does not belong to this document")]
    ForeignNode(crate::dom::NodeId),

    #[error("node {0:?} has no parent")]
    NoParent(crate::dom::NodeId),
}

/// Errors raised by a single transform stage (spec.md §4.2/§4.3).
#[derive(Debug, Error)]
pub enum TransformError {
    /// A call sequence violated the execute state machine.
    #[error("invalid status for transform '{transform}': {detail}")]
    InvalidStatus {
        transform: &'static str,
        detail: &'static str,
    },

    /// The klass does not implement the requested optional method.
    #[error("transform '{transform}' does not support '{method}'")]
    Unsupported {
        transform: &'static str,
        method: &'static str,
    },

    #[error(transparent)]
    Cryptography(#[from] CryptographyError),

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error("XSLT stylesheet compile/apply failure: {0}")]
    Xslt(String),

    #[error("base64 decode failure: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    /// A node existed but a required attribute was missing or malformed.
    #[error("invalid content in node '{node}': {detail}")]
    InvalidNodeContent { node: &'static str, detail: &'static str },

    /// No registered klass matches an `EncryptionMethod`/`Transform` href.
    #[error("no transform registered for algorithm '{href}'")]
    UnknownAlgorithm { href: String },

    /// A klass was found by href but is not allowed in this usage context
    /// (e.g. a DSig-only transform used as an `EncryptionMethod`).
    #[error("transform '{href}' is not permitted for this usage")]
    UsageNotPermitted { href: String },
}

/// The top-level error returned by `EncryptionContext` operations
/// (spec.md §7). Every structural variant names the node or stage it
/// concerns, per the "structured annotations" requirement.
#[derive(Debug, Error)]
pub enum XmlEncError {
    #[error(transparent)]
    Cryptography(#[from] CryptographyError),

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    /// A required child element was missing from a template.
    #[error("invalid node: expected '{expected}' under '{parent}'")]
    InvalidNode {
        parent: &'static str,
        expected: &'static str,
    },

    /// A sibling appeared where the template grammar does not allow one.
    #[error("unexpected node '{found}' under '{parent}'")]
    UnexpectedNode { parent: &'static str, found: String },

    /// A node existed but its content did not parse (bad attribute, etc).
    #[error("invalid content in node '{node}': {detail}")]
    InvalidNodeContent { node: &'static str, detail: String },

    /// Preconditions not met: missing EncryptionMethod, missing CipherData,
    /// a CipherReference seen on an encrypt path, etc.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// `Type` attribute names something other than `Element`/`Content`.
    #[error("invalid type attribute: {0}")]
    InvalidType(String),

    /// A top-level operation was attempted on a context in the wrong state,
    /// e.g. re-use of a context whose result slot is already populated.
    #[error("invalid status: {0}")]
    InvalidStatus(&'static str),

    /// No key satisfied the cipher's requirements (spec.md §8 scenario 4).
    #[error("key not found for algorithm requiring {requirement}")]
    KeyNotFound { requirement: String },

    /// URI policy rejected the reference, or the fetch collaborator failed.
    #[error("invalid URI '{0}'")]
    InvalidUri(String),
}
