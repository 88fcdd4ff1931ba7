//! XML Encryption (W3C XMLENC) engine: parses `EncryptedData`/`EncryptedKey`
//! templates, drives a transform chain over the plaintext or ciphertext,
//! and performs the corresponding DOM replacement.

pub mod buffer;
pub mod context;
pub(crate) mod crypt;
pub mod dom;
pub mod encryption;
pub mod error;
pub mod keyinfo;
pub mod klass;
pub mod transform;

pub use buffer::Buffer;
pub use context::TransformContext;
pub use dom::{Document, NodeId};
pub use encryption::{EncryptionContext, EncryptionType, Mode};
pub use error::{CryptographyError, DomError, TransformError, XmlEncError};
pub use keyinfo::{Key, KeyManager, KeyRequirement, SimpleKeyManager};
pub use klass::{TransformDescriptor, TransformRegistry, Usage};
