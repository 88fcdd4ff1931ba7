//! The encryption context (spec.md §3 "Encryption Context", §4.6).

use tracing::{debug, instrument};

use crate::context::TransformContext;
use crate::dom::{Document, NodeId};
use crate::error::XmlEncError;
use crate::keyinfo::{
    key_info_node_read, key_info_node_write, key_match, Key, KeyInfoReadContext,
    KeyInfoWriteContext, KeyManager,
};
use crate::klass::{DataType, TransformRegistry, Usage};

/// `mode` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    EncryptedData,
    EncryptedKey,
}

/// The `Type` attribute (spec.md §4.6.1 step 1, §4.6.3 `XmlEncrypt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionType {
    Element,
    Content,
    Mime(String),
}

impl EncryptionType {
    fn parse(raw: &str) -> Self {
        match raw {
            "http://www.w3.org/2001/04/xmlenc#Element" => EncryptionType::Element,
            "http://www.w3.org/2001/04/xmlenc#Content" => EncryptionType::Content,
            other => EncryptionType::Mime(other.to_string()),
        }
    }
}

/// Ownership of `encMethod`: whether this context must tear it down
/// (spec.md §9 "Ownership flag for encMethod" design note).
enum EncMethodOwnership {
    ContextOwned,
    CallerOwned,
}

/// Template-derived attributes plus borrowed node references
/// (spec.md §3 "Encryption Context").
pub struct EncryptionContext<'a> {
    registry: &'a TransformRegistry,
    key_manager: Option<&'a dyn KeyManager>,

    mode: Mode,
    encrypt: bool,

    id: Option<String>,
    enc_type: Option<EncryptionType>,
    mime_type: Option<String>,
    encoding: Option<String>,
    recipient: Option<String>,
    carried_key_name: Option<String>,

    enc_method_node: Option<NodeId>,
    key_info_node: Option<NodeId>,
    cipher_value_node: Option<NodeId>,

    enc_key: Option<Key>,
    enc_method_ownership: EncMethodOwnership,

    key_info_read_ctx: KeyInfoReadContext,
    key_info_write_ctx: KeyInfoWriteContext,

    enc_transform_ctx: Option<TransformContext>,
    enc_result: Option<Vec<u8>>,

    replaced: bool,
    result_base64_encoded: bool,
}

impl<'a> EncryptionContext<'a> {
    pub fn new(registry: &'a TransformRegistry, mode: Mode) -> Self {
        Self {
            registry,
            key_manager: None,
            mode,
            encrypt: false,
            id: None,
            enc_type: None,
            mime_type: None,
            encoding: None,
            recipient: None,
            carried_key_name: None,
            enc_method_node: None,
            key_info_node: None,
            cipher_value_node: None,
            enc_key: None,
            enc_method_ownership: EncMethodOwnership::ContextOwned,
            key_info_read_ctx: KeyInfoReadContext::default(),
            key_info_write_ctx: KeyInfoWriteContext::default(),
            enc_transform_ctx: None,
            enc_result: None,
            replaced: false,
            result_base64_encoded: false,
        }
    }

    pub fn with_key_manager(mut self, key_manager: &'a dyn KeyManager) -> Self {
        self.key_manager = Some(key_manager);
        self
    }

    /// Presets the key, bypassing key-manager resolution.
    pub fn with_key(mut self, key: Key) -> Self {
        self.enc_key = Some(key);
        self
    }

    pub fn replaced(&self) -> bool {
        self.replaced
    }

    fn usage_for_mode(&self) -> Usage {
        Usage::ENCRYPTION_METHOD
    }

    fn require_fresh(&self) -> Result<(), XmlEncError> {
        if self.enc_result.is_some() {
            return Err(XmlEncError::InvalidStatus(
                "context already produced a result; single-use per spec.md §3",
            ));
        }
        Ok(())
    }

    /// `encDataNodeRead` (spec.md §4.6.1).
    #[instrument(skip(self, doc))]
    fn enc_data_node_read(&mut self, doc: &Document, node: NodeId) -> Result<(), XmlEncError> {
        self.id = doc.attr(node, "Id")?;
        if let Some(raw_type) = doc.attr(node, "Type")? {
            self.enc_type = Some(EncryptionType::parse(&raw_type));
        }
        self.mime_type = doc.attr(node, "MimeType")?;
        self.encoding = doc.attr(node, "Encoding")?;
        if matches!(self.mode, Mode::EncryptedKey) {
            self.recipient = doc.attr(node, "Recipient")?;
        }

        let mut cipher_data_seen = false;
        for child in doc.child_elements(node)? {
            let name = doc.local_name(child)?;
            match name.as_str() {
                "EncryptionMethod" => self.enc_method_node = Some(child),
                "KeyInfo" => self.key_info_node = Some(child),
                "CipherData" => {
                    if cipher_data_seen {
                        return Err(XmlEncError::UnexpectedNode {
                            parent: "EncryptedData",
                            found: "CipherData".to_string(),
                        });
                    }
                    cipher_data_seen = true;
                    self.cipher_data_node_read(doc, child)?;
                }
                "EncryptionProperties" => {}
                "ReferenceList" if matches!(self.mode, Mode::EncryptedKey) => {}
                "CarriedKeyName" if matches!(self.mode, Mode::EncryptedKey) => {
                    self.carried_key_name = Some(doc.text_content(child)?);
                }
                other => {
                    return Err(XmlEncError::UnexpectedNode {
                        parent: "EncryptedData",
                        found: other.to_string(),
                    })
                }
            }
        }

        if !cipher_data_seen {
            return Err(XmlEncError::InvalidNode {
                parent: "EncryptedData",
                expected: "CipherData",
            });
        }

        self.wire_encryption_method(doc)?;
        Ok(())
    }

    /// `CipherData parse` (spec.md §4.6.2).
    fn cipher_data_node_read(&mut self, doc: &Document, cipher_data: NodeId) -> Result<(), XmlEncError> {
        let children = doc.child_elements(cipher_data)?;
        let first = children
            .first()
            .copied()
            .ok_or(XmlEncError::InvalidNode { parent: "CipherData", expected: "CipherValue" })?;
        let name = doc.local_name(first)?;

        match name.as_str() {
            "CipherValue" => {
                self.cipher_value_node = Some(first);
                if !self.encrypt {
                    self.ensure_chain().create_and_prepend(
                        self.registry,
                        crate::klass::HREF_BASE64,
                        Usage::BOTH,
                    )?;
                }
            }
            "CipherReference" => {
                if self.encrypt {
                    return Err(XmlEncError::InvalidData(
                        "CipherReference is not valid on an encrypt path",
                    ));
                }
                if let Some(uri) = doc.attr(first, "URI")? {
                    self.ensure_chain().set_uri(&uri)?;
                }
                for transforms_child in doc.child_elements(first)? {
                    if doc.local_name(transforms_child)? == "Transforms" {
                        self.ensure_chain().nodes_list_read(self.registry, doc, transforms_child)?;
                    }
                }
            }
            other => {
                return Err(XmlEncError::UnexpectedNode {
                    parent: "CipherData",
                    found: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn ensure_chain(&mut self) -> &mut TransformContext {
        self.enc_transform_ctx.get_or_insert_with(|| TransformContext::new(self.encrypt))
    }

    /// The remainder of §4.6.1: wiring the cipher, resolving and checking
    /// the key, and auto-inserting the base64 encoder on the encrypt path.
    fn wire_encryption_method(&mut self, doc: &Document) -> Result<(), XmlEncError> {
        let usage = self.usage_for_mode();

        if self.enc_key.is_some() {
            self.enc_method_ownership = EncMethodOwnership::CallerOwned;
        }

        if let Some(enc_method_node) = self.enc_method_node {
            self.ensure_chain().node_read(self.registry, doc, enc_method_node, usage)?;
        } else {
            return Err(XmlEncError::InvalidData("no EncryptionMethod supplied or found"));
        }

        let key_req = {
            let chain = self.ensure_chain();
            chain
                .chain_mut()
                .iter()
                .find(|t| t.name() == "cipher")
                .and_then(|t| t.stage.key_req())
        };

        if self.enc_key.is_none() {
            if let Some(key_info_node) = self.key_info_node {
                self.key_info_read_ctx = key_info_node_read(doc, key_info_node)?;
                if let Some(manager) = self.key_manager {
                    self.enc_key = manager.get_key(&self.key_info_read_ctx);
                }
            }
        }

        let key = self
            .enc_key
            .clone()
            .ok_or_else(|| XmlEncError::KeyNotFound { requirement: format_key_req(key_req) })?;

        if let Some(req) = key_req {
            if !key_match(&key, &req) {
                return Err(XmlEncError::KeyNotFound { requirement: format_key_req(Some(req)) });
            }
        }

        if let Some(cipher_transform) = self
            .ensure_chain()
            .chain_mut()
            .iter_mut()
            .find(|t| t.name() == "cipher")
        {
            cipher_transform.stage.set_key(&key)?;
        }

        if self.encrypt && self.cipher_value_node.is_some() {
            self.ensure_chain().create_and_append(
                self.registry,
                crate::klass::HREF_BASE64,
                Usage::BOTH,
            )?;
            self.result_base64_encoded = true;
        }

        Ok(())
    }

    /// **BinaryEncrypt** (spec.md §4.6.3).
    #[instrument(skip(self, doc, data))]
    pub fn binary_encrypt(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        data: &[u8],
    ) -> Result<(), XmlEncError> {
        self.require_fresh()?;
        self.encrypt = true;
        self.enc_data_node_read(doc, node)?;
        self.ensure_chain().binary_execute(data)?;
        self.enc_result = Some(self.ensure_chain().result().into_vec());
        self.cipher_data_node_write(doc)?;
        debug!("binary_encrypt completed");
        Ok(())
    }

    /// **XmlEncrypt** (spec.md §4.6.3).
    pub fn xml_encrypt(
        &mut self,
        doc: &mut Document,
        template: NodeId,
        target: NodeId,
    ) -> Result<(), XmlEncError> {
        self.require_fresh()?;
        self.encrypt = true;
        self.enc_data_node_read(doc, template)?;
        self.ensure_chain().prepare(DataType::Binary)?;

        let enc_type = self
            .enc_type
            .clone()
            .ok_or_else(|| XmlEncError::InvalidType("no Type attribute set".to_string()))?;

        let plaintext = match enc_type {
            EncryptionType::Element => doc.serialize_node(target)?,
            EncryptionType::Content => doc.serialize_children(target)?,
            EncryptionType::Mime(m) => return Err(XmlEncError::InvalidType(m)),
        };

        self.ensure_chain().binary_execute(&plaintext)?;
        self.enc_result = Some(self.ensure_chain().result().into_vec());
        self.cipher_data_node_write(doc)?;

        match &self.enc_type {
            Some(EncryptionType::Element) => doc.replace_node(target, template)?,
            Some(EncryptionType::Content) => doc.replace_children(target, &[template])?,
            _ => unreachable!("checked above"),
        }
        self.replaced = true;

        Ok(())
    }

    /// **UriEncrypt** (spec.md §4.6.3).
    pub fn uri_encrypt(
        &mut self,
        doc: &mut Document,
        template: NodeId,
        uri: &str,
    ) -> Result<(), XmlEncError> {
        self.require_fresh()?;
        self.encrypt = true;
        self.ensure_chain().set_uri(uri)?;
        self.enc_data_node_read(doc, template)?;
        self.ensure_chain().execute()?;
        self.enc_result = Some(self.ensure_chain().result().into_vec());
        self.cipher_data_node_write(doc)?;
        Ok(())
    }

    /// **DecryptToBuffer** (spec.md §4.6.3).
    pub fn decrypt_to_buffer(&mut self, doc: &Document, node: NodeId) -> Result<Vec<u8>, XmlEncError> {
        self.require_fresh()?;
        self.encrypt = false;
        self.enc_data_node_read(doc, node)?;

        if let Some(cipher_value_node) = self.cipher_value_node {
            let text = doc.text_content(cipher_value_node)?;
            self.ensure_chain().binary_execute(text.as_bytes())?;
        } else {
            self.ensure_chain().execute()?;
        }

        let result = self.ensure_chain().result().into_vec();
        self.enc_result = Some(result.clone());
        Ok(result)
    }

    /// **Decrypt** (spec.md §4.6.3): as `DecryptToBuffer`, then replace the
    /// original node with the decrypted content parsed back into DOM
    /// nodes, for `Element`/`Content` types.
    pub fn decrypt(&mut self, doc: &mut Document, node: NodeId) -> Result<Vec<u8>, XmlEncError> {
        let result = self.decrypt_to_buffer(doc, node)?;

        match &self.enc_type {
            Some(EncryptionType::Element) => {
                let fragment_doc = Document::parse(&result)?;
                let fragment_root = fragment_doc
                    .root()
                    .ok_or(XmlEncError::InvalidData("decrypted Element payload has no root"))?;
                let grafted = doc.graft(&fragment_doc, fragment_root)?;
                doc.replace_node(node, grafted)?;
                self.replaced = true;
            }
            Some(EncryptionType::Content) => {
                // Content has no single root of its own, so it is parsed
                // under a throwaway wrapper and only the wrapper's
                // children are spliced back in, directly as `node`'s
                // children.
                let wrapped = [b"<_>".as_slice(), &result, b"</_>"].concat();
                let fragment_doc = Document::parse(&wrapped)?;
                let wrapper = fragment_doc
                    .root()
                    .ok_or(XmlEncError::InvalidData("decrypted Content payload has no root"))?;
                let mut grafted_children = Vec::new();
                for child in fragment_doc.children(wrapper)? {
                    grafted_children.push(doc.graft(&fragment_doc, child)?);
                }
                doc.replace_children(node, &grafted_children)?;
                self.replaced = true;
            }
            Some(EncryptionType::Mime(_)) | None => {}
        }

        Ok(result)
    }

    /// `cipherDataNodeWrite` (spec.md §4.6.4).
    fn cipher_data_node_write(&mut self, doc: &mut Document) -> Result<(), XmlEncError> {
        if let Some(cipher_value_node) = self.cipher_value_node {
            let result = self.enc_result.clone().unwrap_or_default();
            let text = String::from_utf8(result)
                .map_err(|_| XmlEncError::InvalidData("cipher result is not valid UTF-8 for CipherValue"))?;
            doc.set_text_content(cipher_value_node, &text)?;
        }
        if let Some(key_info_node) = self.key_info_node {
            if self.enc_key.is_some() {
                self.key_info_write_ctx.key_name = self.carried_key_name.clone();
                key_info_node_write(doc, key_info_node, &self.key_info_write_ctx)?;
            }
        }
        self.replaced = true;
        Ok(())
    }
}

fn format_key_req(req: Option<crate::keyinfo::KeyRequirement>) -> String {
    match req {
        Some(r) => format!("{} bits", r.bits),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyinfo::SimpleKeyManager;

    fn aes128_template() -> Document {
        Document::parse(
            b"<EncryptedData>\
                <EncryptionMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#aes128-cbc\"/>\
                <CipherData><CipherValue/></CipherData>\
              </EncryptedData>",
        )
        .unwrap()
    }

    #[test]
    fn binary_encrypt_then_decrypt_round_trips() {
        let registry = TransformRegistry::with_defaults();
        let key = Key::new(vec![0u8; 16]);

        let mut doc = aes128_template();
        let root = doc.root().unwrap();
        {
            let mut ctx = EncryptionContext::new(&registry, Mode::EncryptedData).with_key(key.clone());
            ctx.binary_encrypt(&mut doc, root, b"Hello, World!").unwrap();
            assert!(ctx.replaced());
        }

        let mut ctx2 = EncryptionContext::new(&registry, Mode::EncryptedData).with_key(key);
        let plaintext = ctx2.decrypt_to_buffer(&doc, root).unwrap();
        assert_eq!(plaintext, b"Hello, World!");
    }

    #[test]
    fn missing_cipher_data_is_invalid_node() {
        let registry = TransformRegistry::with_defaults();
        let mut doc = Document::parse(
            b"<EncryptedData><EncryptionMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#aes128-cbc\"/></EncryptedData>",
        )
        .unwrap();
        let root = doc.root().unwrap();
        let mut ctx =
            EncryptionContext::new(&registry, Mode::EncryptedData).with_key(Key::new(vec![0u8; 16]));
        let err = ctx.binary_encrypt(&mut doc, root, b"data").unwrap_err();
        assert!(matches!(err, XmlEncError::InvalidNode { expected: "CipherData", .. }));
    }

    #[test]
    fn missing_key_is_key_not_found() {
        let registry = TransformRegistry::with_defaults();
        let manager = SimpleKeyManager::new();
        let mut doc = aes128_template();
        let root = doc.root().unwrap();
        let mut ctx =
            EncryptionContext::new(&registry, Mode::EncryptedData).with_key_manager(&manager);
        let err = ctx.binary_encrypt(&mut doc, root, b"data").unwrap_err();
        assert!(matches!(err, XmlEncError::KeyNotFound { .. }));
    }

    #[test]
    fn single_use_rejects_a_second_operation() {
        let registry = TransformRegistry::with_defaults();
        let key = Key::new(vec![0u8; 16]);
        let mut doc = aes128_template();
        let root = doc.root().unwrap();
        let mut ctx = EncryptionContext::new(&registry, Mode::EncryptedData).with_key(key);
        ctx.binary_encrypt(&mut doc, root, b"data").unwrap();
        let err = ctx.binary_encrypt(&mut doc, root, b"more").unwrap_err();
        assert!(matches!(err, XmlEncError::InvalidStatus(_)));
    }
}
