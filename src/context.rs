//! The transform chain (spec.md §3 "Transform Context", §4.5).

use tracing::{debug, trace};

use crate::buffer::Buffer;
use crate::dom::{Document, NodeId};
use crate::error::TransformError;
use crate::klass::{DataType, TransformRegistry, Usage};
use crate::transform::uri::{classify_uri, FileUriFetcher, UriKind, UriSourceStage};
use crate::transform::{Transform, TransformStage};

/// Owns the ordered chain of transforms and drives it end to end
/// (spec.md §4.5). `encode` mirrors the owning `EncryptionContext`'s
/// direction and is applied to every transform appended to the chain.
pub struct TransformContext {
    chain: Vec<Transform>,
    uri: Option<String>,
    encode: bool,
}

impl TransformContext {
    pub fn new(encode: bool) -> Self {
        Self { chain: Vec::new(), uri: None, encode }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn append(&mut self, stage: Box<dyn TransformStage>) {
        trace!(transform = stage.name(), "appending transform to chain");
        self.chain.push(Transform::new(stage, self.encode));
    }

    pub fn prepend(&mut self, stage: Box<dyn TransformStage>) {
        trace!(transform = stage.name(), "prepending transform to chain");
        self.chain.insert(0, Transform::new(stage, self.encode));
    }

    pub fn create_and_append(
        &mut self,
        registry: &TransformRegistry,
        href: &str,
        usage: Usage,
    ) -> Result<(), TransformError> {
        let descriptor = registry.lookup(href, usage)?;
        self.append(descriptor.instantiate());
        Ok(())
    }

    pub fn create_and_prepend(
        &mut self,
        registry: &TransformRegistry,
        href: &str,
        usage: Usage,
    ) -> Result<(), TransformError> {
        let descriptor = registry.lookup(href, usage)?;
        self.prepend(descriptor.instantiate());
        Ok(())
    }

    /// `nodeRead`: instantiate a transform from an `EncryptionMethod` or
    /// `Transform` element by its `Algorithm`/`Algorithm` href, enforcing
    /// `usage` (spec.md §4.5).
    pub fn node_read(
        &mut self,
        registry: &TransformRegistry,
        doc: &Document,
        node: NodeId,
        usage: Usage,
    ) -> Result<(), TransformError> {
        let href = doc
            .attr(node, "Algorithm")
            .map_err(TransformError::from)?
            .ok_or(TransformError::InvalidNodeContent {
                node: "transform",
                detail: "missing Algorithm attribute",
            })?;
        let descriptor = registry.lookup(&href, usage)?;
        let mut stage = descriptor.instantiate();
        stage.read_node(doc, node)?;
        self.append(stage);
        Ok(())
    }

    /// `nodesListRead`: read a sequence of `Transform` children (spec.md
    /// §4.5).
    pub fn nodes_list_read(
        &mut self,
        registry: &TransformRegistry,
        doc: &Document,
        transforms_node: NodeId,
    ) -> Result<(), TransformError> {
        for child in doc.child_elements(transforms_node).map_err(TransformError::from)? {
            if doc.local_name(child).map_err(TransformError::from)? == "Transform" {
                self.node_read(registry, doc, child, Usage::DSIG_TRANSFORM)?;
            }
        }
        Ok(())
    }

    /// `setUri`: classify and install the appropriate source transform at
    /// the head of the chain (spec.md §4.5).
    pub fn set_uri(&mut self, uri: &str) -> Result<(), TransformError> {
        match classify_uri(uri) {
            UriKind::SameDocument | UriKind::Fragment(_) => {
                self.uri = Some(uri.to_string());
            }
            UriKind::External(full) => {
                self.prepend(Box::new(UriSourceStage::new(Box::new(FileUriFetcher), full.clone())));
                self.uri = Some(full);
            }
        }
        Ok(())
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// `prepare(dataType)`: nothing to materialize lazily here (every
    /// stage is already a concrete `Transform`); this exists to assert the
    /// chain is non-empty and matches the data type, mirroring the
    /// precondition check spec.md assigns to this step.
    pub fn prepare(&self, data_type: DataType) -> Result<(), TransformError> {
        if self.chain.is_empty() {
            return Err(TransformError::InvalidStatus {
                transform: "chain",
                detail: "prepare called on an empty chain",
            });
        }
        let _ = data_type;
        Ok(())
    }

    /// `execute`: drive the chain from source to sink in chain order
    /// (spec.md §4.5 "Orderings"), using `popBin`-equivalent plumbing: each
    /// stage runs a full single-shot pass over whatever its predecessor
    /// produced.
    pub fn execute(&mut self) -> Result<(), TransformError> {
        debug!(stages = self.chain.len(), "executing transform chain");
        self.flow()
    }

    /// `binaryExecute(data, n)`: push bytes into the source (first) stage,
    /// then signal EOF.
    pub fn binary_execute(&mut self, data: &[u8]) -> Result<(), TransformError> {
        if let Some(first) = self.chain.first_mut() {
            first.in_buf.append(data);
        }
        self.execute()
    }

    /// Runs the first stage on whatever was pushed into it, then threads
    /// each stage's complete output into the next stage's input and runs
    /// that stage, in chain order.
    fn flow(&mut self) -> Result<(), TransformError> {
        let Some(first) = self.chain.first_mut() else { return Ok(()) };
        first.execute(true)?;
        let mut carry = first.out_buf.take();

        for transform in self.chain.iter_mut().skip(1) {
            transform.in_buf.append(&carry);
            transform.execute(true)?;
            carry = transform.out_buf.take();
        }

        if let Some(last) = self.chain.last_mut() {
            last.out_buf.set_data(&carry);
        }
        Ok(())
    }

    /// The chain's result: the tail transform's `outBuf` (spec.md §3
    /// "result buffer aliased to the tail transform's outBuf").
    pub fn result(&self) -> Buffer {
        self.chain.last().map(|t| t.out_buf.clone()).unwrap_or_default()
    }

    pub fn chain_mut(&mut self) -> &mut Vec<Transform> {
        &mut self.chain
    }

    pub fn first_mut(&mut self) -> Option<&mut Transform> {
        self.chain.first_mut()
    }

    pub fn last_mut(&mut self) -> Option<&mut Transform> {
        self.chain.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyinfo::Key;
    use crate::klass::HREF_AES128_CBC;

    #[test]
    fn binary_execute_through_cipher_and_base64() {
        let registry = TransformRegistry::with_defaults();

        let mut encrypt_ctx = TransformContext::new(true);
        encrypt_ctx.create_and_append(&registry, HREF_AES128_CBC, Usage::ENCRYPTION_METHOD).unwrap();
        if let Some(cipher_stage) = encrypt_ctx.first_mut() {
            cipher_stage.stage.set_key(&Key::new(vec![0u8; 16])).unwrap();
        }
        encrypt_ctx.create_and_append(&registry, crate::klass::HREF_BASE64, Usage::BOTH).unwrap();
        encrypt_ctx.binary_execute(b"Hello, World!").unwrap();
        let encoded = encrypt_ctx.result().into_vec();
        assert!(!encoded.is_empty());

        let mut decrypt_ctx = TransformContext::new(false);
        decrypt_ctx.create_and_append(&registry, crate::klass::HREF_BASE64, Usage::BOTH).unwrap();
        decrypt_ctx.create_and_append(&registry, HREF_AES128_CBC, Usage::ENCRYPTION_METHOD).unwrap();
        if let Some(cipher_stage) = decrypt_ctx.last_mut() {
            cipher_stage.stage.set_key(&Key::new(vec![0u8; 16])).unwrap();
        }
        decrypt_ctx.binary_execute(&encoded).unwrap();
        assert_eq!(decrypt_ctx.result().data(), b"Hello, World!");
    }

    #[test]
    fn set_uri_external_installs_source_stage() {
        let mut ctx = TransformContext::new(false);
        ctx.set_uri("file:///tmp/does-not-matter").unwrap();
        assert_eq!(ctx.uri(), Some("file:///tmp/does-not-matter"));
    }

    #[test]
    fn prepare_rejects_empty_chain() {
        let ctx = TransformContext::new(true);
        assert!(ctx.prepare(DataType::Binary).is_err());
    }
}
