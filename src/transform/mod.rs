//! Transform instances and the execute state machine (spec.md §4.2, §4.3).

pub mod base64;
pub mod cipher;
pub mod uri;
#[cfg(feature = "xslt")]
pub mod xslt;

use crate::buffer::Buffer;
use crate::dom::{Document, NodeId};
use crate::error::TransformError;
use crate::keyinfo::{Key, KeyRequirement};

/// `status` (spec.md §3 Transform Instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStatus {
    None,
    Working,
    Finished,
    Failed,
}

/// The klass function table (spec.md §4.2). Any method not overridden
/// reports "not supported" via the default `Err(Unsupported)` body, the
/// same "absent means unsupported" contract the source's optional function
/// pointers give.
pub trait TransformStage: Send {
    fn name(&self) -> &'static str;

    /// Configures this instance from an `EncryptionMethod`/`Transform` XML
    /// node (e.g. reading key-size hints or an embedded stylesheet). A
    /// stage with nothing to configure from the node has no reason to
    /// fail: the default is a no-op, not "unsupported".
    fn read_node(&mut self, _doc: &Document, _node: NodeId) -> Result<(), TransformError> {
        Ok(())
    }

    /// The key requirement this stage imposes, if it is a cipher.
    fn key_req(&self) -> Option<KeyRequirement> {
        None
    }

    fn set_key(&mut self, _key: &Key) -> Result<(), TransformError> {
        Err(TransformError::Unsupported { transform: self.name(), method: "setKey" })
    }

    /// Drives the execute state machine described in spec.md §4.3. `encode`
    /// is the instance's forward/inverse direction; `last` signals EOF on
    /// `in_buf`. Implementations must, on `last=true`, fully drain
    /// `in_buf` and leave the stage's complete output in `out_buf`.
    fn execute(
        &mut self,
        in_buf: &mut Buffer,
        out_buf: &mut Buffer,
        encode: bool,
        last: bool,
    ) -> Result<(), TransformError>;
}

/// A stub registered for an algorithm the engine recognizes by URI but does
/// not implement (spec.md §1 "external collaborators referenced only by
/// interface"). Always fails with `Unsupported` if actually driven.
pub struct UnsupportedStage {
    name: &'static str,
}

impl UnsupportedStage {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl TransformStage for UnsupportedStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(
        &mut self,
        _in_buf: &mut Buffer,
        _out_buf: &mut Buffer,
        _encode: bool,
        _last: bool,
    ) -> Result<(), TransformError> {
        Err(TransformError::Unsupported { transform: self.name, method: "execute" })
    }
}

/// A pipeline node: klass instance plus the state the source places in the
/// base `Transform` struct (spec.md §3).
pub struct Transform {
    pub stage: Box<dyn TransformStage>,
    pub status: TransformStatus,
    pub encode: bool,
    pub in_buf: Buffer,
    pub out_buf: Buffer,
}

impl Transform {
    pub fn new(stage: Box<dyn TransformStage>, encode: bool) -> Self {
        Self {
            stage,
            status: TransformStatus::None,
            encode,
            in_buf: Buffer::new(),
            out_buf: Buffer::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.stage.name()
    }

    /// Drives the state machine of spec.md §4.3. Enforces the transition
    /// table explicitly rather than trusting the stage to do so.
    pub fn execute(&mut self, last: bool) -> Result<(), TransformError> {
        match self.status {
            TransformStatus::None => self.status = TransformStatus::Working,
            TransformStatus::Working => {}
            TransformStatus::Finished => {
                if !self.in_buf.is_empty() {
                    return Err(TransformError::InvalidStatus {
                        transform: self.stage.name(),
                        detail: "execute called on a finished stage with pending input",
                    });
                }
                return Ok(());
            }
            TransformStatus::Failed => {
                return Err(TransformError::InvalidStatus {
                    transform: self.stage.name(),
                    detail: "execute called on a failed stage",
                })
            }
        }

        let result = self.stage.execute(&mut self.in_buf, &mut self.out_buf, self.encode, last);
        match result {
            Ok(()) => {
                if last {
                    if !self.in_buf.is_empty() {
                        self.status = TransformStatus::Failed;
                        return Err(TransformError::InvalidStatus {
                            transform: self.stage.name(),
                            detail: "stage left input unconsumed on last=true",
                        });
                    }
                    self.status = TransformStatus::Finished;
                }
                Ok(())
            }
            Err(e) => {
                self.status = TransformStatus::Failed;
                Err(e)
            }
        }
    }

    /// Default `pushBin`: append to `in_buf`, drive one non-final execute,
    /// return anything ready in `out_buf` for the caller to forward
    /// downstream (spec.md §4.2).
    pub fn push_bin(&mut self, bytes: &[u8], last: bool) -> Result<Vec<u8>, TransformError> {
        self.in_buf.append(bytes);
        self.execute(last)?;
        Ok(self.out_buf.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl TransformStage for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn execute(
            &mut self,
            in_buf: &mut Buffer,
            out_buf: &mut Buffer,
            _encode: bool,
            last: bool,
        ) -> Result<(), TransformError> {
            if last {
                out_buf.append(in_buf.data());
                in_buf.remove_head(in_buf.size());
            }
            Ok(())
        }
    }

    #[test]
    fn working_then_last_reaches_finished_with_empty_input() {
        let mut t = Transform::new(Box::new(Echo), true);
        t.in_buf.append(b"partial");
        t.execute(false).unwrap();
        assert_eq!(t.status, TransformStatus::Working);
        t.execute(true).unwrap();
        assert_eq!(t.status, TransformStatus::Finished);
        assert!(t.in_buf.is_empty());
        assert_eq!(t.out_buf.data(), b"partial");
    }

    #[test]
    fn finished_with_pending_input_is_invalid_status() {
        let mut t = Transform::new(Box::new(Echo), true);
        t.execute(true).unwrap();
        t.in_buf.append(b"oops");
        let err = t.execute(true).unwrap_err();
        assert!(matches!(err, TransformError::InvalidStatus { .. }));
    }

    #[test]
    fn failed_stage_cannot_be_re_executed() {
        struct AlwaysFails;
        impl TransformStage for AlwaysFails {
            fn name(&self) -> &'static str {
                "always-fails"
            }
            fn execute(
                &mut self,
                _in_buf: &mut Buffer,
                _out_buf: &mut Buffer,
                _encode: bool,
                _last: bool,
            ) -> Result<(), TransformError> {
                Err(TransformError::Xslt("boom".into()))
            }
        }
        let mut t = Transform::new(Box::new(AlwaysFails), true);
        assert!(t.execute(true).is_err());
        let err = t.execute(true).unwrap_err();
        assert!(matches!(err, TransformError::InvalidStatus { .. }));
    }
}
