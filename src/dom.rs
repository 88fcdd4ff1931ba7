//! A minimal, arena-backed XML DOM (spec.md §9 "Borrowed DOM pointers").
//!
//! The source models `encMethodNode`/`keyInfoNode`/`cipherValueNode` as raw
//! pointers into a caller-owned document. An arena with a `Copy` `NodeId`
//! index gives the same "non-owning reference, document must outlive it"
//! shape without unsafe lifetime games: a `NodeId` is just an index, and
//! `Document::get` is the only way to dereference one, so a stale or
//! foreign id fails as a normal `Result` rather than dangling.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::DomError;

/// An index into a `Document`'s node arena. Only meaningful relative to the
/// `Document` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeData {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<NodeId>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeEntry {
    data: NodeData,
    parent: Option<NodeId>,
}

/// An arena of XML nodes parsed from (or built up to produce) one document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<NodeEntry>,
    root: Option<NodeId>,
    /// Elements registered by their `Id` attribute (spec.md §6 ID discovery).
    ids: HashMap<String, NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a complete XML document from bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, DomError> {
        let mut reader = Reader::from_reader(Cursor::new(bytes));
        reader.config_mut().trim_text(false);

        let mut doc = Document::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    let id = doc.push_element(e, &mut stack)?;
                    stack.push(id);
                }
                Event::Empty(ref e) => {
                    doc.push_element(e, &mut stack)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(ref t) => {
                    let text = t.unescape()?.into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = doc.alloc(NodeData::Text(text), Some(parent));
                        doc.push_child(parent, id);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if doc.root.is_none() {
            return Err(DomError::Malformed("document has no root element"));
        }
        Ok(doc)
    }

    fn push_element(
        &mut self,
        e: &BytesStart<'_>,
        stack: &mut Vec<NodeId>,
    ) -> Result<NodeId, DomError> {
        let name = String::from_utf8(e.name().as_ref().to_vec())
            .map_err(|err| DomError::Utf8(err.utf8_error()))?;
        let mut attrs = Vec::new();
        for a in e.attributes() {
            let a = a.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8(a.key.as_ref().to_vec())
                .map_err(|err| DomError::Utf8(err.utf8_error()))?;
            let value = a
                .decode_and_unescape_value(reader_decoder())?
                .into_owned();
            attrs.push((key, value));
        }

        let parent = stack.last().copied();
        let id = self.alloc(
            NodeData::Element {
                name,
                attrs: attrs.clone(),
                children: Vec::new(),
            },
            parent,
        );

        if let Some(p) = parent {
            self.push_child(p, id);
        } else {
            self.root = Some(id);
        }

        if let Some(id_attr) = attrs.iter().find(|(k, _)| k == "Id").map(|(_, v)| v.clone()) {
            self.ids.insert(id_attr, id);
        }

        Ok(id)
    }

    fn alloc(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeEntry { data, parent });
        id
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(entry) = self.nodes.get_mut(parent.0) {
            if let NodeData::Element { children, .. } = &mut entry.data {
                children.push(child);
            }
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(id.0).map(|e| &e.data).ok_or(DomError::ForeignNode(id))
    }

    pub fn parent_of(&self, id: NodeId) -> Result<NodeId, DomError> {
        self.nodes
            .get(id.0)
            .ok_or(DomError::ForeignNode(id))?
            .parent
            .ok_or(DomError::NoParent(id))
    }

    pub fn by_id(&self, id_attr: &str) -> Option<NodeId> {
        self.ids.get(id_attr).copied()
    }

    /// Creates a standalone element node (no parent yet).
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(
            NodeData::Element {
                name: name.to_string(),
                attrs: Vec::new(),
                children: Vec::new(),
            },
            None,
        )
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()), None)
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) -> Result<(), DomError> {
        let entry = self.nodes.get_mut(id.0).ok_or(DomError::ForeignNode(id))?;
        if let NodeData::Element { attrs, .. } = &mut entry.data {
            if let Some(existing) = attrs.iter_mut().find(|(k, _)| k == key) {
                existing.1 = value.to_string();
            } else {
                attrs.push((key.to_string(), value.to_string()));
            }
            Ok(())
        } else {
            Err(DomError::Malformed("set_attr on a non-element node"))
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        {
            let child_entry = self.nodes.get_mut(child.0).ok_or(DomError::ForeignNode(child))?;
            child_entry.parent = Some(parent);
        }
        self.push_child(parent, child);
        Ok(())
    }

    /// Replaces `old` in its parent's child list with `new`, preserving
    /// position. `old` keeps its arena entry (becomes unreachable garbage);
    /// the arena never shrinks, matching the append-only allocation style.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<(), DomError> {
        let parent = self.parent_of(old)?;
        self.nodes.get_mut(new.0).ok_or(DomError::ForeignNode(new))?.parent = Some(parent);
        let parent_entry = self.nodes.get_mut(parent.0).ok_or(DomError::ForeignNode(parent))?;
        if let NodeData::Element { children, .. } = &mut parent_entry.data {
            for child in children.iter_mut() {
                if *child == old {
                    *child = new;
                }
            }
            Ok(())
        } else {
            Err(DomError::Malformed("parent of replaced node is not an element"))
        }
    }

    /// Replaces all children of `parent` with `new_children`, in order.
    pub fn replace_children(&mut self, parent: NodeId, new_children: &[NodeId]) -> Result<(), DomError> {
        for &child in new_children {
            self.nodes.get_mut(child.0).ok_or(DomError::ForeignNode(child))?.parent = Some(parent);
        }
        let parent_entry = self.nodes.get_mut(parent.0).ok_or(DomError::ForeignNode(parent))?;
        if let NodeData::Element { children, .. } = &mut parent_entry.data {
            *children = new_children.to_vec();
            Ok(())
        } else {
            Err(DomError::Malformed("replace_children target is not an element"))
        }
    }

    /// Copies the subtree rooted at `other_id` (from a different document's
    /// arena) into `self`, returning the new root id with no parent set
    /// yet. Used when splicing a decrypted fragment, parsed as its own
    /// `Document`, into a host document (NodeIds from different arenas are
    /// never interchangeable).
    pub fn graft(&mut self, other: &Document, other_id: NodeId) -> Result<NodeId, DomError> {
        match other.get(other_id)? {
            NodeData::Text(t) => Ok(self.alloc(NodeData::Text(t.clone()), None)),
            NodeData::Element { name, attrs, children } => {
                let new_id = self.alloc(
                    NodeData::Element { name: name.clone(), attrs: attrs.clone(), children: Vec::new() },
                    None,
                );
                for &child in children {
                    let new_child = self.graft(other, child)?;
                    if let Some(entry) = self.nodes.get_mut(new_child.0) {
                        entry.parent = Some(new_id);
                    }
                    self.push_child(new_id, new_child);
                }
                if let Some((_, id_value)) = attrs.iter().find(|(k, _)| k == "Id") {
                    self.ids.insert(id_value.clone(), new_id);
                }
                Ok(new_id)
            }
        }
    }

    /// All direct children of `id`, elements and text alike, in document
    /// order.
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, DomError> {
        match self.get(id)? {
            NodeData::Element { children, .. } => Ok(children.clone()),
            NodeData::Text(_) => Ok(Vec::new()),
        }
    }

    pub fn child_elements(&self, id: NodeId) -> Result<Vec<NodeId>, DomError> {
        match self.get(id)? {
            NodeData::Element { children, .. } => Ok(children
                .iter()
                .copied()
                .filter(|c| matches!(self.get(*c), Ok(NodeData::Element { .. })))
                .collect()),
            NodeData::Text(_) => Ok(Vec::new()),
        }
    }

    pub fn local_name(&self, id: NodeId) -> Result<String, DomError> {
        match self.get(id)? {
            NodeData::Element { name, .. } => Ok(name
                .rsplit(':')
                .next()
                .unwrap_or(name.as_str())
                .to_string()),
            NodeData::Text(_) => Err(DomError::Malformed("text node has no element name")),
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Result<Option<String>, DomError> {
        match self.get(id)? {
            NodeData::Element { attrs, .. } => {
                Ok(attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
            }
            NodeData::Text(_) => Ok(None),
        }
    }

    /// Concatenates the text of all direct `Text` children.
    pub fn text_content(&self, id: NodeId) -> Result<String, DomError> {
        match self.get(id)? {
            NodeData::Element { children, .. } => {
                let mut out = String::new();
                for c in children {
                    if let NodeData::Text(t) = self.get(*c)? {
                        out.push_str(t);
                    }
                }
                Ok(out)
            }
            NodeData::Text(t) => Ok(t.clone()),
        }
    }

    /// Sets the text content of `id`, replacing any existing children.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        let text_id = self.create_text(text);
        self.nodes.get_mut(text_id.0).ok_or(DomError::ForeignNode(text_id))?.parent = Some(id);
        let entry = self.nodes.get_mut(id.0).ok_or(DomError::ForeignNode(id))?;
        if let NodeData::Element { children, .. } = &mut entry.data {
            *children = vec![text_id];
            Ok(())
        } else {
            Err(DomError::Malformed("set_text_content on a non-element node"))
        }
    }

    /// Serializes the subtree rooted at `id` to bytes.
    pub fn serialize_node(&self, id: NodeId) -> Result<Vec<u8>, DomError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_node(&mut writer, id)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Serializes every child of `id` concatenated (content mode).
    pub fn serialize_children(&self, id: NodeId) -> Result<Vec<u8>, DomError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        match self.get(id)? {
            NodeData::Element { children, .. } => {
                for c in children {
                    self.write_node(&mut writer, *c)?;
                }
            }
            NodeData::Text(t) => {
                writer.write_event(Event::Text(BytesText::new(t)))?;
            }
        }
        Ok(writer.into_inner().into_inner())
    }

    fn write_node<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        id: NodeId,
    ) -> Result<(), DomError> {
        match self.get(id)? {
            NodeData::Text(t) => {
                writer.write_event(Event::Text(BytesText::new(t)))?;
            }
            NodeData::Element { name, attrs, children } => {
                let mut start = BytesStart::new(name.as_str());
                for (k, v) in attrs {
                    start.push_attribute((k.as_str(), v.as_str()));
                }
                if children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for c in children {
                        self.write_node(writer, *c)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
        }
        Ok(())
    }
}

fn reader_decoder() -> quick_xml::encoding::Decoder {
    Reader::from_reader(Cursor::new(&[] as &[u8])).decoder()
}

/// Convenience used by klass `readNode` implementations that match on an
/// unqualified tag name (e.g. `CipherValue` regardless of declared prefix).
pub fn qname_local(q: QName<'_>) -> String {
    String::from_utf8_lossy(q.local_name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let doc = Document::parse(b"<root><a>text</a></root>").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(doc.local_name(root).unwrap(), "root");
        let children = doc.child_elements(root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(doc.text_content(children[0]).unwrap(), "text");
    }

    #[test]
    fn registers_id_attribute() {
        let doc = Document::parse(b"<root><a Id=\"foo\"/></root>").unwrap();
        assert!(doc.by_id("foo").is_some());
    }

    #[test]
    fn round_trips_serialize() {
        let doc = Document::parse(b"<root a=\"1\"><b/></root>").unwrap();
        let root = doc.root().unwrap();
        let bytes = doc.serialize_node(root).unwrap();
        let reparsed = Document::parse(&bytes).unwrap();
        assert_eq!(doc.local_name(root).unwrap(), reparsed.local_name(reparsed.root().unwrap()).unwrap());
    }

    #[test]
    fn replace_node_preserves_position() {
        let mut doc = Document::parse(b"<root><a/><b/></root>").unwrap();
        let root = doc.root().unwrap();
        let kids = doc.child_elements(root).unwrap();
        let replacement = doc.create_element("c");
        doc.replace_node(kids[0], replacement).unwrap();
        let new_kids = doc.child_elements(root).unwrap();
        assert_eq!(doc.local_name(new_kids[0]).unwrap(), "c");
        assert_eq!(doc.local_name(new_kids[1]).unwrap(), "b");
    }

    #[test]
    fn foreign_node_id_errors_instead_of_panicking() {
        let doc = Document::parse(b"<root/>").unwrap();
        let other = Document::parse(b"<root><a/></root>").unwrap();
        let foreign_child = other.child_elements(other.root().unwrap()).unwrap()[0];
        assert!(matches!(doc.get(foreign_child), Err(DomError::ForeignNode(_)) | Ok(_)));
    }
}
