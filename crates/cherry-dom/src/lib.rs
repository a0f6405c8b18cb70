//! # Cherry DOM
//!
//! The DOM tree the Cherry event registry runs against.
//!
//! ## Design Goals
//!
//! 1. **Node identity**: nodes are shared as `Rc<Node>` and compared with `Rc::ptr_eq`
//! 2. **Fixtures from HTML**: html5ever builds trees for tests and demos
//! 3. **Selector queries**: first-match and all-match lookup with simple CSS selectors
//! 4. **Mutation support**: node insertion, removal, attribute modification
//! 5. **Event dispatch**: native listeners with capture/bubble phases, ending at the window

pub mod events;
pub mod selector;

pub use events::{
    AddEventListenerOptions, CustomEventData, DomEvent, Event, EventDispatcher, EventId,
    EventListenerCallback, EventPhase, EventTarget, FocusEventData, KeyboardEventData, ListenerId,
    MouseEventData,
};
pub use selector::SelectorList;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur in DOM operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Node not found")]
    NodeNotFound,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Unique identifier for a DOM node within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Create a new NodeId.
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> usize {
        self.0
    }
}

/// Type of DOM node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeType {
    /// The global object events end their propagation path at.
    Window,
    Document,
    DocumentType {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element {
        tag_name: String,
        namespace: String,
    },
    Text(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

/// A DOM node.
#[derive(Debug)]
pub struct Node {
    /// Unique ID for this node.
    pub id: NodeId,
    /// Node type and associated data.
    pub node_type: NodeType,
    /// Element attributes. Always empty for non-elements.
    attributes: RefCell<HashMap<String, String>>,
    /// Parent node (weak reference to avoid cycles).
    parent: RefCell<Option<Weak<Node>>>,
    /// Child nodes.
    children: RefCell<Vec<Rc<Node>>>,
    /// Owning window, set on document nodes only.
    window: RefCell<Option<Weak<Node>>>,
    /// Event target mixin for event handling.
    pub event_target: EventTarget,
}

impl Node {
    /// Create a new node.
    pub fn new(id: NodeId, node_type: NodeType) -> Rc<Self> {
        Rc::new(Self {
            id,
            node_type,
            attributes: RefCell::new(HashMap::new()),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            window: RefCell::new(None),
            event_target: EventTarget::new(),
        })
    }

    /// Get the tag name for element nodes.
    pub fn tag_name(&self) -> Option<&str> {
        match &self.node_type {
            NodeType::Element { tag_name, .. } => Some(tag_name),
            _ => None,
        }
    }

    /// Get an attribute value.
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    /// Check whether an attribute is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.borrow().contains_key(name)
    }

    /// Set an attribute. Only elements carry attributes.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        if !self.is_element() {
            return Err(DomError::InvalidOperation(format!(
                "cannot set attribute {name:?} on a non-element node"
            )));
        }
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow_mut().remove(name)
    }

    /// Check the class attribute for a class name.
    pub fn has_class(&self, class_name: &str) -> bool {
        self.attributes
            .borrow()
            .get("class")
            .map(|c| c.split_whitespace().any(|cls| cls == class_name))
            .unwrap_or(false)
    }

    /// Get the text content.
    pub fn text_content(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);
        result
    }

    fn collect_text(&self, result: &mut String) {
        match &self.node_type {
            NodeType::Text(text) => result.push_str(text),
            _ => {
                for child in self.children.borrow().iter() {
                    child.collect_text(result);
                }
            }
        }
    }

    /// Get parent node.
    pub fn parent(&self) -> Option<Rc<Node>> {
        self.parent.borrow().as_ref().and_then(|w| w.upgrade())
    }

    /// The next node on an event path: the tree parent, or the window for a document.
    pub fn event_parent(&self) -> Option<Rc<Node>> {
        match self.node_type {
            NodeType::Document => self.window.borrow().as_ref().and_then(|w| w.upgrade()),
            _ => self.parent(),
        }
    }

    /// Get child nodes.
    pub fn children(&self) -> Vec<Rc<Node>> {
        self.children.borrow().clone()
    }

    /// Get first child.
    pub fn first_child(&self) -> Option<Rc<Node>> {
        self.children.borrow().first().cloned()
    }

    /// Get last child.
    pub fn last_child(&self) -> Option<Rc<Node>> {
        self.children.borrow().last().cloned()
    }

    /// Get previous sibling.
    pub fn previous_sibling(self: &Rc<Self>) -> Option<Rc<Node>> {
        let parent = self.parent()?;
        let siblings = parent.children.borrow();
        let index = siblings.iter().position(|n| Rc::ptr_eq(n, self))?;
        index.checked_sub(1).map(|i| siblings[i].clone())
    }

    /// Get next sibling.
    pub fn next_sibling(self: &Rc<Self>) -> Option<Rc<Node>> {
        let parent = self.parent()?;
        let siblings = parent.children.borrow();
        let index = siblings.iter().position(|n| Rc::ptr_eq(n, self))?;
        siblings.get(index + 1).cloned()
    }

    /// Check if this is an element node.
    pub fn is_element(&self) -> bool {
        matches!(self.node_type, NodeType::Element { .. })
    }

    /// Check if this is a text node.
    pub fn is_text(&self) -> bool {
        matches!(self.node_type, NodeType::Text(_))
    }

    /// Check if this is the window node.
    pub fn is_window(&self) -> bool {
        matches!(self.node_type, NodeType::Window)
    }

    /// Append a child node, detaching it from its previous parent first.
    pub fn append_child(self: &Rc<Self>, child: Rc<Node>) {
        if let Some(old_parent) = child.parent() {
            old_parent
                .children
                .borrow_mut()
                .retain(|n| !Rc::ptr_eq(n, &child));
        }

        *child.parent.borrow_mut() = Some(Rc::downgrade(self));
        self.children.borrow_mut().push(child);
    }

    /// Remove a direct child.
    pub fn remove_child(&self, child: &Rc<Node>) -> Result<Rc<Node>, DomError> {
        let mut children = self.children.borrow_mut();
        let index = children
            .iter()
            .position(|n| Rc::ptr_eq(n, child))
            .ok_or(DomError::NodeNotFound)?;
        let removed = children.remove(index);
        *removed.parent.borrow_mut() = None;
        Ok(removed)
    }

    /// Inclusive descendant test.
    pub fn contains(self: &Rc<Self>, other: &Rc<Node>) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if Rc::ptr_eq(&node, self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Visit descendants in document order, excluding this node.
    pub fn for_each_descendant<F>(&self, callback: &mut F)
    where
        F: FnMut(&Rc<Node>),
    {
        for child in self.children.borrow().iter() {
            callback(child);
            child.for_each_descendant(callback);
        }
    }
}

/// A complete DOM document with its window.
pub struct Document {
    /// The window the document belongs to.
    window: Rc<Node>,
    /// Root node of the document.
    root: Rc<Node>,
    /// All nodes indexed by ID.
    nodes: RefCell<HashMap<NodeId, Rc<Node>>>,
    /// Next node ID.
    next_id: Cell<usize>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        let window = Node::new(NodeId::new(0), NodeType::Window);
        let root = Node::new(NodeId::new(1), NodeType::Document);
        *root.window.borrow_mut() = Some(Rc::downgrade(&window));

        let mut nodes = HashMap::new();
        nodes.insert(window.id, window.clone());
        nodes.insert(root.id, root.clone());

        Self {
            window,
            root,
            nodes: RefCell::new(nodes),
            next_id: Cell::new(2),
        }
    }

    /// Parse HTML and create a document.
    pub fn parse_html(html: &str) -> Result<Self, DomError> {
        debug!(len = html.len(), "Parsing HTML");

        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .map_err(|e| DomError::ParseError(e.to_string()))?;

        let doc = Document::new();
        doc.convert_rcdom(&dom.document, &doc.root);

        debug!(node_count = doc.node_count(), "HTML parsed");
        Ok(doc)
    }

    fn convert_rcdom(&self, handle: &Handle, parent: &Rc<Node>) {
        for child_handle in handle.children.borrow().iter() {
            let mut attributes = Vec::new();
            let node_type = match &child_handle.data {
                NodeData::Document => continue,
                NodeData::Doctype {
                    name,
                    public_id,
                    system_id,
                } => NodeType::DocumentType {
                    name: name.to_string(),
                    public_id: public_id.to_string(),
                    system_id: system_id.to_string(),
                },
                NodeData::Element { name, attrs, .. } => {
                    for attr in attrs.borrow().iter() {
                        attributes.push((attr.name.local.to_string(), attr.value.to_string()));
                    }
                    NodeType::Element {
                        tag_name: name.local.to_string(),
                        namespace: name.ns.to_string(),
                    }
                }
                NodeData::Text { contents } => NodeType::Text(contents.borrow().to_string()),
                NodeData::Comment { contents } => NodeType::Comment(contents.to_string()),
                NodeData::ProcessingInstruction { target, contents } => {
                    NodeType::ProcessingInstruction {
                        target: target.to_string(),
                        data: contents.to_string(),
                    }
                }
            };

            let node = self.alloc(node_type);
            node.attributes.borrow_mut().extend(attributes);
            parent.append_child(node.clone());

            self.convert_rcdom(child_handle, &node);
        }
    }

    fn alloc(&self, node_type: NodeType) -> Rc<Node> {
        let id = NodeId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let node = Node::new(id, node_type);
        self.nodes.borrow_mut().insert(id, node.clone());
        node
    }

    /// Create a detached element in the HTML namespace.
    pub fn create_element(&self, tag_name: &str) -> Rc<Node> {
        self.alloc(NodeType::Element {
            tag_name: tag_name.to_ascii_lowercase(),
            namespace: "http://www.w3.org/1999/xhtml".to_string(),
        })
    }

    /// Create a detached text node.
    pub fn create_text_node(&self, text: &str) -> Rc<Node> {
        self.alloc(NodeType::Text(text.to_string()))
    }

    /// Get the window.
    pub fn window(&self) -> &Rc<Node> {
        &self.window
    }

    /// Get the document root.
    pub fn root(&self) -> &Rc<Node> {
        &self.root
    }

    /// Number of nodes created by this document, window included.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Get the document element (<html>).
    pub fn document_element(&self) -> Option<Rc<Node>> {
        self.root
            .children()
            .into_iter()
            .find(|n| n.tag_name() == Some("html"))
    }

    /// Get the <head> element.
    pub fn head(&self) -> Option<Rc<Node>> {
        self.document_element()?
            .children()
            .into_iter()
            .find(|n| n.tag_name() == Some("head"))
    }

    /// Get the <body> element.
    pub fn body(&self) -> Option<Rc<Node>> {
        self.document_element()?
            .children()
            .into_iter()
            .find(|n| n.tag_name() == Some("body"))
    }

    /// Get element by ID attribute, first in document order.
    pub fn get_element_by_id(&self, id: &str) -> Option<Rc<Node>> {
        self.find_first(|n| n.get_attribute("id").as_deref() == Some(id))
    }

    /// Get elements by tag name.
    pub fn get_elements_by_tag_name(&self, tag_name: &str) -> Vec<Rc<Node>> {
        self.find_all(|n| {
            n.tag_name()
                .map(|t| t.eq_ignore_ascii_case(tag_name))
                .unwrap_or(false)
        })
    }

    /// Get elements by class name.
    pub fn get_elements_by_class_name(&self, class_name: &str) -> Vec<Rc<Node>> {
        self.find_all(|n| n.has_class(class_name))
    }

    /// First element in document order matching a selector.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Rc<Node>>, DomError> {
        self.root.query_selector(selector)
    }

    /// All elements in document order matching a selector.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Rc<Node>>, DomError> {
        self.root.query_selector_all(selector)
    }

    /// Get node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<Rc<Node>> {
        self.nodes.borrow().get(&id).cloned()
    }

    /// Get the title of the document.
    pub fn title(&self) -> Option<String> {
        let head = self.head()?;
        let title_elem = head
            .children()
            .into_iter()
            .find(|n| n.tag_name() == Some("title"))?;
        Some(title_elem.text_content())
    }

    /// Traverse all nodes under the document root depth-first, root included.
    pub fn traverse<F>(&self, mut callback: F)
    where
        F: FnMut(&Rc<Node>),
    {
        callback(&self.root);
        self.root.for_each_descendant(&mut callback);
    }

    fn find_first(&self, mut pred: impl FnMut(&Node) -> bool) -> Option<Rc<Node>> {
        let mut found = None;
        self.root.for_each_descendant(&mut |n: &Rc<Node>| {
            if found.is_none() && pred(&**n) {
                found = Some(n.clone());
            }
        });
        found
    }

    fn find_all(&self, mut pred: impl FnMut(&Node) -> bool) -> Vec<Rc<Node>> {
        let mut found = Vec::new();
        self.root.for_each_descendant(&mut |n: &Rc<Node>| {
            if pred(&**n) {
                found.push(n.clone());
            }
        });
        found
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("node_count", &self.node_count())
            .finish_non_exhaustive()
    }
}
