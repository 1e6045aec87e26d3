//! Tolerant XML loading for analyzer dumps
//!
//! Analyzer dumps are frequently truncated or hand-edited, so the loader keeps
//! whatever it can: malformed fragments are dropped, unclosed elements are
//! closed at end of input, and stray closing tags are ignored. Namespace
//! declarations are neutralized and element names are stored by local name,
//! so lookups never have to care about prefixes.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::LoadError;

/// Upper bound on parse errors skipped before giving up on the rest of the input.
const MAX_RECOVERED_ERRORS: usize = 1024;

/// Name given to the synthetic root when a dump has several top-level elements.
const SYNTHETIC_ROOT: &str = "#document";

/// One element of a loaded document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Local element name (namespace prefix removed)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concatenated, trimmed character data directly inside this element
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text parsed as a number, `None` when absent or not numeric
    pub fn number(&self) -> Option<f64> {
        parse_number(self.text())
    }

    /// Attribute value by local name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Direct children in document order
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants (not including `self`) with the given name, in document order
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        for child in &self.children {
            child.collect_named(name, &mut found);
        }
        found
    }

    /// First descendant with the given name
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|c| c.find_inclusive(name))
    }

    /// Resolve a slash separated path such as `AECX_CoreStats/Channels_List`.
    ///
    /// The first segment may match at any depth below `self`; every further
    /// segment must be a direct child of the previous one. When several
    /// elements match the first segment, the first one (in document order)
    /// for which the rest of the path resolves wins.
    pub fn find_path(&self, path: &str) -> Option<&Element> {
        let (head, rest) = split_path(path)?;
        first_resolved(self.descendants_named(head), &rest)
    }

    /// Like [`Element::find_path`], but returns every element the full path resolves to.
    pub fn find_path_all<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        match split_path(path) {
            Some((head, rest)) => all_resolved(self.descendants_named(head), &rest),
            None => Vec::new(),
        }
    }

    fn resolve_children(&self, segments: &[&str]) -> Option<&Element> {
        match segments.split_first() {
            None => Some(self),
            Some((head, rest)) => self
                .children
                .iter()
                .filter(|c| c.name == *head)
                .find_map(|child| child.resolve_children(rest)),
        }
    }

    fn find_inclusive(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_inclusive(name))
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect_named(name, found);
        }
    }
}

/// A parsed analyzer dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Read and parse a file. The source file is never modified.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&bytes)
    }

    /// Parse raw bytes with error recovery.
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(LoadError::Malformed("empty document".to_string()));
        }

        let source = neutralize_namespaces(bytes);
        let mut offset = 0usize;
        let mut reader = reader_at(&source, offset);

        let mut stack: Vec<Element> = Vec::new();
        let mut roots: Vec<Element> = Vec::new();
        let mut buf = Vec::new();
        let mut recovered = 0usize;

        loop {
            let before = absolute_position(&reader, offset);
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => stack.push(open_element(&start)),
                Ok(Event::Empty(start)) => attach(&mut stack, &mut roots, open_element(&start)),
                Ok(Event::End(end)) => {
                    let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                    close_element(&mut stack, &mut roots, &name);
                }
                Ok(Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        let value = text
                            .unescape()
                            .map(Cow::into_owned)
                            .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                        top.text.push_str(&value);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    recovered += 1;
                    debug!(error = %err, position = before, "dropping malformed XML fragment");
                    if recovered >= MAX_RECOVERED_ERRORS {
                        break;
                    }
                    // A reader stuck on the fragment is restarted at the next tag.
                    let after = absolute_position(&reader, offset);
                    if after == before {
                        match next_tag_start(&source, before + 1) {
                            Some(next) => {
                                offset = next;
                                reader = reader_at(&source, offset);
                            }
                            None => break,
                        }
                    }
                }
            }
            buf.clear();
        }

        // Anything still open at end of input is closed implicitly.
        while let Some(element) = stack.pop() {
            attach(&mut stack, &mut roots, element);
        }

        let root = match roots.len() {
            0 => return Err(LoadError::Malformed("no elements found".to_string())),
            1 => roots.remove(0),
            _ => Element {
                name: SYNTHETIC_ROOT.to_string(),
                children: roots,
                ..Element::default()
            },
        };

        if recovered > 0 {
            debug!(recovered, "parsed document with recovery");
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Every element with the given name, the root included, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.root.collect_named(name, &mut found);
        found
    }

    pub fn find(&self, name: &str) -> Option<&Element> {
        self.root.find_inclusive(name)
    }

    /// Path lookup where the first segment may also match the root itself.
    pub fn find_path(&self, path: &str) -> Option<&Element> {
        let (head, rest) = split_path(path)?;
        first_resolved(self.find_all(head), &rest)
    }

    pub fn find_path_all(&self, path: &str) -> Vec<&Element> {
        match split_path(path) {
            Some((head, rest)) => all_resolved(self.find_all(head), &rest),
            None => Vec::new(),
        }
    }
}

fn split_path(path: &str) -> Option<(&str, Vec<&str>)> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let head = segments.next()?;
    Some((head, segments.collect()))
}

fn first_resolved<'a>(starts: Vec<&'a Element>, rest: &[&str]) -> Option<&'a Element> {
    starts.into_iter().find_map(|start| start.resolve_children(rest))
}

fn all_resolved<'a>(starts: Vec<&'a Element>, rest: &[&str]) -> Vec<&'a Element> {
    let mut current = starts;
    for segment in rest {
        current = current
            .into_iter()
            .flat_map(|el| el.children.iter().filter(|c| c.name == *segment))
            .collect();
    }
    current
}

/// Parse a decimal number the way analyzer dumps write them.
pub fn parse_number(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn open_element(start: &BytesStart<'_>) -> Element {
    let mut element = Element::new(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());

    let mut attributes = start.attributes();
    attributes.with_checks(false);
    for attribute in attributes.flatten() {
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map(Cow::into_owned)
            .unwrap_or_else(|_| String::from_utf8_lossy(&attribute.value).into_owned());
        element.attributes.push((key, value));
    }

    element
}

fn reader_at(source: &[u8], offset: usize) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(&source[offset..]);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    reader
}

fn absolute_position(reader: &Reader<&[u8]>, offset: usize) -> usize {
    let position = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX - offset);
    offset + position
}

fn next_tag_start(source: &[u8], from: usize) -> Option<usize> {
    let rest = source.get(from..)?;
    rest.iter().position(|&b| b == b'<').map(|i| from + i)
}

fn attach(stack: &mut [Element], roots: &mut Vec<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => roots.push(element),
    }
}

/// Close the innermost open element with this name, implicitly closing
/// anything opened after it. A closing tag with no open counterpart is ignored.
fn close_element(stack: &mut Vec<Element>, roots: &mut Vec<Element>, name: &str) {
    let Some(position) = stack.iter().rposition(|el| el.name == name) else {
        debug!(tag = name, "ignoring unmatched closing tag");
        return;
    };

    while stack.len() > position {
        if let Some(element) = stack.pop() {
            attach(stack, roots, element);
        }
    }
}

/// Rewrite `xmlns:` declarations into plain attributes so prefixed
/// documents parse the same as unprefixed ones.
fn neutralize_namespaces(bytes: &[u8]) -> Cow<'_, [u8]> {
    const NEEDLE: &[u8] = b"xmlns:";
    const PLACEHOLDER: &[u8] = b"xmlns_";

    if !bytes.windows(NEEDLE.len()).any(|w| w == NEEDLE) {
        return Cow::Borrowed(bytes);
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(NEEDLE) {
            out.extend_from_slice(PLACEHOLDER);
            i += NEEDLE.len();
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Cow::Owned(out)
}
