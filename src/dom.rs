use anyhow::{Context, Result, anyhow};
use kuchiki::traits::*;
use kuchiki::{ElementData, NodeData, NodeRef};
use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const FOREIGN_NAMESPACES: &[&str] = &[
    "http://www.w3.org/2000/svg",
    "http://www.w3.org/1998/Math/MathML",
];

const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

pub(crate) fn parse_document(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

/// Parses markup in body context and returns the detached top-level nodes.
pub(crate) fn parse_fragment(html: &str) -> Result<Vec<NodeRef>> {
    let document = kuchiki::parse_html().one(format!(
        "<html><head></head><body>{}</body></html>",
        html
    ));
    let body = document
        .select_first("body")
        .map_err(|()| anyhow!("parsed fragment has no body"))?;
    let nodes = body.as_node().children().collect::<Vec<_>>();
    for node in &nodes {
        node.detach();
    }
    Ok(nodes)
}

pub(crate) fn new_element(tag: &str) -> Result<NodeRef> {
    parse_fragment(&format!("<{tag}></{tag}>"))?
        .into_iter()
        .find(|node| node.as_element().is_some())
        .ok_or_else(|| anyhow!("failed to create <{}> element", tag))
}

pub(crate) fn select_all(root: &NodeRef, selectors: &str) -> Result<Vec<NodeRef>> {
    let matches = root
        .select(selectors)
        .map_err(|()| anyhow!("invalid selector '{}'", selectors))?;
    Ok(matches.map(|element| element.as_node().clone()).collect())
}

pub(crate) fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

pub(crate) fn set_inner_html(node: &NodeRef, html: &str) -> Result<()> {
    let replacement = parse_fragment(html)?;
    for child in node.children().collect::<Vec<_>>() {
        child.detach();
    }
    for child in replacement {
        node.append(child);
    }
    Ok(())
}

pub(crate) fn child_elements(node: &NodeRef, names: &[&str]) -> Vec<NodeRef> {
    node.children()
        .elements()
        .filter(|element| names.contains(&&*element.name.local))
        .map(|element| element.as_node().clone())
        .collect()
}

pub(crate) fn has_child_element(node: &NodeRef, names: &[&str]) -> bool {
    !child_elements(node, names).is_empty()
}

/// Serializes `root` as XML: void elements self-close, text and
/// attribute values are escaped, and embedded SVG or MathML roots get
/// their namespace back.
pub(crate) fn to_xhtml(root: &NodeRef) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_node(root, &mut writer)?;
    String::from_utf8(writer.into_inner()).with_context(|| "serialized xhtml is not UTF-8")
}

fn write_node(node: &NodeRef, writer: &mut Writer<Vec<u8>>) -> Result<()> {
    let event = match node.data() {
        NodeData::Document(_) | NodeData::DocumentFragment => {
            for child in node.children() {
                write_node(&child, writer)?;
            }
            return Ok(());
        }
        NodeData::Element(element) => return write_element(node, element, writer),
        NodeData::Doctype(doctype) => {
            let mut declaration = doctype.name.clone();
            if !doctype.public_id.is_empty() {
                declaration.push_str(&format!(" PUBLIC \"{}\"", doctype.public_id));
            } else if !doctype.system_id.is_empty() {
                declaration.push_str(" SYSTEM");
            }
            if !doctype.system_id.is_empty() {
                declaration.push_str(&format!(" \"{}\"", doctype.system_id));
            }
            Event::DocType(BytesText::from_escaped(declaration))
        }
        NodeData::Text(text) => {
            Event::Text(BytesText::from_escaped(partial_escape(text.borrow().as_str()).into_owned()))
        }
        NodeData::Comment(text) => Event::Comment(BytesText::from_escaped(text.borrow().clone())),
        NodeData::ProcessingInstruction(instruction) => {
            let instruction = instruction.borrow();
            Event::PI(BytesText::from_escaped(format!("{} {}", instruction.0, instruction.1)))
        }
    };
    writer
        .write_event(event)
        .with_context(|| "failed to write xhtml node")?;
    Ok(())
}

fn write_element(
    node: &NodeRef,
    element: &ElementData,
    writer: &mut Writer<Vec<u8>>,
) -> Result<()> {
    let name = &*element.name.local;
    let mut start = BytesStart::new(name);

    let namespace = &*element.name.ns;
    let parent_namespace = node
        .parent()
        .and_then(|parent| parent.as_element().map(|parent| parent.name.ns.to_string()));
    if FOREIGN_NAMESPACES.contains(&namespace) && parent_namespace.as_deref() != Some(namespace) {
        start.push_attribute(("xmlns", namespace));
        if uses_prefix(node, "xlink") {
            start.push_attribute(("xmlns:xlink", XLINK_NAMESPACE));
        }
    }

    for (attribute_name, attribute) in element.attributes.borrow().map.iter() {
        let key = match &attribute.prefix {
            Some(prefix) => format!("{}:{}", &**prefix, &*attribute_name.local),
            None => attribute_name.local.to_string(),
        };
        start.push_attribute((key.as_str(), attribute.value.as_str()));
    }

    if node.first_child().is_none() && VOID_ELEMENTS.contains(&name) {
        writer
            .write_event(Event::Empty(start))
            .with_context(|| format!("failed to write <{}/>", name))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(start))
        .with_context(|| format!("failed to write <{}>", name))?;
    for child in node.children() {
        write_node(&child, writer)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("failed to write </{}>", name))?;
    Ok(())
}

fn uses_prefix(node: &NodeRef, prefix: &str) -> bool {
    node.inclusive_descendants().elements().any(|element| {
        element
            .attributes
            .borrow()
            .map
            .values()
            .any(|attribute| attribute.prefix.as_deref() == Some(prefix))
    })
}
