//! # Module XML Format
//!
//! Text persistence of a module subtree.
//!
//! ```text
//! <module name="arm" muted="0" uid="3f2a...">
//!   <run><![CDATA[...run code...]]></run>
//!   <attributes>
//!     <attr name="blend" template="lineEdit" category="General" connect="/ik/blend"><![CDATA[{"value": 1, "default": "value"}]]></attr>
//!   </attributes>
//!   <children>
//!     <module ...>...</module>
//!   </children>
//! </module>
//! ```
//!
//! - The opening `<module>` tag is always the first line, so the UID can be
//!   read without parsing the whole file (see [`uid_from_header`]).
//! - An attribute's expression travels inside its data under
//!   [`EXPRESSION_KEY`] and is stripped back out on load.
//! - Bodies may also be plain (escaped) text. Whitespace-only text, such as
//!   the indentation around CDATA sections, is ignored.
//! - Reading never marks anything modified.

use crate::attribute::Attribute;
use crate::module::Module;
use crate::path::escapes_subtree;
use crate::primitives::EXPRESSION_KEY;
use crate::tree::ModuleTree;
use crate::types::{ModuleId, RigError};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesCData, BytesEnd, BytesRef, BytesStart, Event};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Which connections survive serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPolicy {
    /// Write every connection as is.
    #[default]
    KeepAll,
    /// Blank connections that leave the serialized subtree.
    StripExternal,
}

static UID_ATTRIBUTE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"uid="(\w*)""#));

/// UID carried by the first line of a module file, if any.
#[must_use]
pub fn uid_from_header(line: &str) -> Option<String> {
    let re = UID_ATTRIBUTE.as_ref().ok()?;
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// =============================================================================
// WRITE
// =============================================================================

fn write_error(e: impl std::fmt::Display) -> RigError {
    RigError::Serialization(e.to_string())
}

/// Serialize module `id` and its subtree.
pub fn module_to_xml(
    tree: &ModuleTree,
    id: ModuleId,
    policy: ConnectionPolicy,
) -> Result<String, RigError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_module(&mut writer, tree, id, policy, None)?;
    String::from_utf8(writer.into_inner()).map_err(write_error)
}

/// `parent_depth`: depth of `id`'s parent below the serialized module, `None`
/// for the serialized module itself.
fn write_module(
    writer: &mut Writer<Vec<u8>>,
    tree: &ModuleTree,
    id: ModuleId,
    policy: ConnectionPolicy,
    parent_depth: Option<usize>,
) -> Result<(), RigError> {
    let module = tree.module(id)?;
    let mut start = BytesStart::new("module");
    start.push_attribute(("name", module.name()));
    start.push_attribute(("muted", if module.muted() { "1" } else { "0" }));
    start.push_attribute(("uid", module.uid()));
    writer
        .write_event(Event::Start(start))
        .map_err(write_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("run")))
        .map_err(write_error)?;
    write_cdata(writer, module.run_code())?;
    writer
        .write_event(Event::End(BytesEnd::new("run")))
        .map_err(write_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("attributes")))
        .map_err(write_error)?;
    for attribute in module.attributes() {
        let connect = match policy {
            ConnectionPolicy::StripExternal
                if escapes_subtree(attribute.connect(), parent_depth) =>
            {
                ""
            }
            _ => attribute.connect(),
        };
        write_attribute(writer, attribute, connect)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("attributes")))
        .map_err(write_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("children")))
        .map_err(write_error)?;
    let child_depth = Some(parent_depth.map_or(0, |d| d + 1));
    for child in module.children() {
        write_module(writer, tree, *child, policy, child_depth)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("children")))
        .map_err(write_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("module")))
        .map_err(write_error)?;
    Ok(())
}

fn write_attribute(
    writer: &mut Writer<Vec<u8>>,
    attribute: &Attribute,
    connect: &str,
) -> Result<(), RigError> {
    let mut data = attribute.local_data();
    if !attribute.expression().is_empty() {
        data.insert(
            EXPRESSION_KEY.to_string(),
            Value::String(attribute.expression().to_string()),
        );
    }
    let json = serde_json::to_string(&data).map_err(write_error)?;

    let mut start = BytesStart::new("attr");
    start.push_attribute(("name", attribute.name()));
    start.push_attribute(("template", attribute.template()));
    start.push_attribute(("category", attribute.category()));
    start.push_attribute(("connect", connect));
    writer
        .write_event(Event::Start(start))
        .map_err(write_error)?;
    write_cdata(writer, &json)?;
    writer
        .write_event(Event::End(BytesEnd::new("attr")))
        .map_err(write_error)?;
    Ok(())
}

/// CDATA cannot contain `]]>`: split it across adjacent sections.
fn write_cdata(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<(), RigError> {
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        let (head, tail) = rest.split_at(pos + 2);
        writer
            .write_event(Event::CData(BytesCData::new(head)))
            .map_err(write_error)?;
        rest = tail;
    }
    writer
        .write_event(Event::CData(BytesCData::new(rest)))
        .map_err(write_error)?;
    Ok(())
}

// =============================================================================
// READ
// =============================================================================

fn read_error(e: impl std::fmt::Display) -> RigError {
    RigError::Deserialization(e.to_string())
}

/// A module parsed but not yet placed in a tree.
#[derive(Debug, Default)]
struct ModuleRecord {
    module: Module,
    children: Vec<ModuleRecord>,
}

#[derive(Debug, Default)]
struct AttrHeader {
    name: String,
    template: String,
    category: String,
    connect: String,
}

enum TextTarget {
    Run,
    Attr(AttrHeader),
}

fn tag_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, RigError> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(read_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(read_error)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn module_record(start: &BytesStart<'_>) -> Result<ModuleRecord, RigError> {
    let mut module = Module::default();
    for (key, value) in tag_attributes(start)? {
        match key.as_str() {
            "name" => module.name = value,
            "uid" => module.uid = value,
            "muted" => module.muted = matches!(value.as_str(), "1" | "true" | "True"),
            _ => {}
        }
    }
    Ok(ModuleRecord {
        module,
        children: Vec::new(),
    })
}

fn attr_header(start: &BytesStart<'_>) -> Result<AttrHeader, RigError> {
    let mut header = AttrHeader::default();
    for (key, value) in tag_attributes(start)? {
        match key.as_str() {
            "name" => header.name = value,
            "template" => header.template = value,
            "category" => header.category = value,
            "connect" => header.connect = value,
            _ => {}
        }
    }
    Ok(header)
}

fn build_attribute(header: AttrHeader, text: &str) -> Result<Attribute, RigError> {
    let mut data: Map<String, Value> = if text.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str(text).map_err(|e| {
            read_error(format!("attribute '{}' data: {}", header.name, e))
        })? {
            Value::Object(map) => map,
            other => {
                return Err(read_error(format!(
                    "attribute '{}' data is not an object: {}",
                    header.name, other
                )));
            }
        }
    };
    let expression = match data.remove(EXPRESSION_KEY) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Ok(Attribute::new(header.name)
        .with_template(header.template)
        .with_category(header.category)
        .with_connect(header.connect)
        .with_expression(expression)
        .with_data(data))
}

fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, RigError> {
    if let Some(ch) = reference.resolve_char_ref().map_err(read_error)? {
        return Ok(ch.to_string());
    }
    let name = reference.decode().map_err(read_error)?;
    resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| read_error(format!("unknown entity '&{};'", name)))
}

fn attach(
    stack: &mut Vec<ModuleRecord>,
    root: &mut Option<ModuleRecord>,
    record: ModuleRecord,
) -> Result<(), RigError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(record),
        None => {
            if root.is_some() {
                return Err(read_error("more than one root <module>"));
            }
            *root = Some(record);
        }
    }
    Ok(())
}

fn parse_record(xml: &str) -> Result<ModuleRecord, RigError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<ModuleRecord> = Vec::new();
    let mut root: Option<ModuleRecord> = None;
    let mut target: Option<TextTarget> = None;
    let mut text = String::new();
    // Whitespace held back until more text follows it.
    let mut pending = String::new();

    loop {
        match reader.read_event().map_err(read_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"module" => stack.push(module_record(&e)?),
                b"run" => {
                    target = Some(TextTarget::Run);
                    text.clear();
                    pending.clear();
                }
                b"attr" => {
                    target = Some(TextTarget::Attr(attr_header(&e)?));
                    text.clear();
                    pending.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"module" => {
                    let record = module_record(&e)?;
                    attach(&mut stack, &mut root, record)?;
                }
                b"attr" => {
                    let attribute = build_attribute(attr_header(&e)?, "")?;
                    if let Some(current) = stack.last_mut() {
                        current.module.attributes.push(attribute);
                    }
                }
                _ => {}
            },
            Event::CData(c) => {
                if target.is_some() {
                    let chunk = String::from_utf8(c.into_inner().into_owned()).map_err(read_error)?;
                    pending.clear();
                    text.push_str(&chunk);
                }
            }
            Event::Text(t) => {
                if target.is_some() {
                    let chunk = t.decode().map_err(read_error)?;
                    if chunk.trim().is_empty() {
                        pending.push_str(&chunk);
                    } else {
                        text.push_str(&pending);
                        pending.clear();
                        text.push_str(&chunk);
                    }
                }
            }
            Event::GeneralRef(r) => {
                if target.is_some() {
                    text.push_str(&pending);
                    pending.clear();
                    text.push_str(&resolve_reference(&r)?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"module" => {
                    let record = stack
                        .pop()
                        .ok_or_else(|| read_error("unbalanced </module>"))?;
                    attach(&mut stack, &mut root, record)?;
                }
                b"run" | b"attr" => {
                    pending.clear();
                    let body = std::mem::take(&mut text);
                    let Some(current) = stack.last_mut() else {
                        return Err(read_error("element outside <module>"));
                    };
                    match target.take() {
                        Some(TextTarget::Run) => current.module.run_code = body,
                        Some(TextTarget::Attr(header)) => {
                            let attribute = build_attribute(header, &body)?;
                            current.module.attributes.push(attribute);
                        }
                        None => {}
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(read_error("unclosed <module>"));
    }
    root.ok_or_else(|| read_error("no <module> element"))
}

fn insert_record(tree: &mut ModuleTree, record: ModuleRecord) -> Result<ModuleId, RigError> {
    let id = tree.insert_module(record.module);
    for child in record.children {
        let child_id = insert_record(tree, child)?;
        tree.add_child(id, child_id)?;
    }
    tree.module_mut(id)?.modified = false;
    Ok(id)
}

/// Parse a module subtree into `tree` as a new detached root.
pub fn module_from_xml(tree: &mut ModuleTree, xml: &str) -> Result<ModuleId, RigError> {
    let record = parse_record(xml)?;
    insert_record(tree, record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (ModuleTree, ModuleId) {
        let mut tree = ModuleTree::new();
        let root = tree.create_module("arm");
        let ik = tree.create_module("ik");
        let fk = tree.create_module("fk");
        tree.add_child(root, ik).expect("ik");
        tree.add_child(root, fk).expect("fk");
        tree.module_mut(root)
            .expect("root")
            .set_run_code("x = [1, 2]\ny = x[0] if True else 0 # ]]> inside");
        tree.add_attribute(
            root,
            Attribute::new("side")
                .with_template("comboBox")
                .with_category("General")
                .with_data(
                    json!({"items": ["L", "R"], "current": "L", "default": "current"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
        )
        .expect("side");
        tree.add_attribute(
            ik,
            Attribute::new("blend")
                .with_value(json!(0.5))
                .with_connect("/fk/blend")
                .with_expression("value = value * 2"),
        )
        .expect("blend");
        tree.add_attribute(
            fk,
            Attribute::new("blend").with_value(json!(1)).with_connect("/outside/x"),
        )
        .expect("fk blend");
        (tree, root)
    }

    #[test]
    fn uid_is_on_the_first_line() {
        let (mut tree, root) = sample();
        tree.set_identity(root, Some("abc123".to_string()), None)
            .expect("uid");
        let xml = module_to_xml(&tree, root, ConnectionPolicy::KeepAll).expect("xml");
        let first = xml.lines().next().expect("first line");
        assert_eq!(uid_from_header(first), Some("abc123".to_string()));
    }

    #[test]
    fn round_trip_keeps_semantics() {
        let (tree, root) = sample();
        let xml = module_to_xml(&tree, root, ConnectionPolicy::KeepAll).expect("xml");
        let mut loaded = ModuleTree::new();
        let id = module_from_xml(&mut loaded, &xml).expect("load");
        let again = module_to_xml(&loaded, id, ConnectionPolicy::KeepAll).expect("xml again");
        assert_eq!(xml, again);

        let module = loaded.module(id).expect("module");
        assert_eq!(module.run_code(), tree.module(root).expect("root").run_code());
        assert_eq!(module.children().len(), 2);
        assert!(!loaded.is_modified(id).expect("flags"));

        let ik = loaded.find_child(id, "ik").expect("find").expect("ik");
        let blend = loaded.module(ik).expect("ik").find_attribute("blend").expect("blend");
        assert_eq!(blend.expression(), "value = value * 2");
        assert!(!blend.raw_data().contains_key(EXPRESSION_KEY));
        assert_eq!(blend.connect(), "/fk/blend");
    }

    #[test]
    fn strip_external_keeps_internal_connections() {
        let (tree, root) = sample();
        let xml = module_to_xml(&tree, root, ConnectionPolicy::StripExternal).expect("xml");
        let mut loaded = ModuleTree::new();
        let id = module_from_xml(&mut loaded, &xml).expect("load");
        let ik = loaded.find_child(id, "ik").expect("find").expect("ik");
        let fk = loaded.find_child(id, "fk").expect("find").expect("fk");
        assert_eq!(
            loaded.module(ik).expect("ik").attributes()[0].connect(),
            "/fk/blend"
        );
        assert_eq!(loaded.module(fk).expect("fk").attributes()[0].connect(), "");
    }

    #[test]
    fn saved_module_own_connections_are_external() {
        let mut tree = ModuleTree::new();
        let m = tree.create_module("m");
        tree.add_attribute(m, Attribute::new("x").with_connect("/sibling/y"))
            .expect("x");
        let xml = module_to_xml(&tree, m, ConnectionPolicy::StripExternal).expect("xml");
        assert!(xml.contains(r#"connect="""#));
    }

    #[test]
    fn special_characters_survive() {
        let mut tree = ModuleTree::new();
        let m = tree.create_module("m");
        tree.add_attribute(
            m,
            Attribute::new("t").with_value(json!("<a & \"b\"> ]]> end")),
        )
        .expect("t");
        let xml = module_to_xml(&tree, m, ConnectionPolicy::KeepAll).expect("xml");
        let mut loaded = ModuleTree::new();
        let id = module_from_xml(&mut loaded, &xml).expect("load");
        assert_eq!(
            loaded.module(id).expect("m").attributes()[0].default_value(),
            json!("<a & \"b\"> ]]> end")
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        let mut tree = ModuleTree::new();
        assert!(module_from_xml(&mut tree, "").is_err());
        assert!(module_from_xml(&mut tree, "<module name=\"a\">").is_err());
        assert!(
            module_from_xml(
                &mut tree,
                "<module name=\"a\"><attributes><attr name=\"x\"><![CDATA[[1]]]></attr></attributes></module>"
            )
            .is_err()
        );
    }

    #[test]
    fn plain_text_bodies_are_read() {
        let mut tree = ModuleTree::new();
        let id = module_from_xml(
            &mut tree,
            "<module name=\"a\"><run>if x &lt; 2 &amp;&amp; y { z = 1 }</run><attributes><attr name=\"v\">{\"value\": 3, \"default\": \"value\"}</attr></attributes></module>",
        )
        .expect("load");
        let module = tree.module(id).expect("a");
        assert_eq!(module.run_code(), "if x < 2 && y { z = 1 }");
        assert_eq!(module.attributes()[0].default_value(), json!(3));
    }

    #[test]
    fn whitespace_around_cdata_is_ignored() {
        let mut tree = ModuleTree::new();
        let id = module_from_xml(
            &mut tree,
            "<module name=\"a\">\n  <run>\n    <![CDATA[x = 1]]>\n  </run>\n  <attributes>\n    <attr name=\"v\">\n      <![CDATA[{\"value\": 4, \"default\": \"value\"}]]>\n    </attr>\n  </attributes>\n</module>",
        )
        .expect("load");
        let module = tree.module(id).expect("a");
        assert_eq!(module.run_code(), "x = 1");
        assert_eq!(module.attributes()[0].default_value(), json!(4));
    }

    #[test]
    fn empty_elements_are_accepted() {
        let mut tree = ModuleTree::new();
        let id = module_from_xml(
            &mut tree,
            "<module name=\"a\" muted=\"1\" uid=\"\"><attributes><attr name=\"x\"/></attributes><children><module name=\"b\"/></children></module>",
        )
        .expect("load");
        let module = tree.module(id).expect("a");
        assert!(module.muted());
        assert_eq!(module.attributes().len(), 1);
        assert_eq!(module.children().len(), 1);
    }
}
