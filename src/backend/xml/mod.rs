//! XML document store
//!
//! ```xml
//! <application>
//!   <config>
//!     <values><value name="v" type="i">1</value></values>
//!     <nodes><node name="n"><values/><nodes/></node></nodes>
//!   </config>
//! </application>
//! ```
//!
//! Every value carries its `type` tag; the text is the locale-independent
//! form from [`Value::to_text`].

mod document;

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::constants::xml::{NAME_ATTR, NODE, NODES, TYPE_ATTR, VALUE, VALUES};
use crate::error::{Error, Result};
use crate::store::{ConfigPath, ConfigStore, Pending, SaveMode, ValueList, pending_changes};
use crate::value::{TypeTag, Value};
use document::{Document, Element};

#[derive(Debug)]
pub struct XmlStore {
    path: PathBuf,
    document: Option<Document>,
}

impl XmlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), document: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> Result<Document> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let document = Document::parse(&contents)?;
                info!(path = %self.path.display(), "Loaded XML document");
                Ok(document)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::default()),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(Error::format(format!(
                "{}: document is not valid UTF-8",
                self.path.display()
            ))),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    fn document(&mut self) -> Result<&mut Document> {
        self.document
            .as_mut()
            .ok_or_else(|| Error::backend("XML store used outside of a session"))
    }
}

fn node_at<'a>(document: &'a Document, segments: &[String]) -> Option<&'a Element> {
    segments.iter().try_fold(document.config()?, |node, name| {
        node.child(NODES)?.find_named(NODE, name)
    })
}

fn node_at_mut<'a>(document: &'a mut Document, segments: &[String]) -> Option<&'a mut Element> {
    segments.iter().try_fold(document.config_mut(), |node, name| {
        node.child_mut(NODES)?.find_named_mut(NODE, name)
    })
}

fn force_node<'a>(document: &'a mut Document, segments: &[String]) -> &'a mut Element {
    segments.iter().fold(document.config_mut(), |node, name| {
        node.force_child(NODES).force_named(NODE, name)
    })
}

fn decode(path: &ConfigPath, element: &Element) -> Result<Option<(String, Value)>> {
    let Some(name) = element.attr(NAME_ATTR) else {
        warn!(path = %path, "Skipping XML value without a name");
        return Ok(None);
    };
    let Some(tag) = element.attr(TYPE_ATTR).and_then(TypeTag::from_symbol) else {
        warn!(path = %path, value = %name, kind = ?element.attr(TYPE_ATTR), "Skipping XML value with missing or unknown type");
        return Ok(None);
    };
    let value = Value::from_text(tag, &element.text)
        .map_err(|e| Error::format(format!("XML value '{name}' at {path}: {e}")))?;
    Ok(Some((name.to_string(), value)))
}

impl ConfigStore for XmlStore {
    fn is_present(&self) -> bool {
        self.path.exists()
    }

    fn open(&mut self) -> Result<()> {
        self.document = Some(self.load_document()?);
        Ok(())
    }

    fn close(&mut self) {
        self.document = None;
    }

    fn create_value_list(&mut self, path: &ConfigPath) -> Result<BTreeMap<String, Value>> {
        let document = self.document()?;
        let Some(values) = node_at(document, path.segments()).and_then(|node| node.child(VALUES)) else {
            return Ok(BTreeMap::new());
        };
        let mut list = BTreeMap::new();
        for element in values.children_named(VALUE) {
            if let Some((name, value)) = decode(path, element)? {
                list.insert(name, value);
            }
        }
        debug!(path = %path, count = list.len(), "Read XML value list");
        Ok(list)
    }

    fn create_node_list(&mut self, path: &ConfigPath) -> Result<Vec<String>> {
        let document = self.document()?;
        let Some(nodes) = node_at(document, path.segments()).and_then(|node| node.child(NODES)) else {
            return Ok(Vec::new());
        };
        Ok(nodes
            .children_named(NODE)
            .filter_map(|node| node.attr(NAME_ATTR))
            .map(str::to_string)
            .collect())
    }

    fn save_value_list(&mut self, path: &ConfigPath, values: &ValueList, mode: SaveMode) -> Result<()> {
        let document = self.document()?;
        let stored = force_node(document, path.segments()).force_child(VALUES);
        for (name, pending) in pending_changes(values, mode) {
            match pending {
                Pending::Save(value) => {
                    let element = stored.force_named(VALUE, name);
                    element.set_attr(TYPE_ATTR, value.tag().symbol());
                    element.children.clear();
                    element.text = value.to_text();
                }
                Pending::Remove => stored.remove_named(VALUE, name),
            }
        }
        debug!(path = %path, ?mode, "Saved XML value list");
        Ok(())
    }

    fn delete_node(&mut self, path: &ConfigPath) -> Result<()> {
        let document = self.document()?;
        match path.split_last() {
            None => {
                let config = document.config_mut();
                config.children.clear();
                config.text.clear();
            }
            Some((name, parent)) => {
                if let Some(nodes) = node_at_mut(document, parent).and_then(|node| node.child_mut(NODES)) {
                    nodes.remove_named(NODE, name);
                }
            }
        }
        debug!(path = %path, "Deleted XML node");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let contents = self.document()?.to_xml()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&self.path, contents).map_err(|e| Error::io(&self.path, e))?;
        info!(path = %self.path.display(), "Wrote XML document");
        Ok(())
    }
}
