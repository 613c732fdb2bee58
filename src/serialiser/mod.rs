//! Model files (`*.lmx`): reading and writing component graphs as XML.
//!
//! ```text
//! <Model description="the one and only model element">
//!   <NMSequentialIterComponent name="Loop">
//!     <Property name="NumIterations"><uint>3</uint></Property>
//!     <Subcomponents>Reader Writer</Subcomponents>
//!   </NMSequentialIterComponent>
//!   <NMSequentialIterComponent name="Writer">
//!     ...
//!     <Process name="NMValueWriter">
//!       <Property name="FileName"><stringlist>...</stringlist></Property>
//!       <Property name="InputComponents"><list_stringlist>...</list_stringlist></Property>
//!     </Process>
//!   </NMSequentialIterComponent>
//! </Model>
//! ```
//!
//! Parsing is tolerant: unknown component or process types are skipped with
//! a warning and references to them are dropped, so the rest of a model still
//! loads.

pub mod codec;
pub mod xml;

pub use codec::{decode_value, encode_value, remove_surplus_cr};
pub use xml::{XmlElement, XmlNode};

use crate::error::{LumassError, Result, ResultExt};
use crate::model::{
    ComponentFactory, ComponentId, ModelComponent, ModelError, ProcessFactory, Repository,
    ROOT_NAME,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Root element of every model file.
pub const MODEL_ELEMENT: &str = "Model";
const MODEL_DESCRIPTION: &str = "the one and only model element";
/// Process property carrying a process component's input references.
pub const INPUT_COMPONENTS: &str = "InputComponents";

/// Names as found in a model file mapped to the names they were registered
/// under, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameRegister {
    entries: Vec<(String, String)>,
}

impl NameRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: impl Into<String>, registered: impl Into<String>) {
        let original = original.into();
        let registered = registered.into();
        match self.entries.iter_mut().find(|(o, _)| *o == original) {
            Some(entry) => entry.1 = registered,
            None => self.entries.push((original, registered)),
        }
    }

    pub fn remove(&mut self, original: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(o, _)| o == original)?;
        Some(self.entries.remove(pos).1)
    }

    /// Registered name for a name found in the file.
    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(o, _)| o == original)
            .map(|(_, r)| r.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(o, r)| (o.as_str(), r.as_str()))
    }

    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, r)| r.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.entries
    }

    /// Rewrite a `name[:idx]` reference; `None` if the name was not imported.
    fn rewrite_reference(&self, consumer: &str, reference: &str) -> Option<String> {
        if !reference.contains(':') {
            return self.get(reference).map(str::to_string);
        }
        let parts: Vec<&str> = reference.split(':').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            [name, idx] => self.get(name).map(|n| format!("{}:{}", n, idx)),
            [name, ..] => {
                tracing::warn!(
                    "{}: ill-formatted input reference '{}', using the component name only",
                    consumer,
                    reference
                );
                self.get(name).map(str::to_string)
            }
            [] => None,
        }
    }
}

/// Reads and writes model files against a [`Repository`].
pub struct ModelSerialiser<'a> {
    components: &'a ComponentFactory,
    processes: &'a ProcessFactory,
    indent: usize,
}

impl<'a> ModelSerialiser<'a> {
    pub fn new(components: &'a ComponentFactory, processes: &'a ProcessFactory) -> Self {
        Self {
            components,
            processes,
            indent: 2,
        }
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    // ==================== Writing ====================

    /// Element for a single component: properties, then either its
    /// subcomponent names or its process, never both.
    pub fn component_element(&self, repo: &Repository, component: &ModelComponent) -> XmlElement {
        let mut element =
            XmlElement::new(component.class_name()).with_attribute("name", component.name());
        for (name, value) in component.properties() {
            element.push(property_element(&name, &value));
        }

        if let Some(process) = component.process() {
            let mut process_element =
                XmlElement::new("Process").with_attribute("name", process.type_name());
            for (name, value) in process.state().properties() {
                process_element.push(property_element(&name, &value));
            }
            process_element.push(property_element(
                INPUT_COMPONENTS,
                &component.inputs().to_vec().into(),
            ));
            element.push(process_element);
        } else if component.is_aggregate() {
            let names: Vec<&str> = component
                .children()
                .iter()
                .map(|id| repo.name_of(*id))
                .collect();
            element.push(XmlElement::new("Subcomponents").with_text(names.join(" ")));
        }
        element
    }

    fn lookup<'r>(repo: &'r Repository, name: &str) -> Result<(ComponentId, &'r ModelComponent)> {
        let id = repo
            .id_of(name)
            .ok_or_else(|| ModelError::UnregisteredComponent(name.to_string()))?;
        let component = repo
            .get(id)
            .ok_or_else(|| ModelError::UnregisteredComponent(name.to_string()))?;
        Ok((id, component))
    }

    fn model_document(&self, repo: &Repository, ids: &[ComponentId]) -> XmlElement {
        let mut model =
            XmlElement::new(MODEL_ELEMENT).with_attribute("description", MODEL_DESCRIPTION);
        for component in ids.iter().filter_map(|id| repo.get(*id)) {
            model.push(self.component_element(repo, component));
        }
        model
    }

    /// Write one component to `path`.
    ///
    /// In append mode the component is added to the document already in the
    /// file; an empty or missing file starts a new document.
    pub fn serialise_component(
        &self,
        repo: &Repository,
        name: &str,
        path: &Path,
        append: bool,
    ) -> Result<()> {
        let (_, component) = Self::lookup(repo, name)?;
        let existing = if append && path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?
        } else {
            String::new()
        };

        let mut document = if existing.trim().is_empty() {
            self.model_document(repo, &[])
        } else {
            xml::parse_document(&existing)
                .with_context(|| format!("Failed to parse '{}'", path.display()))?
        };
        document.push(self.component_element(repo, component));
        self.write(&document, path)
    }

    /// Write a component and its whole subtree to `path`, replacing its content.
    pub fn serialise_model(&self, repo: &Repository, name: &str, path: &Path) -> Result<()> {
        let (id, _) = Self::lookup(repo, name)?;
        let document = self.model_document(repo, &repo.subtree(id));
        self.write(&document, path)?;
        tracing::info!("Saved '{}' to '{}'", name, path.display());
        Ok(())
    }

    /// The document [`serialise_model`](Self::serialise_model) would write.
    pub fn serialise_to_string(&self, repo: &Repository, name: &str) -> Result<String> {
        let (id, _) = Self::lookup(repo, name)?;
        xml::write_document(&self.model_document(repo, &repo.subtree(id)), self.indent)
    }

    fn write(&self, document: &XmlElement, path: &Path) -> Result<()> {
        let text = xml::write_document(document, self.indent)?;
        fs::write(path, text).with_context(|| format!("Failed to write '{}'", path.display()))
    }

    // ==================== Reading ====================

    /// Import the model file at `path` under `import_host` (root if `None`).
    ///
    /// Unreadable or unparsable files are logged and yield an empty register
    /// without touching the repository.
    pub fn parse_component(
        &self,
        path: &Path,
        import_host: Option<&str>,
        repo: &mut Repository,
    ) -> NameRegister {
        match self.parse_file(path, import_host, repo) {
            Ok(register) => register,
            Err(e) => {
                tracing::error!("Unable to import '{}': {}", path.display(), e);
                NameRegister::new()
            }
        }
    }

    pub fn parse_file(
        &self,
        path: &Path,
        import_host: Option<&str>,
        repo: &mut Repository,
    ) -> Result<NameRegister> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let register = self.parse_str(&text, import_host, repo)?;
        tracing::info!(
            "Imported {} component(s) from '{}'",
            register.len(),
            path.display()
        );
        Ok(register)
    }

    /// Import a model document held in memory.
    pub fn parse_str(
        &self,
        source: &str,
        import_host: Option<&str>,
        repo: &mut Repository,
    ) -> Result<NameRegister> {
        let document = xml::parse_document(source)?;
        let host = import_host.unwrap_or(ROOT_NAME);
        let host_component = repo
            .get_component(host)
            .ok_or_else(|| ModelError::UnregisteredComponent(host.to_string()))?;
        if !host_component.is_aggregate() {
            return Err(LumassError::Model(ModelError::InvalidLink(format!(
                "'{}' cannot host imported components",
                host
            ))));
        }

        let mut register = NameRegister::new();
        self.create_components(&document, host, repo, &mut register);
        harmonise_inputs(&register, repo);
        wire_subcomponents(&document, &register, repo);
        attach_to_host(&register, host, repo);
        Ok(register)
    }

    fn create_components(
        &self,
        document: &XmlElement,
        host: &str,
        repo: &mut Repository,
        register: &mut NameRegister,
    ) {
        let mut seen = HashSet::new();
        for element in document.elements() {
            let name = element.attribute("name").unwrap_or_default();
            if name.is_empty() {
                tracing::error!("Unnamed <{}> component, import stopped", element.name);
                return;
            }
            // A repeated name would shadow the first component in the register.
            if !seen.insert(name) {
                tracing::warn!("Duplicate component '{}' in model document, skipping it", name);
                continue;
            }

            if name == ROOT_NAME {
                if host != ROOT_NAME {
                    tracing::debug!("Ignoring 'root' imported into '{}'", host);
                    continue;
                }
                register.insert(ROOT_NAME, ROOT_NAME);
                if let Some(root) = repo.get_component_mut(ROOT_NAME) {
                    apply_properties(root, element);
                }
                continue;
            }

            let Some(mut component) = self.components.create_named(&element.name, name) else {
                tracing::warn!(
                    "Unknown component type '{}' for '{}', skipping it",
                    element.name,
                    name
                );
                continue;
            };
            apply_properties(&mut component, element);
            if let Some(process_element) = element.first_element("Process") {
                if let Err(e) = self.attach_process(&mut component, process_element) {
                    tracing::warn!("Failed to create process component '{}': {}, skipping it", name, e);
                    continue;
                }
            }
            let registered = repo.register_component(component);
            register.insert(name, registered);
        }
    }

    fn attach_process(
        &self,
        component: &mut ModelComponent,
        element: &XmlElement,
    ) -> std::result::Result<(), ModelError> {
        let type_name = element.attribute("name").unwrap_or_default();
        let mut process = self
            .processes
            .create_process(type_name)
            .ok_or_else(|| ModelError::UnknownProcessType(type_name.to_string()))?;

        for property in element.elements_named("Property") {
            let name = property.attribute("name").unwrap_or_default();
            let Some(value) = codec::decode_property(property) else {
                tracing::warn!("{}: could not decode process property '{}'", component.name(), name);
                continue;
            };
            if name == INPUT_COMPONENTS {
                match value.as_list_string_list() {
                    Some(inputs) => component.set_inputs(inputs.to_vec()),
                    None => tracing::warn!("{}: '{}' is not a list of lists", component.name(), name),
                }
            } else if !process.set_parameter(name, value) {
                tracing::debug!("{}: process has no declared property '{}'", component.name(), name);
            }
        }
        component.set_process(process)?;
        Ok(())
    }
}

fn property_element(name: &str, value: &crate::model::PropertyValue) -> XmlElement {
    XmlElement::new("Property")
        .with_attribute("name", name)
        .with_child(codec::encode_value(value))
}

fn apply_properties(component: &mut ModelComponent, element: &XmlElement) {
    for property in element.elements_named("Property") {
        let name = property.attribute("name").unwrap_or_default();
        // The name attribute and the register decide names.
        if name == "objectName" {
            continue;
        }
        let Some(value) = codec::decode_property(property) else {
            tracing::warn!("{}: could not decode property '{}'", component.name(), name);
            continue;
        };
        if !component.set_property(name, value) {
            tracing::debug!("{}: property '{}' not applied", component.name(), name);
        }
    }
}

/// Rewrite input references of imported components to their registered
/// names, dropping references to anything not imported.
fn harmonise_inputs(register: &NameRegister, repo: &mut Repository) {
    for name in register.registered_names() {
        let Some(component) = repo.get_component_mut(name) else {
            continue;
        };
        if !(component.has_process() || component.is_data()) {
            continue;
        }
        let revised: Vec<Vec<String>> = component
            .inputs()
            .iter()
            .map(|list| {
                list.iter()
                    .filter_map(|r| register.rewrite_reference(name, r))
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .collect();
        component.set_inputs(revised);
    }
}

fn wire_subcomponents(document: &XmlElement, register: &NameRegister, repo: &mut Repository) {
    let mut seen = HashSet::new();
    for element in document.elements() {
        let Some(original) = element.attribute("name") else {
            continue;
        };
        if !seen.insert(original) {
            continue;
        }
        let Some(host) = register.get(original) else {
            continue;
        };
        let Some(subcomponents) = element.first_element("Subcomponents") else {
            continue;
        };
        for sub in subcomponents.text().split_whitespace() {
            let Some(child) = register.get(sub) else {
                continue;
            };
            if let Err(e) = repo.add_child(host, child) {
                tracing::warn!("Failed to add '{}' to '{}': {}", child, host, e);
            }
        }
    }
}

fn attach_to_host(register: &NameRegister, host: &str, repo: &mut Repository) {
    for name in register.registered_names() {
        let hostless = repo
            .get_component(name)
            .map(|c| c.host().is_none())
            .unwrap_or(false);
        if name != ROOT_NAME && hostless {
            if let Err(e) = repo.add_child(host, name) {
                tracing::warn!("Failed to attach '{}' to '{}': {}", name, host, e);
            }
        }
    }
}
