//! Component repository.
//!
//! Owns every component of a model in a slot arena indexed by
//! [`ComponentId`], with a `name → id` index on top. Slot 0 always holds the
//! root aggregate named `"root"`. Host/child relations are kept consistent
//! here: a component is listed in exactly one host's child chain, and chains
//! never contain their own ancestors.

use crate::model::component::{split_reference, ModelComponent};
use crate::model::error::{ModelError, ModelResult};
use crate::model::id::ComponentId;
use crate::model::process::IterationLookup;
use std::collections::{HashMap, HashSet};

/// Name of the root aggregate.
pub const ROOT_NAME: &str = "root";

/// Base name for components registered without a name.
const DEFAULT_NAME: &str = "Component";

/// Maximum number of trailing digits treated as a counter when uniquifying.
const MAX_COUNTER_DIGITS: usize = 4;

pub struct Repository {
    slots: Vec<Option<ModelComponent>>,
    index: HashMap<String, ComponentId>,
}

impl Repository {
    pub fn new() -> Self {
        let root = ModelComponent::aggregate(ROOT_NAME);
        let mut index = HashMap::new();
        index.insert(ROOT_NAME.to_string(), ComponentId(0));
        Self {
            slots: vec![Some(root)],
            index,
        }
    }

    pub fn root_id(&self) -> ComponentId {
        ComponentId(0)
    }

    /// Number of registered components, root included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when only the root is registered.
    pub fn is_empty(&self) -> bool {
        self.index.len() <= 1
    }

    // ==================== Lookup ====================

    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, id: ComponentId) -> Option<&ModelComponent> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut ModelComponent> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub fn get_component(&self, name: &str) -> Option<&ModelComponent> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn get_component_mut(&mut self, name: &str) -> Option<&mut ModelComponent> {
        let id = self.id_of(name)?;
        self.get_mut(id)
    }

    /// Name of a live component; empty for vacated ids.
    pub fn name_of(&self, id: ComponentId) -> &str {
        self.get(id).map(|c| c.name()).unwrap_or("")
    }

    /// Live components in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &ModelComponent)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|c| (ComponentId(i as u32), c)))
    }

    // ==================== Registration ====================

    /// First free name derived from `name`.
    ///
    /// Up to four trailing digits are read as a counter and incremented;
    /// names without a counter get `1` appended.
    pub fn unique_name(&self, name: &str) -> String {
        let mut candidate = if name.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            name.to_string()
        };
        while self.contains(&candidate) {
            candidate = next_candidate(&candidate);
        }
        candidate
    }

    /// Register without a host. The component stays transient until linked.
    pub fn register_component(&mut self, mut component: ModelComponent) -> String {
        let name = self.unique_name(component.name());
        if name != component.name() {
            tracing::debug!("Renamed '{}' to '{}' on registration", component.name(), name);
        }
        component.set_name(name.clone());
        component.host = None;
        let id = ComponentId(self.slots.len() as u32);
        self.slots.push(Some(component));
        self.index.insert(name.clone(), id);
        name
    }

    /// Register and link under `host` (root if `None`). Returns the final name.
    pub fn add_component(
        &mut self,
        component: ModelComponent,
        host: Option<&str>,
    ) -> ModelResult<String> {
        let host = host.unwrap_or(ROOT_NAME);
        let host_id = self
            .id_of(host)
            .ok_or_else(|| ModelError::UnregisteredComponent(host.to_string()))?;
        self.check_host(host_id)?;

        let name = self.register_component(component);
        self.add_child(host, &name)?;
        Ok(name)
    }

    /// Unlink and drop `name` with its whole subtree.
    ///
    /// Returns `false` for unknown names and for the root. Input references
    /// held by other components are left alone; see
    /// [`purge_input_references`](Self::purge_input_references).
    pub fn remove_component(&mut self, name: &str) -> bool {
        let Some(id) = self.id_of(name) else {
            return false;
        };
        if id == self.root_id() {
            tracing::warn!("The root component cannot be removed");
            return false;
        }
        self.unlink(name);
        for sub in self.subtree(id) {
            if let Some(component) = self.slots.get_mut(sub.index()).and_then(Option::take) {
                self.index.remove(component.name());
            }
        }
        true
    }

    /// Rename, uniquifying `new_name`; inputs referring to the old name follow.
    pub fn rename_component(&mut self, old: &str, new_name: &str) -> ModelResult<String> {
        let id = self
            .id_of(old)
            .ok_or_else(|| ModelError::UnregisteredComponent(old.to_string()))?;
        if id == self.root_id() {
            return Err(ModelError::InvalidParameter {
                component: ROOT_NAME.to_string(),
                message: "the root component cannot be renamed".to_string(),
            });
        }
        if old == new_name {
            return Ok(old.to_string());
        }

        let name = self.unique_name(new_name);
        self.index.remove(old);
        self.index.insert(name.clone(), id);
        if let Some(component) = self.get_mut(id) {
            component.set_name(name.clone());
        }

        for component in self.slots.iter_mut().flatten() {
            for list in component.inputs_mut().iter_mut() {
                for reference in list.iter_mut() {
                    let (target, output) = split_reference(reference);
                    if target == old {
                        *reference = match output {
                            Some(idx) => format!("{}:{}", name, idx),
                            None => name.clone(),
                        };
                    }
                }
            }
        }
        Ok(name)
    }

    /// Remove every input reference to `name`; empty lists are dropped.
    /// Returns the number of references removed.
    pub fn purge_input_references(&mut self, name: &str) -> usize {
        let mut removed = 0;
        for component in self.slots.iter_mut().flatten() {
            let inputs = component.inputs_mut();
            for list in inputs.iter_mut() {
                let before = list.len();
                list.retain(|r| split_reference(r).0 != name);
                removed += before - list.len();
            }
            inputs.retain(|l| !l.is_empty());
        }
        removed
    }

    // ==================== Hierarchy ====================

    fn check_host(&self, host: ComponentId) -> ModelResult<()> {
        let component = self
            .get(host)
            .ok_or_else(|| ModelError::InvalidLink(format!("no host {}", host)))?;
        if !component.is_aggregate() {
            return Err(ModelError::InvalidLink(format!(
                "'{}' is not an aggregate and cannot host components",
                component.name()
            )));
        }
        Ok(())
    }

    fn check_link(&self, host: ComponentId, child: ComponentId) -> ModelResult<()> {
        self.check_host(host)?;
        if host == child || self.is_ancestor(child, host) {
            return Err(ModelError::InvalidLink(format!(
                "'{}' cannot be placed inside itself",
                self.name_of(child)
            )));
        }
        if child == self.root_id() {
            return Err(ModelError::InvalidLink(
                "the root component cannot be hosted".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_pair(&self, host: &str, child: &str) -> ModelResult<(ComponentId, ComponentId)> {
        let host_id = self
            .id_of(host)
            .ok_or_else(|| ModelError::UnregisteredComponent(host.to_string()))?;
        let child_id = self
            .id_of(child)
            .ok_or_else(|| ModelError::UnregisteredComponent(child.to_string()))?;
        Ok((host_id, child_id))
    }

    /// Append `child` to `host`'s chain, moving it if it is hosted elsewhere.
    pub fn add_child(&mut self, host: &str, child: &str) -> ModelResult<()> {
        let (host_id, child_id) = self.resolve_pair(host, child)?;
        self.check_link(host_id, child_id)?;
        self.unlink(child);
        self.attach(host_id, child_id, None)
    }

    /// Insert `child` into `host`'s chain after `previous`; empty `previous`
    /// inserts at the front.
    pub fn insert_child(&mut self, host: &str, child: &str, previous: &str) -> ModelResult<()> {
        let (host_id, child_id) = self.resolve_pair(host, child)?;
        self.check_link(host_id, child_id)?;
        if previous == child {
            return Err(ModelError::InvalidLink(format!(
                "'{}' cannot be inserted after itself",
                child
            )));
        }
        self.unlink(child);

        let position = if previous.is_empty() {
            0
        } else {
            let previous_id = self
                .id_of(previous)
                .ok_or_else(|| ModelError::UnregisteredComponent(previous.to_string()))?;
            self.children_of(host_id)
                .iter()
                .position(|c| *c == previous_id)
                .map(|p| p + 1)
                .ok_or_else(|| {
                    ModelError::InvalidLink(format!("'{}' is not hosted by '{}'", previous, host))
                })?
        };
        self.attach(host_id, child_id, Some(position))
    }

    fn attach(
        &mut self,
        host: ComponentId,
        child: ComponentId,
        position: Option<usize>,
    ) -> ModelResult<()> {
        let host_level = self.get(host).map(|h| h.time_level()).unwrap_or(0);
        let chain = self
            .get_mut(host)
            .and_then(|h| h.children_mut())
            .ok_or_else(|| ModelError::InvalidLink(format!("{} cannot host components", host)))?;
        match position {
            Some(p) if p <= chain.len() => chain.insert(p, child),
            _ => chain.push(child),
        }
        if let Some(c) = self.get_mut(child) {
            c.host = Some(host);
        }
        let child_level = self.get(child).map(|c| c.time_level()).unwrap_or(0);
        if child_level < host_level {
            self.shift_time_level(child, host_level);
        }
        Ok(())
    }

    /// Detach `name` from its host; it stays registered. Returns `false` if
    /// it was not hosted.
    pub fn unlink(&mut self, name: &str) -> bool {
        let Some(id) = self.id_of(name) else {
            return false;
        };
        let Some(host) = self.get_mut(id).and_then(|c| c.host.take()) else {
            return false;
        };
        if let Some(chain) = self.get_mut(host).and_then(|h| h.children_mut()) {
            chain.retain(|c| *c != id);
        }
        true
    }

    pub fn children_of(&self, id: ComponentId) -> &[ComponentId] {
        self.get(id).map(|c| c.children()).unwrap_or(&[])
    }

    /// Names of `name`'s children in chain order.
    pub fn children(&self, name: &str) -> Vec<String> {
        self.id_of(name)
            .map(|id| {
                self.children_of(id)
                    .iter()
                    .map(|c| self.name_of(*c).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn host_of(&self, name: &str) -> Option<String> {
        let host = self.get_component(name)?.host()?;
        Some(self.name_of(host).to_string())
    }

    /// Ancestor ids of `id`, nearest first. Bounded by the number of slots.
    pub fn host_chain_ids(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|c| c.host());
        while let Some(host) = current {
            if chain.len() >= self.slots.len() || chain.contains(&host) {
                tracing::error!("Host chain of {} does not terminate", id);
                break;
            }
            chain.push(host);
            current = self.get(host).and_then(|c| c.host());
        }
        chain
    }

    /// Names of `name`'s ancestors, nearest first, ending at root when attached.
    pub fn host_chain(&self, name: &str) -> Vec<String> {
        self.id_of(name)
            .map(|id| {
                self.host_chain_ids(id)
                    .into_iter()
                    .map(|h| self.name_of(h).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_ancestor(&self, ancestor: ComponentId, id: ComponentId) -> bool {
        self.host_chain_ids(id).contains(&ancestor)
    }

    /// True if `name` sits anywhere below `host`.
    pub fn is_sub_component(&self, host: &str, name: &str) -> bool {
        match (self.id_of(host), self.id_of(name)) {
            (Some(h), Some(c)) => h != c && self.is_ancestor(h, c),
            _ => false,
        }
    }

    /// Lowest aggregate hosting all of `names`.
    pub fn common_host(&self, names: &[&str]) -> Option<String> {
        let mut chains = Vec::with_capacity(names.len());
        for name in names {
            chains.push(self.host_chain_ids(self.id_of(name)?));
        }
        let (first, rest) = chains.split_first()?;
        first
            .iter()
            .find(|candidate| rest.iter().all(|chain| chain.contains(candidate)))
            .map(|id| self.name_of(*id).to_string())
    }

    /// `id` and everything below it, pre-order.
    pub fn subtree(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) || self.get(next).is_none() {
                continue;
            }
            out.push(next);
            stack.extend(self.children_of(next).iter().rev().copied());
        }
        out
    }

    /// Registered components that are not attached to any host.
    pub fn transient_components(&self) -> Vec<ComponentId> {
        self.iter()
            .filter(|(id, c)| *id != self.root_id() && c.host().is_none())
            .map(|(id, _)| id)
            .collect()
    }

    // ==================== Time levels ====================

    /// Set the time level of `name`, clamped to its host's level; the subtree
    /// moves by the same amount, never below its own host's level.
    pub fn set_time_level(&mut self, name: &str, level: i16) -> ModelResult<i16> {
        let id = self
            .id_of(name)
            .ok_or_else(|| ModelError::UnregisteredComponent(name.to_string()))?;
        let host_level = self
            .get(id)
            .and_then(|c| c.host())
            .and_then(|h| self.get(h))
            .map(|h| h.time_level())
            .unwrap_or(0);
        let level = level.max(host_level);
        self.shift_time_level(id, level);
        Ok(level)
    }

    fn shift_time_level(&mut self, id: ComponentId, level: i16) {
        let old = self.get(id).map(|c| c.time_level()).unwrap_or(0);
        let delta = level.saturating_sub(old);
        if let Some(c) = self.get_mut(id) {
            c.set_time_level(level);
        }
        for child in self.children_of(id).to_vec() {
            let child_level = self.get(child).map(|c| c.time_level()).unwrap_or(0);
            self.shift_time_level(child, child_level.saturating_add(delta).max(level));
        }
    }

    // ==================== Run-time state ====================

    /// Reset run-time state of `id` and its subtree.
    pub fn reset_subtree(&mut self, id: ComponentId) {
        for sub in self.subtree(id) {
            if let Some(c) = self.get_mut(sub) {
                c.reset();
            }
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl IterationLookup for Repository {
    fn iteration_number(&self, component: &str) -> Option<u32> {
        self.get_component(component).map(|c| c.iteration_number())
    }
}

fn next_candidate(name: &str) -> String {
    let digits = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .take(MAX_COUNTER_DIGITS)
        .count();
    if digits == 0 {
        return format!("{}1", name);
    }
    let (base, counter) = name.split_at(name.len() - digits);
    let counter: u64 = counter.parse().unwrap_or(0);
    format!("{}{}", base, counter + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::processes::ScalarSourceProcess;
    use proptest::prelude::*;

    fn source(name: &str) -> ModelComponent {
        ModelComponent::with_process(name, Box::new(ScalarSourceProcess::new()))
    }

    #[test]
    fn test_root_always_present() {
        let mut repo = Repository::new();
        assert!(repo.contains(ROOT_NAME));
        assert!(repo.is_empty());
        assert!(!repo.remove_component(ROOT_NAME));
        assert!(repo.rename_component(ROOT_NAME, "top").is_err());
    }

    #[test]
    fn test_uniquification() {
        let mut repo = Repository::new();
        assert_eq!(repo.add_component(source("Reader"), None).unwrap(), "Reader");
        assert_eq!(repo.add_component(source("Reader"), None).unwrap(), "Reader1");
        assert_eq!(repo.add_component(source("Reader"), None).unwrap(), "Reader2");
        assert_eq!(repo.add_component(source("Writer3"), None).unwrap(), "Writer3");
        assert_eq!(repo.add_component(source("Writer3"), None).unwrap(), "Writer4");
        assert_eq!(repo.add_component(source(""), None).unwrap(), "Component");
    }

    #[test]
    fn test_next_candidate_counter_width() {
        assert_eq!(next_candidate("Reader"), "Reader1");
        assert_eq!(next_candidate("Reader9"), "Reader10");
        assert_eq!(next_candidate("a12345"), "a12346");
        assert_eq!(next_candidate("a9999"), "a10000");
    }

    #[test]
    fn test_linking_rules() {
        let mut repo = Repository::new();
        repo.add_component(ModelComponent::aggregate("Outer"), None).unwrap();
        repo.add_component(ModelComponent::aggregate("Inner"), Some("Outer")).unwrap();
        repo.add_component(source("Src"), Some("Inner")).unwrap();

        // process components and data buffers cannot host
        assert!(repo.add_component(source("X"), Some("Src")).is_err());
        // no cycles
        assert!(repo.add_child("Inner", "Outer").is_err());
        assert!(repo.add_child("Outer", "Outer").is_err());
        assert!(repo.add_child("Inner", ROOT_NAME).is_err());

        assert_eq!(repo.host_chain("Src"), vec!["Inner", "Outer", ROOT_NAME]);
        assert!(repo.is_sub_component("Outer", "Src"));
        assert!(!repo.is_sub_component("Src", "Outer"));
    }

    #[test]
    fn test_insert_child_positions() {
        let mut repo = Repository::new();
        repo.add_component(source("A"), None).unwrap();
        repo.add_component(source("C"), None).unwrap();
        repo.register_component(source("B"));
        repo.register_component(source("Z"));

        repo.insert_child(ROOT_NAME, "B", "A").unwrap();
        repo.insert_child(ROOT_NAME, "Z", "").unwrap();
        assert_eq!(repo.children(ROOT_NAME), vec!["Z", "A", "B", "C"]);

        // moving keeps a single entry
        repo.insert_child(ROOT_NAME, "Z", "C").unwrap();
        assert_eq!(repo.children(ROOT_NAME), vec!["A", "B", "C", "Z"]);
        assert!(repo.insert_child(ROOT_NAME, "Z", "Missing").is_err());
    }

    #[test]
    fn test_remove_subtree() {
        let mut repo = Repository::new();
        repo.add_component(ModelComponent::aggregate("Loop"), None).unwrap();
        repo.add_component(source("Src"), Some("Loop")).unwrap();
        repo.add_component(source("Other"), None).unwrap();

        assert!(repo.remove_component("Loop"));
        assert!(!repo.contains("Src"));
        assert!(!repo.remove_component("Loop"));
        assert_eq!(repo.children(ROOT_NAME), vec!["Other"]);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_rename_rewrites_inputs() {
        let mut repo = Repository::new();
        repo.add_component(source("Src"), None).unwrap();
        repo.add_component(source("Taken"), None).unwrap();
        let mut sink = source("Sink");
        sink.set_inputs(vec![vec!["Src:1".into(), "Other".into()], vec!["Src".into()]]);
        repo.add_component(sink, None).unwrap();

        let name = repo.rename_component("Src", "Taken").unwrap();
        assert_eq!(name, "Taken1");
        assert!(!repo.contains("Src"));
        let inputs = repo.get_component("Sink").unwrap().inputs();
        assert_eq!(inputs[0], vec!["Taken1:1".to_string(), "Other".to_string()]);
        assert_eq!(inputs[1], vec!["Taken1".to_string()]);
    }

    #[test]
    fn test_purge_input_references() {
        let mut repo = Repository::new();
        let mut sink = source("Sink");
        sink.set_inputs(vec![vec!["Gone:0".into()], vec!["Gone".into(), "Kept".into()]]);
        repo.add_component(sink, None).unwrap();

        assert_eq!(repo.purge_input_references("Gone"), 2);
        assert_eq!(
            repo.get_component("Sink").unwrap().inputs(),
            &[vec!["Kept".to_string()]]
        );
    }

    #[test]
    fn test_common_host() {
        let mut repo = Repository::new();
        repo.add_component(ModelComponent::aggregate("Outer"), None).unwrap();
        repo.add_component(ModelComponent::aggregate("Inner"), Some("Outer")).unwrap();
        repo.add_component(source("A"), Some("Inner")).unwrap();
        repo.add_component(source("B"), Some("Outer")).unwrap();
        repo.add_component(source("C"), None).unwrap();

        assert_eq!(repo.common_host(&["A", "B"]).as_deref(), Some("Outer"));
        assert_eq!(repo.common_host(&["A", "C"]).as_deref(), Some(ROOT_NAME));
        assert_eq!(repo.common_host(&["A", "Nope"]), None);
    }

    #[test]
    fn test_time_levels_follow_host() {
        let mut repo = Repository::new();
        repo.add_component(ModelComponent::aggregate("Outer"), None).unwrap();
        repo.add_component(source("A"), Some("Outer")).unwrap();

        assert_eq!(repo.set_time_level("Outer", 2).unwrap(), 2);
        assert_eq!(repo.get_component("A").unwrap().time_level(), 2);

        // clamped to host's level
        assert_eq!(repo.set_time_level("A", 1).unwrap(), 2);
        assert_eq!(repo.set_time_level("A", 5).unwrap(), 5);

        // lowering the host keeps the relative offset
        repo.set_time_level("Outer", 1).unwrap();
        assert_eq!(repo.get_component("A").unwrap().time_level(), 4);
    }

    #[test]
    fn test_transient_until_linked() {
        let mut repo = Repository::new();
        let name = repo.register_component(source("A"));
        let id = repo.id_of(&name).unwrap();
        assert_eq!(repo.transient_components(), vec![id]);

        repo.add_child(ROOT_NAME, &name).unwrap();
        assert!(repo.transient_components().is_empty());
    }

    proptest! {
        #[test]
        fn prop_names_stay_unique(names in prop::collection::vec("[A-C]{1,2}[0-9]{0,2}", 1..40)) {
            let mut repo = Repository::new();
            let mut seen = HashSet::new();
            for name in &names {
                let final_name = repo.add_component(source(name), None).unwrap();
                prop_assert!(seen.insert(final_name));
            }
            prop_assert_eq!(repo.len(), names.len() + 1);
        }

        #[test]
        fn prop_host_walks_reach_root(ops in prop::collection::vec((0usize..12, 0usize..12), 1..60)) {
            let mut repo = Repository::new();
            let names: Vec<String> = (0..12).map(|i| format!("Agg{}", i)).collect();
            for name in &names {
                repo.add_component(ModelComponent::aggregate(name.as_str()), None).unwrap();
            }
            for (host, child) in ops {
                // failures are expected for cyclic requests
                let _ = repo.add_child(&names[host], &names[child]);
            }
            for name in &names {
                let chain = repo.host_chain(name);
                prop_assert_eq!(chain.last().map(String::as_str), Some(ROOT_NAME));
                prop_assert!(chain.len() <= repo.len());
            }
            let all = repo.subtree(repo.root_id());
            prop_assert_eq!(all.len(), repo.len());
        }
    }
}
