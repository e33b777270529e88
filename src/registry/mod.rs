//! Component Registry
//!
//! Owns the parallel indices that let the rest of the pipeline answer
//! "what assets does this layer/comp currently own" and "what derived
//! variants exist for this basic component" without a linear scan.
//!
//! Grounded on `assets::server::AssetServer` + `assets::storage::AssetStorage<H, T>`:
//! a `SlotMap`-keyed primary store plus bidirectional lookup maps kept in
//! sync on every insert/remove, generalized from a single handle→asset
//! map into the five-way index this format's reconciliation needs.

mod component;

pub use component::{Component, ComponentId, SourceRef};

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use crate::document::LayerId;
use crate::errors::{AssetForgeError, Result};
use crate::parser::Specification;

#[derive(Default)]
pub struct ComponentRegistry {
    components: SlotMap<ComponentId, Component>,
    by_layer: FxHashMap<LayerId, FxHashSet<ComponentId>>,
    by_comp: FxHashMap<u64, FxHashSet<ComponentId>>,
    derived: FxHashMap<ComponentId, FxHashSet<ComponentId>>,

    /// Defaults sourced from the single document-defaults layer, if any.
    layer_defaults: Vec<Specification>,
    /// Defaults sourced from generator metadata under `meta-data-root`;
    /// tracked separately so a metadata reset never disturbs
    /// layer-sourced defaults and vice versa.
    meta_defaults: Vec<Specification>,
    defaults_layer: Option<(LayerId, String)>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    #[must_use]
    pub fn get_components_by_layer(&self, id: LayerId) -> Vec<ComponentId> {
        self.by_layer.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn get_components_by_comp(&self, id: u64) -> Vec<ComponentId> {
        self.by_comp.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn get_derived(&self, basic_id: ComponentId) -> Vec<ComponentId> {
        self.derived.get(&basic_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn all_defaults(&self) -> Vec<&Specification> {
        self.layer_defaults.iter().chain(self.meta_defaults.iter()).collect()
    }

    fn existing_for_source(&self, source: SourceRef) -> Vec<ComponentId> {
        match source {
            SourceRef::Layer(id) => self.get_components_by_layer(id),
            SourceRef::Comp(id) => self.get_components_by_comp(id),
            SourceRef::Document => self.components.iter().filter(|(_, c)| c.source == SourceRef::Document).map(|(id, _)| id).collect(),
        }
    }

    /// Like [`Self::existing_for_source`] but excludes default-derived
    /// children: components fabricated from a basic peer plus an active
    /// default, rather than parsed directly out of the source's own name.
    /// A caller diffing a re-parsed name against what's already
    /// registered wants only the directly-parsed set; a basic
    /// component's derived children live and die with it, not as
    /// independent diff targets.
    #[must_use]
    pub fn directly_specified_for_source(&self, source: SourceRef) -> Vec<ComponentId> {
        self.existing_for_source(source).into_iter().filter(|&id| self.components[id].basic_component_id.is_none()).collect()
    }

    /// Registers `spec` under `source`. Rejects a second component from
    /// the same source with the same asset path, unless the two form a
    /// basic/derived pair under the "same file, exactly one unscaled"
    /// rule — in that narrow case the new component is linked to the
    /// existing one via `basic_component_id` instead of being rejected.
    ///
    /// `path_budget` is `MAX_PATH - base_path.len() - 1`, computed by the
    /// caller (which owns the base path); passing `usize::MAX` disables
    /// the length check for callers that don't yet know a base path.
    pub fn add_component(&mut self, source: SourceRef, spec: Specification, path_budget: usize) -> Result<ComponentId> {
        let Some(asset_path) = spec.asset_path() else {
            return Err(AssetForgeError::ParseError { segment: spec.name.clone(), reason: "specification has no asset path".to_string() });
        };

        let mut paired_basic = None;
        for existing_id in self.existing_for_source(source) {
            let existing = &self.components[existing_id];
            if existing.asset_path != asset_path {
                continue;
            }
            let forms_pair = existing.spec.file == spec.file && existing.spec.is_basic() != spec.is_basic();
            if forms_pair {
                paired_basic = Some(if existing.spec.is_basic() { existing_id } else { existing.basic_component_id.unwrap_or(existing_id) });
                break;
            }
            return Err(AssetForgeError::DuplicateSpecification(asset_path));
        }

        if asset_path.len() >= path_budget {
            return Err(AssetForgeError::PathTooLong(asset_path));
        }

        let is_basic = spec.is_basic();
        let id = self.components.insert_with_key(|id| Component {
            id,
            source,
            spec: spec.clone(),
            asset_path: asset_path.clone(),
            default: spec.default,
            basic_component_id: paired_basic,
        });
        self.index_component(source, id);
        if let Some(basic_id) = paired_basic {
            self.derived.entry(basic_id).or_default().insert(id);
        }

        if is_basic && paired_basic.is_none() {
            self.apply_defaults(id, &spec, source, path_budget);
        }

        Ok(id)
    }

    /// Derives one default-scaled variant per currently active default
    /// spec for the basic component `id`, skipping any folder the basic
    /// already has a derived child under.
    fn apply_defaults(&mut self, id: ComponentId, spec: &Specification, source: SourceRef, path_budget: usize) -> Vec<ComponentId> {
        let mut added = Vec::new();
        let defaults: Vec<Specification> = self.all_defaults().into_iter().cloned().collect();
        for default_spec in defaults {
            if self.get_derived(id).iter().any(|d| self.components[*d].spec.folder == merged_folder(spec, &default_spec)) {
                continue;
            }
            let derived_spec = derive_with_default(spec, &default_spec);
            let Some(derived_path) = derived_spec.asset_path() else { continue };
            if derived_path.len() >= path_budget {
                log::warn!("skipping default-derived asset {derived_path:?}: exceeds path budget");
                continue;
            }
            let derived_id = self.components.insert_with_key(|did| Component {
                id: did,
                source,
                spec: derived_spec,
                asset_path: derived_path,
                default: true,
                basic_component_id: Some(id),
            });
            self.index_component(source, derived_id);
            self.derived.entry(id).or_default().insert(derived_id);
            added.push(derived_id);
        }
        added
    }

    /// Re-derives every basic component's default-sourced children
    /// against the currently active default set. Called whenever the
    /// active defaults change (a new/updated defaults-layer spec list,
    /// or a generator-settings reset), so components registered before
    /// the change don't keep derived variants from a superseded default.
    /// Returns the asset paths of children removed (the caller deletes
    /// those files) and the ids of children freshly added (the caller
    /// schedules renders for those).
    pub fn regenerate_defaults(&mut self, path_budget: usize) -> (Vec<String>, Vec<ComponentId>) {
        let basics: Vec<(ComponentId, Specification, SourceRef)> =
            self.components.iter().filter(|(_, c)| c.basic_component_id.is_none() && c.spec.is_basic()).map(|(id, c)| (id, c.spec.clone(), c.source)).collect();

        let mut removed_paths = Vec::new();
        let mut added = Vec::new();
        for (basic_id, spec, source) in basics {
            let stale: Vec<ComponentId> = self.get_derived(basic_id).into_iter().filter(|&child_id| self.components[child_id].default).collect();
            for child_id in stale {
                removed_paths.push(self.components[child_id].asset_path.clone());
                let mut discard = Vec::new();
                self.remove_one(child_id, &mut discard);
            }
            added.extend(self.apply_defaults(basic_id, &spec, source, path_budget));
        }
        (removed_paths, added)
    }

    fn index_component(&mut self, source: SourceRef, id: ComponentId) {
        match source {
            SourceRef::Layer(layer_id) => {
                self.by_layer.entry(layer_id).or_default().insert(id);
            }
            SourceRef::Comp(comp_id) => {
                self.by_comp.entry(comp_id).or_default().insert(id);
            }
            SourceRef::Document => {}
        }
    }

    /// Removes a component and every component derived from it.
    pub fn remove_component(&mut self, id: ComponentId) -> Vec<ComponentId> {
        let mut removed = Vec::new();
        self.remove_one(id, &mut removed);
        removed
    }

    fn remove_one(&mut self, id: ComponentId, removed: &mut Vec<ComponentId>) {
        let Some(component) = self.components.remove(id) else { return };
        removed.push(id);
        match component.source {
            SourceRef::Layer(layer_id) => {
                if let Some(set) = self.by_layer.get_mut(&layer_id) {
                    set.remove(&id);
                }
            }
            SourceRef::Comp(comp_id) => {
                if let Some(set) = self.by_comp.get_mut(&comp_id) {
                    set.remove(&id);
                }
            }
            SourceRef::Document => {}
        }
        if let Some(basic_id) = component.basic_component_id {
            if let Some(set) = self.derived.get_mut(&basic_id) {
                set.remove(&id);
            }
        }
        if let Some(children) = self.derived.remove(&id) {
            for child in children {
                self.remove_one(child, removed);
            }
        }
    }

    /// Drops every component whose source layer no longer exists in the
    /// given set of live ids, returning the removed component ids so the
    /// caller can clean up the corresponding files.
    pub fn prune_layers_not_in(&mut self, live: &FxHashSet<LayerId>) -> Vec<ComponentId> {
        let stale: Vec<LayerId> = self.by_layer.keys().filter(|id| !live.contains(id)).copied().collect();
        let mut removed = Vec::new();
        for layer_id in stale {
            for component_id in self.get_components_by_layer(layer_id) {
                removed.extend(self.remove_component(component_id));
            }
        }
        removed
    }

    /// Sets the document's layer-sourced defaults. Returns
    /// [`AssetForgeError::MultipleDefaultsLayers`] if a *different* layer
    /// already holds that role; only one defaults-bearing layer is
    /// tolerated per document.
    pub fn set_layer_defaults(&mut self, source: LayerId, source_name: String, specs: Vec<Specification>) -> Result<()> {
        if let Some((existing_id, _)) = self.defaults_layer {
            if existing_id != source {
                return Err(AssetForgeError::MultipleDefaultsLayers { name: source_name });
            }
        }
        self.defaults_layer = Some((source, source_name));
        self.layer_defaults = specs;
        Ok(())
    }

    pub fn clear_layer_defaults(&mut self) {
        self.defaults_layer = None;
        self.layer_defaults.clear();
    }

    #[must_use]
    pub fn is_defaults_layer(&self, id: LayerId) -> bool {
        self.defaults_layer.as_ref().is_some_and(|(lid, _)| *lid == id)
    }

    pub fn reset_default_meta_components(&mut self) {
        self.meta_defaults.clear();
    }

    pub fn add_default_meta_component(&mut self, spec: Specification) {
        self.meta_defaults.push(spec);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn merged_folder(basic: &Specification, default_spec: &Specification) -> Vec<String> {
    let mut folder = default_spec.folder.clone();
    folder.extend(basic.folder.clone());
    folder
}

/// Combines a basic specification with one active default: the
/// default's folder nests in front of the basic's own folder, and the
/// default's scale/size applies unless the basic already specifies its
/// own (a basic spec by definition never does).
fn derive_with_default(basic: &Specification, default_spec: &Specification) -> Specification {
    Specification {
        file: basic.file.clone(),
        extension: basic.extension.clone(),
        quality: basic.quality.clone(),
        folder: merged_folder(basic, default_spec),
        scale: default_spec.scale,
        width: default_spec.width,
        height: default_spec.height,
        canvas: basic.canvas.or(default_spec.canvas),
        default: true,
        suffix: None,
        name: basic.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentTree;

    fn spec(file: &str) -> Specification {
        Specification { file: Some(file.to_string()), extension: Some("png".to_string()), ..Default::default() }
    }

    #[test]
    fn add_and_look_up_by_layer() {
        let mut tree = DocumentTree::new();
        let layer = tree.create_layer(crate::document::LayerKind::Raster, "logo.png");
        let mut registry = ComponentRegistry::new();
        let id = registry.add_component(SourceRef::Layer(layer), spec("logo.png"), usize::MAX).unwrap();
        assert_eq!(registry.get_components_by_layer(layer), vec![id]);
        assert_eq!(registry.get(id).unwrap().asset_path, "logo.png");
    }

    #[test]
    fn duplicate_asset_path_under_same_source_is_rejected() {
        let layer = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "x");
        let mut registry = ComponentRegistry::new();
        registry.add_component(SourceRef::Layer(layer), spec("logo.png"), usize::MAX).unwrap();
        let err = registry.add_component(SourceRef::Layer(layer), spec("logo.png"), usize::MAX).unwrap_err();
        assert!(matches!(err, AssetForgeError::DuplicateSpecification(_)));
    }

    #[test]
    fn path_too_long_is_rejected() {
        let layer = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "x");
        let mut registry = ComponentRegistry::new();
        let err = registry.add_component(SourceRef::Layer(layer), spec("logo.png"), 5).unwrap_err();
        assert!(matches!(err, AssetForgeError::PathTooLong(_)));
    }

    #[test]
    fn removing_a_basic_component_removes_its_derived_peers() {
        let layer = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "x");
        let mut registry = ComponentRegistry::new();
        registry.set_layer_defaults(layer, "default".to_string(), vec![Specification { folder: vec!["thumbs".into()], scale: Some(0.5), ..Default::default() }]).unwrap();
        let basic_id = registry.add_component(SourceRef::Layer(layer), spec("logo.png"), usize::MAX).unwrap();
        assert_eq!(registry.get_derived(basic_id).len(), 1);
        let removed = registry.remove_component(basic_id);
        assert_eq!(removed.len(), 2);
        assert!(registry.get(basic_id).is_none());
    }

    #[test]
    fn regenerate_defaults_applies_a_new_default_to_a_component_registered_before_it() {
        let layer = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "x");
        let mut registry = ComponentRegistry::new();
        let basic_id = registry.add_component(SourceRef::Layer(layer), spec("hero.png"), usize::MAX).unwrap();
        assert!(registry.get_derived(basic_id).is_empty());

        registry.set_layer_defaults(layer, "default".to_string(), vec![Specification { folder: vec!["thumbs".into()], scale: Some(0.5), ..Default::default() }]).unwrap();
        let (removed, added) = registry.regenerate_defaults(usize::MAX);

        assert!(removed.is_empty());
        assert_eq!(added.len(), 1);
        assert_eq!(registry.get(added[0]).unwrap().asset_path, "thumbs/hero.png");
    }

    #[test]
    fn regenerate_defaults_drops_children_from_a_superseded_default() {
        let layer = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "x");
        let mut registry = ComponentRegistry::new();
        registry.set_layer_defaults(layer, "default".to_string(), vec![Specification { folder: vec!["thumbs".into()], scale: Some(0.5), ..Default::default() }]).unwrap();
        let basic_id = registry.add_component(SourceRef::Layer(layer), spec("hero.png"), usize::MAX).unwrap();
        assert_eq!(registry.get_derived(basic_id).len(), 1);

        registry.clear_layer_defaults();
        let (removed, added) = registry.regenerate_defaults(usize::MAX);

        assert_eq!(removed, vec!["thumbs/hero.png".to_string()]);
        assert!(added.is_empty());
        assert!(registry.get_derived(basic_id).is_empty());
    }

    #[test]
    fn second_defaults_layer_is_rejected() {
        let layer_a = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "a");
        let layer_b = DocumentTree::new().create_layer(crate::document::LayerKind::Raster, "b");
        let mut registry = ComponentRegistry::new();
        registry.set_layer_defaults(layer_a, "a".to_string(), vec![]).unwrap();
        let err = registry.set_layer_defaults(layer_b, "b".to_string(), vec![]).unwrap_err();
        assert!(matches!(err, AssetForgeError::MultipleDefaultsLayers { .. }));
    }
}
