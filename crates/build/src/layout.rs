//! Binding slot assignment
//!
//! Every generated module uses bind group 0 with a fixed scheme:
//!
//! | Slot | Resource |
//! |---|---|
//! | 0 | default sampler `wgfx_sampler` (linear, clamp to edge) |
//! | 1 | parameter uniform `wgfx_params`, only if the effect declares parameters |
//! | 4 | scene uniform `wgfx_scene` |
//!
//! The remaining resources a pass uses take the lowest free slots: `INPUT`, then
//! declared textures in declaration order, then `OUTPUT`, then extra samplers in
//! declaration order.

use crate::error::CompileError;
use crate::ir::{INPUT, OUTPUT, PassInfo, TextureFormat, WgfxShaderInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Slot of the default sampler
pub const DEFAULT_SAMPLER_SLOT: u32 = 0;
/// Slot of the packed parameter uniform
pub const PARAMETERS_SLOT: u32 = 1;
/// Slot of the scene uniform
pub const SCENE_SLOT: u32 = 4;

/// WGSL name of the default sampler
pub const DEFAULT_SAMPLER_NAME: &str = "wgfx_sampler";
/// WGSL name of the parameter uniform
pub const PARAMETERS_NAME: &str = "wgfx_params";
/// WGSL name of the scene uniform
pub const SCENE_NAME: &str = "wgfx_scene";

/// What a binding slot holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    DefaultSampler,
    Sampler { name: String },
    Parameters,
    Scene,
    /// A texture read through `texture_2d<f32>`
    SampledTexture { name: String },
    /// A texture written through `texture_storage_2d<format, write>`
    StorageTexture { name: String, format: TextureFormat },
}

impl BindingKind {
    /// Name of the resource in WGSL and in the resource manager
    pub fn resource_name(&self) -> &str {
        match self {
            Self::DefaultSampler => DEFAULT_SAMPLER_NAME,
            Self::Parameters => PARAMETERS_NAME,
            Self::Scene => SCENE_NAME,
            Self::Sampler { name } | Self::SampledTexture { name } | Self::StorageTexture { name, .. } => name,
        }
    }
}

/// One entry of a module's bind group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingSlot {
    pub binding: u32,
    pub kind: BindingKind,
}

/// Resources a generated module touches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Textures read or queried by the pass
    pub sampled_textures: BTreeSet<String>,
    /// Textures written by the pass
    pub storage_textures: BTreeSet<String>,
    /// Declared samplers used by the pass
    pub samplers: BTreeSet<String>,
    /// Whether the parameter uniform is bound
    pub uses_parameters: bool,
}

impl ResourceUsage {
    fn uses_texture(&self, name: &str) -> bool {
        self.sampled_textures.contains(name) || self.storage_textures.contains(name)
    }
}

/// Assigns binding slots to the resources a pass uses
///
/// # Arguments
/// * `info` - Effect the pass belongs to
/// * `pass` - Pass being laid out
/// * `usage` - Resources the pass touches
/// * `output_format` - Storage format of the caller-supplied `OUTPUT` texture
///
/// # Returns
/// Slots sorted by binding index
pub fn assign_bindings(info: &WgfxShaderInfo, pass: &PassInfo, usage: &ResourceUsage, output_format: TextureFormat) -> Result<Vec<BindingSlot>, CompileError> {
    if let Some(name) = usage.sampled_textures.intersection(&usage.storage_textures).next() {
        return Err(CompileError::layout(pass.index, None, format!("'{name}' is both read and written by the pass")));
    }

    let mut slots = vec![
        BindingSlot {
            binding: DEFAULT_SAMPLER_SLOT,
            kind: BindingKind::DefaultSampler,
        },
        BindingSlot {
            binding: SCENE_SLOT,
            kind: BindingKind::Scene,
        },
    ];
    if usage.uses_parameters {
        slots.push(BindingSlot {
            binding: PARAMETERS_SLOT,
            kind: BindingKind::Parameters,
        });
    }

    let texture_order = std::iter::once(INPUT).chain(info.textures.iter().map(|t| t.name.as_str())).chain(std::iter::once(OUTPUT));
    let mut requests = Vec::new();
    for name in texture_order.filter(|name| usage.uses_texture(name)) {
        let kind = if usage.storage_textures.contains(name) {
            let format = match info.texture(name) {
                Some(texture) => texture.format_or_default(),
                None => output_format,
            };
            BindingKind::StorageTexture { name: name.to_string(), format }
        } else {
            BindingKind::SampledTexture { name: name.to_string() }
        };
        requests.push(kind);
    }
    for sampler in info.samplers.iter().filter(|s| usage.samplers.contains(&s.name)) {
        requests.push(BindingKind::Sampler { name: sampler.name.clone() });
    }

    let mut taken: HashSet<u32> = slots.iter().map(|slot| slot.binding).collect();
    let mut next = 0;
    for kind in requests {
        while taken.contains(&next) {
            next += 1;
        }
        taken.insert(next);
        slots.push(BindingSlot { binding: next, kind });
    }

    slots.sort_by_key(|slot| slot.binding);
    validate_bindings(pass.index, &slots)?;
    Ok(slots)
}

/// Checks that no two resources share a slot and no resource is bound twice
pub fn validate_bindings(pass: u32, slots: &[BindingSlot]) -> Result<(), CompileError> {
    let mut bindings = HashSet::new();
    let mut names = HashSet::new();
    for slot in slots {
        if !bindings.insert(slot.binding) {
            return Err(CompileError::layout(pass, Some(slot.binding), format!("slot assigned twice, second time to '{}'", slot.kind.resource_name())));
        }
        if !names.insert(slot.kind.resource_name()) {
            return Err(CompileError::layout(pass, Some(slot.binding), format!("'{}' is bound more than once", slot.kind.resource_name())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;
    use crate::parser::parse_effect;

    fn usage(sampled: &[&str], storage: &[&str], samplers: &[&str], uses_parameters: bool) -> ResourceUsage {
        ResourceUsage {
            sampled_textures: sampled.iter().map(|s| s.to_string()).collect(),
            storage_textures: storage.iter().map(|s| s.to_string()).collect(),
            samplers: samplers.iter().map(|s| s.to_string()).collect(),
            uses_parameters,
        }
    }

    fn bindings(slots: &[BindingSlot]) -> Vec<(u32, &str)> {
        slots.iter().map(|slot| (slot.binding, slot.kind.resource_name())).collect()
    }

    #[test]
    fn test_fixed_slots_and_lowest_free() {
        let info = parse_effect("//! TEXTURE A 4 4\n//! TEXTURE B 4 4 rgba32float\n//! SAMPLER s POINT\n//! PARAMETER P float\n//! PASS 0\n//! OUT OUTPUT\n").unwrap();
        let slots = assign_bindings(&info, &info.passes[0], &usage(&["INPUT", "A"], &["B"], &["s"], true), TextureFormat::Rgba8Unorm).unwrap();
        assert_eq!(bindings(&slots), vec![(0, "wgfx_sampler"), (1, "wgfx_params"), (2, "INPUT"), (3, "A"), (4, "wgfx_scene"), (5, "B"), (6, "s")]);
        assert_eq!(
            slots[5].kind,
            BindingKind::StorageTexture {
                name: "B".to_string(),
                format: TextureFormat::Rgba32Float
            }
        );
    }

    #[test]
    fn test_slot_one_is_free_without_parameters() {
        let info = parse_effect("//! PASS 0\n//! IN INPUT\n//! OUT OUTPUT\n").unwrap();
        let slots = assign_bindings(&info, &info.passes[0], &usage(&["INPUT"], &["OUTPUT"], &[], false), TextureFormat::Rgba16Float).unwrap();
        assert_eq!(bindings(&slots), vec![(0, "wgfx_sampler"), (1, "INPUT"), (2, "OUTPUT"), (4, "wgfx_scene")]);
        assert_eq!(
            slots[2].kind,
            BindingKind::StorageTexture {
                name: "OUTPUT".to_string(),
                format: TextureFormat::Rgba16Float
            }
        );
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let info = parse_effect("//! TEXTURE A 4 4\n//! TEXTURE B 4 4\n//! PASS 0\n//! OUT OUTPUT\n").unwrap();
        let used = usage(&["B", "A", "INPUT"], &["OUTPUT"], &[], false);
        let first = assign_bindings(&info, &info.passes[0], &used, TextureFormat::Rgba8Unorm).unwrap();
        let second = assign_bindings(&info, &info.passes[0], &used, TextureFormat::Rgba8Unorm).unwrap();
        assert_eq!(first, second);
        assert_eq!(bindings(&first)[1..4], [(1, "INPUT"), (2, "A"), (3, "B")]);
    }

    #[test]
    fn test_read_write_conflict() {
        let info = parse_effect("//! TEXTURE A 4 4\n//! PASS 0\n//! OUT A\n").unwrap();
        let err = assign_bindings(&info, &info.passes[0], &usage(&["A"], &["A"], &[], false), TextureFormat::Rgba8Unorm).unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::Layout);
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn test_collision_is_reported_with_slot() {
        let slots = vec![
            BindingSlot {
                binding: 4,
                kind: BindingKind::Scene,
            },
            BindingSlot {
                binding: 4,
                kind: BindingKind::SampledTexture { name: "A".to_string() },
            },
        ];
        match validate_bindings(2, &slots) {
            Err(CompileError::Layout { pass, slot, .. }) => assert_eq!((pass, slot), (2, Some(4))),
            other => panic!("expected layout error, got {other:?}"),
        }
    }
}
