//! Shader link: the aggregate passed along shader-typed sockets.
//!
//! A closure node does not produce a single value but a fixed set of named
//! shading properties, each optionally bound to a generated identifier. The
//! property set and the per-property script types are closed and defined by
//! the target rendering model.

/// Named shading property of a fragment shader link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProp {
    Albedo,
    SssStrength,
    Specular,
    Metallic,
    Roughness,
    Clearcoat,
    ClearcoatGloss,
    Anisotropy,
    Transmission,
    Ior,
    Alpha,
    Normal,
    Tangent,
    Ao,
    Emission,
}

impl ShaderProp {
    pub const ALL: [ShaderProp; 15] = [
        ShaderProp::Albedo,
        ShaderProp::SssStrength,
        ShaderProp::Specular,
        ShaderProp::Metallic,
        ShaderProp::Roughness,
        ShaderProp::Clearcoat,
        ShaderProp::ClearcoatGloss,
        ShaderProp::Anisotropy,
        ShaderProp::Transmission,
        ShaderProp::Ior,
        ShaderProp::Alpha,
        ShaderProp::Normal,
        ShaderProp::Tangent,
        ShaderProp::Ao,
        ShaderProp::Emission,
    ];

    /// Script-level type of this property, fixed per property name.
    pub fn script_type(self) -> &'static str {
        match self {
            ShaderProp::Albedo
            | ShaderProp::Transmission
            | ShaderProp::Normal
            | ShaderProp::Tangent
            | ShaderProp::Emission => "vec3",
            _ => "float",
        }
    }

    /// Lowercase name used when composing generated identifiers.
    pub fn name(self) -> &'static str {
        match self {
            ShaderProp::Albedo => "albedo",
            ShaderProp::SssStrength => "sss_strength",
            ShaderProp::Specular => "specular",
            ShaderProp::Metallic => "metallic",
            ShaderProp::Roughness => "roughness",
            ShaderProp::Clearcoat => "clearcoat",
            ShaderProp::ClearcoatGloss => "clearcoat_gloss",
            ShaderProp::Anisotropy => "anisotropy",
            ShaderProp::Transmission => "transmission",
            ShaderProp::Ior => "ior",
            ShaderProp::Alpha => "alpha",
            ShaderProp::Normal => "normal",
            ShaderProp::Tangent => "tangent",
            ShaderProp::Ao => "ao",
            ShaderProp::Emission => "emission",
        }
    }
}

/// Aggregate of optionally-bound shading property identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentShaderLink {
    slots: [Option<String>; ShaderProp::ALL.len()],
}

impl FragmentShaderLink {
    pub fn new() -> FragmentShaderLink {
        FragmentShaderLink::default()
    }

    pub fn get(&self, prop: ShaderProp) -> Option<&str> {
        self.slots[prop as usize].as_deref()
    }

    pub fn set(&mut self, prop: ShaderProp, identifier: impl Into<String>) {
        self.slots[prop as usize] = Some(identifier.into());
    }

    /// Iterate the bound `(property, identifier)` pairs in fixed order.
    pub fn bound(&self) -> impl Iterator<Item = (ShaderProp, &str)> {
        ShaderProp::ALL
            .iter()
            .filter_map(|p| self.get(*p).map(|id| (*p, id)))
    }
}
