//! Shader function registry.
//!
//! Maps a node kind (or a parametrized function name such as the blend-mode
//! variants of `node_mix_rgb_*`) to a callable function descriptor. The
//! function bodies themselves live in the target-side shader library; the
//! compiler only needs names and socket orderings.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::graph::Node;
use crate::shader_link::ShaderProp;

/// Descriptor of a callable shader library function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: &'static str,
    /// Node input sockets fed positionally into the call, by name.
    pub in_sockets: &'static [&'static str],
    /// Shader link properties bound positionally to the call outputs.
    /// Empty for functions whose outputs map to plain node sockets.
    pub output_properties: &'static [ShaderProp],
}

use ShaderProp::*;

const DESCRIPTORS: &[FunctionDescriptor] = &[
    // Closures
    FunctionDescriptor {
        name: "node_bsdf_principled",
        in_sockets: &[
            "Base Color",
            "Subsurface",
            "Metallic",
            "Specular",
            "Roughness",
            "Clearcoat",
            "Clearcoat Roughness",
            "Anisotropic",
            "Transmission",
            "IOR",
            "Alpha",
        ],
        output_properties: &[
            Albedo,
            SssStrength,
            Metallic,
            Specular,
            Roughness,
            Clearcoat,
            ClearcoatGloss,
            Anisotropy,
            Transmission,
            Ior,
            Alpha,
        ],
    },
    FunctionDescriptor {
        name: "node_bsdf_diffuse",
        in_sockets: &["Color", "Roughness"],
        output_properties: &[Albedo, Roughness],
    },
    FunctionDescriptor {
        name: "node_bsdf_glossy",
        in_sockets: &["Color", "Roughness"],
        output_properties: &[Albedo, Roughness, Metallic],
    },
    FunctionDescriptor {
        name: "node_bsdf_glass",
        in_sockets: &["Color", "Roughness", "IOR"],
        output_properties: &[Albedo, Roughness, Ior, Alpha],
    },
    FunctionDescriptor {
        name: "node_bsdf_transparent",
        in_sockets: &["Color"],
        output_properties: &[Albedo, Alpha],
    },
    FunctionDescriptor {
        name: "node_bsdf_translucent",
        in_sockets: &["Color"],
        output_properties: &[Albedo, Transmission],
    },
    FunctionDescriptor {
        name: "node_emission",
        in_sockets: &["Color", "Strength"],
        output_properties: &[Emission],
    },
    // Per-kind helpers whose outputs bind to plain sockets
    FunctionDescriptor {
        name: "node_tex_image",
        in_sockets: &["Vector"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_normal_map",
        in_sockets: &["Strength", "Color"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_bump",
        in_sockets: &["Strength", "Distance", "Height", "Normal"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_mapping",
        in_sockets: &["Vector"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_hsv",
        in_sockets: &["Fac", "Hue", "Saturation", "Value", "Color"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_invert",
        in_sockets: &["Fac", "Color"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_separate_rgb",
        in_sockets: &["Image"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_combine_rgb",
        in_sockets: &["R", "G", "B"],
        output_properties: &[],
    },
    FunctionDescriptor {
        name: "node_fresnel",
        in_sockets: &["IOR", "Normal"],
        output_properties: &[],
    },
    // RGB blend modes; deliberately partial, unknown modes fall back to mix.
    FunctionDescriptor { name: "node_mix_rgb_mix", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_add", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_multiply", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_subtract", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_screen", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_difference", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_darken", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    FunctionDescriptor { name: "node_mix_rgb_lighten", in_sockets: &["Fac", "Color1", "Color2"], output_properties: &[] },
    // Parametrized math variants
    FunctionDescriptor { name: "node_math_add", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_math_subtract", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_math_multiply", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_math_divide", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_math_power", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_math_sine", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_math_cosine", in_sockets: &["Value", "Value"], output_properties: &[] },
    FunctionDescriptor { name: "node_vector_math_add", in_sockets: &["Vector", "Vector"], output_properties: &[] },
    FunctionDescriptor { name: "node_vector_math_subtract", in_sockets: &["Vector", "Vector"], output_properties: &[] },
    FunctionDescriptor { name: "node_vector_math_average", in_sockets: &["Vector", "Vector"], output_properties: &[] },
    FunctionDescriptor { name: "node_vector_math_dot_product", in_sockets: &["Vector", "Vector"], output_properties: &[] },
    FunctionDescriptor { name: "node_vector_math_cross_product", in_sockets: &["Vector", "Vector"], output_properties: &[] },
    FunctionDescriptor { name: "node_vector_math_normalize", in_sockets: &["Vector", "Vector"], output_properties: &[] },
    // Coordinate space conversions, in-place on a vec3 variable
    FunctionDescriptor { name: "space_convert_yup_to_zup", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "space_convert_zup_to_yup", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "dir_space_convert_view_to_model", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "point_space_convert_view_to_model", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "dir_space_convert_model_to_view", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "point_space_convert_model_to_view", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "dir_space_convert_view_to_world", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "point_space_convert_view_to_world", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "dir_space_convert_world_to_view", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "point_space_convert_world_to_view", in_sockets: &[], output_properties: &[] },
    // Vector-to-matrix helpers for the dynamic mapping branch
    FunctionDescriptor { name: "location_to_mat4", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "euler_angle_XYZ_to_mat4", in_sockets: &[], output_properties: &[] },
    FunctionDescriptor { name: "scale_to_mat4", in_sockets: &[], output_properties: &[] },
];

/// Node kinds whose function is a plain kind→name mapping.
const NODE_FUNCTIONS: &[(&str, &str)] = &[
    ("BsdfPrincipled", "node_bsdf_principled"),
    ("BsdfDiffuse", "node_bsdf_diffuse"),
    ("BsdfGlossy", "node_bsdf_glossy"),
    ("BsdfGlass", "node_bsdf_glass"),
    ("BsdfTransparent", "node_bsdf_transparent"),
    ("BsdfTranslucent", "node_bsdf_translucent"),
    ("Emission", "node_emission"),
    ("ImageTexture", "node_tex_image"),
    ("NormalMap", "node_normal_map"),
    ("Bump", "node_bump"),
    ("Mapping", "node_mapping"),
    ("HueSaturation", "node_hsv"),
    ("Invert", "node_invert"),
    ("SeparateRGB", "node_separate_rgb"),
    ("CombineRGB", "node_combine_rgb"),
    ("Fresnel", "node_fresnel"),
];

fn by_name() -> &'static HashMap<&'static str, &'static FunctionDescriptor> {
    static MAP: OnceLock<HashMap<&'static str, &'static FunctionDescriptor>> = OnceLock::new();
    MAP.get_or_init(|| DESCRIPTORS.iter().map(|d| (d.name, d)).collect())
}

fn by_kind() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| NODE_FUNCTIONS.iter().copied().collect())
}

/// Function name for a node, resolving parametrized kinds (`Math` and
/// `VectorMath` read their `operation` parameter) before falling back to
/// the kind table.
fn function_name_for(node: &Node) -> Option<String> {
    if node.kind == "Math" {
        let op = node.param_str("operation").unwrap_or("ADD").to_ascii_lowercase();
        return Some(format!("node_math_{op}"));
    }
    if node.kind == "VectorMath" {
        let op = node.param_str("operation").unwrap_or("ADD").to_ascii_lowercase();
        return Some(format!("node_vector_math_{op}"));
    }
    by_kind().get(node.kind.as_str()).map(|n| (*n).to_string())
}

pub fn find_function_by_name(name: &str) -> Option<&'static FunctionDescriptor> {
    by_name().get(name).copied()
}

pub fn find_function_for(node: &Node) -> Option<&'static FunctionDescriptor> {
    function_name_for(node).and_then(|n| find_function_by_name(&n))
}

pub fn has_function(node: &Node) -> bool {
    find_function_for(node).is_some()
}

/// Look up a function the compiler itself depends on. A missing entry is a
/// registry defect, not an input problem.
pub(crate) fn builtin(name: &str) -> &'static FunctionDescriptor {
    find_function_by_name(name)
        .unwrap_or_else(|| panic!("shader library function '{name}' missing from registry"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_lookup() {
        let node = Node::new("BsdfDiffuse", "d");
        let f = find_function_for(&node).unwrap();
        assert_eq!(f.name, "node_bsdf_diffuse");
        assert_eq!(f.in_sockets, ["Color", "Roughness"]);
        assert_eq!(f.output_properties, [Albedo, Roughness]);
    }

    #[test]
    fn parametrized_math_lookup() {
        let node = Node::new("Math", "m").with_param("operation", serde_json::json!("MULTIPLY"));
        assert_eq!(find_function_for(&node).unwrap().name, "node_math_multiply");

        let unknown = Node::new("Math", "m").with_param("operation", serde_json::json!("ARCTAN2"));
        assert!(find_function_for(&unknown).is_none());
    }

    #[test]
    fn parametrized_vector_math_lookup() {
        let node = Node::new("VectorMath", "v")
            .with_param("operation", serde_json::json!("CROSS_PRODUCT"));
        assert_eq!(find_function_for(&node).unwrap().name, "node_vector_math_cross_product");
    }

    #[test]
    fn unknown_kind_is_not_found() {
        assert!(!has_function(&Node::new("VolumeScatter", "v")));
        assert!(find_function_by_name("node_mix_rgb_hue").is_none());
    }

    #[test]
    fn blend_mode_variants_resolve_by_name() {
        assert!(find_function_by_name("node_mix_rgb_multiply").is_some());
        assert!(find_function_by_name("node_mix_rgb_mix").is_some());
    }
}
