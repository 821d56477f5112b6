//! Material graph compilation pipeline.
//!
//! Each node in processing order gets a [`NodeConverter`] driven through
//! three phases: input initialization, body generation and output
//! finalization. The per-node text bundles are then concatenated into the
//! fragment and vertex programs of the compiled material.

pub mod converter;

mod color_nodes;
mod shader_nodes;
mod texture_nodes;
mod vector_nodes;

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{Result, bail};

use crate::diagnostics::Diagnostics;
use crate::functions;
use crate::graph::{Graph, NodeId};

pub use converter::{
    NodeConverter, ShadingFlags, SocketBinding, TextureBinding, TextureHint,
};

/// Closed set of node handling strategies. Every node classifies into
/// exactly one; `Unsupported` is the terminal fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    Mapping,
    ImageTexture,
    TexCoord,
    Rgb,
    MixRgb,
    NormalMap,
    Bump,
    Reroute,
    MixShader,
    AddShader,
    Tangent,
    UvMap,
    Value,
    Geometry,
    HueSaturation,
    Invert,
    /// A closure node with a registered shader library function.
    Bsdf,
    /// Any other node with a registered function, handled positionally.
    General,
    Unsupported,
}

/// Names a closure-producing output socket.
fn is_closure_socket_name(name: &str) -> bool {
    matches!(name, "Emission" | "BSDF" | "BSSRDF")
}

/// Pick the handling strategy for a node: special kinds first, then
/// closure outputs, then the plain function registry.
pub fn classify(graph: &Graph, id: NodeId) -> ConverterKind {
    let node = graph.node(id);
    match node.kind.as_str() {
        "Mapping" => ConverterKind::Mapping,
        "ImageTexture" => ConverterKind::ImageTexture,
        "TexCoord" => ConverterKind::TexCoord,
        "RGB" => ConverterKind::Rgb,
        "MixRGB" => ConverterKind::MixRgb,
        "NormalMap" => ConverterKind::NormalMap,
        "Bump" => ConverterKind::Bump,
        "Reroute" => ConverterKind::Reroute,
        "MixShader" => ConverterKind::MixShader,
        "AddShader" => ConverterKind::AddShader,
        "Tangent" => ConverterKind::Tangent,
        "UVMap" => ConverterKind::UvMap,
        "Value" => ConverterKind::Value,
        "Geometry" => ConverterKind::Geometry,
        "HueSaturation" => ConverterKind::HueSaturation,
        "Invert" => ConverterKind::Invert,
        _ => {
            let is_closure = node
                .outputs
                .first()
                .is_some_and(|s| is_closure_socket_name(&s.name));
            if is_closure {
                if functions::has_function(node) {
                    ConverterKind::Bsdf
                } else {
                    ConverterKind::Unsupported
                }
            } else if functions::has_function(node) {
                ConverterKind::General
            } else {
                ConverterKind::Unsupported
            }
        }
    }
}

/// Phase two: emit the node body into the converter's buffers.
fn generate_fragment(
    conv: &mut NodeConverter,
    graph: &Graph,
    diag: &mut Diagnostics,
) -> Result<()> {
    match conv.kind {
        ConverterKind::Mapping => vector_nodes::mapping(conv, graph),
        ConverterKind::ImageTexture => texture_nodes::image_texture(conv, graph),
        ConverterKind::TexCoord => texture_nodes::tex_coord(conv, graph),
        ConverterKind::Rgb => color_nodes::rgb(conv, graph),
        ConverterKind::MixRgb => color_nodes::mix_rgb(conv, graph, diag),
        ConverterKind::NormalMap => vector_nodes::normal_map(conv, graph, diag),
        ConverterKind::Bump => vector_nodes::bump(conv, graph),
        ConverterKind::Reroute => vector_nodes::reroute(conv, graph),
        ConverterKind::MixShader => shader_nodes::mix_shader(conv, graph),
        ConverterKind::AddShader => shader_nodes::add_shader(conv, graph),
        ConverterKind::Tangent => texture_nodes::tangent(conv, graph, diag),
        ConverterKind::UvMap => texture_nodes::uv_map(conv, graph, diag),
        ConverterKind::Value => color_nodes::value(conv, graph),
        ConverterKind::Geometry => texture_nodes::geometry(conv, graph),
        ConverterKind::HueSaturation => color_nodes::hue_saturation(conv, graph),
        ConverterKind::Invert => color_nodes::invert(conv, graph),
        ConverterKind::Bsdf => shader_nodes::bsdf(conv, graph),
        ConverterKind::General => vector_nodes::general(conv, graph),
        ConverterKind::Unsupported => {
            conv.local_code.push("// Warn: node not supported".to_string());
            Ok(())
        }
    }
}

/// A fully compiled material script.
#[derive(Debug, Clone, Default)]
pub struct CompiledMaterial {
    /// Fragment program body, one statement or comment per line.
    pub fragment_code: String,
    /// Vertex program body; empty when no node contributed vertex work.
    pub vertex_code: String,
    /// Union of global features required by the graph.
    pub flags: ShadingFlags,
    /// Textures to declare as uniforms, deduplicated by `(image, hint)`.
    pub textures: Vec<TextureBinding>,
    /// Shader library functions referenced by the emitted code, sorted.
    pub functions: Vec<&'static str>,
    pub warnings: Vec<String>,
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    // Comments and full call statements need no terminator.
    if !(line.is_empty() || line.starts_with("//") || line.ends_with(';')) {
        buffer.push(';');
    }
    buffer.push('\n');
}

/// Compile a material graph into shader script text.
///
/// `order` is the node processing order; it must list every node exactly
/// once and producers before consumers (see [`Graph::topo_sort`]).
pub fn compile_material(graph: &Graph, order: &[NodeId]) -> Result<CompiledMaterial> {
    if order.len() != graph.nodes.len() {
        bail!(
            "processing order lists {} nodes, graph has {}",
            order.len(),
            graph.nodes.len()
        );
    }
    let distinct: HashSet<NodeId> = order.iter().copied().collect();
    if distinct.len() != order.len() {
        bail!("processing order repeats a node");
    }

    let mut diag = Diagnostics::new();
    let mut processed: HashMap<NodeId, NodeConverter> = HashMap::new();

    let mut material = CompiledMaterial::default();
    let mut fragment = String::new();
    let mut vertex = String::new();
    let mut seen_textures: HashSet<TextureBinding> = HashSet::new();
    let mut function_names: BTreeSet<&'static str> = BTreeSet::new();

    for (index, &id) in order.iter().enumerate() {
        let kind = classify(graph, id);
        let mut conv = NodeConverter::new(index, id, kind);

        conv.initialize_inputs(graph, &processed, &mut diag)?;
        generate_fragment(&mut conv, graph, &mut diag)?;
        conv.finalize_outputs(graph);

        for line in conv.fragment_lines() {
            push_line(&mut fragment, line);
        }
        for line in conv.vertex_lines() {
            push_line(&mut vertex, line);
        }
        material.flags |= conv.flags;
        for tex in &conv.textures {
            if seen_textures.insert(tex.clone()) {
                material.textures.push(tex.clone());
            }
        }
        function_names.extend(&conv.functions);

        processed.insert(id, conv);
    }

    material.fragment_code = fragment;
    material.vertex_code = vertex;
    material.functions = function_names.into_iter().collect();
    material.warnings = diag.into_warnings();
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, Socket, SocketRef};

    #[test]
    fn classify_special_kinds_before_registry() {
        let mut g = Graph::default();
        let id = g.add_node(Node::new("Mapping", "m"));
        assert_eq!(classify(&g, id), ConverterKind::Mapping);
    }

    #[test]
    fn classify_closure_output_with_function() {
        let mut g = Graph::default();
        let bsdf = g.add_node(
            Node::new("BsdfDiffuse", "d").with_output(Socket::shader("BSDF")),
        );
        assert_eq!(classify(&g, bsdf), ConverterKind::Bsdf);

        // A closure output with no registered function is unsupported, even
        // though a non-closure node of the same kind would be too.
        let volume = g.add_node(
            Node::new("VolumeScatter", "v").with_output(Socket::shader("BSDF")),
        );
        assert_eq!(classify(&g, volume), ConverterKind::Unsupported);
    }

    #[test]
    fn classify_registry_fallback() {
        let mut g = Graph::default();
        let math = g.add_node(
            Node::new("Math", "m")
                .with_param("operation", serde_json::json!("ADD"))
                .with_input(Socket::value("Value"))
                .with_input(Socket::value("Value"))
                .with_output(Socket::value("Value")),
        );
        assert_eq!(classify(&g, math), ConverterKind::General);

        let unknown = g.add_node(Node::new("LightPath", "l"));
        assert_eq!(classify(&g, unknown), ConverterKind::Unsupported);
    }

    #[test]
    fn compile_rejects_bad_order() {
        let mut g = Graph::default();
        let a = g.add_node(Node::new("RGB", "a").with_output(Socket::color("Color")));
        assert!(compile_material(&g, &[]).is_err());
        assert!(compile_material(&g, &[a, a]).is_err());
    }

    #[test]
    fn out_of_dependency_order_is_an_error() {
        let mut g = Graph::default();
        let rgb = g.add_node(Node::new("RGB", "rgb").with_output(Socket::color("Color")));
        let inv = g.add_node(
            Node::new("Invert", "inv")
                .with_input(Socket::value("Fac"))
                .with_input(Socket::color("Color"))
                .with_output(Socket::color("Color")),
        );
        g.connect(SocketRef::output(rgb, 0), SocketRef::input(inv, 1));
        assert!(compile_material(&g, &[inv, rgb]).is_err());
    }

    #[test]
    fn statement_lines_get_terminated() {
        let mut buf = String::new();
        push_line(&mut buf, "// input sockets handling");
        push_line(&mut buf, "float node0_in0_fac = 0.5");
        push_line(&mut buf, "node_invert(a, b, c);");
        push_line(&mut buf, "");
        assert_eq!(
            buf,
            "// input sockets handling\nfloat node0_in0_fac = 0.5;\nnode_invert(a, b, c);\n\n"
        );
    }
}
