//! Texture sampling and coordinate source nodes.

use std::collections::{HashSet, VecDeque};

use anyhow::{Result, bail};

use super::converter::{
    AABB_UVW, NodeConverter, ShadingFlags, SocketBinding, TextureHint,
};
use crate::diagnostics::Diagnostics;
use crate::functions;
use crate::graph::{Graph, NodeId, SocketDir, SocketRef};

/// Forward-trace the Color output of a sampling node to see whether it ends
/// up feeding one of the given `(node kind, input socket name)` targets.
fn color_output_feeds(graph: &Graph, id: NodeId, targets: &[(&str, &str)]) -> bool {
    let node = graph.node(id);
    let Some(color_index) = node.output_index("Color") else {
        return false;
    };

    let mut queue: VecDeque<SocketRef> = graph
        .outgoing_links(SocketRef::output(id, color_index))
        .map(|l| l.to)
        .collect();
    let mut visited: HashSet<NodeId> = HashSet::new();

    while let Some(to) = queue.pop_front() {
        let to_node = graph.node(to.node);
        let to_socket = graph.socket(to);
        if targets
            .iter()
            .any(|(kind, socket)| to_node.kind == *kind && to_socket.name == *socket)
        {
            return true;
        }
        // The graph is expected to be acyclic, but a malformed one must not
        // hang the trace.
        if visited.insert(to.node) {
            for index in 0..to_node.outputs.len() {
                queue.extend(
                    graph
                        .outgoing_links(SocketRef::output(to.node, index))
                        .map(|l| l.to),
                );
            }
        }
    }
    false
}

/// Classify a sampled texture for uniform hints. Normal usage takes
/// precedence over albedo usage.
fn texture_hint(graph: &Graph, id: NodeId) -> TextureHint {
    if color_output_feeds(graph, id, &[("NormalMap", "Color")]) {
        TextureHint::Normal
    } else if color_output_feeds(
        graph,
        id,
        &[("BsdfPrincipled", "Base Color"), ("BsdfDiffuse", "Color")],
    ) {
        TextureHint::Albedo
    } else {
        TextureHint::None
    }
}

/// Sample an image texture. An unlinked coordinate input falls back to UV.
pub(super) fn image_texture(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    let function = functions::builtin("node_tex_image");

    let tex_coord = conv.input_variable_at(graph, 0)?;
    if !graph.is_linked(SocketRef::input(conv.node, 0)) {
        conv.local_code.push(format!("{tex_coord} = vec3(UV, 0.0)"));
    }

    let tex_var = conv.texture_id(&node.name);
    let hint = texture_hint(graph, conv.node);
    conv.register_texture(node.param_str("image").map(String::from), tex_var.clone(), hint);

    let mut out_args = Vec::with_capacity(node.outputs.len());
    for (index, socket) in node.outputs.iter().enumerate() {
        let output_var = conv.socket_id(&socket.name, SocketDir::Output);
        conv.bind_output(index, SocketBinding::Variable(output_var.clone()));
        out_args.push(output_var);
    }

    conv.add_function_call(function, &[tex_coord, tex_var], &out_args);
    Ok(())
}

/// Texture coordinate source. Only linked outputs get bound and computed;
/// each one is converted out of view space into the z-up model space the
/// rest of the graph works in.
pub(super) fn tex_coord(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    for (index, socket) in node.outputs.iter().enumerate() {
        let sref = SocketRef::output(conv.node, index);
        if !graph.is_linked(sref) {
            continue;
        }
        // Unrecognized sockets must not take an output counter slot.
        if !matches!(
            socket.name.as_str(),
            "UV" | "Window" | "Camera" | "Normal" | "Object" | "Reflection" | "Generated"
        ) {
            continue;
        }
        let socket_id = conv.socket_id(&socket.name, SocketDir::Output);
        match socket.name.as_str() {
            "UV" => conv.local_code.push(format!("{socket_id} = vec3(UV, 0.0)")),
            "Window" => conv.local_code.push(format!("{socket_id} = vec3(SCREEN_UV, 0.0)")),
            "Camera" => {
                conv.local_code.push(format!("{socket_id} = vec3(VERTEX.xy, -VERTEX.z)"))
            }
            "Normal" => {
                conv.local_code.push(format!("{socket_id} = NORMAL"));
                conv.view_to_model(&socket_id, true);
                conv.yup_to_zup(&socket_id);
            }
            "Object" => {
                conv.local_code.push(format!("{socket_id} = VERTEX"));
                conv.view_to_model(&socket_id, false);
                conv.yup_to_zup(&socket_id);
            }
            "Reflection" => {
                conv.local_code
                    .push(format!("{socket_id} = reflect(normalize(VERTEX), NORMAL)"));
                conv.view_to_model(&socket_id, true);
                conv.yup_to_zup(&socket_id);
            }
            "Generated" => {
                conv.flags |= ShadingFlags::AABB_TEX_COORD;
                conv.local_code.push(format!("{socket_id} = {AABB_UVW}"));
            }
            _ => {}
        }
        conv.bind_output(index, SocketBinding::Variable(socket_id));
    }
    Ok(())
}

/// Tangent source. Only the UV-map derived tangent is supported.
pub(super) fn tangent(
    conv: &mut NodeConverter,
    graph: &Graph,
    diag: &mut Diagnostics,
) -> Result<()> {
    let node = graph.node(conv.node);
    if let Some(direction_type) = node.param_str("direction_type") {
        if direction_type != "UV_MAP" {
            diag.warn(format!("tangent space Radial not supported at {}", node.name));
        }
    }

    conv.flags |= ShadingFlags::UV_OR_TANGENT;

    let Some(socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let tangent_id = conv.socket_id(&socket.name, SocketDir::Output);
    conv.local_code.push(format!("{tangent_id} = TANGENT"));
    conv.bind_output(0, SocketBinding::Variable(tangent_id));
    Ok(())
}

/// UV map source. The compiled script can only reach the active UV layer,
/// so a named layer selection is best-effort.
pub(super) fn uv_map(
    conv: &mut NodeConverter,
    graph: &Graph,
    diag: &mut Diagnostics,
) -> Result<()> {
    conv.flags |= ShadingFlags::UV_OR_TANGENT;

    let node = graph.node(conv.node);
    let Some(index) = node.output_index("UV") else {
        bail!("node '{}' has no output socket 'UV'", node.name);
    };
    let uv_id = conv.socket_id("UV", SocketDir::Output);
    conv.local_code.push(format!("{uv_id} = vec3(UV, 0.0)"));
    conv.bind_output(index, SocketBinding::Variable(uv_id));

    diag.warn(format!(
        "'{}' uses the active UV map, make sure the correct one is selected, at '{}'",
        node.kind, node.name
    ));
    Ok(())
}

/// Geometry sources: position, normal and tangent in z-up world space.
pub(super) fn geometry(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    for (socket_name, builtin_name, is_direction) in [
        ("Position", "VERTEX", false),
        ("Normal", "NORMAL", true),
        ("Tangent", "TANGENT", true),
    ] {
        let Some(index) = node.output_index(socket_name) else {
            continue;
        };
        let socket_id = conv.socket_id(socket_name, SocketDir::Output);
        conv.local_code.push(format!("{socket_id} = {builtin_name}"));
        conv.view_to_world(&socket_id, is_direction);
        conv.yup_to_zup(&socket_id);
        conv.bind_output(index, SocketBinding::Variable(socket_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ConverterKind, compile_material};
    use crate::graph::{Node, Socket};
    use crate::value::Value;

    fn image_node(name: &str, image: Option<&str>) -> Node {
        let mut node = Node::new("ImageTexture", name)
            .with_input(Socket::vector("Vector"))
            .with_output(Socket::color("Color"))
            .with_output(Socket::value("Alpha"));
        if let Some(image) = image {
            node = node.with_param("image", serde_json::json!(image));
        }
        node
    }

    fn tex_coord_node() -> Node {
        Node::new("TexCoord", "coords")
            .with_output(Socket::vector("Generated"))
            .with_output(Socket::vector("Normal"))
            .with_output(Socket::vector("UV"))
            .with_output(Socket::vector("Object"))
            .with_output(Socket::vector("Camera"))
            .with_output(Socket::vector("Window"))
            .with_output(Socket::vector("Reflection"))
    }

    fn diffuse_node() -> Node {
        Node::new("BsdfDiffuse", "d")
            .with_input(Socket::color("Color"))
            .with_input(Socket::value("Roughness").with_default(Value::Float(0.5)))
            .with_output(Socket::shader("BSDF"))
    }

    #[test]
    fn unlinked_coordinate_falls_back_to_uv() {
        let mut g = Graph::default();
        let tex = g.add_node(image_node("tex", Some("wood.png")));
        let material = compile_material(&g, &[tex]).unwrap();
        assert!(material.fragment_code.contains("node0_in0_vector = vec3(UV, 0.0);"));
        assert!(material.fragment_code.contains("node_tex_image(node0_in0_vector, "));
        assert_eq!(material.textures.len(), 1);
        assert_eq!(material.textures[0].image.as_deref(), Some("wood.png"));
        assert_eq!(material.textures[0].hint, TextureHint::None);
    }

    #[test]
    fn albedo_hint_traces_forward_links() {
        let mut g = Graph::default();
        let tex = g.add_node(image_node("tex", Some("wood.png")));
        let inv = g.add_node(
            Node::new("Invert", "inv")
                .with_input(Socket::value("Fac").with_default(Value::Float(0.0)))
                .with_input(Socket::color("Color"))
                .with_output(Socket::color("Color")),
        );
        let bsdf = g.add_node(diffuse_node());
        g.connect(SocketRef::output(tex, 0), SocketRef::input(inv, 1));
        g.connect(SocketRef::output(inv, 0), SocketRef::input(bsdf, 0));

        let material = compile_material(&g, &[tex, inv, bsdf]).unwrap();
        assert_eq!(material.textures[0].hint, TextureHint::Albedo);
    }

    #[test]
    fn normal_hint_wins_over_albedo() {
        let mut g = Graph::default();
        let tex = g.add_node(image_node("tex", Some("n.png")));
        let nm = g.add_node(
            Node::new("NormalMap", "nm")
                .with_input(Socket::value("Strength").with_default(Value::Float(1.0)))
                .with_input(Socket::color("Color"))
                .with_output(Socket::vector("Normal")),
        );
        g.connect(SocketRef::output(tex, 0), SocketRef::input(nm, 1));
        let material = compile_material(&g, &[tex, nm]).unwrap();
        assert_eq!(material.textures[0].hint, TextureHint::Normal);
    }

    #[test]
    fn duplicate_textures_are_merged() {
        let mut g = Graph::default();
        let tex_a = g.add_node(image_node("tex_a", Some("wood.png")));
        let tex_b = g.add_node(image_node("tex_b", Some("wood.png")));
        let material = compile_material(&g, &[tex_a, tex_b]).unwrap();
        assert_eq!(material.textures.len(), 1);
        assert!(material.textures[0].identifier.starts_with("node0_tex"));
    }

    #[test]
    fn tex_coord_binds_only_linked_outputs() {
        let mut g = Graph::default();
        let coords = g.add_node(tex_coord_node());
        let tex = g.add_node(image_node("tex", None));
        let uv_index = g.node(coords).output_index("UV").unwrap();
        g.connect(SocketRef::output(coords, uv_index), SocketRef::input(tex, 0));

        let material = compile_material(&g, &[coords, tex]).unwrap();
        assert!(material.fragment_code.contains("node0_out0_uv = vec3(UV, 0.0);"));
        // Unlinked outputs produce neither declarations nor code.
        assert!(!material.fragment_code.contains("SCREEN_UV"));
        assert!(!material.fragment_code.contains("reflect("));
        assert!(!material.flags.contains(ShadingFlags::AABB_TEX_COORD));
    }

    #[test]
    fn unrecognized_coordinate_outputs_take_no_counter_slot() {
        let mut g = Graph::default();
        let coords = g.add_node(
            Node::new("TexCoord", "coords")
                .with_output(Socket::vector("Pointiness"))
                .with_output(Socket::vector("UV")),
        );
        let tex_a = g.add_node(image_node("a", None));
        let tex_b = g.add_node(image_node("b", None));
        g.connect(SocketRef::output(coords, 0), SocketRef::input(tex_a, 0));
        g.connect(SocketRef::output(coords, 1), SocketRef::input(tex_b, 0));

        let mut conv = NodeConverter::new(0, coords, ConverterKind::TexCoord);
        tex_coord(&mut conv, &g).unwrap();
        // The recognized output still gets the first counter slot even when
        // a linked unknown socket precedes it.
        assert!(conv.local_code.contains(&"node0_out0_uv = vec3(UV, 0.0)".to_string()));
        assert_eq!(conv.out_sockets.len(), 1);
        assert!(conv.out_sockets.contains_key(&SocketRef::output(coords, 1)));
    }

    #[test]
    fn generated_coordinates_use_aabb_uniform() {
        let mut g = Graph::default();
        let coords = g.add_node(tex_coord_node());
        let tex = g.add_node(image_node("tex", None));
        let gen_index = g.node(coords).output_index("Generated").unwrap();
        g.connect(SocketRef::output(coords, gen_index), SocketRef::input(tex, 0));

        let material = compile_material(&g, &[coords, tex]).unwrap();
        assert!(material.fragment_code.contains("node0_out0_generated = AABB_UVW;"));
        assert!(material.flags.contains(ShadingFlags::AABB_TEX_COORD));
    }

    #[test]
    fn object_coordinates_leave_view_space() {
        let mut g = Graph::default();
        let coords = g.add_node(tex_coord_node());
        let tex = g.add_node(image_node("tex", None));
        let obj_index = g.node(coords).output_index("Object").unwrap();
        g.connect(SocketRef::output(coords, obj_index), SocketRef::input(tex, 0));

        let material = compile_material(&g, &[coords, tex]).unwrap();
        assert!(material.fragment_code.contains("node0_out0_object = VERTEX;"));
        assert!(material.fragment_code.contains(
            "point_space_convert_view_to_model(node0_out0_object, INV_MODEL_MAT, INV_VIEW_MAT);"
        ));
        assert!(material
            .fragment_code
            .contains("space_convert_yup_to_zup(node0_out0_object);"));
        assert!(material.flags.contains(ShadingFlags::INV_VIEW_MAT));
        assert!(material.flags.contains(ShadingFlags::INV_MODEL_MAT));
    }

    #[test]
    fn uv_map_warns_about_active_layer() {
        let mut g = Graph::default();
        let uv = g.add_node(
            Node::new("UVMap", "uvmap")
                .with_param("uv_map", serde_json::json!("UVMap.001"))
                .with_output(Socket::vector("UV")),
        );
        let material = compile_material(&g, &[uv]).unwrap();
        assert!(material.fragment_code.contains("node0_out0_uv = vec3(UV, 0.0);"));
        assert!(material.flags.contains(ShadingFlags::UV_OR_TANGENT));
        assert_eq!(material.warnings.len(), 1);
    }

    #[test]
    fn geometry_outputs_convert_to_world_zup() {
        let mut g = Graph::default();
        let geo = g.add_node(
            Node::new("Geometry", "geo")
                .with_output(Socket::vector("Position"))
                .with_output(Socket::vector("Normal"))
                .with_output(Socket::vector("Tangent")),
        );
        let material = compile_material(&g, &[geo]).unwrap();
        assert!(material.fragment_code.contains("node0_out0_position = VERTEX;"));
        assert!(material.fragment_code.contains(
            "point_space_convert_view_to_world(node0_out0_position, INV_VIEW_MAT);"
        ));
        assert!(material.fragment_code.contains(
            "dir_space_convert_view_to_world(node0_out1_normal, INV_VIEW_MAT);"
        ));
        assert!(material.flags.contains(ShadingFlags::INV_VIEW_MAT));
    }
}
