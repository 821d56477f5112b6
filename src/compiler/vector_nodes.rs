//! Vector transform nodes, plus the positional fallback for any node whose
//! whole behavior is one shader library function.

use anyhow::{Result, bail};

use super::converter::{INV_VIEW_MAT, NodeConverter, ShadingFlags, SocketBinding};
use crate::diagnostics::Diagnostics;
use crate::functions;
use crate::graph::{Graph, Node, SocketDir, SocketRef};
use crate::value::{
    Value, euler_xyz_mat, mat4_invert, mat4_mul, mat4_transpose, scale_mat, translation_mat,
};

/// Pass-through: the output is whatever the input resolved to.
pub(super) fn reroute(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    if node.inputs.is_empty() || node.outputs.is_empty() {
        bail!("reroute node '{}' must have one input and one output", node.name);
    }
    let sref = SocketRef::input(conv.node, 0);
    let Some(binding) = conv.in_sockets.get(&sref) else {
        bail!("reroute node '{}' input was never bound", node.name);
    };
    let binding = binding.clone();
    conv.bind_output(0, binding);
    Ok(())
}

/// Perturb the normal along the surface height gradient.
pub(super) fn bump(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    let function = functions::builtin("node_bump");

    let mut in_arguments = Vec::new();
    for (index, socket) in node.inputs.iter().enumerate() {
        // Height deltas are editor-internal and never exported.
        if matches!(socket.name.as_str(), "Height_dx" | "Height_dy") {
            continue;
        }
        let socket_var = conv.input_variable_at(graph, index)?;
        if socket.name == "Normal" && graph.is_linked(SocketRef::input(conv.node, index)) {
            conv.zup_to_yup(&socket_var);
            conv.world_to_view(&socket_var, true);
        }
        in_arguments.push(socket_var);
    }

    in_arguments.push("VERTEX".to_string());
    let invert = if node.param_bool("invert").unwrap_or(false) { "1.0" } else { "0.0" };
    in_arguments.push(invert.to_string());

    let Some(out_socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let out_normal = conv.socket_id(&out_socket.name, SocketDir::Output);
    conv.bind_output(0, SocketBinding::Variable(out_normal.clone()));

    conv.add_function_call(function, &in_arguments, std::slice::from_ref(&out_normal));
    conv.view_to_world(&out_normal, true);
    conv.yup_to_zup(&out_normal);
    Ok(())
}

/// Unpack a normal from a color in the configured space. The result leaves
/// in z-up world space like every vector socket.
pub(super) fn normal_map(
    conv: &mut NodeConverter,
    graph: &Graph,
    diag: &mut Diagnostics,
) -> Result<()> {
    let node = graph.node(conv.node);
    let function = functions::builtin("node_normal_map");

    let mut in_arguments = Vec::with_capacity(node.inputs.len() + 3);
    for index in 0..node.inputs.len() {
        in_arguments.push(conv.input_variable_at(graph, index)?);
    }

    let Some(out_socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let output_normal = conv.socket_id(&out_socket.name, SocketDir::Output);
    conv.bind_output(0, SocketBinding::Variable(output_normal.clone()));

    let mut space = node.param_str("space").unwrap_or("TANGENT");
    if !matches!(space, "TANGENT" | "WORLD" | "OBJECT") {
        diag.warn(format!(
            "normal map space {space} not supported at {}, fall back to TANGENT",
            node.name
        ));
        space = "TANGENT";
    }

    match space {
        "WORLD" => {
            conv.flags |= ShadingFlags::INV_VIEW_MAT;
            in_arguments.extend(["NORMAL".to_string(), INV_VIEW_MAT.to_string()]);
            conv.add_function_call(function, &in_arguments, std::slice::from_ref(&output_normal));
            conv.yup_to_zup(&output_normal);
        }
        "OBJECT" => {
            conv.flags |= ShadingFlags::INV_VIEW_MAT;
            in_arguments.extend([
                "NORMAL".to_string(),
                INV_VIEW_MAT.to_string(),
                "WORLD_MATRIX".to_string(),
            ]);
            conv.add_function_call(function, &in_arguments, std::slice::from_ref(&output_normal));
            conv.yup_to_zup(&output_normal);
        }
        _ => {
            in_arguments.extend([
                "NORMAL".to_string(),
                "TANGENT".to_string(),
                "BINORMAL".to_string(),
            ]);
            conv.add_function_call(function, &in_arguments, std::slice::from_ref(&output_normal));
            conv.view_to_world(&output_normal, true);
            conv.yup_to_zup(&output_normal);
        }
    }
    Ok(())
}

fn param_vec3(node: &Node, key: &str, default: [f64; 3]) -> [f64; 3] {
    match node.param_value(key) {
        Some(Value::Vec3(v)) | Some(Value::Euler(v)) => v,
        Some(Value::Float(f)) => [f; 3],
        _ => default,
    }
}

/// Affine coordinate mapping. A node exported with baked `translation`,
/// `rotation` and `scale` parameters gets its transform computed here and
/// embedded as one matrix literal; otherwise the transform inputs are
/// sockets and the matrices are built at shader run time.
pub(super) fn mapping(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    let in_vec = conv.input_variable_at(graph, 0)?;

    let Some(out_socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let out_vec = conv.socket_id(&out_socket.name, SocketDir::Output);
    let vector_type = node.param_str("vector_type").unwrap_or("POINT").to_string();

    conv.local_code.push(format!("// Mapping type: {vector_type}"));

    if node.params.contains_key("translation") {
        let loc_mat = translation_mat(param_vec3(node, "translation", [0.0; 3]));
        let rot_mat = euler_xyz_mat(param_vec3(node, "rotation", [0.0; 3]));
        let sca_mat = scale_mat(param_vec3(node, "scale", [1.0; 3]));

        let transform_mat = match vector_type.as_str() {
            // texture inverse mapping
            "TEXTURE" => mat4_invert(mat4_mul(loc_mat, mat4_mul(rot_mat, sca_mat))),
            "POINT" => mat4_mul(loc_mat, mat4_mul(rot_mat, sca_mat)),
            // inverse transpose
            "NORMAL" => mat4_transpose(mat4_invert(mat4_mul(rot_mat, sca_mat))),
            // no translation
            _ => mat4_mul(rot_mat, sca_mat),
        };

        let clamp_min = node
            .param_value("min")
            .unwrap_or(Value::Vec3([0.0; 3]))
            .to_script();
        let clamp_max = node
            .param_value("max")
            .unwrap_or(Value::Vec3([1.0; 3]))
            .to_script();
        let use_min = if node.param_bool("use_min").unwrap_or(false) { "1.0" } else { "0.0" };
        let use_max = if node.param_bool("use_max").unwrap_or(false) { "1.0" } else { "0.0" };

        let function = functions::builtin("node_mapping");
        let in_arguments = [
            in_vec,
            Value::Mat4(transform_mat).to_script(),
            clamp_min,
            clamp_max,
            use_min.to_string(),
            use_max.to_string(),
        ];
        conv.add_function_call(function, &in_arguments, std::slice::from_ref(&out_vec));
    } else {
        let loc_vec = conv.input_variable_at(graph, 1)?;
        let rot_vec = conv.input_variable_at(graph, 2)?;
        let sca_vec = conv.input_variable_at(graph, 3)?;

        let loc_mat = conv.location_to_mat(&loc_vec);
        let rot_mat = conv.rotation_to_mat(&rot_vec);
        let sca_mat = conv.scale_to_mat(&sca_vec);

        let xform_mat = conv.scratch_id("xform_mat");
        let xform_expr = match vector_type.as_str() {
            // texture inverse mapping
            "TEXTURE" => format!("inverse({loc_mat} * {rot_mat} * {sca_mat})"),
            "POINT" => format!("{loc_mat} * {rot_mat} * {sca_mat}"),
            // inverse transpose
            "NORMAL" => format!("transpose(inverse({rot_mat} * {sca_mat}))"),
            // no translation
            _ => format!("{rot_mat} * {sca_mat}"),
        };
        conv.local_code.push(format!("mat4 {xform_mat} = {xform_expr}"));
        conv.local_code
            .push(format!("{out_vec} = ({xform_mat} * vec4({in_vec}, 1.0)).xyz"));
    }

    conv.bind_output(0, SocketBinding::Variable(out_vec.clone()));

    if vector_type == "NORMAL" {
        conv.local_code.push("// Normalization for NORMAL mapping".to_string());
        conv.local_code.push(format!("{out_vec} = normalize({out_vec})"));
    }
    Ok(())
}

/// Fallback for registry-backed nodes: every input feeds the function
/// positionally, every output is bound to a call output.
pub(super) fn general(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    let Some(function) = functions::find_function_for(node) else {
        bail!("node '{}' has no registered shader function", node.name);
    };

    let mut in_arguments = Vec::with_capacity(node.inputs.len());
    for index in 0..node.inputs.len() {
        in_arguments.push(conv.input_variable_at(graph, index)?);
    }

    let mut out_arguments = Vec::with_capacity(node.outputs.len());
    for (index, socket) in node.outputs.iter().enumerate() {
        let socket_id = conv.socket_id(&socket.name, SocketDir::Output);
        conv.bind_output(index, SocketBinding::Variable(socket_id.clone()));
        out_arguments.push(socket_id);
    }

    conv.add_function_call(function, &in_arguments, &out_arguments);
    Ok(())
}
