//! Closure-producing and closure-combining nodes.

use anyhow::{Result, bail};

use super::converter::{NodeConverter, ShadingFlags, SocketBinding};
use crate::functions;
use crate::graph::{Graph, SocketDir, SocketRef};
use crate::shader_link::{FragmentShaderLink, ShaderProp};
use crate::value::Value;

/// Blend two closures at a fixed even weight.
pub(super) fn add_shader(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let shader_a = conv.input_shader_link(graph, 0)?;
    let shader_b = conv.input_shader_link(graph, 1)?;

    let node = graph.node(conv.node);
    let Some(out_socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let out_name = out_socket.name.clone();

    let output = conv.mix_shader_links(&shader_a, &shader_b, &out_name, "0.5");
    conv.bind_output(0, SocketBinding::Shader(output));
    Ok(())
}

/// Blend two closures by the Fac input.
pub(super) fn mix_shader(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let fac = conv.input_variable(graph, "Fac")?;
    let shader_a = conv.input_shader_link(graph, 1)?;
    let shader_b = conv.input_shader_link(graph, 2)?;

    let node = graph.node(conv.node);
    let Some(out_socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let out_name = out_socket.name.clone();

    let output = conv.mix_shader_links(&shader_a, &shader_b, &out_name, &fac);
    conv.bind_output(0, SocketBinding::Shader(output));
    Ok(())
}

fn transmission_defaults_to_zero(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Float(f)) => *f == 0.0,
        Some(_) => false,
    }
}

/// A closure node backed by a shader library function. The function fills
/// the link's scalar and color properties; normal and tangent bypass it and
/// come straight from the input sockets, converted into view space when
/// they arrive from upstream nodes.
pub(super) fn bsdf(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);

    if node.kind == "BsdfGlass" {
        conv.flags |= ShadingFlags::GLASS;
    }
    if matches!(node.kind.as_str(), "BsdfTransparent" | "BsdfGlass") {
        conv.flags |= ShadingFlags::TRANSPARENT;
    }

    let tangent_index = node.input_index("Tangent");
    if let Some(index) = tangent_index {
        if graph.is_linked(SocketRef::input(conv.node, index)) {
            conv.flags |= ShadingFlags::UV_OR_TANGENT;
        }
    }

    if let Some(index) = node.input_index("Transmission") {
        let socket = &node.inputs[index];
        if graph.is_linked(SocketRef::input(conv.node, index))
            && transmission_defaults_to_zero(socket.default.as_ref())
        {
            conv.flags |= ShadingFlags::TRANSMISSION;
        }
    }

    let Some(function) = functions::find_function_for(node) else {
        bail!("closure node '{}' has no registered shader function", node.name);
    };

    let mut in_args = Vec::with_capacity(function.in_sockets.len());
    for socket_name in function.in_sockets {
        in_args.push(conv.input_variable(graph, socket_name)?);
    }

    let Some(out_socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let out_name = out_socket.name.clone();

    let mut output = FragmentShaderLink::new();
    let mut out_args = Vec::with_capacity(function.output_properties.len());
    for prop in function.output_properties {
        let var_id = conv.shader_prop_id(&out_name, SocketDir::Output, *prop);
        output.set(*prop, var_id.clone());
        out_args.push(var_id);
    }
    conv.add_function_call(function, &in_args, &out_args);

    // Normal and tangent bypass the function. Unlinked sockets already hold
    // the view-space builtins; linked values arrive in z-up world space.
    let normal_index = node.input_index("Normal");
    for (prop, index) in [
        (ShaderProp::Normal, normal_index),
        (ShaderProp::Tangent, tangent_index),
    ] {
        let Some(index) = index else { continue };
        let socket_var = conv.input_variable_at(graph, index)?;
        if graph.is_linked(SocketRef::input(conv.node, index)) {
            conv.zup_to_yup(&socket_var);
            conv.world_to_view(&socket_var, true);
        }
        output.set(prop, socket_var);
    }

    conv.bind_output(0, SocketBinding::Shader(output));
    Ok(())
}
