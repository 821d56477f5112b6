//! Color and scalar source/operator nodes.

use anyhow::{Result, bail};

use super::converter::{NodeConverter, SocketBinding};
use crate::diagnostics::Diagnostics;
use crate::functions;
use crate::graph::{Graph, SocketDir};

/// Constant color source: the output socket's default becomes a literal.
pub(super) fn rgb(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    let Some(socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let rgb_id = conv.socket_id(&socket.name, SocketDir::Output);
    let value_str = match &socket.default {
        Some(value) => value.to_script(),
        None => socket.ty.zero_script().to_string(),
    };
    conv.local_code.push(format!("{rgb_id} = {value_str}"));
    conv.bind_output(0, SocketBinding::Variable(rgb_id));
    Ok(())
}

/// Constant scalar source.
pub(super) fn value(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let node = graph.node(conv.node);
    let Some(socket) = node.outputs.first() else {
        bail!("node '{}' has no output socket", node.name);
    };
    let value_id = conv.socket_id(&socket.name, SocketDir::Output);
    let value_str = match &socket.default {
        Some(value) => value.to_script(),
        None => socket.ty.zero_script().to_string(),
    };
    conv.local_code.push(format!("{value_id} = {value_str}"));
    conv.bind_output(0, SocketBinding::Variable(value_id));
    Ok(())
}

/// Blend two colors by a clamped factor. Unknown blend modes fall back to
/// plain mix with a warning left in both the diagnostics and the script.
pub(super) fn mix_rgb(
    conv: &mut NodeConverter,
    graph: &Graph,
    diag: &mut Diagnostics,
) -> Result<()> {
    let fac_id = conv.input_variable(graph, "Fac")?;
    let color1_id = conv.input_variable(graph, "Color1")?;
    let color2_id = conv.input_variable(graph, "Color2")?;

    conv.local_code.push(format!("{fac_id} = clamp({fac_id}, 0.0, 1.0)"));

    let node = graph.node(conv.node);
    let blend_type = node.param_str("blend_type").unwrap_or("MIX");
    let func_name = format!("node_mix_rgb_{}", blend_type.to_ascii_lowercase());
    let mix_func = match functions::find_function_by_name(&func_name) {
        Some(f) => f,
        None => {
            let warning = format!(
                "blend type {blend_type} not supported at {}, fall back to blend type MIX",
                node.name
            );
            conv.local_code.push(format!("// {warning}"));
            diag.warn(warning);
            functions::builtin("node_mix_rgb_mix")
        }
    };

    let Some(out_index) = node.output_index("Color") else {
        bail!("node '{}' has no output socket 'Color'", node.name);
    };
    let out_color_id = conv.socket_id("Color", SocketDir::Output);
    conv.add_function_call(
        mix_func,
        &[fac_id, color1_id, color2_id],
        std::slice::from_ref(&out_color_id),
    );

    if node.param_bool("use_clamp").unwrap_or(false) {
        conv.local_code
            .push(format!("{out_color_id} = clamp({out_color_id}, vec4(0.0), vec4(1.0))"));
    }

    conv.bind_output(out_index, SocketBinding::Variable(out_color_id));
    Ok(())
}

pub(super) fn hue_saturation(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let fac_id = conv.input_variable(graph, "Fac")?;
    let hue_id = conv.input_variable(graph, "Hue")?;
    let saturation_id = conv.input_variable(graph, "Saturation")?;
    let value_id = conv.input_variable(graph, "Value")?;
    let color_id = conv.input_variable(graph, "Color")?;

    let node = graph.node(conv.node);
    let Some(out_index) = node.output_index("Color") else {
        bail!("node '{}' has no output socket 'Color'", node.name);
    };
    let out_color_id = conv.socket_id("Color", SocketDir::Output);
    conv.add_function_call(
        functions::builtin("node_hsv"),
        &[fac_id, hue_id, saturation_id, value_id, color_id],
        std::slice::from_ref(&out_color_id),
    );
    conv.bind_output(out_index, SocketBinding::Variable(out_color_id));
    Ok(())
}

pub(super) fn invert(conv: &mut NodeConverter, graph: &Graph) -> Result<()> {
    let fac_id = conv.input_variable(graph, "Fac")?;
    let color_id = conv.input_variable(graph, "Color")?;

    let node = graph.node(conv.node);
    let Some(out_index) = node.output_index("Color") else {
        bail!("node '{}' has no output socket 'Color'", node.name);
    };
    let out_color_id = conv.socket_id("Color", SocketDir::Output);
    conv.add_function_call(
        functions::builtin("node_invert"),
        &[fac_id, color_id],
        std::slice::from_ref(&out_color_id),
    );
    conv.bind_output(out_index, SocketBinding::Variable(out_color_id));
    Ok(())
}
