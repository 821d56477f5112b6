use node_shader_compiler::{
    Graph, Node, ShadingFlags, Socket, SocketRef, SocketType, Value, compile_material,
};

fn principled_node(name: &str) -> Node {
    let mut node = Node::new("BsdfPrincipled", name).with_output(Socket::shader("BSDF"));
    for (socket_name, ty) in [
        ("Base Color", SocketType::Color),
        ("Subsurface", SocketType::Value),
        ("Metallic", SocketType::Value),
        ("Specular", SocketType::Value),
        ("Roughness", SocketType::Value),
        ("Clearcoat", SocketType::Value),
        ("Clearcoat Roughness", SocketType::Value),
        ("Anisotropic", SocketType::Value),
        ("Transmission", SocketType::Value),
        ("IOR", SocketType::Value),
        ("Alpha", SocketType::Value),
        ("Normal", SocketType::Vector),
        ("Tangent", SocketType::Vector),
    ] {
        node = node.with_input(Socket::new(socket_name, ty));
    }
    node
}

fn diffuse_node(name: &str) -> Node {
    Node::new("BsdfDiffuse", name)
        .with_input(Socket::color("Color").with_default(Value::Vec4([0.8, 0.8, 0.8, 1.0])))
        .with_input(Socket::value("Roughness").with_default(Value::Float(0.5)))
        .with_input(Socket::vector("Normal"))
        .with_output(Socket::shader("BSDF"))
}

fn image_texture_node(name: &str, image: &str) -> Node {
    Node::new("ImageTexture", name)
        .with_param("image", serde_json::json!(image))
        .with_input(Socket::vector("Vector"))
        .with_output(Socket::color("Color"))
        .with_output(Socket::value("Alpha"))
}

fn tex_coord_node(name: &str) -> Node {
    Node::new("TexCoord", name)
        .with_output(Socket::vector("Generated"))
        .with_output(Socket::vector("Normal"))
        .with_output(Socket::vector("UV"))
        .with_output(Socket::vector("Object"))
        .with_output(Socket::vector("Camera"))
        .with_output(Socket::vector("Window"))
        .with_output(Socket::vector("Reflection"))
}

/// Identifiers declared in a program body, in emission order.
fn declared_identifiers(fragment_code: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in fragment_code.lines() {
        let mut tokens = line.split_whitespace();
        let Some(type_token) = tokens.next() else { continue };
        if !matches!(type_token, "float" | "vec3" | "vec4" | "mat4") {
            continue;
        }
        if let Some(name) = tokens.next() {
            out.push(name.trim_end_matches(';').to_string());
        }
    }
    out
}

/// A textured PBR material: coordinates run through a baked mapping into an
/// albedo texture and a normal texture, the normal texture unpacks through a
/// normal map, and the closure mixes with a transparent closure.
fn textured_material() -> (Graph, Vec<node_shader_compiler::NodeId>) {
    let mut g = Graph::default();
    let coords = g.add_node(tex_coord_node("coords"));
    let mapping = g.add_node(
        Node::new("Mapping", "map")
            .with_param("vector_type", serde_json::json!("POINT"))
            .with_param("translation", serde_json::json!([0.5, 0.0, 0.0]))
            .with_param("rotation", serde_json::json!([0.0, 0.0, 0.0]))
            .with_param("scale", serde_json::json!([2.0, 2.0, 1.0]))
            .with_input(Socket::vector("Vector"))
            .with_output(Socket::vector("Vector")),
    );
    let albedo_tex = g.add_node(image_texture_node("albedo_tex", "albedo.png"));
    let normal_tex = g.add_node(image_texture_node("normal_tex", "normal.png"));
    let normal_map = g.add_node(
        Node::new("NormalMap", "nm")
            .with_param("space", serde_json::json!("TANGENT"))
            .with_input(Socket::value("Strength").with_default(Value::Float(1.0)))
            .with_input(Socket::color("Color"))
            .with_output(Socket::vector("Normal")),
    );
    let tint = g.add_node(
        Node::new("MixRGB", "tint")
            .with_param("blend_type", serde_json::json!("MULTIPLY"))
            .with_input(Socket::value("Fac").with_default(Value::Float(1.0)))
            .with_input(Socket::color("Color1"))
            .with_input(Socket::color("Color2").with_default(Value::Vec4([1.0, 0.9, 0.8, 1.0])))
            .with_output(Socket::color("Color")),
    );
    let pbr = g.add_node(principled_node("pbr"));
    let glass = g.add_node(
        Node::new("BsdfTransparent", "clear")
            .with_input(Socket::color("Color").with_default(Value::Vec4([1.0, 1.0, 1.0, 1.0])))
            .with_output(Socket::shader("BSDF")),
    );
    let mix = g.add_node(
        Node::new("MixShader", "mix")
            .with_input(Socket::value("Fac").with_default(Value::Float(0.25)))
            .with_input(Socket::shader("Shader"))
            .with_input(Socket::shader("Shader"))
            .with_output(Socket::shader("Shader")),
    );

    let uv = g.node(coords).output_index("UV").unwrap();
    g.connect(SocketRef::output(coords, uv), SocketRef::input(mapping, 0));
    g.connect(SocketRef::output(mapping, 0), SocketRef::input(albedo_tex, 0));
    g.connect(SocketRef::output(mapping, 0), SocketRef::input(normal_tex, 0));
    g.connect(SocketRef::output(normal_tex, 0), SocketRef::input(normal_map, 1));
    g.connect(SocketRef::output(albedo_tex, 0), SocketRef::input(tint, 1));
    let base_color = g.node(pbr).input_index("Base Color").unwrap();
    g.connect(SocketRef::output(tint, 0), SocketRef::input(pbr, base_color));
    let normal = g.node(pbr).input_index("Normal").unwrap();
    g.connect(SocketRef::output(normal_map, 0), SocketRef::input(pbr, normal));
    g.connect(SocketRef::output(pbr, 0), SocketRef::input(mix, 1));
    g.connect(SocketRef::output(glass, 0), SocketRef::input(mix, 2));

    let order = g.topo_sort().expect("material graph is acyclic");
    (g, order)
}

#[test]
fn textured_material_compiles_with_unique_identifiers() {
    let (graph, order) = textured_material();
    let material = compile_material(&graph, &order).expect("compile textured material");

    let ids = declared_identifiers(&material.fragment_code);
    assert!(!ids.is_empty());
    let mut seen = std::collections::HashSet::new();
    for id in &ids {
        assert!(seen.insert(id.clone()), "identifier '{id}' declared twice");
    }
}

#[test]
fn textured_material_collects_flags_textures_and_functions() {
    let (graph, order) = textured_material();
    let material = compile_material(&graph, &order).expect("compile textured material");

    assert!(material.flags.contains(ShadingFlags::TRANSPARENT));
    assert!(!material.flags.contains(ShadingFlags::GLASS));

    let images: Vec<_> = material
        .textures
        .iter()
        .map(|t| (t.image.as_deref(), t.hint))
        .collect();
    assert!(images.contains(&(Some("albedo.png"), node_shader_compiler::TextureHint::Albedo)));
    assert!(images.contains(&(Some("normal.png"), node_shader_compiler::TextureHint::Normal)));

    for name in ["node_bsdf_principled", "node_mapping", "node_mix_rgb_multiply",
                 "node_normal_map", "node_tex_image", "space_convert_yup_to_zup"] {
        assert!(
            material.functions.contains(&name),
            "missing shader library function {name}"
        );
    }
    assert!(material.vertex_code.is_empty());
    assert!(material.warnings.is_empty());
}

#[test]
fn flag_aggregation_is_order_independent() {
    let mut g = Graph::default();
    let rgb = g.add_node(
        Node::new("RGB", "rgb")
            .with_output(Socket::color("Color").with_default(Value::Vec4([1.0; 4]))),
    );
    let glass = g.add_node(
        Node::new("BsdfGlass", "glass")
            .with_input(Socket::color("Color"))
            .with_input(Socket::value("Roughness"))
            .with_input(Socket::value("IOR"))
            .with_output(Socket::shader("BSDF")),
    );

    for order in [[rgb, glass], [glass, rgb]] {
        let material = compile_material(&g, &order).expect("compile");
        assert!(material.flags.contains(ShadingFlags::GLASS));
        assert!(material.flags.contains(ShadingFlags::TRANSPARENT));
    }
}

#[test]
fn unsupported_node_falls_back_to_consumer_defaults() {
    let mut g = Graph::default();
    let lp = g.add_node(
        Node::new("LightPath", "lp").with_output(Socket::value("Is Camera Ray")),
    );
    let inv = g.add_node(
        Node::new("Invert", "inv")
            .with_input(Socket::value("Fac").with_default(Value::Float(0.5)))
            .with_input(Socket::color("Color").with_default(Value::Vec4([0.0, 0.0, 0.0, 1.0])))
            .with_output(Socket::color("Color")),
    );
    g.connect(SocketRef::output(lp, 0), SocketRef::input(inv, 0));

    let material = compile_material(&g, &[lp, inv]).expect("compile with unsupported node");
    assert!(material.fragment_code.contains("// Warn: node not supported"));
    // The consumer falls back to its socket default instead of the link.
    assert!(material.fragment_code.contains("float node1_in0_fac = float(0.5);"));
    assert_eq!(material.warnings.len(), 1);
    assert!(material.warnings[0].contains("'lp'"));
    assert!(material.warnings[0].contains("'Fac'"));
}

#[test]
fn reroute_contributes_no_statements_or_declarations() {
    let mut g = Graph::default();
    let rgb = g.add_node(
        Node::new("RGB", "rgb")
            .with_output(Socket::color("Color").with_default(Value::Vec4([1.0; 4]))),
    );
    let pass = g.add_node(
        Node::new("Reroute", "pass")
            .with_input(Socket::color("Input"))
            .with_output(Socket::color("Output")),
    );
    let inv = g.add_node(
        Node::new("Invert", "inv")
            .with_input(Socket::value("Fac").with_default(Value::Float(1.0)))
            .with_input(Socket::color("Color"))
            .with_output(Socket::color("Color")),
    );
    g.connect(SocketRef::output(rgb, 0), SocketRef::input(pass, 0));
    g.connect(SocketRef::output(pass, 0), SocketRef::input(inv, 1));

    let material = compile_material(&g, &[rgb, pass, inv]).expect("compile reroute chain");
    // The reroute re-exposes its own input alias, so no output identifier
    // of its own ever appears.
    assert!(!material.fragment_code.contains("node1_out"));
    assert!(material
        .fragment_code
        .contains("vec4 node2_in1_color = node1_in0_input;"));
}

#[test]
fn mixing_treats_missing_alpha_as_opaque() {
    let mut g = Graph::default();
    let opaque = g.add_node(diffuse_node("opaque"));
    let clear = g.add_node(
        Node::new("BsdfTransparent", "clear")
            .with_input(Socket::color("Color"))
            .with_output(Socket::shader("BSDF")),
    );
    let mix = g.add_node(
        Node::new("MixShader", "mix")
            .with_input(Socket::value("Fac").with_default(Value::Float(0.25)))
            .with_input(Socket::shader("Shader"))
            .with_input(Socket::shader("Shader"))
            .with_output(Socket::shader("Shader")),
    );
    g.connect(SocketRef::output(opaque, 0), SocketRef::input(mix, 1));
    g.connect(SocketRef::output(clear, 0), SocketRef::input(mix, 2));

    let material = compile_material(&g, &[opaque, clear, mix]).expect("compile shader mix");
    let alpha_mix = material
        .fragment_code
        .lines()
        .find(|l| l.contains("_alpha = mix("))
        .expect("alpha mix statement");
    // The diffuse side defines no alpha: it mixes as the literal 1.0, and
    // always as the first argument.
    assert!(alpha_mix.contains("= mix(1.0, node2_shader_in5_alpha, node2_in0_fac)"));
}

#[test]
fn unused_outputs_produce_no_declarations() {
    let (graph, order) = textured_material();
    let material = compile_material(&graph, &order).expect("compile textured material");

    // Of the seven coordinate outputs only UV is linked.
    assert!(material.fragment_code.contains("= vec3(UV, 0.0)"));
    assert!(!material.fragment_code.contains("SCREEN_UV"));
    assert!(!material.fragment_code.contains("reflect("));
    assert!(!material.fragment_code.contains("AABB_UVW"));
}

#[test]
fn graph_loaded_from_json_compiles() {
    let text = r#"{
        "nodes": [
            {
                "kind": "RGB", "name": "base",
                "outputs": [
                    {"name": "Color", "type": "color",
                     "default": {"Vec4": [0.8, 0.1, 0.1, 1.0]}}
                ]
            },
            {
                "kind": "BsdfDiffuse", "name": "mat",
                "inputs": [
                    {"name": "Color", "type": "color"},
                    {"name": "Roughness", "type": "value",
                     "default": {"Float": 0.5}}
                ],
                "outputs": [{"name": "BSDF", "type": "shader"}]
            }
        ],
        "links": [
            {"from": {"node": 0, "dir": "Output", "index": 0},
             "to": {"node": 1, "dir": "Input", "index": 0}}
        ]
    }"#;

    let graph = Graph::from_json(text).expect("parse graph json");
    let order = graph.topo_sort().expect("sort graph");
    let material = compile_material(&graph, &order).expect("compile json graph");
    assert!(material
        .fragment_code
        .contains("node0_out0_color = vec4(0.8, 0.1, 0.1, 1.0);"));
    assert!(material
        .fragment_code
        .contains("node_bsdf_diffuse(node1_in0_color, node1_in1_roughness, "));
}
