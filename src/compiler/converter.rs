//! Per-node converter framework.
//!
//! One `NodeConverter` exists per processed node. It is a builder: the
//! pipeline drives it through input initialization, body generation and
//! output finalization, after which it is read-only and downstream
//! converters look up their upstream bindings on it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use anyhow::{Result, bail};
use bitflags::bitflags;

use super::ConverterKind;
use crate::diagnostics::Diagnostics;
use crate::functions::{self, FunctionDescriptor};
use crate::graph::{Graph, NodeId, Socket, SocketDir, SocketRef, SocketType};
use crate::shader_link::{FragmentShaderLink, ShaderProp};
use crate::value::{is_valid_identifier, sanitize_identifier};

/// Placeholder identifiers replaced by real uniforms in the surrounding
/// shader template. Raise the matching flag when emitting one.
pub const INV_MODEL_MAT: &str = "INV_MODEL_MAT";
pub const INV_VIEW_MAT: &str = "INV_VIEW_MAT";
pub const AABB_UVW: &str = "AABB_UVW";

bitflags! {
    /// Global shader features required by at least one node. OR-combined
    /// across the whole graph, monotonic once raised.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ShadingFlags: u8 {
        const TRANSPARENT = 1 << 0;
        const GLASS = 1 << 1;
        const INV_VIEW_MAT = 1 << 2;
        const INV_MODEL_MAT = 1 << 3;
        const UV_OR_TANGENT = 1 << 4;
        const TRANSMISSION = 1 << 5;
        const AABB_TEX_COORD = 1 << 6;
    }
}

/// Sampling hint annotation for a texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureHint {
    #[default]
    None,
    Albedo,
    Normal,
}

impl TextureHint {
    /// Suffix annotation in the emitted uniform declaration.
    pub fn hint_str(self) -> &'static str {
        match self {
            TextureHint::None => "",
            TextureHint::Albedo => ": hint_albedo",
            TextureHint::Normal => ": hint_normal",
        }
    }
}

/// A texture discovered while processing a sampling node.
///
/// Equality and hash are by `(image, hint)` so the packaging stage can
/// deduplicate identical images sampled with identical hints; the generated
/// identifier is deliberately excluded.
#[derive(Debug, Clone)]
pub struct TextureBinding {
    /// Image asset reference; a sampling node may carry no image.
    pub image: Option<String>,
    /// Variable name in the generated script, later replaced by a uniform.
    pub identifier: String,
    pub hint: TextureHint,
}

impl PartialEq for TextureBinding {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image && self.hint == other.hint
    }
}

impl Eq for TextureBinding {}

impl Hash for TextureBinding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.image.hash(state);
        self.hint.hash(state);
    }
}

/// What a socket resolves to once processed.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketBinding {
    /// A generated script variable, for value/vector/color sockets.
    Variable(String),
    /// A shader link aggregate, for shader-typed sockets.
    Shader(FragmentShaderLink),
}

impl SocketBinding {
    /// The bound variable name. Requesting it of a shader binding is a
    /// caller defect: the coercion table has no entry for shader links.
    pub fn variable(&self) -> &str {
        match self {
            SocketBinding::Variable(id) => id,
            SocketBinding::Shader(_) => {
                panic!("shader link bound where a value variable was expected")
            }
        }
    }

    pub fn shader_link(&self) -> &FragmentShaderLink {
        match self {
            SocketBinding::Shader(link) => link,
            SocketBinding::Variable(id) => {
                panic!("value variable '{id}' bound where a shader link was expected")
            }
        }
    }
}

pub struct NodeConverter {
    pub node: NodeId,
    pub(crate) kind: ConverterKind,

    pub in_sockets: HashMap<SocketRef, SocketBinding>,
    pub out_sockets: HashMap<SocketRef, SocketBinding>,
    defined_ids: HashSet<String>,

    /// Shader library functions invoked by this node, for the caller to
    /// paste their definitions into the final program.
    pub functions: BTreeSet<&'static str>,
    pub textures: Vec<TextureBinding>,

    pub input_definitions: Vec<String>,
    pub output_definitions: Vec<String>,
    pub local_code: Vec<String>,
    pub vertex_code: Vec<String>,

    pub flags: ShadingFlags,

    id_prefix: String,
    input_var_count: usize,
    output_var_count: usize,
    variable_count: usize,
}

impl NodeConverter {
    pub(crate) fn new(index: usize, node: NodeId, kind: ConverterKind) -> NodeConverter {
        NodeConverter {
            node,
            kind,
            in_sockets: HashMap::new(),
            out_sockets: HashMap::new(),
            defined_ids: HashSet::new(),
            functions: BTreeSet::new(),
            textures: Vec::new(),
            input_definitions: vec!["// input sockets handling".to_string()],
            output_definitions: vec!["// output sockets definitions".to_string()],
            local_code: vec![String::new()],
            vertex_code: Vec::new(),
            flags: ShadingFlags::empty(),
            id_prefix: format!("node{index}_"),
            input_var_count: 0,
            output_var_count: 0,
            variable_count: 0,
        }
    }

    /// Whether this converter represents a supported node kind. Consumers
    /// of an invalid converter fall back to socket defaults.
    pub fn is_valid(&self) -> bool {
        self.kind != ConverterKind::Unsupported
    }

    /// Bound variable of an input socket, by position. Input initialization
    /// binds every non-shader input, so a miss means a malformed node.
    pub fn input_variable_at(&self, graph: &Graph, index: usize) -> Result<String> {
        let sref = SocketRef::input(self.node, index);
        match self.in_sockets.get(&sref) {
            Some(binding) => Ok(binding.variable().to_string()),
            None => bail!(
                "node '{}' has no input socket {index}",
                graph.node(self.node).name
            ),
        }
    }

    /// Bound variable of an input socket, by name.
    pub fn input_variable(&self, graph: &Graph, name: &str) -> Result<String> {
        let node = graph.node(self.node);
        let Some(index) = node.input_index(name) else {
            bail!("node '{}' has no input socket '{name}'", node.name);
        };
        self.input_variable_at(graph, index)
    }

    /// Shader link bound to a shader-typed input socket, by position.
    pub fn input_shader_link(&self, graph: &Graph, index: usize) -> Result<FragmentShaderLink> {
        let sref = SocketRef::input(self.node, index);
        match self.in_sockets.get(&sref) {
            Some(binding) => Ok(binding.shader_link().clone()),
            None => bail!(
                "node '{}' has no shader input socket {index}",
                graph.node(self.node).name
            ),
        }
    }

    /// Bind an output socket by position.
    pub fn bind_output(&mut self, index: usize, binding: SocketBinding) {
        self.out_sockets.insert(SocketRef::output(self.node, index), binding);
    }

    fn direction_prefix(&mut self, dir: SocketDir) -> String {
        match dir {
            SocketDir::Output => {
                let p = format!("out{}_", self.output_var_count);
                self.output_var_count += 1;
                p
            }
            SocketDir::Input => {
                let p = format!("in{}_", self.input_var_count);
                self.input_var_count += 1;
                p
            }
        }
    }

    /// Variable name for a socket.
    pub fn socket_id(&mut self, socket_name: &str, dir: SocketDir) -> String {
        let prefix = self.direction_prefix(dir);
        format!("{}{}{}", self.id_prefix, prefix, sanitize_identifier(socket_name))
    }

    /// Variable name for one property of a shader link flowing through a
    /// shader-typed socket.
    pub fn shader_prop_id(
        &mut self,
        socket_name: &str,
        dir: SocketDir,
        prop: ShaderProp,
    ) -> String {
        let prefix = self.direction_prefix(dir);
        format!(
            "{}{}",
            self.id_prefix,
            sanitize_identifier(&format!("{socket_name}_{prefix}{}", prop.name()))
        )
    }

    /// Variable name for a scratch variable.
    pub fn scratch_id(&mut self, hint: &str) -> String {
        let prefix = format!("var{}_", self.variable_count);
        self.variable_count += 1;
        format!("{}{}{}", self.id_prefix, prefix, sanitize_identifier(hint))
    }

    /// Placeholder variable for a texture, replaced by a uniform name when
    /// the surrounding template is assembled.
    pub fn texture_id(&mut self, key: &str) -> String {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        format!(
            "{}{}",
            self.id_prefix,
            sanitize_identifier(&format!("tex{}_", hasher.finish()))
        )
    }

    pub fn register_texture(&mut self, image: Option<String>, identifier: String, hint: TextureHint) {
        self.textures.push(TextureBinding { image, identifier, hint });
    }

    /// Assignment statement converting a source socket value into a target
    /// socket's type. Pairings outside the defined table are unreachable
    /// through any supported node configuration.
    pub fn socket_assignment(
        to_id: &str,
        to_ty: SocketType,
        from_id: &str,
        from_ty: SocketType,
    ) -> String {
        use SocketType::*;
        match (to_ty, from_ty) {
            _ if to_ty == from_ty => format!("{to_id} = {from_id}"),
            (Value, Vector) => {
                format!("{to_id} = dot({from_id}, vec3(0.333333, 0.333333, 0.333333))")
            }
            (Value, Color) => {
                format!("{to_id} = dot({from_id}.rgb, vec3(0.2126, 0.7152, 0.0722))")
            }
            (Vector, Value) => format!("{to_id} = vec3({from_id}, {from_id}, {from_id})"),
            (Color, Value) => {
                format!("{to_id} = vec4({from_id}, {from_id}, {from_id}, {from_id})")
            }
            (Color, Vector) => format!("{to_id} = vec4({from_id}, 1.0)"),
            (Vector, Color) => format!("{to_id} = {from_id}.rgb"),
            _ => panic!("no conversion from socket type {from_ty:?} to {to_ty:?}"),
        }
    }

    /// Mix two shader links property-by-property with `mix(a, b, fac)`.
    ///
    /// A link with no alpha is defined to be fully opaque, so a missing
    /// alpha on either side mixes against the literal 1.0. Properties bound
    /// on only one side pass through unchanged; properties bound on neither
    /// stay unbound.
    pub fn mix_shader_links(
        &mut self,
        input_a: &FragmentShaderLink,
        input_b: &FragmentShaderLink,
        out_socket_name: &str,
        fac: &str,
    ) -> FragmentShaderLink {
        let mut output = FragmentShaderLink::new();
        for prop in ShaderProp::ALL {
            let mut prop_a = input_a.get(prop).map(str::to_string);
            let mut prop_b = input_b.get(prop).map(str::to_string);

            if prop == ShaderProp::Alpha {
                if prop_a.is_some() && prop_b.is_none() {
                    prop_b = Some("1.0".to_string());
                } else if prop_b.is_some() && prop_a.is_none() {
                    prop_a = Some("1.0".to_string());
                }
            }

            match (prop_a, prop_b) {
                (Some(a), Some(b)) => {
                    let mixed = self.shader_prop_id(out_socket_name, SocketDir::Output, prop);
                    self.local_code.push(format!("{mixed} = mix({a}, {b}, {fac})"));
                    output.set(prop, mixed);
                }
                (Some(a), None) => output.set(prop, a),
                (None, Some(b)) => output.set(prop, b),
                (None, None) => {}
            }
        }
        output
    }

    /// Emit a call to a shader library function and record its use.
    pub fn add_function_call(
        &mut self,
        function: &'static FunctionDescriptor,
        in_args: &[String],
        out_args: &[String],
    ) {
        self.functions.insert(function.name);
        let args: Vec<&str> = in_args.iter().chain(out_args).map(String::as_str).collect();
        self.local_code.push(format!("{}({});", function.name, args.join(", ")));
    }

    /// Convert a vec3 variable from y-up space to z-up space, in place.
    pub fn yup_to_zup(&mut self, var: &str) {
        let function = functions::builtin("space_convert_yup_to_zup");
        self.add_function_call(function, &[var.to_string()], &[]);
    }

    /// Convert a vec3 variable from z-up space to y-up space, in place.
    pub fn zup_to_yup(&mut self, var: &str) {
        let function = functions::builtin("space_convert_zup_to_yup");
        self.add_function_call(function, &[var.to_string()], &[]);
    }

    /// Convert a vec3 from view space to model space; done in y-up space.
    /// Directions use the rotational part only, positions the full affine
    /// transform.
    pub fn view_to_model(&mut self, var: &str, is_direction: bool) {
        self.flags |= ShadingFlags::INV_VIEW_MAT | ShadingFlags::INV_MODEL_MAT;
        let function = if is_direction {
            functions::builtin("dir_space_convert_view_to_model")
        } else {
            functions::builtin("point_space_convert_view_to_model")
        };
        self.add_function_call(
            function,
            &[var.to_string(), INV_MODEL_MAT.to_string(), INV_VIEW_MAT.to_string()],
            &[],
        );
    }

    /// Convert a vec3 from model space to view space; done in y-up space.
    pub fn model_to_view(&mut self, var: &str, is_direction: bool) {
        let function = if is_direction {
            functions::builtin("dir_space_convert_model_to_view")
        } else {
            functions::builtin("point_space_convert_model_to_view")
        };
        self.add_function_call(
            function,
            &[var.to_string(), "INV_CAMERA_MATRIX".to_string(), "WORLD_MATRIX".to_string()],
            &[],
        );
    }

    /// Convert a vec3 from view space to world space; done in y-up space.
    pub fn view_to_world(&mut self, var: &str, is_direction: bool) {
        self.flags |= ShadingFlags::INV_VIEW_MAT;
        let function = if is_direction {
            functions::builtin("dir_space_convert_view_to_world")
        } else {
            functions::builtin("point_space_convert_view_to_world")
        };
        self.add_function_call(function, &[var.to_string(), INV_VIEW_MAT.to_string()], &[]);
    }

    /// Convert a vec3 from world space to view space; done in y-up space.
    pub fn world_to_view(&mut self, var: &str, is_direction: bool) {
        let function = if is_direction {
            functions::builtin("dir_space_convert_world_to_view")
        } else {
            functions::builtin("point_space_convert_world_to_view")
        };
        self.add_function_call(
            function,
            &[var.to_string(), "INV_CAMERA_MATRIX".to_string()],
            &[],
        );
    }

    /// Convert a vec3 location into its mat4 representation at shader run
    /// time. Returns the matrix variable.
    pub fn location_to_mat(&mut self, loc_vec: &str) -> String {
        let loc_mat = self.scratch_id("location");
        self.local_code.push(format!("mat4 {loc_mat}"));
        let function = functions::builtin("location_to_mat4");
        self.add_function_call(function, &[loc_vec.to_string()], &[loc_mat.clone()]);
        loc_mat
    }

    /// Convert an euler XYZ rotation into its mat4 representation.
    pub fn rotation_to_mat(&mut self, rot_vec: &str) -> String {
        let rot_mat = self.scratch_id("rotation");
        self.local_code.push(format!("mat4 {rot_mat}"));
        let function = functions::builtin("euler_angle_XYZ_to_mat4");
        self.add_function_call(function, &[rot_vec.to_string()], &[rot_mat.clone()]);
        rot_mat
    }

    /// Convert a vec3 scale into its mat4 representation.
    pub fn scale_to_mat(&mut self, scale_vec: &str) -> String {
        let sca_mat = self.scratch_id("scale");
        self.local_code.push(format!("mat4 {sca_mat}"));
        let function = functions::builtin("scale_to_mat4");
        self.add_function_call(function, &[scale_vec.to_string()], &[sca_mat.clone()]);
        sca_mat
    }

    fn initialize_value_in_socket(
        &mut self,
        graph: &Graph,
        sref: SocketRef,
        socket: &Socket,
        processed: &HashMap<NodeId, NodeConverter>,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let type_str = socket.ty.script_type();
        let id_str = self.socket_id(&socket.name, SocketDir::Input);
        self.in_sockets.insert(sref, SocketBinding::Variable(id_str.clone()));
        self.defined_ids.insert(id_str.clone());

        let mut use_default = true;
        if let Some(link) = graph.incoming_link(sref) {
            let from_node = graph.node(link.from.node);
            let Some(from_converter) = processed.get(&link.from.node) else {
                bail!(
                    "node '{}' consumed before it was processed; dependency order violated",
                    from_node.name
                );
            };
            if !from_converter.is_valid() {
                diag.warn(format!(
                    "input node '{}' not supported, use default value for socket '{}'",
                    from_node.name, socket.name
                ));
            } else {
                let Some(binding) = from_converter.out_sockets.get(&link.from) else {
                    bail!(
                        "output socket '{}' of node '{}' was never bound",
                        graph.socket(link.from).name,
                        from_node.name
                    );
                };
                use_default = false;
                let from_socket = graph.socket(link.from);
                let assign = NodeConverter::socket_assignment(
                    &id_str,
                    socket.ty,
                    binding.variable(),
                    from_socket.ty,
                );
                self.input_definitions.push(format!("{type_str} {assign}"));
            }
        }

        if use_default {
            // Unlinked normal/tangent inputs mean "the current surface
            // normal/tangent", not a numeric default.
            let value_str = match socket.name.as_str() {
                "Normal" => "NORMAL".to_string(),
                "Tangent" => "TANGENT".to_string(),
                _ => socket
                    .default
                    .as_ref()
                    .map(|v| v.to_script())
                    .unwrap_or_else(|| socket.ty.zero_script().to_string()),
            };
            self.input_definitions.push(format!("{type_str} {id_str} = {value_str}"));
        }
        Ok(())
    }

    fn initialize_shader_in_socket(
        &mut self,
        graph: &Graph,
        sref: SocketRef,
        socket: &Socket,
        processed: &HashMap<NodeId, NodeConverter>,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let mut in_link: Option<FragmentShaderLink> = None;
        if let Some(link) = graph.incoming_link(sref) {
            let from_node = graph.node(link.from.node);
            let Some(from_converter) = processed.get(&link.from.node) else {
                bail!(
                    "node '{}' consumed before it was processed; dependency order violated",
                    from_node.name
                );
            };
            if graph.socket(link.from).ty == SocketType::Shader {
                if from_converter.is_valid() {
                    let Some(binding) = from_converter.out_sockets.get(&link.from) else {
                        bail!(
                            "shader output socket '{}' of node '{}' was never bound",
                            graph.socket(link.from).name,
                            from_node.name
                        );
                    };
                    in_link = Some(binding.shader_link().clone());
                } else {
                    diag.warn(format!(
                        "input node '{}' not supported, use default shader for socket '{}'",
                        from_node.name, socket.name
                    ));
                }
            }
        }

        let mut in_link = match in_link {
            Some(link) => link,
            None => {
                // Default shader link exposes only a pure black albedo.
                let mut link = FragmentShaderLink::new();
                let albedo =
                    self.shader_prop_id(&socket.name, SocketDir::Input, ShaderProp::Albedo);
                self.input_definitions.push(format!("vec3 {albedo} = vec3(0.0, 0.0, 0.0)"));
                link.set(ShaderProp::Albedo, albedo);
                link
            }
        };

        // Re-alias every bound property into this node's namespace so the
        // upstream link stays untouched.
        for prop in ShaderProp::ALL {
            if let Some(from_id) = in_link.get(prop).map(str::to_string) {
                let cur_id = self.shader_prop_id(&socket.name, SocketDir::Input, prop);
                self.defined_ids.insert(cur_id.clone());
                self.input_definitions.push(format!(
                    "{} {cur_id} = {from_id}",
                    prop.script_type()
                ));
                in_link.set(prop, cur_id);
            }
        }

        self.in_sockets.insert(sref, SocketBinding::Shader(in_link));
        Ok(())
    }

    /// Phase one: bind every input socket, from its producer when linked
    /// and valid, from its default otherwise.
    pub fn initialize_inputs(
        &mut self,
        graph: &Graph,
        processed: &HashMap<NodeId, NodeConverter>,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let node = graph.node(self.node);
        for (index, socket) in node.inputs.iter().enumerate() {
            let sref = SocketRef::input(self.node, index);
            // Editor-only sockets (strings, virtual sockets) carry no value.
            if socket.ty == SocketType::Special {
                continue;
            }
            if socket.ty != SocketType::Shader {
                self.initialize_value_in_socket(graph, sref, socket, processed, diag)?;
            } else {
                self.initialize_shader_in_socket(graph, sref, socket, processed, diag)?;
            }
        }
        Ok(())
    }

    /// Phase three: declare every output identifier the body actually
    /// bound, skipping identifiers that already serve as inputs. Outputs
    /// never registered by the body produce no declaration.
    pub fn finalize_outputs(&mut self, graph: &Graph) {
        let node = graph.node(self.node);
        let mut to_define: Vec<(&'static str, String)> = Vec::new();
        for (index, socket) in node.outputs.iter().enumerate() {
            let sref = SocketRef::output(self.node, index);
            match self.out_sockets.get(&sref) {
                Some(SocketBinding::Variable(id)) => {
                    to_define.push((socket.ty.script_type(), id.clone()));
                }
                Some(SocketBinding::Shader(link)) => {
                    for (prop, id) in link.bound() {
                        to_define.push((prop.script_type(), id.to_string()));
                    }
                }
                None => {}
            }
        }

        for (type_str, id_str) in to_define {
            assert!(
                is_valid_identifier(&id_str),
                "generated identifier '{id_str}' is not valid"
            );
            if self.defined_ids.insert(id_str.clone()) {
                self.output_definitions.push(format!("{type_str} {id_str}"));
            }
        }
    }

    /// This node's contribution to the fragment program, in emission order.
    pub fn fragment_lines(&self) -> impl Iterator<Item = &str> {
        self.input_definitions
            .iter()
            .chain(&self.output_definitions)
            .chain(&self.local_code)
            .map(String::as_str)
    }

    pub fn vertex_lines(&self) -> impl Iterator<Item = &str> {
        self.vertex_code.iter().map(String::as_str)
    }
}
