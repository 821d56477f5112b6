//! Compiles node-based material graphs into shader script text.
//!
//! A [`Graph`] of typed nodes and links (usually parsed from editor JSON)
//! is walked in dependency order; every node emits a small block of script
//! into the fragment program, and closure nodes thread a
//! [`FragmentShaderLink`] of named shading properties towards the material
//! output. The result is a [`CompiledMaterial`]: program text plus the
//! textures, library functions, feature flags and warnings the surrounding
//! shader template needs to finish the job.
//!
//! ```
//! # fn main() -> anyhow::Result<()> {
//! use node_shader_compiler::{Graph, Node, Socket, Value, compile_material};
//!
//! let mut graph = Graph::default();
//! graph.add_node(
//!     Node::new("RGB", "rgb").with_output(
//!         Socket::color("Color").with_default(Value::Vec4([1.0, 0.5, 0.25, 1.0])),
//!     ),
//! );
//! let order = graph.topo_sort()?;
//! let material = compile_material(&graph, &order)?;
//! assert!(material.fragment_code.contains("vec4(1.0, 0.5, 0.25, 1.0)"));
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod diagnostics;
pub mod functions;
pub mod graph;
pub mod shader_link;
pub mod value;

pub use compiler::{
    CompiledMaterial, ConverterKind, NodeConverter, ShadingFlags, SocketBinding,
    TextureBinding, TextureHint, classify, compile_material,
};
pub use diagnostics::Diagnostics;
pub use graph::{Graph, Link, Node, NodeId, Socket, SocketDir, SocketRef, SocketType};
pub use shader_link::{FragmentShaderLink, ShaderProp};
pub use value::Value;
