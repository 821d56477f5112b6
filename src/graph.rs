//! Read-only node/socket/link input model.
//!
//! The graph arrives from an external visual editor (typically as JSON) and
//! is never mutated by the compiler. Nodes and sockets are identified by
//! stable indices rather than object identity, so they can be used as cheap
//! map keys.

use std::collections::{HashMap, VecDeque};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Index of a node in [`Graph::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketDir {
    Input,
    Output,
}

/// Stable reference to one socket of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketRef {
    pub node: NodeId,
    pub dir: SocketDir,
    pub index: usize,
}

impl SocketRef {
    pub fn input(node: NodeId, index: usize) -> SocketRef {
        SocketRef { node, dir: SocketDir::Input, index }
    }

    pub fn output(node: NodeId, index: usize) -> SocketRef {
        SocketRef { node, dir: SocketDir::Output, index }
    }
}

/// Declared socket type as the editor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    /// Scalar.
    Value,
    /// 3-vector.
    Vector,
    /// 4-vector color.
    Color,
    /// Shading closure, carried as a shader link aggregate.
    Shader,
    /// Anything the compiler cannot type (strings, virtual sockets).
    Special,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: SocketType,
    #[serde(default)]
    pub default: Option<Value>,
}

impl Socket {
    pub fn new(name: impl Into<String>, ty: SocketType) -> Socket {
        Socket { name: name.into(), ty, default: None }
    }

    pub fn value(name: impl Into<String>) -> Socket {
        Socket::new(name, SocketType::Value)
    }

    pub fn vector(name: impl Into<String>) -> Socket {
        Socket::new(name, SocketType::Vector)
    }

    pub fn color(name: impl Into<String>) -> Socket {
        Socket::new(name, SocketType::Color)
    }

    pub fn shader(name: impl Into<String>) -> Socket {
        Socket::new(name, SocketType::Shader)
    }

    pub fn with_default(mut self, value: Value) -> Socket {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Kind identifier as the editor reports it, e.g. `BsdfPrincipled`.
    pub kind: String,
    /// Stable display name, used in diagnostics.
    pub name: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub inputs: Vec<Socket>,
    #[serde(default)]
    pub outputs: Vec<Socket>,
}

impl Node {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Node {
        Node {
            kind: kind.into(),
            name: name.into(),
            params: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, socket: Socket) -> Node {
        self.inputs.push(socket);
        self
    }

    pub fn with_output(mut self, socket: Socket) -> Node {
        self.outputs.push(socket);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Node {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(|v| v.as_f64())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }

    pub fn param_value(&self, key: &str) -> Option<Value> {
        self.params.get(key).and_then(Value::from_json)
    }

    /// Index of an input socket by name.
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    /// Index of an output socket by name.
    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }
}

/// Directed edge from a producer's output socket to a consumer's input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: SocketRef,
    pub to: SocketRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Graph {
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Connect a producer output socket to a consumer input socket.
    pub fn connect(&mut self, from: SocketRef, to: SocketRef) {
        debug_assert_eq!(from.dir, SocketDir::Output);
        debug_assert_eq!(to.dir, SocketDir::Input);
        self.links.push(Link { from, to });
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn socket(&self, sref: SocketRef) -> &Socket {
        let node = self.node(sref.node);
        match sref.dir {
            SocketDir::Input => &node.inputs[sref.index],
            SocketDir::Output => &node.outputs[sref.index],
        }
    }

    /// The link feeding an input socket, if any. The editor model may permit
    /// several; the first one wins.
    pub fn incoming_link(&self, to: SocketRef) -> Option<&Link> {
        self.links.iter().find(|l| l.to == to)
    }

    pub fn is_linked(&self, socket: SocketRef) -> bool {
        match socket.dir {
            SocketDir::Input => self.incoming_link(socket).is_some(),
            SocketDir::Output => self.links.iter().any(|l| l.from == socket),
        }
    }

    /// All links leaving an output socket.
    pub fn outgoing_links(&self, from: SocketRef) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.from == from)
    }

    /// Parse a graph from editor JSON.
    pub fn from_json(text: &str) -> Result<Graph> {
        let graph: Graph = serde_json::from_str(text)?;
        graph.check_link_bounds()?;
        Ok(graph)
    }

    fn check_link_bounds(&self) -> Result<()> {
        for link in &self.links {
            for sref in [link.from, link.to] {
                let Some(node) = self.nodes.get(sref.node.0) else {
                    bail!("link references missing node {}", sref.node.0);
                };
                let sockets = match sref.dir {
                    SocketDir::Input => &node.inputs,
                    SocketDir::Output => &node.outputs,
                };
                if sref.index >= sockets.len() {
                    bail!(
                        "link references missing socket {} of node '{}'",
                        sref.index,
                        node.name
                    );
                }
            }
        }
        Ok(())
    }

    /// Kahn topological sort over the link structure, producers first.
    ///
    /// The compile entry point takes the processing order as an explicit
    /// argument; this helper exists for callers that do not care about a
    /// specific tie-break.
    pub fn topo_sort(&self) -> Result<Vec<NodeId>> {
        let mut indeg = vec![0usize; self.nodes.len()];
        let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
        for link in &self.links {
            indeg[link.to.node.0] += 1;
            outgoing.entry(link.from.node.0).or_default().push(link.to.node.0);
        }

        let mut queue: VecDeque<usize> = indeg
            .iter()
            .enumerate()
            .filter_map(|(i, d)| (*d == 0).then_some(i))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(n) = queue.pop_front() {
            order.push(NodeId(n));
            if let Some(nexts) = outgoing.get(&n) {
                for &m in nexts {
                    indeg[m] -= 1;
                    if indeg[m] == 0 {
                        queue.push_back(m);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            bail!("cycle detected in graph (cannot topologically sort)");
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::default();
        let a = g.add_node(Node::new("RGB", "a").with_output(Socket::color("Color")));
        let b = g.add_node(
            Node::new("Invert", "b")
                .with_input(Socket::color("Color"))
                .with_output(Socket::color("Color")),
        );
        g.connect(SocketRef::output(a, 0), SocketRef::input(b, 0));
        (g, a, b)
    }

    #[test]
    fn incoming_link_first_wins() {
        let (mut g, a, b) = chain_graph();
        let c = g.add_node(Node::new("RGB", "c").with_output(Socket::color("Color")));
        g.connect(SocketRef::output(c, 0), SocketRef::input(b, 0));
        let link = g.incoming_link(SocketRef::input(b, 0)).unwrap();
        assert_eq!(link.from.node, a);
    }

    #[test]
    fn topo_sort_orders_producers_first() {
        let (g, a, b) = chain_graph();
        let order = g.topo_sort().unwrap();
        let pos = |id| order.iter().position(|n| *n == id).unwrap();
        assert!(pos(a) < pos(b));
    }

    #[test]
    fn topo_sort_rejects_cycles() {
        let (mut g, a, b) = chain_graph();
        // b feeds back into a
        let a_node = &mut g.nodes[a.0];
        a_node.inputs.push(Socket::color("Color"));
        g.connect(SocketRef::output(b, 0), SocketRef::input(a, 0));
        assert!(g.topo_sort().is_err());
    }

    #[test]
    fn graph_roundtrips_through_json() {
        let (g, _, b) = chain_graph();
        let text = serde_json::to_string(&g).unwrap();
        let parsed = Graph::from_json(&text).unwrap();
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.incoming_link(SocketRef::input(b, 0)).unwrap().to.node, b);
    }

    #[test]
    fn from_json_rejects_out_of_bounds_links() {
        let (mut g, a, b) = chain_graph();
        g.links.push(Link {
            from: SocketRef::output(a, 5),
            to: SocketRef::input(b, 0),
        });
        let text = serde_json::to_string(&g).unwrap();
        assert!(Graph::from_json(&text).is_err());
    }
}
