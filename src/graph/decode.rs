//! Binary wire format for graph messages
//!
//! Little-endian, length-prefixed. The format is produced by the extraction
//! pipeline and by the isomorphism solver; this crate consumes it and ships
//! the matching encoder for fixtures and round-trip checks.
//!
//! Decode failures surface as [`Error::Decode`] naming the field that was
//! being read, so a truncated file is never a silent empty graph.

use std::collections::BTreeMap;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::graph::{Acdfg, DataKind, DataNode, Edge, EdgeId, EdgeKind, MethodNode, Node, NodeId};

/// Magic prefix of a standalone graph message ("ACDG")
pub const GRAPH_MAGIC: u32 = 0x4744_4341;

/// The five edge sections of a graph message, in wire order
const EDGE_SECTIONS: [EdgeKind; 5] = [
    EdgeKind::Control,
    EdgeKind::Def,
    EdgeKind::Use,
    EdgeKind::Trans,
    EdgeKind::Exceptional,
];

/// Cursor over a byte buffer with contextual decode errors
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            Error::decode(format!("length overflow reading {what}"))
        })?;
        if end > self.buf.len() {
            return Err(Error::decode(format!(
                "truncated input reading {what} at offset {}",
                self.pos
            )));
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        let mut bytes = self.take(1, what)?;
        bytes
            .read_u8()
            .map_err(|_| Error::decode(format!("reading {what}")))
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        let mut bytes = self.take(4, what)?;
        bytes
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::decode(format!("reading {what}")))
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        let mut bytes = self.take(8, what)?;
        bytes
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::decode(format!("reading {what}")))
    }

    pub(crate) fn string(&mut self, what: &str) -> Result<String> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::decode(format!("invalid UTF-8 in {what}")))
    }
}

/// Growable output buffer mirroring [`Decoder`]
#[derive(Default)]
pub(crate) struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn u8(&mut self, v: u8) {
        // Writes into a Vec cannot fail
        let _ = self.buf.write_u8(v);
    }

    pub(crate) fn u32(&mut self, v: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(v);
    }

    pub(crate) fn u64(&mut self, v: u64) {
        let _ = self.buf.write_u64::<LittleEndian>(v);
    }

    pub(crate) fn string(&mut self, s: &str) {
        #[allow(clippy::cast_possible_truncation)] // strings are method names
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

fn section_len(dec: &mut Decoder<'_>, what: &str) -> Result<usize> {
    Ok(dec.u32(what)? as usize)
}

/// Read a graph message body (no magic prefix)
pub(crate) fn read_graph(dec: &mut Decoder<'_>) -> Result<Acdfg> {
    let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
    let mut edges: BTreeMap<EdgeId, Edge> = BTreeMap::new();
    let mut lines: BTreeMap<NodeId, u32> = BTreeMap::new();

    for _ in 0..section_len(dec, "data node count")? {
        let id = NodeId(dec.u64("data node id")?);
        let name = dec.string("data node name")?;
        let ty = dec.string("data node type")?;
        let kind = match dec.u8("data node kind")? {
            0 => DataKind::Var,
            1 => DataKind::Const,
            tag => {
                return Err(Error::decode(format!("unknown data node kind tag {tag}")));
            }
        };
        nodes.insert(id, Node::Data(DataNode { id, name, ty, kind }));
    }

    for _ in 0..section_len(dec, "misc node count")? {
        let id = NodeId(dec.u64("misc node id")?);
        nodes.insert(id, Node::Misc(id));
    }

    for _ in 0..section_len(dec, "method node count")? {
        let id = NodeId(dec.u64("method node id")?);
        let assignee = match dec.u8("assignee flag")? {
            0 => None,
            _ => Some(NodeId(dec.u64("assignee id")?)),
        };
        let invokee = match dec.u8("invokee flag")? {
            0 => None,
            _ => Some(NodeId(dec.u64("invokee id")?)),
        };
        let name = dec.string("method node name")?;
        let argc = section_len(dec, "argument count")?;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(NodeId(dec.u64("argument id")?));
        }
        nodes.insert(
            id,
            Node::Method(MethodNode {
                id,
                assignee,
                invokee,
                name,
                args,
            }),
        );
    }

    for kind in EDGE_SECTIONS {
        for _ in 0..section_len(dec, "edge count")? {
            let id = EdgeId(dec.u64("edge id")?);
            let from = NodeId(dec.u64("edge source")?);
            let to = NodeId(dec.u64("edge target")?);
            edges.insert(id, Edge { id, from, to, kind });
        }
    }

    for _ in 0..section_len(dec, "line count")? {
        let node = NodeId(dec.u64("line node id")?);
        let line = dec.u32("line number")?;
        lines.insert(node, line);
    }

    Acdfg::from_parts(nodes, edges, lines)
}

/// Write a graph message body (no magic prefix)
pub(crate) fn write_graph(enc: &mut Encoder, graph: &Acdfg) {
    #[allow(clippy::cast_possible_truncation)] // per-method graphs are small
    fn count(n: usize) -> u32 {
        n as u32
    }

    let data: Vec<&DataNode> = graph.data_nodes().collect();
    enc.u32(count(data.len()));
    for d in data {
        enc.u64(d.id.0);
        enc.string(&d.name);
        enc.string(&d.ty);
        enc.u8(match d.kind {
            DataKind::Var => 0,
            DataKind::Const => 1,
        });
    }

    let misc: Vec<NodeId> = graph
        .nodes()
        .filter_map(|n| match n {
            Node::Misc(id) => Some(*id),
            _ => None,
        })
        .collect();
    enc.u32(count(misc.len()));
    for id in misc {
        enc.u64(id.0);
    }

    let methods: Vec<&MethodNode> = graph
        .nodes()
        .filter_map(|n| match n {
            Node::Method(m) => Some(m),
            _ => None,
        })
        .collect();
    enc.u32(count(methods.len()));
    for m in methods {
        enc.u64(m.id.0);
        match m.assignee {
            Some(a) => {
                enc.u8(1);
                enc.u64(a.0);
            }
            None => enc.u8(0),
        }
        match m.invokee {
            Some(i) => {
                enc.u8(1);
                enc.u64(i.0);
            }
            None => enc.u8(0),
        }
        enc.string(&m.name);
        enc.u32(count(m.args.len()));
        for a in &m.args {
            enc.u64(a.0);
        }
    }

    for kind in EDGE_SECTIONS {
        let section: Vec<&Edge> = graph.edges().filter(|e| e.kind == kind).collect();
        enc.u32(count(section.len()));
        for e in section {
            enc.u64(e.id.0);
            enc.u64(e.from.0);
            enc.u64(e.to.0);
        }
    }

    let lines: Vec<(NodeId, u32)> = graph
        .nodes()
        .filter_map(|n| graph.line_of(n.id()).map(|l| (n.id(), l)))
        .collect();
    enc.u32(count(lines.len()));
    for (node, line) in lines {
        enc.u64(node.0);
        enc.u32(line);
    }
}

impl Acdfg {
    /// Decode a standalone graph message
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on a bad magic prefix, truncation, unknown
    /// tags, invalid UTF-8, or a graph violating the control/data partition.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let magic = dec.u32("graph magic")?;
        if magic != GRAPH_MAGIC {
            return Err(Error::decode(format!(
                "bad graph magic {magic:#010x}, expected {GRAPH_MAGIC:#010x}"
            )));
        }
        let graph = read_graph(&mut dec)?;
        if !dec.is_empty() {
            return Err(Error::decode("trailing bytes after graph message"));
        }
        Ok(graph)
    }

    /// Encode as a standalone graph message, the inverse of
    /// [`Acdfg::from_bytes`]
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u32(GRAPH_MAGIC);
        write_graph(&mut enc, self);
        enc.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn sample() -> Acdfg {
        let mut b = GraphBuilder::new();
        b.data_node(1, "adapter", "android.widget.Adapter", DataKind::Var);
        b.data_node(2, "0", "int", DataKind::Const);
        b.misc_node(3);
        b.method_node(4, Some(1), None, "getAdapter", &[2]);
        b.method_node(5, None, Some(1), "notifyDataSetChanged", &[]);
        b.control_edge(10, 3, 4);
        b.control_edge(11, 4, 5);
        b.edge(12, 4, 1, EdgeKind::Def);
        b.edge(13, 1, 5, EdgeKind::Use);
        b.edge(14, 3, 5, EdgeKind::Trans);
        b.line(4, 120).line(5, 124);
        b.build().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let graph = sample();
        let decoded = Acdfg::from_bytes(&graph.to_bytes()).unwrap();
        assert_eq!(graph, decoded);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Acdfg::from_bytes(&bytes),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = sample().to_bytes();
        for cut in [0, 5, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(Acdfg::from_bytes(&bytes[..cut]), Err(Error::Decode { .. })),
                "cut at {cut} must fail"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert!(matches!(
            Acdfg::from_bytes(&bytes),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_unknown_data_kind_tag() {
        let mut b = GraphBuilder::new();
        b.data_node(1, "x", "int", DataKind::Var);
        let graph = b.build().unwrap();
        let mut bytes = graph.to_bytes();
        // Flip the kind byte of the single data node (last byte of its record)
        let kind_offset = 4 + 4 + 8 + (4 + 1) + (4 + 3);
        bytes[kind_offset] = 9;
        assert!(matches!(
            Acdfg::from_bytes(&bytes),
            Err(Error::Decode { .. })
        ));
    }
}
