//! Pattern lattices and solver result files
//!
//! A lattice is the mined output for one cluster: pattern bins ordered by
//! subsumption, each holding a representative graph and the cluster members
//! matching it. The isomorphism solver consumes a lattice plus a query graph
//! and emits a search-result message pairing the query with bins; this module
//! decodes both sides and computes bin popularity over the subsumption DAG.
//!
//! # Example
//!
//! ```no_run
//! use groum_search::lattice::SearchResultsFile;
//!
//! let bytes = std::fs::read("cluster_7_results.bin")?;
//! let file = SearchResultsFile::from_bytes(&bytes)?;
//! for bin in file.lattice.bins() {
//!     println!("bin {} popularity {}", bin.id, file.lattice.popularity(bin.id)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::error::{Error, Result};
use crate::graph::decode::{read_graph, write_graph, Decoder, Encoder};
use crate::graph::{Acdfg, EdgeId, NodeId};

/// Magic prefix of a search-result message ("GLTS")
pub const RESULTS_MAGIC: u32 = 0x5354_4C47;

/// Node and edge correspondences between two graphs, as reported by the
/// solver
///
/// Pairs are `(source, reference)`: the source side is the query or a
/// cluster member, the reference side a bin representative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsoMap {
    /// Node id pairs
    pub nodes: Vec<(NodeId, NodeId)>,
    /// Edge id pairs
    pub edges: Vec<(EdgeId, EdgeId)>,
}

/// Mining verdict for a bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinKind {
    /// Frequent enough to count as the expected usage
    Popular,
    /// A deviation from a popular pattern
    Anomalous,
    /// Too rare to classify
    Isolated,
}

impl BinKind {
    fn from_flags(flags: u8) -> Result<Self> {
        match flags {
            0b001 => Ok(Self::Popular),
            0b010 => Ok(Self::Anomalous),
            0b100 => Ok(Self::Isolated),
            other => Err(Error::decode(format!(
                "bin flags {other:#05b} do not name exactly one kind"
            ))),
        }
    }

    fn to_flags(self) -> u8 {
        match self {
            Self::Popular => 0b001,
            Self::Anomalous => 0b010,
            Self::Isolated => 0b100,
        }
    }
}

/// A cluster method matching a bin's representative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinMember {
    /// Fully qualified source method name
    pub method_name: String,
    /// Correspondence member → representative
    pub iso: IsoMap,
    /// Source line numbers of the member's nodes
    pub lines: BTreeMap<NodeId, u32>,
}

/// One pattern bin of a lattice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternBin {
    /// Bin id, unique within the lattice
    pub id: u32,
    /// Mining verdict
    pub kind: BinKind,
    /// The mined pattern graph
    pub representative: Acdfg,
    /// Cluster methods matching the representative
    pub members: Vec<BinMember>,
    /// Ids of bins whose patterns subsume this one
    pub subsuming: Vec<u32>,
}

impl PatternBin {
    /// Number of methods matching this bin directly
    #[must_use]
    pub fn cardinality(&self) -> u64 {
        self.members.len() as u64
    }
}

/// The mined lattice for one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lattice {
    /// Names of the methods the cluster was mined from
    pub method_names: Vec<String>,
    bins: BTreeMap<u32, PatternBin>,
}

impl Lattice {
    /// Build a lattice from parts, rejecting duplicate bin ids
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] on a duplicate bin id.
    pub fn new(method_names: Vec<String>, bins: Vec<PatternBin>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for bin in bins {
            let id = bin.id;
            if map.insert(id, bin).is_some() {
                return Err(Error::decode(format!("duplicate bin id {id} in lattice")));
            }
        }
        Ok(Self {
            method_names,
            bins: map,
        })
    }

    /// Bin lookup by id
    #[must_use]
    pub fn bin(&self, id: u32) -> Option<&PatternBin> {
        self.bins.get(&id)
    }

    /// All bins in id order
    pub fn bins(&self) -> impl Iterator<Item = &PatternBin> {
        self.bins.values()
    }

    /// Popularity of a bin: total members of the bin and every bin that
    /// transitively subsumes it
    ///
    /// The subsumption relation is a DAG that may reconverge, so the walk
    /// carries a visited set and counts each bin once. A subsuming id absent
    /// from the lattice is logged and skipped.
    ///
    /// # Errors
    ///
    /// [`Error::MissingMapping`] when `id` itself is not in the lattice.
    pub fn popularity(&self, id: u32) -> Result<u64> {
        if !self.bins.contains_key(&id) {
            return Err(Error::MissingMapping(format!(
                "bin {id} not found in lattice"
            )));
        }

        let mut total: u64 = 0;
        let mut visited: BTreeSet<u32> = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(bin) = self.bins.get(&current) else {
                warn!(bin = current, "subsuming id missing from lattice, skipped");
                continue;
            };
            total += bin.cardinality();
            for next in &bin.subsuming {
                if !visited.contains(next) {
                    stack.push(*next);
                }
            }
        }
        Ok(total)
    }
}

/// How the solver placed the query relative to a reference bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Query matches a popular pattern exactly
    Correct,
    /// Query contains a popular pattern
    CorrectSubsumed,
    /// Query contains an anomalous deviation of a popular pattern
    AnomalousSubsumed,
    /// Query contains an isolated pattern
    IsolatedSubsumed,
    /// Query is contained in an isolated pattern
    IsolatedSubsuming,
}

impl ResultKind {
    /// Decode the wire tag
    ///
    /// # Errors
    ///
    /// [`Error::UnknownResultKind`] on an unrecognized tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Correct),
            1 => Ok(Self::CorrectSubsumed),
            2 => Ok(Self::AnomalousSubsumed),
            3 => Ok(Self::IsolatedSubsumed),
            4 => Ok(Self::IsolatedSubsuming),
            other => Err(Error::UnknownResultKind(other)),
        }
    }

    fn to_tag(self) -> u8 {
        match self {
            Self::Correct => 0,
            Self::CorrectSubsumed => 1,
            Self::AnomalousSubsumed => 2,
            Self::IsolatedSubsumed => 3,
            Self::IsolatedSubsuming => 4,
        }
    }
}

/// One solver verdict pairing the query with a reference bin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverResult {
    /// Placement of the query relative to the reference bin
    pub kind: ResultKind,
    /// The reference bin id
    pub reference_bin: u32,
    /// Correspondence query → reference representative
    pub iso_to_reference: IsoMap,
    /// Anomalous bin and its correspondence, for anomaly verdicts
    pub anomalous: Option<(u32, IsoMap)>,
}

/// A decoded solver output file: the lattice it ran against plus its
/// verdicts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultsFile {
    /// The cluster lattice, as embedded by the solver
    pub lattice: Lattice,
    /// Verdicts, in solver order; unknown-kind records were dropped
    pub results: Vec<SolverResult>,
}

fn read_iso(dec: &mut Decoder<'_>) -> Result<IsoMap> {
    let mut iso = IsoMap::default();
    for _ in 0..dec.u32("iso node pair count")? {
        let a = NodeId(dec.u64("iso node id")?);
        let b = NodeId(dec.u64("iso node id")?);
        iso.nodes.push((a, b));
    }
    for _ in 0..dec.u32("iso edge pair count")? {
        let a = EdgeId(dec.u64("iso edge id")?);
        let b = EdgeId(dec.u64("iso edge id")?);
        iso.edges.push((a, b));
    }
    Ok(iso)
}

fn write_iso(enc: &mut Encoder, iso: &IsoMap) {
    #[allow(clippy::cast_possible_truncation)]
    enc.u32(iso.nodes.len() as u32);
    for (a, b) in &iso.nodes {
        enc.u64(a.0);
        enc.u64(b.0);
    }
    #[allow(clippy::cast_possible_truncation)]
    enc.u32(iso.edges.len() as u32);
    for (a, b) in &iso.edges {
        enc.u64(a.0);
        enc.u64(b.0);
    }
}

fn read_lattice(dec: &mut Decoder<'_>) -> Result<Lattice> {
    let mut method_names = Vec::new();
    for _ in 0..dec.u32("lattice method count")? {
        method_names.push(dec.string("lattice method name")?);
    }

    let mut bins = Vec::new();
    for _ in 0..dec.u32("bin count")? {
        let id = dec.u32("bin id")?;
        let kind = BinKind::from_flags(dec.u8("bin flags")?)?;
        let representative = read_graph(dec)?;

        let mut members = Vec::new();
        for _ in 0..dec.u32("bin member count")? {
            let method_name = dec.string("member method name")?;
            let iso = read_iso(dec)?;
            let mut lines = BTreeMap::new();
            for _ in 0..dec.u32("member line count")? {
                let node = NodeId(dec.u64("member line node id")?);
                lines.insert(node, dec.u32("member line number")?);
            }
            members.push(BinMember {
                method_name,
                iso,
                lines,
            });
        }

        let mut subsuming = Vec::new();
        for _ in 0..dec.u32("subsuming count")? {
            subsuming.push(dec.u32("subsuming bin id")?);
        }

        bins.push(PatternBin {
            id,
            kind,
            representative,
            members,
            subsuming,
        });
    }

    Lattice::new(method_names, bins)
}

fn write_lattice(enc: &mut Encoder, lattice: &Lattice) {
    #[allow(clippy::cast_possible_truncation)]
    fn count(n: usize) -> u32 {
        n as u32
    }

    enc.u32(count(lattice.method_names.len()));
    for name in &lattice.method_names {
        enc.string(name);
    }

    enc.u32(count(lattice.bins.len()));
    for bin in lattice.bins.values() {
        enc.u32(bin.id);
        enc.u8(bin.kind.to_flags());
        write_graph(enc, &bin.representative);
        enc.u32(count(bin.members.len()));
        for member in &bin.members {
            enc.string(&member.method_name);
            write_iso(enc, &member.iso);
            enc.u32(count(member.lines.len()));
            for (node, line) in &member.lines {
                enc.u64(node.0);
                enc.u32(*line);
            }
        }
        enc.u32(count(bin.subsuming.len()));
        for id in &bin.subsuming {
            enc.u32(*id);
        }
    }
}

impl SearchResultsFile {
    /// Decode a solver output file
    ///
    /// Records with an unknown result-kind tag are logged and dropped; all
    /// other malformations fail the whole file.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] on a bad magic, truncation, bad flags, or trailing
    /// bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let magic = dec.u32("results magic")?;
        if magic != RESULTS_MAGIC {
            return Err(Error::decode(format!(
                "bad results magic {magic:#010x}, expected {RESULTS_MAGIC:#010x}"
            )));
        }

        let lattice = read_lattice(&mut dec)?;

        let mut results = Vec::new();
        for _ in 0..dec.u32("result count")? {
            let tag = dec.u8("result kind tag")?;
            let reference_bin = dec.u32("reference bin id")?;
            let iso_to_reference = read_iso(&mut dec)?;
            let anomalous = match dec.u8("anomalous flag")? {
                0 => None,
                _ => {
                    let bin = dec.u32("anomalous bin id")?;
                    Some((bin, read_iso(&mut dec)?))
                }
            };
            match ResultKind::from_tag(tag) {
                Ok(kind) => results.push(SolverResult {
                    kind,
                    reference_bin,
                    iso_to_reference,
                    anomalous,
                }),
                Err(err) => {
                    warn!(%err, reference_bin, "dropping result with unknown kind");
                }
            }
        }

        if !dec.is_empty() {
            return Err(Error::decode("trailing bytes after results message"));
        }
        Ok(Self { lattice, results })
    }

    /// Encode as a solver output file, the inverse of
    /// [`SearchResultsFile::from_bytes`]
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u32(RESULTS_MAGIC);
        write_lattice(&mut enc, &self.lattice);

        #[allow(clippy::cast_possible_truncation)]
        enc.u32(self.results.len() as u32);
        for result in &self.results {
            enc.u8(result.kind.to_tag());
            enc.u32(result.reference_bin);
            write_iso(&mut enc, &result.iso_to_reference);
            match &result.anomalous {
                Some((bin, iso)) => {
                    enc.u8(1);
                    enc.u32(*bin);
                    write_iso(&mut enc, iso);
                }
                None => enc.u8(0),
            }
        }
        enc.into_bytes()
    }
}
