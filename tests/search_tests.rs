//! End-to-end search tests with a scripted mock solver
//!
//! The mock solver is a shell script that copies its `-l` argument to its
//! `-o` argument, so the "lattice" file on disk holds the canned
//! search-result message the test wants the solver to produce.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use groum_search::graph::{EdgeId, GraphBuilder, NodeId};
use groum_search::lattice::{
    BinKind, BinMember, IsoMap, Lattice, PatternBin, ResultKind, SearchResultsFile, SolverResult,
};
use groum_search::{Acdfg, SearchConfig, Searcher};

/// Query: open at line 5, flush at line 6, close at line 7
fn query_graph() -> Acdfg {
    let mut b = GraphBuilder::new();
    b.method_node(21, None, None, "open", &[]);
    b.method_node(22, None, None, "flush", &[]);
    b.method_node(23, None, None, "close", &[]);
    b.control_edge(200, 21, 22);
    b.control_edge(201, 22, 23);
    b.line(21, 5).line(22, 6).line(23, 7);
    b.build().unwrap()
}

/// Representative pattern: open then close
fn representative() -> Acdfg {
    let mut b = GraphBuilder::new();
    b.method_node(1, None, None, "open", &[]);
    b.method_node(2, None, None, "close", &[]);
    b.control_edge(100, 1, 2);
    b.build().unwrap()
}

fn member(n: usize) -> BinMember {
    BinMember {
        method_name: format!("com.example.M{n}.run"),
        iso: IsoMap {
            nodes: vec![(NodeId(11), NodeId(1)), (NodeId(12), NodeId(2))],
            edges: vec![(EdgeId(110), EdgeId(100))],
        },
        lines: [(NodeId(11), 30), (NodeId(12), 35)]
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
    }
}

fn bin(id: u32, member_count: usize, subsuming: Vec<u32>) -> PatternBin {
    PatternBin {
        id,
        kind: BinKind::Popular,
        representative: representative(),
        members: (0..member_count).map(member).collect(),
        subsuming,
    }
}

fn query_iso() -> IsoMap {
    IsoMap {
        nodes: vec![(NodeId(21), NodeId(1)), (NodeId(23), NodeId(2))],
        edges: vec![],
    }
}

/// Bin 1 has popularity 2 + 3 = 5 through bin 2; bin 2 alone has 3
fn canned_results() -> SearchResultsFile {
    let lattice = Lattice::new(
        vec!["com.example.M0.run".to_owned()],
        vec![bin(1, 2, vec![2]), bin(2, 3, vec![])],
    )
    .unwrap();
    SearchResultsFile {
        lattice,
        results: vec![
            SolverResult {
                kind: ResultKind::CorrectSubsumed,
                reference_bin: 2,
                iso_to_reference: query_iso(),
                anomalous: None,
            },
            SolverResult {
                kind: ResultKind::CorrectSubsumed,
                reference_bin: 1,
                iso_to_reference: query_iso(),
                anomalous: None,
            },
        ],
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("mock_solver.sh");
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

const COPY_SOLVER: &str = r#"#!/bin/sh
lattice=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -l) lattice="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cp "$lattice" "$out"
"#;

/// Cluster directory with one cluster whose lattice file holds `payload`
fn cluster_dir(payload: &[u8]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("clusters.txt"), "1: open, close\n").unwrap();
    let lattice_dir = dir.path().join("all_clusters").join("cluster_1");
    fs::create_dir_all(&lattice_dir).unwrap();
    fs::write(lattice_dir.join("cluster_1_lattice.bin"), payload).unwrap();
    dir
}

#[tokio::test]
async fn test_search_ranks_hits_by_popularity() {
    let dir = cluster_dir(&canned_results().to_bytes());
    let solver = write_script(dir.path(), COPY_SOLVER);

    let searcher = Searcher::new(SearchConfig::new(dir.path(), solver)).unwrap();
    let results = searcher.search(&query_graph()).await.unwrap();

    assert_eq!(results.len(), 1);
    let cluster = &results[0];
    assert_eq!(cluster.cluster_id, 1);
    assert_eq!(cluster.hits.len(), 2);

    // Bin 1 subsumed by bin 2: popularity 5 beats bin 2's 3
    assert_eq!(cluster.hits[0].reference.id, 1);
    assert_eq!(cluster.hits[0].popularity, 5);
    assert_eq!(cluster.hits[1].reference.id, 2);
    assert_eq!(cluster.hits[1].popularity, 3);

    let top = &cluster.hits[0];
    assert_eq!(top.label, "CORRECT_SUBSUMED");
    assert_eq!(top.reference.cardinality, 2);
    assert_eq!(top.reference.members[0].matched_lines, vec![(5, 30), (7, 35)]);
    assert_eq!(top.reference.members[0].removed_lines, vec![6]);
    assert!(top
        .reference
        .diffs
        .iter()
        .any(|d| d.contains("should not call the methods: flush")));
    assert!(top.reference.pattern_code.contains("open()"));
}

#[tokio::test]
async fn test_search_file_round_trips_query() -> anyhow::Result<()> {
    let dir = cluster_dir(&canned_results().to_bytes());
    let solver = write_script(dir.path(), COPY_SOLVER);
    let query_path = dir.path().join("query.acdfg.bin");
    fs::write(&query_path, query_graph().to_bytes())?;

    let searcher = Searcher::new(SearchConfig::new(dir.path(), solver))?;
    let results = searcher.search_file(&query_path).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].hits.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_solver_timeout_yields_empty_results() {
    let dir = cluster_dir(&canned_results().to_bytes());
    let solver = write_script(dir.path(), "#!/bin/sh\nsleep 5\n");

    let mut config = SearchConfig::new(dir.path(), solver);
    config.timeout = Duration::from_millis(100);
    let searcher = Searcher::new(config).unwrap();

    let results = searcher.search(&query_graph()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_solver_failure_yields_empty_results() {
    let dir = cluster_dir(&canned_results().to_bytes());
    let solver = write_script(dir.path(), "#!/bin/sh\necho boom >&2\nexit 3\n");

    let searcher = Searcher::new(SearchConfig::new(dir.path(), solver)).unwrap();
    let results = searcher.search(&query_graph()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_garbage_solver_output_is_isolated() {
    let dir = cluster_dir(b"not a results file");
    let solver = write_script(dir.path(), COPY_SOLVER);

    let searcher = Searcher::new(SearchConfig::new(dir.path(), solver)).unwrap();
    let results = searcher.search(&query_graph()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_no_candidate_clusters_is_empty_success() {
    let dir = cluster_dir(&canned_results().to_bytes());
    let solver = write_script(dir.path(), COPY_SOLVER);
    let searcher = Searcher::new(SearchConfig::new(dir.path(), solver)).unwrap();

    // Query shares no method names with the cluster
    let mut b = GraphBuilder::new();
    b.method_node(1, None, None, "recycle", &[]);
    b.method_node(2, None, None, "obtain", &[]);
    b.control_edge(10, 1, 2);
    let query = b.build().unwrap();

    let results = searcher.search(&query).await.unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_missing_descriptor_fails_construction() {
    let dir = TempDir::new().unwrap();
    assert!(Searcher::new(SearchConfig::new(dir.path(), "/bin/true")).is_err());
}
