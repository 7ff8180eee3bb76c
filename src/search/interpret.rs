//! Turning raw solver verdicts into user-facing hits

use tracing::warn;

use crate::codegen::{render_diff, CodeGenerator};
use crate::diff::{diff_residues, line_correspondence, DiffKind, Mapping};
use crate::error::{Error, Result};
use crate::graph::Acdfg;
use crate::lattice::{Lattice, PatternBin, ResultKind, SolverResult};
use crate::search::{BinRef, MemberMatch, SearchHit};

/// What a result kind means for the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Stable label for the verdict
    pub label: &'static str,
    /// The query contains the reference pattern
    pub subsumes_reference: bool,
    /// The query contains the anomalous deviation
    pub subsumes_anomalous: bool,
}

/// Fixed interpretation table over the five result kinds
#[must_use]
pub fn classify(kind: ResultKind) -> Classification {
    match kind {
        ResultKind::Correct => Classification {
            label: "CORRECT",
            subsumes_reference: false,
            subsumes_anomalous: false,
        },
        ResultKind::CorrectSubsumed => Classification {
            label: "CORRECT_SUBSUMED",
            subsumes_reference: true,
            subsumes_anomalous: false,
        },
        ResultKind::AnomalousSubsumed => Classification {
            label: "ANOMALOUS_SUBSUMED",
            subsumes_reference: true,
            subsumes_anomalous: true,
        },
        ResultKind::IsolatedSubsumed => Classification {
            label: "ISOLATED_SUBSUMED",
            subsumes_reference: true,
            subsumes_anomalous: false,
        },
        ResultKind::IsolatedSubsuming => Classification {
            label: "ISOLATED_SUBSUMING",
            subsumes_reference: false,
            subsumes_anomalous: false,
        },
    }
}

/// Assemble the user-facing hit for one solver verdict
///
/// # Errors
///
/// [`Error::MissingMapping`] when the verdict names a bin absent from the
/// lattice; the caller isolates this to the one result.
pub(crate) fn interpret_result(
    query: &Acdfg,
    lattice: &Lattice,
    result: &SolverResult,
) -> Result<SearchHit> {
    let classification = classify(result.kind);

    let reference_bin = lattice.bin(result.reference_bin).ok_or_else(|| {
        Error::MissingMapping(format!(
            "reference bin {} absent from lattice",
            result.reference_bin
        ))
    })?;
    let query_to_ref = Mapping::new(query, &reference_bin.representative, &result.iso_to_reference);
    let reference = build_bin_ref(query, lattice, reference_bin, &query_to_ref)?;
    let popularity = reference.frequency;

    let anomalous = match &result.anomalous {
        Some((bin_id, iso)) if classification.subsumes_anomalous => {
            let bin = lattice.bin(*bin_id).ok_or_else(|| {
                Error::MissingMapping(format!("anomalous bin {bin_id} absent from lattice"))
            })?;
            let query_to_anom = Mapping::new(query, &bin.representative, iso);
            Some(build_bin_ref(query, lattice, bin, &query_to_anom)?)
        }
        _ => None,
    };

    Ok(SearchHit {
        label: classification.label.to_owned(),
        popularity,
        reference,
        anomalous,
    })
}

fn build_bin_ref(
    query: &Acdfg,
    lattice: &Lattice,
    bin: &PatternBin,
    query_to_bin: &Mapping,
) -> Result<BinRef> {
    let frequency = lattice.popularity(bin.id)?;

    let mut members = Vec::new();
    for member in &bin.members {
        let member_to_ref = Mapping::from_member(member, &bin.representative);
        match query_to_bin.compose(&member_to_ref) {
            Ok(query_to_member) => {
                let lines = line_correspondence(query, &query_to_member, &member.lines);
                members.push(MemberMatch {
                    method_name: member.method_name.clone(),
                    matched_lines: lines.matched,
                    added_lines: lines.additions,
                    removed_lines: lines.removals,
                });
            }
            Err(err) => {
                warn!(
                    bin = bin.id,
                    member = %member.method_name,
                    %err,
                    "member correspondence unusable, skipped"
                );
            }
        }
    }

    let mut diffs = Vec::new();
    for diff in diff_residues(
        &bin.representative,
        |n| query_to_bin.is_matched_b(n),
        DiffKind::Add,
    ) {
        diffs.push(render_diff(&diff, &bin.representative));
    }
    for diff in diff_residues(query, |n| query_to_bin.is_matched_a(n), DiffKind::Remove) {
        diffs.push(render_diff(&diff, query));
    }

    // The representative doubles as its own unreduced oracle; reduced bins
    // keep their TRANS edges as-is
    let pattern_code = CodeGenerator::new(&bin.representative, &bin.representative).render();

    Ok(BinRef {
        id: bin.id,
        frequency,
        cardinality: bin.cardinality(),
        members,
        diffs,
        pattern_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, NodeId};
    use crate::lattice::{BinKind, BinMember, IsoMap};
    use std::collections::BTreeMap;

    fn chain(ids: &[u64], names: &[&str]) -> Acdfg {
        let mut b = GraphBuilder::new();
        for (id, name) in ids.iter().zip(names) {
            b.method_node(*id, None, None, name, &[]);
        }
        for (i, pair) in ids.windows(2).enumerate() {
            b.control_edge(100 + i as u64, pair[0], pair[1]);
        }
        b.build().unwrap()
    }

    fn lattice_with_one_bin() -> Lattice {
        let representative = chain(&[1, 2], &["open", "close"]);
        let member = BinMember {
            method_name: "com.example.App.run".to_owned(),
            iso: IsoMap {
                nodes: vec![(NodeId(11), NodeId(1)), (NodeId(12), NodeId(2))],
                edges: vec![(crate::graph::EdgeId(110), crate::graph::EdgeId(100))],
            },
            lines: [(NodeId(11), 30), (NodeId(12), 35)]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
        };
        Lattice::new(
            vec!["com.example.App.run".to_owned()],
            vec![PatternBin {
                id: 7,
                kind: BinKind::Popular,
                representative,
                members: vec![member],
                subsuming: vec![],
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(classify(ResultKind::Correct).label, "CORRECT");
        assert!(!classify(ResultKind::Correct).subsumes_reference);
        assert!(classify(ResultKind::CorrectSubsumed).subsumes_reference);
        assert!(classify(ResultKind::AnomalousSubsumed).subsumes_anomalous);
        assert!(classify(ResultKind::IsolatedSubsumed).subsumes_reference);
        assert!(!classify(ResultKind::IsolatedSubsuming).subsumes_reference);
        // Only the anomalous verdict carries an anomalous side
        for kind in [
            ResultKind::Correct,
            ResultKind::CorrectSubsumed,
            ResultKind::IsolatedSubsumed,
            ResultKind::IsolatedSubsuming,
        ] {
            assert!(!classify(kind).subsumes_anomalous);
        }
    }

    #[test]
    fn test_interpret_builds_hit_with_member_lines() {
        let lattice = lattice_with_one_bin();
        // Query calls open at line 5, close at line 6, plus an extra flush
        let mut b = GraphBuilder::new();
        b.method_node(21, None, None, "open", &[]);
        b.method_node(22, None, None, "flush", &[]);
        b.method_node(23, None, None, "close", &[]);
        b.control_edge(200, 21, 22);
        b.control_edge(201, 22, 23);
        b.line(21, 5).line(22, 6).line(23, 7);
        let query = b.build().unwrap();

        let result = SolverResult {
            kind: ResultKind::CorrectSubsumed,
            reference_bin: 7,
            iso_to_reference: IsoMap {
                nodes: vec![(NodeId(21), NodeId(1)), (NodeId(23), NodeId(2))],
                edges: vec![],
            },
            anomalous: None,
        };

        let hit = interpret_result(&query, &lattice, &result).unwrap();
        assert_eq!(hit.label, "CORRECT_SUBSUMED");
        assert_eq!(hit.popularity, 1);
        assert_eq!(hit.reference.id, 7);
        assert_eq!(hit.reference.cardinality, 1);
        assert!(hit.anomalous.is_none());

        let member = &hit.reference.members[0];
        assert_eq!(member.method_name, "com.example.App.run");
        assert_eq!(member.matched_lines, vec![(5, 30), (7, 35)]);
        assert_eq!(member.removed_lines, vec![6]);
        assert!(member.added_lines.is_empty());

        // The extra flush call shows up as a removal diff
        assert!(hit
            .reference
            .diffs
            .iter()
            .any(|d| d.contains("should not call the methods: flush")));
        assert!(hit.reference.pattern_code.contains("open()"));
    }

    #[test]
    fn test_interpret_missing_bin_is_isolated() {
        let lattice = lattice_with_one_bin();
        let query = chain(&[21], &["open"]);
        let result = SolverResult {
            kind: ResultKind::Correct,
            reference_bin: 99,
            iso_to_reference: IsoMap::default(),
            anomalous: None,
        };
        assert!(matches!(
            interpret_result(&query, &lattice, &result),
            Err(Error::MissingMapping(_))
        ));
    }
}
