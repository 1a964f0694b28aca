//! Snapshot tests for core types

#[cfg(test)]
mod snapshot_tests {
    use crate::{EvalConfig, GroundednessVerdict, NeighborSet, Neighbor, Verdict};
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_default_config_snapshot() {
        assert_yaml_snapshot!(EvalConfig::default(), @r###"
        ---
        neighbors_k: 5
        retrieval_k: 5
        concurrency: 10
        seed: ~
        grounded_ratio: 0.5
        good_abstention_threshold: 4
        hallucination_threshold: 3
        verify_ungrounded: false
        "###);
    }

    #[test]
    fn test_neighbor_set_snapshot() {
        let set = NeighborSet {
            anchor_id: "doc_pages_3".to_string(),
            neighbors: vec![
                Neighbor {
                    chunk_id: "doc_pages_4".to_string(),
                    score: 0.5,
                },
                Neighbor {
                    chunk_id: "doc_pages_1".to_string(),
                    score: 0.25,
                },
            ],
        };

        assert_yaml_snapshot!(set, @r###"
        ---
        anchor_id: doc_pages_3
        neighbors:
          - chunk_id: doc_pages_4
            score: 0.5
          - chunk_id: doc_pages_1
            score: 0.25
        "###);
    }

    #[test]
    fn test_verdict_snapshot() {
        let verdict = GroundednessVerdict {
            verdict: Verdict::Score(5),
            abstained: true,
            answer: "That information is not available".to_string(),
            reasoning: None,
        };

        assert_yaml_snapshot!(verdict, @r###"
        ---
        verdict:
          kind: score
          value: 5
        abstained: true
        answer: That information is not available
        "###);
    }
}
