//! Snapshot tests for metric reports

#[cfg(test)]
mod snapshot_tests {
    use crate::{
        FailureMode, GenerationReport, RecordGeneration, RecordRetrieval, RetrievalReport,
        Unevaluable,
    };
    use insta::assert_yaml_snapshot;

    fn retrieved(record_id: &str, ids: &[&str], rank: usize) -> RecordRetrieval {
        RecordRetrieval {
            record_id: record_id.to_string(),
            retrieved: ids.iter().map(|s| s.to_string()).collect(),
            hit: true,
            reciprocal_rank: 1.0 / rank as f64,
            first_hit_rank: Some(rank),
        }
    }

    #[test]
    fn test_retrieval_report_snapshot() {
        let records = vec![
            retrieved("b", &["4", "5", "6", "8"], 4),
            retrieved("a", &["7", "3"], 2),
        ];
        let report = RetrievalReport::from_records(4, records, vec![Unevaluable::new("c", "search timed out")]);

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.hit_rate, 1.0);
        assert_eq!(report.mrr, 0.375);
        assert_eq!(report.unevaluable, vec![Unevaluable::new("c", "search timed out")]);
        assert_yaml_snapshot!(report.records, @r###"
        ---
        - record_id: a
          retrieved:
            - "7"
            - "3"
          hit: true
          reciprocal_rank: 0.5
          first_hit_rank: 2
        - record_id: b
          retrieved:
            - "4"
            - "5"
            - "6"
            - "8"
          hit: true
          reciprocal_rank: 0.25
          first_hit_rank: 4
        "###);
    }

    fn generated(record_id: &str, grounded: bool, score: u8, answer: &str) -> RecordGeneration {
        let hallucination = !grounded && score < 3;
        RecordGeneration {
            record_id: record_id.to_string(),
            is_grounded: grounded,
            score,
            abstained: !grounded && score >= 4,
            answer: answer.to_string(),
            reasoning: None,
            good_abstention: !grounded && score >= 4,
            hallucination,
            failure: hallucination.then_some(FailureMode::Hallucination),
        }
    }

    #[test]
    fn test_generation_report_snapshot() {
        let records = vec![
            generated("n2", false, 4, "Not stated in the material"),
            generated("n1", false, 1, "It costs 49 dollars"),
            generated("g2", true, 4, "About 19 dollars"),
            generated("g1", true, 5, "19 dollars"),
        ];
        let report = GenerationReport::from_records(records, Vec::new());

        assert_yaml_snapshot!(report, @r###"
        ---
        grounded:
          evaluated: 2
          mean_score: 4.5
        not_grounded:
          evaluated: 2
          mean_score: 2.5
        hallucination_rate: 0.5
        hallucinations: 1
        good_abstentions: 1
        false_abstentions: 0
        unsupported_answers: 0
        records:
          - record_id: g1
            is_grounded: true
            score: 5
            abstained: false
            answer: 19 dollars
            good_abstention: false
            hallucination: false
          - record_id: g2
            is_grounded: true
            score: 4
            abstained: false
            answer: About 19 dollars
            good_abstention: false
            hallucination: false
          - record_id: n1
            is_grounded: false
            score: 1
            abstained: false
            answer: It costs 49 dollars
            good_abstention: false
            hallucination: true
            failure: hallucination
          - record_id: n2
            is_grounded: false
            score: 4
            abstained: true
            answer: Not stated in the material
            good_abstention: true
            hallucination: false
        unevaluable: []
        cancelled: false
        discarded: 0
        "###);
    }
}
