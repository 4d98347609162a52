//! Unit tests for Events - progress event shapes and wire format.

#[cfg(test)]
mod events_tests {
    use crate::events::*;
    use crate::pipeline::{RunState, Stage, StageState};
    use uuid::Uuid;

    // ============= ProgressEvent Tests =============

    #[test]
    fn test_progress_event_now() {
        let run_id = Uuid::new_v4();
        let before = chrono::Utc::now();
        let event = ProgressEvent::now(run_id, Stage::Analyze, StageState::Succeeded);

        assert_eq!(event.run_id, run_id);
        assert_eq!(event.stage, Stage::Analyze);
        assert_eq!(event.state, StageState::Succeeded);
        assert!(event.timestamp >= before);
    }

    #[test]
    fn test_stage_event_serialization() {
        let run_id = Uuid::new_v4();
        let event = Event::Stage(ProgressEvent::now(run_id, Stage::Crawl, StageState::Failed));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage");
        assert_eq!(json["run_id"], run_id.to_string());
        assert_eq!(json["stage"], "crawl");
        assert_eq!(json["state"], "failed");
        assert!(json["timestamp"].is_string());
    }

    // ============= CandidateTried Tests =============

    #[test]
    fn test_candidate_outcome_serialization() {
        let event = Event::CandidateTried {
            run_id: Uuid::new_v4(),
            url: "https://acme.example/pr".to_string(),
            outcome: CandidateOutcome::BelowThreshold {
                score: 0.31,
                fetch_attempts: 2,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "candidate_tried");
        assert_eq!(json["outcome"]["outcome"], "below_threshold");
        assert_eq!(json["outcome"]["fetch_attempts"], 2);
    }

    #[test]
    fn test_fetch_failed_outcome_equality() {
        let a = CandidateOutcome::FetchFailed {
            reason: "HTTP 404".to_string(),
            attempts: 1,
        };
        assert_eq!(a.clone(), a);
        assert_ne!(
            a,
            CandidateOutcome::FetchFailed {
                reason: "HTTP 404".to_string(),
                attempts: 3,
            }
        );
    }

    // ============= RunFinished / run_id Tests =============

    #[test]
    fn test_run_finished_serialization() {
        let event = Event::RunFinished {
            run_id: Uuid::new_v4(),
            state: RunState::Cancelled,
            error: Some("Run cancelled".to_string()),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_finished");
        assert_eq!(json["state"], "cancelled");
        assert_eq!(json["error"], "Run cancelled");
    }

    #[test]
    fn test_run_id_accessor_covers_every_variant() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::Stage(ProgressEvent::now(run_id, Stage::Advise, StageState::Running)),
            Event::Searching {
                run_id,
                queries_attempted: 2,
                candidates_found: 7,
            },
            Event::CandidateTried {
                run_id,
                url: "https://a.example".to_string(),
                outcome: CandidateOutcome::Accepted {
                    score: 0.8,
                    fetch_attempts: 1,
                },
            },
            Event::RunFinished {
                run_id,
                state: RunState::Succeeded,
                error: None,
            },
        ];
        assert!(events.iter().all(|e| e.run_id() == run_id));
    }
}
