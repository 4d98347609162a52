//! Unit tests for the EventBus - the progress pub/sub channel.

#[cfg(test)]
mod bus_tests {
    use crate::bus::EventBus;
    use crate::events::{CandidateOutcome, Event, ProgressEvent};
    use crate::pipeline::{RunState, Stage, StageState};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_eventbus_new() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_eventbus_publish_subscribe() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        let result = bus.publish(Event::Stage(ProgressEvent::now(
            run_id,
            Stage::Crawl,
            StageState::Running,
        )));
        assert_eq!(result.unwrap(), 1);

        match rx.recv().await {
            Ok(Event::Stage(p)) => {
                assert_eq!(p.run_id, run_id);
                assert_eq!(p.stage, Stage::Crawl);
                assert_eq!(p.state, StageState::Running);
            }
            other => panic!("Expected Stage event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(Event::CandidateTried {
            run_id: Uuid::new_v4(),
            url: "https://www.biospace.com/acme".to_string(),
            outcome: CandidateOutcome::Accepted {
                score: 0.91,
                fetch_attempts: 1,
            },
        });

        assert!(matches!(rx1.recv().await, Ok(Event::CandidateTried { .. })));
        assert!(matches!(rx2.recv().await, Ok(Event::CandidateTried { .. })));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        let event = Event::RunFinished {
            run_id: Uuid::new_v4(),
            state: RunState::Succeeded,
            error: None,
        };
        // publish reports the missing audience, emit swallows it
        assert!(bus.publish(event.clone()).is_err());
        bus.emit(event);
    }

    #[tokio::test]
    async fn test_eventbus_capacity_lags_slow_subscriber() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        for i in 0..5 {
            bus.emit(Event::Searching {
                run_id,
                queries_attempted: i,
                candidates_found: i,
            });
        }

        assert!(matches!(
            rx.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(3))
        ));
        match rx.recv().await {
            Ok(Event::Searching { queries_attempted, .. }) => assert_eq!(queries_attempted, 3),
            other => panic!("Expected Searching event, got {:?}", other),
        }
    }
}
