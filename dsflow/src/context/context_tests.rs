//! Tests for the step context.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::{Kwargs, RunIdentity, StepContext};
    use crate::events::{types, CollectingEventSink};
    use crate::progress::ProgressSample;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn identity() -> Arc<RunIdentity> {
        Arc::new(RunIdentity::new("integrated", "ds-7"))
    }

    #[test]
    fn test_defaults() {
        let ctx = StepContext::new(identity(), "archive_dataset");
        assert_eq!(ctx.pipeline(), "integrated");
        assert_eq!(ctx.dataset_id(), "ds-7");
        assert_eq!(ctx.step_name(), "archive_dataset");
        assert_eq!(ctx.attempt(), 1);
        assert!(ctx.kwargs().is_empty());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_kwargs_and_outputs() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("batch_id".to_string(), serde_json::json!(12));
        let mut outputs = HashMap::new();
        outputs.insert("inspect_dataset".to_string(), serde_json::json!({"du_size": 2048}));

        let ctx = StepContext::new(identity(), "archive_dataset")
            .with_kwargs(Arc::new(kwargs))
            .with_outputs(outputs);

        assert_eq!(ctx.kwarg("batch_id"), Some(&serde_json::json!(12)));
        assert_eq!(ctx.kwarg("missing"), None);
        assert_eq!(
            ctx.output("inspect_dataset"),
            Some(&serde_json::json!({"du_size": 2048}))
        );
    }

    #[test]
    fn test_set_attempt() {
        let ctx = StepContext::new(identity(), "stage_dataset");
        ctx.set_attempt(3);
        assert_eq!(ctx.attempt(), 3);
    }

    #[test]
    fn test_shared_cancellation() {
        let token = Arc::new(CancellationToken::new());
        let ctx = StepContext::new(identity(), "stage_dataset").with_cancellation(token.clone());
        token.cancel("revoked");
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_events_are_annotated() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StepContext::new(identity(), "validate_dataset").with_event_sink(sink.clone());

        ctx.try_emit_event(types::STEP_STARTED, None);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let data = events[0].1.clone().unwrap();
        assert_eq!(data["step"], "validate_dataset");
        assert_eq!(data["pipeline"], "integrated");
        assert_eq!(data["dataset_id"], "ds-7");
        assert!(data["run_id"].is_string());
    }

    #[test]
    fn test_report_progress() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StepContext::new(identity(), "archive_dataset").with_event_sink(sink.clone());

        ctx.report_progress(&ProgressSample::new("archive", 50, Some(200)));

        let events = sink.events_of_type(types::STEP_PROGRESS);
        assert_eq!(events.len(), 1);
        let data = events[0].1.clone().unwrap();
        assert_eq!(data["name"], "archive");
        assert_eq!(data["done"], 50);
        assert_eq!(data["percent_done"], 0.25);
        assert_eq!(data["step"], "archive_dataset");
    }

    #[test]
    fn test_last_progress_keeps_latest_sample() {
        let ctx = StepContext::new(identity(), "archive_dataset");
        assert_eq!(ctx.last_progress(), None);

        ctx.report_progress(&ProgressSample::new("archive", 50, Some(200)));
        ctx.report_progress(&ProgressSample::new("archive", 150, Some(200)));

        let latest = ctx.last_progress().unwrap();
        assert_eq!(latest.done, 150);
        assert_eq!(latest.percent_done, Some(0.75));
    }
}
