//! Tests for the context value and the wave merge.

#[cfg(test)]
mod tests {
    use crate::context::{merge_wave, ContextField, PipelineContext, VoiceTrack};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_context_has_nothing() {
        let ctx = PipelineContext::new();
        assert!(ctx.present_fields().is_empty());
        assert!(ctx.meta.is_empty());
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        let ctx = PipelineContext::new().with_prompt("");
        assert!(ctx.is_present(ContextField::Prompt));
        assert!(!ctx.has(ContextField::Prompt));
        assert_eq!(ctx.missing(&[ContextField::Prompt]), vec![ContextField::Prompt]);
    }

    #[test]
    fn test_missing_reports_in_requested_order() {
        let ctx = PipelineContext::new().with_idea("a lighthouse");
        let missing = ctx.missing(&[
            ContextField::VideoPath,
            ContextField::Idea,
            ContextField::MusicPath,
        ]);
        assert_eq!(missing, vec![ContextField::VideoPath, ContextField::MusicPath]);
    }

    #[test]
    fn test_checkpoint_json_shape() {
        let ctx = PipelineContext::new()
            .with_idea("idea")
            .with_voice(VoiceTrack::new("voice.mp3").with_dialog("hello"))
            .with_meta("attempt", json!(2));

        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["idea"], json!("idea"));
        assert_eq!(value["prompt"], json!(null));
        assert_eq!(value["voice"]["filename"], json!("voice.mp3"));
        assert_eq!(value["voice"]["dialog"], json!("hello"));
        assert_eq!(value["meta"]["attempt"], json!(2));
    }

    #[test]
    fn test_deserialize_partial_record() {
        let ctx: PipelineContext =
            serde_json::from_str(r#"{"idea": "x", "voice": {"filename": "v.mp3"}}"#).unwrap();
        assert_eq!(ctx.idea.as_deref(), Some("x"));
        assert_eq!(ctx.voice, Some(VoiceTrack::new("v.mp3")));
        assert!(ctx.meta.is_empty());
    }

    #[test]
    fn test_merge_combines_disjoint_writes() {
        let base = PipelineContext::new().with_idea("idea").with_prompt("prompt");
        let image = base.clone().with_image_path("i.png");
        let music = base.clone().with_music_path("m.mp3");

        let outcome = merge_wave(&base, [("image", image), ("music", music)]);

        assert!(outcome.conflicts.is_empty());
        assert_eq!(
            outcome.context,
            PipelineContext::new()
                .with_idea("idea")
                .with_prompt("prompt")
                .with_image_path("i.png")
                .with_music_path("m.mp3")
        );
    }

    #[test]
    fn test_merge_keeps_sibling_write_over_stale_copy() {
        let base = PipelineContext::new().with_idea("old");
        let rewrite = base.clone().with_idea("new");
        let untouched = base.clone().with_music_path("m.mp3");

        let outcome = merge_wave(&base, [("rewrite", rewrite), ("music", untouched)]);

        assert_eq!(outcome.context.idea.as_deref(), Some("new"));
        assert_eq!(outcome.context.music_path.as_deref(), Some("m.mp3"));
    }

    #[test]
    fn test_merge_ignores_cleared_fields() {
        let base = PipelineContext::new().with_prompt("p");
        let mut cleared = base.clone();
        cleared.prompt = None;

        let outcome = merge_wave(&base, [("clear", cleared)]);
        assert_eq!(outcome.context.prompt.as_deref(), Some("p"));
    }

    #[test]
    fn test_merge_meta_per_key() {
        let base = PipelineContext::new().with_meta("seed", json!(1));
        let a = base.clone().with_meta("a", json!(true));
        let b = base.clone().with_meta("b", json!(true));

        let outcome = merge_wave(&base, [("a", a), ("b", b)]);

        assert_eq!(outcome.context.meta.len(), 3);
        assert_eq!(outcome.context.meta["a"], json!(true));
        assert_eq!(outcome.context.meta["b"], json!(true));
        assert_eq!(outcome.context.meta["seed"], json!(1));
    }

    #[test]
    fn test_merge_last_writer_wins_and_reports_conflict() {
        let base = PipelineContext::new();
        let first = base.clone().with_video_path("first.mp4");
        let second = base.clone().with_video_path("second.mp4");

        let outcome = merge_wave(&base, [("first", first), ("second", second)]);

        assert_eq!(outcome.context.video_path.as_deref(), Some("second.mp4"));
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].field, "video_path");
        assert_eq!(outcome.conflicts[0].overwritten, "first");
        assert_eq!(outcome.conflicts[0].kept, "second");
    }

    #[test]
    fn test_merge_identical_sibling_writes_are_not_conflicts() {
        let base = PipelineContext::new();
        let a = base.clone().with_meta("done", json!(true)).with_output("out.mp4");
        let b = base.clone().with_meta("done", json!(true)).with_output("out.mp4");

        let outcome = merge_wave(&base, [("a", a), ("b", b)]);
        assert!(outcome.conflicts.is_empty());
    }
}
