#[cfg(test)]
mod test {
    use crate::config::PipelineConfig;
    use crate::emitter::Emitter;
    use crate::input::{FileInput, TestInput};
    use crate::output::FileOutput;
    use crate::plugin::{InOutPlugins, Plugin};
    use crate::protocol;
    use crate::tests::support::{channel_output, recv_n};
    use std::sync::Arc;

    #[tokio::test]
    async fn records_and_replays_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.log");
        let path = path.to_str().unwrap();

        // record three messages
        {
            let input = TestInput::new();
            let output = FileOutput::new(path).await.unwrap();

            let mut plugins = InOutPlugins::new();
            plugins
                .register(Plugin::TestInput(input.clone()), None)
                .unwrap();
            plugins.register(Plugin::FileOutput(output), None).unwrap();

            let emitter = Emitter::new(&PipelineConfig::default());
            emitter.start(Arc::new(plugins), None);
            input.emit_get();
            input.emit_post();
            input.emit_get();

            // drain before closing so all three frames land on disk
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            emitter.close().await;
        }

        let recorded = std::fs::read(path).unwrap();
        assert_eq!(protocol::split_frames(&recorded).len(), 3);

        // play them back
        let input = FileInput::new(path, false).await.unwrap();
        let (output, mut rx) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins.register(Plugin::FileInput(input), None).unwrap();
        plugins.register(Plugin::TestOutput(output), None).unwrap();

        let emitter = Emitter::new(&PipelineConfig::default());
        emitter.start(Arc::new(plugins), None);

        let replayed = recv_n(&mut rx, 3).await;
        assert!(replayed[0].data.starts_with(b"GET /"));
        assert!(replayed[1].data.starts_with(b"POST /"));
        assert!(replayed
            .iter()
            .all(|m| protocol::is_request_payload(&m.meta)));
        emitter.close().await;
    }

    #[tokio::test]
    async fn loop_playback_wraps_around() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.log");
        let mut recording = Vec::new();
        recording
            .extend_from_slice(b"1 00112233445566778899aabb 1 -1\nGET /loop HTTP/1.1\r\n\r\n");
        recording.extend_from_slice(protocol::PAYLOAD_SEPARATOR);
        std::fs::write(&path, &recording).unwrap();

        let input = FileInput::new(path.to_str().unwrap(), true).await.unwrap();
        let (output, mut rx) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins.register(Plugin::FileInput(input), None).unwrap();
        plugins.register(Plugin::TestOutput(output), None).unwrap();

        let emitter = Emitter::new(&PipelineConfig::default());
        emitter.start(Arc::new(plugins), None);

        // one recorded frame, more than one delivery
        let replayed = recv_n(&mut rx, 5).await;
        assert!(replayed.iter().all(|m| m.data.starts_with(b"GET /loop")));
        emitter.close().await;
    }

    #[tokio::test]
    async fn missing_recording_is_a_constructor_error() {
        let err = FileInput::new("/definitely/not/here.log", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::RecastErrorKind::Constructor);
    }
}
