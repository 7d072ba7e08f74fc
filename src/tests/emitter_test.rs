#[cfg(test)]
mod test {
    use crate::config::PipelineConfig;
    use crate::emitter::Emitter;
    use crate::input::TestInput;
    use crate::plugin::{InOutPlugins, Plugin};
    use crate::tests::support::{assert_no_more, channel_output, recv_n};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(split_output: bool, recognize_tcp_sessions: bool) -> PipelineConfig {
        PipelineConfig {
            split_output,
            recognize_tcp_sessions,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn delivers_every_message() {
        let input = TestInput::new();
        let (output, mut rx) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins
            .register(Plugin::TestInput(input.clone()), None)
            .unwrap();
        plugins.register(Plugin::TestOutput(output), None).unwrap();

        let emitter = Emitter::new(&config(false, false));
        emitter.start(Arc::new(plugins), None);

        for _ in 0..1000 {
            input.emit_get();
        }
        recv_n(&mut rx, 1000).await;
        emitter.close().await;
    }

    #[tokio::test]
    async fn duplicates_to_every_output_without_split() {
        let input = TestInput::new();
        let (output1, mut rx1) = channel_output();
        let (output2, mut rx2) = channel_output();
        let (output3, mut rx3) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins
            .register(Plugin::TestInput(input.clone()), None)
            .unwrap();
        plugins.register(Plugin::TestOutput(output1), None).unwrap();
        plugins.register(Plugin::TestOutput(output2), None).unwrap();
        plugins.register(Plugin::TestOutput(output3), None).unwrap();

        let emitter = Emitter::new(&config(false, false));
        emitter.start(Arc::new(plugins), None);

        for _ in 0..100 {
            input.emit_get();
        }
        recv_n(&mut rx1, 100).await;
        recv_n(&mut rx2, 100).await;
        recv_n(&mut rx3, 100).await;
        assert_no_more(&mut rx1, Duration::from_millis(100)).await;
        emitter.close().await;
    }

    #[tokio::test]
    async fn round_robin_balances_exactly() {
        let input = TestInput::new();
        let (output1, mut rx1) = channel_output();
        let (output2, mut rx2) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins
            .register(Plugin::TestInput(input.clone()), None)
            .unwrap();
        plugins.register(Plugin::TestOutput(output1), None).unwrap();
        plugins.register(Plugin::TestOutput(output2), None).unwrap();

        let emitter = Emitter::new(&config(true, false));
        emitter.start(Arc::new(plugins), None);

        for _ in 0..1000 {
            input.emit_get();
        }
        recv_n(&mut rx1, 500).await;
        recv_n(&mut rx2, 500).await;
        assert_no_more(&mut rx1, Duration::from_millis(100)).await;
        assert_no_more(&mut rx2, Duration::from_millis(100)).await;
        emitter.close().await;
    }

    #[tokio::test]
    async fn session_split_keeps_flows_together() {
        let input = TestInput::new();
        input.set_skip_header(true);
        let (output1, mut rx1) = channel_output();
        let (output2, mut rx2) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins
            .register(Plugin::TestInput(input.clone()), None)
            .unwrap();
        plugins.register(Plugin::TestOutput(output1), None).unwrap();
        plugins.register(Plugin::TestOutput(output2), None).unwrap();

        let emitter = Emitter::new(&config(true, true));
        emitter.start(Arc::new(plugins), None);

        for i in 0..200 {
            let mut id = vec![b'0'; 20];
            id[0] = if i % 2 == 0 { b'a' } else { b'b' };
            let frame = format!(
                "1 {} 1 1\nGET / HTTP/1.1\r\n\r\n",
                String::from_utf8(id).unwrap()
            );
            input.emit_bytes(frame.into_bytes());
        }

        // fnv32a("a000...") is even, fnv32a("b000...") is odd, so the two
        // flows land on distinct outputs
        let first = recv_n(&mut rx1, 100).await;
        let second = recv_n(&mut rx2, 100).await;
        assert!(first.iter().all(|m| m.id().first() == Some(&b'a')));
        assert!(second.iter().all(|m| m.id().first() == Some(&b'b')));
        assert_no_more(&mut rx1, Duration::from_millis(100)).await;
        assert_no_more(&mut rx2, Duration::from_millis(100)).await;
        emitter.close().await;
    }

    #[tokio::test]
    async fn close_stops_inputs() {
        let input = TestInput::new();
        let (output, mut rx) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins
            .register(Plugin::TestInput(input.clone()), None)
            .unwrap();
        plugins.register(Plugin::TestOutput(output), None).unwrap();

        let emitter = Emitter::new(&config(false, false));
        emitter.start(Arc::new(plugins), None);

        input.emit_get();
        recv_n(&mut rx, 1).await;
        emitter.close().await;

        // the input was told to stop; nothing emitted after close flows
        input.emit_get();
        assert_no_more(&mut rx, Duration::from_millis(200)).await;
        let counters = emitter.stats().snapshot();
        assert_eq!(counters.received, 1);
        assert_eq!(counters.dispatched, 1);
    }
}
