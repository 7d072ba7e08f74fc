#[cfg(test)]
mod test {
    use crate::config::PipelineConfig;
    use crate::emitter::Emitter;
    use crate::input::HttpInput;
    use crate::plugin::{InOutPlugins, Plugin};
    use crate::proto;
    use crate::protocol;
    use crate::tests::support::{channel_output, recv_n};
    use std::sync::Arc;

    #[tokio::test]
    async fn captures_live_requests() {
        let input = HttpInput::new("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", input.address());
        let (output, mut rx) = channel_output();

        let mut plugins = InOutPlugins::new();
        plugins
            .register(Plugin::HttpInput(input.clone()), None)
            .unwrap();
        plugins.register(Plugin::TestOutput(output), None).unwrap();

        let emitter = Emitter::new(&PipelineConfig::default());
        emitter.start(Arc::new(plugins), None);

        let client = reqwest::Client::new();
        client
            .get(format!("{}/captured?x=1", base))
            .send()
            .await
            .unwrap();
        client
            .post(format!("{}/submit", base))
            .body("a=1&b=2")
            .send()
            .await
            .unwrap();

        let messages = recv_n(&mut rx, 2).await;
        for msg in &messages {
            assert!(protocol::is_request_payload(&msg.meta));
            let parsed = protocol::parse_meta(&msg.meta).unwrap();
            assert_eq!(parsed.id.len(), 24);
            assert_eq!(parsed.latency, -1);
        }

        let get = proto::parse_request(&messages[0].data).unwrap();
        assert_eq!(get.method, "GET");
        assert_eq!(get.path, "/captured?x=1");

        let post = proto::parse_request(&messages[1].data).unwrap();
        assert_eq!(post.method, "POST");
        assert_eq!(post.path, "/submit");
        assert_eq!(post.body, b"a=1&b=2");
        assert_eq!(post.header("content-length"), Some(&b"7"[..]));

        emitter.close().await;
    }
}
