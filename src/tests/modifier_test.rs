#[cfg(test)]
mod test {
    use crate::config::{HeaderRule, ModifierConfig, RewriteRule};
    use crate::modifier::HttpModifier;
    use crate::proto;

    const GET: &[u8] = b"GET /users?id=7 HTTP/1.1\r\nHost: api.example.com\r\nUser-Agent: curl\r\n\r\n";
    const OPTIONS: &[u8] = b"OPTIONS / HTTP/1.1\r\nHost: api.example.com\r\n\r\n";

    fn modifier(config: ModifierConfig) -> HttpModifier {
        HttpModifier::new(&config)
            .unwrap()
            .expect("non-empty config")
    }

    #[test]
    fn empty_config_builds_nothing() {
        assert!(HttpModifier::new(&ModifierConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn sets_and_deletes_headers() {
        let m = modifier(ModifierConfig {
            headers: vec![HeaderRule {
                name: "User-Agent".to_string(),
                value: "Gor".to_string(),
            }],
            header_deletes: vec!["Host".to_string()],
            ..Default::default()
        });
        let rewritten = m.apply(GET).unwrap().expect("not filtered");
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.header("user-agent"), Some(&b"Gor"[..]));
        assert_eq!(info.header("host"), None);
    }

    #[test]
    fn method_allowlist_drops_everything_else() {
        let m = modifier(ModifierConfig {
            methods: vec!["get".to_string(), "POST".to_string()],
            ..Default::default()
        });
        assert!(m.apply(GET).unwrap().is_some());
        assert!(m.apply(OPTIONS).unwrap().is_none());
    }

    #[test]
    fn rewrites_the_path() {
        let m = modifier(ModifierConfig {
            url_rewrites: vec![RewriteRule {
                pattern: "^/users".to_string(),
                replacement: "/v2/users".to_string(),
            }],
            ..Default::default()
        });
        let rewritten = m.apply(GET).unwrap().unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.path, "/v2/users?id=7");
    }

    #[test]
    fn injects_basic_auth() {
        let m = modifier(ModifierConfig {
            basic_auth: Some("user:pass".to_string()),
            ..Default::default()
        });
        let rewritten = m.apply(GET).unwrap().unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(
            info.header("authorization"),
            Some(&b"Basic dXNlcjpwYXNz"[..])
        );
    }

    #[test]
    fn rewrites_the_body_and_its_length() {
        let m = modifier(ModifierConfig {
            body_rewrites: vec![RewriteRule {
                pattern: "secret".to_string(),
                replacement: "redacted".to_string(),
            }],
            ..Default::default()
        });
        let post =
            b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 8\r\n\r\nsecret=1";
        let rewritten = m.apply(post).unwrap().unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.body, b"redacted=1");
        assert_eq!(info.header("content-length"), Some(&b"10"[..]));
    }

    #[test]
    fn reports_whether_host_is_forced() {
        let with_host = modifier(ModifierConfig {
            headers: vec![HeaderRule {
                name: "host".to_string(),
                value: "other".to_string(),
            }],
            ..Default::default()
        });
        assert!(with_host.sets_host());

        let without = modifier(ModifierConfig {
            methods: vec!["GET".to_string()],
            ..Default::default()
        });
        assert!(!without.sets_host());
    }

    #[test]
    fn bad_rewrite_pattern_fails_construction() {
        let config = ModifierConfig {
            url_rewrites: vec![RewriteRule {
                pattern: "([".to_string(),
                replacement: String::new(),
            }],
            ..Default::default()
        };
        assert!(HttpModifier::new(&config).is_err());
    }
}
