#[cfg(test)]
mod test {
    use crate::proto;

    const REQUEST: &[u8] =
        b"POST /submit?x=1 HTTP/1.1\r\nHost: api.example.com\r\nContent-Length: 7\r\n\r\na=1&b=2";

    #[test]
    fn parses_method_path_and_body() {
        let info = proto::parse_request(REQUEST).unwrap();
        assert_eq!(info.method, "POST");
        assert_eq!(info.path, "/submit?x=1");
        assert_eq!(info.version, 1);
        assert_eq!(info.body, b"a=1&b=2");
        assert_eq!(info.header("host"), Some(&b"api.example.com"[..]));
        assert_eq!(info.header("HOST"), Some(&b"api.example.com"[..]));
        assert_eq!(info.header("missing"), None);
    }

    #[test]
    fn rejects_partial_head() {
        assert!(proto::parse_request(b"GET / HTTP/1.1\r\nHost: x").is_err());
    }

    #[test]
    fn set_header_replaces_in_place() {
        let rewritten = proto::set_header(REQUEST, "Host", b"shadow.example.com").unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.header("host"), Some(&b"shadow.example.com"[..]));
        assert_eq!(info.body, b"a=1&b=2");
        assert_eq!(
            info.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("host")).count(),
            1
        );
    }

    #[test]
    fn set_header_appends_when_missing() {
        let rewritten = proto::set_header(REQUEST, "X-Real-IP", b"10.0.0.9").unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.header("x-real-ip"), Some(&b"10.0.0.9"[..]));
    }

    #[test]
    fn delete_header_removes_all_occurrences() {
        let rewritten = proto::delete_header(REQUEST, "host").unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.header("host"), None);
        assert_eq!(info.body, b"a=1&b=2");
    }

    #[test]
    fn set_path_keeps_everything_else() {
        let rewritten = proto::set_path(REQUEST, "/mirror/submit?x=1").unwrap();
        let info = proto::parse_request(&rewritten).unwrap();
        assert_eq!(info.method, "POST");
        assert_eq!(info.path, "/mirror/submit?x=1");
        assert_eq!(info.header("host"), Some(&b"api.example.com"[..]));
        assert_eq!(info.body, b"a=1&b=2");
    }

    #[test]
    fn header_value_reads_raw_payloads() {
        assert_eq!(
            proto::header_value(REQUEST, "content-length"),
            Some(&b"7"[..])
        );
        assert_eq!(proto::header_value(b"garbage", "host"), None);
    }
}
