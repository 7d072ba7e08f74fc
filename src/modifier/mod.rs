use crate::config::ModifierConfig;
use crate::error::RecastError;
use crate::proto;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

/// Pure request rewrite hook applied by the HTTP output before dispatch.
///
/// `apply` either returns a (possibly rewritten) payload or `None`, which
/// drops the message. No state is shared between invocations.
pub struct HttpModifier {
    headers: Vec<(String, String)>,
    header_deletes: Vec<String>,
    methods: Vec<String>,
    url_rewrites: Vec<(regex::Regex, String)>,
    basic_auth: Option<String>,
    body_rewrites: Vec<(regex::bytes::Regex, Vec<u8>)>,
}

impl HttpModifier {
    /// Compiles a modifier from its configuration; `None` when the
    /// configuration holds no rules at all.
    pub fn new(config: &ModifierConfig) -> Result<Option<Self>, RecastError> {
        if config.is_empty() {
            return Ok(None);
        }
        let mut url_rewrites = Vec::with_capacity(config.url_rewrites.len());
        for rule in &config.url_rewrites {
            url_rewrites.push((regex::Regex::new(&rule.pattern)?, rule.replacement.clone()));
        }
        let mut body_rewrites = Vec::with_capacity(config.body_rewrites.len());
        for rule in &config.body_rewrites {
            body_rewrites.push((
                regex::bytes::Regex::new(&rule.pattern)?,
                rule.replacement.clone().into_bytes(),
            ));
        }
        Ok(Some(HttpModifier {
            headers: config
                .headers
                .iter()
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect(),
            header_deletes: config.header_deletes.clone(),
            methods: config.methods.iter().map(|m| m.to_uppercase()).collect(),
            url_rewrites,
            basic_auth: config.basic_auth.clone(),
            body_rewrites,
        }))
    }

    /// True when the modifier forces a `Host` header; the registry uses this
    /// to stop the HTTP client from overriding it.
    pub fn sets_host(&self) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("host"))
    }

    /// Rewrites one captured request. `Ok(None)` means drop it.
    pub fn apply(&self, data: &[u8]) -> Result<Option<Bytes>, RecastError> {
        let info = proto::parse_request(data)?;

        if !self.methods.is_empty()
            && !self.methods.iter().any(|m| m == info.method)
        {
            return Ok(None);
        }

        let method = info.method.to_string();
        let mut path = info.path.to_string();
        let version = info.version;
        let mut headers: Vec<(String, Vec<u8>)> = info
            .headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_vec()))
            .collect();
        let mut body = info.body.to_vec();

        for rule in &self.url_rewrites {
            path = rule.0.replace(&path, rule.1.as_str()).into_owned();
        }

        for name in &self.header_deletes {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
        for (name, value) in &self.headers {
            set_header(&mut headers, name, value.as_bytes());
        }
        if let Some(credentials) = &self.basic_auth {
            let encoded = format!("Basic {}", BASE64.encode(credentials));
            set_header(&mut headers, "Authorization", encoded.as_bytes());
        }

        if !self.body_rewrites.is_empty() && !body.is_empty() {
            for rule in &self.body_rewrites {
                body = rule.0.replace_all(&body, rule.1.as_slice()).into_owned();
            }
            set_header(
                &mut headers,
                "Content-Length",
                body.len().to_string().as_bytes(),
            );
        }

        Ok(Some(Bytes::from(proto::rebuild_request(
            &method, &path, version, &headers, &body,
        ))))
    }
}

fn set_header(headers: &mut Vec<(String, Vec<u8>)>, name: &str, value: &[u8]) {
    for (n, v) in headers.iter_mut() {
        if n.eq_ignore_ascii_case(name) {
            *v = value.to_vec();
            return;
        }
    }
    headers.push((name.to_string(), value.to_vec()));
}
