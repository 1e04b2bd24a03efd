//! Helpers over the raw `Name: value` header block carried by a response.

/// Look up a header by name (case-insensitive). The first occurrence wins.
pub fn header_value(block: &str, name: &str) -> Option<String> {
    block.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

/// Render ordered header pairs as a CRLF-separated block.
pub fn to_block<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut block = String::new();
    for (k, v) in pairs {
        block.push_str(k.as_ref());
        block.push_str(": ");
        block.push_str(v.as_ref());
        block.push_str("\r\n");
    }
    block
}

/// A parsed `Content-Type` value: lower-cased MIME type plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub mime: String,
    pub params: Vec<(String, String)>,
}

impl MediaType {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let mime = parts.next()?.trim().to_ascii_lowercase();
        if mime.is_empty() || !mime.contains('/') {
            return None;
        }
        let params = parts
            .filter_map(|p| {
                let (k, v) = p.split_once('=')?;
                Some((
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_ascii_lowercase(),
                ))
            })
            .collect();
        Some(Self { mime, params })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The `Content-Type` of a header block, if present and well-formed.
pub fn content_type(block: &str) -> Option<MediaType> {
    header_value(block, "Content-Type").and_then(|v| MediaType::parse(&v))
}
