//! Percent and entity escaping helpers.
//!
//! The request parser runs every query component and header value through
//! [`url_decode`]; handlers reflecting user input into HTML pages should pass
//! it through [`html_encode`].

/// Decodes `%XX` escapes. A `%` not followed by two hex digits is kept as is.
pub fn url_decode(input: &[u8]) -> Vec<u8> {
    urlencoding::decode_binary(input).into_owned()
}

/// Like [`url_decode`] but also turns `+` into a space, as browsers do when
/// submitting `application/x-www-form-urlencoded` data.
pub fn url_decode_form(input: &[u8]) -> Vec<u8> {
    if !input.contains(&b'+') {
        return url_decode(input);
    }
    // an encoded plus is `%2B`, so every literal one is a space
    let spaced: Vec<u8> = input.iter().map(|&b| if b == b'+' { b' ' } else { b }).collect();
    url_decode(&spaced)
}

/// Percent-encodes everything except ASCII alphanumerics and `-`, `.`, `_`, `~`.
pub fn url_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Replaces `&`, `<`, `>`, `"` and `'` with their entities.
pub fn html_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => encoded.push_str("&amp;"),
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            '"' => encoded.push_str("&quot;"),
            '\'' => encoded.push_str("&apos;"),
            c => encoded.push(c),
        }
    }
    encoded
}

/// Reverses [`html_encode`]. Unknown entities are left untouched.
pub fn html_decode(input: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>'), ("&quot;", '"'), ("&apos;", '\'')];

    let mut decoded = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        decoded.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                decoded.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_percent_escapes() {
        assert_eq!(url_decode(b"a%20b"), b"a b");
        assert_eq!(url_decode(b"%2Fpath%2f"), b"/path/");
        assert_eq!(url_decode(b"100%"), b"100%");
        assert_eq!(url_decode(b"%zz%4"), b"%zz%4");
        assert_eq!(url_decode(b"a+b"), b"a+b");
    }

    #[test]
    fn decode_form_plus() {
        assert_eq!(url_decode_form(b"hello+world%21"), b"hello world!");
        assert_eq!(url_decode_form(b"1%2B1+=+2"), b"1+1 = 2");
    }

    #[test]
    fn encode_then_decode_url() {
        let encoded = url_encode("a b/c?d=é");
        assert_eq!(encoded, "a%20b%2Fc%3Fd%3D%C3%A9");
        assert_eq!(url_decode(encoded.as_bytes()), "a b/c?d=é".as_bytes());
    }

    #[test]
    fn html_entities() {
        let raw = r#"<a href="x">Tom & 'Jerry'</a>"#;
        let encoded = html_encode(raw);
        assert_eq!(encoded, "&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;&lt;/a&gt;");
        assert_eq!(html_decode(&encoded), raw);
        assert_eq!(html_decode("fish &chips; &amp"), "fish &chips; &amp");
    }
}
