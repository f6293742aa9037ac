//! The C HTTP templates shipped with the generator.

use crate::defs::TemplateSet;
use crate::error::TemplateResult;

pub const CLANG_HTTP_POST_HEADER: &str = "CLANG_HTTP_POST_HEADER";
pub const CLANG_HTTP_POST_BODY: &str = "CLANG_HTTP_POST_BODY";

/// Header first, then body.
pub const CLANG_KEYS: [&str; 2] = [CLANG_HTTP_POST_HEADER, CLANG_HTTP_POST_BODY];

pub const CLANG_TEMPLATES: &str = include_str!("../assets/hardware_templates/clang.h");

pub fn clang_templates() -> TemplateResult<TemplateSet> {
    TemplateSet::parse(CLANG_TEMPLATES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::error::TemplateError;
    use pretty_assertions::assert_eq;

    fn channel(tags: &[&str], fields: &[(&str, &str)]) -> Channel {
        Channel {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            fields: fields.iter().copied().collect(),
            ..Channel::default()
        }
    }

    #[test]
    fn test_embedded_asset_defines_both_keys() {
        let set = clang_templates().unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), CLANG_KEYS.to_vec());
    }

    #[test]
    fn test_http_post_header() {
        let set = clang_templates().unwrap();
        let output = set
            .expand(
                CLANG_HTTP_POST_HEADER,
                &channel(&["a", "b", "c"], &[]).to_value(),
            )
            .unwrap();
        let expected = concat!(
            "#define HTTP_POST_HEADER \\\n",
            r#""POST /channels/devices/%s/upload?a=%s&b=%s&c=%s HTTP/1.1\r\n" \"#,
            "\n",
            r#""Host: %s:8081\r\n" \"#,
            "\n",
            r#""Content-Type: application/json\r\n" \"#,
            "\n",
            r#""AccessToken: abcdefg\r\n" \"#,
            "\n",
            r#""Content-Length: %d\r\n" \"#,
            "\n",
            r#""\r\n""#,
            "\n\n",
        );
        assert_eq!(output, expected);
    }

    #[test]
    fn test_http_post_header_without_tags() {
        let set = clang_templates().unwrap();
        let output = set
            .expand(CLANG_HTTP_POST_HEADER, &channel(&[], &[]).to_value())
            .unwrap();
        assert!(output.contains(r#""POST /channels/devices/%s/upload? HTTP/1.1\r\n" \"#));
        assert!(!output.contains("?&"));
    }

    #[test]
    fn test_http_post_body() {
        let set = clang_templates().unwrap();
        let output = set
            .expand(
                CLANG_HTTP_POST_BODY,
                &channel(&[], &[("temp", "float"), ("name", "string")]).to_value(),
            )
            .unwrap();
        let expected = concat!(
            "#define HTTP_POST_BODY \\\n",
            r#""{temp=%f,name=%s,}\r\n""#,
            "\n\n",
        );
        assert_eq!(output, expected);
    }

    #[test]
    fn test_http_post_body_skips_unknown_types() {
        let set = clang_templates().unwrap();
        let output = set
            .expand(
                CLANG_HTTP_POST_BODY,
                &channel(&[], &[("count", "int"), ("level", "double"), ("on", "boolean")])
                    .to_value(),
            )
            .unwrap();
        assert!(output.contains(r#""{count=%d,on=%s,}\r\n""#));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let set = clang_templates().unwrap();
        let err = set
            .expand("CLANG_HTTP_GET_HEADER", &Channel::default().to_value())
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownTemplateKey { .. }));
    }
}
