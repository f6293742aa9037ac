use tracing::{debug, info};

use crate::builtin::CLANG_KEYS;
use crate::channel::Channel;
use crate::defs::TemplateSet;
use crate::error::TemplateResult;

/// Expands a list of template keys for one channel into a single header file.
pub struct HeaderGenerator<'a> {
    templates: &'a TemplateSet,
    keys: Vec<String>,
    include_guard: Option<String>,
}

impl<'a> HeaderGenerator<'a> {
    pub fn new(templates: &'a TemplateSet) -> Self {
        Self {
            templates,
            keys: CLANG_KEYS.iter().map(|key| key.to_string()).collect(),
            include_guard: None,
        }
    }

    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn include_guard(mut self, guard: impl Into<String>) -> Self {
        self.include_guard = Some(guard.into());
        self
    }

    pub fn generate(&self, channel: &Channel) -> TemplateResult<String> {
        // fail on a bad key before expanding anything
        for key in &self.keys {
            self.templates.get(key)?;
        }

        let context = channel.to_value();
        let mut output = String::new();

        if let Some(guard) = &self.include_guard {
            output.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
        }
        for key in &self.keys {
            let expanded = self.templates.expand(key, &context)?;
            debug!(key = %key, bytes = expanded.len(), "expanded definition");
            output.push_str(&expanded);
        }
        if let Some(guard) = &self.include_guard {
            output.push_str(&format!("#endif /* {} */\n", guard));
        }

        info!(
            channel = %channel.name,
            definitions = self.keys.len(),
            "generated header"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{clang_templates, CLANG_HTTP_POST_BODY};
    use crate::error::TemplateError;
    use pretty_assertions::assert_eq;

    fn weather() -> Channel {
        Channel {
            name: "weather".to_string(),
            tags: vec!["city".to_string()],
            fields: [("temp", "float")].into_iter().collect(),
            ..Channel::default()
        }
    }

    #[test]
    fn test_default_keys_emit_header_then_body() {
        let set = clang_templates().unwrap();
        let output = HeaderGenerator::new(&set).generate(&weather()).unwrap();
        let header = output.find("#define HTTP_POST_HEADER").unwrap();
        let body = output.find("#define HTTP_POST_BODY").unwrap();
        assert!(header < body);
        assert!(output.contains("upload?city=%s HTTP/1.1"));
        assert!(output.contains(r#""{temp=%f,}\r\n""#));
    }

    #[test]
    fn test_selected_key_with_include_guard() {
        let set = clang_templates().unwrap();
        let output = HeaderGenerator::new(&set)
            .keys([CLANG_HTTP_POST_BODY])
            .include_guard("WEATHER_H")
            .generate(&weather())
            .unwrap();
        let expected = concat!(
            "#ifndef WEATHER_H\n",
            "#define WEATHER_H\n",
            "\n",
            "#define HTTP_POST_BODY \\\n",
            r#""{temp=%f,}\r\n""#,
            "\n\n",
            "#endif /* WEATHER_H */\n",
        );
        assert_eq!(output, expected);
    }

    #[test]
    fn test_unknown_key_fails_before_expansion() {
        let set = clang_templates().unwrap();
        let err = HeaderGenerator::new(&set)
            .keys(["CLANG_HTTP_POST_BODY", "CLANG_MQTT"])
            .generate(&weather())
            .unwrap_err();
        match err {
            TemplateError::UnknownTemplateKey { key } => assert_eq!(key, "CLANG_MQTT"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
