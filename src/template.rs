//! `{{name}}`-placeholder substitution for the error-mail template.

/// Substitute each `{{key}}` occurrence in `text` with its paired value.
/// Unknown placeholders are left intact; a `None` value substitutes as an
/// empty string. Pairs are applied in order, each resolved against the
/// original text only once (re-running over already-substituted output is
/// what gives this function its idempotence once all keys are known).
pub fn render_template(text: &str, pairs: &[(&str, Option<&str>)]) -> String {
    let mut output = text.to_string();

    for (key, value) in pairs {
        let placeholder = format!("{{{{{key}}}}}");
        output = output.replace(&placeholder, value.unwrap_or(""));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let input = "This is a {{key1}} template\nAll strings need to be {{action}} correctly for the {{test_name}} to pass.";
        let pairs = [
            ("key1", Some("good")),
            ("action", Some("rendered")),
            ("test_name", Some("render_template test")),
        ];

        assert_eq!(
            render_template(input, &pairs),
            "This is a good template\nAll strings need to be rendered correctly for the render_template test to pass."
        );
    }

    #[test]
    fn leaves_unknown_placeholders_intact() {
        assert_eq!(render_template("hello {{name}}", &[]), "hello {{name}}");
    }

    #[test]
    fn none_value_substitutes_as_empty() {
        assert_eq!(render_template("[{{x}}]", &[("x", None)]), "[]");
    }

    #[test]
    fn idempotent_once_known_tokens_resolved() {
        let input = "{{a}} and {{b}}";
        let pairs = [("a", Some("1")), ("b", Some("2"))];
        let once = render_template(input, &pairs);
        let twice = render_template(&once, &pairs);
        assert_eq!(once, twice);
    }
}
